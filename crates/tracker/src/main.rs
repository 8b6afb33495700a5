//! Standalone tracker binary: parses CLI flags, resolves a bindable host,
//! runs the rendezvous coordinator to completion, and prints the
//! `DMLC_TRACKER_ENV_*` block workers read their environment from.

use std::process::ExitCode;
use std::sync::Arc;

use tracker_core::{
    CliArgs, LogSink, RendezvousCoordinator, StdoutSink, TracingSink, bind_listener, parse_args,
    resolve_host,
};

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cfg = match parse_args(args) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("tracker: {err}");
            return ExitCode::FAILURE;
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_new(cfg.log_level.as_tracing_filter())
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("tracker: failed to start async runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cfg)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("tracker: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cfg: CliArgs) -> tracker_core::Result<()> {
    let host = resolve_host(&cfg.host_ip).await?;
    let (listener, port) = bind_listener(host, cfg.port_start, cfg.port_end).await?;

    let sink: Arc<dyn LogSink> = Arc::new(TracingSink);
    let print_sink: Arc<dyn LogSink> = Arc::new(StdoutSink);

    let coordinator = RendezvousCoordinator::new(listener, cfg.num_workers, sink, print_sink);

    print_env_block(&host.to_string(), port, &cfg);
    coordinator.run().await
}

fn print_env_block(host_ip: &str, port: u16, cfg: &CliArgs) {
    println!("DMLC_TRACKER_ENV_START");
    println!("DMLC_NUM_WORKER={}", cfg.num_workers);
    println!("DMLC_NUM_SERVER={}", cfg.num_servers);
    println!("DMLC_TRACKER_URI={host_ip}");
    println!("DMLC_TRACKER_PORT={port}");
    println!("DMLC_TRACKER_ENV_END");
    use std::io::Write;
    let _ = std::io::stdout().flush();
}
