//! Injected logging sink.
//!
//! The source this tracker is modelled on toggles between `logging.info`
//! and a bare `print` depending on a module-level flag. We make that an
//! explicit trait instead of a global: callers pick a [`LogSink`]
//! implementation and pass it into the coordinator.

use std::io::Write;

/// Destination for the tracker's own milestone messages and for payloads
/// forwarded from a worker's `print` command.
pub trait LogSink: Send + Sync {
    fn info(&self, msg: &str);
    fn debug(&self, msg: &str);
}

/// Routes through the `tracing` facade at `INFO`/`DEBUG`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn info(&self, msg: &str) {
        tracing::info!("{msg}");
    }

    fn debug(&self, msg: &str) {
        tracing::debug!("{msg}");
    }
}

/// Writes straight to stdout and flushes immediately. Used by the
/// standalone CLI for `print` payloads so they interleave correctly with
/// the `DMLC_TRACKER_ENV_*` block that is also written to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl LogSink for StdoutSink {
    fn info(&self, msg: &str) {
        let mut out = std::io::stdout();
        let _ = writeln!(out, "{msg}");
        let _ = out.flush();
    }

    fn debug(&self, msg: &str) {
        self.info(msg);
    }
}
