//! Command-line surface. Parsed by hand against `std::env::args()` rather
//! than through an argument-parsing crate, matching the rest of this
//! workspace's small standalone tools.

use crate::discovery::HostIpMode;
use crate::error::{Result, TrackerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
}

impl LogLevel {
    fn parse(s: &str) -> Result<Self> {
        match s {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            other => Err(TrackerError::Config(format!("unknown log level `{other}`"))),
        }
    }

    pub fn as_tracing_filter(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CliArgs {
    pub num_workers: i32,
    pub num_servers: i32,
    pub host_ip: HostIpMode,
    pub port_start: u16,
    pub port_end: u16,
    pub log_level: LogLevel,
}

/// Everything `--num-workers` excepted has a sane default; `num_workers`
/// is `required=True` in the original argparse setup and has none — it
/// stays unset here until parsing confirms the flag was actually given.
struct RawArgs {
    num_workers: Option<i32>,
    num_servers: i32,
    host_ip: HostIpMode,
    port_start: u16,
    port_end: u16,
    log_level: LogLevel,
}

impl Default for RawArgs {
    fn default() -> Self {
        Self {
            num_workers: None,
            num_servers: 0,
            host_ip: HostIpMode::Auto,
            port_start: 9091,
            port_end: 9999,
            log_level: LogLevel::Info,
        }
    }
}

/// Parses `--num-workers N --num-servers N --host-ip MODE --port-start N
/// --port-end N --log-level LEVEL`, long-form only, `--flag=value` or
/// `--flag value` both accepted. `--num-workers` is required; omitting it
/// is a configuration error, not a default.
pub fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<CliArgs> {
    let mut raw = RawArgs::default();
    let mut it = args.into_iter().peekable();

    while let Some(arg) = it.next() {
        let (flag, inline_value) = match arg.split_once('=') {
            Some((f, v)) => (f.to_string(), Some(v.to_string())),
            None => (arg, None),
        };

        let mut take_value = |it: &mut std::iter::Peekable<<I as IntoIterator>::IntoIter>| -> Result<String> {
            if let Some(v) = inline_value.clone() {
                return Ok(v);
            }
            it.next()
                .ok_or_else(|| TrackerError::Config(format!("{flag} expects a value")))
        };

        match flag.as_str() {
            "--num-workers" => raw.num_workers = Some(parse_int(&take_value(&mut it)?, &flag)?),
            "--num-servers" => raw.num_servers = parse_int(&take_value(&mut it)?, &flag)?,
            "--host-ip" => raw.host_ip = HostIpMode::parse(&take_value(&mut it)?),
            "--port-start" => raw.port_start = parse_port(&take_value(&mut it)?, &flag)?,
            "--port-end" => raw.port_end = parse_port(&take_value(&mut it)?, &flag)?,
            "--log-level" => raw.log_level = LogLevel::parse(&take_value(&mut it)?)?,
            other => return Err(TrackerError::Config(format!("unrecognised flag `{other}`"))),
        }
    }

    let num_workers = raw
        .num_workers
        .ok_or_else(|| TrackerError::Config("--num-workers is required".into()))?;
    if num_workers < 1 {
        return Err(TrackerError::Config("--num-workers must be at least 1".into()));
    }
    if raw.num_servers != 0 {
        return Err(TrackerError::Config(
            "--num-servers must be 0; standalone parameter-server mode is not implemented".into(),
        ));
    }
    if raw.port_start >= raw.port_end {
        return Err(TrackerError::Config("--port-start must be less than --port-end".into()));
    }

    Ok(CliArgs {
        num_workers,
        num_servers: raw.num_servers,
        host_ip: raw.host_ip,
        port_start: raw.port_start,
        port_end: raw.port_end,
        log_level: raw.log_level,
    })
}

fn parse_int(s: &str, flag: &str) -> Result<i32> {
    s.parse::<i32>()
        .map_err(|_| TrackerError::Config(format!("{flag} expects an integer, got `{s}`")))
}

fn parse_port(s: &str, flag: &str) -> Result<u16> {
    s.parse::<u16>()
        .map_err(|_| TrackerError::Config(format!("{flag} expects a port number, got `{s}`")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(s: &[&str]) -> Vec<String> {
        s.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn other_flags_default_when_only_num_workers_passed() {
        let cfg = parse_args(args(&["--num-workers", "1"])).unwrap();
        assert_eq!(cfg.num_workers, 1);
        assert!(matches!(cfg.host_ip, HostIpMode::Auto));
    }

    #[test]
    fn rejects_missing_num_workers() {
        assert!(parse_args(args(&[])).is_err());
        assert!(parse_args(args(&["--host-ip", "dns"])).is_err());
    }

    #[test]
    fn accepts_space_and_equals_forms() {
        let cfg = parse_args(args(&["--num-workers", "4", "--host-ip=dns"])).unwrap();
        assert_eq!(cfg.num_workers, 4);
        assert!(matches!(cfg.host_ip, HostIpMode::Dns));
    }

    #[test]
    fn rejects_zero_workers() {
        assert!(parse_args(args(&["--num-workers", "0"])).is_err());
    }

    #[test]
    fn rejects_inverted_port_range() {
        assert!(parse_args(args(&[
            "--num-workers",
            "1",
            "--port-start",
            "9999",
            "--port-end",
            "9091"
        ]))
        .is_err());
    }

    #[test]
    fn rejects_unknown_flag() {
        assert!(parse_args(args(&["--bogus", "1"])).is_err());
    }

    #[test]
    fn rejects_nonzero_num_servers() {
        assert!(parse_args(args(&["--num-workers", "1", "--num-servers", "1"])).is_err());
    }
}
