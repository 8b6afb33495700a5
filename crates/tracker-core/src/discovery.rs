//! Endpoint discovery: resolve a bindable host address, then scan a port
//! range for one the tracker can actually bind.

use std::io;
use std::net::{IpAddr, SocketAddr, UdpSocket};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::TcpListener;

use crate::error::{Result, TrackerError};

/// How the caller wants the tracker's bindable address determined.
#[derive(Debug, Clone)]
pub enum HostIpMode {
    /// Resolve the local, non-loopback address automatically.
    Auto,
    /// Resolve via the fully-qualified hostname specifically.
    Dns,
    /// Use exactly this address or hostname.
    Explicit(String),
}

impl HostIpMode {
    pub fn parse(s: &str) -> Self {
        match s {
            "auto" => HostIpMode::Auto,
            "dns" => HostIpMode::Dns,
            other => HostIpMode::Explicit(other.to_string()),
        }
    }
}

pub async fn resolve_host(mode: &HostIpMode) -> Result<IpAddr> {
    match mode {
        HostIpMode::Explicit(s) => resolve_name(s).await,
        HostIpMode::Dns => {
            let fqdn = local_hostname()?;
            resolve_name(&fqdn).await
        }
        HostIpMode::Auto => match local_hostname().and_then(|h| Ok(h)) {
            Ok(hostname) => match resolve_name(&hostname).await {
                Ok(ip) if !ip.is_loopback() => Ok(ip),
                _ => udp_trick_address(),
            },
            Err(_) => udp_trick_address(),
        },
    }
}

fn local_hostname() -> Result<String> {
    hostname::get()
        .ok()
        .and_then(|os| os.into_string().ok())
        .ok_or_else(|| TrackerError::HostResolution("<local>".into(), "could not read hostname".into()))
}

/// Resolves `name` (an address literal or a DNS name) to an IP, taking
/// the first non-loopback candidate if there is one.
async fn resolve_name(name: &str) -> Result<IpAddr> {
    if let Ok(ip) = name.parse::<IpAddr>() {
        return Ok(ip);
    }
    let mut addrs = tokio::net::lookup_host((name, 0))
        .await
        .map_err(|e| TrackerError::HostResolution(name.to_string(), e.to_string()))?
        .collect::<Vec<_>>();
    addrs.sort_by_key(|a| a.ip().is_loopback());
    addrs
        .into_iter()
        .next()
        .map(|a| a.ip())
        .ok_or_else(|| TrackerError::HostResolution(name.to_string(), "no addresses returned".into()))
}

/// Opens a UDP socket "connected" to an unreachable public address and
/// reads back whatever local endpoint the OS routed it through. The
/// remote address never needs to be reachable — no packet is ever sent.
fn udp_trick_address() -> Result<IpAddr> {
    let sock = UdpSocket::bind("0.0.0.0:0")?;
    sock.connect("10.255.255.255:1")?;
    Ok(sock.local_addr()?.ip())
}

/// Binds a TCP listener to `host`, scanning ports `[start_port, end_port)`
/// and skipping only "address in use"; any other bind error is fatal.
/// Listens with a backlog of 256.
pub async fn bind_listener(host: IpAddr, start_port: u16, end_port: u16) -> Result<(TcpListener, u16)> {
    for port in start_port..end_port {
        match bind_one(SocketAddr::new(host, port)) {
            Ok(std_listener) => {
                let listener = TcpListener::from_std(std_listener)?;
                return Ok((listener, port));
            }
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(TrackerError::PortRangeExhausted {
        host: host.to_string(),
        start: start_port,
        end: end_port,
    })
}

fn bind_one(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.bind(&addr.into())?;
    socket.listen(256)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}
