//! Core library for the bootstrap rendezvous tracker: overlay
//! construction, wire protocol framing, per-connection session logic,
//! the single-task coordinator, endpoint discovery, and configuration.
//!
//! The binary crate in `crates/tracker` is a thin wrapper over this
//! library's public surface.

mod config;
mod coordinator;
mod discovery;
mod error;
mod overlay;
mod session;
mod sink;
mod wire;

pub use config::{CliArgs, LogLevel, parse_args};
pub use coordinator::RendezvousCoordinator;
pub use discovery::{HostIpMode, bind_listener, resolve_host};
pub use error::{Result, TrackerError};
pub use overlay::{Overlay, Rank};
pub use sink::{LogSink, StdoutSink, TracingSink};
pub use wire::{Framed, MAGIC};
