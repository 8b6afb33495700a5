//! Error taxonomy for the rendezvous tracker.
//!
//! Every fatal condition the coordinator can hit collapses into this one
//! enum. There is no per-worker quarantine: a protocol violation or a
//! transient I/O failure on any single session is fatal for the whole job,
//! since the collective cannot proceed without the full set of N workers.

use std::io;

use thiserror::Error;

/// Errors surfaced by the tracker's wire protocol, overlay builder,
/// coordinator, and endpoint discovery.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Underlying socket I/O failed (short read, connection reset, ...).
    #[error("socket I/O failed: {0}")]
    Io(#[from] io::Error),

    /// A connecting peer sent a magic number other than [`crate::wire::MAGIC`].
    #[error("bad magic number from peer: expected {expected:#x}, got {got:#x}")]
    BadMagic { expected: i32, got: i32 },

    /// A worker violated one of the protocol's assertions (duplicate
    /// shutdown, `good` not a subset of its neighbour set, re-declaring a
    /// `world_size` that disagrees with the job's, shutting down a rank
    /// still owed inbound accepts, ...). The free-form message names which.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The overlay builder was asked to build a topology for N < 1.
    #[error("world size must be >= 1, got {0}")]
    InvalidWorldSize(i32),

    /// No port in the configured range could be bound.
    #[error("no free port in [{start}, {end}) on {host}")]
    PortRangeExhausted {
        host: String,
        start: u16,
        end: u16,
    },

    /// The host address could not be resolved to a bindable IP.
    #[error("could not resolve bindable host address for {0:?}: {1}")]
    HostResolution(String, String),

    /// A CLI flag or combination of flags is not supported.
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, TrackerError>;
