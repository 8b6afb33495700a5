//! Per-connection protocol: the handshake prefix, command dispatch, rank
//! delivery, and the iterative peer-connectivity handshake loop.
//!
//! This module is deliberately free of coordinator bookkeeping beyond the
//! `wait_conn` table it is handed — the rendezvous coordinator (see
//! `coordinator.rs`) owns the rest of the state and decides *which* rank
//! to assign; this module only knows how to *speak the wire protocol*
//! once that decision has been made.

use std::collections::{BTreeSet, HashMap};

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{Result, TrackerError};
use crate::overlay::{Overlay, Rank};
use crate::wire::Framed;

/// One of the four commands a worker can issue per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Recover,
    Print,
    Shutdown,
}

impl Command {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "start" => Ok(Command::Start),
            "recover" => Ok(Command::Recover),
            "print" => Ok(Command::Print),
            "shutdown" => Ok(Command::Shutdown),
            other => Err(TrackerError::ProtocolViolation(format!(
                "unknown command `{other}`"
            ))),
        }
    }
}

/// The fields read right after the magic exchange, before the tracker
/// decides how to dispatch the connection.
#[derive(Debug, Clone)]
pub struct Header {
    pub rank: Rank,
    pub world_size: i32,
    pub jobid: String,
    pub cmd: Command,
}

pub async fn read_header<S>(framed: &mut Framed<S>) -> Result<Header>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let rank = framed.read_i32().await?;
    let world_size = framed.read_i32().await?;
    let jobid = framed.read_string().await?;
    let cmd = Command::parse(&framed.read_string().await?)?;
    Ok(Header {
        rank,
        world_size,
        jobid,
        cmd,
    })
}

/// What the coordinator remembers about a worker once it owes the
/// overlay one or more inbound accepts. This is all that survives past
/// the handshake — the tracker-facing socket itself is dropped once
/// wiring completes, since later peer connections happen directly
/// between workers.
#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub host: String,
    pub port: u16,
    pub wait_accept: i32,
}

pub type WaitConn = HashMap<Rank, PeerInfo>;

/// Sends the initial rank-delivery packet: `rank`, `parent`, `world_size`,
/// the tree neighbour list, and the (possibly sentinel) ring neighbours.
/// Returns `NN`, the union of tree neighbours and non-sentinel ring
/// neighbours, used to bound the `good`/`bad` sets in the handshake loop.
pub async fn send_assignment<S>(
    framed: &mut Framed<S>,
    rank: Rank,
    overlay: &Overlay,
) -> Result<BTreeSet<Rank>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let tree_neighbours = &overlay.tree[&rank];
    let (ring_prev, ring_next) = overlay.ring[&rank];

    framed.write_i32(rank).await?;
    framed.write_i32(overlay.parent[&rank]).await?;
    framed.write_i32(overlay.n).await?;
    framed
        .write_i32(i32::try_from(tree_neighbours.len()).unwrap())
        .await?;
    for &nb in tree_neighbours {
        framed.write_i32(nb).await?;
    }
    framed
        .write_i32(collapse_ring_neighbour(ring_prev, rank))
        .await?;
    framed
        .write_i32(collapse_ring_neighbour(ring_next, rank))
        .await?;

    Ok(overlay.neighbour_set(rank))
}

/// A ring neighbour is sent as -1 exactly when it is the sentinel or
/// equal to the worker's own rank (a self-loop in a 1- or 2-node ring) —
/// never because it happens to coincide with a tree neighbour.
fn collapse_ring_neighbour(neighbour: Rank, rank: Rank) -> Rank {
    if neighbour == -1 || neighbour == rank {
        -1
    } else {
        neighbour
    }
}

/// Outcome of a completed handshake loop.
pub struct HandshakeOutcome {
    pub listening_port: u16,
    pub wait_accept: i32,
}

/// Drives the `ngood`/`ncon`/`nerr` loop until the worker reports every
/// peer in `nn` connected, mutating `wait_conn` for any peer whose
/// `wait_accept` this wiring satisfies.
pub async fn run_handshake_loop<S>(
    framed: &mut Framed<S>,
    nn: &BTreeSet<Rank>,
    wait_conn: &mut WaitConn,
) -> Result<HandshakeOutcome>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let ngood = framed.read_i32().await?;
        let mut good = BTreeSet::new();
        for _ in 0..ngood {
            good.insert(framed.read_i32().await?);
        }
        if !good.is_subset(nn) {
            return Err(TrackerError::ProtocolViolation(format!(
                "worker reported good set {good:?} not a subset of neighbours {nn:?}"
            )));
        }

        let bad: BTreeSet<Rank> = nn.difference(&good).copied().collect();
        let con: Vec<Rank> = bad
            .iter()
            .copied()
            .filter(|r| wait_conn.contains_key(r))
            .collect();

        framed.write_i32(i32::try_from(con.len()).unwrap()).await?;
        framed
            .write_i32(i32::try_from(bad.len() - con.len()).unwrap())
            .await?;
        for &r in &con {
            let peer = &wait_conn[&r];
            framed.write_string(&peer.host).await?;
            framed.write_i32(i32::from(peer.port)).await?;
            framed.write_i32(r).await?;
        }

        let nerr = framed.read_i32().await?;
        if nerr != 0 {
            continue;
        }

        let listening_port = framed.read_i32().await?;
        let listening_port = u16::try_from(listening_port).map_err(|_| {
            TrackerError::ProtocolViolation(format!(
                "worker reported out-of-range listening port {listening_port}"
            ))
        })?;

        for r in &con {
            let done = {
                let peer = wait_conn.get_mut(r).expect("con members are drawn from wait_conn");
                peer.wait_accept -= 1;
                peer.wait_accept == 0
            };
            if done {
                wait_conn.remove(r);
            }
        }

        return Ok(HandshakeOutcome {
            listening_port,
            wait_accept: i32::try_from(bad.len() - con.len()).unwrap(),
        });
    }
}
