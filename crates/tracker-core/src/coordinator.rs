//! The rendezvous coordinator: a single accept loop that owns every
//! piece of state in §3 of the design and is never re-entered
//! concurrently. It drives one worker session to completion before the
//! next `accept` is serviced — there is no `tokio::spawn` anywhere in
//! this module, by design.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};

use crate::error::{Result, TrackerError};
use crate::overlay::{Overlay, Rank};
use crate::session::{self, Command, Header, WaitConn};
use crate::sink::LogSink;
use crate::wire::Framed;

/// A `start`/`recover` session that has been read but whose rank
/// assignment is deferred until a full batch has accumulated.
struct PendingSession {
    framed: Framed<TcpStream>,
    host: String,
    header: Header,
}

pub struct RendezvousCoordinator {
    listener: TcpListener,
    sink: Arc<dyn LogSink>,
    print_sink: Arc<dyn LogSink>,

    n_workers: i32,
    overlay: Option<Overlay>,
    todo_nodes: VecDeque<Rank>,
    job_map: HashMap<String, Rank>,
    wait_conn: WaitConn,
    pending: Vec<PendingSession>,
    shutdown: HashSet<Rank>,
}

impl RendezvousCoordinator {
    /// `n_workers` is the coordinator's initial working N; it may be
    /// overridden by the first `start` session's declared `world_size`
    /// (see `lazily_initialise`).
    pub fn new(listener: TcpListener, n_workers: i32, sink: Arc<dyn LogSink>, print_sink: Arc<dyn LogSink>) -> Self {
        Self {
            listener,
            sink,
            print_sink,
            n_workers,
            overlay: None,
            todo_nodes: VecDeque::new(),
            job_map: HashMap::new(),
            wait_conn: HashMap::new(),
            pending: Vec::new(),
            shutdown: HashSet::new(),
        }
    }

    pub fn local_port(&self) -> Result<u16> {
        Ok(self.listener.local_addr()?.port())
    }

    /// Accepts and dispatches connections until every worker has
    /// reported shutdown.
    pub async fn run(mut self) -> Result<()> {
        loop {
            let (stream, peer_addr) = self.listener.accept().await?;
            let host = peer_addr.ip().to_string();
            if let Err(err) = self.handle_connection(stream, host).await {
                self.sink.info(&format!("tracker: fatal error on session: {err}"));
                return Err(err);
            }
            if self.shutdown.len() as i32 >= self.n_workers && self.overlay.is_some() {
                break;
            }
        }
        self.sink.info("tracker: all nodes finished job");
        Ok(())
    }

    async fn handle_connection(&mut self, stream: TcpStream, host: String) -> Result<()> {
        let mut framed = Framed::new(stream);
        framed.magic_handshake().await?;
        let header = session::read_header(&mut framed).await?;

        match header.cmd {
            Command::Print => {
                let msg = framed.read_string().await?;
                self.print_sink.info(msg.trim());
                Ok(())
            }
            Command::Shutdown => self.handle_shutdown(header),
            Command::Start | Command::Recover => {
                self.handle_start_or_recover(framed, host, header).await
            }
        }
    }

    fn handle_shutdown(&mut self, header: Header) -> Result<()> {
        let rank = header.rank;
        if rank < 0 || self.shutdown.contains(&rank) || self.wait_conn.contains_key(&rank) {
            return Err(TrackerError::ProtocolViolation(format!(
                "invalid shutdown from rank {rank}"
            )));
        }
        self.shutdown.insert(rank);
        self.sink.debug(&format!("received shutdown signal from {rank}"));
        Ok(())
    }

    async fn handle_start_or_recover(
        &mut self,
        mut framed: Framed<TcpStream>,
        host: String,
        header: Header,
    ) -> Result<()> {
        if self.overlay.is_none() {
            if header.cmd != Command::Start {
                return Err(TrackerError::ProtocolViolation(
                    "overlay not yet initialised; first session must be `start`".into(),
                ));
            }
            let n = if header.world_size > 0 {
                header.world_size
            } else {
                self.n_workers
            };
            self.overlay = Some(Overlay::build(n)?);
            self.n_workers = n;
            self.todo_nodes = (0..n).collect();
        } else if header.world_size != -1 && header.world_size != self.n_workers {
            return Err(TrackerError::ProtocolViolation(format!(
                "world_size {} disagrees with job size {}",
                header.world_size, self.n_workers
            )));
        }

        if header.cmd == Command::Recover && header.rank < 0 {
            return Err(TrackerError::ProtocolViolation(
                "recover requires an explicit rank".into(),
            ));
        }

        let decision = decide_rank(header.rank, &header.jobid, &self.job_map);
        if decision == -1 {
            if self.todo_nodes.is_empty() {
                return Err(TrackerError::ProtocolViolation(
                    "no ranks left to assign but a session still needs one".into(),
                ));
            }
            self.pending.push(PendingSession { framed, host, header });
            if self.pending.len() == self.todo_nodes.len() {
                self.drain_batch().await?;
            }
            Ok(())
        } else {
            self.wire(&mut framed, decision, &host).await?;
            self.sink
                .debug(&format!("received {:?} signal from rank {decision}", header.cmd));
            Ok(())
        }
    }

    /// Sorts the accumulated batch by host for reproducible rank ↔
    /// machine mapping, then assigns and wires each session in turn.
    async fn drain_batch(&mut self) -> Result<()> {
        let mut batch = std::mem::take(&mut self.pending);
        batch.sort_by(|a, b| a.host.cmp(&b.host));

        for mut session in batch {
            let rank = self
                .todo_nodes
                .pop_front()
                .expect("batch size matches todo_nodes length by construction");
            if session.header.jobid != "NULL" {
                self.job_map.insert(session.header.jobid.clone(), rank);
            }
            self.wire(&mut session.framed, rank, &session.host).await?;
            self.sink.debug(&format!(
                "received {:?} signal from {}; assigned rank {rank}",
                session.header.cmd, session.host
            ));
        }

        if self.todo_nodes.is_empty() {
            self.sink
                .info(&format!("tracker: all of {} nodes started", self.n_workers));
        }
        Ok(())
    }

    /// Runs the peer-wiring sub-protocol for one freshly-assigned rank
    /// and records it in `wait_conn` if it still owes inbound accepts.
    async fn wire(&mut self, framed: &mut Framed<TcpStream>, rank: Rank, host: &str) -> Result<()> {
        let overlay = self.overlay.as_ref().expect("overlay is built before any rank is wired");
        let nn = session::send_assignment(framed, rank, overlay).await?;
        let outcome = session::run_handshake_loop(framed, &nn, &mut self.wait_conn).await?;

        if outcome.wait_accept > 0 {
            self.wait_conn.insert(
                rank,
                session::PeerInfo {
                    host: host.to_string(),
                    port: outcome.listening_port,
                    wait_accept: outcome.wait_accept,
                },
            );
        }
        Ok(())
    }
}

/// Decides the rank for a `start`/`recover` session: explicit rank wins,
/// then job-id stickiness, else -1 meaning "defer to batch assignment".
fn decide_rank(declared_rank: Rank, jobid: &str, job_map: &HashMap<String, Rank>) -> Rank {
    if declared_rank >= 0 {
        return declared_rank;
    }
    if jobid != "NULL" {
        if let Some(&rank) = job_map.get(jobid) {
            return rank;
        }
    }
    -1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_rank_wins_over_job_map() {
        let mut job_map = HashMap::new();
        job_map.insert("j".to_string(), 3);
        assert_eq!(decide_rank(5, "j", &job_map), 5);
    }

    #[test]
    fn job_map_hit_reuses_rank() {
        let mut job_map = HashMap::new();
        job_map.insert("j".to_string(), 3);
        assert_eq!(decide_rank(-1, "j", &job_map), 3);
    }

    #[test]
    fn unknown_job_defers_to_batch() {
        let job_map = HashMap::new();
        assert_eq!(decide_rank(-1, "NULL", &job_map), -1);
        assert_eq!(decide_rank(-1, "new-job", &job_map), -1);
    }
}
