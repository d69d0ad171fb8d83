//! UDP intake and simulation for an authoritative entity tree.
//!
//! [`EntityServer`] applies every datagram it receives to the shared tree and
//! answers each newly created entity's originator with an
//! `AddEntityResponse` carrying the assigned id. [`spawn_simulation`] steps
//! the tree on a fixed interval. Both stop when shutdown is initiated.

use meridian_replication::codec::add_response_packet;
use meridian_replication::{usec_timestamp_now, EntityTree, ShutdownState, SweepReport};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

/// Counters kept by the receive loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub datagrams_received: u64,
    /// Datagrams whose header could not be read
    pub datagrams_rejected: u64,
    pub entities_created: u64,
    pub entities_overwritten: u64,
    pub entities_removed: u64,
    pub responses_sent: u64,
}

pub struct EntityServer {
    socket: UdpSocket,
    tree: Arc<RwLock<EntityTree>>,
    max_datagram_size: usize,
    sequence: u16,
    stats: ServerStats,
}

impl EntityServer {
    pub async fn bind(
        address: SocketAddr,
        tree: Arc<RwLock<EntityTree>>,
        max_datagram_size: usize,
    ) -> io::Result<Self> {
        let socket = UdpSocket::bind(address).await?;
        info!("🔌 Entity server listening on {}", socket.local_addr()?);
        Ok(Self {
            socket,
            tree,
            max_datagram_size,
            sequence: 0,
            stats: ServerStats::default(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn stats(&self) -> ServerStats {
        self.stats
    }

    /// Applies one datagram and replies to `from` for every id assigned.
    pub async fn handle_datagram(&mut self, data: &[u8], from: SocketAddr) {
        self.stats.datagrams_received += 1;

        let summary = {
            let mut tree = self.tree.write().await;
            tree.process_packet(data)
        };
        let summary = match summary {
            Ok(summary) => summary,
            Err(error) => {
                self.stats.datagrams_rejected += 1;
                debug!(%from, %error, "Dropping unreadable datagram");
                return;
            }
        };

        trace!(
            %from,
            packet_type = ?summary.header.packet_type,
            sequence = summary.header.sequence,
            created = summary.created,
            overwritten = summary.overwritten,
            stale = summary.ignored_stale,
            "Applied packet"
        );
        self.stats.entities_created += summary.created as u64;
        self.stats.entities_overwritten += summary.overwritten as u64;
        self.stats.entities_removed += summary.removed as u64;

        for (token, id) in summary.assigned {
            let response = add_response_packet(self.next_sequence(), usec_timestamp_now(), token, id);
            match self.socket.send_to(&response, from).await {
                Ok(_) => self.stats.responses_sent += 1,
                Err(error) => warn!(%from, %token, %id, %error, "Failed to send add-entity response"),
            }
        }
    }

    /// Receives until shutdown is initiated. Resolves to the final counters.
    pub async fn run(mut self, shutdown: ShutdownState) -> ServerStats {
        let mut buffer = vec![0u8; self.max_datagram_size];

        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buffer) => match received {
                    Ok((len, from)) => self.handle_datagram(&buffer[..len], from).await,
                    // ICMP errors from earlier sends surface here on some platforms
                    Err(error) => debug!(%error, "Receive failed"),
                },
                _ = shutdown.wait_for_shutdown() => break,
            }
        }

        info!(
            "🔌 Entity server stopped after {} datagrams ({} rejected)",
            self.stats.datagrams_received, self.stats.datagrams_rejected
        );
        self.stats
    }

    fn next_sequence(&mut self) -> u16 {
        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        sequence
    }
}

/// Steps the tree once: simulates every entity by the time since the
/// previous step and prunes nodes left empty.
pub async fn simulate_step(tree: &RwLock<EntityTree>, delta: Duration) -> SweepReport {
    let mut tree = tree.write().await;
    let report = tree.sweep(usec_timestamp_now(), delta.as_secs_f32());
    if report.relocated + report.died + report.escaped > 0 {
        let pruned = tree.collapse_empty_leaves();
        trace!(pruned, "Collapsed empty nodes");
    }
    report
}

/// Spawns the simulation tick. Resolves to the number of steps taken.
pub fn spawn_simulation(
    tree: Arc<RwLock<EntityTree>>,
    interval: Duration,
    shutdown: ShutdownState,
) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_step = Instant::now();
        let mut steps = 0u64;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.wait_for_shutdown() => break,
            }

            let now = Instant::now();
            let report = simulate_step(&tree, now.duration_since(last_step)).await;
            last_step = now;
            steps += 1;

            if report.died + report.escaped > 0 {
                debug!(died = report.died, escaped = report.escaped, "Removed entities");
            }
        }

        info!("⏱️ Simulation stopped after {} steps", steps);
        steps
    })
}
