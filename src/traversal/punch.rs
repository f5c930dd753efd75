//! Marker-packet bursts that open NAT mappings.
//!
//! Both sides of a punched connection send the same fixed burst: the
//! joiner toward the host's public endpoint, the host back toward the
//! joiner's observed endpoint. Sending from the same socket that later
//! carries the handshake keeps the NAT mapping alive.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, trace, warn};

use super::Rendezvous;
use crate::core::{JOIN_POLL_INTERVAL, PUNCH_BURST_COUNT, PUNCH_MARKER, PUNCH_SPACING};
use crate::transport::is_transient;

/// Burst shape. Defaults to the wire constants; tests and constrained
/// links may shrink it.
#[derive(Debug, Clone, Copy)]
pub struct PunchConfig {
    /// Number of marker packets per burst.
    pub packets: u32,
    /// Spacing between packets.
    pub spacing: Duration,
}

impl Default for PunchConfig {
    fn default() -> Self {
        Self {
            packets: PUNCH_BURST_COUNT,
            spacing: PUNCH_SPACING,
        }
    }
}

/// Send one burst of punch markers to `target`.
///
/// Blocks its caller for the burst's full duration, so hosts run it on
/// a spawned task. ICMP "port unreachable" noise from the not-yet-open
/// far port is expected and suppressed.
pub async fn punch_burst(
    socket: &UdpSocket,
    target: SocketAddr,
    config: &PunchConfig,
) -> std::io::Result<()> {
    let mut ticker = tokio::time::interval(config.spacing);
    for _ in 0..config.packets {
        ticker.tick().await;
        match socket.send_to(PUNCH_MARKER, target).await {
            Ok(_) => {}
            Err(e) if is_transient(&e) => {
                trace!(%target, "suppressed transient error while punching");
            }
            Err(e) => return Err(e),
        }
    }
    debug!(%target, packets = config.packets, "punch burst complete");
    Ok(())
}

/// Send a punch burst on a background task, never blocking the caller.
pub fn spawn_punch_response(
    socket: Arc<UdpSocket>,
    target: SocketAddr,
    config: PunchConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = punch_burst(&socket, target, &config).await {
            warn!(%target, error = %e, "punch response failed");
        }
    })
}

/// Run the host side of traversal: poll the pending-join queue and
/// punch back toward every observed joiner.
///
/// Bursts run inside a `JoinSet`, so aborting the returned handle also
/// cancels any bursts still in flight.
pub fn spawn_join_responder<R: Rendezvous + 'static>(
    rendezvous: Arc<R>,
    host_key: String,
    socket: Arc<UdpSocket>,
    config: PunchConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(JOIN_POLL_INTERVAL);
        let mut bursts = JoinSet::new();
        loop {
            ticker.tick().await;
            for join in rendezvous.take_pending(&host_key).await {
                debug!(joiner = %join.addr, "punching back toward joiner");
                let socket = socket.clone();
                bursts.spawn(async move {
                    if let Err(e) = punch_burst(&socket, join.addr, &config).await {
                        warn!(joiner = %join.addr, error = %e, "punch response failed");
                    }
                });
            }
            // Reap finished bursts so the set does not grow unbounded.
            while bursts.try_join_next().is_some() {}
        }
    })
}
