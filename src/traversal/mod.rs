//! NAT traversal: marker-packet punching and connect sequencing.

mod connector;
mod punch;

pub use connector::{ClientChannel, ConnectTarget, Connector};
pub use punch::{punch_burst, spawn_join_responder, spawn_punch_response, PunchConfig};

use std::net::SocketAddr;

use crate::directory::{LobbyDirectory, PendingJoin};

/// Per-client traversal state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraversalPhase {
    /// No traversal attempt in progress.
    #[default]
    Idle,
    /// Marker burst in flight, waiting for the path to open.
    Punching,
    /// Path open, encrypted handshake completed.
    Established,
}

/// The rendezvous boundary between transports and the directory.
///
/// The joining side registers its observed endpoint; the hosting side
/// drains the queue and punches back. Remote deployments put a wire
/// protocol behind this trait; in-process ones use [`LobbyDirectory`]
/// directly.
#[allow(async_fn_in_trait)]
pub trait Rendezvous: Send + Sync {
    /// Record a join request against a live session. Returns `false`
    /// if the session is unknown or dead.
    async fn register_join(&self, descriptor: &str, observed: SocketAddr) -> bool;

    /// Drain the pending-join queue. Host-authenticated.
    fn take_pending(
        &self,
        host_key: &str,
    ) -> impl std::future::Future<Output = Vec<PendingJoin>> + Send;
}

impl Rendezvous for LobbyDirectory {
    async fn register_join(&self, descriptor: &str, observed: SocketAddr) -> bool {
        LobbyDirectory::register_join(self, descriptor, observed).await
    }

    async fn take_pending(&self, host_key: &str) -> Vec<PendingJoin> {
        LobbyDirectory::take_pending(self, host_key).await
    }
}
