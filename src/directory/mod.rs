//! Matchmaking directory: live-session registry, join codes, host
//! credentials, and the pending-join rendezvous queue.

mod names;
mod registry;
mod session;

pub use names::NamePool;
pub use registry::LobbyDirectory;
pub use session::{PendingJoin, SessionInfo, SessionKind, SessionTicket};
