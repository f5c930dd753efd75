//! # MUSTER Protocol
//!
//! **M**ultiplayer **U**ser **S**ession **T**ransport & **R**endezvous
//!
//! MUSTER is the network transport and rendezvous layer for peer-hosted
//! multiplayer sessions. It lets a host and clients establish an
//! encrypted, low-latency channel across NATs without manual
//! port-forwarding, and lets strangers discover and join each other's
//! sessions through a directory service. It provides:
//!
//! - **Discovery**: a lobby directory with join codes, host
//!   credentials, and heartbeat-driven liveness
//! - **Traversal**: marker-packet NAT punching coordinated through the
//!   directory's pending-join queue
//! - **Security**: Noise-authenticated encryption on every UDP channel
//! - **Adaptivity**: RTT-driven send cadence with hysteresis
//! - **Uniformity**: one capability surface over plain UDP, punched
//!   UDP, and platform relay transports
//!
//! ## Feature Flags
//!
//! - `directory` (default): lobby registry, name pool, join codes
//! - `transport` (default): encrypted channels and the capability model
//! - `traversal` (default): NAT punching and connect sequencing
//! - `dispatch` (default): packet dispatch table
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use muster_protocol::directory::{LobbyDirectory, SessionKind};
//! use muster_protocol::traversal::{ConnectTarget, Connector};
//! use muster_protocol::crypto::StaticKeypair;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let directory = Arc::new(LobbyDirectory::new());
//! let sweeper = directory.spawn_sweeper();
//!
//! // Host side: register the session and keep it alive.
//! let ticket = directory
//!     .create("203.0.113.7:9000", "FridayGame", SessionKind::Direct, None, true)
//!     .await;
//!
//! // Client side: resolve the join code and connect.
//! let session = directory
//!     .get_by_code(ticket.join_code.as_deref().unwrap())
//!     .await
//!     .expect("session is live");
//! let target = ConnectTarget::from_session(&session).expect("direct session");
//! let connector = Connector::new(directory.clone(), StaticKeypair::generate());
//! let channel = connector.connect(&target).await?;
//! # drop(channel);
//! # sweeper.abort();
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// Crypto layer (feature-gated)
#[cfg(feature = "crypto")]
#[cfg_attr(docsrs, doc(cfg(feature = "crypto")))]
pub mod crypto;

// Lobby directory (feature-gated)
#[cfg(feature = "directory")]
#[cfg_attr(docsrs, doc(cfg(feature = "directory")))]
pub mod directory;

// Transport capability model and channels (feature-gated)
#[cfg(feature = "transport")]
#[cfg_attr(docsrs, doc(cfg(feature = "transport")))]
pub mod transport;

// NAT traversal (feature-gated)
#[cfg(feature = "traversal")]
#[cfg_attr(docsrs, doc(cfg(feature = "traversal")))]
pub mod traversal;

// Packet dispatch table (feature-gated)
#[cfg(feature = "dispatch")]
#[cfg_attr(docsrs, doc(cfg(feature = "dispatch")))]
pub mod dispatch;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::*;

    #[cfg(feature = "crypto")]
    pub use crate::crypto::{SecureLink, StaticKeypair};

    #[cfg(feature = "directory")]
    pub use crate::directory::{
        LobbyDirectory, NamePool, PendingJoin, SessionInfo, SessionKind, SessionTicket,
    };

    #[cfg(feature = "transport")]
    pub use crate::transport::{
        Channel, ChannelCapabilities, DirectChannel, HandshakeConfig, HostChannel, HostEndpoint,
        RelayChannel, RelayLink, SendRateController,
    };

    #[cfg(feature = "traversal")]
    pub use crate::transport::PunchedChannel;

    #[cfg(feature = "traversal")]
    pub use crate::traversal::{
        punch_burst, spawn_join_responder, spawn_punch_response, ClientChannel, ConnectTarget,
        Connector, PunchConfig, Rendezvous, TraversalPhase,
    };

    #[cfg(feature = "dispatch")]
    pub use crate::dispatch::{DispatchTable, HandlerError, QueuedDispatcher};
}

// Re-export commonly used items at crate root
pub use self::core::{ConnectError, CryptoError, TransportError};

#[cfg(feature = "directory")]
pub use directory::{LobbyDirectory, SessionInfo, SessionKind, SessionTicket};

#[cfg(feature = "transport")]
pub use transport::{Channel, ChannelCapabilities, SendRateController};

#[cfg(feature = "traversal")]
pub use traversal::{ConnectTarget, Connector, TraversalPhase};
