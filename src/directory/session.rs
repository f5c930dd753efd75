//! Session records tracked by the lobby directory.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::str::FromStr;

use tokio::time::Instant;

use crate::core::SESSION_LIVENESS_TIMEOUT;

/// How a session is reached, and therefore how joins are negotiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// Hosted through the platform's native lobby flow. The platform
    /// handles discovery, so no join code is issued.
    Platform,
    /// Direct-connect session reached over UDP.
    Direct,
}

impl SessionKind {
    /// Parse a kind tag, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "platform" => Some(Self::Platform),
            "direct" => Some(Self::Direct),
            _ => None,
        }
    }
}

impl FromStr for SessionKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or(())
    }
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Platform => write!(f, "platform"),
            Self::Direct => write!(f, "direct"),
        }
    }
}

/// A join request waiting for the host to punch back.
///
/// Held only in memory; drained by the host's traversal logic.
#[derive(Debug, Clone)]
pub struct PendingJoin {
    /// The joiner's observed public endpoint.
    pub addr: SocketAddr,
    /// When the joiner asked.
    pub requested_at: Instant,
}

/// A live session owned by the directory.
#[derive(Debug, Clone)]
pub(crate) struct Session {
    pub descriptor: String,
    pub name: String,
    pub kind: SessionKind,
    pub host_key: String,
    pub join_code: Option<String>,
    pub public: bool,
    pub lan_hint: Option<SocketAddr>,
    pub last_heartbeat: Instant,
    pub pending_joins: VecDeque<PendingJoin>,
}

impl Session {
    /// Liveness is computed from the heartbeat age, never cached.
    pub fn is_live(&self, now: Instant) -> bool {
        now.duration_since(self.last_heartbeat) < SESSION_LIVENESS_TIMEOUT
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_heartbeat = now;
    }

    pub fn snapshot(&self) -> SessionInfo {
        SessionInfo {
            descriptor: self.descriptor.clone(),
            name: self.name.clone(),
            kind: self.kind,
            join_code: self.join_code.clone(),
            public: self.public,
            lan_hint: self.lan_hint,
        }
    }
}

/// Read-only snapshot of a session, safe to hand to browsing clients.
///
/// Deliberately omits the host credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Connection descriptor (platform lobby id or `ip:port`).
    pub descriptor: String,
    /// Display name, unique among live sessions.
    pub name: String,
    /// Session kind.
    pub kind: SessionKind,
    /// Join code, if the transport has no native join flow.
    pub join_code: Option<String>,
    /// Whether the session shows up in public listings.
    pub public: bool,
    /// Optional local-network address hint.
    pub lan_hint: Option<SocketAddr>,
}

/// Credentials returned to the host that created a session.
#[derive(Debug, Clone)]
pub struct SessionTicket {
    /// The display name actually assigned (may differ from the one
    /// requested if it was taken).
    pub name: String,
    /// Secret credential authorizing heartbeat and removal.
    pub host_key: String,
    /// Join code, absent for platform-native sessions.
    pub join_code: Option<String>,
}
