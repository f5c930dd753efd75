//! Client-side connect sequencing.
//!
//! Resolving a join code yields a public endpoint and sometimes a LAN
//! hint; the connector turns that into an established channel. Peers on
//! the same network skip punching and connect directly; everyone else
//! goes through the punched path. If a fallback address is configured,
//! the whole sequence is retried against it once before the caller sees
//! a single failure.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, warn};

use super::{PunchConfig, Rendezvous};
use crate::core::{ConnectError, TransportError, LAN_PROBE_TIMEOUT};
use crate::crypto::StaticKeypair;
use crate::directory::SessionInfo;
use crate::transport::{
    Channel, ChannelCapabilities, DirectChannel, HandshakeConfig, PunchedChannel,
};

/// Where and how to reach one session.
#[derive(Debug, Clone)]
pub struct ConnectTarget {
    /// The session's descriptor at the rendezvous service.
    pub descriptor: String,
    /// The host's public endpoint.
    pub public_addr: SocketAddr,
    /// Same-network address, when the host advertised one.
    pub lan_hint: Option<SocketAddr>,
    /// Secondary address to retry the whole sequence against.
    pub fallback_addr: Option<SocketAddr>,
}

impl ConnectTarget {
    /// Build a target from a directory snapshot whose descriptor is an
    /// `ip:port` endpoint. Returns `None` for platform-native sessions.
    pub fn from_session(info: &SessionInfo) -> Option<Self> {
        let public_addr: SocketAddr = info.descriptor.parse().ok()?;
        Some(Self {
            descriptor: info.descriptor.clone(),
            public_addr,
            lan_hint: info.lan_hint,
            fallback_addr: None,
        })
    }

    /// Configure a fallback address.
    pub fn with_fallback(mut self, addr: SocketAddr) -> Self {
        self.fallback_addr = Some(addr);
        self
    }
}

/// Either UDP flavour of an established client channel.
pub enum ClientChannel<R: Rendezvous> {
    /// Connected without traversal.
    Direct(DirectChannel),
    /// Connected through a punched path.
    Punched(PunchedChannel<R>),
}

impl<R: Rendezvous> Channel for ClientChannel<R> {
    fn capabilities(&self) -> ChannelCapabilities {
        match self {
            Self::Direct(c) => c.capabilities(),
            Self::Punched(c) => c.capabilities(),
        }
    }

    async fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        match self {
            Self::Direct(c) => c.send(payload).await,
            Self::Punched(c) => c.send(payload).await,
        }
    }

    async fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        match self {
            Self::Direct(c) => c.recv().await,
            Self::Punched(c) => c.recv().await,
        }
    }

    async fn disconnect(&mut self) {
        match self {
            Self::Direct(c) => c.disconnect().await,
            Self::Punched(c) => c.disconnect().await,
        }
    }
}

/// Runs the connect sequence against a [`ConnectTarget`].
pub struct Connector<R: Rendezvous> {
    rendezvous: Arc<R>,
    keypair: StaticKeypair,
    punch: PunchConfig,
    handshake: HandshakeConfig,
}

impl<R: Rendezvous + 'static> Connector<R> {
    /// Create a connector with the default burst shape.
    pub fn new(rendezvous: Arc<R>, keypair: StaticKeypair) -> Self {
        Self {
            rendezvous,
            keypair,
            punch: PunchConfig::default(),
            handshake: HandshakeConfig::default(),
        }
    }

    /// Override the burst shape (tests, constrained links).
    pub fn with_punch_config(mut self, punch: PunchConfig) -> Self {
        self.punch = punch;
        self
    }

    /// Override the handshake retry policy.
    pub fn with_handshake_config(mut self, handshake: HandshakeConfig) -> Self {
        self.handshake = handshake;
        self
    }

    /// Establish a channel to the target session.
    ///
    /// Strategy failures along the way are logged, not surfaced; the
    /// caller sees one [`ConnectError::Exhausted`] only after every
    /// strategy is spent.
    pub async fn connect(&self, target: &ConnectTarget) -> Result<ClientChannel<R>, ConnectError> {
        let first = match self
            .attempt(&target.descriptor, target.public_addr, target.lan_hint)
            .await
        {
            Ok(channel) => return Ok(channel),
            Err(e) => e,
        };

        let Some(fallback) = target.fallback_addr else {
            return Err(ConnectError::Exhausted { last: first });
        };

        warn!(
            primary = %target.public_addr,
            %fallback,
            error = %first,
            "primary connect failed, retrying against fallback"
        );
        self.attempt(&target.descriptor, fallback, None)
            .await
            .map_err(|last| ConnectError::Exhausted { last })
    }

    async fn attempt(
        &self,
        descriptor: &str,
        public_addr: SocketAddr,
        lan_hint: Option<SocketAddr>,
    ) -> Result<ClientChannel<R>, TransportError> {
        if let Some(lan) = lan_hint {
            let mut channel = DirectChannel::new(self.keypair.clone())
                .with_handshake_config(self.handshake);
            // The probe is bounded: a silent LAN hint must not stall
            // the sequence for the full retry schedule.
            match tokio::time::timeout(LAN_PROBE_TIMEOUT, channel.connect(lan)).await {
                Ok(Ok(())) => {
                    debug!(%lan, "connected directly over the local network");
                    return Ok(ClientChannel::Direct(channel));
                }
                Ok(Err(e)) => {
                    debug!(%lan, error = %e, "local attempt failed, falling back to punch");
                }
                Err(_elapsed) => {
                    debug!(%lan, "local attempt timed out, falling back to punch");
                }
            }
        }

        let mut channel =
            PunchedChannel::new(self.keypair.clone(), self.rendezvous.clone(), descriptor)
                .with_punch_config(self.punch)
                .with_handshake_config(self.handshake);
        channel.connect(public_addr).await?;
        Ok(ClientChannel::Punched(channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{LobbyDirectory, SessionKind};
    use crate::transport::HostEndpoint;
    use crate::traversal::spawn_join_responder;
    use std::time::Duration;

    fn loopback() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 0))
    }

    fn test_punch() -> PunchConfig {
        PunchConfig {
            packets: 2,
            spacing: Duration::from_millis(2),
        }
    }

    fn test_handshake() -> HandshakeConfig {
        HandshakeConfig {
            timeout: Duration::from_millis(200),
            retries: 2,
            backoff: 2,
        }
    }

    fn test_connector(directory: &Arc<LobbyDirectory>) -> Connector<LobbyDirectory> {
        Connector::new(directory.clone(), StaticKeypair::generate())
            .with_punch_config(test_punch())
            .with_handshake_config(test_handshake())
    }

    async fn hosted_session(
        directory: &Arc<LobbyDirectory>,
    ) -> (HostEndpoint, SocketAddr, String, tokio::task::JoinHandle<()>) {
        let host = HostEndpoint::bind(loopback(), StaticKeypair::generate())
            .await
            .unwrap();
        let addr = host.local_addr().unwrap();
        let ticket = directory
            .create(&addr.to_string(), "Hosted", SessionKind::Direct, None, true)
            .await;
        let responder = spawn_join_responder(
            directory.clone(),
            ticket.host_key.clone(),
            host.socket(),
            test_punch(),
        );
        (host, addr, addr.to_string(), responder)
    }

    #[tokio::test]
    async fn test_lan_hint_connects_directly() {
        let directory = Arc::new(LobbyDirectory::new());
        let (mut host, addr, descriptor, responder) = hosted_session(&directory).await;

        let connector = test_connector(&directory);
        let target = ConnectTarget {
            descriptor,
            public_addr: "203.0.113.1:9".parse().unwrap(),
            lan_hint: Some(addr),
            fallback_addr: None,
        };

        let (accepted, connected) = tokio::join!(host.accept(), connector.connect(&target));
        let mut channel = connected.unwrap();
        assert!(matches!(channel, ClientChannel::Direct(_)));

        let mut server_side = accepted.unwrap();
        channel.send(b"over the lan").await.unwrap();
        assert_eq!(server_side.recv().await.unwrap(), b"over the lan");
        responder.abort();
    }

    #[tokio::test]
    async fn test_remote_peer_goes_through_punch() {
        let directory = Arc::new(LobbyDirectory::new());
        let (mut host, addr, descriptor, responder) = hosted_session(&directory).await;

        let connector = test_connector(&directory);
        let target = ConnectTarget {
            descriptor,
            public_addr: addr,
            lan_hint: None,
            fallback_addr: None,
        };

        let (accepted, connected) = tokio::join!(host.accept(), connector.connect(&target));
        let channel = connected.unwrap();
        assert!(matches!(channel, ClientChannel::Punched(_)));
        assert!(accepted.is_ok());
        responder.abort();
    }

    #[tokio::test]
    async fn test_dead_lan_hint_falls_back_to_punch() {
        let directory = Arc::new(LobbyDirectory::new());
        let (mut host, addr, descriptor, responder) = hosted_session(&directory).await;

        let connector = test_connector(&directory);
        // The LAN hint points at a dead port; the handshake there will
        // time out before the punched path succeeds.
        let target = ConnectTarget {
            descriptor,
            public_addr: addr,
            lan_hint: Some("127.0.0.1:9".parse().unwrap()),
            fallback_addr: None,
        };

        let (accepted, connected) = tokio::join!(host.accept(), connector.connect(&target));
        let channel = connected.unwrap();
        assert!(matches!(channel, ClientChannel::Punched(_)));
        assert!(accepted.is_ok());
        responder.abort();
    }

    #[tokio::test]
    async fn test_fallback_address_retried_once() {
        let directory = Arc::new(LobbyDirectory::new());
        let (mut host, addr, _descriptor, responder) = hosted_session(&directory).await;

        // Primary address is unreachable; the fallback is the real host.
        let dead: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let connector = test_connector(&directory);
        let target = ConnectTarget {
            descriptor: addr.to_string(),
            public_addr: dead,
            lan_hint: None,
            fallback_addr: Some(addr),
        };

        let (accepted, connected) = tokio::join!(host.accept(), connector.connect(&target));
        let channel = connected.unwrap();
        assert!(matches!(channel, ClientChannel::Punched(_)));
        assert!(accepted.is_ok());
        responder.abort();
    }

    #[tokio::test]
    async fn test_exhausted_after_all_strategies() {
        let directory = Arc::new(LobbyDirectory::new());
        // No session registered at all: the punched path is rejected by
        // rendezvous immediately, with no fallback to try.
        let connector = Connector::new(directory, StaticKeypair::generate())
            .with_punch_config(test_punch())
            .with_handshake_config(test_handshake());
        let target = ConnectTarget {
            descriptor: "192.0.2.1:9000".to_string(),
            public_addr: "127.0.0.1:9".parse().unwrap(),
            lan_hint: None,
            fallback_addr: None,
        };

        let err = connector.connect(&target).await;
        assert!(matches!(err, Err(ConnectError::Exhausted { .. })));
    }
}
