//! NAT-punched encrypted UDP channel.
//!
//! Same wire behavior as [`DirectChannel`](super::DirectChannel) once
//! established; the difference is the preamble. Connect registers the
//! joiner's observed endpoint with the rendezvous service, sends the
//! marker burst to open a mapping, and only then runs the handshake,
//! all on the one socket so the mapping stays warm.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tracing::debug;

use super::{Channel, ChannelCapabilities, EncryptedUdp, HandshakeConfig};
use crate::core::TransportError;
use crate::crypto::StaticKeypair;
use crate::traversal::{punch_burst, PunchConfig, Rendezvous, TraversalPhase};

/// Encrypted UDP channel reached through a hole-punched path.
pub struct PunchedChannel<R: Rendezvous> {
    keypair: StaticKeypair,
    rendezvous: Arc<R>,
    descriptor: String,
    punch: PunchConfig,
    handshake: HandshakeConfig,
    phase: TraversalPhase,
    io: Option<EncryptedUdp>,
    caps: ChannelCapabilities,
}

impl<R: Rendezvous> PunchedChannel<R> {
    /// Create an unconnected channel. Performs no I/O.
    ///
    /// `descriptor` names the target session at the rendezvous service.
    pub fn new(
        keypair: StaticKeypair,
        rendezvous: Arc<R>,
        descriptor: impl Into<String>,
    ) -> Self {
        Self {
            keypair,
            rendezvous,
            descriptor: descriptor.into(),
            punch: PunchConfig::default(),
            handshake: HandshakeConfig::default(),
            phase: TraversalPhase::Idle,
            io: None,
            caps: ChannelCapabilities::udp(),
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

    /// Current traversal phase.
    pub fn phase(&self) -> TraversalPhase {
        self.phase
    }

    /// Open a path to the host's public endpoint and handshake over it.
    ///
    /// Blocks for the punch burst's full duration plus the handshake.
    /// Dropping the returned future mid-sequence releases the socket;
    /// no partial state remains.
    pub async fn connect(&mut self, remote: SocketAddr) -> Result<(), TransportError> {
        self.phase = TraversalPhase::Idle;

        // The socket stays local until the handshake finishes so a
        // cancelled connect cannot leave it behind.
        let socket = UdpSocket::bind((std::net::Ipv4Addr::UNSPECIFIED, 0)).await?;
        super::suppress_icmp_resets(&socket);
        let observed = socket.local_addr()?;

        if !self
            .rendezvous
            .register_join(&self.descriptor, observed)
            .await
        {
            return Err(TransportError::JoinRejected);
        }

        self.phase = TraversalPhase::Punching;
        debug!(%remote, descriptor = %self.descriptor, "punching toward host");
        if let Err(e) = punch_burst(&socket, remote, &self.punch).await {
            self.phase = TraversalPhase::Idle;
            return Err(e.into());
        }

        let handshake =
            super::initiate_handshake(&socket, remote, &self.keypair, &self.handshake).await;
        let link = match handshake {
            Ok(link) => link,
            Err(e) => {
                self.phase = TraversalPhase::Idle;
                return Err(e);
            }
        };

        self.io = Some(EncryptedUdp::new(socket, remote, link));
        self.phase = TraversalPhase::Established;
        Ok(())
    }
}

impl<R: Rendezvous> Channel for PunchedChannel<R> {
    fn capabilities(&self) -> ChannelCapabilities {
        self.caps
    }

    async fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let max = self.caps.max_payload;
        match &mut self.io {
            Some(io) => io.send(payload, max).await,
            None => Err(TransportError::NotConnected),
        }
    }

    async fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        match &mut self.io {
            Some(io) => io.recv().await,
            None => Err(TransportError::NotConnected),
        }
    }

    async fn disconnect(&mut self) {
        self.io = None;
        self.phase = TraversalPhase::Idle;
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
            packets: 3,
            spacing: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn test_punched_connect_end_to_end() {
        let directory = Arc::new(LobbyDirectory::new());
        let descriptor = "203.0.113.9:9000";
        let ticket = directory
            .create(descriptor, "PunchedGame", SessionKind::Direct, None, true)
            .await;

        let mut host = HostEndpoint::bind(loopback(), StaticKeypair::generate())
            .await
            .unwrap();
        let host_addr = host.local_addr().unwrap();
        let responder = spawn_join_responder(
            directory.clone(),
            ticket.host_key.clone(),
            host.socket(),
            test_punch(),
        );

        let mut client =
            PunchedChannel::new(StaticKeypair::generate(), directory.clone(), descriptor)
                .with_punch_config(test_punch());
        assert_eq!(client.phase(), TraversalPhase::Idle);

        let (accepted, connected) = tokio::join!(host.accept(), client.connect(host_addr));
        connected.unwrap();
        let mut server_side = accepted.unwrap();
        assert_eq!(client.phase(), TraversalPhase::Established);

        client.send(b"joined through the wall").await.unwrap();
        assert_eq!(
            server_side.recv().await.unwrap(),
            b"joined through the wall"
        );
        server_side.send(b"welcome in").await.unwrap();
        assert_eq!(client.recv().await.unwrap(), b"welcome in");

        responder.abort();
    }

    #[tokio::test]
    async fn test_connect_fails_for_unknown_session() {
        let directory = Arc::new(LobbyDirectory::new());
        let mut client = PunchedChannel::new(
            StaticKeypair::generate(),
            directory,
            "198.51.100.1:9000",
        )
        .with_punch_config(test_punch());

        let err = client.connect("127.0.0.1:9".parse().unwrap()).await;
        assert!(matches!(err, Err(TransportError::JoinRejected)));
        assert_eq!(client.phase(), TraversalPhase::Idle);
    }
}
