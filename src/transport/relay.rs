//! Platform relay channel.
//!
//! The platform SDK owns transport, encryption, and delivery for relay
//! sessions; this crate only defines the boundary ([`RelayLink`]) and
//! adapts whatever sits behind it to the capability surface. Relay
//! links typically deliver ordered reliable messages, so their channels
//! report that no extra services are needed.

use tracing::debug;

use super::{Channel, ChannelCapabilities};
use crate::core::TransportError;

/// The platform SDK boundary for one relay session.
///
/// The peer is fixed when the platform session is created; the SDK
/// wrapper implements this for its own session handle.
#[allow(async_fn_in_trait)]
pub trait RelayLink: Send {
    /// Largest message the relay will carry.
    fn max_payload(&self) -> usize;

    /// Whether the relay still requires application-side congestion
    /// control, reliability, or sequencing. Platform relays normally
    /// provide all three, so the default says none are needed.
    fn capabilities(&self) -> ChannelCapabilities {
        ChannelCapabilities::relay(self.max_payload())
    }

    /// Open the session toward its fixed peer.
    async fn open(&mut self) -> std::io::Result<()>;

    /// Send one message.
    async fn send(&mut self, payload: &[u8]) -> std::io::Result<()>;

    /// Receive the next message.
    async fn recv(&mut self) -> std::io::Result<Vec<u8>>;

    /// Close the session. Idempotent.
    async fn close(&mut self);
}

/// Adapter presenting a [`RelayLink`] as a [`Channel`].
pub struct RelayChannel<L: RelayLink> {
    link: L,
    caps: ChannelCapabilities,
    connected: bool,
}

impl<L: RelayLink> RelayChannel<L> {
    /// Wrap a platform session. Performs no I/O.
    pub fn new(link: L) -> Self {
        let caps = link.capabilities();
        Self {
            link,
            caps,
            connected: false,
        }
    }

    /// Open the underlying platform session.
    ///
    /// The peer is addressed by the platform session fixed at
    /// construction; no socket address is involved.
    pub async fn connect(&mut self) -> Result<(), TransportError> {
        self.link.open().await?;
        self.connected = true;
        debug!("relay session open");
        Ok(())
    }
}

impl<L: RelayLink> Channel for RelayChannel<L> {
    fn capabilities(&self) -> ChannelCapabilities {
        self.caps
    }

    async fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        if payload.len() > self.caps.max_payload {
            return Err(TransportError::PayloadTooLarge {
                len: payload.len(),
                max: self.caps.max_payload,
            });
        }
        self.link.send(payload).await.map_err(Into::into)
    }

    async fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        self.link.recv().await.map_err(Into::into)
    }

    async fn disconnect(&mut self) {
        if self.connected {
            self.link.close().await;
            self.connected = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    /// In-memory stand-in for a platform relay session.
    struct LoopbackRelay {
        tx: mpsc::UnboundedSender<Vec<u8>>,
        rx: mpsc::UnboundedReceiver<Vec<u8>>,
        max_payload: usize,
    }

    fn relay_pair(max_payload: usize) -> (LoopbackRelay, LoopbackRelay) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (
            LoopbackRelay {
                tx: a_tx,
                rx: a_rx,
                max_payload,
            },
            LoopbackRelay {
                tx: b_tx,
                rx: b_rx,
                max_payload,
            },
        )
    }

    impl RelayLink for LoopbackRelay {
        fn max_payload(&self) -> usize {
            self.max_payload
        }

        async fn open(&mut self) -> std::io::Result<()> {
            Ok(())
        }

        async fn send(&mut self, payload: &[u8]) -> std::io::Result<()> {
            self.tx
                .send(payload.to_vec())
                .map_err(|_| std::io::Error::from(std::io::ErrorKind::BrokenPipe))
        }

        async fn recv(&mut self) -> std::io::Result<Vec<u8>> {
            self.rx
                .recv()
                .await
                .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::BrokenPipe))
        }

        async fn close(&mut self) {}
    }

    #[tokio::test]
    async fn test_relay_reports_sdk_capabilities() {
        let (link, _peer) = relay_pair(512 * 1024);
        let channel = RelayChannel::new(link);
        let caps = channel.capabilities();
        assert!(!caps.needs_congestion_control);
        assert!(!caps.needs_reliability);
        assert!(!caps.needs_sequencing);
        assert_eq!(caps.max_payload, 512 * 1024);
    }

    #[tokio::test]
    async fn test_relay_roundtrip() {
        let (a, b) = relay_pair(1024);
        let mut left = RelayChannel::new(a);
        let mut right = RelayChannel::new(b);
        left.connect().await.unwrap();
        right.connect().await.unwrap();

        left.send(b"through the relay").await.unwrap();
        assert_eq!(right.recv().await.unwrap(), b"through the relay");
    }

    #[tokio::test]
    async fn test_relay_requires_connect() {
        let (a, _b) = relay_pair(1024);
        let mut channel = RelayChannel::new(a);
        assert!(matches!(
            channel.send(b"x").await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_relay_honors_payload_limit() {
        let (a, _b) = relay_pair(8);
        let mut channel = RelayChannel::new(a);
        channel.connect().await.unwrap();
        assert!(matches!(
            channel.send(&[0u8; 9]).await,
            Err(TransportError::PayloadTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_relay_disconnect_idempotent() {
        let (a, _b) = relay_pair(1024);
        let mut channel = RelayChannel::new(a);
        channel.connect().await.unwrap();
        channel.disconnect().await;
        channel.disconnect().await;
        assert!(matches!(
            channel.recv().await,
            Err(TransportError::NotConnected)
        ));
    }

    /// The capability-model point: upper layers pick machinery by
    /// flags, not by channel type.
    #[tokio::test]
    async fn test_upper_layer_branches_on_capabilities() {
        fn wants_pacing<C: Channel>(channel: &C) -> bool {
            channel.capabilities().needs_congestion_control
        }

        let (a, _b) = relay_pair(1024);
        let relay = RelayChannel::new(a);
        assert!(!wants_pacing(&relay));

        let direct = crate::transport::DirectChannel::new(
            crate::crypto::StaticKeypair::generate(),
        );
        assert!(wants_pacing(&direct));
    }
}
