//! Transport capability model and the concrete encrypted channels.
//!
//! Every channel exposes [`ChannelCapabilities`] describing which
//! services (congestion control, reliability, sequencing) the
//! application must still provide on top, plus the largest payload the
//! channel can carry. Upper layers branch on these flags rather than on
//! channel type, so adding a transport changes nothing above this
//! layer.

mod congestion;
mod relay;
mod udp;

#[cfg(feature = "traversal")]
mod punched;

pub use congestion::SendRateController;
pub use relay::{RelayChannel, RelayLink};
pub use udp::{DirectChannel, HandshakeConfig, HostChannel, HostEndpoint};

#[cfg(feature = "traversal")]
pub(crate) use udp::{initiate_handshake, is_transient, suppress_icmp_resets, EncryptedUdp};

#[cfg(feature = "traversal")]
pub use punched::PunchedChannel;

use crate::core::{TransportError, MAX_DATAGRAM_PAYLOAD};

/// Per-channel description of the services the application layer must
/// attach. Set once at construction and immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelCapabilities {
    /// The application must pace its own sends.
    pub needs_congestion_control: bool,
    /// The application must run its own retransmission.
    pub needs_reliability: bool,
    /// The application must sequence inbound messages itself.
    pub needs_sequencing: bool,
    /// Largest payload a single send may carry.
    pub max_payload: usize,
}

impl ChannelCapabilities {
    /// Capabilities of a raw encrypted UDP channel: the application
    /// supplies everything.
    pub const fn udp() -> Self {
        Self {
            needs_congestion_control: true,
            needs_reliability: true,
            needs_sequencing: true,
            max_payload: MAX_DATAGRAM_PAYLOAD,
        }
    }

    /// Capabilities of a platform relay that already delivers ordered
    /// and reliable messages.
    pub const fn relay(max_payload: usize) -> Self {
        Self {
            needs_congestion_control: false,
            needs_reliability: false,
            needs_sequencing: false,
            max_payload,
        }
    }
}

/// An established encrypted point-to-point channel.
///
/// Datagram-shaped, not stream-shaped: each send is delivered (or
/// lost) whole. Establishment is specific to each concrete transport
/// (plain connect, punch-then-connect, platform session), so only the
/// post-establishment surface lives on the trait.
#[allow(async_fn_in_trait)]
pub trait Channel {
    /// The services this channel expects the application to provide.
    fn capabilities(&self) -> ChannelCapabilities;

    /// Send one datagram to the peer.
    async fn send(&mut self, payload: &[u8]) -> Result<(), TransportError>;

    /// Receive the next datagram from the peer.
    async fn recv(&mut self) -> Result<Vec<u8>, TransportError>;

    /// Tear down the channel and release its socket or session.
    /// Idempotent.
    async fn disconnect(&mut self);
}
