//! Protocol constants.
//!
//! Wire-level values are fixed for interoperability with deployed peers
//! and MUST NOT be changed.

use std::time::Duration;

// =============================================================================
// RENDEZVOUS / DIRECTORY
// =============================================================================

/// A session is live while its last heartbeat is younger than this.
pub const SESSION_LIVENESS_TIMEOUT: Duration = Duration::from_secs(60);

/// Cadence of the background sweep that removes expired sessions.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Cadence at which a host polls its pending-join queue.
pub const JOIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Join code length in symbols.
pub const JOIN_CODE_LENGTH: usize = 6;

/// Join code alphabet (uppercase alphanumeric, human-typeable).
pub const JOIN_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Host credential length in symbols.
pub const HOST_KEY_LENGTH: usize = 32;

/// Host credential alphabet (lowercase alphanumeric).
pub const HOST_KEY_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Attempts at generating a unique session name before giving up.
pub const NAME_GENERATE_ATTEMPTS: usize = 100;

/// Name returned after all generation attempts collide. Never reserved.
pub const FALLBACK_SESSION_NAME: &str = "LostLlamaWandersAlone";

// =============================================================================
// NAT TRAVERSAL
// =============================================================================

/// Marker payload sent to open a NAT mapping.
pub const PUNCH_MARKER: &[u8] = b"PUNCH";

/// Number of marker packets per punch burst.
pub const PUNCH_BURST_COUNT: u32 = 100;

/// Spacing between marker packets within a burst.
pub const PUNCH_SPACING: Duration = Duration::from_millis(50);

/// Upper bound on the direct probe of a LAN hint before the connect
/// sequence falls back to punching.
pub const LAN_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

// =============================================================================
// TRANSPORT
// =============================================================================

/// Maximum payload for UDP-based channels (stays under path MTU after
/// encryption overhead).
pub const MAX_DATAGRAM_PAYLOAD: usize = 1200;

/// First handshake message (initiator ephemeral).
pub const FRAME_TYPE_HANDSHAKE_1: u8 = 0x01;

/// Second handshake message (responder ephemeral + static).
pub const FRAME_TYPE_HANDSHAKE_2: u8 = 0x02;

/// Third handshake message (initiator static, completes the exchange).
pub const FRAME_TYPE_HANDSHAKE_3: u8 = 0x03;

/// Encrypted data frame.
pub const FRAME_TYPE_DATA: u8 = 0x04;

/// Data frame header size (type + explicit nonce).
pub const DATA_FRAME_HEADER_SIZE: usize = 9;

/// Poly1305 authentication tag size.
pub const AEAD_TAG_SIZE: usize = 16;

/// Handshake timeout (initial, doubled per retry).
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Maximum handshake retries.
pub const HANDSHAKE_MAX_RETRIES: u32 = 5;

/// Handshake backoff multiplier.
pub const HANDSHAKE_BACKOFF: u32 = 2;

// =============================================================================
// CONGESTION CONTROL
// =============================================================================

/// Send interval while the channel is healthy.
pub const FAST_SEND_INTERVAL: Duration = Duration::from_millis(17);

/// Send interval while the channel is congested.
pub const SLOW_SEND_INTERVAL: Duration = Duration::from_millis(50);

/// Smoothed RTT above this counts as congestion.
pub const CONGESTION_RTT_THRESHOLD: Duration = Duration::from_millis(500);

/// Initial mode-switch threshold.
pub const SWITCH_THRESHOLD_INITIAL: Duration = Duration::from_secs(10);

/// Lower bound on the mode-switch threshold.
pub const SWITCH_THRESHOLD_MIN: Duration = Duration::from_secs(1);

/// Upper bound on the mode-switch threshold.
pub const SWITCH_THRESHOLD_MAX: Duration = Duration::from_secs(60);

/// A healthy stint shorter than this counts as flapping.
pub const MIN_STABLE_TIME: Duration = Duration::from_secs(10);
