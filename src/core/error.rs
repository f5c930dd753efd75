//! Error types for the MUSTER protocol.

use thiserror::Error;

/// Errors in the crypto layer.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Handshake failed.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// AEAD encryption failed.
    #[error("AEAD encryption failed")]
    EncryptionFailed,

    /// AEAD decryption failed (invalid tag or corrupted).
    #[error("AEAD decryption failed (invalid tag or corrupted)")]
    DecryptionFailed,

    /// Replay detected.
    #[error("replay detected")]
    ReplayDetected,
}

/// Errors in the transport layer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Crypto error.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Operation on a channel that has not been connected.
    #[error("channel not connected")]
    NotConnected,

    /// Payload exceeds the channel's maximum.
    #[error("payload too large: {len} bytes (max {max})")]
    PayloadTooLarge {
        /// Offered payload size.
        len: usize,
        /// Channel maximum.
        max: usize,
    },

    /// Handshake gave up after exhausting retries.
    #[error("handshake timed out")]
    HandshakeTimeout,

    /// The rendezvous service rejected the join registration.
    #[error("rendezvous rejected join registration")]
    JoinRejected,

    /// The channel or its endpoint was shut down.
    #[error("channel closed")]
    Closed,
}

/// Errors surfaced to a connecting client.
///
/// Individual strategy failures are not reported piecemeal; the caller
/// sees one failure once every strategy is spent.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// Every configured strategy (direct, punched, fallback) failed.
    #[error("all connection strategies exhausted: {last}")]
    Exhausted {
        /// Failure of the final strategy attempted.
        #[source]
        last: TransportError,
    },
}
