//! Noise_XX handshake implementation.
//!
//! Channels are established between strangers resolved through the
//! lobby directory, so neither side knows the other's static key in
//! advance. Noise_XX exchanges both statics in-band:
//!
//! ```text
//! Noise_XX(s, rs):
//!   -> e                    # Initiator ephemeral
//!   <- e, ee, s, es         # Responder ephemeral + encrypted static
//!   -> s, se                # Initiator static, completes DH
//! ```
//!
//! After the third message both sides hold transport keys and the
//! peer's authenticated static public key.

use snow::{Builder, HandshakeState};

use super::link::SecureLink;
use super::{StaticKeypair, PUBLIC_KEY_SIZE};
use crate::core::CryptoError;

/// Noise protocol pattern used by every UDP-based channel.
pub(crate) const NOISE_PATTERN: &str = "Noise_XX_25519_ChaChaPoly_BLAKE2s";

fn build(local_keypair: &StaticKeypair, initiator: bool) -> Result<HandshakeState, CryptoError> {
    let builder = Builder::new(NOISE_PATTERN.parse().expect("valid noise pattern"))
        .local_private_key(local_keypair.private_key());
    let state = if initiator {
        builder.build_initiator()
    } else {
        builder.build_responder()
    };
    state.map_err(|e| CryptoError::HandshakeFailed(e.to_string()))
}

fn remote_static(state: &HandshakeState) -> Option<[u8; PUBLIC_KEY_SIZE]> {
    state.get_remote_static().map(|s| {
        let mut key = [0u8; PUBLIC_KEY_SIZE];
        key.copy_from_slice(s);
        key
    })
}

/// Handshake state machine for the initiator (joining client).
pub struct InitiatorHandshake {
    state: HandshakeState,
}

impl InitiatorHandshake {
    /// Create a new initiator handshake.
    pub fn new(local_keypair: &StaticKeypair) -> Result<Self, CryptoError> {
        Ok(Self {
            state: build(local_keypair, true)?,
        })
    }

    /// Generate the next outbound handshake message.
    pub fn write_message(&mut self, payload: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut buf = vec![0u8; 1024];
        let len = self
            .state
            .write_message(payload, &mut buf)
            .map_err(|e| CryptoError::HandshakeFailed(e.to_string()))?;
        buf.truncate(len);
        Ok(buf)
    }

    /// Process an inbound handshake message, returning its payload.
    pub fn read_message(&mut self, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut payload = vec![0u8; 1024];
        let len = self
            .state
            .read_message(message, &mut payload)
            .map_err(|e| CryptoError::HandshakeFailed(e.to_string()))?;
        payload.truncate(len);
        Ok(payload)
    }

    /// The responder's authenticated static key, available after the
    /// second message.
    pub fn remote_public(&self) -> Option<[u8; PUBLIC_KEY_SIZE]> {
        remote_static(&self.state)
    }

    /// Finish the handshake and produce the transport link.
    pub fn into_link(self) -> Result<SecureLink, CryptoError> {
        let transport = self
            .state
            .into_stateless_transport_mode()
            .map_err(|e| CryptoError::HandshakeFailed(e.to_string()))?;
        Ok(SecureLink::new(transport))
    }
}

/// Handshake state machine for the responder (session host).
pub struct ResponderHandshake {
    state: HandshakeState,
}

impl ResponderHandshake {
    /// Create a new responder handshake.
    pub fn new(local_keypair: &StaticKeypair) -> Result<Self, CryptoError> {
        Ok(Self {
            state: build(local_keypair, false)?,
        })
    }

    /// Process an inbound handshake message, returning its payload.
    pub fn read_message(&mut self, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut payload = vec![0u8; 1024];
        let len = self
            .state
            .read_message(message, &mut payload)
            .map_err(|e| CryptoError::HandshakeFailed(e.to_string()))?;
        payload.truncate(len);
        Ok(payload)
    }

    /// Generate the next outbound handshake message.
    pub fn write_message(&mut self, payload: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut buf = vec![0u8; 1024];
        let len = self
            .state
            .write_message(payload, &mut buf)
            .map_err(|e| CryptoError::HandshakeFailed(e.to_string()))?;
        buf.truncate(len);
        Ok(buf)
    }

    /// The initiator's authenticated static key, available after the
    /// third message.
    pub fn remote_public(&self) -> Option<[u8; PUBLIC_KEY_SIZE]> {
        remote_static(&self.state)
    }

    /// Finish the handshake and produce the transport link.
    pub fn into_link(self) -> Result<SecureLink, CryptoError> {
        let transport = self
            .state
            .into_stateless_transport_mode()
            .map_err(|e| CryptoError::HandshakeFailed(e.to_string()))?;
        Ok(SecureLink::new(transport))
    }
}
