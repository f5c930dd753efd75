//! Security layer: static identities, Noise handshake, and the
//! authenticated datagram link used by every UDP-based channel.

mod keys;
mod link;
mod noise;

pub use keys::StaticKeypair;
pub use link::{ReplayWindow, SecureLink};
pub use noise::{InitiatorHandshake, ResponderHandshake};

/// X25519 public key size.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// X25519 private key size.
pub const PRIVATE_KEY_SIZE: usize = 32;
