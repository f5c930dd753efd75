//! X25519 key management.

use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

use super::noise::NOISE_PATTERN;
use super::{PRIVATE_KEY_SIZE, PUBLIC_KEY_SIZE};

/// A static X25519 keypair identifying one endpoint of a channel.
///
/// The private key is zeroized on drop.
#[derive(Clone)]
pub struct StaticKeypair {
    /// Private key (32 bytes), zeroized on drop.
    private: [u8; PRIVATE_KEY_SIZE],
    /// Public key (32 bytes).
    public: [u8; PUBLIC_KEY_SIZE],
}

impl StaticKeypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        // snow generates key material matching the handshake pattern.
        let builder = snow::Builder::new(NOISE_PATTERN.parse().expect("valid noise pattern"));
        let keypair = builder.generate_keypair().expect("keypair generation");

        let mut private = [0u8; PRIVATE_KEY_SIZE];
        let mut public = [0u8; PUBLIC_KEY_SIZE];
        private.copy_from_slice(&keypair.private);
        public.copy_from_slice(&keypair.public);

        Self { private, public }
    }

    /// Rebuild a keypair from a stored private key, recomputing the
    /// public half.
    pub fn from_private(private: [u8; PRIVATE_KEY_SIZE]) -> Self {
        let secret = StaticSecret::from(private);
        let public = PublicKey::from(&secret);
        Self {
            private,
            public: *public.as_bytes(),
        }
    }

    /// Get the public key.
    pub fn public_key(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.public
    }

    /// Get the private key.
    ///
    /// # Security
    /// Handle with care, this exposes sensitive key material.
    pub fn private_key(&self) -> &[u8; PRIVATE_KEY_SIZE] {
        &self.private
    }
}

impl Drop for StaticKeypair {
    fn drop(&mut self) {
        self.private.zeroize();
    }
}

impl std::fmt::Debug for StaticKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the private half.
        f.debug_struct("StaticKeypair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}
