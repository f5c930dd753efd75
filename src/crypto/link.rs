//! Post-handshake authenticated datagram link.
//!
//! Datagrams may be lost, duplicated, or reordered, so the link uses
//! snow's stateless transport mode with an explicit nonce carried on
//! every frame, plus a sliding anti-replay window on the receive side.

use snow::StatelessTransportState;

use crate::core::{CryptoError, AEAD_TAG_SIZE};

/// Sliding anti-replay window over explicit frame nonces.
///
/// Tracks the highest nonce seen and a 2048-bit window below it.
/// Frames older than the window or already marked are rejected.
#[derive(Debug, Clone)]
pub struct ReplayWindow {
    highest: u64,
    bits: [u64; Self::WORDS],
}

impl ReplayWindow {
    const WORDS: usize = 32;

    /// Window size in bits.
    pub const SIZE: usize = Self::WORDS * 64;

    /// Create an empty window.
    pub fn new() -> Self {
        Self {
            highest: 0,
            bits: [0; Self::WORDS],
        }
    }

    /// Check a nonce and mark it as seen.
    ///
    /// Returns `false` for duplicates and for nonces that fell out of
    /// the window.
    pub fn accept(&mut self, nonce: u64) -> bool {
        if self.highest == 0 && nonce > 0 {
            self.highest = nonce;
            return true;
        }

        if nonce > self.highest {
            self.advance((nonce - self.highest) as usize);
            self.highest = nonce;
            return true;
        }
        if nonce == self.highest {
            return false;
        }

        let offset = (self.highest - nonce) as usize;
        if offset > Self::SIZE {
            return false;
        }
        let offset = offset - 1;
        let mask = 1u64 << (offset % 64);
        let word = &mut self.bits[offset / 64];
        if *word & mask != 0 {
            return false;
        }
        *word |= mask;
        true
    }

    /// Shift the window up by `shift` positions, marking the previous
    /// highest as seen.
    fn advance(&mut self, shift: usize) {
        if shift >= Self::SIZE {
            self.bits = [0; Self::WORDS];
            return;
        }

        let words = shift / 64;
        let bits = shift % 64;

        if words > 0 {
            for i in (words..Self::WORDS).rev() {
                self.bits[i] = self.bits[i - words];
            }
            self.bits[..words].fill(0);
        }
        if bits > 0 {
            let mut carry = 0u64;
            for word in self.bits.iter_mut().rev() {
                let next_carry = *word << (64 - bits);
                *word = (*word >> bits) | carry;
                carry = next_carry;
            }
        }

        let offset = shift - 1;
        self.bits[offset / 64] |= 1u64 << (offset % 64);
    }
}

impl Default for ReplayWindow {
    fn default() -> Self {
        Self::new()
    }
}

/// Encrypted point-to-point link produced by a completed handshake.
///
/// Owned exclusively by one channel; never shared between callers.
pub struct SecureLink {
    transport: StatelessTransportState,
    send_nonce: u64,
    replay: ReplayWindow,
}

impl SecureLink {
    /// Wrap a finished handshake's transport state.
    pub(crate) fn new(transport: StatelessTransportState) -> Self {
        Self {
            transport,
            // Nonce zero is reserved so the replay window can treat it
            // as "nothing seen yet".
            send_nonce: 1,
            replay: ReplayWindow::new(),
        }
    }

    /// Encrypt a payload, returning the nonce to carry alongside the
    /// ciphertext.
    pub fn seal(&mut self, payload: &[u8]) -> Result<(u64, Vec<u8>), CryptoError> {
        let nonce = self.send_nonce;
        let mut buf = vec![0u8; payload.len() + AEAD_TAG_SIZE];
        let len = self
            .transport
            .write_message(nonce, payload, &mut buf)
            .map_err(|_| CryptoError::EncryptionFailed)?;
        buf.truncate(len);
        self.send_nonce += 1;
        Ok((nonce, buf))
    }

    /// Decrypt a frame received with the given nonce.
    pub fn open(&mut self, nonce: u64, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut buf = vec![0u8; ciphertext.len()];
        let len = self
            .transport
            .read_message(nonce, ciphertext, &mut buf)
            .map_err(|_| CryptoError::DecryptionFailed)?;
        buf.truncate(len);

        // Only mark the nonce after the tag verified, otherwise a
        // forged frame could block the real one.
        if !self.replay.accept(nonce) {
            return Err(CryptoError::ReplayDetected);
        }
        Ok(buf)
    }
}

impl std::fmt::Debug for SecureLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureLink")
            .field("send_nonce", &self.send_nonce)
            .finish_non_exhaustive()
    }
}
