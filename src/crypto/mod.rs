//! Pluggable cryptographic providers: AEAD, CBC fallback, and hybrid
//! post-quantum KEM + AEAD envelopes.

mod aead;
mod hybrid;

pub use aead::{AesCbcProvider, AesGcmProvider};
pub use hybrid::{HybridKemProvider, KemMode};

use crate::error::{ErrorKind, Result};

/// Length, in bytes, of a symmetric key consumed by every provider here.
pub const KEY_LEN: usize = 32;

/// Polymorphic contract over the capability set `{encrypt, decrypt}`.
///
/// Implementations are stateless after construction (any RNG used is drawn
/// fresh per call) and may be invoked concurrently: every method takes `&self`.
pub trait CryptoProvider: Send + Sync {
    /// Encrypts `plaintext` under `key`, returning a self-delimiting ciphertext
    /// (the exact framing — nonce/IV placement, tag placement — is provider
    /// specific, see [`AesGcmProvider`] and [`AesCbcProvider`]).
    fn encrypt(&self, key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Inverse of [`CryptoProvider::encrypt`]. Returns [`ErrorKind::IoError`]
    /// on authentication failure (AEAD) or malformed framing.
    fn decrypt(&self, key: &[u8; KEY_LEN], ciphertext: &[u8]) -> Result<Vec<u8>>;
}

/// Key-encapsulation-mechanism capability exposed by hybrid providers.
pub trait KeyEncapsulation {
    /// Generates a fresh `(public, private)` key pair as opaque byte sequences.
    fn generate_keypair(&self) -> Result<(Vec<u8>, Vec<u8>)>;
}

pub(crate) fn require_key_len(key: &[u8]) -> Result<()> {
    if key.len() != KEY_LEN {
        return Err(ErrorKind::InvalidArgument);
    }
    Ok(())
}
