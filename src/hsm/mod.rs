//! Hardware security module abstraction and its always-available software fallback.

mod software;

pub use software::SoftwareHsm;

use crate::crypto::KEY_LEN;
use crate::error::Result;

/// Length, in bytes, of every integrity digest produced by an [`Hsm`].
pub const HASH_LEN: usize = 32;

/// Abstract hardware security module contract.
///
/// The engine only ever calls [`Hsm::calculate_integrity_hash`] and
/// [`Hsm::verify_integrity`] on the hot path (§4.4); `encrypt`/`decrypt`/
/// `generate_key` exist so a hardware-backed implementation has a complete
/// contract to fulfil, and are exercised directly by the factory's
/// hardware-backed security level and by tests.
pub trait Hsm: Send + Sync {
    /// Whether this HSM implementation is usable in the current environment.
    fn is_available(&self) -> bool;

    /// Computes a [`HASH_LEN`]-byte integrity digest over `data`.
    fn calculate_integrity_hash(&self, data: &[u8]) -> Result<[u8; HASH_LEN]>;

    /// Byte-wise compares `expected` against the digest of `data`.
    fn verify_integrity(&self, data: &[u8], expected: &[u8]) -> Result<bool>;

    /// Generates a fresh symmetric key.
    fn generate_key(&self) -> Result<[u8; KEY_LEN]>;

    /// Encrypts `plaintext` under a key owned by the HSM implementation.
    fn encrypt(&self, key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Inverse of [`Hsm::encrypt`].
    fn decrypt(&self, key: &[u8; KEY_LEN], ciphertext: &[u8]) -> Result<Vec<u8>>;
}
