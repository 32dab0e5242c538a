//! Software fallback for [`super::Hsm`], always available regardless of platform.

use rand::rngs::OsRng;
use rand::RngCore;

use super::{Hsm, HASH_LEN};
use crate::crypto::{AesGcmProvider, CryptoProvider, KEY_LEN};
use crate::error::Result;

/// BLAKE3-backed software HSM. Used as the default in [`crate::factory::Factory`]
/// and by the engine whenever no hardware-backed implementation is configured.
#[derive(Default)]
pub struct SoftwareHsm {
    aead: AesGcmProvider,
}

impl SoftwareHsm {
    pub fn new() -> Self {
        Self { aead: AesGcmProvider::new() }
    }
}

impl Hsm for SoftwareHsm {
    fn is_available(&self) -> bool {
        true
    }

    fn calculate_integrity_hash(&self, data: &[u8]) -> Result<[u8; HASH_LEN]> {
        Ok(*blake3::hash(data).as_bytes())
    }

    fn verify_integrity(&self, data: &[u8], expected: &[u8]) -> Result<bool> {
        let actual = self.calculate_integrity_hash(data)?;
        Ok(constant_time_eq(&actual, expected))
    }

    fn generate_key(&self) -> Result<[u8; KEY_LEN]> {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Ok(key)
    }

    fn encrypt(&self, key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<Vec<u8>> {
        self.aead.encrypt(key, plaintext)
    }

    fn decrypt(&self, key: &[u8; KEY_LEN], ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.aead.decrypt(key, ciphertext)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_matches_blake3_reference() {
        let hsm = SoftwareHsm::new();
        let data = b"Hello, Virtual File System!";
        let hash = hsm.calculate_integrity_hash(data).unwrap();
        assert_eq!(hash, *blake3::hash(data).as_bytes());
    }

    #[test]
    fn verify_integrity_detects_mismatch() {
        let hsm = SoftwareHsm::new();
        let hash = hsm.calculate_integrity_hash(b"payload").unwrap();
        assert!(hsm.verify_integrity(b"payload", &hash).unwrap());
        assert!(!hsm.verify_integrity(b"tampered", &hash).unwrap());
    }

    #[test]
    fn generate_key_and_round_trip_encrypt() {
        let hsm = SoftwareHsm::new();
        let key = hsm.generate_key().unwrap();
        let ciphertext = hsm.encrypt(&key, b"secret").unwrap();
        assert_eq!(hsm.decrypt(&key, &ciphertext).unwrap(), b"secret");
    }
}
