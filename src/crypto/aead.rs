//! AES-256-GCM (AEAD) and AES-256-CBC (confidentiality-only fallback) providers.

use aes::Aes256;
use aes_gcm::aead::{Aead, KeyInit as AeadKeyInit};
use aes_gcm::{Aes256Gcm, Key as GcmKey, Nonce};
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::rngs::OsRng;
use rand::RngCore;

use super::{require_key_len, CryptoProvider, KEY_LEN};
use crate::error::{ErrorKind, Result};

const GCM_NONCE_LEN: usize = 12;
const GCM_TAG_LEN: usize = 16;
const CBC_IV_LEN: usize = 16;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// AES-256-GCM provider. Output layout: `nonce(12) || ciphertext || tag(16)`.
#[derive(Default)]
pub struct AesGcmProvider;

impl AesGcmProvider {
    pub fn new() -> Self {
        Self
    }
}

impl CryptoProvider for AesGcmProvider {
    fn encrypt(&self, key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<Vec<u8>> {
        let cipher = Aes256Gcm::new(GcmKey::<Aes256Gcm>::from_slice(key));

        let mut nonce_bytes = [0u8; GCM_NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let mut sealed = cipher.encrypt(nonce, plaintext).map_err(|_| ErrorKind::IoError)?;

        let mut out = Vec::with_capacity(GCM_NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce_bytes);
        out.append(&mut sealed);
        Ok(out)
    }

    fn decrypt(&self, key: &[u8; KEY_LEN], ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < GCM_NONCE_LEN + GCM_TAG_LEN {
            return Err(ErrorKind::IoError);
        }
        let (nonce_bytes, sealed) = ciphertext.split_at(GCM_NONCE_LEN);
        let cipher = Aes256Gcm::new(GcmKey::<Aes256Gcm>::from_slice(key));
        let nonce = Nonce::from_slice(nonce_bytes);
        cipher.decrypt(nonce, sealed).map_err(|_| ErrorKind::IoError)
    }
}

/// AES-256-CBC + PKCS#7 provider. Confidentiality only — callers pair this
/// with an explicit integrity hash (see [`crate::hsm`]). Output layout:
/// `iv(16) || ciphertext`.
#[derive(Default)]
pub struct AesCbcProvider;

impl AesCbcProvider {
    pub fn new() -> Self {
        Self
    }
}

impl CryptoProvider for AesCbcProvider {
    fn encrypt(&self, key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut iv = [0u8; CBC_IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let ciphertext =
            Aes256CbcEnc::new(key.into(), (&iv).into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mut out = Vec::with_capacity(CBC_IV_LEN + ciphertext.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, key: &[u8; KEY_LEN], ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < CBC_IV_LEN {
            return Err(ErrorKind::IoError);
        }
        let (iv, body) = ciphertext.split_at(CBC_IV_LEN);
        Aes256CbcDec::new(key.into(), iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(body)
            .map_err(|_| ErrorKind::IoError)
    }
}

/// Validates a variable-length key slice and copies it into a fixed array,
/// used by callers that receive keys as `&[u8]` (e.g. from the factory).
pub fn key_array(key: &[u8]) -> Result<[u8; KEY_LEN]> {
    require_key_len(key)?;
    let mut out = [0u8; KEY_LEN];
    out.copy_from_slice(key);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gcm_round_trips() {
        let provider = AesGcmProvider::new();
        let key = [0x11u8; KEY_LEN];
        let plaintext = b"Hello, Virtual File System!".to_vec();
        let ciphertext = provider.encrypt(&key, &plaintext).unwrap();
        assert_ne!(ciphertext, plaintext);
        let decrypted = provider.decrypt(&key, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn gcm_rejects_tampered_ciphertext() {
        let provider = AesGcmProvider::new();
        let key = [0x22u8; KEY_LEN];
        let mut ciphertext = provider.encrypt(&key, b"top secret").unwrap();
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0xFF;
        assert_eq!(provider.decrypt(&key, &ciphertext), Err(ErrorKind::IoError));
    }

    #[test]
    fn cbc_round_trips() {
        let provider = AesCbcProvider::new();
        let key = [0x33u8; KEY_LEN];
        let plaintext = b"confidential but unauthenticated".to_vec();
        let ciphertext = provider.encrypt(&key, &plaintext).unwrap();
        let decrypted = provider.decrypt(&key, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }
}
