//! Hybrid post-quantum KEM + AEAD provider.
//!
//! A Kyber-family key-encapsulation mechanism (ML-KEM / FIPS 203) produces a
//! shared secret; that secret is used directly as the 32-byte symmetric key
//! fed into an inner [`CryptoProvider`] (AES-256-GCM by default).

use ml_kem::kem::{Decapsulate, Encapsulate};
use ml_kem::{EncodedSizeUser, KemCore, MlKem1024, MlKem512, MlKem768};
use rand::rngs::OsRng;

use super::aead::AesGcmProvider;
use super::{require_key_len, CryptoProvider, KeyEncapsulation, KEY_LEN};
use crate::error::{ErrorKind, Result};

/// Kyber-family KEM mode, fixed at provider construction.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum KemMode {
    Kyber512,
    Kyber768,
    Kyber1024,
}

impl KemMode {
    /// Parses the mode identifier strings named in the spec.
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "Kyber512" => Ok(KemMode::Kyber512),
            "Kyber768" => Ok(KemMode::Kyber768),
            "Kyber1024" => Ok(KemMode::Kyber1024),
            _ => Err(ErrorKind::InvalidArgument),
        }
    }
}

/// Generates a keypair and performs encapsulation/decapsulation for a single
/// concrete ML-KEM parameter set, returning opaque byte sequences and a
/// 32-byte shared secret — used directly as the symmetric key (§4.3).
macro_rules! kem_impl {
    ($kem:ty) => {{
        struct Impl;
        impl Impl {
            fn generate_keypair() -> (Vec<u8>, Vec<u8>) {
                let (decap, encap) = <$kem as KemCore>::generate(&mut OsRng);
                (encap.as_bytes().to_vec(), decap.as_bytes().to_vec())
            }

            fn encapsulate(public_key: &[u8]) -> Result<(Vec<u8>, [u8; KEY_LEN])> {
                let encoded = <$kem as KemCore>::EncapsulationKey::from(
                    ml_kem::Encoded::<<$kem as KemCore>::EncapsulationKey>::try_from(public_key)
                        .map_err(|_| ErrorKind::InvalidArgument)?,
                );
                let (ciphertext, shared_secret) =
                    encoded.encapsulate(&mut OsRng).map_err(|_| ErrorKind::IoError)?;
                let mut key = [0u8; KEY_LEN];
                require_key_len(&shared_secret)?;
                key.copy_from_slice(&shared_secret);
                Ok((ciphertext.to_vec(), key))
            }

            fn decapsulate(private_key: &[u8], ciphertext: &[u8]) -> Result<[u8; KEY_LEN]> {
                let encoded = <$kem as KemCore>::DecapsulationKey::from(
                    ml_kem::Encoded::<<$kem as KemCore>::DecapsulationKey>::try_from(private_key)
                        .map_err(|_| ErrorKind::InvalidArgument)?,
                );
                let ct = ml_kem::Ciphertext::<$kem>::try_from(ciphertext)
                    .map_err(|_| ErrorKind::InvalidArgument)?;
                let shared_secret = encoded.decapsulate(&ct).map_err(|_| ErrorKind::IoError)?;
                require_key_len(&shared_secret)?;
                let mut key = [0u8; KEY_LEN];
                key.copy_from_slice(&shared_secret);
                Ok(key)
            }
        }
        Impl
    }};
}

/// Hybrid post-quantum KEM + AEAD provider.
///
/// The symmetric AEAD used once the shared secret is established is
/// AES-256-GCM (via [`AesGcmProvider`]); the KEM mode is fixed at
/// construction and never negotiated at runtime.
pub struct HybridKemProvider {
    mode: KemMode,
    aead: AesGcmProvider,
}

impl HybridKemProvider {
    pub fn new(mode: KemMode) -> Self {
        Self { mode, aead: AesGcmProvider::new() }
    }

    pub fn mode(&self) -> KemMode {
        self.mode
    }

    /// Encapsulates a fresh symmetric key under `public_key` and encrypts
    /// `plaintext` with it. Returns `encapsulated_key || aead_ciphertext`
    /// length-prefixed so the pair can be stored as a single opaque blob.
    pub fn seal(&self, public_key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        let (encapsulated, key) = match self.mode {
            KemMode::Kyber512 => kem_impl!(MlKem512).encapsulate(public_key)?,
            KemMode::Kyber768 => kem_impl!(MlKem768).encapsulate(public_key)?,
            KemMode::Kyber1024 => kem_impl!(MlKem1024).encapsulate(public_key)?,
        };
        let aead_ciphertext = self.aead.encrypt(&key, plaintext)?;

        let mut out = Vec::with_capacity(4 + encapsulated.len() + aead_ciphertext.len());
        out.extend_from_slice(&(encapsulated.len() as u32).to_le_bytes());
        out.extend_from_slice(&encapsulated);
        out.extend_from_slice(&aead_ciphertext);
        Ok(out)
    }

    /// Inverse of [`HybridKemProvider::seal`].
    pub fn open(&self, private_key: &[u8], sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < 4 {
            return Err(ErrorKind::IoError);
        }
        let (len_bytes, rest) = sealed.split_at(4);
        let encapsulated_len = u32::from_le_bytes(len_bytes.try_into().unwrap()) as usize;
        if rest.len() < encapsulated_len {
            return Err(ErrorKind::IoError);
        }
        let (encapsulated, aead_ciphertext) = rest.split_at(encapsulated_len);

        let key = match self.mode {
            KemMode::Kyber512 => kem_impl!(MlKem512).decapsulate(private_key, encapsulated)?,
            KemMode::Kyber768 => kem_impl!(MlKem768).decapsulate(private_key, encapsulated)?,
            KemMode::Kyber1024 => kem_impl!(MlKem1024).decapsulate(private_key, encapsulated)?,
        };
        self.aead.decrypt(&key, aead_ciphertext)
    }
}

impl KeyEncapsulation for HybridKemProvider {
    fn generate_keypair(&self) -> Result<(Vec<u8>, Vec<u8>)> {
        let (public, private) = match self.mode {
            KemMode::Kyber512 => kem_impl!(MlKem512).generate_keypair(),
            KemMode::Kyber768 => kem_impl!(MlKem768).generate_keypair(),
            KemMode::Kyber1024 => kem_impl!(MlKem1024).generate_keypair(),
        };
        Ok((public, private))
    }
}

impl HybridKemProvider {
    /// Generates a fresh keypair and immediately encapsulates against its
    /// own public half, returning just the resulting shared secret. Used by
    /// the factory's empty-key path, which persists the secret itself
    /// rather than a reusable KEM keypair (§4.10).
    pub fn derive_fresh_secret(&self) -> Result<[u8; KEY_LEN]> {
        let (public, _private) = self.generate_keypair()?;
        let (_ciphertext, secret) = match self.mode {
            KemMode::Kyber512 => kem_impl!(MlKem512).encapsulate(&public)?,
            KemMode::Kyber768 => kem_impl!(MlKem768).encapsulate(&public)?,
            KemMode::Kyber1024 => kem_impl!(MlKem1024).encapsulate(&public)?,
        };
        Ok(secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kem_mode_parses_spec_identifiers() {
        assert_eq!(KemMode::parse("Kyber512").unwrap(), KemMode::Kyber512);
        assert_eq!(KemMode::parse("Kyber768").unwrap(), KemMode::Kyber768);
        assert_eq!(KemMode::parse("Kyber1024").unwrap(), KemMode::Kyber1024);
        assert!(KemMode::parse("Kyber2048").is_err());
    }

    #[test]
    fn hybrid_seal_open_round_trips() {
        let provider = HybridKemProvider::new(KemMode::Kyber768);
        let (public, private) = provider.generate_keypair().unwrap();

        let plaintext = b"hybrid post-quantum payload".to_vec();
        let sealed = provider.seal(&public, &plaintext).unwrap();
        let opened = provider.open(&private, &sealed).unwrap();
        assert_eq!(opened, plaintext);
    }
}
