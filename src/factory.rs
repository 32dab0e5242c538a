//! Assembles a [`ContainerEngine`] from caller-supplied configuration (§4.10).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::crypto::{AesGcmProvider, CryptoProvider, HybridKemProvider, KemMode, KEY_LEN};
use crate::engine::{ContainerEngine, EngineOptions, SecurityLevel};
use crate::error::{ErrorKind, Result};
use crate::hsm::{Hsm, SoftwareHsm};
use crate::host::{HostVfs, StdHostVfs};
use crate::resource::ResourceLimits;

/// Builds containers with the default provider stack: BLAKE3 (via
/// [`SoftwareHsm`]) for integrity hashing, AES-256-GCM for encryption, and an
/// optional hybrid KEM mode layered on top for key derivation when the
/// caller supplies no key of their own.
pub struct Factory {
    kem_mode: Option<KemMode>,
}

impl Default for Factory {
    fn default() -> Self {
        Self::new()
    }
}

impl Factory {
    pub fn new() -> Self {
        Self { kem_mode: None }
    }

    /// Enables hybrid-KEM key derivation for empty-key construction,
    /// using `mode` as the Kyber parameter set.
    pub fn with_kem_mode(mode: KemMode) -> Self {
        Self { kem_mode: Some(mode) }
    }

    /// Opens or creates the container at `container_path`.
    ///
    /// `key` must be either exactly [`KEY_LEN`] bytes or empty. An empty key
    /// triggers KEM-based key derivation: a fresh keypair is generated,
    /// encapsulated against itself to produce a shared secret, and that
    /// secret becomes the container's symmetric key. The secret is persisted
    /// to `<container_path>.key` (mode `0o600` on Unix) so a later open with
    /// an empty key recovers the same container.
    pub fn open(
        &self,
        container_path: impl Into<PathBuf>,
        key: &[u8],
        host_vfs: Option<Arc<dyn HostVfs>>,
        security_level: SecurityLevel,
        limits: ResourceLimits,
    ) -> Result<ContainerEngine> {
        let container_path = container_path.into();
        let host_vfs = host_vfs.unwrap_or_else(|| Arc::new(StdHostVfs::new()));

        let resolved_key = if key.is_empty() {
            derive_or_load_key(&container_path, self.kem_mode.unwrap_or(KemMode::Kyber768))?
        } else {
            if key.len() != KEY_LEN {
                return Err(ErrorKind::InvalidArgument);
            }
            let mut buf = [0u8; KEY_LEN];
            buf.copy_from_slice(key);
            buf
        };

        let provider: Arc<dyn CryptoProvider> = Arc::new(AesGcmProvider::new());
        let hsm: Arc<dyn Hsm> = Arc::new(SoftwareHsm::new());

        ContainerEngine::new(
            container_path,
            provider,
            resolved_key,
            host_vfs,
            hsm,
            security_level,
            limits,
            EngineOptions::default(),
        )
    }

    /// Like [`Factory::open`], but with an unsafe deterministic key derived
    /// from `container_path` instead of random KEM-based derivation. Never
    /// reachable from [`Factory::open`]'s empty-key path — callers must opt
    /// in explicitly, so production code can never silently land here.
    pub fn with_insecure_test_key(
        container_path: impl Into<PathBuf>,
        host_vfs: Option<Arc<dyn HostVfs>>,
        security_level: SecurityLevel,
        limits: ResourceLimits,
    ) -> Result<ContainerEngine> {
        let container_path = container_path.into();
        let host_vfs = host_vfs.unwrap_or_else(|| Arc::new(StdHostVfs::new()));
        let key = deterministic_fallback_key(&container_path);

        let provider: Arc<dyn CryptoProvider> = Arc::new(AesGcmProvider::new());
        let hsm: Arc<dyn Hsm> = Arc::new(SoftwareHsm::new());

        ContainerEngine::new(container_path, provider, key, host_vfs, hsm, security_level, limits, EngineOptions::default())
    }
}

fn key_sidecar_path(container_path: &Path) -> PathBuf {
    let mut os = container_path.as_os_str().to_owned();
    os.push(".key");
    PathBuf::from(os)
}

fn derive_or_load_key(container_path: &Path, mode: KemMode) -> Result<[u8; KEY_LEN]> {
    let sidecar = key_sidecar_path(container_path);

    if let Ok(bytes) = std::fs::read(&sidecar) {
        if bytes.len() == KEY_LEN {
            let mut key = [0u8; KEY_LEN];
            key.copy_from_slice(&bytes);
            return Ok(key);
        }
    }

    // On KEM failure this returns an error rather than silently falling back
    // to `deterministic_fallback_key` — that path is only ever reached via
    // the explicitly-named `Factory::with_insecure_test_key`, never as an
    // automatic fallback a production caller could land on unknowingly.
    let key = HybridKemProvider::new(mode).derive_fresh_secret().map_err(|_| ErrorKind::InitializationFailed)?;
    write_sidecar(&sidecar, &key)?;
    Ok(key)
}

fn deterministic_fallback_key(container_path: &Path) -> [u8; KEY_LEN] {
    let digest = blake3::hash(container_path.to_string_lossy().as_bytes());
    *digest.as_bytes()
}

fn write_sidecar(path: &Path, key: &[u8; KEY_LEN]) -> Result<()> {
    std::fs::write(path, key)?;
    #[cfg(target_os = "linux")]
    {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;
        let cpath = CString::new(path.as_os_str().as_bytes()).map_err(|_| ErrorKind::InvalidArgument)?;
        if unsafe { libc::chmod(cpath.as_ptr(), 0o600) } != 0 {
            return Err(ErrorKind::IoError);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_fallback_key_is_stable() {
        let a = deterministic_fallback_key(Path::new("/tmp/a.cvfs"));
        let b = deterministic_fallback_key(Path::new("/tmp/a.cvfs"));
        assert_eq!(a, b);
    }

    #[test]
    fn deterministic_fallback_key_differs_by_path() {
        let a = deterministic_fallback_key(Path::new("/tmp/a.cvfs"));
        let b = deterministic_fallback_key(Path::new("/tmp/b.cvfs"));
        assert_ne!(a, b);
    }
}
