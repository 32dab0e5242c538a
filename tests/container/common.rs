use std::path::PathBuf;

use cvfs::engine::SecurityLevel;
use cvfs::{ContainerEngine, EngineOptions, Factory, ResourceLimits};
use tempfile::TempDir;

pub struct Fixture {
    pub tempdir: TempDir,
    pub key: [u8; 32],
}

impl Fixture {
    pub fn new() -> Self {
        Self { tempdir: TempDir::new().expect("create temp dir"), key: [7u8; 32] }
    }

    pub fn container_path(&self) -> PathBuf {
        self.tempdir.path().join("container.cvfs")
    }

    pub fn open(&self) -> ContainerEngine {
        Factory::new()
            .open(self.container_path(), &self.key, None, SecurityLevel::Standard, ResourceLimits::default())
            .expect("open container")
    }

    pub fn open_with_limits(&self, limits: ResourceLimits) -> ContainerEngine {
        Factory::new()
            .open(self.container_path(), &self.key, None, SecurityLevel::Standard, limits)
            .expect("open container")
    }

    pub fn reopen_lenient(&self) -> ContainerEngine {
        let provider: std::sync::Arc<dyn cvfs::crypto::CryptoProvider> =
            std::sync::Arc::new(cvfs::crypto::AesGcmProvider::new());
        let hsm: std::sync::Arc<dyn cvfs::hsm::Hsm> = std::sync::Arc::new(cvfs::hsm::SoftwareHsm::new());
        ContainerEngine::new(
            self.container_path(),
            provider,
            self.key,
            std::sync::Arc::new(cvfs::host::StdHostVfs::new()),
            hsm,
            SecurityLevel::Standard,
            ResourceLimits::default(),
            EngineOptions { lenient_on_load: true },
        )
        .expect("reopen container leniently")
    }
}
