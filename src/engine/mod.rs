//! The container engine: the `Ivfs` implementation that ties the entry
//! tree, host file, crypto provider, HSM, and resource monitor together
//! (§4.9).

mod dir_ops;
mod file_ops;
mod persist;
mod resolve;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};

use crate::crypto::{CryptoProvider, KEY_LEN};
use crate::entry::EntryRef;
use crate::error::Result;
use crate::file::{ContainerFile, FileMode};
use crate::header::ContainerHeader;
use crate::hsm::Hsm;
use crate::host::{HostFile, HostVfs};
use crate::metadata::ContainerMetadata;
use crate::resource::{ResourceLimits, ResourceMonitor};

/// Security posture a container was opened under; stored in the header and
/// recorded in the factory's construction arguments (§6, §4.10).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SecurityLevel {
    Standard,
    HardwareBacked,
}

impl SecurityLevel {
    pub(crate) fn as_u32(self) -> u32 {
        match self {
            SecurityLevel::Standard => 0,
            SecurityLevel::HardwareBacked => 1,
        }
    }

    pub(crate) fn from_u32(value: u32) -> Self {
        match value {
            1 => SecurityLevel::HardwareBacked,
            _ => SecurityLevel::Standard,
        }
    }
}

/// Construction-time options beyond the crypto/resource arguments, replacing
/// the source's path-sniffed leniency heuristic (§10).
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// When strict metadata load fails, recreate the container instead of
    /// returning `InvalidFormat`. Defaults to `false`.
    pub lenient_on_load: bool,
}

/// `FileInfo` returned by lookup-style operations (§4.9.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub path: String,
    pub size: u64,
    pub is_directory: bool,
    pub created_time: u64,
    pub modified_time: u64,
}

/// The programmatic surface of a container, mirroring `IVirtualFileSystem`
/// (§6 "Programmatic interface").
pub trait Ivfs {
    fn open_file(&self, path: &str, mode: FileMode) -> Result<ContainerFile>;
    fn create_file(&self, path: &str) -> Result<()>;
    fn delete_file(&self, path: &str) -> Result<()>;
    fn rename_file(&self, old_path: &str, new_path: &str) -> Result<()>;
    fn file_exists(&self, path: &str) -> bool;
    fn get_file_info(&self, path: &str) -> Result<FileInfo>;
    fn create_directory(&self, path: &str) -> Result<()>;
    fn delete_directory(&self, path: &str, recursive: bool) -> Result<()>;
    fn list_directory(&self, path: &str) -> Result<Vec<FileInfo>>;
    fn directory_exists(&self, path: &str) -> bool;
    fn mount(&self, _path: &str) -> Result<()> {
        Err(crate::error::ErrorKind::NotSupported)
    }
    fn unmount(&self, _path: &str) -> Result<()> {
        Err(crate::error::ErrorKind::NotSupported)
    }
}

pub(crate) struct EngineState {
    pub(crate) host_file: Arc<Mutex<Box<dyn HostFile>>>,
    pub(crate) root: EntryRef,
    pub(crate) header: ContainerHeader,
    pub(crate) metadata: ContainerMetadata,
    pub(crate) cache: HashMap<String, EntryRef>,
    pub(crate) security_level: SecurityLevel,
}

/// Implements [`Ivfs`] over a single host file (§4.9). All public methods
/// acquire `state` before touching the tree or host file (§5).
pub struct ContainerEngine {
    pub(crate) state: Mutex<EngineState>,
    pub(crate) provider: Arc<dyn CryptoProvider>,
    pub(crate) hsm: Arc<dyn Hsm>,
    pub(crate) key: [u8; KEY_LEN],
    pub(crate) resource: Arc<ResourceMonitor>,
    pub(crate) host_vfs: Arc<dyn HostVfs>,
    pub(crate) container_path: PathBuf,
    pub(crate) options: EngineOptions,
    /// Next unallocated byte of the data region; file payload offsets are
    /// handed out from here the first time a handle flushes (§4.9.5).
    pub(crate) tail: Arc<AtomicU64>,
}

impl ContainerEngine {
    /// Opens or creates the container at `container_path` (§4.9.1).
    pub fn new(
        container_path: impl Into<PathBuf>,
        provider: Arc<dyn CryptoProvider>,
        key: [u8; KEY_LEN],
        host_vfs: Arc<dyn HostVfs>,
        hsm: Arc<dyn Hsm>,
        security_level: SecurityLevel,
        limits: ResourceLimits,
        options: EngineOptions,
    ) -> Result<Self> {
        persist::initialize(container_path.into(), provider, key, host_vfs, hsm, security_level, limits, options)
    }
}
