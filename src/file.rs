//! The open file handle: a plaintext buffer bound to an entry and the
//! shared host file (§4.8).

use std::io::SeekFrom;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::crypto::CryptoProvider;
use crate::entry::EntryRef;
use crate::error::{ErrorKind, Result};
use crate::hsm::Hsm;
use crate::host::HostFile;
use crate::resource::ResourceMonitor;

/// Mirrors `hydra::vfs::FileMode`, extended with the Create/CreateNew
/// distinction the container engine needs at `open_file` (§4.9.5).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FileMode {
    Read,
    Write,
    ReadWrite,
    Append,
    Create,
    CreateNew,
}

impl FileMode {
    fn allows_read(self) -> bool {
        matches!(self, FileMode::Read | FileMode::ReadWrite | FileMode::Append)
    }

    fn allows_write(self) -> bool {
        matches!(
            self,
            FileMode::Write | FileMode::ReadWrite | FileMode::Append | FileMode::Create | FileMode::CreateNew
        )
    }
}

/// Sanity bound on the length prefix read during plaintext loading (§4.8.1).
const MAX_PLAUSIBLE_LENGTH: u64 = 100 * 1024 * 1024;
/// Padding added to `entry.size` on the length-prefix-recovery path.
const RECOVERY_PADDING: u64 = 128;

struct ContainerFileInner {
    entry: EntryRef,
    host_file: Arc<Mutex<Box<dyn HostFile>>>,
    provider: Arc<dyn CryptoProvider>,
    hsm: Arc<dyn Hsm>,
    key: [u8; crate::crypto::KEY_LEN],
    mode: FileMode,
    buffer: Vec<u8>,
    position: u64,
    dirty: bool,
    open: bool,
    decryption_failed: bool,
    tail: Arc<AtomicU64>,
    resource: Arc<ResourceMonitor>,
}

/// One open handle onto a container file (§4.8). All operations serialise
/// through the handle's own mutex; the shared host file is additionally
/// bound behind the engine's lock (§4.8.2, §5).
pub struct ContainerFile {
    inner: Mutex<ContainerFileInner>,
}

impl ContainerFile {
    /// Opens `entry` for the given `mode`. Loads plaintext eagerly when the
    /// mode permits reads and the entry already has content; otherwise
    /// starts from an empty buffer (§4.8).
    pub fn open(
        entry: EntryRef,
        host_file: Arc<Mutex<Box<dyn HostFile>>>,
        provider: Arc<dyn CryptoProvider>,
        hsm: Arc<dyn Hsm>,
        key: [u8; crate::crypto::KEY_LEN],
        mode: FileMode,
        tail: Arc<AtomicU64>,
        resource: Arc<ResourceMonitor>,
    ) -> Result<Self> {
        let mut inner = ContainerFileInner {
            entry,
            host_file,
            provider,
            hsm,
            key,
            mode,
            buffer: Vec::new(),
            position: 0,
            dirty: false,
            open: true,
            decryption_failed: false,
            tail,
            resource,
        };

        let needs_load = mode.allows_read() && inner.entry.lock().expect("entry mutex poisoned").size > 0;
        if matches!(mode, FileMode::Create | FileMode::CreateNew) {
            inner.entry.lock().expect("entry mutex poisoned").integrity_hash = None;
        } else if needs_load {
            inner.load_plaintext()?;
        }

        Ok(Self { inner: Mutex::new(inner) })
    }

    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut inner = self.inner.lock().expect("container file mutex poisoned");
        inner.read(buf)
    }

    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        let mut inner = self.inner.lock().expect("container file mutex poisoned");
        inner.write(buf)
    }

    pub fn seek(&self, offset: i64, whence: SeekWhence) -> Result<u64> {
        let mut inner = self.inner.lock().expect("container file mutex poisoned");
        inner.seek(offset, whence)
    }

    pub fn tell(&self) -> Result<u64> {
        let inner = self.inner.lock().expect("container file mutex poisoned");
        if !inner.open {
            return Err(ErrorKind::IoError);
        }
        Ok(inner.position)
    }

    pub fn flush(&self) -> Result<()> {
        let mut inner = self.inner.lock().expect("container file mutex poisoned");
        inner.flush()
    }

    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock().expect("container file mutex poisoned");
        if !inner.open {
            return Ok(());
        }
        if inner.dirty {
            inner.flush()?;
        }
        inner.open = false;
        Ok(())
    }
}

/// Mirrors `std::io::SeekFrom` without pulling file-position semantics from
/// the standard library's I/O traits into the public API.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SeekWhence {
    Set,
    Current,
    End,
}

impl ContainerFileInner {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !self.open {
            return Err(ErrorKind::IoError);
        }
        if self.decryption_failed {
            return Err(ErrorKind::IoError);
        }
        if !self.mode.allows_read() {
            return Err(ErrorKind::InvalidArgument);
        }

        let available = self.buffer.len() as u64 - self.position.min(self.buffer.len() as u64);
        let to_read = (buf.len() as u64).min(available) as usize;
        let start = self.position as usize;
        buf[..to_read].copy_from_slice(&self.buffer[start..start + to_read]);
        self.position += to_read as u64;
        Ok(to_read)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if !self.open {
            return Err(ErrorKind::IoError);
        }
        if !self.mode.allows_write() {
            return Err(ErrorKind::InvalidArgument);
        }

        let position = self.position as usize;
        let end = position + buf.len();
        let old_size = self.buffer.len();
        let prospective_size = end.max(old_size);

        // Checked against the whole prospective file size, not just the
        // newly written bytes, so a single oversized write is rejected
        // outright rather than silently truncated (§4.5, §8 scenario 4).
        self.resource.check_limits(
            prospective_size as i64 - old_size as i64,
            0,
            0,
            prospective_size as u64,
        )?;

        if position > self.buffer.len() {
            self.buffer.resize(position, 0);
        }
        if self.buffer.len() < end {
            self.buffer.resize(end, 0);
        }
        self.buffer[position..end].copy_from_slice(buf);
        self.position += buf.len() as u64;
        self.dirty = true;

        self.resource.update_usage(self.buffer.len() as i64 - old_size as i64, 0, 0);
        self.flush()?;
        Ok(buf.len())
    }

    fn seek(&mut self, offset: i64, whence: SeekWhence) -> Result<u64> {
        if !self.open {
            return Err(ErrorKind::IoError);
        }
        let base: i64 = match whence {
            SeekWhence::Set => 0,
            SeekWhence::Current => self.position as i64,
            SeekWhence::End => self.buffer.len() as i64,
        };
        let new_position = base + offset;
        if new_position < 0 || new_position as u64 > self.buffer.len() as u64 {
            return Err(ErrorKind::InvalidArgument);
        }
        self.position = new_position as u64;
        Ok(self.position)
    }

    fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        let hash = self.hsm.calculate_integrity_hash(&self.buffer)?;
        let ciphertext = self.provider.encrypt(&self.key, &self.buffer)?;

        // `data_offset == 0` means this entry has never been flushed (offset
        // 0 is always the header, so no file legitimately points there).
        // Reserve the region from the shared tail exactly once; later
        // flushes of the same entry reuse that offset. A later flush that
        // writes more bytes than the original allocation can overrun the
        // next entry's region — there is no compaction pass (§4.9.5).
        let existing = self.entry.lock().expect("entry mutex poisoned").data_offset;
        let data_offset = if existing == 0 {
            let region_len = 8 + ciphertext.len() as u64;
            let offset = self.tail.fetch_add(region_len, Ordering::SeqCst);
            self.entry.lock().expect("entry mutex poisoned").data_offset = offset;
            offset
        } else {
            existing
        };
        {
            let mut host = self.host_file.lock().expect("host file mutex poisoned");
            host.seek(SeekFrom::Start(data_offset))?;
            host.write_at(&(ciphertext.len() as u64).to_le_bytes())?;
            host.write_at(&ciphertext)?;
            host.flush()?;
        }

        let mut entry = self.entry.lock().expect("entry mutex poisoned");
        entry.size = self.buffer.len() as u64;
        entry.timestamp = current_timestamp();
        entry.integrity_hash = Some(hash);
        drop(entry);

        self.dirty = false;
        Ok(())
    }

    /// Loads the plaintext currently stored at the entry's `data_offset`
    /// (§4.8.1).
    fn load_plaintext(&mut self) -> Result<()> {
        let data_offset = self.entry.lock().expect("entry mutex poisoned").data_offset;
        let entry_size = self.entry.lock().expect("entry mutex poisoned").size;

        let mut host = self.host_file.lock().expect("host file mutex poisoned");
        host.seek(SeekFrom::Start(data_offset))?;

        let mut len_prefix = [0u8; 8];
        let read = host.read_at(&mut len_prefix)?;

        let ciphertext = if read == 8 {
            let length = u64::from_le_bytes(len_prefix);
            if length == 0 || length > MAX_PLAUSIBLE_LENGTH {
                host.seek(SeekFrom::Start(data_offset))?;
                read_exact_lenient(&mut *host, entry_size + RECOVERY_PADDING)?
            } else {
                read_exact_lenient(&mut *host, length)?
            }
        } else {
            host.seek(SeekFrom::Start(data_offset))?;
            read_exact_lenient(&mut *host, entry_size + RECOVERY_PADDING)?
        };
        drop(host);

        match self.provider.decrypt(&self.key, &ciphertext) {
            Ok(mut plaintext) => {
                if let Some(expected) = self.entry.lock().expect("entry mutex poisoned").integrity_hash {
                    match self.hsm.verify_integrity(&plaintext, &expected) {
                        Ok(true) => {}
                        Ok(false) => {
                            tracing::warn!(
                                path = %crate::entry::absolute_path(&self.entry),
                                "integrity hash mismatch on load; continuing leniently"
                            );
                        }
                        Err(err) => {
                            tracing::warn!(?err, "integrity verification failed; continuing leniently");
                        }
                    }
                }
                plaintext.resize(entry_size as usize, 0);
                self.buffer = plaintext;
            }
            Err(_) => {
                self.decryption_failed = true;
                self.buffer = Vec::new();
            }
        }

        Ok(())
    }
}

fn read_exact_lenient(host: &mut dyn HostFile, len: u64) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len as usize];
    let mut filled = 0usize;
    while filled < buf.len() {
        let n = host.read_at(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}

fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::AesGcmProvider;
    use crate::entry::EntryData;
    use crate::hsm::SoftwareHsm;
    use crate::host::{HostVfs, MemoryHostVfs};
    use std::path::Path;

    fn open_handle(entry: EntryRef, mode: FileMode, key: [u8; 32]) -> (ContainerFile, MemoryHostVfs) {
        let vfs = MemoryHostVfs::new();
        let path = Path::new("/c.cvfs");
        let file = vfs.create(path).unwrap();
        let host_file: Arc<Mutex<Box<dyn HostFile>>> = Arc::new(Mutex::new(file));
        let provider: Arc<dyn CryptoProvider> = Arc::new(AesGcmProvider::new());
        let hsm: Arc<dyn Hsm> = Arc::new(SoftwareHsm::new());
        let tail = Arc::new(AtomicU64::new(1024));
        let resource = Arc::new(ResourceMonitor::new(Default::default()));
        let handle = ContainerFile::open(entry, host_file, provider, hsm, key, mode, tail, resource).unwrap();
        (handle, vfs)
    }

    #[test]
    fn write_then_read_round_trips_in_single_handle() {
        let entry = EntryData::new_file("a.txt".to_string(), 0, 0);
        let (handle, _vfs) = open_handle(entry, FileMode::ReadWrite, [3u8; 32]);

        handle.write(b"hello world").unwrap();
        handle.seek(0, SeekWhence::Set).unwrap();

        let mut buf = [0u8; 11];
        let n = handle.read(&mut buf).unwrap();
        assert_eq!(n, 11);
        assert_eq!(&buf, b"hello world");
    }

    #[test]
    fn reopening_reloads_plaintext_via_flushed_ciphertext() {
        let entry = EntryData::new_file("a.txt".to_string(), 0, 0);
        let key = [9u8; 32];

        let vfs = MemoryHostVfs::new();
        let path = Path::new("/c.cvfs");
        let file = vfs.create(path).unwrap();
        let host_file: Arc<Mutex<Box<dyn HostFile>>> = Arc::new(Mutex::new(file));
        let provider: Arc<dyn CryptoProvider> = Arc::new(AesGcmProvider::new());
        let hsm: Arc<dyn Hsm> = Arc::new(SoftwareHsm::new());
        let tail = Arc::new(AtomicU64::new(1024));
        let resource = Arc::new(ResourceMonitor::new(Default::default()));

        let handle = ContainerFile::open(
            entry.clone(),
            host_file.clone(),
            provider.clone(),
            hsm.clone(),
            key,
            FileMode::Write,
            tail.clone(),
            resource.clone(),
        )
        .unwrap();
        handle.write(b"persisted").unwrap();
        handle.close().unwrap();

        let reopened =
            ContainerFile::open(entry, host_file, provider, hsm, key, FileMode::Read, tail, resource).unwrap();
        let mut buf = [0u8; 9];
        reopened.read(&mut buf).unwrap();
        assert_eq!(&buf, b"persisted");
    }

    #[test]
    fn read_only_handle_rejects_write() {
        let entry = EntryData::new_file("a.txt".to_string(), 0, 0);
        let (handle, _vfs) = open_handle(entry, FileMode::Read, [1u8; 32]);
        assert_eq!(handle.write(b"x"), Err(ErrorKind::InvalidArgument));
    }

    #[test]
    fn close_is_idempotent() {
        let entry = EntryData::new_file("a.txt".to_string(), 0, 0);
        let (handle, _vfs) = open_handle(entry, FileMode::ReadWrite, [1u8; 32]);
        handle.close().unwrap();
        handle.close().unwrap();
    }

    #[test]
    fn seek_past_buffer_end_is_rejected() {
        let entry = EntryData::new_file("a.txt".to_string(), 0, 0);
        let (handle, _vfs) = open_handle(entry, FileMode::ReadWrite, [1u8; 32]);
        handle.write(b"abc").unwrap();
        assert_eq!(handle.seek(100, SeekWhence::Set), Err(ErrorKind::InvalidArgument));
    }
}
