//! Container initialisation, metadata save/load, and the whole-container
//! integrity hash (§4.9.1 – §4.9.4).

use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::crypto::{CryptoProvider, KEY_LEN};
use crate::entry::{serialize as entry_serialize, EntryData};
use crate::error::{ErrorKind, Result};
use crate::header::ContainerHeader;
use crate::hsm::Hsm;
use crate::host::{HostFile, HostVfs};
use crate::metadata::ContainerMetadata;
use crate::resource::{ResourceLimits, ResourceMonitor};

use super::{ContainerEngine, EngineOptions, EngineState, SecurityLevel};

/// Reserved capacity, in bytes, for each of the two metadata regions. Fixed
/// for the container's lifetime (§4.9.1 step 3): offsets into the data
/// region never move once assigned, so this budget bounds how large the
/// entry tree and container metadata may grow before `save_metadata`
/// starts returning `ResourceExhausted`.
const RESERVED_METADATA_SIZE: u64 = 64 * 1024;

pub(super) fn initialize(
    container_path: PathBuf,
    provider: Arc<dyn CryptoProvider>,
    key: [u8; KEY_LEN],
    host_vfs: Arc<dyn HostVfs>,
    hsm: Arc<dyn Hsm>,
    security_level: SecurityLevel,
    limits: ResourceLimits,
    options: EngineOptions,
) -> Result<ContainerEngine> {
    let absolute = container_path.canonicalize().unwrap_or_else(|_| container_path.clone());
    let exists = host_vfs.exists(&container_path) || host_vfs.exists(&absolute);

    let (host_file, root, header, metadata) = if exists {
        open_existing(&container_path, &*host_vfs, &*hsm, &provider, &key, options.lenient_on_load)?
    } else {
        create_fresh(&container_path, &*host_vfs, &*hsm, &provider, &key, security_level)?
    };

    let resource = Arc::new(ResourceMonitor::new(limits));
    let (files, directories) = crate::entry::count_entries(&root);
    resource.update_usage(crate::entry::total_size(&root) as i64, 0, files as i64);
    resource.update_directory_count(directories as i64 - 1); // exclude root

    let mut cache = HashMap::new();
    rebuild_cache(&root, &mut cache);

    // The data region is append-only and every flush extends the host file
    // to exactly the new tail (§4.9.5), so the file's actual length is the
    // authoritative resume point — not `header.data_size`, which is only
    // refreshed by the next `save_metadata` and can lag behind a flush that
    // happened without an intervening structural change.
    let host_len = host_file.lock().expect("host file mutex poisoned").len()?;
    let tail = Arc::new(AtomicU64::new(host_len.max(header.data_offset)));

    Ok(ContainerEngine {
        state: Mutex::new(EngineState { host_file, root, header, metadata, cache, security_level }),
        provider,
        hsm,
        key,
        resource,
        host_vfs,
        container_path,
        options,
        tail,
    })
}

fn open_existing(
    path: &PathBuf,
    host_vfs: &dyn HostVfs,
    hsm: &dyn Hsm,
    provider: &Arc<dyn CryptoProvider>,
    key: &[u8; KEY_LEN],
    lenient_on_load: bool,
) -> Result<(Arc<Mutex<Box<dyn HostFile>>>, crate::entry::EntryRef, ContainerHeader, ContainerMetadata)> {
    let mut raw = host_vfs.open_read_write(path)?;

    raw.seek(SeekFrom::Start(0))?;
    let mut header_bytes = vec![0u8; crate::header::HEADER_LEN as usize];
    read_exact(&mut *raw, &mut header_bytes)?;
    let header = ContainerHeader::deserialize(&header_bytes)?;

    match load_metadata(&mut *raw, &header, provider, key, hsm, false) {
        Ok((root, metadata)) => Ok((Arc::new(Mutex::new(raw)), root, header, metadata)),
        Err(_) => match load_metadata(&mut *raw, &header, provider, key, hsm, true) {
            Ok((root, metadata)) => Ok((Arc::new(Mutex::new(raw)), root, header, metadata)),
            Err(err) => {
                if lenient_on_load {
                    drop(raw);
                    host_vfs.remove(path)?;
                    create_fresh(path, host_vfs, hsm, provider, key, SecurityLevel::from_u32(header.security_level))
                } else {
                    Err(err)
                }
            }
        },
    }
}

fn create_fresh(
    path: &PathBuf,
    host_vfs: &dyn HostVfs,
    hsm: &dyn Hsm,
    provider: &Arc<dyn CryptoProvider>,
    key: &[u8; KEY_LEN],
    security_level: SecurityLevel,
) -> Result<(Arc<Mutex<Box<dyn HostFile>>>, crate::entry::EntryRef, ContainerHeader, ContainerMetadata)> {
    let mut raw = host_vfs.create(path)?;

    let root = EntryData::new_root();
    let timestamp = current_timestamp();
    let id = generate_container_id();
    let metadata = ContainerMetadata::new(id, "cvfs".to_string(), timestamp);
    let header = ContainerHeader::fresh(RESERVED_METADATA_SIZE, security_level.as_u32());

    let (header, metadata) = write_all_regions(&mut *raw, header, metadata, &root, provider, key, hsm)?;
    raw.flush()?;

    Ok((Arc::new(Mutex::new(raw)), root, header, metadata))
}

/// Serialises the entry tree and metadata, refreshes the container
/// integrity hash, and writes header + both regions (§4.9.2). Region
/// *offsets* never change after creation (see `RESERVED_METADATA_SIZE`);
/// only the recorded actual sizes and the data-region tail do.
pub(super) fn save_metadata(engine: &ContainerEngine) -> Result<()> {
    let mut state = engine.state.lock().expect("engine mutex poisoned");
    state.metadata.last_modified_time = current_timestamp();
    // Advisory only — see `initialize`'s use of the host file's actual
    // length as the authoritative resume point for `tail`.
    state.header.data_size = engine.tail.load(Ordering::SeqCst) - state.header.data_offset;

    let (header, metadata) = write_all_regions(
        &mut **state.host_file.lock().expect("host file mutex poisoned"),
        state.header,
        state.metadata.clone(),
        &state.root,
        &engine.provider,
        &engine.key,
        &*engine.hsm,
    )?;
    state.header = header;
    state.metadata = metadata;
    Ok(())
}

fn write_all_regions(
    host: &mut dyn HostFile,
    mut header: ContainerHeader,
    mut metadata: ContainerMetadata,
    root: &crate::entry::EntryRef,
    provider: &Arc<dyn CryptoProvider>,
    key: &[u8; KEY_LEN],
    hsm: &dyn Hsm,
) -> Result<(ContainerHeader, ContainerMetadata)> {
    let mut tree_bytes = Vec::new();
    entry_serialize::serialize_tree(root, &mut tree_bytes)?;
    let encrypted_tree = provider.encrypt(key, &tree_bytes)?;

    // Reserve the hash field at its real 32-byte width before sizing the
    // region, so encrypting the final (hashed) record below reproduces the
    // exact same ciphertext length — AEAD overhead is a fixed function of
    // plaintext length, never of content.
    metadata.integrity_hash = vec![0u8; crate::hsm::HASH_LEN];
    let mut sized_meta_bytes = Vec::new();
    metadata.serialize(&mut sized_meta_bytes)?;
    let region_size = provider.encrypt(key, &sized_meta_bytes)?.len() as u64;

    header = header.with_actual_sizes(region_size, encrypted_tree.len() as u64)?;
    let mut header_bytes = Vec::new();
    header.serialize(&mut header_bytes)?;

    let mut hash_input = Vec::new();
    hash_input.extend_from_slice(&header_bytes);
    let mut unhashed_meta_bytes = Vec::new();
    metadata.serialize_without_hash(&mut unhashed_meta_bytes)?;
    hash_input.extend_from_slice(&unhashed_meta_bytes);
    metadata.integrity_hash = hsm.calculate_integrity_hash(&hash_input)?.to_vec();

    let mut final_meta_bytes = Vec::new();
    metadata.serialize(&mut final_meta_bytes)?;
    let encrypted_meta = provider.encrypt(key, &final_meta_bytes)?;
    debug_assert_eq!(encrypted_meta.len() as u64, region_size);

    host.seek(SeekFrom::Start(0))?;
    host.write_at(&header_bytes)?;
    host.write_at(&encrypted_meta)?;
    host.write_at(&encrypted_tree)?;
    host.flush()?;

    Ok((header, metadata))
}

/// Loads and decrypts both metadata regions, verifying the container
/// integrity hash in strict mode (§4.9.3).
fn load_metadata(
    host: &mut dyn HostFile,
    header: &ContainerHeader,
    provider: &Arc<dyn CryptoProvider>,
    key: &[u8; KEY_LEN],
    hsm: &dyn Hsm,
    lenient: bool,
) -> Result<(crate::entry::EntryRef, ContainerMetadata)> {
    host.seek(SeekFrom::Start(header.container_metadata_offset))?;
    let mut meta_bytes = vec![0u8; header.container_metadata_size as usize];
    read_exact(host, &mut meta_bytes)?;
    let encrypted_meta = meta_bytes;
    let meta_plain = provider.decrypt(key, &encrypted_meta)?;
    let metadata = ContainerMetadata::deserialize(&meta_plain)?;

    host.seek(SeekFrom::Start(header.metadata_offset))?;
    let mut tree_bytes = vec![0u8; header.metadata_size as usize];
    read_exact(host, &mut tree_bytes)?;
    let tree_plain = provider.decrypt(key, &tree_bytes)?;
    let root = entry_serialize::deserialize_tree(&tree_plain)?;

    let mut header_bytes = Vec::new();
    header.serialize(&mut header_bytes)?;
    let mut unhashed_meta_bytes = Vec::new();
    let mut unhashed_metadata = metadata.clone();
    unhashed_metadata.integrity_hash.clear();
    unhashed_metadata.serialize_without_hash(&mut unhashed_meta_bytes)?;

    let mut hash_input = Vec::new();
    hash_input.extend_from_slice(&header_bytes);
    hash_input.extend_from_slice(&unhashed_meta_bytes);
    let computed = hsm.calculate_integrity_hash(&hash_input)?;

    if computed.as_slice() != metadata.integrity_hash.as_slice() {
        if lenient {
            tracing::warn!("container integrity hash mismatch; continuing in lenient mode");
        } else {
            return Err(ErrorKind::InvalidFormat);
        }
    }

    Ok((root, metadata))
}

pub(super) fn rebuild_cache(root: &crate::entry::EntryRef, cache: &mut HashMap<String, crate::entry::EntryRef>) {
    cache.clear();
    cache.insert("/".to_string(), root.clone());
    let mut stack: Vec<crate::entry::EntryRef> = root.lock().expect("entry mutex poisoned").children.clone();
    while let Some(node) = stack.pop() {
        let path = crate::entry::absolute_path(&node);
        let children = node.lock().expect("entry mutex poisoned").children.clone();
        cache.insert(path, node);
        stack.extend(children);
    }
}

fn read_exact(host: &mut dyn HostFile, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = host.read_at(&mut buf[filled..])?;
        if n == 0 {
            return Err(ErrorKind::InvalidFormat);
        }
        filled += n;
    }
    Ok(())
}

fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn generate_container_id() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
