//! File operations of the `Ivfs` surface (§4.9.5).

use crate::entry::{attach_child, detach_child, find_child, EntryData, EntryKind};
use crate::error::{ErrorKind, Result};
use crate::file::{ContainerFile, FileMode};
use crate::path;

use super::{persist, ContainerEngine, FileInfo, Ivfs};

impl ContainerEngine {
    fn ensure_file_entry(&self, normalized_path: &str, mode: FileMode) -> Result<crate::entry::EntryRef> {
        let mut state = self.state.lock().expect("engine mutex poisoned");
        match state.lookup(normalized_path) {
            Ok(entry) => {
                if entry.lock().expect("entry mutex poisoned").kind != EntryKind::File {
                    return Err(ErrorKind::NotAFile);
                }
                if mode == FileMode::CreateNew {
                    return Err(ErrorKind::AlreadyExists);
                }
                Ok(entry)
            }
            Err(ErrorKind::FileNotFound) if matches!(mode, FileMode::Create | FileMode::CreateNew) => {
                drop(state);
                self.create_file(normalized_path)?;
                let mut state = self.state.lock().expect("engine mutex poisoned");
                state.lookup(normalized_path)
            }
            Err(err) => Err(err),
        }
    }
}

impl Ivfs for ContainerEngine {
    fn open_file(&self, path: &str, mode: FileMode) -> Result<ContainerFile> {
        let normalized = path::normalize(path);
        let entry = self.ensure_file_entry(&normalized, mode)?;

        let host_file = self.state.lock().expect("engine mutex poisoned").host_file.clone();
        ContainerFile::open(
            entry,
            host_file,
            self.provider.clone(),
            self.hsm.clone(),
            self.key,
            mode,
            self.tail.clone(),
            self.resource.clone(),
        )
    }

    fn create_file(&self, path: &str) -> Result<()> {
        let normalized = path::normalize(path);
        let name = path::filename(&normalized);

        self.resource.check_limits(0, 0, 1, 0)?;

        {
            let mut state = self.state.lock().expect("engine mutex poisoned");
            let parent = state.resolve_parent(&normalized, true)?;
            if find_child(&parent, &name).is_some() {
                return Err(ErrorKind::AlreadyExists);
            }

            // data_offset 0 is the "unallocated" sentinel; the real offset is
            // handed out from the engine's data-region tail on first flush.
            let file = EntryData::new_file(name, 0, current_timestamp());
            attach_child(&parent, file);

            let root = state.root.clone();
            persist::rebuild_cache(&root, &mut state.cache);
        }

        self.resource.update_usage(0, 0, 1);
        persist::save_metadata(self)
    }

    fn delete_file(&self, path: &str) -> Result<()> {
        let normalized = path::normalize(path);
        let name = path::filename(&normalized);

        let size = {
            let mut state = self.state.lock().expect("engine mutex poisoned");
            let parent = state.resolve_parent(&normalized, false)?;
            let entry = find_child(&parent, &name).ok_or(ErrorKind::FileNotFound)?;
            if entry.lock().expect("entry mutex poisoned").kind != EntryKind::File {
                return Err(ErrorKind::NotAFile);
            }
            let size = entry.lock().expect("entry mutex poisoned").size;
            detach_child(&parent, &name);
            state.evict_subtree(&normalized);
            size
        };

        self.resource.update_usage(-(size as i64), 0, -1);
        persist::save_metadata(self)
    }

    fn rename_file(&self, old_path: &str, new_path: &str) -> Result<()> {
        let old_normalized = path::normalize(old_path);
        let new_normalized = path::normalize(new_path);
        let new_name = path::filename(&new_normalized);

        {
            let mut state = self.state.lock().expect("engine mutex poisoned");
            if state.lookup(&new_normalized).is_ok() {
                return Err(ErrorKind::AlreadyExists);
            }

            let old_name = path::filename(&old_normalized);
            let old_parent = state.resolve_parent(&old_normalized, false)?;
            let entry = find_child(&old_parent, &old_name).ok_or(ErrorKind::FileNotFound)?;
            if entry.lock().expect("entry mutex poisoned").kind != EntryKind::File {
                return Err(ErrorKind::NotAFile);
            }

            let new_parent = state.resolve_parent(&new_normalized, true)?;
            detach_child(&old_parent, &old_name);
            entry.lock().expect("entry mutex poisoned").name = new_name;
            attach_child(&new_parent, entry);

            state.evict_subtree(&old_normalized);
            let root = state.root.clone();
            persist::rebuild_cache(&root, &mut state.cache);
        }

        persist::save_metadata(self)
    }

    fn file_exists(&self, path: &str) -> bool {
        let normalized = path::normalize(path);
        let mut state = self.state.lock().expect("engine mutex poisoned");
        matches!(state.lookup(&normalized), Ok(entry) if entry.lock().expect("entry mutex poisoned").kind == EntryKind::File)
    }

    fn get_file_info(&self, path: &str) -> Result<FileInfo> {
        let normalized = path::normalize(path);
        let mut state = self.state.lock().expect("engine mutex poisoned");
        let entry = state.lookup(&normalized)?;
        let entry_ref = entry.lock().expect("entry mutex poisoned");
        Ok(FileInfo {
            name: entry_ref.name.clone(),
            path: normalized,
            size: entry_ref.size,
            is_directory: entry_ref.is_directory(),
            created_time: entry_ref.timestamp,
            modified_time: entry_ref.timestamp,
        })
    }
}

fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
