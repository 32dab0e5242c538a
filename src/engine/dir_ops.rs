//! Directory operations of the `Ivfs` surface (§4.9.5).

use crate::entry::{attach_child, count_entries, detach_child, find_child, total_size, EntryData, EntryKind};
use crate::error::{ErrorKind, Result};
use crate::path;

use super::{persist, ContainerEngine, FileInfo, Ivfs};

impl Ivfs for ContainerEngine {
    fn create_directory(&self, path: &str) -> Result<()> {
        let normalized = path::normalize(path);
        let name = path::filename(&normalized);

        {
            let mut state = self.state.lock().expect("engine mutex poisoned");
            let parent = state.resolve_parent(&normalized, true)?;
            if find_child(&parent, &name).is_some() {
                return Err(ErrorKind::AlreadyExists);
            }

            let dir = EntryData::new_directory(name, current_timestamp());
            attach_child(&parent, dir);

            let root = state.root.clone();
            persist::rebuild_cache(&root, &mut state.cache);
        }

        self.resource.update_directory_count(1);
        persist::save_metadata(self)
    }

    fn delete_directory(&self, path: &str, recursive: bool) -> Result<()> {
        let normalized = path::normalize(path);
        if normalized == "/" {
            return Err(ErrorKind::PermissionDenied);
        }
        let name = path::filename(&normalized);

        let (freed_storage, freed_files, freed_dirs) = {
            let mut state = self.state.lock().expect("engine mutex poisoned");
            let parent = state.resolve_parent(&normalized, false)?;
            let entry = find_child(&parent, &name).ok_or(ErrorKind::FileNotFound)?;
            if entry.lock().expect("entry mutex poisoned").kind != EntryKind::Directory {
                return Err(ErrorKind::NotADirectory);
            }
            if !recursive && !entry.lock().expect("entry mutex poisoned").children.is_empty() {
                return Err(ErrorKind::PermissionDenied);
            }

            let storage = total_size(&entry);
            let (files, directories) = count_entries(&entry);

            detach_child(&parent, &name);
            state.evict_subtree(&normalized);
            let root = state.root.clone();
            persist::rebuild_cache(&root, &mut state.cache);

            (storage, files, directories)
        };

        self.resource.update_usage(-(freed_storage as i64), 0, -(freed_files as i64));
        self.resource.update_directory_count(-(freed_dirs as i64));
        persist::save_metadata(self)
    }

    fn list_directory(&self, path: &str) -> Result<Vec<FileInfo>> {
        let normalized = path::normalize(path);
        let mut state = self.state.lock().expect("engine mutex poisoned");
        let entry = state.lookup(&normalized)?;
        if entry.lock().expect("entry mutex poisoned").kind != EntryKind::Directory {
            return Err(ErrorKind::NotADirectory);
        }

        let base = if normalized == "/" { String::new() } else { normalized };
        let children = entry.lock().expect("entry mutex poisoned").children.clone();
        Ok(children
            .into_iter()
            .map(|child| {
                let child_ref = child.lock().expect("entry mutex poisoned");
                FileInfo {
                    name: child_ref.name.clone(),
                    path: format!("{}/{}", base, child_ref.name),
                    size: child_ref.size,
                    is_directory: child_ref.is_directory(),
                    created_time: child_ref.timestamp,
                    modified_time: child_ref.timestamp,
                }
            })
            .collect())
    }

    fn directory_exists(&self, path: &str) -> bool {
        let normalized = path::normalize(path);
        if normalized == "/" {
            return true;
        }
        let mut state = self.state.lock().expect("engine mutex poisoned");
        matches!(state.lookup(&normalized), Ok(entry) if entry.lock().expect("entry mutex poisoned").kind == EntryKind::Directory)
    }
}

fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
