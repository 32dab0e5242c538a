//! Path resolution against the entry tree and cache maintenance (§4.9.6).

use crate::entry::{attach_child, find_child, EntryData, EntryRef};
use crate::error::{ErrorKind, Result};
use crate::path;

use super::EngineState;

impl EngineState {
    /// Resolves `normalized_path` by descending from the root, matching
    /// child names linearly. When `create_dirs` is set, missing
    /// intermediate directories are created on demand.
    pub(super) fn resolve(&mut self, normalized_path: &str, create_dirs: bool) -> Result<EntryRef> {
        if let Some(cached) = self.cache.get(normalized_path) {
            return Ok(cached.clone());
        }

        let mut current = self.root.clone();
        let segments = path::segments(normalized_path);
        let mut built_path = String::new();

        for (idx, segment) in segments.iter().enumerate() {
            built_path.push('/');
            built_path.push_str(segment);

            if !current.lock().expect("entry mutex poisoned").is_directory() {
                return Err(ErrorKind::NotADirectory);
            }

            match find_child(&current, segment) {
                Some(child) => current = child,
                None => {
                    let is_last = idx == segments.len() - 1;
                    if create_dirs || !is_last {
                        let dir = EntryData::new_directory(segment.clone(), current_timestamp());
                        attach_child(&current, dir.clone());
                        self.cache.insert(built_path.clone(), dir.clone());
                        current = dir;
                    } else {
                        return Err(ErrorKind::FileNotFound);
                    }
                }
            }
        }

        self.cache.insert(normalized_path.to_string(), current.clone());
        Ok(current)
    }

    /// Looks up an existing entry without creating anything.
    pub(super) fn lookup(&mut self, normalized_path: &str) -> Result<EntryRef> {
        if normalized_path == "/" {
            return Ok(self.root.clone());
        }
        if let Some(cached) = self.cache.get(normalized_path) {
            return Ok(cached.clone());
        }

        let mut current = self.root.clone();
        for segment in path::segments(normalized_path) {
            if !current.lock().expect("entry mutex poisoned").is_directory() {
                return Err(ErrorKind::NotADirectory);
            }
            current = find_child(&current, &segment).ok_or(ErrorKind::FileNotFound)?;
        }

        self.cache.insert(normalized_path.to_string(), current.clone());
        Ok(current)
    }

    /// Resolves the parent directory of `normalized_path`, optionally
    /// creating missing intermediate directories.
    pub(super) fn resolve_parent(&mut self, normalized_path: &str, create_dirs: bool) -> Result<EntryRef> {
        let parent_path = path::parent(normalized_path);
        self.resolve(&parent_path, create_dirs)
    }

    /// Drops every cache entry at or below `path_prefix`, used after a
    /// delete or as the stale half of a rename (§4.9.6).
    pub(super) fn evict_subtree(&mut self, path_prefix: &str) {
        let prefix_with_slash = format!("{}/", path_prefix);
        self.cache.retain(|key, _| key != path_prefix && !key.starts_with(&prefix_with_slash));
    }
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
    use crate::engine::SecurityLevel;
    use std::collections::HashMap;

    fn state_with_empty_root() -> EngineState {
        use crate::header::ContainerHeader;
        use crate::host::{HostVfs, MemoryHostVfs};
        use crate::metadata::ContainerMetadata;
        use std::path::Path;
        use std::sync::{Arc, Mutex};

        let vfs = MemoryHostVfs::new();
        let host_file = vfs.create(Path::new("/c.cvfs")).unwrap();
        EngineState {
            host_file: Arc::new(Mutex::new(host_file)),
            root: EntryData::new_root(),
            header: ContainerHeader::fresh(1024, 0),
            metadata: ContainerMetadata::new("id".to_string(), "cvfs".to_string(), 0),
            cache: HashMap::new(),
            security_level: SecurityLevel::Standard,
        }
    }

    #[test]
    fn resolve_creates_missing_intermediate_directories() {
        let mut state = state_with_empty_root();
        let entry = state.resolve("/a/b/c.txt", true).unwrap();
        assert!(entry.lock().expect("entry mutex poisoned").is_directory());
        assert_eq!(entry.lock().expect("entry mutex poisoned").name, "c.txt");
        assert!(state.cache.contains_key("/a"));
        assert!(state.cache.contains_key("/a/b"));
    }

    #[test]
    fn lookup_fails_on_missing_entry_without_create() {
        let mut state = state_with_empty_root();
        assert_eq!(state.lookup("/missing"), Err(ErrorKind::FileNotFound));
    }

    #[test]
    fn evict_subtree_removes_nested_cache_keys() {
        let mut state = state_with_empty_root();
        state.resolve("/a/b/c.txt", true).unwrap();
        state.evict_subtree("/a");
        assert!(!state.cache.contains_key("/a"));
        assert!(!state.cache.contains_key("/a/b"));
    }
}
