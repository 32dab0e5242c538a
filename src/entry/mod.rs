//! In-memory entry tree: the file/directory nodes that make up a container's
//! hierarchy (§3, §4.6).
//!
//! Children are owned (`Arc<Mutex<EntryData>>`); each entry keeps a `Weak`
//! back-reference to its parent. The engine and open file handles are shared
//! across threads behind their own mutexes (§5), so the tree nodes they hold
//! onto must be `Send`/`Sync` too — an `Rc<RefCell<_>>` would make the whole
//! engine unmovable off the thread that created it, since neither `Rc` nor
//! `RefCell` implements `Send`. `Arc`/`Mutex` costs an atomic increment and a
//! lock per access instead of a plain refcount, which is the right trade here.

pub mod serialize;

use std::sync::{Arc, Mutex, Weak};

use num_derive::{FromPrimitive, ToPrimitive};

/// Shared, owned reference to an entry node.
pub type EntryRef = Arc<Mutex<EntryData>>;
/// Weak back-reference to a parent entry.
pub type WeakEntryRef = Weak<Mutex<EntryData>>;

/// Discriminates files from directories. The discriminant values are the
/// on-disk kind byte (§4.6).
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum EntryKind {
    File = 0,
    Directory = 1,
}

/// A single node in the entry tree.
pub struct EntryData {
    pub kind: EntryKind,
    pub name: String,
    pub size: u64,
    pub timestamp: u64,
    /// Offset into the host file's data region. Meaningful for files only.
    pub data_offset: u64,
    /// 32-byte BLAKE3 digest of the file's plaintext. `None` for directories
    /// and for files that have never been flushed with non-empty content.
    pub integrity_hash: Option<[u8; 32]>,
    /// Owned children, in insertion order. Always empty for files.
    pub children: Vec<EntryRef>,
    /// Weak back-reference to the parent; `None` only for the root.
    pub parent: Option<WeakEntryRef>,
}

impl EntryData {
    pub fn new_root() -> EntryRef {
        Arc::new(Mutex::new(EntryData {
            kind: EntryKind::Directory,
            name: String::new(),
            size: 0,
            timestamp: 0,
            data_offset: 0,
            integrity_hash: None,
            children: Vec::new(),
            parent: None,
        }))
    }

    pub fn new_file(name: String, data_offset: u64, timestamp: u64) -> EntryRef {
        Arc::new(Mutex::new(EntryData {
            kind: EntryKind::File,
            name,
            size: 0,
            timestamp,
            data_offset,
            integrity_hash: None,
            children: Vec::new(),
            parent: None,
        }))
    }

    pub fn new_directory(name: String, timestamp: u64) -> EntryRef {
        Arc::new(Mutex::new(EntryData {
            kind: EntryKind::Directory,
            name,
            size: 0,
            timestamp,
            data_offset: 0,
            integrity_hash: None,
            children: Vec::new(),
            parent: None,
        }))
    }

    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// Attaches `child` under `parent`, setting the weak back-reference.
///
/// Caller is responsible for checking name uniqueness first (§3 invariant 2).
pub fn attach_child(parent: &EntryRef, child: EntryRef) {
    child.lock().expect("entry mutex poisoned").parent = Some(Arc::downgrade(parent));
    parent.lock().expect("entry mutex poisoned").children.push(child);
}

/// Detaches the child named `name` from `parent`, if present, returning it.
pub fn detach_child(parent: &EntryRef, name: &str) -> Option<EntryRef> {
    let mut parent_mut = parent.lock().expect("entry mutex poisoned");
    let idx = parent_mut.children.iter().position(|c| c.lock().expect("entry mutex poisoned").name == name)?;
    let child = parent_mut.children.remove(idx);
    child.lock().expect("entry mutex poisoned").parent = None;
    Some(child)
}

/// Finds the direct child named `name`.
pub fn find_child(parent: &EntryRef, name: &str) -> Option<EntryRef> {
    parent
        .lock()
        .expect("entry mutex poisoned")
        .children
        .iter()
        .find(|c| c.lock().expect("entry mutex poisoned").name == name)
        .cloned()
}

/// Builds the absolute path of `entry` by walking parent links to the root.
pub fn absolute_path(entry: &EntryRef) -> String {
    let mut segments = Vec::new();
    let mut current = entry.clone();
    loop {
        let name = current.lock().expect("entry mutex poisoned").name.clone();
        let parent = current.lock().expect("entry mutex poisoned").parent.clone();
        match parent {
            Some(weak) => {
                if !name.is_empty() {
                    segments.push(name);
                }
                match weak.upgrade() {
                    Some(next) => current = next,
                    None => break,
                }
            }
            None => break,
        }
    }
    segments.reverse();
    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Recursively counts files and directories reachable from `root`,
/// including `root` itself if it is a file (it never is, in practice).
pub fn count_entries(root: &EntryRef) -> (u64, u64) {
    let mut files = 0u64;
    let mut directories = 0u64;
    let mut stack = vec![root.clone()];
    while let Some(node) = stack.pop() {
        let node_ref = node.lock().expect("entry mutex poisoned");
        match node_ref.kind {
            EntryKind::File => files += 1,
            EntryKind::Directory => directories += 1,
        }
        for child in node_ref.children.iter() {
            stack.push(child.clone());
        }
    }
    (files, directories)
}

/// Recursively sums the `size` of every file reachable from `root`.
pub fn total_size(root: &EntryRef) -> u64 {
    let mut total = 0u64;
    let mut stack = vec![root.clone()];
    while let Some(node) = stack.pop() {
        let node_ref = node.lock().expect("entry mutex poisoned");
        if node_ref.kind == EntryKind::File {
            total += node_ref.size;
        }
        for child in node_ref.children.iter() {
            stack.push(child.clone());
        }
    }
    total
}
