//! Recursive preorder (de)serialisation of the entry tree (§4.6).
//!
//! ```text
//! entry  := kind:u8  name_len:u32  name:bytes[name_len]
//!           size:u64  timestamp:u64  data_offset:u64
//!           hash_len:u32  hash:bytes[hash_len]
//!           [if kind=Directory]  child_count:u32  child[0..child_count]
//! ```
//!
//! All integers little-endian, no padding.

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use num_traits::{FromPrimitive, ToPrimitive};

use super::{attach_child, EntryData, EntryKind, EntryRef};
use crate::error::{ErrorKind, Result};

/// Serialises the whole tree rooted at `root` into `out`.
pub fn serialize_tree(root: &EntryRef, out: &mut Vec<u8>) -> Result<()> {
    write_entry(root, out).map_err(|_| ErrorKind::IoError)
}

/// Deserialises a tree previously produced by [`serialize_tree`].
pub fn deserialize_tree(bytes: &[u8]) -> Result<EntryRef> {
    let mut cursor = Cursor::new(bytes);
    read_entry(&mut cursor, None)
}

fn write_entry(entry: &EntryRef, out: &mut Vec<u8>) -> std::io::Result<()> {
    let data = entry.lock().expect("entry mutex poisoned");

    let kind_byte = ToPrimitive::to_u8(&data.kind).expect("EntryKind fits in a u8");
    out.write_u8(kind_byte)?;

    let name_bytes = data.name.as_bytes();
    out.write_u32::<LittleEndian>(name_bytes.len() as u32)?;
    out.write_all(name_bytes)?;

    out.write_u64::<LittleEndian>(data.size)?;
    out.write_u64::<LittleEndian>(data.timestamp)?;
    out.write_u64::<LittleEndian>(data.data_offset)?;

    match data.integrity_hash {
        Some(hash) => {
            out.write_u32::<LittleEndian>(hash.len() as u32)?;
            out.write_all(&hash)?;
        }
        None => {
            out.write_u32::<LittleEndian>(0)?;
        }
    }

    if data.kind == EntryKind::Directory {
        out.write_u32::<LittleEndian>(data.children.len() as u32)?;
        for child in data.children.iter() {
            write_entry(child, out)?;
        }
    }

    Ok(())
}

fn read_entry(cursor: &mut Cursor<&[u8]>, parent: Option<&EntryRef>) -> Result<EntryRef> {
    let kind_byte = read_u8(cursor)?;
    let kind: EntryKind = FromPrimitive::from_u8(kind_byte).ok_or(ErrorKind::InvalidFormat)?;

    let name_len = read_u32(cursor)? as usize;
    let name = read_string(cursor, name_len)?;

    let size = read_u64(cursor)?;
    let timestamp = read_u64(cursor)?;
    let data_offset = read_u64(cursor)?;

    let hash_len = read_u32(cursor)? as usize;
    let integrity_hash = if hash_len == 0 {
        None
    } else {
        let bytes = read_bytes(cursor, hash_len)?;
        let array: [u8; 32] =
            bytes.as_slice().try_into().map_err(|_| ErrorKind::InvalidFormat)?;
        Some(array)
    };

    let entry = match kind {
        EntryKind::File => EntryData::new_file(name, data_offset, timestamp),
        EntryKind::Directory => EntryData::new_directory(name, timestamp),
    };
    {
        let mut entry_mut = entry.lock().expect("entry mutex poisoned");
        entry_mut.size = size;
        entry_mut.integrity_hash = integrity_hash;
    }
    if let Some(p) = parent {
        entry.lock().expect("entry mutex poisoned").parent = Some(std::sync::Arc::downgrade(p));
    }

    if kind == EntryKind::Directory {
        let child_count = read_u32(cursor)?;
        for _ in 0..child_count {
            let child = read_entry(cursor, Some(&entry))?;
            attach_child(&entry, child);
        }
        // attach_child above re-sets the parent link (redundant but harmless);
        // children are pushed into `entry.children` as a side effect.
    }

    Ok(entry)
}

fn read_u8(cursor: &mut Cursor<&[u8]>) -> Result<u8> {
    cursor.read_u8().map_err(|_| ErrorKind::InvalidFormat)
}

fn read_u32(cursor: &mut Cursor<&[u8]>) -> Result<u32> {
    cursor.read_u32::<LittleEndian>().map_err(|_| ErrorKind::InvalidFormat)
}

fn read_u64(cursor: &mut Cursor<&[u8]>) -> Result<u64> {
    cursor.read_u64::<LittleEndian>().map_err(|_| ErrorKind::InvalidFormat)
}

fn read_bytes(cursor: &mut Cursor<&[u8]>, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    cursor.read_exact(&mut buf).map_err(|_| ErrorKind::InvalidFormat)?;
    Ok(buf)
}

fn read_string(cursor: &mut Cursor<&[u8]>, len: usize) -> Result<String> {
    let bytes = read_bytes(cursor, len)?;
    String::from_utf8(bytes).map_err(|_| ErrorKind::InvalidFormat)
}
