//! Container metadata record and its binary grammar (§4.7).
//!
//! ```text
//! meta   := version:u32  id_len:u32  id:bytes[id_len]
//!           creator_len:u32  creator:bytes[creator_len]
//!           creation_time:u64  last_modified_time:u64
//!           hash_len:u32  hash:bytes[hash_len]
//! ```

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{ErrorKind, Result};

/// Metadata record stored alongside the entry tree in every container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerMetadata {
    pub version: u32,
    pub id: String,
    pub creator: String,
    pub creation_time: u64,
    pub last_modified_time: u64,
    /// Whole-container integrity hash (§4.9.4). Empty until first computed.
    pub integrity_hash: Vec<u8>,
}

impl ContainerMetadata {
    pub fn new(id: String, creator: String, timestamp: u64) -> Self {
        Self {
            version: 1,
            id,
            creator,
            creation_time: timestamp,
            last_modified_time: timestamp,
            integrity_hash: Vec::new(),
        }
    }

    /// Serialises every field except `integrity_hash`, for feeding into the
    /// container integrity hash computation (§4.9.4).
    pub fn serialize_without_hash(&self, out: &mut Vec<u8>) -> Result<()> {
        write_fields(self, out, false).map_err(|_| ErrorKind::IoError)
    }

    pub fn serialize(&self, out: &mut Vec<u8>) -> Result<()> {
        write_fields(self, out, true).map_err(|_| ErrorKind::IoError)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);

        let version = read_u32(&mut cursor)?;

        let id_len = read_u32(&mut cursor)? as usize;
        let id = read_string(&mut cursor, id_len)?;

        let creator_len = read_u32(&mut cursor)? as usize;
        let creator = read_string(&mut cursor, creator_len)?;

        let creation_time = read_u64(&mut cursor)?;
        let last_modified_time = read_u64(&mut cursor)?;

        let hash_len = read_u32(&mut cursor)? as usize;
        let integrity_hash = read_bytes(&mut cursor, hash_len)?;

        Ok(Self { version, id, creator, creation_time, last_modified_time, integrity_hash })
    }
}

fn write_fields(meta: &ContainerMetadata, out: &mut Vec<u8>, include_hash: bool) -> std::io::Result<()> {
    out.write_u32::<LittleEndian>(meta.version)?;

    let id_bytes = meta.id.as_bytes();
    out.write_u32::<LittleEndian>(id_bytes.len() as u32)?;
    out.write_all(id_bytes)?;

    let creator_bytes = meta.creator.as_bytes();
    out.write_u32::<LittleEndian>(creator_bytes.len() as u32)?;
    out.write_all(creator_bytes)?;

    out.write_u64::<LittleEndian>(meta.creation_time)?;
    out.write_u64::<LittleEndian>(meta.last_modified_time)?;

    if include_hash {
        out.write_u32::<LittleEndian>(meta.integrity_hash.len() as u32)?;
        out.write_all(&meta.integrity_hash)?;
    } else {
        out.write_u32::<LittleEndian>(0)?;
    }

    Ok(())
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_with_hash() {
        let mut meta = ContainerMetadata::new("abc123".to_string(), "cvfs".to_string(), 1_700_000_000);
        meta.integrity_hash = vec![9u8; 32];

        let mut bytes = Vec::new();
        meta.serialize(&mut bytes).unwrap();

        let restored = ContainerMetadata::deserialize(&bytes).unwrap();
        assert_eq!(restored, meta);
    }

    #[test]
    fn serialize_without_hash_omits_hash_bytes() {
        let mut meta = ContainerMetadata::new("id".to_string(), "creator".to_string(), 10);
        meta.integrity_hash = vec![1, 2, 3, 4];

        let mut bytes = Vec::new();
        meta.serialize_without_hash(&mut bytes).unwrap();

        let restored = ContainerMetadata::deserialize(&bytes).unwrap();
        assert!(restored.integrity_hash.is_empty());
    }

    #[test]
    fn truncated_buffer_is_invalid_format() {
        let meta = ContainerMetadata::new("id".to_string(), "creator".to_string(), 10);
        let mut bytes = Vec::new();
        meta.serialize(&mut bytes).unwrap();
        bytes.truncate(4);
        assert_eq!(ContainerMetadata::deserialize(&bytes), Err(ErrorKind::InvalidFormat));
    }
}
