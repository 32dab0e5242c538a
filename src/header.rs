//! Fixed-layout container header at host-file offset 0 (§3).

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{ErrorKind, Result};

/// `"HYVR"` read as a little-endian u32.
pub const MAGIC: u32 = 0x5256_5948;
pub const VERSION: u32 = 1;

/// Encoded size of [`ContainerHeader`]: 7 `u64` fields + 2 `u32` fields.
pub const HEADER_LEN: u64 = 7 * 8 + 2 * 4;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ContainerHeader {
    pub magic: u32,
    pub version: u32,
    pub metadata_offset: u64,
    pub metadata_size: u64,
    pub container_metadata_offset: u64,
    pub container_metadata_size: u64,
    pub data_offset: u64,
    pub data_size: u64,
    pub security_level: u32,
}

impl ContainerHeader {
    /// Builds a fresh header for a newly created container, reserving
    /// `reserved_metadata_size` bytes for each of the two metadata regions
    /// (§4.9.1 step 3 reserves 1024 bytes apiece).
    pub fn fresh(reserved_metadata_size: u64, security_level: u32) -> Self {
        let container_metadata_offset = HEADER_LEN;
        let metadata_offset = container_metadata_offset + reserved_metadata_size;
        let data_offset = metadata_offset + reserved_metadata_size;
        Self {
            magic: MAGIC,
            version: VERSION,
            metadata_offset,
            metadata_size: 0,
            container_metadata_offset,
            container_metadata_size: 0,
            data_offset,
            data_size: 0,
            security_level,
        }
    }

    /// Records the actual encrypted lengths of the two metadata regions,
    /// without moving `metadata_offset` / `data_offset` — those boundaries
    /// are fixed for the container's lifetime at the reserved capacity
    /// established by [`ContainerHeader::fresh`], so that file payload
    /// offsets already handed out into the data region stay valid across
    /// every subsequent `save_metadata` (§4.9.2 step 4). Errors if either
    /// region has outgrown its reserved capacity.
    pub fn with_actual_sizes(mut self, container_metadata_size: u64, metadata_size: u64) -> Result<Self> {
        if container_metadata_size > self.metadata_offset - self.container_metadata_offset {
            return Err(ErrorKind::ResourceExhausted);
        }
        if metadata_size > self.data_offset - self.metadata_offset {
            return Err(ErrorKind::ResourceExhausted);
        }
        self.container_metadata_size = container_metadata_size;
        self.metadata_size = metadata_size;
        Ok(self)
    }

    /// Validates the layout invariants from §3: region boundaries must be
    /// ordered and each region's actual size must fit its reserved capacity.
    pub fn validate(&self) -> Result<()> {
        if self.magic != MAGIC {
            return Err(ErrorKind::InvalidFormat);
        }
        if self.version != VERSION {
            return Err(ErrorKind::InvalidFormat);
        }
        if self.container_metadata_offset != HEADER_LEN {
            return Err(ErrorKind::InvalidFormat);
        }
        if self.metadata_offset < self.container_metadata_offset
            || self.data_offset < self.metadata_offset
        {
            return Err(ErrorKind::InvalidFormat);
        }
        if self.container_metadata_size > self.metadata_offset - self.container_metadata_offset {
            return Err(ErrorKind::InvalidFormat);
        }
        if self.metadata_size > self.data_offset - self.metadata_offset {
            return Err(ErrorKind::InvalidFormat);
        }
        Ok(())
    }

    pub fn serialize(&self, out: &mut Vec<u8>) -> Result<()> {
        write_fields(self, out).map_err(|_| ErrorKind::IoError)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if (bytes.len() as u64) < HEADER_LEN {
            return Err(ErrorKind::InvalidFormat);
        }
        let mut cursor = Cursor::new(bytes);
        let magic = read_u32(&mut cursor)?;
        let version = read_u32(&mut cursor)?;
        let metadata_offset = read_u64(&mut cursor)?;
        let metadata_size = read_u64(&mut cursor)?;
        let container_metadata_offset = read_u64(&mut cursor)?;
        let container_metadata_size = read_u64(&mut cursor)?;
        let data_offset = read_u64(&mut cursor)?;
        let data_size = read_u64(&mut cursor)?;
        let security_level = read_u32(&mut cursor)?;

        let header = Self {
            magic,
            version,
            metadata_offset,
            metadata_size,
            container_metadata_offset,
            container_metadata_size,
            data_offset,
            data_size,
            security_level,
        };
        header.validate()?;
        Ok(header)
    }
}

fn write_fields(header: &ContainerHeader, out: &mut Vec<u8>) -> std::io::Result<()> {
    out.write_u32::<LittleEndian>(header.magic)?;
    out.write_u32::<LittleEndian>(header.version)?;
    out.write_u64::<LittleEndian>(header.metadata_offset)?;
    out.write_u64::<LittleEndian>(header.metadata_size)?;
    out.write_u64::<LittleEndian>(header.container_metadata_offset)?;
    out.write_u64::<LittleEndian>(header.container_metadata_size)?;
    out.write_u64::<LittleEndian>(header.data_offset)?;
    out.write_u64::<LittleEndian>(header.data_size)?;
    out.write_u32::<LittleEndian>(header.security_level)?;
    Ok(())
}

fn read_u32(cursor: &mut Cursor<&[u8]>) -> Result<u32> {
    cursor.read_u32::<LittleEndian>().map_err(|_| ErrorKind::InvalidFormat)
}

fn read_u64(cursor: &mut Cursor<&[u8]>) -> Result<u64> {
    cursor.read_u64::<LittleEndian>().map_err(|_| ErrorKind::InvalidFormat)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_header_satisfies_invariants() {
        let header = ContainerHeader::fresh(1024, 0);
        assert!(header.validate().is_ok());
        assert_eq!(header.container_metadata_offset, HEADER_LEN);
    }

    #[test]
    fn round_trips_through_bytes() {
        let header = ContainerHeader::fresh(1024, 2).with_actual_sizes(200, 900).unwrap();
        let mut bytes = Vec::new();
        header.serialize(&mut bytes).unwrap();
        let restored = ContainerHeader::deserialize(&bytes).unwrap();
        assert_eq!(restored, header);
    }

    #[test]
    fn rejects_sizes_beyond_reserved_capacity() {
        let header = ContainerHeader::fresh(1024, 0);
        assert_eq!(header.with_actual_sizes(2000, 0), Err(ErrorKind::ResourceExhausted));
    }

    #[test]
    fn rejects_bad_magic() {
        let header = ContainerHeader::fresh(1024, 0);
        let mut bytes = Vec::new();
        header.serialize(&mut bytes).unwrap();
        bytes[0] = 0xFF;
        assert_eq!(ContainerHeader::deserialize(&bytes), Err(ErrorKind::InvalidFormat));
    }

    #[test]
    fn rejects_inconsistent_offsets() {
        let mut header = ContainerHeader::fresh(1024, 0);
        header.data_offset = header.metadata_offset - 1;
        assert_eq!(header.validate(), Err(ErrorKind::InvalidFormat));
    }
}
