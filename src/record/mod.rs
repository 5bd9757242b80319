
//! On-disk record format (§4.2, §4.7): the unit of allocation for every
//! kind of non-tile-cache data GVRS stores — metadata, the element
//! dictionary, the tile index, and the free list's own bookkeeping
//! entries. Tile payloads ride inside `Tile` records whose content is
//! produced by the codec orchestrator in [`crate::compression`].
//!
//! Layout: `[recordSize:u32 | recordType:u8 | reserved:u8x3 | payload |
//! padTo8 | optional CRC-32C:u32]`. `recordSize` is the record's *total*
//! on-disk footprint, CRC included when present — one of two layouts found
//! in the source disagreeing on this point (§7); this crate follows the
//! "size includes CRC" resolution so `recordSize` alone is always enough
//! to step to the next record.

pub mod allocator;

use crate::error::{Error, Result};
use crate::io::{Data, Read, Write};
use crate::math::round_up_to_8;

pub const HEADER_SIZE: u32 = 8;

/// A free record's content must be large enough to carry its forward/back
/// pointers (§4.2), so a block smaller than this can never become a
/// standalone free record and must be absorbed into a neighbor instead.
pub const FREE_LINKS_SIZE: u32 = 24;
pub const MIN_FREE_RECORD_SIZE: u32 = HEADER_SIZE + FREE_LINKS_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    Free = 1,
    Metadata = 2,
    Tile = 3,
    FreeIndex = 4,
    ElementDict = 5,
}

impl RecordType {
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            1 => Ok(RecordType::Free),
            2 => Ok(RecordType::Metadata),
            3 => Ok(RecordType::Tile),
            4 => Ok(RecordType::FreeIndex),
            5 => Ok(RecordType::ElementDict),
            other => Err(Error::integrity(format!("record: unknown record type byte {}", other))),
        }
    }

    pub fn to_byte(self) -> u8 { self as u8 }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub total_size: u32,
    pub record_type: RecordType,
}

impl RecordHeader {
    pub fn read(read: &mut impl Read) -> Result<Self> {
        let total_size = u32::read(read)?;
        let record_type = RecordType::from_byte(u8::read(read)?)?;

        let mut reserved = [0_u8; 3];
        read.read_exact(&mut reserved)?;

        Ok(Self { total_size, record_type })
    }

    pub fn write(self, write: &mut impl Write) -> Result<()> {
        self.total_size.write(write)?;
        self.record_type.to_byte().write(write)?;
        write.write_all(&[0_u8; 3])?;
        Ok(())
    }
}

/// Total on-disk size of a record carrying `content_len` bytes of payload
/// capacity, rounded up to the 8-byte alignment every record observes.
pub fn total_size_for(content_len: u32, crc_enabled: bool) -> u32 {
    let crc_bytes = if crc_enabled { 4 } else { 0 };
    round_up_to_8(HEADER_SIZE + content_len + crc_bytes)
}

pub struct RecordContent {
    pub record_type: RecordType,
    /// The record's full content capacity: the logical payload plus
    /// whatever zero padding rounds it to 8 bytes. Self-delimiting payload
    /// formats (the tile codec header, metadata TLV entries) know their own
    /// true length and read only the prefix they need.
    pub bytes: Vec<u8>,
}

/// Write one record: header, payload, zero padding, and — when the file has
/// per-record integrity checking enabled — a trailing CRC-32C over the
/// zero-padded content. Checksumming the padded content rather than just
/// the payload lets a reader validate a record before it has parsed enough
/// of the payload to know its exact logical length.
pub fn write_record(write: &mut impl Write, record_type: RecordType, payload: &[u8], crc_enabled: bool) -> Result<()> {
    let payload_len = crate::error::usize_to_u32(payload.len(), "record payload length")?;
    let total_size = total_size_for(payload_len, crc_enabled);
    let crc_bytes = if crc_enabled { 4 } else { 0 };
    let content_capacity = total_size - HEADER_SIZE - crc_bytes;

    RecordHeader { total_size, record_type }.write(write)?;
    write.write_all(payload)?;
    crate::io::write_zero_padding(write, (content_capacity - payload_len) as usize)?;

    if crc_enabled {
        let mut padded = payload.to_vec();
        padded.resize(content_capacity as usize, 0);
        crate::crc::checksum(&padded).write(write)?;
    }

    Ok(())
}

/// Read one record back. `crc_enabled` must match the file-wide flag the
/// record was written under; there is no per-record way to tell.
pub fn read_record(read: &mut impl Read, crc_enabled: bool) -> Result<RecordContent> {
    let header = RecordHeader::read(read)?;
    let crc_bytes = if crc_enabled { 4 } else { 0 };

    if header.total_size < HEADER_SIZE + crc_bytes {
        return Err(Error::integrity("record: total size too small for its own header and CRC"));
    }

    let content_capacity = header.total_size - HEADER_SIZE - crc_bytes;
    let bytes = crate::io::read_exact_vec(read, content_capacity as usize)?;

    if crc_enabled {
        let stored_crc = u32::read(read)?;
        if stored_crc != crate::crc::checksum(&bytes) {
            return Err(Error::integrity("record: CRC-32C mismatch"));
        }
    }

    Ok(RecordContent { record_type: header.record_type, bytes })
}

const NONE_SENTINEL: u64 = u64::MAX;

/// Forward/back offsets of a free record's neighbors in the doubly linked
/// free list (§4.7), `None` at either end of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeLinks {
    pub next: Option<u64>,
    pub prev: Option<u64>,
}

impl FreeLinks {
    pub fn encode(self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(FREE_LINKS_SIZE as usize);
        bytes.extend_from_slice(&self.next.unwrap_or(NONE_SENTINEL).to_le_bytes());
        bytes.extend_from_slice(&self.prev.unwrap_or(NONE_SENTINEL).to_le_bytes());
        bytes.resize(FREE_LINKS_SIZE as usize, 0);
        bytes
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FREE_LINKS_SIZE as usize {
            return Err(Error::integrity("free record: content too small for forward/back pointers"));
        }

        let next = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
        let prev = u64::from_le_bytes(bytes[8..16].try_into().unwrap());

        Ok(Self {
            next: if next == NONE_SENTINEL { None } else { Some(next) },
            prev: if prev == NONE_SENTINEL { None } else { Some(prev) },
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trip_without_crc() {
        let mut buffer = Vec::new();
        write_record(&mut buffer, RecordType::Metadata, b"hello gvrs", false).unwrap();

        let mut cursor = buffer.as_slice();
        let content = read_record(&mut cursor, false).unwrap();
        assert_eq!(content.record_type, RecordType::Metadata);
        assert_eq!(&content.bytes[..10], b"hello gvrs");
    }

    #[test]
    fn round_trip_with_crc() {
        let mut buffer = Vec::new();
        write_record(&mut buffer, RecordType::Tile, b"tile payload bytes", true).unwrap();

        let mut cursor = buffer.as_slice();
        let content = read_record(&mut cursor, true).unwrap();
        assert_eq!(content.record_type, RecordType::Tile);
        assert_eq!(&content.bytes[..18], b"tile payload bytes");
    }

    #[test]
    fn corrupted_crc_is_rejected() {
        let mut buffer = Vec::new();
        write_record(&mut buffer, RecordType::Tile, b"abcdefgh", true).unwrap();

        let last = buffer.len() - 1;
        buffer[last] ^= 0xFF;

        let mut cursor = buffer.as_slice();
        assert!(read_record(&mut cursor, true).is_err());
    }

    #[test]
    fn total_size_is_always_a_multiple_of_8() {
        for content_len in 0..40 {
            assert_eq!(total_size_for(content_len, false) % 8, 0);
            assert_eq!(total_size_for(content_len, true) % 8, 0);
        }
    }

    #[test]
    fn free_links_round_trip_including_absent_ends() {
        let links = FreeLinks { next: Some(128), prev: None };
        let decoded = FreeLinks::decode(&links.encode()).unwrap();
        assert_eq!(decoded, links);
    }
}
