
//! File-level directory (§4.8, §6): the fixed header, element dictionary,
//! metadata dictionary, tile index, and the free list's on-disk
//! persistence. [`crate::file`] drives all of this through one handle;
//! this module only knows how to turn each piece into bytes and back.
//!
//! Open question resolved: §6 names the header "128 bytes" but then lists
//! fields that total 176 bytes (magic 4 + version 4 + flags 4 + four grid
//! extents 16 + nElements 4 + four u64 offsets 32 + 16-byte digest + 12
//! doubles 96 = 176). The field list is the header's actual bit-exact
//! contract — dropping fields to hit 128 would lose required data — so
//! this crate treats 176 as authoritative and keeps the "128 bytes" figure
//! as a stale round number from an earlier revision.

use crate::error::{Error, Result};
use crate::io::{Data, Read, Write};
use crate::record::allocator::FreeBlock;
use crate::spec::{AffineTransform, ElementSpec, ElementType, GridSpec, GridSpecBuilder};

pub const MAGIC: [u8; 4] = *b"gvrs";
pub const FORMAT_VERSION_MAJOR: u16 = 1;
pub const FORMAT_VERSION_MINOR: u16 = 0;

const FLAG_COMPRESSION_ENABLED: u32 = 0b01;
const FLAG_CRC_ENABLED: u32 = 0b10;

/// The header's total on-disk footprint (see the module doc comment for
/// why this isn't the "128 bytes" the prose elsewhere names).
pub const HEADER_SIZE: u64 = 176;

/// The fixed header at offset 0 (§6). Offsets of `0` mean "not yet
/// written" — valid records start at [`HEADER_SIZE`], so `0` can never be
/// a real record location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FileHeader {
    pub version_major: u16,
    pub version_minor: u16,
    pub compression_enabled: bool,
    pub crc_enabled: bool,
    pub n_rows: i32,
    pub n_columns: i32,
    pub tile_rows: i32,
    pub tile_cols: i32,
    pub n_elements: i32,
    pub element_dict_offset: u64,
    pub metadata_dict_offset: u64,
    pub tile_index_offset: u64,
    pub free_list_offset: u64,
    pub spec_digest: [u8; 16],
    pub r2m: [f64; 6],
    pub m2r: [f64; 6],
}

impl FileHeader {
    pub fn new(spec: &GridSpec) -> Result<Self> {
        Ok(Self {
            version_major: FORMAT_VERSION_MAJOR,
            version_minor: FORMAT_VERSION_MINOR,
            compression_enabled: spec.compression_enabled,
            crc_enabled: spec.checksum_enabled,
            n_rows: spec.n_rows,
            n_columns: spec.n_columns,
            tile_rows: spec.tile_rows,
            tile_cols: spec.tile_cols,
            n_elements: crate::error::usize_to_i32(spec.elements.len(), "element count")?,
            element_dict_offset: 0,
            metadata_dict_offset: 0,
            tile_index_offset: 0,
            free_list_offset: 0,
            spec_digest: spec.digest(),
            r2m: spec.transform.r2m,
            m2r: spec.transform.m2r,
        })
    }

    pub fn write(&self, write: &mut impl Write) -> Result<()> {
        write.write_all(&MAGIC)?;
        self.version_major.write(write)?;
        self.version_minor.write(write)?;

        let mut flags = 0_u32;
        if self.compression_enabled { flags |= FLAG_COMPRESSION_ENABLED; }
        if self.crc_enabled { flags |= FLAG_CRC_ENABLED; }
        flags.write(write)?;

        self.n_rows.write(write)?;
        self.n_columns.write(write)?;
        self.tile_rows.write(write)?;
        self.tile_cols.write(write)?;
        self.n_elements.write(write)?;

        self.element_dict_offset.write(write)?;
        self.metadata_dict_offset.write(write)?;
        self.tile_index_offset.write(write)?;
        self.free_list_offset.write(write)?;

        write.write_all(&self.spec_digest)?;

        for value in self.r2m { value.write(write)?; }
        for value in self.m2r { value.write(write)?; }

        Ok(())
    }

    pub fn read(read: &mut impl Read) -> Result<Self> {
        let mut magic = [0_u8; 4];
        read.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(Error::integrity("file header: bad magic bytes"));
        }

        let version_major = u16::read(read)?;
        let version_minor = u16::read(read)?;
        let flags = u32::read(read)?;

        let n_rows = i32::read(read)?;
        let n_columns = i32::read(read)?;
        let tile_rows = i32::read(read)?;
        let tile_cols = i32::read(read)?;
        let n_elements = i32::read(read)?;

        let element_dict_offset = u64::read(read)?;
        let metadata_dict_offset = u64::read(read)?;
        let tile_index_offset = u64::read(read)?;
        let free_list_offset = u64::read(read)?;

        let mut spec_digest = [0_u8; 16];
        read.read_exact(&mut spec_digest)?;

        let mut r2m = [0.0_f64; 6];
        for slot in &mut r2m { *slot = f64::read(read)?; }

        let mut m2r = [0.0_f64; 6];
        for slot in &mut m2r { *slot = f64::read(read)?; }

        Ok(Self {
            version_major, version_minor,
            compression_enabled: flags & FLAG_COMPRESSION_ENABLED != 0,
            crc_enabled: flags & FLAG_CRC_ENABLED != 0,
            n_rows, n_columns, tile_rows, tile_cols, n_elements,
            element_dict_offset, metadata_dict_offset, tile_index_offset, free_list_offset,
            spec_digest, r2m, m2r,
        })
    }
}

/// Encode the ordered element specifications (§3) as the element
/// dictionary record's content: `[count:u32, (nameLen:u8, name,
/// typeTag:u8, scale:f64?, offset:f64?, fillValue:i32, descLen:u16,
/// desc)...]`. Immutable once written, so there is no update path.
pub fn encode_element_dict(elements: &[ElementSpec]) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&crate::error::usize_to_u32(elements.len(), "element dictionary count")?.to_le_bytes());

    for element in elements {
        let name_bytes = element.name.as_bytes();
        bytes.push(crate::error::usize_to_u32(name_bytes.len(), "element name length")? as u8);
        bytes.extend_from_slice(name_bytes);

        let type_tag = match element.element_type {
            ElementType::I32 => 0_u8,
            ElementType::I16 => 1,
            ElementType::F32 => 2,
            ElementType::IntegerCodedFloat { .. } => 3,
        };
        bytes.push(type_tag);

        if let ElementType::IntegerCodedFloat { scale, offset } = element.element_type {
            bytes.extend_from_slice(&scale.to_le_bytes());
            bytes.extend_from_slice(&offset.to_le_bytes());
        }

        bytes.extend_from_slice(&element.fill_value.to_le_bytes());

        let description = element.description.as_deref().unwrap_or("");
        let description_bytes = description.as_bytes();
        bytes.extend_from_slice(&(crate::error::usize_to_u32(description_bytes.len(), "element description length")? as u16).to_le_bytes());
        bytes.extend_from_slice(description_bytes);
    }

    Ok(bytes)
}

pub fn decode_element_dict(bytes: &[u8]) -> Result<Vec<ElementSpec>> {
    let mut cursor = 0_usize;
    let count = take_u32(bytes, &mut cursor)? as usize;
    let mut elements = Vec::with_capacity(count);

    for _ in 0..count {
        let name_len = take_u8(bytes, &mut cursor)? as usize;
        let name = String::from_utf8(take_n(bytes, &mut cursor, name_len)?.to_vec())
            .map_err(|_| Error::integrity("element dictionary: name is not valid UTF-8"))?;

        let type_tag = take_u8(bytes, &mut cursor)?;
        let element_type = match type_tag {
            0 => ElementType::I32,
            1 => ElementType::I16,
            2 => ElementType::F32,
            3 => {
                let scale = take_f64(bytes, &mut cursor)?;
                let offset = take_f64(bytes, &mut cursor)?;
                ElementType::IntegerCodedFloat { scale, offset }
            }
            other => return Err(Error::integrity(format!("element dictionary: unknown type tag {}", other))),
        };

        let fill_value = take_i32(bytes, &mut cursor)?;

        let description_len = take_u16(bytes, &mut cursor)? as usize;
        let description_bytes = take_n(bytes, &mut cursor, description_len)?;
        let description = if description_bytes.is_empty() {
            None
        } else {
            Some(String::from_utf8(description_bytes.to_vec()).map_err(|_| Error::integrity("element dictionary: description is not valid UTF-8"))?)
        };

        let mut element = ElementSpec::new(name, element_type, fill_value)?;
        if let Some(description) = description {
            element = element.with_description(description);
        }

        elements.push(element);
    }

    Ok(elements)
}

/// Rebuild the full immutable [`GridSpec`] from a header plus its element
/// dictionary, as `open` does on an existing file.
pub fn rebuild_spec(header: &FileHeader, elements: Vec<ElementSpec>) -> Result<GridSpec> {
    let mut builder = GridSpecBuilder::new(header.n_rows, header.n_columns, header.tile_rows, header.tile_cols)
        .compression_enabled(header.compression_enabled)
        .checksum_enabled(header.crc_enabled)
        .transform(AffineTransform { r2m: header.r2m, m2r: header.m2r });

    for element in elements {
        builder = builder.add_element(element);
    }

    builder.build()
}

/// One entry in the metadata dictionary (§3): `(name, id)` addresses an
/// opaque blob stored in its own `Metadata` record at `offset`.
#[derive(Debug, Clone)]
pub struct MetadataEntry {
    pub name: String,
    pub id: i32,
    pub offset: u64,
}

pub fn encode_metadata_dict(entries: &[MetadataEntry]) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&crate::error::usize_to_u32(entries.len(), "metadata dictionary count")?.to_le_bytes());

    for entry in entries {
        let name_bytes = entry.name.as_bytes();
        bytes.extend_from_slice(&(crate::error::usize_to_u32(name_bytes.len(), "metadata name length")? as u16).to_le_bytes());
        bytes.extend_from_slice(name_bytes);
        bytes.extend_from_slice(&entry.id.to_le_bytes());
        bytes.extend_from_slice(&entry.offset.to_le_bytes());
    }

    Ok(bytes)
}

pub fn decode_metadata_dict(bytes: &[u8]) -> Result<Vec<MetadataEntry>> {
    let mut cursor = 0_usize;
    let count = take_u32(bytes, &mut cursor)? as usize;
    let mut entries = Vec::with_capacity(count);

    for _ in 0..count {
        let name_len = take_u16(bytes, &mut cursor)? as usize;
        let name = String::from_utf8(take_n(bytes, &mut cursor, name_len)?.to_vec())
            .map_err(|_| Error::integrity("metadata dictionary: name is not valid UTF-8"))?;
        let id = take_i32(bytes, &mut cursor)?;
        let offset = take_u64(bytes, &mut cursor)?;
        entries.push(MetadataEntry { name, id, offset });
    }

    Ok(entries)
}

/// Tile index: one `u64` record offset per tile, row-major over the tile
/// grid; `0` means the tile has never been written (§3: absent tiles
/// allocate nothing).
pub fn encode_tile_index(offsets: &[u64]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(offsets.len() * 8);
    for &offset in offsets {
        bytes.extend_from_slice(&offset.to_le_bytes());
    }
    bytes
}

pub fn decode_tile_index(bytes: &[u8], tile_count: usize) -> Result<Vec<u64>> {
    if bytes.len() != tile_count * 8 {
        return Err(Error::integrity("tile index: length does not match tile count"));
    }

    Ok(bytes.chunks_exact(8).map(|chunk| u64::from_le_bytes(chunk.try_into().unwrap())).collect())
}

/// Free list persistence (§4.7): "serialized to a record on close and
/// reconstructed on open".
pub fn encode_free_list(blocks: &[FreeBlock]) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&crate::error::usize_to_u32(blocks.len(), "free list count")?.to_le_bytes());

    for block in blocks {
        bytes.extend_from_slice(&block.offset.to_le_bytes());
        bytes.extend_from_slice(&block.size.to_le_bytes());
    }

    Ok(bytes)
}

pub fn decode_free_list(bytes: &[u8]) -> Result<Vec<FreeBlock>> {
    let mut cursor = 0_usize;
    let count = take_u32(bytes, &mut cursor)? as usize;
    let mut blocks = Vec::with_capacity(count);

    for _ in 0..count {
        let offset = take_u64(bytes, &mut cursor)?;
        let size = take_u32(bytes, &mut cursor)?;
        blocks.push(FreeBlock { offset, size });
    }

    Ok(blocks)
}

fn take_u8(bytes: &[u8], cursor: &mut usize) -> Result<u8> {
    let value = *bytes.get(*cursor).ok_or_else(|| Error::integrity("directory: record truncated"))?;
    *cursor += 1;
    Ok(value)
}

fn take_n<'bytes>(bytes: &'bytes [u8], cursor: &mut usize, n: usize) -> Result<&'bytes [u8]> {
    let end = *cursor + n;
    let slice = bytes.get(*cursor..end).ok_or_else(|| Error::integrity("directory: record truncated"))?;
    *cursor = end;
    Ok(slice)
}

fn take_u16(bytes: &[u8], cursor: &mut usize) -> Result<u16> {
    Ok(u16::from_le_bytes(take_n(bytes, cursor, 2)?.try_into().unwrap()))
}

fn take_u32(bytes: &[u8], cursor: &mut usize) -> Result<u32> {
    Ok(u32::from_le_bytes(take_n(bytes, cursor, 4)?.try_into().unwrap()))
}

fn take_i32(bytes: &[u8], cursor: &mut usize) -> Result<i32> {
    take_u32(bytes, cursor).map(|value| value as i32)
}

fn take_u64(bytes: &[u8], cursor: &mut usize) -> Result<u64> {
    Ok(u64::from_le_bytes(take_n(bytes, cursor, 8)?.try_into().unwrap()))
}

fn take_f64(bytes: &[u8], cursor: &mut usize) -> Result<f64> {
    Ok(f64::from_le_bytes(take_n(bytes, cursor, 8)?.try_into().unwrap()))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::spec::GridSpecBuilder;

    fn sample_spec() -> GridSpec {
        GridSpecBuilder::new(100, 200, 10, 10)
            .add_element(ElementSpec::new("elevation", ElementType::I32, -9999).unwrap())
            .add_element(ElementSpec::new("slope", ElementType::IntegerCodedFloat { scale: 1000.0, offset: 0.0 }, 0).unwrap().with_description("slope in radians"))
            .compression_enabled(true)
            .checksum_enabled(true)
            .build()
            .unwrap()
    }

    #[test]
    fn header_round_trips() {
        let spec = sample_spec();
        let header = FileHeader::new(&spec).unwrap();

        let mut buffer = Vec::new();
        header.write(&mut buffer).unwrap();
        assert_eq!(buffer.len() as u64, HEADER_SIZE);

        let mut cursor = buffer.as_slice();
        let decoded = FileHeader::read(&mut cursor).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut buffer = vec![0_u8; HEADER_SIZE as usize];
        buffer[0] = b'x';
        let mut cursor = buffer.as_slice();
        assert!(FileHeader::read(&mut cursor).is_err());
    }

    #[test]
    fn element_dict_round_trips_including_description_and_icf() {
        let spec = sample_spec();
        let encoded = encode_element_dict(&spec.elements).unwrap();
        let decoded = decode_element_dict(&encoded).unwrap();

        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].name, "elevation");
        assert_eq!(decoded[1].description.as_deref(), Some("slope in radians"));
        assert!(matches!(decoded[1].element_type, ElementType::IntegerCodedFloat { .. }));
    }

    #[test]
    fn rebuilt_spec_has_the_same_digest() {
        let spec = sample_spec();
        let header = FileHeader::new(&spec).unwrap();
        let elements = decode_element_dict(&encode_element_dict(&spec.elements).unwrap()).unwrap();
        let rebuilt = rebuild_spec(&header, elements).unwrap();
        assert_eq!(rebuilt.digest(), spec.digest());
    }

    #[test]
    fn tile_index_round_trips_with_absent_sentinels() {
        let offsets = vec![0_u64, 176, 0, 512];
        let encoded = encode_tile_index(&offsets);
        let decoded = decode_tile_index(&encoded, 4).unwrap();
        assert_eq!(decoded, offsets);
    }

    #[test]
    fn free_list_round_trips() {
        let blocks = vec![FreeBlock { offset: 176, size: 64 }, FreeBlock { offset: 512, size: 128 }];
        let encoded = encode_free_list(&blocks).unwrap();
        let decoded = decode_free_list(&encoded).unwrap();
        assert_eq!(decoded, blocks);
    }
}
