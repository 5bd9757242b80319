
//! The public file handle (§6 Library surface): `GvrsFile::create_new` /
//! `open`, element accessors, metadata, flush/close, and the tunables
//! (`set_tile_cache_size`, `set_multi_thread_read_enabled`,
//! `set_index_write_enabled`). This is where the record format, the
//! allocator, the tile cache and the codec orchestrator all meet.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::compression;
use crate::directory::{self, FileHeader, MetadataEntry};
use crate::error::{Error, Result};
use crate::record::allocator::{AllocOutcome, FreeListAllocator};
use crate::record::{self, RecordType};
use crate::spec::{ElementSpec, GridSpec};
use crate::tile::{CacheSize, TileBuffer, TileCache};

/// Open mode (§6: `{read, readWrite, createNew(spec)}`; `createNew` is its
/// own constructor, [`GvrsFile::create_new`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    ReadWrite,
}

/// A handle to an open GVRS file: the directory (header, element
/// dictionary, metadata dictionary, tile index, free list), the tile cache,
/// and the allocator that lays out everything past the header.
#[derive(Debug)]
pub struct GvrsFile {
    file: File,
    path: PathBuf,
    spec: GridSpec,
    header: FileHeader,
    allocator: FreeListAllocator,
    tile_index: Vec<u64>,
    metadata: Vec<MetadataEntry>,
    cache: TileCache,
    read_write: bool,
    closed: bool,
    dirty_header: bool,
    index_write_enabled: bool,
    multi_thread_read_enabled: bool,
}

/// Magic prefix of the companion `.gvi` index file (§4.8): a cached copy of
/// the tile-offset array, keyed to the main file's spec digest and length
/// so a stale copy is detected and ignored rather than trusted blindly.
const COMPANION_MAGIC: &[u8; 4] = b"gvi\0";

impl GvrsFile {
    /// Create a new file from a specification, writing the header and an
    /// empty directory (§3: no tile is allocated until it is written to).
    pub fn create_new(path: impl AsRef<Path>, spec: GridSpec) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new().read(true).write(true).create_new(true).open(path)?;
        let mut header = FileHeader::new(&spec)?;
        let crc_enabled = spec.checksum_enabled;

        let mut cursor = directory::HEADER_SIZE;

        let element_dict_bytes = directory::encode_element_dict(&spec.elements)?;
        header.element_dict_offset = cursor;
        write_new_record(&mut file, &mut cursor, RecordType::ElementDict, &element_dict_bytes, crc_enabled)?;

        let metadata_dict_bytes = directory::encode_metadata_dict(&[])?;
        header.metadata_dict_offset = cursor;
        write_new_record(&mut file, &mut cursor, RecordType::Metadata, &metadata_dict_bytes, crc_enabled)?;

        let tile_count = crate::error::usize_to_u32(spec.tile_count() as usize, "tile count")? as usize;
        let tile_index = vec![0_u64; tile_count];
        let tile_index_bytes = directory::encode_tile_index(&tile_index);
        header.tile_index_offset = cursor;
        write_new_record(&mut file, &mut cursor, RecordType::FreeIndex, &tile_index_bytes, crc_enabled)?;

        let free_list_bytes = directory::encode_free_list(&[])?;
        header.free_list_offset = cursor;
        write_new_record(&mut file, &mut cursor, RecordType::Free, &free_list_bytes, crc_enabled)?;

        file.seek(SeekFrom::Start(0))?;
        header.write(&mut file)?;

        let allocator = FreeListAllocator::new(cursor);

        Ok(Self {
            file,
            path: path_buf,
            spec,
            header,
            allocator,
            tile_index,
            metadata: Vec::new(),
            cache: TileCache::new(CacheSize::Medium),
            read_write: true,
            closed: false,
            dirty_header: false,
            index_write_enabled: true,
            multi_thread_read_enabled: false,
        })
    }

    /// Open an existing file (§6).
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();
        let read_write = mode == OpenMode::ReadWrite;
        let mut file = OpenOptions::new().read(true).write(read_write).open(&path_buf)?;

        file.seek(SeekFrom::Start(0))?;
        let header = {
            let mut reader = BufReader::new(&mut file);
            FileHeader::read(&mut reader)?
        };

        let element_dict_content = read_record_at(&mut file, header.element_dict_offset, header.crc_enabled)?;
        let elements: Vec<ElementSpec> = directory::decode_element_dict(&element_dict_content.bytes)?;
        let spec = directory::rebuild_spec(&header, elements)?;

        let metadata_dict_content = read_record_at(&mut file, header.metadata_dict_offset, header.crc_enabled)?;
        let metadata = directory::decode_metadata_dict(&metadata_dict_content.bytes)?;

        let file_len = file.seek(SeekFrom::End(0))?;
        let tile_count = crate::error::usize_to_u32(spec.tile_count() as usize, "tile count")? as usize;

        // The companion `.gvi` file (§4.8) caches the tile-offset array for a
        // fast reopen; trust it only when its digest and recorded file length
        // still match what's actually on disk, otherwise fall back to the
        // authoritative in-file tile index record.
        let tile_index = match read_companion_index(&path_buf, header.spec_digest, file_len, tile_count) {
            Some(cached) => cached,
            None => {
                let tile_index_content = read_record_at(&mut file, header.tile_index_offset, header.crc_enabled)?;
                directory::decode_tile_index(&tile_index_content.bytes, tile_count)?
            }
        };

        let free_list_content = read_record_at(&mut file, header.free_list_offset, header.crc_enabled)?;
        let free_blocks = directory::decode_free_list(&free_list_content.bytes)?;
        let end_of_file = file.seek(SeekFrom::End(0))?;
        let allocator = FreeListAllocator::from_blocks(free_blocks, end_of_file);

        Ok(Self {
            file,
            path: path_buf,
            spec,
            header,
            allocator,
            tile_index,
            metadata,
            cache: TileCache::new(CacheSize::Medium),
            read_write,
            closed: false,
            dirty_header: false,
            index_write_enabled: true,
            multi_thread_read_enabled: false,
        })
    }

    pub fn spec(&self) -> &GridSpec {
        &self.spec
    }

    /// Borrow one element for reading or writing. The returned accessor
    /// exclusively borrows the file handle, so the borrow checker — rather
    /// than a runtime lock — enforces that at most one accessor is live at
    /// a time (§3).
    pub fn element(&mut self, name: &str) -> Result<ElementAccessor<'_>> {
        let element_index = self.spec.elements.iter().position(|element| element.name == name)
            .ok_or_else(|| Error::invalid(format!("no such element: {}", name)))?;
        Ok(ElementAccessor { file: self, element_index })
    }

    pub fn metadata(&mut self, name: &str, id: i32) -> Result<Option<Vec<u8>>> {
        self.require_open()?;

        let entry = match self.metadata.iter().find(|entry| entry.name == name && entry.id == id) {
            Some(entry) => entry.clone(),
            None => return Ok(None),
        };

        let content = read_record_at(&mut self.file, entry.offset, self.header.crc_enabled)?;
        Ok(Some(content.bytes))
    }

    pub fn store_metadata(&mut self, name: &str, id: i32, bytes: &[u8]) -> Result<()> {
        self.require_open()?;
        self.require_writable()?;

        let offset = self.allocate_and_write(RecordType::Metadata, bytes)?;

        self.metadata.retain(|entry| !(entry.name == name && entry.id == id));
        self.metadata.push(MetadataEntry { name: name.to_string(), id, offset });

        Ok(())
    }

    /// A snapshot of the directory state a [`crate::assistant::ReadingAssistant`]
    /// needs to read tiles independently of this handle's own cache (§5).
    pub(crate) fn directory_snapshot(&self) -> (FileHeader, GridSpec, Vec<u64>) {
        (self.header, self.spec.clone(), self.tile_index.clone())
    }

    pub fn set_tile_cache_size(&mut self, size: CacheSize) -> Result<()> {
        self.flush_cache()?;
        self.cache = TileCache::new(size);
        Ok(())
    }

    pub fn set_multi_thread_read_enabled(&mut self, enabled: bool) {
        self.multi_thread_read_enabled = enabled;
    }

    pub fn multi_thread_read_enabled(&self) -> bool {
        self.multi_thread_read_enabled
    }

    /// Controls whether `close` writes the companion `.gvi` index file
    /// (§4.8) — a cached copy of the tile-offset array kept alongside the
    /// main file for a fast reopen. The in-file tile index record itself is
    /// always rewritten in full on every flush regardless of this setting;
    /// this only gates the optional external cache.
    pub fn set_index_write_enabled(&mut self, enabled: bool) {
        self.index_write_enabled = enabled;
    }

    /// Flush every dirty tile, in ascending `tileIndex` order, then persist
    /// the directory (§4.6, §4.7).
    pub fn flush(&mut self) -> Result<()> {
        self.require_open()?;
        self.flush_cache()?;
        self.write_directory_records()?;
        Ok(())
    }

    /// Flush and release the handle. Per §5, an error during flush is
    /// reported but the handle is still marked closed. If the flush
    /// succeeds and the companion index file is enabled, it is (re)written
    /// last, once the tile index it caches can no longer change (§4.8).
    pub fn close(mut self) -> Result<()> {
        let flush_result = self.flush();

        let companion_result = if flush_result.is_ok() && self.index_write_enabled {
            self.persist_companion_index()
        }
        else {
            Ok(())
        };

        self.closed = true;
        flush_result.and(companion_result)
    }

    /// (Re)write the companion `.gvi` file caching `self.tile_index` (§4.8).
    fn persist_companion_index(&mut self) -> Result<()> {
        let file_len = self.file.seek(SeekFrom::End(0))?;
        write_companion_index(&self.path, self.header.spec_digest, file_len, &self.tile_index)
    }

    fn flush_cache(&mut self) -> Result<()> {
        for tile_index in self.cache.dirty_tile_indices_ascending() {
            self.write_back_tile(tile_index)?;
        }
        Ok(())
    }

    fn write_directory_records(&mut self) -> Result<()> {
        let metadata_bytes = directory::encode_metadata_dict(&self.metadata)?;
        self.rewrite_record(RecordType::Metadata, &metadata_bytes, |header| &mut header.metadata_dict_offset)?;

        // Unconditional: §4.8 says the in-file tile index record is
        // "rewritten in full on flush" regardless of the companion-file
        // setting, which only controls the external `.gvi` cache.
        let tile_index_bytes = directory::encode_tile_index(&self.tile_index);
        self.rewrite_record(RecordType::FreeIndex, &tile_index_bytes, |header| &mut header.tile_index_offset)?;

        let free_list_bytes = directory::encode_free_list(self.allocator.blocks())?;
        self.rewrite_record(RecordType::Free, &free_list_bytes, |header| &mut header.free_list_offset)?;

        if self.dirty_header {
            self.file.seek(SeekFrom::Start(0))?;
            self.header.write(&mut self.file)?;
            self.dirty_header = false;
        }

        Ok(())
    }

    /// Update a directory record in place if its existing slot is still big
    /// enough; otherwise free the old slot and allocate a new one (§4.7),
    /// updating the header's offset field either way.
    fn rewrite_record(&mut self, record_type: RecordType, bytes: &[u8], offset_field: impl Fn(&mut FileHeader) -> &mut u64) -> Result<()> {
        let old_offset = *offset_field(&mut self.header);
        let crc_enabled = self.header.crc_enabled;
        let needed = record::total_size_for(crate::error::usize_to_u32(bytes.len(), "record content length")?, crc_enabled);

        if old_offset != 0 {
            self.file.seek(SeekFrom::Start(old_offset))?;
            let existing = record::RecordHeader::read(&mut self.file)?;

            if existing.total_size >= needed {
                self.write_padded_record_at(old_offset, existing.total_size, record_type, bytes, crc_enabled)?;
                return Ok(());
            }

            self.allocator.deallocate(old_offset, existing.total_size);
        }

        let new_offset = self.allocate_and_write(record_type, bytes)?;
        *offset_field(&mut self.header) = new_offset;
        self.dirty_header = true;

        Ok(())
    }

    /// Write `payload` into an existing record slot of `slot_total_size`
    /// bytes, zero-padding out to the slot's own content capacity so the
    /// slot's footprint (and therefore every later record's offset) is
    /// unchanged.
    fn write_padded_record_at(&mut self, offset: u64, slot_total_size: u32, record_type: RecordType, payload: &[u8], crc_enabled: bool) -> Result<()> {
        let crc_bytes: u32 = if crc_enabled { 4 } else { 0 };
        let content_capacity = slot_total_size - record::HEADER_SIZE - crc_bytes;

        let mut padded = payload.to_vec();
        padded.resize(content_capacity as usize, 0);

        self.file.seek(SeekFrom::Start(offset))?;
        record::write_record(&mut self.file, record_type, &padded, crc_enabled)
    }

    /// Allocate space for `bytes` via first-fit and write the record there,
    /// extending the file as the allocator directs (§4.7).
    fn allocate_and_write(&mut self, record_type: RecordType, bytes: &[u8]) -> Result<u64> {
        let crc_enabled = self.header.crc_enabled;
        let total_size = record::total_size_for(crate::error::usize_to_u32(bytes.len(), "record content length")?, crc_enabled);
        let outcome = self.allocator.allocate(total_size);
        let offset = outcome.offset();

        self.file.seek(SeekFrom::Start(offset))?;
        record::write_record(&mut self.file, record_type, bytes, crc_enabled)?;

        if matches!(outcome, AllocOutcome::AppendAtEnd { .. } | AllocOutcome::ExtendLastBlock { .. }) {
            self.file.set_len(self.allocator.end_of_file())?;
        }

        Ok(offset)
    }

    fn tile_dims(&self) -> (u32, u32) {
        (self.spec.tile_rows as u32, self.spec.tile_cols as u32)
    }

    fn tile_location(&self, row: i32, col: i32) -> Result<(u32, u32)> {
        if row < 0 || col < 0 || row >= self.spec.n_rows || col >= self.spec.n_columns {
            return Err(Error::invalid("cell coordinates out of range"));
        }

        let (tile_rows, tile_cols) = self.tile_dims();
        Ok((row as u32 / tile_rows, col as u32 / tile_cols))
    }

    /// Make sure the tile at `(tile_row, tile_col)` is resident in the
    /// cache, loading it from disk (or synthesizing it as all-fill) and
    /// writing back whatever it evicts (§4.6).
    fn ensure_tile_loaded(&mut self, tile_row: u32, tile_col: u32) -> Result<u32> {
        let tile_index = crate::error::usize_to_u32(self.spec.tile_index(tile_row as i32, tile_col as i32) as usize, "tile index")?;

        if self.cache.contains(tile_index) {
            return Ok(tile_index);
        }

        let tile = self.load_tile(tile_index)?;
        let (_token, evicted) = self.cache.install(tile);

        if let Some(evicted_tile) = evicted {
            if evicted_tile.is_dirty() {
                self.encode_and_store_tile(&evicted_tile)?;
            }
        }

        Ok(tile_index)
    }

    fn load_tile(&mut self, tile_index: u32) -> Result<TileBuffer> {
        let offset = self.tile_index[tile_index as usize];
        let (tile_rows, tile_cols) = self.tile_dims();

        if offset == 0 {
            return Ok(TileBuffer::absent(tile_index, &self.spec.elements, tile_rows, tile_cols));
        }

        let content = read_record_at(&mut self.file, offset, self.header.crc_enabled)?;
        let bytes = &content.bytes;

        let mut cursor = 0_usize;
        let stored_tile_index = take_u32(bytes, &mut cursor)?;
        if stored_tile_index != tile_index {
            return Err(Error::integrity("tile record: stored tile index does not match the tile index entry"));
        }

        let element_count = self.spec.elements.len();
        let mut lengths = Vec::with_capacity(element_count);
        for _ in 0..element_count {
            lengths.push(take_u32(bytes, &mut cursor)?);
        }

        let raw_len = (tile_rows as usize) * (tile_cols as usize) * 4;
        let mut buffers = Vec::with_capacity(element_count);

        for &length in &lengths {
            let stored_uncompressed = length == 0;
            let slice_len = if stored_uncompressed { raw_len } else { length as usize };
            let slice = bytes.get(cursor..cursor + slice_len).ok_or_else(|| Error::integrity("tile record: truncated element payload"))?;
            cursor += slice_len;

            let (samples, _checksum) = compression::decode_tile(slice, tile_rows, tile_cols, stored_uncompressed)?;
            buffers.push(crate::tile::ElementBuffer::from_cells(samples, tile_rows, tile_cols));
        }

        Ok(TileBuffer::loaded(tile_index, buffers))
    }

    /// Encode a dirty tile and write it back, either in place or via a
    /// fresh allocation, or free its slot entirely if every element has
    /// settled back to its fill value (§3: all-fill tiles are elided).
    fn encode_and_store_tile(&mut self, tile: &TileBuffer) -> Result<()> {
        let (tile_rows, tile_cols) = self.tile_dims();

        let all_fill = self.spec.elements.iter().enumerate()
            .all(|(index, element)| tile.element(index).is_all_fill(element.fill_value));

        if all_fill {
            self.free_tile_record(tile.tile_index)?;
            return Ok(());
        }

        let mut encoded_elements = Vec::with_capacity(self.spec.elements.len());
        for index in 0..self.spec.elements.len() {
            let buffer = tile.element(index);
            let checksum = if self.header.crc_enabled {
                let native_bytes: Vec<u8> = buffer.cells().iter().flat_map(|value| value.to_le_bytes()).collect();
                Some(crate::crc::checksum(&native_bytes))
            } else {
                None
            };

            let encoded = if self.spec.compression_enabled {
                compression::encode_tile(buffer.cells(), tile_rows, tile_cols, checksum)?
            } else {
                compression::EncodedTile {
                    bytes: buffer.cells().iter().flat_map(|value| value.to_le_bytes()).collect(),
                    stored_uncompressed: true,
                }
            };

            encoded_elements.push(encoded);
        }

        let mut payload = Vec::new();
        payload.extend_from_slice(&tile.tile_index.to_le_bytes());

        for encoded in &encoded_elements {
            let length_field = if encoded.stored_uncompressed { 0_u32 } else { crate::error::usize_to_u32(encoded.bytes.len(), "element payload length")? };
            payload.extend_from_slice(&length_field.to_le_bytes());
        }

        for encoded in &encoded_elements {
            payload.extend_from_slice(&encoded.bytes);
        }

        let old_offset = self.tile_index[tile.tile_index as usize];
        let crc_enabled = self.header.crc_enabled;
        let needed = record::total_size_for(crate::error::usize_to_u32(payload.len(), "tile record length")?, crc_enabled);

        if old_offset != 0 {
            self.file.seek(SeekFrom::Start(old_offset))?;
            let existing = record::RecordHeader::read(&mut self.file)?;

            if existing.total_size >= needed {
                self.write_padded_record_at(old_offset, existing.total_size, RecordType::Tile, &payload, crc_enabled)?;
                return Ok(());
            }

            self.allocator.deallocate(old_offset, existing.total_size);
        }

        let new_offset = self.allocate_and_write(RecordType::Tile, &payload)?;
        self.tile_index[tile.tile_index as usize] = new_offset;

        Ok(())
    }

    fn write_back_tile(&mut self, tile_index: u32) -> Result<()> {
        let tile = self.cache.get_mut(tile_index).expect("dirty tile reported by the cache must still be cached").clone();
        self.encode_and_store_tile(&tile)?;
        self.cache.get_mut(tile_index).expect("tile is still cached").mark_clean();
        Ok(())
    }

    fn free_tile_record(&mut self, tile_index: u32) -> Result<()> {
        let old_offset = self.tile_index[tile_index as usize];
        if old_offset == 0 {
            return Ok(());
        }

        self.file.seek(SeekFrom::Start(old_offset))?;
        let existing = record::RecordHeader::read(&mut self.file)?;
        self.allocator.deallocate(old_offset, existing.total_size);
        self.tile_index[tile_index as usize] = 0;

        Ok(())
    }

    fn require_open(&self) -> Result<()> {
        if self.closed { Err(Error::AlreadyClosed) } else { Ok(()) }
    }

    fn require_writable(&self) -> Result<()> {
        if !self.read_write { Err(Error::invalid("file was opened read-only")) } else { Ok(()) }
    }
}

/// A view onto one element, exclusively borrowing the file handle (§3:
/// "an element accessor's handle may not outlive the file handle, and at
/// most one accessor may be live at a time").
#[derive(Debug)]
pub struct ElementAccessor<'file> {
    file: &'file mut GvrsFile,
    element_index: usize,
}

impl<'file> ElementAccessor<'file> {
    fn element_spec(&self) -> &ElementSpec {
        &self.file.spec.elements[self.element_index]
    }

    pub fn read_int(&mut self, row: i32, col: i32) -> Result<i32> {
        let cell = self.read_cell(row, col)?;
        Ok(self.element_spec().element_type.cell_to_int(cell))
    }

    pub fn read_float(&mut self, row: i32, col: i32) -> Result<f64> {
        let cell = self.read_cell(row, col)?;
        Ok(self.element_spec().element_type.cell_to_float(cell))
    }

    pub fn write_int(&mut self, row: i32, col: i32, value: i32) -> Result<()> {
        let cell = self.element_spec().element_type.int_to_cell(value)?;
        self.write_cell(row, col, cell)
    }

    pub fn write_float(&mut self, row: i32, col: i32, value: f64) -> Result<()> {
        let cell = self.element_spec().element_type.float_to_cell(value)?;
        self.write_cell(row, col, cell)
    }

    pub fn read_block_int(&mut self, row: i32, col: i32, rows: i32, cols: i32) -> Result<Vec<i32>> {
        let mut out = Vec::with_capacity((rows.max(0) * cols.max(0)) as usize);
        for dr in 0..rows {
            for dc in 0..cols {
                out.push(self.read_int(row + dr, col + dc)?);
            }
        }
        Ok(out)
    }

    pub fn write_block(&mut self, row: i32, col: i32, rows: i32, cols: i32, values: &[i32]) -> Result<()> {
        if values.len() != (rows.max(0) * cols.max(0)) as usize {
            return Err(Error::invalid("write_block: buffer length does not match rows*cols"));
        }

        let mut index = 0;
        for dr in 0..rows {
            for dc in 0..cols {
                self.write_int(row + dr, col + dc, values[index])?;
                index += 1;
            }
        }
        Ok(())
    }

    fn read_cell(&mut self, row: i32, col: i32) -> Result<i32> {
        self.file.require_open()?;
        let (tile_row, tile_col) = self.file.tile_location(row, col)?;
        let tile_index = self.file.ensure_tile_loaded(tile_row, tile_col)?;

        let (tile_rows, tile_cols) = self.file.tile_dims();
        let local_row = row as u32 % tile_rows;
        let local_col = col as u32 % tile_cols;

        let tile = self.file.cache.get_mut(tile_index).expect("just-loaded tile must be cached");
        Ok(tile.element(self.element_index).get(local_row, local_col))
    }

    fn write_cell(&mut self, row: i32, col: i32, cell: i32) -> Result<()> {
        self.file.require_open()?;
        self.file.require_writable()?;

        let (tile_row, tile_col) = self.file.tile_location(row, col)?;
        let tile_index = self.file.ensure_tile_loaded(tile_row, tile_col)?;

        let (tile_rows, tile_cols) = self.file.tile_dims();
        let local_row = row as u32 % tile_rows;
        let local_col = col as u32 % tile_cols;

        let element_index = self.element_index;
        let tile = self.file.cache.get_mut(tile_index).expect("just-loaded tile must be cached");
        tile.write_cell(element_index, local_row, local_col, cell)
    }
}

fn take_u32(bytes: &[u8], cursor: &mut usize) -> Result<u32> {
    let slice = bytes.get(*cursor..*cursor + 4).ok_or_else(|| Error::integrity("tile record: truncated header"))?;
    *cursor += 4;
    Ok(u32::from_le_bytes(slice.try_into().unwrap()))
}

fn read_record_at(file: &mut File, offset: u64, crc_enabled: bool) -> Result<record::RecordContent> {
    file.seek(SeekFrom::Start(offset))?;
    record::read_record(file, crc_enabled)
}

fn write_new_record(file: &mut File, cursor: &mut u64, record_type: RecordType, bytes: &[u8], crc_enabled: bool) -> Result<()> {
    file.seek(SeekFrom::Start(*cursor))?;
    record::write_record(file, record_type, bytes, crc_enabled)?;
    *cursor += u64::from(record::total_size_for(crate::error::usize_to_u32(bytes.len(), "record content length")?, crc_enabled));
    Ok(())
}

fn companion_index_path(path: &Path) -> PathBuf {
    path.with_extension("gvi")
}

/// Read the companion `.gvi` file next to `path`, returning its cached
/// tile-offset array only if present and still current: same spec digest,
/// same main-file length, same tile count. Any mismatch, missing file, or
/// malformed content is treated as a cache miss, not an error — the caller
/// falls back to the in-file tile index record.
fn read_companion_index(path: &Path, expected_digest: [u8; 16], expected_file_len: u64, expected_tile_count: usize) -> Option<Vec<u64>> {
    let mut file = File::open(companion_index_path(path)).ok()?;

    let mut magic = [0_u8; 4];
    file.read_exact(&mut magic).ok()?;
    if &magic != COMPANION_MAGIC {
        return None;
    }

    let mut digest = [0_u8; 16];
    file.read_exact(&mut digest).ok()?;
    if digest != expected_digest {
        return None;
    }

    let mut file_len_bytes = [0_u8; 8];
    file.read_exact(&mut file_len_bytes).ok()?;
    if u64::from_le_bytes(file_len_bytes) != expected_file_len {
        return None;
    }

    let mut tile_count_bytes = [0_u8; 8];
    file.read_exact(&mut tile_count_bytes).ok()?;
    let tile_count = u64::from_le_bytes(tile_count_bytes) as usize;
    if tile_count != expected_tile_count {
        return None;
    }

    let mut tile_index = Vec::with_capacity(tile_count);
    for _ in 0..tile_count {
        let mut offset_bytes = [0_u8; 8];
        file.read_exact(&mut offset_bytes).ok()?;
        tile_index.push(u64::from_le_bytes(offset_bytes));
    }

    Some(tile_index)
}

fn write_companion_index(path: &Path, spec_digest: [u8; 16], file_len: u64, tile_index: &[u64]) -> Result<()> {
    let mut file = File::create(companion_index_path(path))?;
    file.write_all(COMPANION_MAGIC)?;
    file.write_all(&spec_digest)?;
    file.write_all(&file_len.to_le_bytes())?;
    file.write_all(&(tile_index.len() as u64).to_le_bytes())?;
    for &offset in tile_index {
        file.write_all(&offset.to_le_bytes())?;
    }
    Ok(())
}
