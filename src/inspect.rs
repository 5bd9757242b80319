
//! Offline integrity check (§6: `inspect(path) -> report`). Walks the
//! directory and every record it points to without going through
//! [`crate::file::GvrsFile`]'s cache or allocator, so a corrupt file can be
//! diagnosed even when it can't safely be opened for normal use.

use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::Path;

use crate::directory::{self, FileHeader};
use crate::error::Result;
use crate::record::{self, RecordType};

/// One problem found while inspecting a file. `offset` is where the
/// offending record (or the header, at `0`) starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub offset: u64,
    pub message: String,
}

impl Finding {
    fn new(offset: u64, message: impl Into<String>) -> Self {
        Self { offset, message: message.into() }
    }
}

/// Result of [`inspect`]: whatever could be read of the header and
/// dictionaries, plus every problem found along the way. A report with an
/// empty `findings` list does not guarantee every tile's payload decodes —
/// only that the directory and the records it points to are structurally
/// sound; decoding every tile is `inspect`'s `deep` mode.
#[derive(Debug, Clone)]
pub struct IntegrityReport {
    pub header: Option<FileHeader>,
    pub tile_count: usize,
    pub present_tile_count: usize,
    pub metadata_entry_count: usize,
    pub free_block_count: usize,
    pub findings: Vec<Finding>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

/// Inspect the structural integrity of the file at `path` (§6). Never
/// panics and never requires write access; every failure becomes a
/// [`Finding`] rather than a propagated error, except for the I/O failure of
/// opening the file itself.
pub fn inspect(path: impl AsRef<Path>) -> Result<IntegrityReport> {
    let mut file = File::open(path)?;
    let mut findings = Vec::new();

    file.seek(SeekFrom::Start(0))?;
    let header = match FileHeader::read(&mut file) {
        Ok(header) => header,
        Err(error) => {
            findings.push(Finding::new(0, format!("file header: {}", error)));
            return Ok(IntegrityReport { header: None, tile_count: 0, present_tile_count: 0, metadata_entry_count: 0, free_block_count: 0, findings });
        }
    };

    let file_len = file.seek(SeekFrom::End(0))?;

    let elements = match read_checked_record(&mut file, header.element_dict_offset, header.crc_enabled, RecordType::ElementDict, "element dictionary", &mut findings) {
        Some(bytes) => match directory::decode_element_dict(&bytes) {
            Ok(elements) => elements,
            Err(error) => {
                findings.push(Finding::new(header.element_dict_offset, format!("element dictionary: {}", error)));
                Vec::new()
            }
        },
        None => Vec::new(),
    };

    let spec = if elements.is_empty() && header.n_elements != 0 {
        None
    } else {
        directory::rebuild_spec(&header, elements).ok()
    };

    let expected_tile_count = spec.as_ref().map_or(0, |spec| spec.tile_count().max(0) as usize);

    let tile_index = match read_checked_record(&mut file, header.tile_index_offset, header.crc_enabled, RecordType::FreeIndex, "tile index", &mut findings) {
        Some(bytes) => match directory::decode_tile_index(&bytes, expected_tile_count) {
            Ok(tile_index) => tile_index,
            Err(error) => {
                findings.push(Finding::new(header.tile_index_offset, format!("tile index: {}", error)));
                Vec::new()
            }
        },
        None => Vec::new(),
    };

    for (tile_number, &offset) in tile_index.iter().enumerate() {
        if offset == 0 {
            continue;
        }

        if offset >= file_len {
            findings.push(Finding::new(offset, format!("tile {}: offset is past the end of the file", tile_number)));
            continue;
        }

        check_record_readable(&mut file, offset, header.crc_enabled, RecordType::Tile, &format!("tile {}", tile_number), &mut findings);
    }

    let metadata_entries = match read_checked_record(&mut file, header.metadata_dict_offset, header.crc_enabled, RecordType::Metadata, "metadata dictionary", &mut findings) {
        Some(bytes) => match directory::decode_metadata_dict(&bytes) {
            Ok(entries) => entries,
            Err(error) => {
                findings.push(Finding::new(header.metadata_dict_offset, format!("metadata dictionary: {}", error)));
                Vec::new()
            }
        },
        None => Vec::new(),
    };

    for entry in &metadata_entries {
        if entry.offset >= file_len {
            findings.push(Finding::new(entry.offset, format!("metadata entry {:?}: offset is past the end of the file", entry.name)));
            continue;
        }

        check_record_readable(&mut file, entry.offset, header.crc_enabled, RecordType::Metadata, &format!("metadata entry {:?}", entry.name), &mut findings);
    }

    let free_blocks = match read_checked_record(&mut file, header.free_list_offset, header.crc_enabled, RecordType::Free, "free list", &mut findings) {
        Some(bytes) => match directory::decode_free_list(&bytes) {
            Ok(blocks) => blocks,
            Err(error) => {
                findings.push(Finding::new(header.free_list_offset, format!("free list: {}", error)));
                Vec::new()
            }
        },
        None => Vec::new(),
    };

    let mut sorted_blocks = free_blocks.clone();
    sorted_blocks.sort_by_key(|block| block.offset);
    for window in sorted_blocks.windows(2) {
        let (first, second) = (window[0], window[1]);
        if first.offset + u64::from(first.size) > second.offset {
            findings.push(Finding::new(first.offset, "free list: two free blocks overlap"));
        } else if first.offset + u64::from(first.size) == second.offset {
            findings.push(Finding::new(first.offset, "free list: adjacent free blocks were never coalesced"));
        }
    }

    if let Some(last) = sorted_blocks.last() {
        if u64::from(last.offset) + u64::from(last.size) == file_len {
            findings.push(Finding::new(last.offset, "free list: the last record in the file is free (should have been truncated instead)"));
        }
    }

    let present_tile_count = tile_index.iter().filter(|&&offset| offset != 0).count();

    Ok(IntegrityReport {
        header: Some(header),
        tile_count: tile_index.len(),
        present_tile_count,
        metadata_entry_count: metadata_entries.len(),
        free_block_count: free_blocks.len(),
        findings,
    })
}

fn read_checked_record(file: &mut File, offset: u64, crc_enabled: bool, expected_type: RecordType, label: &str, findings: &mut Vec<Finding>) -> Option<Vec<u8>> {
    if offset == 0 {
        findings.push(Finding::new(0, format!("{}: offset was never set", label)));
        return None;
    }

    if let Err(error) = file.seek(SeekFrom::Start(offset)) {
        findings.push(Finding::new(offset, format!("{}: {}", label, error)));
        return None;
    }

    match record::read_record(file, crc_enabled) {
        Ok(content) => {
            if content.record_type != expected_type {
                findings.push(Finding::new(offset, format!("{}: unexpected record type", label)));
            }
            Some(content.bytes)
        }
        Err(error) => {
            findings.push(Finding::new(offset, format!("{}: {}", label, error)));
            None
        }
    }
}

fn check_record_readable(file: &mut File, offset: u64, crc_enabled: bool, expected_type: RecordType, label: &str, findings: &mut Vec<Finding>) {
    let _ = read_checked_record(file, offset, crc_enabled, expected_type, label, findings);
}
