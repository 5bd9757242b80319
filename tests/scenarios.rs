//! End-to-end scenarios from the specification's §8, exercised through the
//! public API (`GvrsFile`, `inspect`) rather than any module's internals.
//! §8's S3-S6 and properties 1-4 are unit-level and already covered inside
//! `bitstream.rs`, `varint.rs`, `record/allocator.rs`, `predictor/optimal.rs`
//! and `compression/mod.rs`; this suite covers S1, S2, and properties 5-8,
//! which only make sense above the level of a single module.

use gvrs::prelude::*;
use gvrs::record;

fn one_i32_element(rows: i32, cols: i32, tile_rows: i32, tile_cols: i32, fill: i32) -> GridSpec {
    GridSpecBuilder::new(rows, cols, tile_rows, tile_cols)
        .add_element(ElementSpec::new("elevation", ElementType::I32, fill).unwrap())
        .checksum_enabled(true)
        .build()
        .unwrap()
}

/// S1: a single-tile grid; one written cell, the rest at fill, surviving a
/// close/reopen round trip.
#[test]
fn s1_single_tile_write_read_survives_reopen() {
    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("s1.gvrs");

    let mut file = GvrsFile::create_new(&path, one_i32_element(10, 10, 10, 10, -9999)).unwrap();
    file.element("elevation").unwrap().write_int(0, 0, 1).unwrap();

    assert_eq!(file.element("elevation").unwrap().read_int(0, 0).unwrap(), 1);
    assert_eq!(file.element("elevation").unwrap().read_int(9, 9).unwrap(), -9999);
    file.close().unwrap();

    let mut reopened = GvrsFile::open(&path, OpenMode::Read).unwrap();
    assert_eq!(reopened.element("elevation").unwrap().read_int(0, 0).unwrap(), 1);
    assert_eq!(reopened.element("elevation").unwrap().read_int(9, 9).unwrap(), -9999);
}

/// S2: two tiles side by side. Writing only the fill value into the second
/// tile must not grow the file; writing a real value must grow it by
/// exactly one tile record's rounded-up footprint.
#[test]
fn s2_untouched_tile_costs_nothing_written_tile_costs_one_record() {
    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("s2.gvrs");

    let spec = one_i32_element(10, 20, 10, 10, -9999);
    let mut file = GvrsFile::create_new(&path, spec).unwrap();

    for row in 0..10 {
        for col in 0..10 {
            file.element("elevation").unwrap().write_int(row, col, (row * 10 + col) as i32).unwrap();
        }
    }
    file.flush().unwrap();
    let length_before = std::fs::metadata(&path).unwrap().len();

    // Writing the fill value into the untouched tile must not allocate it.
    file.element("elevation").unwrap().write_int(0, 10, -9999).unwrap();
    file.flush().unwrap();
    assert_eq!(std::fs::metadata(&path).unwrap().len(), length_before, "writing fill must not grow the file");

    // Writing a real value allocates exactly one tile record. The codec
    // orchestrator tries compression and keeps whichever encoding is
    // smallest (possibly the raw fallback), so assert the spec's raw-size
    // formula as an upper bound on the growth rather than an exact value:
    // nearly all of tile 1 is still at its fill value after this single
    // write, which compresses well, so the actual growth is typically well
    // under this bound.
    file.element("elevation").unwrap().write_int(0, 10, 1066).unwrap();
    file.flush().unwrap();
    let length_after = std::fs::metadata(&path).unwrap().len();

    let tile_cells = 10u32 * 10;
    let tile_bytes = tile_cells * 4; // one i32 element, raw fallback length
    let per_element_len_field = 4u32;
    let tile_index_field = 4u32;
    let content_len = tile_index_field + per_element_len_field + tile_bytes;
    let max_growth = record::total_size_for(content_len, true);

    let growth = length_after - length_before;
    assert!(growth > 0, "writing a non-fill value must allocate a record");
    assert!(growth <= u64::from(max_growth), "grew by {growth}, more than the raw-storage upper bound {max_growth}");
}

/// Property 5: writes on a handle are visible to subsequent reads on that
/// same handle even when every intervening tile touch forces an eviction
/// (cache size of 1).
#[test]
fn property5_tile_cache_coherence_under_forced_eviction() {
    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("cache.gvrs");

    let spec = one_i32_element(20, 20, 5, 5, 0);
    let mut file = GvrsFile::create_new(&path, spec).unwrap();
    file.set_tile_cache_size(CacheSize::Huge(1)).unwrap();

    // Tile (0,0) and tile (0,1) are distinct tiles under a 5x5 tiling;
    // touching tile (0,1) with a cache of one slot necessarily evicts
    // tile (0,0) before it is read back.
    file.element("elevation").unwrap().write_int(0, 0, 42).unwrap();
    file.element("elevation").unwrap().write_int(0, 6, 7).unwrap(); // different tile
    assert_eq!(file.element("elevation").unwrap().read_int(0, 0).unwrap(), 42);
    assert_eq!(file.element("elevation").unwrap().read_int(0, 6).unwrap(), 7);

    file.close().unwrap();

    let mut reopened = GvrsFile::open(&path, OpenMode::Read).unwrap();
    assert_eq!(reopened.element("elevation").unwrap().read_int(0, 0).unwrap(), 42);
    assert_eq!(reopened.element("elevation").unwrap().read_int(0, 6).unwrap(), 7);
}

/// Property 6: writing only the fill value into a never-allocated tile
/// never changes the file length; writing any non-fill value does.
#[test]
fn property6_fill_value_elision() {
    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("elision.gvrs");

    let mut file = GvrsFile::create_new(&path, one_i32_element(8, 8, 8, 8, -1)).unwrap();
    file.flush().unwrap();
    let baseline = std::fs::metadata(&path).unwrap().len();

    file.element("elevation").unwrap().write_int(3, 3, -1).unwrap();
    file.flush().unwrap();
    assert_eq!(std::fs::metadata(&path).unwrap().len(), baseline);

    file.element("elevation").unwrap().write_int(3, 3, 99).unwrap();
    file.flush().unwrap();
    assert!(std::fs::metadata(&path).unwrap().len() > baseline);

    // Writing the fill value back in elides the tile's record again.
    file.element("elevation").unwrap().write_int(3, 3, -1).unwrap();
    file.flush().unwrap();
    assert_eq!(std::fs::metadata(&path).unwrap().len(), baseline);
}

/// Property 7: after an interleaving of writes (which allocate and free
/// tile records as cells return to fill), `inspect` finds no overlapping
/// records, no un-coalesced adjacent free blocks, and no free record
/// touching end-of-file.
#[test]
fn property7_allocator_algebra_holds_after_interleaved_writes() {
    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("algebra.gvrs");

    let spec = one_i32_element(40, 40, 4, 4, 0);
    let mut file = GvrsFile::create_new(&path, spec).unwrap();

    for round in 0..3 {
        for tile_row in 0..10 {
            for tile_col in 0..10 {
                let row = tile_row * 4;
                let col = tile_col * 4;
                let value = if (tile_row + tile_col + round) % 2 == 0 { (round + 1) as i32 } else { 0 };
                file.element("elevation").unwrap().write_int(row, col, value).unwrap();
            }
        }
        file.flush().unwrap();
    }
    file.close().unwrap();

    let report = gvrs::inspect::inspect(&path).unwrap();
    assert!(report.is_clean(), "unexpected findings: {:?}", report.findings);
}

/// Property 8: with CRC enabled, flipping a single byte of a tile's payload
/// after close surfaces as an `IntegrityFailure` on the next read of that
/// tile, and flipping a header byte surfaces on open.
#[test]
fn property8_single_byte_corruption_is_detected() {
    use std::io::{Seek, SeekFrom, Write};

    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("integrity.gvrs");

    let mut file = GvrsFile::create_new(&path, one_i32_element(8, 8, 8, 8, 0)).unwrap();
    file.element("elevation").unwrap().write_int(1, 1, 123).unwrap();
    file.close().unwrap();

    {
        let mut raw = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        let length = raw.seek(SeekFrom::End(0)).unwrap();
        raw.seek(SeekFrom::Start(length - 1)).unwrap();
        raw.write_all(&[0xAB]).unwrap();
    }

    let mut reopened = GvrsFile::open(&path, OpenMode::Read).unwrap();
    let result = reopened.element("elevation").unwrap().read_int(1, 1);
    assert!(matches!(result, Err(gvrs::error::Error::IntegrityFailure(_))), "got {:?}", result);
}

#[test]
fn property8_header_corruption_is_detected_on_open() {
    use std::io::{Seek, SeekFrom, Write};

    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("header.gvrs");

    GvrsFile::create_new(&path, one_i32_element(4, 4, 4, 4, 0)).unwrap().close().unwrap();

    {
        let mut raw = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        raw.seek(SeekFrom::Start(0)).unwrap();
        raw.write_all(b"XXXX").unwrap();
    }

    assert!(GvrsFile::open(&path, OpenMode::Read).is_err());
}
