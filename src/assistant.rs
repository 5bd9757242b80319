
//! The reading assistant (§5): an optional single background thread that
//! reads ahead of the caller, decoding tiles off a second, independent file
//! handle so the main thread never blocks on I/O it could have started
//! earlier. Concurrency stays within the file's single-writer/single-reader
//! model — the assistant is a read-only shadow of the handle that spawned
//! it, never a second writer.
//!
//! Requests and responses cross a bounded SPSC channel
//! ([`std::sync::mpsc::sync_channel`]); a full request channel applies
//! backpressure rather than letting read-ahead run unbounded. Liveness is
//! exposed through [`ReadingAssistant::is_running`], an atomic flag flipped
//! at thread entry and exit — simpler and more portable than recovering
//! lifecycle state from the OS thread name.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::compression;
use crate::directory::FileHeader;
use crate::error::{Error, Result};
use crate::spec::{ElementSpec, GridSpec};
use crate::tile::TileBuffer;

/// Depth of the request and response channels. Small on purpose: the point
/// is to overlap one tile's I/O with the caller's processing of the
/// previous one, not to buffer the whole file in memory.
const CHANNEL_DEPTH: usize = 4;

enum Request {
    Fetch(u32),
    Stop,
}

/// One decoded tile, or the error encountered trying to produce it. A
/// decode failure is reported here rather than panicking the worker thread,
/// so it surfaces to the caller as an ordinary `IntegrityFailure` the next
/// time they ask for that tile.
#[derive(Debug)]
pub struct TileResponse {
    pub tile_index: u32,
    pub result: Result<TileBuffer>,
}

/// A background reader shadowing one open [`crate::file::GvrsFile`] (§5).
/// Spawn it with a snapshot of the directory state at the moment reading
/// ahead becomes useful; it never observes writes made after that snapshot,
/// consistent with single-writer/single-reader semantics.
pub struct ReadingAssistant {
    request_tx: SyncSender<Request>,
    response_rx: Receiver<TileResponse>,
    handle: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

impl ReadingAssistant {
    /// Start the background thread. `tile_index` is a snapshot of the
    /// directory's tile offsets at spawn time (§3: `0` means never written).
    pub fn spawn(path: impl AsRef<Path>, header: FileHeader, spec: GridSpec, tile_index: Vec<u64>) -> Result<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let (request_tx, request_rx) = sync_channel::<Request>(CHANNEL_DEPTH);
        let (response_tx, response_rx) = sync_channel::<TileResponse>(CHANNEL_DEPTH);
        let running = Arc::new(AtomicBool::new(false));
        let running_for_thread = Arc::clone(&running);

        let handle = std::thread::Builder::new()
            .name("gvrs-reading-assistant".into())
            .spawn(move || run(path, header, spec, tile_index, request_rx, response_tx, running_for_thread))
            .map_err(|io_error| Error::Io(io_error))?;

        Ok(Self { request_tx, response_rx, handle: Some(handle), running })
    }

    /// Whether the worker thread is still alive. A caller can use this to
    /// decide whether to fall back to a synchronous read after a channel
    /// send fails.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask the assistant to start decoding `tile_index`. Blocks briefly if
    /// the request channel is already full (§5: bounded, not unbounded
    /// read-ahead).
    pub fn request_tile(&self, tile_index: u32) -> Result<()> {
        self.request_tx.send(Request::Fetch(tile_index)).map_err(|_| Error::integrity("reading assistant: worker thread is gone"))
    }

    /// Take the next completed tile, waiting up to `timeout`.
    pub fn recv_tile(&self, timeout: Duration) -> Result<TileResponse> {
        match self.response_rx.recv_timeout(timeout) {
            Ok(response) => Ok(response),
            Err(RecvTimeoutError::Timeout) => Err(Error::WouldBlock),
            Err(RecvTimeoutError::Disconnected) => Err(Error::integrity("reading assistant: worker thread is gone")),
        }
    }

    /// A completed tile if one is already waiting, without blocking.
    pub fn try_recv_tile(&self) -> Option<TileResponse> {
        self.response_rx.try_recv().ok()
    }

    /// Stop the assistant unconditionally, including on an error path (§5:
    /// "the assistant is stopped unconditionally on close"). Never panics;
    /// a worker that already exited is a no-op.
    pub fn stop(mut self) {
        let _ = self.request_tx.send(Request::Stop);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ReadingAssistant {
    fn drop(&mut self) {
        let _ = self.request_tx.send(Request::Stop);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run(path: PathBuf, header: FileHeader, spec: GridSpec, tile_index: Vec<u64>, request_rx: Receiver<Request>, response_tx: SyncSender<TileResponse>, running: Arc<AtomicBool>) {
    running.store(true, Ordering::Release);

    let mut file = match std::fs::File::open(&path) {
        Ok(file) => file,
        Err(_) => {
            running.store(false, Ordering::Release);
            return;
        }
    };

    while let Ok(request) = request_rx.recv() {
        let requested_tile = match request {
            Request::Fetch(tile_index) => tile_index,
            Request::Stop => break,
        };

        let result = decode_one_tile(&mut file, &header, &spec, &tile_index, requested_tile);
        if response_tx.send(TileResponse { tile_index: requested_tile, result }).is_err() {
            break;
        }
    }

    running.store(false, Ordering::Release);
}

fn decode_one_tile(file: &mut std::fs::File, header: &FileHeader, spec: &GridSpec, tile_index: &[u64], requested_tile: u32) -> Result<TileBuffer> {
    use std::io::{Seek, SeekFrom};

    let tile_rows = spec.tile_rows as u32;
    let tile_cols = spec.tile_cols as u32;

    let offset = *tile_index.get(requested_tile as usize).ok_or_else(|| Error::invalid("reading assistant: tile index out of range"))?;

    if offset == 0 {
        return Ok(TileBuffer::absent(requested_tile, &spec.elements, tile_rows, tile_cols));
    }

    file.seek(SeekFrom::Start(offset))?;
    let content = crate::record::read_record(file, header.crc_enabled)?;
    let bytes = &content.bytes;

    let mut cursor = 0_usize;
    let stored_tile_index = take_u32(bytes, &mut cursor)?;
    if stored_tile_index != requested_tile {
        return Err(Error::integrity("reading assistant: stored tile index does not match the tile index entry"));
    }

    let element_count = spec.elements.len();
    let mut lengths = Vec::with_capacity(element_count);
    for _ in 0..element_count {
        lengths.push(take_u32(bytes, &mut cursor)?);
    }

    let raw_len = (tile_rows as usize) * (tile_cols as usize) * 4;
    let mut buffers = Vec::with_capacity(element_count);

    for &length in &lengths {
        let stored_uncompressed = length == 0;
        let slice_len = if stored_uncompressed { raw_len } else { length as usize };
        let slice = bytes.get(cursor..cursor + slice_len).ok_or_else(|| Error::integrity("reading assistant: truncated element payload"))?;
        cursor += slice_len;

        let (samples, _checksum) = compression::decode_tile(slice, tile_rows, tile_cols, stored_uncompressed)?;
        buffers.push(crate::tile::ElementBuffer::from_cells(samples, tile_rows, tile_cols));
    }

    Ok(TileBuffer::loaded(requested_tile, buffers))
}

fn take_u32(bytes: &[u8], cursor: &mut usize) -> Result<u32> {
    let slice = bytes.get(*cursor..*cursor + 4).ok_or_else(|| Error::integrity("reading assistant: truncated header"))?;
    *cursor += 4;
    Ok(u32::from_le_bytes(slice.try_into().unwrap()))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::file::{GvrsFile, OpenMode};
    use crate::spec::{ElementSpec, ElementType, GridSpecBuilder};

    fn sample_spec() -> GridSpec {
        GridSpecBuilder::new(20, 20, 4, 4)
            .add_element(ElementSpec::new("elevation", ElementType::I32, -9999).unwrap())
            .build()
            .unwrap()
    }

    fn snapshot(path: &Path) -> (FileHeader, GridSpec, Vec<u64>) {
        let file = GvrsFile::open(path, OpenMode::Read).unwrap();
        file.directory_snapshot()
    }

    #[test]
    fn assistant_decodes_a_tile_written_before_it_was_spawned() {
        let directory_handle = tempfile::tempdir().unwrap();
        let path = directory_handle.path().join("grid.gvrs");

        {
            let mut file = GvrsFile::create_new(&path, sample_spec()).unwrap();
            file.element("elevation").unwrap().write_int(5, 5, 777).unwrap();
            file.close().unwrap();
        }

        let (header, spec, tile_index) = snapshot(&path);
        let assistant = ReadingAssistant::spawn(&path, header, spec, tile_index).unwrap();

        assistant.request_tile(0).unwrap();
        let response = assistant.recv_tile(Duration::from_secs(1)).unwrap();
        assert_eq!(response.tile_index, 0);
        let tile = response.result.unwrap();
        assert_eq!(tile.element(0).get(5 % 4, 5 % 4), 777);

        assistant.stop();
    }

    #[test]
    fn stop_joins_the_worker_thread_without_panicking() {
        let directory_handle = tempfile::tempdir().unwrap();
        let path = directory_handle.path().join("grid.gvrs");
        GvrsFile::create_new(&path, sample_spec()).unwrap().close().unwrap();

        let (header, spec, tile_index) = snapshot(&path);
        let assistant = ReadingAssistant::spawn(&path, header, spec, tile_index).unwrap();
        assistant.stop();
    }
}
