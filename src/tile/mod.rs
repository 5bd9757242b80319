
//! Tile buffers and the write-back cache holding them (§3, §4.6).

pub mod buffer;
pub mod cache;

pub use buffer::{ElementBuffer, TileBuffer, TileState};
pub use cache::{CacheSize, TileCache, TileToken};
