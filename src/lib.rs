

#![warn(
    rust_2018_idioms,
    future_incompatible,
    unused_extern_crates,
    unused,

    missing_copy_implementations,
    missing_debug_implementations,

    clippy::all,
    clippy::restriction,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
)]

#![deny(
    unused_variables,
    unused_assignments,
    dead_code,
    unused_must_use,
    missing_copy_implementations,
    trivial_numeric_casts,
    redundant_semicolon
)]

#![forbid(unsafe_code)]

//! GVRS is a tiled storage engine and file format for large two-dimensional
//! raster grids: a fixed-size file header and record-based directory
//! (element dictionary, metadata dictionary, tile index, free list), a
//! bounded write-back tile cache, and a per-tile compression pipeline
//! (predictor transforms over M32-encoded residuals, entropy-coded by
//! either a from-scratch canonical Huffman coder or a DEFLATE backend).

pub mod error;
pub mod io;
pub mod math;
pub mod crc;
pub mod bitstream;
pub mod varint;
pub mod predictor;
pub mod compression;
pub mod spec;
pub mod record;
pub mod tile;
pub mod directory;
pub mod file;
pub mod assistant;
pub mod inspect;

/// Re-exports of the types most programs opening or building a GVRS file
/// need, following the teacher's own top-level prelude convention.
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::math::Vec2;
    pub use crate::spec::{AffineTransform, ElementSpec, ElementType, GridSpec, GridSpecBuilder};
    pub use crate::file::{ElementAccessor, GvrsFile, OpenMode};
    pub use crate::tile::CacheSize;
    pub use crate::inspect::{inspect, IntegrityReport};
}
