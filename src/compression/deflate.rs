
//! Thin DEFLATE backend adapter (§4.3): a stock compressor wrapping
//! `miniz_oxide` for the encode side and `zune-inflate` for decode, mirroring
//! the shape of the teacher's zlib-backed ZIP backend but built over raw
//! DEFLATE (no zlib header/checksum, since this crate carries its own
//! CRC-32C when integrity checking is enabled).

use miniz_oxide::deflate::compress_to_vec;
use zune_inflate::DeflateDecoder;
use zune_inflate::errors::InflateDecodeErrors;

use crate::error::{Error, Result};

/// 0 (store) .. 10 (best); matches `miniz_oxide`'s scale.
const COMPRESSION_LEVEL: u8 = 6;

pub fn compress(input: &[u8]) -> Result<Vec<u8>> {
    Ok(compress_to_vec(input, COMPRESSION_LEVEL))
}

pub fn decompress(compressed: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    let mut decoder = DeflateDecoder::new(compressed);
    let decompressed = decoder.decode_deflate()
        .map_err(map_inflate_error)?;

    if decompressed.len() != expected_len {
        return Err(Error::integrity("deflate: decompressed length does not match the tile codec header"));
    }

    Ok(decompressed)
}

fn map_inflate_error(error: InflateDecodeErrors) -> Error {
    Error::integrity(format!("deflate: {}", error))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trip_text() {
        let input = b"the quick brown fox jumps over the lazy dog ".repeat(20);
        let compressed = compress(&input).unwrap();
        let decompressed = decompress(&compressed, input.len()).unwrap();
        assert_eq!(decompressed, input);
        assert!(compressed.len() < input.len());
    }

    #[test]
    fn round_trip_empty() {
        let compressed = compress(&[]).unwrap();
        let decompressed = decompress(&compressed, 0).unwrap();
        assert!(decompressed.is_empty());
    }

    #[test]
    fn length_mismatch_is_integrity_failure() {
        let input = vec![7_u8; 64];
        let compressed = compress(&input).unwrap();
        assert!(decompress(&compressed, 63).is_err());
    }
}
