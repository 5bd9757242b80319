
//! Tile codec orchestrator (§4.5): tries every configured predictor against
//! every configured entropy backend over a tile's residuals, keeps the
//! smallest encoding, and falls back to storing the tile uncompressed when
//! nothing improves on that. Mirrors the dispatch-by-id shape of the
//! teacher's `Compression::compress_image_section`/`decompress_image_section`,
//! generalized from a fixed enum of whole-image codecs to a registry of
//! per-tile (predictor, backend) pairs.
//!
//! Header layout, written by [`encode_tile`] and consumed by [`decode_tile`]:
//!
//! `[codecId:u8, predictorId:u8, backendId:u8, seed:i32, paramsLen:u32,
//!   params, initializerRawLen:u32, initializerPackedLen:u32,
//!   interiorRawLen:u32, interiorPackedLen:u32, flags:u8, crc:u32?]`
//! followed by the packed initializer bytes, then the packed interior bytes.
//!
//! The spec names only `initializerLen`/`interiorLen`; this crate stores
//! both the pre-compression (raw M32 byte stream) and post-compression
//! length for each of the two residual streams, the same way a zip local
//! file header carries both a compressed and an uncompressed size, since
//! neither raw DEFLATE nor this crate's from-scratch Huffman coding is
//! self-delimiting without one.

mod deflate;
mod huffman;

use crate::error::{Error, Result};
use crate::predictor::{Differencing, Linear, Optimal12, Predictor, PredictorId, Triangle};

/// One-byte id stored in the tile codec header identifying the entropy
/// backend that encoded the residual streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendId {
    Huffman = 0,
    Deflate = 1,
}

impl BackendId {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(BackendId::Huffman),
            1 => Some(BackendId::Deflate),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 { self as u8 }
}

/// A registered tile codec: a name known in the file specification plus the
/// (predictor, backend) pairs it is willing to try. This crate ships one
/// built-in codec; additional ids are reserved for file-specific registries.
pub const DEFAULT_CODEC_ID: u8 = 0;

const PREDICTORS: &[(PredictorId, &dyn Predictor)] = &[
    (PredictorId::Differencing, &Differencing),
    (PredictorId::Linear, &Linear),
    (PredictorId::Triangle, &Triangle),
    (PredictorId::Optimal12, &Optimal12),
];

const BACKENDS: &[BackendId] = &[BackendId::Huffman, BackendId::Deflate];

/// Bit 7 of the tile codec header's flags byte: an original-value CRC-32C
/// of the uncompressed tile follows the header, for cross-implementation
/// validation (§4.5).
const FLAG_CRC_PRESENT: u8 = 0b1000_0000;

/// Result of encoding one tile. `stored_uncompressed` mirrors the tile
/// record's per-element length field being set to 0 (§4.5): the caller
/// (the record manager) uses it, not the byte content, to tell the two
/// cases apart on disk.
pub struct EncodedTile {
    pub bytes: Vec<u8>,
    pub stored_uncompressed: bool,
}

fn m32_encode_all(values: &[i32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 2);
    for &value in values {
        crate::varint::encode(value, &mut out);
    }

    out
}

fn m32_decode_all(bytes: &[u8], count: usize) -> Result<Vec<i32>> {
    let mut cursor = 0;
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(crate::varint::decode(bytes, &mut cursor)?);
    }

    Ok(values)
}

fn pack_stream(backend: BackendId, raw: &[u8]) -> Option<Vec<u8>> {
    if raw.is_empty() {
        return Some(Vec::new());
    }

    match backend {
        BackendId::Huffman => huffman::compress(raw).ok(),
        BackendId::Deflate => deflate::compress(raw).ok(),
    }
}

fn unpack_stream(backend: BackendId, packed: &[u8], raw_len: usize) -> Result<Vec<u8>> {
    if raw_len == 0 {
        return Ok(Vec::new());
    }

    match backend {
        BackendId::Huffman => huffman::decompress(packed, raw_len),
        BackendId::Deflate => deflate::decompress(packed, raw_len),
    }
}

/// Encode one tile's worth of row-major `i32` samples, trying every
/// (predictor, backend) pair and keeping the smallest result. Falls back to
/// an uncompressed tile if nothing improves on raw storage. `checksum`, when
/// present, is the CRC-32C of `samples`' little-endian bytes, stored for
/// cross-implementation validation when the file has integrity checking on.
pub fn encode_tile(samples: &[i32], rows: u32, cols: u32, checksum: Option<u32>) -> Result<EncodedTile> {
    let uncompressed_len = samples.len() * 4;
    let mut best: Option<Vec<u8>> = None;

    for &(predictor_id, predictor) in PREDICTORS {
        let (min_rows, min_cols) = predictor.min_tile_size();
        if rows < min_rows || cols < min_cols { continue; }

        let encoded = match predictor.encode(samples, rows, cols) {
            Ok(encoded) => encoded,
            Err(_) => continue,
        };

        let interior_raw = m32_encode_all(&encoded.interior);
        let initializer_raw = m32_encode_all(&encoded.initializer);

        for &backend in BACKENDS {
            let interior_packed = match pack_stream(backend, &interior_raw) {
                Some(packed) => packed,
                None => continue,
            };

            let initializer_packed = match pack_stream(backend, &initializer_raw) {
                Some(packed) => packed,
                None => continue,
            };

            let mut candidate = Vec::with_capacity(32);
            candidate.push(DEFAULT_CODEC_ID);
            candidate.push(predictor_id.to_byte());
            candidate.push(backend.to_byte());
            candidate.extend_from_slice(&encoded.seed.to_le_bytes());
            candidate.extend_from_slice(&crate::error::usize_to_u32(encoded.params.len(), "predictor params length")?.to_le_bytes());
            candidate.extend_from_slice(&encoded.params);
            candidate.extend_from_slice(&crate::error::usize_to_u32(initializer_raw.len(), "initializer raw length")?.to_le_bytes());
            candidate.extend_from_slice(&crate::error::usize_to_u32(initializer_packed.len(), "initializer packed length")?.to_le_bytes());
            candidate.extend_from_slice(&crate::error::usize_to_u32(interior_raw.len(), "interior raw length")?.to_le_bytes());
            candidate.extend_from_slice(&crate::error::usize_to_u32(interior_packed.len(), "interior packed length")?.to_le_bytes());

            let flags = if checksum.is_some() { FLAG_CRC_PRESENT } else { 0 };
            candidate.push(flags);

            if let Some(crc) = checksum {
                candidate.extend_from_slice(&crc.to_le_bytes());
            }

            candidate.extend_from_slice(&initializer_packed);
            candidate.extend_from_slice(&interior_packed);

            let improves_on_raw = candidate.len() < uncompressed_len;
            let improves_on_best = best.as_ref().map_or(true, |current| candidate.len() < current.len());

            if improves_on_raw && improves_on_best {
                best = Some(candidate);
            }
        }
    }

    match best {
        Some(bytes) => Ok(EncodedTile { bytes, stored_uncompressed: false }),
        None => {
            let mut raw = Vec::with_capacity(uncompressed_len);
            for &sample in samples {
                raw.extend_from_slice(&sample.to_le_bytes());
            }

            Ok(EncodedTile { bytes: raw, stored_uncompressed: true })
        }
    }
}

/// Decode a tile previously produced by [`encode_tile`]. `stored_uncompressed`
/// must match the flag the record manager recorded (a zero element length
/// in the tile record signals the uncompressed case, per §4.5). Returns the
/// decoded samples and, if the tile carried one, the original-value CRC-32C
/// for the caller to validate.
pub fn decode_tile(bytes: &[u8], rows: u32, cols: u32, stored_uncompressed: bool) -> Result<(Vec<i32>, Option<u32>)> {
    let total = (rows * cols) as usize;

    if stored_uncompressed {
        if bytes.len() != total * 4 {
            return Err(Error::integrity("tile codec: uncompressed tile has the wrong length"));
        }

        let mut samples = Vec::with_capacity(total);
        for chunk in bytes.chunks_exact(4) {
            samples.push(i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
        }

        return Ok((samples, None));
    }

    let mut cursor = bytes;
    let codec_id = take_u8(&mut cursor)?;
    if codec_id != DEFAULT_CODEC_ID {
        return Err(Error::unsupported(format!("tile codec: unknown codec id {}", codec_id)));
    }

    let predictor_id = PredictorId::from_byte(take_u8(&mut cursor)?)
        .ok_or_else(|| Error::integrity("tile codec: unknown predictor id"))?;
    let backend_id = BackendId::from_byte(take_u8(&mut cursor)?)
        .ok_or_else(|| Error::unsupported("tile codec: unknown entropy backend"))?;

    let seed = take_i32(&mut cursor)?;
    let params_len = take_u32(&mut cursor)? as usize;
    let params = take_n(&mut cursor, params_len)?.to_vec();

    let initializer_raw_len = take_u32(&mut cursor)? as usize;
    let initializer_packed_len = take_u32(&mut cursor)? as usize;
    let interior_raw_len = take_u32(&mut cursor)? as usize;
    let interior_packed_len = take_u32(&mut cursor)? as usize;
    let flags = take_u8(&mut cursor)?;

    let checksum = if flags & FLAG_CRC_PRESENT != 0 {
        Some(take_u32(&mut cursor)?)
    }
    else {
        None
    };

    let initializer_packed = take_n(&mut cursor, initializer_packed_len)?;
    let interior_packed = take_n(&mut cursor, interior_packed_len)?;

    let predictor: &dyn Predictor = PREDICTORS.iter()
        .find(|&&(id, _)| id == predictor_id)
        .map(|&(_, predictor)| predictor)
        .ok_or_else(|| Error::integrity("tile codec: predictor id not in the registry"))?;

    let initializer_raw = unpack_stream(backend_id, initializer_packed, initializer_raw_len)?;
    let interior_raw = unpack_stream(backend_id, interior_packed, interior_raw_len)?;

    // the cell each stream covers is fixed by the predictor and tile shape,
    // so the residual count doesn't need its own header field: it falls
    // out of scanning the m32 stream until its bytes are exhausted.
    let initializer_count = count_complete_m32_values(&initializer_raw)?;
    let interior_count = count_complete_m32_values(&interior_raw)?;

    let initializer = m32_decode_all(&initializer_raw, initializer_count)?;
    let interior = m32_decode_all(&interior_raw, interior_count)?;

    let samples = predictor.decode(seed, &interior, &initializer, &params, rows, cols)?;

    if samples.len() != total {
        return Err(Error::integrity("tile codec: decoded tile has the wrong cell count"));
    }

    Ok((samples, checksum))
}

fn count_complete_m32_values(bytes: &[u8]) -> Result<usize> {
    let mut cursor = 0;
    let mut count = 0;
    while cursor < bytes.len() {
        crate::varint::decode(bytes, &mut cursor)?;
        count += 1;
    }

    Ok(count)
}

fn take_u8(cursor: &mut &[u8]) -> Result<u8> {
    let (&first, rest) = cursor.split_first().ok_or_else(|| Error::integrity("tile codec: header truncated"))?;
    *cursor = rest;
    Ok(first)
}

fn take_u32(cursor: &mut &[u8]) -> Result<u32> {
    let bytes = take_n(cursor, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn take_i32(cursor: &mut &[u8]) -> Result<i32> {
    take_u32(cursor).map(|value| value as i32)
}

fn take_n<'bytes>(cursor: &mut &'bytes [u8], n: usize) -> Result<&'bytes [u8]> {
    if cursor.len() < n {
        return Err(Error::integrity("tile codec: header truncated"));
    }

    let (front, back) = cursor.split_at(n);
    *cursor = back;
    Ok(front)
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_tile(rows: u32, cols: u32) -> Vec<i32> {
        let mut samples = Vec::new();
        for r in 0..rows { for c in 0..cols { samples.push((r * 3 + c * 2) as i32 - 10); } }
        samples
    }

    #[test]
    fn round_trip_small_tile_without_checksum() {
        let samples = sample_tile(4, 4);
        let encoded = encode_tile(&samples, 4, 4, None).unwrap();
        let (decoded, checksum) = decode_tile(&encoded.bytes, 4, 4, encoded.stored_uncompressed).unwrap();
        assert_eq!(decoded, samples);
        assert!(checksum.is_none());
    }

    #[test]
    fn round_trip_large_tile_with_checksum_carries_crc() {
        let samples = sample_tile(16, 16);
        let crc = crate::crc::checksum(&samples.iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<u8>>());
        let encoded = encode_tile(&samples, 16, 16, Some(crc)).unwrap();
        let (decoded, checksum) = decode_tile(&encoded.bytes, 16, 16, encoded.stored_uncompressed).unwrap();
        assert_eq!(decoded, samples);
        assert_eq!(checksum, Some(crc));
    }

    #[test]
    fn incompressible_noise_falls_back_to_uncompressed() {
        let mut state = 999_u32;
        let mut samples = Vec::new();
        for _ in 0..64 {
            state ^= state << 13; state ^= state >> 17; state ^= state << 5;
            samples.push(state as i32);
        }

        let encoded = encode_tile(&samples, 8, 8, None).unwrap();
        let (decoded, _) = decode_tile(&encoded.bytes, 8, 8, encoded.stored_uncompressed).unwrap();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn unknown_codec_id_is_a_hard_failure() {
        let mut bytes = vec![77_u8]; // not DEFAULT_CODEC_ID
        bytes.extend_from_slice(&[0; 20]);
        assert!(decode_tile(&bytes, 4, 4, false).is_err());
    }
}
