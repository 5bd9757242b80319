
//! Simplest predictor: each cell (after the first) stores `current - previous`
//! in row-major order. Row-wrap edges are kept as ordinary deltas (§4.4).
// same derive/integrate shape as exr::compression::optimize_bytes, generalized from bytes to i32 samples

use crate::error::{Error, Result};
use super::{Encoded, Predictor};

#[derive(Debug, Clone, Copy, Default)]
pub struct Differencing;

impl Predictor for Differencing {
    fn min_tile_size(&self) -> (u32, u32) { (1, 1) }

    fn encode(&self, samples: &[i32], rows: u32, cols: u32) -> Result<Encoded> {
        if samples.len() != (rows * cols) as usize {
            return Err(Error::invalid("differencing: sample count does not match tile dimensions"));
        }

        let seed = samples[0];
        let mut interior = Vec::with_capacity(samples.len().saturating_sub(1));

        for index in 1..samples.len() {
            interior.push(samples[index].wrapping_sub(samples[index - 1]));
        }

        Ok(Encoded { seed, interior, initializer: Vec::new(), params: Vec::new() })
    }

    fn decode(&self, seed: i32, interior: &[i32], _initializer: &[i32], _params: &[u8], rows: u32, cols: u32) -> Result<Vec<i32>> {
        let total = (rows * cols) as usize;
        if interior.len() != total.saturating_sub(1) {
            return Err(Error::integrity("differencing: residual count does not match tile dimensions"));
        }

        let mut samples = Vec::with_capacity(total);
        samples.push(seed);

        for &delta in interior {
            let previous = *samples.last().unwrap();
            samples.push(previous.wrapping_add(delta));
        }

        Ok(samples)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trip() {
        let predictor = Differencing;
        let samples = vec![5, 7, 7, 2, -100, -99, 0, 1, 2, 3, 4, 5];
        let encoded = predictor.encode(&samples, 3, 4).unwrap();
        let decoded = predictor.decode(encoded.seed, &encoded.interior, &encoded.initializer, &encoded.params, 3, 4).unwrap();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn row_plus_col_predictor_ramp_compresses_to_constant_deltas() {
        let predictor = Differencing;
        let rows = 4u32; let cols = 4u32;
        let mut samples = Vec::new();
        for r in 0..rows { for c in 0..cols { samples.push((r + c) as i32); } }

        let encoded = predictor.encode(&samples, rows, cols).unwrap();
        // every delta is +1 except at each row wrap, where it drops by (cols - 1)
        assert!(encoded.interior.iter().all(|&d| d == 1 || d == 1 - (cols as i32 - 1)));
    }
}
