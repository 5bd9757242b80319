
//! 12-coefficient optimal predictor (§4.4). Coefficients `u_1..u_12` are
//! found by solving a constrained least-squares problem over the tile
//! interior (minimize sum of squared residuals subject to the Lagrange
//! constraint that residuals sum to zero), expressed as a single symmetric
//! 13x13 linear system and solved by LU decomposition with partial
//! pivoting. Boundary cells the 12-point neighborhood cannot reach fall
//! back to the triangle predictor and are carried in a separate
//! "initializer" stream, exactly as differencing/linear/triangle fall back
//! to differencing at their own unreachable cells.
//!
//! Neighborhood, relative to the predicted cell `P` at `(row, col)`:
//!
//! ```text
//! row i   :      z6   z1   P
//! row i-1 :  z7  z2   z3   z4   z5
//! row i-2 :  z8  z9   z10  z11  z12
//! ```
//!
//! read as `(dRow, dCol)` offsets from `P`: `z1=(0,-1)`, `z6=(0,-2)`; row
//! `i-1` spans `z7..z5` at columns `-3..1`; row `i-2` spans `z8..z12` at
//! columns `-3..1`. Every offset refers to a cell already produced in
//! row-major decode order, so the predictor is causal.

use crate::error::{Error, Result};
use super::{index, Encoded, Predictor};

const COEFFICIENT_COUNT: usize = 12;
const SYSTEM_SIZE: usize = COEFFICIENT_COUNT + 1; // + 1 Lagrange multiplier
const REGULARIZATION: f64 = 1e-6;

#[derive(Debug, Clone, Copy, Default)]
pub struct Optimal12;

fn is_optimal_interior(row: u32, col: u32, cols: u32) -> bool {
    row >= 2 && col >= 3 && col + 2 <= cols
}

fn gather_neighborhood(samples: &[i32], row: u32, col: u32, cols: u32) -> [f64; COEFFICIENT_COUNT] {
    [
        samples[index(row, col - 1, cols)] as f64,     // z1
        samples[index(row - 1, col - 2, cols)] as f64, // z2
        samples[index(row - 1, col - 1, cols)] as f64, // z3
        samples[index(row - 1, col, cols)] as f64,     // z4
        samples[index(row - 1, col + 1, cols)] as f64, // z5
        samples[index(row, col - 2, cols)] as f64,     // z6
        samples[index(row - 1, col - 3, cols)] as f64, // z7
        samples[index(row - 2, col - 3, cols)] as f64, // z8
        samples[index(row - 2, col - 2, cols)] as f64, // z9
        samples[index(row - 2, col - 1, cols)] as f64, // z10
        samples[index(row - 2, col, cols)] as f64,     // z11
        samples[index(row - 2, col + 1, cols)] as f64, // z12
    ]
}

/// Solve a dense linear system `matrix * x = rhs` via LU decomposition with
/// partial pivoting. `matrix` is square, row-major as `Vec<Vec<f64>>`.
/// Returns `None` if the matrix is numerically singular.
fn lu_solve(mut matrix: Vec<Vec<f64>>, mut rhs: Vec<f64>) -> Option<Vec<f64>> {
    let n = rhs.len();
    debug_assert_eq!(matrix.len(), n);

    for pivot_col in 0..n {
        let mut pivot_row = pivot_col;
        let mut pivot_value = matrix[pivot_col][pivot_col].abs();

        for row in (pivot_col + 1)..n {
            if matrix[row][pivot_col].abs() > pivot_value {
                pivot_row = row;
                pivot_value = matrix[row][pivot_col].abs();
            }
        }

        if pivot_value < 1e-12 { return None; }

        if pivot_row != pivot_col {
            matrix.swap(pivot_row, pivot_col);
            rhs.swap(pivot_row, pivot_col);
        }

        for row in (pivot_col + 1)..n {
            let factor = matrix[row][pivot_col] / matrix[pivot_col][pivot_col];
            if factor == 0.0 { continue; }

            for col in pivot_col..n {
                matrix[row][col] -= factor * matrix[pivot_col][col];
            }

            rhs[row] -= factor * rhs[pivot_col];
        }
    }

    let mut solution = vec![0.0_f64; n];
    for row in (0..n).rev() {
        let mut sum = rhs[row];
        for col in (row + 1)..n {
            sum -= matrix[row][col] * solution[col];
        }

        solution[row] = sum / matrix[row][row];
    }

    Some(solution)
}

/// `floor(x + 0.5)` for non-negative `x`, `-floor(-x + 0.5)` for negative
/// `x`, per the spec's explicit rounding rule, rather than `f32::round()`.
fn round_half_away_from_zero(x: f32) -> i32 {
    if x >= 0.0 { (x + 0.5).floor() as i32 }
    else { -((-x + 0.5).floor() as i32) }
}

fn solve_coefficients(samples: &[i32], rows: u32, cols: u32) -> Option<[f32; COEFFICIENT_COUNT]> {
    let mut normal = vec![vec![0.0_f64; SYSTEM_SIZE]; SYSTEM_SIZE];
    let mut rhs = vec![0.0_f64; SYSTEM_SIZE];

    for row in 2..rows {
        for col in 3..(cols - 1) {
            let z = gather_neighborhood(samples, row, col, cols);
            let target = samples[index(row, col, cols)] as f64;

            for j in 0..COEFFICIENT_COUNT {
                for k in 0..COEFFICIENT_COUNT {
                    normal[j][k] += z[j] * z[k];
                }

                normal[j][COEFFICIENT_COUNT] += z[j];
                normal[COEFFICIENT_COUNT][j] += z[j];
                rhs[j] += z[j] * target;
            }

            rhs[COEFFICIENT_COUNT] += target;
        }
    }

    for j in 0..COEFFICIENT_COUNT {
        normal[j][j] += REGULARIZATION;
    }

    let solution = lu_solve(normal, rhs)?;
    let mut coefficients = [0.0_f32; COEFFICIENT_COUNT];
    for (slot, &value) in coefficients.iter_mut().zip(solution.iter()) {
        *slot = value as f32;
    }

    Some(coefficients)
}

fn predict(coefficients: &[f32; COEFFICIENT_COUNT], z: &[f64; COEFFICIENT_COUNT]) -> i32 {
    let mut accumulator = 0.0_f32;
    for k in 0..COEFFICIENT_COUNT {
        accumulator += coefficients[k] * (z[k] as f32);
    }

    round_half_away_from_zero(accumulator)
}

fn encode_coefficients(coefficients: &[f32; COEFFICIENT_COUNT]) -> Vec<u8> {
    let mut params = Vec::with_capacity(COEFFICIENT_COUNT * 4);
    for &coefficient in coefficients {
        params.extend_from_slice(&coefficient.to_le_bytes());
    }

    params
}

fn decode_coefficients(params: &[u8]) -> Result<[f32; COEFFICIENT_COUNT]> {
    if params.len() != COEFFICIENT_COUNT * 4 {
        return Err(Error::integrity("optimal predictor: params field is not 12 little-endian f32 coefficients"));
    }

    let mut coefficients = [0.0_f32; COEFFICIENT_COUNT];
    for (slot, chunk) in coefficients.iter_mut().zip(params.chunks_exact(4)) {
        *slot = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }

    Ok(coefficients)
}

fn triangle_residual(samples: &[i32], flat_index: usize, row: u32, col: u32, cols: u32) -> i32 {
    if row == 0 || col == 0 {
        samples[flat_index].wrapping_sub(samples[flat_index - 1])
    }
    else {
        let a = samples[index(row - 1, col - 1, cols)] as i64;
        let b = samples[index(row - 1, col, cols)] as i64;
        let c = samples[index(row, col - 1, cols)] as i64;
        (samples[flat_index] as i64 - (b + c - a)) as i32
    }
}

impl Predictor for Optimal12 {
    fn min_tile_size(&self) -> (u32, u32) { (6, 6) }

    fn encode(&self, samples: &[i32], rows: u32, cols: u32) -> Result<Encoded> {
        let (min_rows, min_cols) = self.min_tile_size();
        if rows < min_rows || cols < min_cols {
            return Err(Error::invalid("optimal predictor: tile smaller than the 6x6 minimum"));
        }

        if samples.len() != (rows * cols) as usize {
            return Err(Error::invalid("optimal predictor: sample count does not match tile dimensions"));
        }

        let coefficients = solve_coefficients(samples, rows, cols)
            .ok_or_else(|| Error::invalid("optimal predictor: normal equations are singular"))?;

        let seed = samples[0];
        let mut interior = Vec::new();
        let mut initializer = Vec::new();

        for flat_index in 1..samples.len() {
            let row = flat_index as u32 / cols;
            let col = flat_index as u32 % cols;

            if is_optimal_interior(row, col, cols) {
                let z = gather_neighborhood(samples, row, col, cols);
                let predicted = predict(&coefficients, &z);
                interior.push(samples[flat_index].wrapping_sub(predicted));
            }
            else {
                initializer.push(triangle_residual(samples, flat_index, row, col, cols));
            }
        }

        Ok(Encoded { seed, interior, initializer, params: encode_coefficients(&coefficients) })
    }

    fn decode(&self, seed: i32, interior: &[i32], initializer: &[i32], params: &[u8], rows: u32, cols: u32) -> Result<Vec<i32>> {
        let coefficients = decode_coefficients(params)?;
        let total = (rows * cols) as usize;
        let mut samples = vec![0_i32; total];
        samples[0] = seed;

        let mut interior_cursor = 0;
        let mut initializer_cursor = 0;

        for flat_index in 1..total {
            let row = flat_index as u32 / cols;
            let col = flat_index as u32 % cols;

            samples[flat_index] = if is_optimal_interior(row, col, cols) {
                let z = gather_neighborhood(&samples, row, col, cols);
                let predicted = predict(&coefficients, &z);
                let residual = *interior.get(interior_cursor)
                    .ok_or_else(|| Error::integrity("optimal predictor: interior stream too short"))?;
                interior_cursor += 1;
                predicted.wrapping_add(residual)
            }
            else {
                let residual = *initializer.get(initializer_cursor)
                    .ok_or_else(|| Error::integrity("optimal predictor: initializer stream too short"))?;
                initializer_cursor += 1;

                if row == 0 || col == 0 {
                    samples[flat_index - 1].wrapping_add(residual)
                }
                else {
                    let a = samples[index(row - 1, col - 1, cols)] as i64;
                    let b = samples[index(row - 1, col, cols)] as i64;
                    let c = samples[index(row, col - 1, cols)] as i64;
                    (b + c - a + residual as i64) as i32
                }
            };
        }

        if interior_cursor != interior.len() || initializer_cursor != initializer.len() {
            return Err(Error::integrity("optimal predictor: residual stream length mismatch"));
        }

        Ok(samples)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trip_on_linear_surface() {
        let predictor = Optimal12;
        let rows = 8u32; let cols = 8u32;
        let mut samples = Vec::new();
        for r in 0..rows { for c in 0..cols { samples.push((r + c) as i32); } }

        let encoded = predictor.encode(&samples, rows, cols).unwrap();
        let decoded = predictor.decode(encoded.seed, &encoded.interior, &encoded.initializer, &encoded.params, rows, cols).unwrap();
        assert_eq!(decoded, samples);

        let zero_count = encoded.interior.iter().filter(|&&v| v == 0).count();
        assert!(zero_count * 2 >= encoded.interior.len(), "expected mostly-zero interior residuals on a linear surface");
    }

    #[test]
    fn round_trip_on_noisy_data() {
        let predictor = Optimal12;
        let rows = 10u32; let cols = 9u32;
        let mut state = 12345_u32;
        let mut samples = Vec::new();
        for _ in 0..(rows * cols) {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            samples.push((state % 2000) as i32 - 1000);
        }

        let encoded = predictor.encode(&samples, rows, cols).unwrap();
        let decoded = predictor.decode(encoded.seed, &encoded.interior, &encoded.initializer, &encoded.params, rows, cols).unwrap();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn rejects_tile_smaller_than_minimum() {
        let predictor = Optimal12;
        let samples = vec![0; 5 * 5];
        assert!(predictor.encode(&samples, 5, 5).is_err());
    }

    #[test]
    fn rounding_matches_spec_formula() {
        assert_eq!(round_half_away_from_zero(2.5), 3);
        assert_eq!(round_half_away_from_zero(-2.5), -3);
        assert_eq!(round_half_away_from_zero(2.4), 2);
        assert_eq!(round_half_away_from_zero(-2.4), -2);
        assert_eq!(round_half_away_from_zero(0.0), 0);
    }
}
