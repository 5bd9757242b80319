
//! Small grid-geometry helpers shared by the spec, tile cache and allocator.
// calculations inspired by exr::math's rounding-mode helpers


/// A 2-D coordinate pair. Used for both pixel/cell positions and row/column
/// counts throughout the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Vec2<T> (pub T, pub T);

impl<T: Copy> Vec2<T> {
    pub fn row(self) -> T { self.0 }
    pub fn col(self) -> T { self.1 }
}

/// Round `dividend` up to the next multiple of `divisor`.
/// Used for record-size rounding (multiples of 8) and tile-grid dimensions
/// (`tilesPerRow = ceil(nColumns / tileCols)`).
pub fn ceil_div(dividend: u32, divisor: u32) -> u32 {
    debug_assert_ne!(divisor, 0);
    (dividend + divisor - 1) / divisor
}

/// Round `value` up to the next multiple of 8, the on-disk record alignment.
pub fn round_up_to_8(value: u32) -> u32 {
    (value + 7) & !7
}

/// Round-half-away-from-zero, the rounding mode the integer-coded-float
/// element conversion and the optimal predictor's coefficient application
/// both use for cross-implementation determinism.
pub fn round_half_away_from_zero_f64(value: f64) -> i64 {
    if value >= 0.0 { (value + 0.5).floor() as i64 } else { -((-value + 0.5).floor() as i64) }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ceil_div_matches_grid_formula() {
        assert_eq!(ceil_div(10, 10), 1);
        assert_eq!(ceil_div(20, 10), 2);
        assert_eq!(ceil_div(21, 10), 3);
        assert_eq!(ceil_div(1, 10), 1);
    }

    #[test]
    fn round_up_to_8_is_idempotent_on_multiples() {
        for value in 0..200 {
            let rounded = round_up_to_8(value);
            assert_eq!(rounded % 8, 0);
            assert!(rounded >= value);
            assert_eq!(round_up_to_8(rounded), rounded);
        }
    }
}
