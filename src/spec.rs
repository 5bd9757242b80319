
//! Grid specification (§3): everything about a GVRS file's shape and
//! element layout that is fixed at creation time and never changes
//! afterward. Digested with MD5 into the file header's `specDigest` so an
//! open can detect a mismatched companion index file (§4.8).

use md5::{Digest, Md5};

use crate::error::{Error, Result};
use crate::math::ceil_div;

const MAX_ELEMENT_NAME_BYTES: usize = 32;

/// The primitive type a single element's cells are stored as.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ElementType {
    I32,
    I16,
    F32,
    /// Stored as `i32`; the logical value is `i / scale + offset`.
    IntegerCodedFloat { scale: f64, offset: f64 },
}

impl ElementType {
    pub fn byte_size(self) -> usize {
        match self {
            ElementType::I32 | ElementType::IntegerCodedFloat { .. } => 4,
            ElementType::I16 => 2,
            ElementType::F32 => 4,
        }
    }

    fn type_tag(self) -> u8 {
        match self {
            ElementType::I32 => 0,
            ElementType::I16 => 1,
            ElementType::F32 => 2,
            ElementType::IntegerCodedFloat { .. } => 3,
        }
    }

    /// Convert a native-encoding `i32` cell (the form every tile buffer and
    /// predictor stores) to its `readInt` value.
    pub fn cell_to_int(self, cell: i32) -> i32 {
        match self {
            ElementType::I32 | ElementType::IntegerCodedFloat { .. } => cell,
            ElementType::I16 => i32::from(cell as i16),
            ElementType::F32 => f32::from_bits(cell as u32) as i32,
        }
    }

    /// Convert a native-encoding `i32` cell to its `readFloat` value.
    pub fn cell_to_float(self, cell: i32) -> f64 {
        match self {
            ElementType::I32 => f64::from(cell),
            ElementType::I16 => f64::from(cell as i16),
            ElementType::F32 => f64::from(f32::from_bits(cell as u32)),
            ElementType::IntegerCodedFloat { scale, offset } => f64::from(cell) / scale + offset,
        }
    }

    /// Convert a `writeInt` value to its native-encoding `i32` cell.
    pub fn int_to_cell(self, value: i32) -> Result<i32> {
        match self {
            ElementType::I32 | ElementType::IntegerCodedFloat { .. } => Ok(value),
            ElementType::I16 => i16::try_from(value)
                .map(i32::from)
                .map_err(|_| Error::invalid("value does not fit in an i16 element")),
            ElementType::F32 => Ok((value as f32).to_bits() as i32),
        }
    }

    /// Convert a `writeFloat` value to its native-encoding `i32` cell.
    /// `f = i/scale + offset`, so `i = round((f - offset) * scale)` (§3).
    pub fn float_to_cell(self, value: f64) -> Result<i32> {
        match self {
            ElementType::I32 => i32::try_from(crate::math::round_half_away_from_zero_f64(value))
                .map_err(|_| Error::invalid("value out of range for an i32 element")),
            ElementType::I16 => {
                let rounded = crate::math::round_half_away_from_zero_f64(value);
                i16::try_from(rounded)
                    .map(i32::from)
                    .map_err(|_| Error::invalid("value does not fit in an i16 element"))
            }
            ElementType::F32 => Ok((value as f32).to_bits() as i32),
            ElementType::IntegerCodedFloat { scale, offset } => {
                let rounded = crate::math::round_half_away_from_zero_f64((value - offset) * scale);
                i32::try_from(rounded).map_err(|_| Error::invalid("value out of range for this integer-coded-float element"))
            }
        }
    }
}

/// One named, typed scalar carried at every grid cell.
#[derive(Debug, Clone)]
pub struct ElementSpec {
    pub name: String,
    pub element_type: ElementType,
    /// Native-encoding fill value: the raw `i32` bit pattern for integer
    /// types (including integer-coded-float), the raw bits of the `f32` for
    /// float elements.
    pub fill_value: i32,
    pub description: Option<String>,
}

impl ElementSpec {
    pub fn new(name: impl Into<String>, element_type: ElementType, fill_value: i32) -> Result<Self> {
        let name = name.into();
        validate_element_name(&name)?;
        Ok(Self { name, element_type, fill_value, description: None })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn fill_value_f32(&self) -> f32 {
        f32::from_bits(self.fill_value as u32)
    }
}

fn validate_element_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid("element name must not be empty"));
    }

    if name.as_bytes().len() > MAX_ELEMENT_NAME_BYTES {
        return Err(Error::invalid("element name must be at most 32 UTF-8 bytes"));
    }

    Ok(())
}

/// Affine raster-to-model transform and its inverse, stored as 6 doubles
/// each: `[a, b, c, d, e, f]` mapping `(col, row) -> (x, y)` as
/// `x = a*col + b*row + c`, `y = d*col + e*row + f`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    pub r2m: [f64; 6],
    pub m2r: [f64; 6],
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self { r2m: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0], m2r: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0] }
    }
}

/// Immutable once a file is created (§3). Built with [`GridSpecBuilder`].
#[derive(Debug, Clone)]
pub struct GridSpec {
    pub n_rows: i32,
    pub n_columns: i32,
    pub tile_rows: i32,
    pub tile_cols: i32,
    pub elements: Vec<ElementSpec>,
    pub compression_enabled: bool,
    pub checksum_enabled: bool,
    pub transform: AffineTransform,
}

impl GridSpec {
    pub fn tiles_per_row(&self) -> i32 {
        ceil_div(self.n_columns as u32, self.tile_cols as u32) as i32
    }

    pub fn tiles_per_column(&self) -> i32 {
        ceil_div(self.n_rows as u32, self.tile_rows as u32) as i32
    }

    pub fn tile_count(&self) -> i64 {
        self.tiles_per_row() as i64 * self.tiles_per_column() as i64
    }

    pub fn tile_index(&self, tile_row: i32, tile_col: i32) -> i64 {
        tile_row as i64 * self.tiles_per_row() as i64 + tile_col as i64
    }

    pub fn tile_cell_count(&self) -> usize {
        self.tile_rows as usize * self.tile_cols as usize
    }

    pub fn element(&self, name: &str) -> Option<&ElementSpec> {
        self.elements.iter().find(|element| element.name == name)
    }

    pub fn tile_size_bytes(&self, element: &ElementSpec) -> usize {
        self.tile_cell_count() * element.element_type.byte_size()
    }

    /// MD5 digest over everything that makes two specs interchangeable on
    /// disk: dimensions, element types/fill values/names, checksum/compression
    /// flags. Descriptions and the affine transform are metadata, not shape,
    /// and are excluded so cosmetic edits don't invalidate a companion index.
    pub fn digest(&self) -> [u8; 16] {
        let mut hasher = Md5::new();
        hasher.update(self.n_rows.to_le_bytes());
        hasher.update(self.n_columns.to_le_bytes());
        hasher.update(self.tile_rows.to_le_bytes());
        hasher.update(self.tile_cols.to_le_bytes());
        hasher.update([self.compression_enabled as u8, self.checksum_enabled as u8]);

        for element in &self.elements {
            hasher.update(element.name.as_bytes());
            hasher.update([element.element_type.type_tag()]);
            hasher.update(element.fill_value.to_le_bytes());

            if let ElementType::IntegerCodedFloat { scale, offset } = element.element_type {
                hasher.update(scale.to_le_bytes());
                hasher.update(offset.to_le_bytes());
            }
        }

        hasher.finalize().into()
    }
}

/// Validating builder for [`GridSpec`], following the teacher's convention
/// of constructing immutable configuration through a builder rather than a
/// public struct literal with defaulted fields.
#[derive(Debug, Clone)]
pub struct GridSpecBuilder {
    n_rows: i32,
    n_columns: i32,
    tile_rows: i32,
    tile_cols: i32,
    elements: Vec<ElementSpec>,
    compression_enabled: bool,
    checksum_enabled: bool,
    transform: AffineTransform,
}

impl GridSpecBuilder {
    pub fn new(n_rows: i32, n_columns: i32, tile_rows: i32, tile_cols: i32) -> Self {
        Self {
            n_rows, n_columns, tile_rows, tile_cols,
            elements: Vec::new(),
            compression_enabled: false,
            checksum_enabled: false,
            transform: AffineTransform::default(),
        }
    }

    pub fn add_element(mut self, element: ElementSpec) -> Self {
        self.elements.push(element);
        self
    }

    pub fn compression_enabled(mut self, enabled: bool) -> Self {
        self.compression_enabled = enabled;
        self
    }

    pub fn checksum_enabled(mut self, enabled: bool) -> Self {
        self.checksum_enabled = enabled;
        self
    }

    pub fn transform(mut self, transform: AffineTransform) -> Self {
        self.transform = transform;
        self
    }

    pub fn build(self) -> Result<GridSpec> {
        if self.n_rows <= 0 || self.n_columns <= 0 {
            return Err(Error::invalid("grid extents must be positive"));
        }

        if self.tile_rows <= 0 || self.tile_cols <= 0 {
            return Err(Error::invalid("tile extents must be positive"));
        }

        if self.elements.is_empty() {
            return Err(Error::invalid("a grid spec needs at least one element"));
        }

        let mut seen_names = std::collections::HashSet::new();
        for element in &self.elements {
            if !seen_names.insert(element.name.clone()) {
                return Err(Error::invalid(format!("duplicate element name: {}", element.name)));
            }
        }

        Ok(GridSpec {
            n_rows: self.n_rows,
            n_columns: self.n_columns,
            tile_rows: self.tile_rows,
            tile_cols: self.tile_cols,
            elements: self.elements,
            compression_enabled: self.compression_enabled,
            checksum_enabled: self.checksum_enabled,
            transform: self.transform,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_spec() -> GridSpec {
        GridSpecBuilder::new(10, 20, 10, 10)
            .add_element(ElementSpec::new("elevation", ElementType::I32, -9999).unwrap())
            .build()
            .unwrap()
    }

    #[test]
    fn tiles_per_row_accounts_for_boundary_tile() {
        let spec = sample_spec();
        assert_eq!(spec.tiles_per_row(), 2);
        assert_eq!(spec.tiles_per_column(), 1);
        assert_eq!(spec.tile_count(), 2);
    }

    #[test]
    fn tile_index_is_row_major_over_the_tile_grid() {
        let spec = sample_spec();
        assert_eq!(spec.tile_index(0, 0), 0);
        assert_eq!(spec.tile_index(0, 1), 1);
    }

    #[test]
    fn digest_is_stable_and_sensitive_to_shape() {
        let spec = sample_spec();
        let same_shape = sample_spec();
        assert_eq!(spec.digest(), same_shape.digest());

        let different = GridSpecBuilder::new(10, 21, 10, 10)
            .add_element(ElementSpec::new("elevation", ElementType::I32, -9999).unwrap())
            .build()
            .unwrap();
        assert_ne!(spec.digest(), different.digest());
    }

    #[test]
    fn rejects_duplicate_element_names() {
        let result = GridSpecBuilder::new(10, 10, 10, 10)
            .add_element(ElementSpec::new("a", ElementType::I32, 0).unwrap())
            .add_element(ElementSpec::new("a", ElementType::F32, 0).unwrap())
            .build();

        assert!(result.is_err());
    }

    #[test]
    fn rejects_element_name_over_32_bytes() {
        let long_name = "x".repeat(33);
        assert!(ElementSpec::new(long_name, ElementType::I32, 0).is_err());
    }

    #[test]
    fn integer_coded_float_round_trips_through_cells() {
        let element_type = ElementType::IntegerCodedFloat { scale: 100.0, offset: 0.0 };
        let cell = element_type.float_to_cell(12.34).unwrap();
        let recovered = element_type.cell_to_float(cell);
        assert!((recovered - 12.34).abs() < 1e-9);
    }

    #[test]
    fn i16_element_rejects_out_of_range_writes() {
        assert!(ElementType::I16.int_to_cell(100_000).is_err());
        assert_eq!(ElementType::I16.int_to_cell(-5).unwrap(), -5);
    }

    #[test]
    fn f32_element_round_trips_through_bit_pattern_cells() {
        let cell = ElementType::F32.float_to_cell(3.5).unwrap();
        assert_eq!(ElementType::F32.cell_to_float(cell), 3.5);
    }
}
