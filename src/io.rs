
pub use ::std::io::{Read, Write, Seek, SeekFrom};
use lebe::prelude::*;
use crate::error::{Result, UnitResult};


/// Extension trait for primitive numeric types, giving them little-endian
/// read/write methods over any `Read`/`Write`. All multibyte integers in the
/// GVRS file format are little-endian.
pub trait Data: Sized + Default + Clone + Copy {
    fn read(read: &mut impl Read) -> Result<Self>;
    fn write(self, write: &mut impl Write) -> UnitResult;

    fn read_slice(read: &mut impl Read, slice: &mut [Self]) -> UnitResult;
    fn write_slice(write: &mut impl Write, slice: &[Self]) -> UnitResult;

    const BYTE_SIZE: usize = ::std::mem::size_of::<Self>();

    fn read_vec(read: &mut impl Read, count: usize) -> Result<Vec<Self>> {
        let mut vec = vec![Self::default(); count];
        Self::read_slice(read, &mut vec)?;
        Ok(vec)
    }
}

macro_rules! implement_data_for_primitive {
    ($kind: ident) => {
        impl Data for $kind {
            fn read(read: &mut impl Read) -> Result<Self> {
                Ok(read.read_from_little_endian()?)
            }

            fn write(self, write: &mut impl Write) -> UnitResult {
                write.write_as_little_endian(&self)?;
                Ok(())
            }

            fn read_slice(read: &mut impl Read, slice: &mut [Self]) -> UnitResult {
                read.read_from_little_endian_into(slice)?;
                Ok(())
            }

            fn write_slice(write: &mut impl Write, slice: &[Self]) -> UnitResult {
                write.write_as_little_endian(slice)?;
                Ok(())
            }
        }
    };
}

implement_data_for_primitive!(u8);
implement_data_for_primitive!(i8);
implement_data_for_primitive!(i16);
implement_data_for_primitive!(u16);
implement_data_for_primitive!(u32);
implement_data_for_primitive!(i32);
implement_data_for_primitive!(u64);
implement_data_for_primitive!(i64);
implement_data_for_primitive!(f32);
implement_data_for_primitive!(f64);


/// Read exactly `count` bytes, failing with `Io` (unexpected eof) otherwise.
pub fn read_exact_vec(read: &mut impl Read, count: usize) -> Result<Vec<u8>> {
    let mut buffer = vec![0_u8; count];
    read.read_exact(&mut buffer)?;
    Ok(buffer)
}

/// Pad `write` with zero bytes until the given byte count has been written.
pub fn write_zero_padding(write: &mut impl Write, count: usize) -> UnitResult {
    const ZEROES: [u8; 64] = [0_u8; 64];
    let mut remaining = count;

    while remaining > 0 {
        let chunk = remaining.min(ZEROES.len());
        write.write_all(&ZEROES[..chunk])?;
        remaining -= chunk;
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn primitive_round_trip() {
        let mut buffer = Vec::new();
        42_i32.write(&mut buffer).unwrap();
        (-17_i16).write(&mut buffer).unwrap();
        1.5_f64.write(&mut buffer).unwrap();

        let mut cursor = buffer.as_slice();
        assert_eq!(i32::read(&mut cursor).unwrap(), 42);
        assert_eq!(i16::read(&mut cursor).unwrap(), -17);
        assert_eq!(f64::read(&mut cursor).unwrap(), 1.5);
    }
}
