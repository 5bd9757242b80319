
//! M32: variable-length signed-integer byte serialization (§4.2), used to
//! encode predictor residuals before they reach an entropy backend.
//!
//! First byte `b` (signed):
//!
//! | range | meaning |
//! |---|---|
//! | -126..=125 | literal value |
//! | 126 | next 2 bytes, big-endian, are a signed 16-bit value |
//! | 127 | next 3 bytes, big-endian, are a signed 24-bit value |
//! | -127 | next 4 bytes, big-endian, are a signed 32-bit value |
//! | -128 | the null sentinel (`i32::MIN`) |

use crate::error::{Error, Result};

const NULL_SENTINEL: i32 = i32::MIN;

/// Encode `value` as 1-5 bytes, appending them to `out`. Returns the number
/// of bytes written.
pub fn encode(value: i32, out: &mut Vec<u8>) -> usize {
    if value == NULL_SENTINEL {
        out.push(0x80); // -128
        return 1;
    }

    if (-126..=125).contains(&value) {
        out.push(value as i8 as u8);
        1
    }
    else if (i16::MIN as i32..=i16::MAX as i32).contains(&value) {
        out.push(126);
        out.extend_from_slice(&(value as i16).to_be_bytes());
        3
    }
    else if (-(1 << 23)..(1 << 23)).contains(&value) {
        out.push(127);
        let bytes = value.to_be_bytes(); // [msb, b1, b2, lsb], drop the (redundant) msb
        out.extend_from_slice(&bytes[1..]);
        4
    }
    else {
        out.push(0x81); // -127
        out.extend_from_slice(&value.to_be_bytes());
        5
    }
}

/// Decode one M32 value starting at `bytes[*cursor]`, advancing `*cursor`
/// past the bytes consumed.
pub fn decode(bytes: &[u8], cursor: &mut usize) -> Result<i32> {
    let first = *bytes.get(*cursor).ok_or_else(|| Error::integrity("m32: end of data"))? as i8;
    *cursor += 1;

    match first {
        -128 => Ok(NULL_SENTINEL),

        126 => {
            let slice = take(bytes, cursor, 2)?;
            Ok(i16::from_be_bytes([slice[0], slice[1]]) as i32)
        },

        127 => {
            let slice = take(bytes, cursor, 3)?;
            let sign_extend = if slice[0] & 0x80 != 0 { 0xFF } else { 0x00 };
            Ok(i32::from_be_bytes([sign_extend, slice[0], slice[1], slice[2]]))
        },

        -127 => {
            let slice = take(bytes, cursor, 4)?;
            Ok(i32::from_be_bytes([slice[0], slice[1], slice[2], slice[3]]))
        },

        literal => Ok(literal as i32),
    }
}

fn take<'b>(bytes: &'b [u8], cursor: &mut usize, count: usize) -> Result<&'b [u8]> {
    let end = *cursor + count;
    let slice = bytes.get(*cursor..end).ok_or_else(|| Error::integrity("m32: end of data"))?;
    *cursor = end;
    Ok(slice)
}

/// Length in bytes that `encode(value, ..)` would produce.
pub fn encoded_len(value: i32) -> usize {
    if value == NULL_SENTINEL { 1 }
    else if (-126..=125).contains(&value) { 1 }
    else if (i16::MIN as i32..=i16::MAX as i32).contains(&value) { 3 }
    else if (-(1 << 23)..(1 << 23)).contains(&value) { 4 }
    else { 5 }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn s4_scenario() {
        let cases: &[(i32, &[u8])] = &[
            (0, &[0]),
            (125, &[125]),
            (126, &[126, 0, 126]),
            (-126, &[-126_i8 as u8]),
            // -127 does not fit the literal range, so it takes the 16-bit extension (marker 126):
            // big-endian i16 of -127 is 0xFF81.
            (-127, &[126, 0xFF, 0x81]),
        ];

        for &(value, expected) in cases {
            let mut out = Vec::new();
            encode(value, &mut out);
            assert_eq!(out, expected, "encoding {}", value);

            let mut cursor = 0;
            assert_eq!(decode(&out, &mut cursor).unwrap(), value);
            assert_eq!(cursor, out.len());
        }
    }

    #[test]
    fn round_trip_full_range_sample() {
        let mut values: Vec<i32> = vec![0, 1, -1, 125, 126, -126, -127, 127, -128, 128, -129,
            i16::MAX as i32, i16::MIN as i32, i16::MAX as i32 + 1, i16::MIN as i32 - 1,
            (1 << 23) - 1, -(1 << 23), 1 << 23, -(1 << 23) - 1, i32::MAX, i32::MIN + 1, i32::MIN];
        values.sort_unstable();
        values.dedup();

        for value in values {
            let mut out = Vec::new();
            encode(value, &mut out);
            let mut cursor = 0;
            assert_eq!(decode(&out, &mut cursor).unwrap(), value, "round trip of {}", value);
            assert_eq!(cursor, out.len());
        }
    }

    #[test]
    fn length_is_monotone_in_magnitude() {
        // length(encode(v)) is non-decreasing as |v| grows across the tier boundaries
        let boundaries = [0_i32, 125, 126, i16::MAX as i32, i16::MAX as i32 + 1, (1 << 23) - 1, 1 << 23, i32::MAX];
        let mut previous_len = 0;

        for &value in &boundaries {
            let len = encoded_len(value);
            assert!(len >= previous_len, "length decreased at {}", value);
            previous_len = len;
        }
    }

    #[test]
    fn null_sentinel_round_trips() {
        let mut out = Vec::new();
        encode(i32::MIN, &mut out);
        assert_eq!(out, vec![0x80]);
        let mut cursor = 0;
        assert_eq!(decode(&out, &mut cursor).unwrap(), i32::MIN);
    }
}
