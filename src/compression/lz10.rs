//! LZ10 compression (type-0x10 LZSS)
//!
//! The stream begins with a tag byte `0x10` and a 24-bit little-endian
//! decompressed length, followed by flag-byte blocks of up to eight tokens.
//! A set flag bit is a back-reference: a big-endian 16-bit word packing a
//! 4-bit `length - 3` and a 12-bit `distance - 1`. Overlapping copies are
//! valid and give run-length behavior.

use crate::compression::lz_common::{self, LzParams};
use crate::error::{Error, Result};

const PARAMS: LzParams = LzParams {
    pos_subtract: 1,
    max_match_diff: 0x1000,
    max_match_len: 0x12,
    zeros_at_end: true,
    search_reverse: false,
};

/// Decompress LZ10-compressed data.
///
/// # Errors
/// Returns [`Error::InvalidMagic`] if the tag byte is not `0x10`, and
/// [`Error::TruncatedInput`] if the stream ends mid-token or a
/// back-reference reaches before the start of the output.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    if data.first() != Some(&0x10) {
        return Err(Error::InvalidMagic {
            expected: "\\x10",
            found: data.iter().take(1).copied().collect(),
        });
    }
    if data.len() < 4 {
        return Err(Error::TruncatedInput { offset: data.len() });
    }

    let decompressed_len =
        (u32::from_le_bytes([data[0], data[1], data[2], data[3]]) >> 8) as usize;

    let mut out = Vec::with_capacity(decompressed_len);
    let mut in_pos = 4usize;

    'outer: while out.len() < decompressed_len {
        let flags = *data
            .get(in_pos)
            .ok_or(Error::TruncatedInput { offset: in_pos })?;
        in_pos += 1;

        for bit in (0..8).rev() {
            if out.len() == decompressed_len {
                break 'outer;
            }

            if flags & (1u8 << bit) != 0 {
                let hi = *data
                    .get(in_pos)
                    .ok_or(Error::TruncatedInput { offset: in_pos })?;
                let lo = *data
                    .get(in_pos + 1)
                    .ok_or(Error::TruncatedInput { offset: in_pos + 1 })?;
                in_pos += 2;

                let word = u16::from_be_bytes([hi, lo]);
                let length = usize::from(word >> 12) + 3;
                let distance = usize::from(word & 0xFFF) + 1;

                let mut window_pos = out
                    .len()
                    .checked_sub(distance)
                    .ok_or(Error::TruncatedInput { offset: in_pos })?;

                for _ in 0..length {
                    let byte = out[window_pos];
                    out.push(byte);
                    window_pos += 1;
                    if out.len() == decompressed_len {
                        break;
                    }
                }
            } else {
                let byte = *data
                    .get(in_pos)
                    .ok_or(Error::TruncatedInput { offset: in_pos })?;
                in_pos += 1;
                out.push(byte);
            }
        }
    }

    Ok(out)
}

/// Compress data in LZ10 format.
///
/// The encoder is greedy and matches the reference tools byte for byte.
#[must_use]
pub fn compress(data: &[u8]) -> Vec<u8> {
    let body = lz_common::compress(data, &PARAMS).data;

    let mut out = Vec::with_capacity(4 + body.len());
    out.extend_from_slice(&(((data.len() as u32) << 8) | 0x10).to_le_bytes());
    out.extend_from_slice(&body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compress_reference_vector() {
        let expected: Vec<u8> = vec![
            0x10, 0x1d, 0x00, 0x00, 0x04, 0x54, 0x68, 0x69, 0x73, 0x20, 0x00, 0x02, 0x73, 0x6f,
            0x00, 0x6d, 0x65, 0x20, 0x64, 0x61, 0x74, 0x61, 0x20, 0x00, 0x74, 0x6f, 0x20, 0x63,
            0x6f, 0x6d, 0x70, 0x72, 0x00, 0x65, 0x73, 0x73, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        assert_eq!(compress(b"This is some data to compress"), expected);
    }

    #[test]
    fn decompress_reference_vector() {
        let compressed = compress(b"This is some data to compress");
        assert_eq!(
            decompress(&compressed).unwrap(),
            b"This is some data to compress"
        );
    }

    #[test]
    fn round_trips_assorted_inputs() {
        let cases: Vec<Vec<u8>> = vec![
            Vec::new(),
            vec![0x42],
            vec![0; 4096],
            (0..=255).collect(),
            b"abababababababababababab".to_vec(),
            (0..2000u32).map(|i| (i * 7 % 251) as u8).collect(),
        ];
        for case in cases {
            assert_eq!(decompress(&compress(&case)).unwrap(), case);
        }
    }

    #[test]
    fn overlapping_copy_gives_run_length() {
        // flag 0b01000000: literal 0xAA, then a backref with distance 1 and
        // length 5 that repeats it.
        let data = [0x10, 0x06, 0x00, 0x00, 0x40, 0xAA, 0x20, 0x00];
        assert_eq!(decompress(&data).unwrap(), vec![0xAA; 6]);
    }

    #[test]
    fn rejects_wrong_magic() {
        assert!(matches!(
            decompress(&[0x11, 0, 0, 0]),
            Err(Error::InvalidMagic { .. })
        ));
    }

    #[test]
    fn rejects_truncated_stream() {
        let mut compressed = compress(b"This is some data to compress");
        compressed.truncate(10);
        assert!(matches!(
            decompress(&compressed),
            Err(Error::TruncatedInput { .. })
        ));
    }
}
