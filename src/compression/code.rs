//! Code compression (reverse-direction LZSS for executables)
//!
//! ARM9 main code and overlays use an LZSS variant that is consumed from the
//! tail of the file toward the head, so the loader can decompress in place.
//! The last 8 bytes hold `u24 compressed_size | u8 header_size` and a
//! `u32` decompressed-size delta; a delta of zero means the data is stored
//! uncompressed. Anything before the compressed region is a passthrough
//! prefix that the decompressor leaves untouched.

use byteorder::{ByteOrder, LittleEndian};

use crate::compression::lz_common::{self, LzParams};
use crate::error::{Error, Result};

const PARAMS: LzParams = LzParams {
    pos_subtract: 3,
    max_match_diff: 0x1002,
    max_match_len: 0x12,
    zeros_at_end: false,
    search_reverse: true,
};

/// ARM9 main code keeps this much of its head uncompressed (the secure area).
const ARM9_RAW_PREFIX: usize = 0x4000;

/// Check for appended data past the footer (some files carry a trailing
/// signature-like blob in 4-byte steps). Returns the appended amount, or
/// `None` if the data does not look compressed at all.
fn detect_appended_data(data: &[u8]) -> Option<usize> {
    for amount in (0..0x20).step_by(4) {
        if data.len() < amount + 8 {
            return None;
        }

        let base = data.len() - amount - 8;
        let len_and_header = LittleEndian::read_u32(&data[base..base + 4]);
        let header_len = (len_and_header >> 24) as usize;
        let compressed_len = (len_and_header & 0xFF_FFFF) as usize;

        if header_len < 8 {
            continue;
        }
        if compressed_len > data.len() {
            continue;
        }

        return Some(amount);
    }
    None
}

/// Decompress code-compressed data. This is the inverse of [`compress`].
///
/// Data that does not carry a plausible footer is returned unchanged, as is
/// data whose footer marks it as stored (delta = 0).
///
/// # Errors
/// Returns [`Error::TruncatedInput`] if the declared sizes do not fit the
/// input, and [`Error::MalformedRom`] if the footer padding is not 0xFF.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let appended_amount = match detect_appended_data(data) {
        Some(a) => a,
        None => return Ok(data.to_vec()),
    };

    let (body, appended) = data.split_at(data.len() - appended_amount);

    // A zero delta in the footer means the data is not actually compressed.
    if body.len() >= 4 && body[body.len() - 4..] == [0, 0, 0, 0] {
        return Ok(data.to_vec());
    }

    let base = body.len() - 8;
    let len_and_header = LittleEndian::read_u32(&body[base..base + 4]);
    let extra_size = LittleEndian::read_u32(&body[base + 4..base + 8]) as usize;
    let header_len = (len_and_header >> 24) as usize;
    let mut compressed_len = (len_and_header & 0xFF_FFFF) as usize;

    if body.len() < header_len {
        return Err(Error::TruncatedInput { offset: body.len() });
    }
    if compressed_len > body.len() {
        return Err(Error::TruncatedInput { offset: body.len() });
    }
    if body[body.len() - header_len..body.len() - 8]
        .iter()
        .any(|&b| b != 0xFF)
    {
        return Err(Error::MalformedRom(
            "code compression footer padding is not 0xFF".into(),
        ));
    }

    // The compressed size is sometimes recorded as the whole file size.
    if compressed_len >= body.len() {
        compressed_len = body.len();
    }

    let passthrough_len = body.len() - compressed_len;
    let comp = &body[passthrough_len..passthrough_len + compressed_len - header_len];
    let decompressed_len = body.len() + extra_size - passthrough_len;
    let mut out = vec![0u8; decompressed_len];

    let mut written = 0usize;
    let mut read = 0usize;
    let mut flags = 0u8;
    let mut mask = 0u16;

    // Both cursors run backward: input from the tail of the compressed
    // region, output from the tail of the buffer.
    while written < decompressed_len {
        if mask <= 1 {
            if read >= comp.len() {
                return Err(Error::TruncatedInput {
                    offset: passthrough_len + comp.len(),
                });
            }
            flags = comp[comp.len() - 1 - read];
            read += 1;
            mask = 0x80;
        } else {
            mask >>= 1;
        }

        if u16::from(flags) & mask != 0 {
            if read + 2 > comp.len() {
                return Err(Error::TruncatedInput {
                    offset: passthrough_len + comp.len(),
                });
            }
            let b1 = comp[comp.len() - 1 - read];
            read += 1;
            let b2 = comp[comp.len() - 1 - read];
            read += 1;

            let length = usize::from(b1 >> 4) + 3;
            let mut disp = (usize::from(b1 & 0x0F) << 8 | usize::from(b2)) + 3;

            if disp > written {
                if written < 2 {
                    return Err(Error::MalformedRom(format!(
                        "back-reference of {disp:#x} bytes with only {written:#x} written"
                    )));
                }
                // Observed in retail files; the loader treats it as 2.
                disp = 2;
            }

            let mut src = written - disp;
            for _ in 0..length {
                if written >= decompressed_len {
                    return Err(Error::TruncatedInput {
                        offset: passthrough_len,
                    });
                }
                out[decompressed_len - 1 - written] = out[decompressed_len - 1 - src];
                src += 1;
                written += 1;
            }
        } else {
            if read >= comp.len() {
                return Err(Error::TruncatedInput {
                    offset: passthrough_len + comp.len(),
                });
            }
            out[decompressed_len - 1 - written] = comp[comp.len() - 1 - read];
            read += 1;
            written += 1;
        }
    }

    let mut result = Vec::with_capacity(passthrough_len + decompressed_len + appended.len());
    result.extend_from_slice(&body[..passthrough_len]);
    result.extend_from_slice(&out);
    result.extend_from_slice(appended);
    Ok(result)
}

/// Compress code data. This is the inverse of [`decompress`].
///
/// With `is_arm9` set, the first 0x4000 bytes are carried uncompressed, the
/// way the boot loader expects the main ARM9 file to be laid out.
#[must_use]
pub fn compress(data: &[u8], is_arm9: bool) -> Vec<u8> {
    let split = if is_arm9 {
        ARM9_RAW_PREFIX.min(data.len())
    } else {
        0
    };
    let (prefix, body) = data.split_at(split);

    let mut out = Vec::with_capacity(data.len());
    out.extend_from_slice(prefix);
    out.extend_from_slice(&compress_body(body));
    out
}

#[allow(clippy::cast_possible_truncation)]
fn compress_body(data: &[u8]) -> Vec<u8> {
    let reversed: Vec<u8> = data.iter().rev().copied().collect();
    let raw = lz_common::compress(&reversed, &PARAMS);
    let compressed: Vec<u8> = raw.data.iter().rev().copied().collect();

    // If compression doesn't pay for the footer, emit the input verbatim;
    // decompress() recognizes footer-less data and passes it through.
    if compressed.is_empty() || data.len() + 4 < ((compressed.len() + 3) & !4usize) + 8 {
        return data.to_vec();
    }

    // Trim the tail that may stay raw without growing the file, then append
    // the padded footer.
    let actual_compressed_len = compressed.len() - raw.ignorable_output;
    let mut header_len = 8usize;

    let mut out = Vec::with_capacity(compressed.len() + 0x10);
    out.extend_from_slice(&data[..raw.ignorable_input]);
    out.extend_from_slice(&compressed[raw.ignorable_output..]);
    let extra_len = data.len() - out.len();

    while out.len() % 4 != 0 {
        out.push(0xFF);
        header_len += 1;
    }

    let mut footer = [0u8; 8];
    LittleEndian::write_u32(&mut footer[0..4], (actual_compressed_len + header_len) as u32);
    footer[3] = header_len as u8;
    LittleEndian::write_u32(&mut footer[4..8], (extra_len - header_len) as u32);
    out.extend_from_slice(&footer);

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_code(len: usize) -> Vec<u8> {
        // Repetitive enough to compress, with some structure breaks.
        (0..len)
            .map(|i| match i % 64 {
                0..=31 => (i / 64) as u8,
                32..=47 => 0xE5,
                _ => (i % 7) as u8,
            })
            .collect()
    }

    #[test]
    fn round_trips_overlay_mode() {
        let data = sample_code(0x800);
        let compressed = compress(&data, false);
        assert!(compressed.len() < data.len());
        assert_eq!(decompress(&compressed).unwrap(), data);
    }

    #[test]
    fn round_trips_arm9_mode() {
        let data = sample_code(0x6000);
        let compressed = compress(&data, true);
        // The secure-area prefix stays raw.
        assert_eq!(&compressed[..0x4000], &data[..0x4000]);
        assert_eq!(decompress(&compressed).unwrap(), data);
    }

    #[test]
    fn round_trips_incompressible_data() {
        let data: Vec<u8> = (0..1024u32)
            .map(|i| 0x80 | (i.wrapping_mul(2654435761) >> 13) as u8)
            .collect();
        let compressed = compress(&data, false);
        assert_eq!(decompress(&compressed).unwrap(), data);
    }

    #[test]
    fn round_trips_empty_and_tiny() {
        for data in [&b""[..], &b"\x12"[..], &b"\x12\x34\x56\x78"[..]] {
            let compressed = compress(data, false);
            assert_eq!(decompress(&compressed).unwrap(), data);
        }
    }

    #[test]
    fn passthrough_for_uncompressed_input() {
        // No plausible footer: returned unchanged.
        let data = vec![0x01, 0x02, 0x03];
        assert_eq!(decompress(&data).unwrap(), data);
    }
}
