//! Greedy longest-match search shared by the LZ10 and code codecs
//!
//! Both codecs emit the same token stream (flag byte + up to eight tokens);
//! they differ only in search-window parameters, direction, and framing. The
//! encoder here reproduces the reference tools' output byte for byte, which
//! matters because the code codec's header fields depend on exactly which
//! parse was chosen.

use std::collections::HashMap;

/// Search-window parameters for one codec.
pub(crate) struct LzParams {
    /// Subtracted from the raw distance before encoding.
    pub pos_subtract: usize,
    /// Maximum distance a match may look back.
    pub max_match_diff: usize,
    /// Maximum encodable match length.
    pub max_match_len: usize,
    /// Pad unused tokens in the final flag block with zero bytes.
    pub zeros_at_end: bool,
    /// Prefer the rightmost occurrence instead of the leftmost.
    pub search_reverse: bool,
}

/// Raw token stream plus the amount of trailing input that could be left
/// uncompressed without growing the output (used by the code codec to build
/// its passthrough prefix).
pub(crate) struct LzOutput {
    pub data: Vec<u8>,
    /// Input bytes at the end of the stream that may stay raw.
    pub ignorable_input: usize,
    /// Output bytes those input bytes compressed into.
    pub ignorable_output: usize,
}

/// Find the longest match for `data[pos..]` that is fully contained in the
/// window before `pos`. Binary-searches candidate lengths; ties at a given
/// length resolve to the leftmost (or rightmost, for `search_reverse`)
/// occurrence, matching the reference encoder.
fn longest_match(data: &[u8], pos: usize, params: &LzParams) -> (usize, usize) {
    let start = pos.saturating_sub(params.max_match_diff);

    let mut lower = 0usize;
    let mut upper = params.max_match_len.min(data.len() - pos);

    let mut record_pos = 0usize;
    let mut record_len = 0usize;

    while lower <= upper {
        let match_len = (lower + upper) / 2;
        let needle = &data[pos..pos + match_len];

        let found = if match_len == 0 {
            Some(start)
        } else if pos - start < match_len {
            None
        } else {
            let window = start..=(pos - match_len);
            let hit = |p: &usize| data[*p..*p + match_len] == *needle;
            if params.search_reverse {
                window.rev().find(hit)
            } else {
                window.into_iter().find(hit)
            }
        };

        match found {
            None => {
                if match_len == 0 {
                    break;
                }
                upper = match_len - 1;
            }
            Some(p) => {
                if match_len > record_len {
                    record_pos = p;
                    record_len = match_len;
                }
                lower = match_len + 1;
            }
        }
    }

    (record_pos, record_len)
}

/// Compress `data` into a raw LZSS token stream.
pub(crate) fn compress(data: &[u8], params: &LzParams) -> LzOutput {
    let mut result: Vec<u8> = Vec::new();
    let mut current = 0usize;

    let mut ignorable_input = 0usize;
    let mut ignorable_output = 0usize;

    // Snapshots of (input pos, output pos) each time a new best savings
    // level is reached; the code codec rewinds to one of these to decide
    // how much of the stream tail to leave raw.
    let mut savings_snapshots: HashMap<i64, (usize, usize)> = HashMap::new();
    savings_snapshots.insert(0, (0, 0));
    let mut best_savings = 0i64;

    while current < data.len() {
        let mut block_flags = 0u8;
        let flags_offset = result.len();
        result.push(0);
        ignorable_output += 1;

        for i in 0..8 {
            if current >= data.len() {
                if params.zeros_at_end {
                    result.push(0);
                }
                continue;
            }

            let (search_pos, search_len) = longest_match(data, current, params);

            if search_len > 2 {
                let disp = current - search_pos - params.pos_subtract;
                block_flags |= 1u8 << (7 - i);
                result.push((((search_len - 3) as u8 & 0xF) << 4) | ((disp >> 8) as u8 & 0xF));
                result.push(disp as u8);
                current += search_len;
                ignorable_input += search_len;
                ignorable_output += 2;
            } else {
                result.push(data[current]);
                current += 1;
                ignorable_input += 1;
                ignorable_output += 1;
            }

            let savings_now = current as i64 - result.len() as i64;
            if savings_now > best_savings {
                ignorable_input = 0;
                ignorable_output = 0;
                best_savings = savings_now;
                savings_snapshots
                    .entry(savings_now)
                    .or_insert((current, result.len()));
            }
        }

        result[flags_offset] = block_flags;
    }

    let final_savings = current as i64 - result.len() as i64;
    if final_savings < best_savings {
        // Walk up to the nearest recorded savings level at or above the
        // final one; everything emitted past that snapshot is ignorable.
        let mut target = final_savings + 1;
        while !savings_snapshots.contains_key(&target) {
            target += 1;
        }
        let (snap_in, snap_out) = savings_snapshots[&target];
        LzOutput {
            ignorable_input: current - snap_in,
            ignorable_output: result.len() - snap_out,
            data: result,
        }
    } else {
        LzOutput {
            data: result,
            ignorable_input: 0,
            ignorable_output: 0,
        }
    }
}
