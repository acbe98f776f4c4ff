//! STRM streamed audio files

use crate::bytes::{ByteCursor, ByteWriter};
use crate::error::{Error, Result};
use crate::formats::common::{std_header, StdHeader};
use crate::sound::WaveType;

/// Options for [`Strm::save`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StrmSaveOptions {
    /// Recompute the timer value from the sample rate.
    pub update_time: bool,
}

/// A STRM file: multi-channel audio split into same-sized blocks, with the
/// final block allowed to be shorter. ADPCM streams carry a per-block
/// predictor header inside each block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Strm {
    pub wave_type: WaveType,
    pub looped: bool,
    /// Per channel, the list of blocks. Every channel must have the same
    /// number of blocks, with matching sizes position by position.
    pub channels: Vec<Vec<Vec<u8>>>,
    pub unk03: u8,
    pub sample_rate: u16,
    pub time: u16,
    pub loop_offset: u32,
    pub samples_per_block: u32,
    pub samples_in_last_block: u32,
    pub unk28: u32,
    pub unk2c: u32,
    pub unk30: u32,
    pub unk34: u32,
    pub unk38: u32,
    pub unk3c: u32,
    pub unk40: u32,
    pub unk44: u32,

    // INFO record fields
    pub unk02: u16,
    pub volume: u8,
    pub priority: u8,
    pub player_id: u8,
    pub unk07: u8,
    /// Byte-identical streams share an SDAT file slot only when these match.
    pub data_merge_optimization_id: u32,
}

impl Default for Strm {
    fn default() -> Self {
        Self {
            wave_type: WaveType::Pcm8,
            looped: false,
            channels: Vec::new(),
            unk03: 0,
            sample_rate: 8000,
            time: 0,
            loop_offset: 0,
            samples_per_block: 0,
            samples_in_last_block: 0,
            unk28: 0,
            unk2c: 0,
            unk30: 0,
            unk34: 0,
            unk38: 0,
            unk3c: 0,
            unk40: 0,
            unk44: 0,
            unk02: 0,
            volume: 127,
            priority: 64,
            player_id: 0,
            unk07: 0,
            data_merge_optimization_id: 0,
        }
    }
}

impl Strm {
    /// Parse a STRM file.
    ///
    /// # Errors
    /// Returns an error on a bad magic, version, or truncated data.
    #[allow(clippy::similar_names)]
    pub fn from_bytes(file: &[u8], unk02: u16, volume: u8, priority: u8, player_id: u8, unk07: u8) -> Result<Self> {
        let header = StdHeader::read(file, "STRM")?;
        if header.version != 0x100 {
            return Err(Error::UnknownVersion {
                format: "STRM",
                version: u32::from(header.version),
            });
        }

        let mut cursor = ByteCursor::le(file);
        cursor.seek(0x10)?;
        let head_magic = cursor.read_array::<4>()?;
        if head_magic != *b"HEAD" {
            return Err(Error::InvalidMagic {
                expected: "HEAD",
                found: head_magic.to_vec(),
            });
        }
        let head_size = cursor.read_u32()? as usize;

        let mut strm = Self {
            unk02,
            volume,
            priority,
            player_id,
            unk07,
            ..Self::default()
        };

        let wave_type = cursor.read_u8()?;
        strm.wave_type = WaveType::from_u8(wave_type)?;
        strm.looped = cursor.read_u8()? != 0;
        let channel_count = usize::from(cursor.read_u8()?);
        strm.unk03 = cursor.read_u8()?;
        strm.sample_rate = cursor.read_u16()?;
        strm.time = cursor.read_u16()?;
        strm.loop_offset = cursor.read_u32()?;
        let _sample_count = cursor.read_u32()?;
        let data_offset = cursor.read_u32()?;
        let block_count = cursor.read_u32()? as usize;
        let bytes_per_block = cursor.read_u32()? as usize;
        strm.samples_per_block = cursor.read_u32()?;
        let bytes_in_last_block = cursor.read_u32()? as usize;
        strm.samples_in_last_block = cursor.read_u32()?;
        strm.unk28 = cursor.read_u32()?;
        strm.unk2c = cursor.read_u32()?;
        strm.unk30 = cursor.read_u32()?;
        strm.unk34 = cursor.read_u32()?;
        strm.unk38 = cursor.read_u32()?;
        strm.unk3c = cursor.read_u32()?;
        strm.unk40 = cursor.read_u32()?;
        strm.unk44 = cursor.read_u32()?;

        if data_offset != 0x68 {
            return Err(Error::MalformedSdat(format!(
                "unexpected STRM data offset {data_offset:#x}"
            )));
        }

        let data_block_offset = 0x10 + head_size;
        cursor.seek(data_block_offset)?;
        let data_magic = cursor.read_array::<4>()?;
        if data_magic != *b"DATA" {
            return Err(Error::InvalidMagic {
                expected: "DATA",
                found: data_magic.to_vec(),
            });
        }
        let data_size = cursor.read_u32()? as usize;
        let data_start = (data_block_offset + 8).min(file.len());
        let data_end = (data_block_offset + data_size).clamp(data_start, file.len());
        let data = &file[data_start..data_end];

        // A single-block ADPCM stream understates its block size by the
        // 4-byte ADPCM header.
        let adjust = usize::from(block_count == 1 && strm.wave_type == WaveType::Adpcm) * 4;

        strm.channels = vec![Vec::with_capacity(block_count); channel_count];
        let mut position = 0usize;
        for block in 0..block_count {
            let mut size = if block == block_count - 1 {
                bytes_in_last_block
            } else {
                bytes_per_block
            };
            size += adjust;

            for channel in &mut strm.channels {
                let end = (position + size).min(data.len());
                channel.push(data[position.min(data.len())..end].to_vec());
                position += size;
            }
            position = position.div_ceil(4) * 4;
        }

        Ok(strm)
    }

    /// Generate file data representing this STRM.
    ///
    /// # Errors
    /// Returns [`Error::PreconditionFailed`] if the channels disagree on
    /// block count or block sizes.
    pub fn save(&mut self, options: StrmSaveOptions) -> Result<Vec<u8>> {
        if options.update_time {
            self.time = (16_756_991 / u32::from(self.sample_rate.max(1)) / 32) as u16;
        }
        self.to_bytes()
    }

    /// Serialize without touching any field.
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn to_bytes(&self) -> Result<Vec<u8>> {
        let (block_count, bytes_per_block, bytes_in_last_block) = self.validate_blocks()?;

        // Interleave blocks across channels, 4-aligning after each round.
        let mut wave_data = Vec::new();
        for block in 0..block_count {
            for channel in &self.channels {
                wave_data.extend_from_slice(&channel[block]);
            }
            while wave_data.len() % 4 != 0 {
                wave_data.push(0);
            }
        }

        let adjust = u32::from(block_count == 1 && self.wave_type == WaveType::Adpcm) * 4;

        let mut writer = ByteWriter::with_capacity(0x68 + wave_data.len());
        writer.reserve(StdHeader::LEN);
        std_header(*b"STRM", (0x68 + wave_data.len()) as u32, 2).write_at(&mut writer, 0);

        writer.write_bytes(b"HEAD");
        writer.write_u32(0x50);
        writer.write_u8(self.wave_type as u8);
        writer.write_u8(u8::from(self.looped));
        writer.write_u8(self.channels.len() as u8);
        writer.write_u8(self.unk03);
        writer.write_u16(self.sample_rate);
        writer.write_u16(self.time);
        writer.write_u32(self.loop_offset);
        writer.write_u32(
            (block_count as u32).saturating_sub(1) * self.samples_per_block
                + self.samples_in_last_block,
        );
        writer.write_u32(0x68);
        writer.write_u32(block_count as u32);
        writer.write_u32(bytes_per_block as u32 - adjust);
        writer.write_u32(self.samples_per_block);
        writer.write_u32(bytes_in_last_block as u32 - adjust);
        writer.write_u32(self.samples_in_last_block);
        writer.write_u32(self.unk28);
        writer.write_u32(self.unk2c);
        writer.write_u32(self.unk30);
        writer.write_u32(self.unk34);
        writer.write_u32(self.unk38);
        writer.write_u32(self.unk3c);
        writer.write_u32(self.unk40);
        writer.write_u32(self.unk44);

        writer.write_bytes(b"DATA");
        writer.write_u32((8 + wave_data.len()) as u32);
        writer.write_bytes(&wave_data);

        Ok(writer.into_inner())
    }

    fn validate_blocks(&self) -> Result<(usize, usize, usize)> {
        let Some(first) = self.channels.first() else {
            return Ok((0, 0, 0));
        };
        let block_count = first.len();

        for (i, blocks) in self.channels.iter().enumerate() {
            if blocks.len() != block_count {
                return Err(Error::PreconditionFailed(format!(
                    "channels 1 and {} have different numbers of blocks ({block_count} vs {})",
                    i + 1,
                    blocks.len()
                )));
            }
        }

        if block_count == 0 {
            return Ok((0, 0, 0));
        }

        let bytes_per_block = first[0].len();
        let bytes_in_last_block = first[block_count - 1].len();
        for (i, blocks) in self.channels.iter().enumerate() {
            for (j, block) in blocks[..block_count - 1].iter().enumerate() {
                if block.len() != bytes_per_block {
                    return Err(Error::PreconditionFailed(format!(
                        "block size is {bytes_per_block}, but block {} in channel {} is {} bytes",
                        j + 1,
                        i + 1,
                        block.len()
                    )));
                }
            }
            let last = &blocks[block_count - 1];
            if last.len() != bytes_in_last_block {
                return Err(Error::PreconditionFailed(format!(
                    "last block size is {bytes_in_last_block}, but channel {}'s is {} bytes",
                    i + 1,
                    last.len()
                )));
            }
        }

        Ok((block_count, bytes_per_block, bytes_in_last_block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_two_channels() {
        let mut strm = Strm {
            wave_type: WaveType::Pcm16,
            channels: vec![
                vec![vec![1; 8], vec![2; 8], vec![3; 4]],
                vec![vec![4; 8], vec![5; 8], vec![6; 4]],
            ],
            sample_rate: 32728,
            samples_per_block: 4,
            samples_in_last_block: 2,
            ..Default::default()
        };
        let file = strm.save(StrmSaveOptions::default()).unwrap();
        assert_eq!(&file[..4], b"STRM");
        let parsed = Strm::from_bytes(&file, 0, 127, 64, 0, 0).unwrap();
        assert_eq!(parsed, strm);
    }

    #[test]
    fn single_block_adpcm_size_adjustment_round_trips() {
        let mut strm = Strm {
            wave_type: WaveType::Adpcm,
            channels: vec![vec![vec![9; 12]]],
            samples_per_block: 16,
            samples_in_last_block: 16,
            ..Default::default()
        };
        let file = strm.save(StrmSaveOptions::default()).unwrap();
        // The header understates the block size by the ADPCM header.
        let parsed = Strm::from_bytes(&file, 0, 127, 64, 0, 0).unwrap();
        assert_eq!(parsed.channels, strm.channels);
    }

    #[test]
    fn mismatched_block_counts_are_rejected() {
        let mut strm = Strm {
            channels: vec![vec![vec![0; 8]], vec![vec![0; 8], vec![0; 8]]],
            ..Default::default()
        };
        assert!(strm.save(StrmSaveOptions::default()).is_err());
    }
}
