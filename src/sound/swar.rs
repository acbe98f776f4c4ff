//! SWAR wave archives

use crate::bytes::{ByteCursor, ByteWriter};
use crate::error::{Error, Result};
use crate::formats::common::{std_header, StdHeader};
use crate::sound::swav::Swav;

/// A SWAR archive: an ordinal-indexed list of waves. Each stored entry is a
/// wave's info struct and sample data; the outer SWAV framing is synthesized
/// when an entry is accessed on its own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Swar {
    pub waves: Vec<Swav>,
    pub unk02: u16,
    /// Byte-identical archives share an SDAT file slot only when these match.
    pub data_merge_optimization_id: u32,
}

impl Swar {
    /// Parse a SWAR file.
    ///
    /// # Errors
    /// Returns an error on a bad magic, version, or truncated data.
    pub fn from_bytes(file: &[u8], unk02: u16) -> Result<Self> {
        let header = StdHeader::read(file, "SWAR")?;
        if header.version != 0x100 {
            return Err(Error::UnknownVersion {
                format: "SWAR",
                version: u32::from(header.version),
            });
        }

        let mut cursor = ByteCursor::le(file);
        cursor.seek(0x10)?;
        let data_magic = cursor.read_array::<4>()?;
        if data_magic != *b"DATA" {
            return Err(Error::InvalidMagic {
                expected: "DATA",
                found: data_magic.to_vec(),
            });
        }
        let _data_size = cursor.read_u32()?;
        cursor.seek(0x38)?;
        let wave_count = cursor.read_u32()? as usize;

        let mut waves = Vec::with_capacity(wave_count);
        let mut offsets = ByteCursor::le(file);
        offsets.seek(0x3C)?;
        for i in 0..wave_count {
            let wave_offset = offsets.read_u32()? as usize;
            // The declared file size bounds the last entry; the buffer may
            // carry extra padding past it.
            let next_offset = if i == wave_count - 1 {
                (header.file_size as usize).min(file.len())
            } else {
                let mut peek = offsets.clone();
                peek.read_u32()? as usize
            };

            if wave_offset + 0xC > next_offset || next_offset > file.len() {
                return Err(Error::OutOfBounds {
                    offset: wave_offset,
                    needed: 0xC,
                    len: file.len(),
                });
            }

            let mut body = ByteCursor::le(file);
            body.seek(wave_offset)?;
            let mut swav = Swav::read_body(&mut body)?;
            swav.data = file[wave_offset + 0xC..next_offset].to_vec();
            waves.push(swav);
        }

        Ok(Self {
            waves,
            unk02,
            data_merge_optimization_id: 0,
        })
    }

    /// Generate file data representing this SWAR.
    #[must_use]
    pub fn save(&self) -> Vec<u8> {
        let entries_len: usize = self.waves.iter().map(|w| 0xC + w.data.len()).sum();
        let file_len = 0x3C + 4 * self.waves.len() + entries_len;

        let mut writer = ByteWriter::with_capacity(file_len);
        writer.reserve(StdHeader::LEN);
        std_header(*b"SWAR", file_len as u32, 1).write_at(&mut writer, 0);
        writer.write_bytes(b"DATA");
        writer.write_u32((file_len - 0x10) as u32);
        writer.write_bytes(&[0; 32]);
        writer.write_u32(self.waves.len() as u32);

        let mut entry_offset = 0x3C + 4 * self.waves.len();
        for wave in &self.waves {
            writer.write_u32(entry_offset as u32);
            entry_offset += 0xC + wave.data.len();
        }
        for wave in &self.waves {
            wave.write_body(&mut writer);
            writer.write_bytes(&wave.data);
        }

        writer.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sound::WaveType;

    #[test]
    fn round_trips() {
        let swar = Swar {
            waves: vec![
                Swav {
                    wave_type: WaveType::Pcm8,
                    looped: false,
                    sample_rate: 8000,
                    time: 2094,
                    loop_offset: 0,
                    total_length: 3,
                    data: vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12],
                },
                Swav {
                    wave_type: WaveType::Adpcm,
                    looped: true,
                    sample_rate: 16000,
                    time: 1047,
                    loop_offset: 1,
                    total_length: 2,
                    data: vec![0xAA; 8],
                },
            ],
            unk02: 0,
            data_merge_optimization_id: 0,
        };
        let file = swar.save();
        assert_eq!(&file[..4], b"SWAR");
        let parsed = Swar::from_bytes(&file, 0).unwrap();
        assert_eq!(parsed, swar);
    }

    #[test]
    fn trailing_padding_does_not_leak_into_last_wave() {
        let swar = Swar {
            waves: vec![Swav {
                data: vec![7; 4],
                ..Default::default()
            }],
            unk02: 0,
            data_merge_optimization_id: 0,
        };
        let mut file = swar.save();
        file.extend_from_slice(&[0; 0x10]); // padding past the declared size
        let parsed = Swar::from_bytes(&file, 0).unwrap();
        assert_eq!(parsed.waves[0].data, vec![7; 4]);
    }
}
