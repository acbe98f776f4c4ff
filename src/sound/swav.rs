//! SWAV standalone wave files

use crate::bytes::{ByteCursor, ByteWriter};
use crate::error::{Error, Result};
use crate::formats::common::{std_header, StdHeader};
use crate::sound::WaveType;

/// Timer constant: the DS sound timer runs at 16756991 Hz.
const TIMER_CLOCK: u32 = 16_756_991;

/// Options for [`Swav::save`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SwavSaveOptions {
    /// Recompute the timer value from the sample rate.
    pub update_time: bool,
    /// Recompute the total length (in words) from the data length.
    pub update_total_length: bool,
}

/// An SWAV wave file: one mono clip plus playback parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Swav {
    pub wave_type: WaveType,
    pub looped: bool,
    pub sample_rate: u16,
    /// Hardware timer reload value, normally `16756991 / sample_rate`.
    pub time: u16,
    /// Loop start position, in 4-byte words.
    pub loop_offset: u16,
    /// Total length, in 4-byte words.
    pub total_length: u32,
    /// Raw PCM8/PCM16/ADPCM sample data.
    pub data: Vec<u8>,
}

impl Swav {
    /// Parse an SWAV file.
    ///
    /// # Errors
    /// Returns an error on a bad magic, version, or truncated data.
    pub fn from_bytes(file: &[u8]) -> Result<Self> {
        let header = StdHeader::read(file, "SWAV")?;
        if header.version != 0x100 {
            return Err(Error::UnknownVersion {
                format: "SWAV",
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

        let mut swav = Self::read_body(&mut cursor)?;
        let end = (header.file_size as usize).min(file.len());
        swav.data = file.get(0x24..end).unwrap_or_default().to_vec();
        Ok(swav)
    }

    /// Read the 12-byte wave info struct (shared with SWAR entries).
    pub(crate) fn read_body(cursor: &mut ByteCursor) -> Result<Self> {
        let wave_type = WaveType::from_u8(cursor.read_u8()?)?;
        let looped = cursor.read_u8()? != 0;
        let sample_rate = cursor.read_u16()?;
        let time = cursor.read_u16()?;
        let loop_offset = cursor.read_u16()?;
        let loop_length = cursor.read_u32()?;
        Ok(Self {
            wave_type,
            looped,
            sample_rate,
            time,
            loop_offset,
            total_length: u32::from(loop_offset) + loop_length,
            data: Vec::new(),
        })
    }

    /// Generate file data representing this SWAV.
    ///
    /// # Errors
    /// Returns [`Error::PreconditionFailed`] if the loop offset exceeds the
    /// total length.
    pub fn save(&mut self, options: SwavSaveOptions) -> Result<Vec<u8>> {
        if options.update_time {
            self.time = (TIMER_CLOCK / u32::from(self.sample_rate.max(1))) as u16;
        }
        if options.update_total_length {
            self.total_length = (self.data.len() / 4) as u32;
        }
        if u32::from(self.loop_offset) > self.total_length {
            return Err(Error::PreconditionFailed(format!(
                "loop offset ({}) > total length ({})",
                self.loop_offset, self.total_length
            )));
        }

        let mut writer = ByteWriter::with_capacity(0x24 + self.data.len());
        writer.reserve(StdHeader::LEN);
        std_header(*b"SWAV", (0x24 + self.data.len()) as u32, 1).write_at(&mut writer, 0);
        writer.write_bytes(b"DATA");
        writer.write_u32((0x14 + self.data.len()) as u32);
        self.write_body(&mut writer);
        writer.write_bytes(&self.data);
        Ok(writer.into_inner())
    }

    /// Write the 12-byte wave info struct (shared with SWAR entries).
    pub(crate) fn write_body(&self, writer: &mut ByteWriter) {
        writer.write_u8(self.wave_type as u8);
        writer.write_u8(u8::from(self.looped));
        writer.write_u16(self.sample_rate);
        writer.write_u16(self.time);
        writer.write_u16(self.loop_offset);
        writer.write_u32(self.total_length - u32::from(self.loop_offset));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let mut swav = Swav {
            wave_type: WaveType::Pcm16,
            looped: true,
            sample_rate: 22050,
            time: 0,
            loop_offset: 2,
            total_length: 4,
            data: vec![0x11; 16],
        };
        let file = swav
            .save(SwavSaveOptions {
                update_time: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(&file[..4], b"SWAV");
        let parsed = Swav::from_bytes(&file).unwrap();
        assert_eq!(parsed, swav);
        assert_eq!(parsed.time, (16_756_991 / 22050) as u16);
    }

    #[test]
    fn update_total_length_uses_words() {
        let mut swav = Swav {
            data: vec![0; 40],
            ..Default::default()
        };
        swav.save(SwavSaveOptions {
            update_total_length: true,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(swav.total_length, 10);
    }

    #[test]
    fn rejects_loop_past_end() {
        let mut swav = Swav {
            loop_offset: 5,
            total_length: 4,
            ..Default::default()
        };
        assert!(swav.save(SwavSaveOptions::default()).is_err());
    }
}
