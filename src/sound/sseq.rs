//! SSEQ sequenced-music files

use crate::bytes::{ByteCursor, ByteWriter};
use crate::error::{Error, Result};
use crate::formats::common::{std_header, StdHeader};
use crate::sound::sequence::{read_events, write_events, SequenceEvent};

/// Event storage: raw bytes until [`Sseq::parse`] lifts them.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Events {
    Unparsed(Vec<u8>),
    Parsed(Vec<SequenceEvent>),
}

/// A SSEQ sound sequence file.
///
/// The event blob is kept unparsed on load (lifting is comparatively
/// expensive and not always needed); call [`parse`](Self::parse) before
/// working with [`events`](Self::events). Saving an unparsed SSEQ
/// reproduces the original event bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sseq {
    events: Events,

    // INFO record fields
    pub unk02: u16,
    pub bank_id: u16,
    pub volume: u8,
    pub channel_pressure: u8,
    pub polyphonic_pressure: u8,
    pub player_id: u8,
    /// Byte-identical sequences share an SDAT file slot only when these
    /// match.
    pub data_merge_optimization_id: u32,
}

impl Default for Sseq {
    fn default() -> Self {
        // Defaults mirror the most common retail values.
        Self {
            events: Events::Parsed(Vec::new()),
            unk02: 0,
            bank_id: 0,
            volume: 127,
            channel_pressure: 64,
            polyphonic_pressure: 50,
            player_id: 0,
            data_merge_optimization_id: 0,
        }
    }
}

impl Sseq {
    /// Parse a SSEQ file (leaving the event blob unparsed).
    ///
    /// # Errors
    /// Returns an error on a bad magic or version.
    pub fn from_bytes(
        file: &[u8],
        unk02: u16,
        bank_id: u16,
        volume: u8,
        channel_pressure: u8,
        polyphonic_pressure: u8,
        player_id: u8,
    ) -> Result<Self> {
        let header = StdHeader::read(file, "SSEQ")?;
        if header.version != 0x100 {
            return Err(Error::UnknownVersion {
                format: "SSEQ",
                version: u32::from(header.version),
            });
        }

        let mut cursor = ByteCursor::le(file);
        cursor.seek(0x18)?;
        let data_offset = cursor.read_u32()? as usize;
        let end = (header.file_size as usize).min(file.len());
        if data_offset > end {
            return Err(Error::OutOfBounds {
                offset: data_offset,
                needed: 0,
                len: end,
            });
        }

        Ok(Self {
            events: Events::Unparsed(file[data_offset..end].to_vec()),
            unk02,
            bank_id,
            volume,
            channel_pressure,
            polyphonic_pressure,
            player_id,
            data_merge_optimization_id: 0,
        })
    }

    /// Create a SSEQ from a list of events.
    #[must_use]
    pub fn from_events(events: Vec<SequenceEvent>) -> Self {
        Self {
            events: Events::Parsed(events),
            ..Self::default()
        }
    }

    /// Whether the event blob has been lifted into events.
    #[must_use]
    pub fn parsed(&self) -> bool {
        matches!(self.events, Events::Parsed(_))
    }

    /// Lift the raw event data into a list of events. No-op if already
    /// parsed.
    ///
    /// # Errors
    /// Returns an error if the event data is malformed.
    pub fn parse(&mut self) -> Result<()> {
        if let Events::Unparsed(data) = &self.events {
            let (events, _) = read_events(data, &[])?;
            self.events = Events::Parsed(events);
        }
        Ok(())
    }

    /// The parsed event list.
    ///
    /// # Errors
    /// Returns [`Error::PreconditionFailed`] if the SSEQ has not been
    /// parsed yet.
    pub fn events(&self) -> Result<&Vec<SequenceEvent>> {
        match &self.events {
            Events::Parsed(events) => Ok(events),
            Events::Unparsed(_) => Err(Error::PreconditionFailed(
                "SSEQ must be parsed before its events can be accessed".into(),
            )),
        }
    }

    /// The parsed event list, mutably.
    ///
    /// # Errors
    /// Returns [`Error::PreconditionFailed`] if the SSEQ has not been
    /// parsed yet.
    pub fn events_mut(&mut self) -> Result<&mut Vec<SequenceEvent>> {
        match &mut self.events {
            Events::Parsed(events) => Ok(events),
            Events::Unparsed(_) => Err(Error::PreconditionFailed(
                "SSEQ must be parsed before its events can be accessed".into(),
            )),
        }
    }

    /// Generate file data representing this SSEQ.
    ///
    /// # Errors
    /// Returns an error if the event list cannot be lowered.
    pub fn save(&self) -> Result<Vec<u8>> {
        let event_data = match &self.events {
            Events::Parsed(events) => write_events(events, &[])?.0,
            Events::Unparsed(data) => data.clone(),
        };

        let mut writer = ByteWriter::with_capacity(0x1C + event_data.len());
        writer.reserve(StdHeader::LEN);
        std_header(*b"SSEQ", (0x1C + event_data.len()) as u32, 1).write_at(&mut writer, 0);
        writer.write_bytes(b"DATA");
        writer.write_u32((0x0C + event_data.len()) as u32);
        writer.write_u32(0x1C);
        writer.write_bytes(&event_data);
        Ok(writer.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_and_reload_preserves_events() {
        let mut sseq = Sseq::from_events(vec![
            SequenceEvent::Note {
                pitch: 64,
                velocity: 110,
                unknown_flag: true,
                duration: 96,
            },
            SequenceEvent::EndTrack,
        ]);
        let file = sseq.save().unwrap();
        assert_eq!(&file[..4], b"SSEQ");

        let mut reloaded = Sseq::from_bytes(&file, 0, 0, 127, 64, 50, 0).unwrap();
        assert!(!reloaded.parsed());
        reloaded.parse().unwrap();
        assert_eq!(reloaded.events().unwrap(), sseq.events().unwrap());
    }

    #[test]
    fn unparsed_save_is_byte_preserving() {
        let sseq = Sseq::from_events(vec![SequenceEvent::EndTrack]);
        let file = sseq.save().unwrap();
        let reloaded = Sseq::from_bytes(&file, 0, 0, 127, 64, 50, 0).unwrap();
        assert_eq!(reloaded.save().unwrap(), file);
    }

    #[test]
    fn events_access_requires_parse() {
        let sseq = Sseq::from_events(vec![SequenceEvent::EndTrack]);
        let file = sseq.save().unwrap();
        let reloaded = Sseq::from_bytes(&file, 0, 0, 127, 64, 50, 0).unwrap();
        assert!(reloaded.events().is_err());
    }

    #[test]
    fn data_block_header_matches_layout() {
        let sseq = Sseq::from_events(vec![SequenceEvent::EndTrack]);
        let file = sseq.save().unwrap();
        // DATA size covers everything from 0x10; event data starts at 0x1C.
        assert_eq!(&file[0x10..0x14], b"DATA");
        assert_eq!(u32::from_le_bytes(file[0x18..0x1C].try_into().unwrap()), 0x1C);
        assert_eq!(file[0x1C], 0xFF);
    }
}
