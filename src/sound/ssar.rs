//! SSAR sequence archives
//!
//! A SSAR holds one shared blob of sequence-event data and a table of named
//! entry points into it, each with its own playback parameters. Entries may
//! share event data, including tails of each other's tracks.

use crate::bytes::{ByteCursor, ByteWriter};
use crate::error::{Error, Result};
use crate::formats::common::{std_header, StdHeader};
use crate::sound::sequence::{read_events, write_events, EventRef, SequenceEvent};

/// One entry in a sequence archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsarSequence {
    /// The event this entry starts at, once the archive is parsed.
    /// `None` marks an entry with no event data (wire offset -1).
    pub first_event: Option<EventRef>,
    /// Pre-parse wire offset of the first event (-1 = none).
    pub(crate) first_event_offset: Option<i32>,

    pub bank_id: u16,
    pub volume: u8,
    pub channel_pressure: u8,
    pub polyphonic_pressure: u8,
    pub player_id: u8,
}

impl SsarSequence {
    /// Create a parsed entry starting at the given event.
    #[must_use]
    pub fn new(first_event: Option<EventRef>) -> Self {
        Self {
            first_event,
            first_event_offset: None,
            bank_id: 0,
            volume: 127,
            channel_pressure: 64,
            polyphonic_pressure: 50,
            player_id: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Events {
    Unparsed(Vec<u8>),
    Parsed(Vec<SequenceEvent>),
}

/// A SSAR sequence archive file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ssar {
    events: Events,
    /// Entries as (name, sequence) pairs; names come from the SDAT SYMB
    /// block and may be absent.
    pub sequences: Vec<(Option<String>, SsarSequence)>,

    pub unk02: u16,
    /// Byte-identical archives share an SDAT file slot only when these
    /// match.
    pub data_merge_optimization_id: u32,
}

impl Default for Ssar {
    fn default() -> Self {
        Self {
            events: Events::Parsed(Vec::new()),
            sequences: Vec::new(),
            unk02: 0,
            data_merge_optimization_id: 0,
        }
    }
}

impl Ssar {
    /// Parse a SSAR file (leaving the event blob unparsed). `names` supplies
    /// per-entry names from the enclosing SDAT's symbol table.
    ///
    /// # Errors
    /// Returns an error on a bad magic, version, or truncated table.
    pub fn from_bytes(file: &[u8], unk02: u16, names: &[Option<String>]) -> Result<Self> {
        let header = StdHeader::read(file, "SSAR")?;
        if header.version != 0x100 {
            return Err(Error::UnknownVersion {
                format: "SSAR",
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
        let data_offset = cursor.read_u32()? as usize;
        let entry_count = cursor.read_u32()? as usize;

        let end = (header.file_size as usize).min(file.len());
        let events_data = file.get(data_offset..end).unwrap_or_default().to_vec();

        let mut sequences = Vec::with_capacity(entry_count);
        cursor.seek(0x20)?;
        for i in 0..entry_count {
            let offset = cursor.read_i32()?;
            let bank_id = cursor.read_u16()?;
            let volume = cursor.read_u8()?;
            let channel_pressure = cursor.read_u8()?;
            let polyphonic_pressure = cursor.read_u8()?;
            let player_id = cursor.read_u8()?;
            cursor.read_u16()?; // pad

            sequences.push((
                names.get(i).cloned().flatten(),
                SsarSequence {
                    first_event: None,
                    first_event_offset: (offset != -1).then_some(offset),
                    bank_id,
                    volume,
                    channel_pressure,
                    polyphonic_pressure,
                    player_id,
                },
            ));
        }

        Ok(Self {
            events: Events::Unparsed(events_data),
            sequences,
            unk02,
            data_merge_optimization_id: 0,
        })
    }

    /// Whether the event blob has been lifted into events.
    #[must_use]
    pub fn parsed(&self) -> bool {
        matches!(self.events, Events::Parsed(_))
    }

    /// Lift the raw event data, resolving each entry's starting offset to
    /// an event reference. No-op if already parsed.
    ///
    /// # Errors
    /// Returns an error if the event data is malformed.
    pub fn parse(&mut self) -> Result<()> {
        let Events::Unparsed(data) = &self.events else {
            return Ok(());
        };

        let start_offsets: Vec<usize> = self
            .sequences
            .iter()
            .filter_map(|(_, seq)| seq.first_event_offset)
            .map(|off| off as usize)
            .collect();

        let (events, start_refs) = read_events(data, &start_offsets)?;

        let mut refs = start_refs.into_iter();
        for (_, sequence) in &mut self.sequences {
            if sequence.first_event_offset.take().is_some() {
                sequence.first_event = refs.next();
            }
        }
        self.events = Events::Parsed(events);
        Ok(())
    }

    /// The parsed event list.
    ///
    /// # Errors
    /// Returns [`Error::PreconditionFailed`] if the SSAR has not been
    /// parsed yet.
    pub fn events(&self) -> Result<&Vec<SequenceEvent>> {
        match &self.events {
            Events::Parsed(events) => Ok(events),
            Events::Unparsed(_) => Err(Error::PreconditionFailed(
                "SSAR must be parsed before its events can be accessed".into(),
            )),
        }
    }

    /// Create a SSAR directly from events and entries.
    #[must_use]
    pub fn from_events_and_sequences(
        events: Vec<SequenceEvent>,
        sequences: Vec<(Option<String>, SsarSequence)>,
    ) -> Self {
        Self {
            events: Events::Parsed(events),
            sequences,
            ..Self::default()
        }
    }

    /// Generate file data representing this SSAR.
    ///
    /// # Errors
    /// Returns an error if the event list cannot be lowered or an entry
    /// references a missing event.
    pub fn save(&self) -> Result<Vec<u8>> {
        let (events_data, entry_offsets) = match &self.events {
            Events::Parsed(events) => {
                let starts: Vec<EventRef> = self
                    .sequences
                    .iter()
                    .filter_map(|(_, seq)| seq.first_event)
                    .collect();
                let (data, offsets) = write_events(events, &starts)?;

                let mut offsets = offsets.into_iter();
                let entry_offsets: Vec<i32> = self
                    .sequences
                    .iter()
                    .map(|(_, seq)| {
                        if seq.first_event.is_some() {
                            offsets.next().unwrap_or(0) as i32
                        } else {
                            -1
                        }
                    })
                    .collect();
                (data, entry_offsets)
            }
            Events::Unparsed(data) => (
                data.clone(),
                self.sequences
                    .iter()
                    .map(|(_, seq)| seq.first_event_offset.unwrap_or(-1))
                    .collect(),
            ),
        };

        let data_offset = 0x20 + self.sequences.len() * 0xC;
        let file_len = data_offset + events_data.len();

        let mut writer = ByteWriter::with_capacity(file_len);
        writer.reserve(StdHeader::LEN);
        std_header(*b"SSAR", file_len as u32, 1).write_at(&mut writer, 0);
        writer.write_bytes(b"DATA");
        writer.write_u32((file_len - 0x10) as u32);
        writer.write_u32(data_offset as u32);
        writer.write_u32(self.sequences.len() as u32);

        for ((_, sequence), &offset) in self.sequences.iter().zip(&entry_offsets) {
            writer.write_i32(offset);
            writer.write_u16(sequence.bank_id);
            writer.write_u8(sequence.volume);
            writer.write_u8(sequence.channel_pressure);
            writer.write_u8(sequence.polyphonic_pressure);
            writer.write_u8(sequence.player_id);
            writer.write_u16(0);
        }
        writer.write_bytes(&events_data);

        Ok(writer.into_inner())
    }

    /// The per-entry names, in order (for the SDAT symbol table).
    #[must_use]
    pub fn sequence_names(&self) -> Vec<Option<String>> {
        self.sequences.iter().map(|(n, _)| n.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_ssar() -> Ssar {
        let events = vec![
            SequenceEvent::Note {
                pitch: 60,
                velocity: 100,
                unknown_flag: false,
                duration: 10,
            },
            SequenceEvent::EndTrack,
            SequenceEvent::Note {
                pitch: 67,
                velocity: 90,
                unknown_flag: false,
                duration: 20,
            },
            SequenceEvent::Jump { destination: 1 },
        ];
        Ssar::from_events_and_sequences(
            events,
            vec![
                (Some("SE_A".into()), SsarSequence::new(Some(0))),
                (Some("SE_B".into()), SsarSequence::new(Some(2))),
                (None, SsarSequence::new(None)),
            ],
        )
    }

    #[test]
    fn round_trips_entries_and_events() {
        let ssar = sample_ssar();
        let file = ssar.save().unwrap();
        assert_eq!(&file[..4], b"SSAR");

        let names = ssar.sequence_names();
        let mut reloaded = Ssar::from_bytes(&file, 0, &names).unwrap();
        assert_eq!(reloaded.sequences.len(), 3);
        reloaded.parse().unwrap();

        assert_eq!(reloaded.events().unwrap(), ssar.events().unwrap());
        assert_eq!(reloaded.sequences[0].1.first_event, Some(0));
        assert_eq!(reloaded.sequences[1].1.first_event, Some(2));
        assert_eq!(reloaded.sequences[2].1.first_event, None);
        assert_eq!(reloaded.sequences[0].0.as_deref(), Some("SE_A"));
    }

    #[test]
    fn unparsed_resave_is_byte_preserving() {
        let ssar = sample_ssar();
        let file = ssar.save().unwrap();
        let reloaded = Ssar::from_bytes(&file, 0, &ssar.sequence_names()).unwrap();
        assert_eq!(reloaded.save().unwrap(), file);
    }

    #[test]
    fn entries_sharing_an_offset_resolve_to_one_event() {
        let events = vec![SequenceEvent::Jump { destination: 0 }];
        let ssar = Ssar::from_events_and_sequences(
            events,
            vec![
                (None, SsarSequence::new(Some(0))),
                (None, SsarSequence::new(Some(0))),
            ],
        );
        let file = ssar.save().unwrap();
        let mut reloaded = Ssar::from_bytes(&file, 0, &[]).unwrap();
        reloaded.parse().unwrap();
        assert_eq!(reloaded.sequences[0].1.first_event, Some(0));
        assert_eq!(reloaded.sequences[1].1.first_event, Some(0));
    }
}
