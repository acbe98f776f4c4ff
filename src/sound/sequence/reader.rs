//! Lifting sequence-event data into an event list
//!
//! The parser follows execution rather than scanning linearly: a worklist of
//! entry offsets is expanded by chasing address operands, each track path is
//! classified by how it terminates, and whatever bytes remain unreached are
//! preserved as `RawData` so that emitting reproduces the input exactly.

use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};
use crate::sound::sequence::events::parse_basic_event;
use crate::sound::sequence::{EventRef, SequenceEvent};

/// How execution along a track path ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fate {
    /// Still being decoded (a back-edge into this path is a loop).
    InProgress,
    /// Ends in `Return`.
    Return,
    /// Ends by jumping into an already-decoded path.
    Loop,
    /// Ends in `EndTrack`.
    EndOfTrack,
}

struct Parser<'a> {
    data: &'a [u8],
    /// Decoded events by offset. Address operands hold *offsets* until the
    /// final resolution pass swaps them for list indices.
    events: BTreeMap<usize, SequenceEvent>,
    fates: HashMap<usize, Fate>,
}

impl Parser<'_> {
    fn truncated(&self, offset: usize) -> Error {
        Error::MalformedSseq {
            reason: "execution ran past the end of the event data".into(),
            offset,
        }
    }

    fn read_u24(&self, offset: usize) -> Result<usize> {
        if offset + 3 > self.data.len() {
            return Err(self.truncated(offset));
        }
        Ok(usize::from(self.data[offset])
            | usize::from(self.data[offset + 1]) << 8
            | usize::from(self.data[offset + 2]) << 16)
    }

    fn settle(&mut self, sequential: &[usize], fate: Fate) {
        for &o in sequential {
            self.fates.insert(o, fate);
        }
    }

    /// Decode the execution path starting at `offset`, returning its fate.
    fn parse_at(&mut self, mut offset: usize) -> Result<Fate> {
        let mut sequential: Vec<usize> = Vec::new();

        while offset < self.data.len() {
            if let Some(&fate) = self.fates.get(&offset) {
                let fate = if fate == Fate::InProgress {
                    Fate::Loop
                } else {
                    fate
                };
                self.settle(&sequential, fate);
                return Ok(fate);
            }

            let opcode = self.data[offset];
            let advance;

            match opcode {
                0x93 => {
                    let track_number = *self
                        .data
                        .get(offset + 1)
                        .ok_or_else(|| self.truncated(offset))?;
                    let target = self.read_u24(offset + 2)?;

                    self.events.insert(
                        offset,
                        SequenceEvent::BeginTrack {
                            track_number,
                            first_event: target,
                        },
                    );
                    self.fates.insert(offset, Fate::InProgress);
                    self.parse_at(target)?;
                    advance = 5;
                }
                0x94 => {
                    let target = self.read_u24(offset + 1)?;

                    self.events
                        .insert(offset, SequenceEvent::Jump { destination: target });
                    self.fates.insert(offset, Fate::InProgress);
                    let fate = self.parse_at(target)?;
                    self.settle(&sequential, fate);

                    // Execution continues past an unconditional jump only
                    // when it may be skipped by a preceding If.
                    if !self.preceded_by_if(offset) {
                        return Ok(fate);
                    }
                    advance = 4;
                }
                0x95 => {
                    let target = self.read_u24(offset + 1)?;

                    self.events
                        .insert(offset, SequenceEvent::Call { destination: target });
                    self.fates.insert(offset, Fate::InProgress);
                    let fate = self.parse_at(target)?;
                    match fate {
                        Fate::EndOfTrack | Fate::Loop => {
                            self.fates.insert(offset, fate);
                            self.settle(&sequential, fate);
                            return Ok(fate);
                        }
                        Fate::Return | Fate::InProgress => {}
                    }
                    advance = 4;
                }
                0xFD => {
                    self.events.insert(offset, SequenceEvent::Return);
                    self.fates.insert(offset, Fate::Return);
                    self.settle(&sequential, Fate::Return);
                    return Ok(Fate::Return);
                }
                0xFF => {
                    self.events.insert(offset, SequenceEvent::EndTrack);
                    self.fates.insert(offset, Fate::EndOfTrack);
                    self.settle(&sequential, Fate::EndOfTrack);
                    return Ok(Fate::EndOfTrack);
                }
                _ => {
                    let event = parse_basic_event(self.data, offset)?;
                    advance = event.encoded_len();
                    self.events.insert(offset, event);
                    self.fates.insert(offset, Fate::InProgress);
                }
            }

            sequential.push(offset);
            offset += advance;
        }

        Err(self.truncated(offset))
    }

    /// Whether the decoded event immediately before `offset` is an `If`.
    fn preceded_by_if(&self, offset: usize) -> bool {
        let mut x = offset;
        while x > 0 {
            x -= 1;
            if let Some(event) = self.events.get(&x) {
                return matches!(event, SequenceEvent::If);
            }
        }
        false
    }
}

/// Convert raw sequence event data to a list of [`SequenceEvent`]s. This is
/// the inverse of [`write_events`](crate::sound::sequence::write_events).
///
/// `notable_offsets` seeds the worklist (SSAR entry points; pass the empty
/// slice for an SSEQ, which starts at offset 0). The second return value
/// holds the [`EventRef`] each notable offset resolved to.
///
/// # Errors
/// Returns [`Error::MalformedSseq`] for unknown opcodes, truncation, or a
/// track path that neither loops nor ends, and [`Error::OverlappingEvents`]
/// if an address operand lands inside another decoded event.
pub fn read_events(
    data: &[u8],
    notable_offsets: &[usize],
) -> Result<(Vec<SequenceEvent>, Vec<EventRef>)> {
    let mut parser = Parser {
        data,
        events: BTreeMap::new(),
        fates: HashMap::new(),
    };

    let default_starts = [0usize];
    let starts: &[usize] = if notable_offsets.is_empty() && !data.is_empty() {
        &default_starts
    } else {
        notable_offsets
    };

    for &start in starts {
        let fate = parser.parse_at(start)?;
        if !matches!(fate, Fate::EndOfTrack | Fate::Loop) {
            return Err(Error::MalformedSseq {
                reason: "track neither loops nor reaches an end-of-track event".into(),
                offset: start,
            });
        }
    }

    // Assemble the ordered list, filling gaps with raw data.
    let mut events_list: Vec<SequenceEvent> = Vec::new();
    let mut offset_to_index: HashMap<usize, usize> = HashMap::new();
    let mut i = 0usize;
    while i < data.len() {
        if let Some(event) = parser.events.get(&i) {
            offset_to_index.insert(i, events_list.len());
            let len = event.encoded_len();
            events_list.push(event.clone());
            i += len;
        } else {
            let gap_end = parser
                .events
                .range(i..)
                .next()
                .map_or(data.len(), |(&off, _)| off);
            events_list.push(SequenceEvent::RawData {
                data: data[i..gap_end].to_vec(),
            });
            i = gap_end;
        }
    }

    // A decoded event the sweep never landed on sits inside another event.
    for &off in parser.events.keys() {
        if !offset_to_index.contains_key(&off) {
            return Err(Error::OverlappingEvents { offset: off });
        }
    }

    // Resolve address operands from byte offsets to event indices.
    let resolve = |target: usize| -> Result<usize> {
        offset_to_index
            .get(&target)
            .copied()
            .ok_or(Error::OverlappingEvents { offset: target })
    };
    for event in &mut events_list {
        match event {
            SequenceEvent::BeginTrack { first_event, .. } => *first_event = resolve(*first_event)?,
            SequenceEvent::Jump { destination } | SequenceEvent::Call { destination } => {
                *destination = resolve(*destination)?;
            }
            _ => {}
        }
    }

    let mut notable_refs = Vec::with_capacity(notable_offsets.len());
    for &off in notable_offsets {
        notable_refs.push(resolve(off)?);
    }

    Ok((events_list, notable_refs))
}
