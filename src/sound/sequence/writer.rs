//! Lowering an event list back to sequence-event data

use crate::error::{Error, Result};
use crate::sound::sequence::events::write_event;
use crate::sound::sequence::{EventRef, SequenceEvent};

/// Convert a list of [`SequenceEvent`]s to raw sequence event data. This is
/// the inverse of [`read_events`](crate::sound::sequence::read_events).
///
/// The second return value holds the final byte offset of each event in
/// `notable_events` (SSAR entry points).
///
/// # Errors
/// Returns [`Error::DanglingReference`] if an address operand (or a notable
/// reference) does not point at an event in the list, and
/// [`Error::PreconditionFailed`] for out-of-range operand values.
pub fn write_events(
    events: &[SequenceEvent],
    notable_events: &[EventRef],
) -> Result<(Vec<u8>, Vec<u32>)> {
    // Pass 1: lay out offsets from the encoded lengths.
    let mut offsets = Vec::with_capacity(events.len());
    let mut position = 0u32;
    for event in events {
        offsets.push(position);
        position += event.encoded_len() as u32;
    }

    // Pass 2: emit, substituting each address operand's resolved offset.
    let offset_of = |target: EventRef| -> Result<u32> {
        offsets
            .get(target)
            .copied()
            .ok_or(Error::DanglingReference { index: target })
    };

    let mut data = Vec::with_capacity(position as usize);
    for event in events {
        write_event(event, &mut data, &offset_of)?;
    }

    let mut notable_offsets = Vec::with_capacity(notable_events.len());
    for &event_ref in notable_events {
        notable_offsets.push(offset_of(event_ref)?);
    }

    Ok((data, notable_offsets))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sound::sequence::{read_events, TrackControl, TrackControl16, VariableOp};

    #[test]
    fn lift_lower_fixpoint() {
        let events = vec![
            SequenceEvent::DefineTracks { tracks: 0b0011 },
            SequenceEvent::BeginTrack {
                track_number: 1,
                first_event: 4,
            },
            SequenceEvent::Control16 {
                kind: TrackControl16::Tempo,
                value: 120,
            },
            SequenceEvent::EndTrack,
            SequenceEvent::Note {
                pitch: 60,
                velocity: 100,
                unknown_flag: false,
                duration: 48,
            },
            SequenceEvent::Rest { duration: 200 },
            SequenceEvent::EndTrack,
        ];
        let (data, offsets) = write_events(&events, &[0]).unwrap();
        assert_eq!(offsets, vec![0]);

        let (reparsed, notable) = read_events(&data, &[0]).unwrap();
        assert_eq!(reparsed, events);
        assert_eq!(notable, vec![0]);

        let (data2, _) = write_events(&reparsed, &[0]).unwrap();
        assert_eq!(data2, data);
    }

    #[test]
    fn parse_resolves_address_operands() {
        // Track 0: DefineTracks {0,1}, BeginTrack 1 -> @16, two filler
        // events, Jump -> @0. Track 1 at @16: two notes then EndTrack.
        let mut data = Vec::new();
        data.extend_from_slice(&[0xFE, 0x03, 0x00]); // DefineTracks
        data.extend_from_slice(&[0x93, 0x01, 16, 0, 0]); // BeginTrack 1 -> 16
        data.extend_from_slice(&[0xC1, 0x7F]); // track volume
        data.extend_from_slice(&[0xC0, 0x40]); // pan
        data.extend_from_slice(&[0x94, 0x00, 0x00, 0x00]); // Jump -> 0
        data.extend_from_slice(&[0x3C, 0x64, 0x30]); // note C, vel 100, dur 48
        data.extend_from_slice(&[0x3E, 0x64, 0x30]); // note D
        data.push(0xFF); // EndTrack

        let (events, notable) = read_events(&data, &[]).unwrap();
        assert_eq!(events.len(), 8);
        assert_eq!(notable, Vec::<usize>::new());

        assert!(matches!(events[0], SequenceEvent::DefineTracks { tracks: 3 }));
        match events[1] {
            SequenceEvent::BeginTrack {
                track_number,
                first_event,
            } => {
                assert_eq!(track_number, 1);
                // The target resolves to the first Note.
                assert!(matches!(
                    events[first_event],
                    SequenceEvent::Note { pitch: 0x3C, .. }
                ));
            }
            ref other => panic!("expected BeginTrack, got {other:?}"),
        }
        match events[4] {
            SequenceEvent::Jump { destination } => {
                assert!(matches!(
                    events[destination],
                    SequenceEvent::DefineTracks { .. }
                ));
            }
            ref other => panic!("expected Jump, got {other:?}"),
        }
    }

    #[test]
    fn self_referential_jump_round_trips() {
        let events = vec![SequenceEvent::Jump { destination: 0 }];
        let (data, _) = write_events(&events, &[]).unwrap();
        let (reparsed, _) = read_events(&data, &[]).unwrap();
        assert_eq!(reparsed, events);
        let (data2, _) = write_events(&reparsed, &[]).unwrap();
        assert_eq!(data2, data);
    }

    #[test]
    fn unreachable_bytes_survive_as_raw_data() {
        let mut data = vec![0xFF]; // EndTrack at 0
        data.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]); // junk tail
        let (events, _) = read_events(&data, &[]).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            SequenceEvent::RawData {
                data: vec![0xDE, 0xAD, 0xBE, 0xEF]
            }
        );
        let (out, _) = write_events(&events, &[]).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn address_into_event_interior_is_overlap() {
        // The conditional jump targets offset 6, which the fall-through
        // path decodes as the interior of the Pan event at offset 5.
        let mut data = Vec::new();
        data.push(0xA2); // If at 0
        data.extend_from_slice(&[0x94, 0x06, 0x00, 0x00]); // Jump -> 6
        data.extend_from_slice(&[0xC0, 0xC1]); // pan at 5..7
        data.push(0xFF); // EndTrack at 7
        data.push(0xFF); // EndTrack at 8 (jumped path)
        let result = read_events(&data, &[]);
        assert!(matches!(result, Err(Error::OverlappingEvents { .. })));
    }

    #[test]
    fn dangling_reference_is_rejected() {
        let events = vec![SequenceEvent::Jump { destination: 9 }];
        assert!(matches!(
            write_events(&events, &[]),
            Err(Error::DanglingReference { index: 9 })
        ));
    }

    #[test]
    fn call_and_return_paths_parse() {
        let mut data = Vec::new();
        data.extend_from_slice(&[0x95, 0x05, 0x00, 0x00]); // Call -> 5
        data.push(0xFF); // EndTrack at 4
        data.extend_from_slice(&[0xD0, 0x60]); // attack rate at 5
        data.push(0xFD); // Return at 7

        let (events, _) = read_events(&data, &[]).unwrap();
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], SequenceEvent::Call { destination: 2 }));
        assert!(matches!(
            events[2],
            SequenceEvent::Control {
                kind: TrackControl::AttackRate,
                value: 0x60
            }
        ));
        assert!(matches!(events[3], SequenceEvent::Return));
    }

    #[test]
    fn conditional_jump_falls_through() {
        let mut data = Vec::new();
        data.push(0xA2); // If at 0
        data.extend_from_slice(&[0x94, 0x09, 0x00, 0x00]); // Jump -> 9 at 1
        data.extend_from_slice(&[0xB0, 0x02, 0x10, 0x00]); // var set at 5
        data.push(0xFF); // EndTrack at 9

        let (events, _) = read_events(&data, &[]).unwrap();
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], SequenceEvent::If));
        assert!(matches!(
            events[2],
            SequenceEvent::Variable {
                op: VariableOp::Set,
                variable: 2,
                value: 0x10
            }
        ));
    }

    #[test]
    fn wrapper_opcodes_round_trip() {
        let events = vec![
            SequenceEvent::Random {
                sub_type: 0x3C,
                args: vec![100],
                min: 10,
                max: 20,
            },
            SequenceEvent::Random {
                sub_type: 0xC0,
                args: vec![],
                min: -5,
                max: 5,
            },
            SequenceEvent::FromVariable {
                sub_type: 0xC1,
                variable: 3,
                unknown: None,
            },
            SequenceEvent::FromVariable {
                sub_type: 0xB1,
                variable: 4,
                unknown: Some(-1),
            },
            SequenceEvent::EndTrack,
        ];
        let (data, _) = write_events(&events, &[]).unwrap();
        let (reparsed, _) = read_events(&data, &[]).unwrap();
        assert_eq!(reparsed, events);
    }

    #[test]
    fn random_wrapper_around_operandless_opcode_is_rejected() {
        // If, EndLoop, Return and EndTrack have no operand for the wrapper
        // to randomize; such streams must error, not crash.
        for sub in [0xA2u8, 0xFC, 0xFD, 0xFF] {
            let data = [0xA0, sub, 0x00, 0x00, 0x00, 0x00, 0xFF];
            let result = read_events(&data, &[]);
            assert!(
                matches!(result, Err(Error::MalformedSseq { .. })),
                "sub-opcode {sub:#04x}"
            );
        }
    }

    #[test]
    fn notable_offsets_resolve_to_entry_events(){
        // Two entry points sharing a tail.
        let mut data = Vec::new();
        data.extend_from_slice(&[0x3C, 0x64, 0x30]); // entry A at 0
        data.push(0xFF); // EndTrack at 3
        data.extend_from_slice(&[0x3E, 0x64, 0x30]); // entry B at 4
        data.extend_from_slice(&[0x94, 0x03, 0x00, 0x00]); // Jump -> 3

        let (events, notable) = read_events(&data, &[0, 4]).unwrap();
        assert_eq!(notable.len(), 2);
        assert!(matches!(events[notable[0]], SequenceEvent::Note { pitch: 0x3C, .. }));
        assert!(matches!(events[notable[1]], SequenceEvent::Note { pitch: 0x3E, .. }));
    }
}
