//! Sequence event types and the per-event byte codec

use crate::error::{Error, Result};
use crate::sound::sequence::{
    read_variable_length_int, variable_length_int_len, write_variable_length_int, EventRef,
};

/// Single-byte-operand per-track controllers (opcodes 0xC0 through 0xD6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TrackControl {
    Pan = 0xC0,
    TrackVolume = 0xC1,
    GlobalVolume = 0xC2,
    Transpose = 0xC3,
    Portamento = 0xC4,
    PortamentoRange = 0xC5,
    TrackPriority = 0xC6,
    MonoPoly = 0xC7,
    Tie = 0xC8,
    PortamentoFrom = 0xC9,
    VibratoDepth = 0xCA,
    VibratoSpeed = 0xCB,
    VibratoType = 0xCC,
    VibratoRange = 0xCD,
    PortamentoOnOff = 0xCE,
    PortamentoDuration = 0xCF,
    AttackRate = 0xD0,
    DecayRate = 0xD1,
    SustainRate = 0xD2,
    ReleaseRate = 0xD3,
    BeginLoop = 0xD4,
    Expression = 0xD5,
    PrintVariable = 0xD6,
}

impl TrackControl {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0xC0 => Some(Self::Pan),
            0xC1 => Some(Self::TrackVolume),
            0xC2 => Some(Self::GlobalVolume),
            0xC3 => Some(Self::Transpose),
            0xC4 => Some(Self::Portamento),
            0xC5 => Some(Self::PortamentoRange),
            0xC6 => Some(Self::TrackPriority),
            0xC7 => Some(Self::MonoPoly),
            0xC8 => Some(Self::Tie),
            0xC9 => Some(Self::PortamentoFrom),
            0xCA => Some(Self::VibratoDepth),
            0xCB => Some(Self::VibratoSpeed),
            0xCC => Some(Self::VibratoType),
            0xCD => Some(Self::VibratoRange),
            0xCE => Some(Self::PortamentoOnOff),
            0xCF => Some(Self::PortamentoDuration),
            0xD0 => Some(Self::AttackRate),
            0xD1 => Some(Self::DecayRate),
            0xD2 => Some(Self::SustainRate),
            0xD3 => Some(Self::ReleaseRate),
            0xD4 => Some(Self::BeginLoop),
            0xD5 => Some(Self::Expression),
            0xD6 => Some(Self::PrintVariable),
            _ => None,
        }
    }
}

/// Signed-16-bit-operand controllers (opcodes 0xE0, 0xE1, 0xE3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TrackControl16 {
    VibratoDelay = 0xE0,
    Tempo = 0xE1,
    SweepPitch = 0xE3,
}

impl TrackControl16 {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0xE0 => Some(Self::VibratoDelay),
            0xE1 => Some(Self::Tempo),
            0xE3 => Some(Self::SweepPitch),
            _ => None,
        }
    }
}

/// Variable arithmetic and comparison opcodes (0xB0 through 0xBD).
///
/// The comparison forms set the per-track condition flag read by `If`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VariableOp {
    Set = 0xB0,
    Add = 0xB1,
    Subtract = 0xB2,
    Multiply = 0xB3,
    Divide = 0xB4,
    Shift = 0xB5,
    Rand = 0xB6,
    /// Unobserved at runtime; round-trips as a three-operand-byte no-op.
    UnknownB7 = 0xB7,
    Equal = 0xB8,
    GreaterOrEqual = 0xB9,
    Greater = 0xBA,
    LessOrEqual = 0xBB,
    Less = 0xBC,
    NotEqual = 0xBD,
}

impl VariableOp {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0xB0 => Some(Self::Set),
            0xB1 => Some(Self::Add),
            0xB2 => Some(Self::Subtract),
            0xB3 => Some(Self::Multiply),
            0xB4 => Some(Self::Divide),
            0xB5 => Some(Self::Shift),
            0xB6 => Some(Self::Rand),
            0xB7 => Some(Self::UnknownB7),
            0xB8 => Some(Self::Equal),
            0xB9 => Some(Self::GreaterOrEqual),
            0xBA => Some(Self::Greater),
            0xBB => Some(Self::LessOrEqual),
            0xBC => Some(Self::Less),
            0xBD => Some(Self::NotEqual),
            _ => None,
        }
    }
}

/// One sequence event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceEvent {
    /// Opcodes 0x00 through 0x7F; the opcode is the pitch. Bit 7 of the
    /// velocity byte has no documented meaning but must survive round-trip.
    Note {
        pitch: u8,
        velocity: u8,
        unknown_flag: bool,
        duration: u32,
    },
    /// 0x80: pause the track for a duration.
    Rest { duration: u32 },
    /// 0x81: switch the track to an instrument, possibly in another bank.
    InstrumentSwitch { bank_id: u16, instrument_id: u8 },
    /// 0x93: declare where a track begins executing.
    BeginTrack { track_number: u8, first_event: EventRef },
    /// 0x94: unconditional jump.
    Jump { destination: EventRef },
    /// 0x95: jump, pushing a return address.
    Call { destination: EventRef },
    /// 0xA0: run another event with its last argument randomized.
    Random {
        sub_type: u8,
        args: Vec<u8>,
        min: i16,
        max: i16,
    },
    /// 0xA1: run another event with its last argument read from a variable.
    FromVariable {
        sub_type: u8,
        variable: u8,
        /// Present only when the sub-opcode is a variable op.
        unknown: Option<i8>,
    },
    /// 0xA2: skip the next event if the condition flag is false.
    If,
    /// 0xB0-0xBD: variable arithmetic / comparison.
    Variable {
        op: VariableOp,
        variable: u8,
        value: i16,
    },
    /// 0xC0-0xD6: single-byte-operand track controller.
    Control { kind: TrackControl, value: u8 },
    /// 0xE0/0xE1/0xE3: 16-bit-operand track controller.
    Control16 { kind: TrackControl16, value: i16 },
    /// 0xFC: close the innermost loop opened by `Control::BeginLoop`.
    EndLoop,
    /// 0xFD: return to the most recent `Call`.
    Return,
    /// 0xFE: bitmask of track numbers used by the sequence.
    DefineTracks { tracks: u16 },
    /// 0xFF: end of track.
    EndTrack,
    /// Unreachable bytes, preserved so round-trips are exact.
    RawData { data: Vec<u8> },
}

impl SequenceEvent {
    /// Encoded length of this event in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::Note { duration, .. } => 2 + variable_length_int_len(*duration),
            Self::Rest { duration } => 1 + variable_length_int_len(*duration),
            Self::InstrumentSwitch {
                bank_id,
                instrument_id,
            } => 1 + variable_length_int_len(packed_instrument(*bank_id, *instrument_id)),
            Self::BeginTrack { .. } => 5,
            Self::Jump { .. } | Self::Call { .. } => 4,
            Self::Random { args, .. } => 6 + args.len(),
            Self::FromVariable { unknown, .. } => {
                if unknown.is_some() {
                    4
                } else {
                    3
                }
            }
            Self::If | Self::EndLoop | Self::Return | Self::EndTrack => 1,
            Self::Variable { .. } => 4,
            Self::Control { .. } => 2,
            Self::Control16 { .. } | Self::DefineTracks { .. } => 3,
            Self::RawData { data } => data.len(),
        }
    }

    /// Whether this event carries an address operand.
    #[must_use]
    pub fn address_operand(&self) -> Option<EventRef> {
        match self {
            Self::BeginTrack { first_event, .. } => Some(*first_event),
            Self::Jump { destination } | Self::Call { destination } => Some(*destination),
            _ => None,
        }
    }
}

fn packed_instrument(bank_id: u16, instrument_id: u8) -> u32 {
    u32::from(bank_id) << 7 | u32::from(instrument_id & 0x7F)
}

/// Total encoded length of a `Random` wrapper whose sub-opcode is `sub`,
/// assuming zero-valued operands (the wrapper replaces the sub-opcode's
/// final operand with its own 2x i16 bounds).
fn random_len_for(sub: u8, offset: usize) -> Result<usize> {
    if sub <= 0x7F {
        return Ok(7);
    }
    let base = match sub {
        0x80 | 0x81 => 2,
        0x93 => 5,
        0x94 | 0x95 => 4,
        0xB0..=0xBD => 4,
        0xC0..=0xD6 => 2,
        0xE0 | 0xE1 | 0xE3 => 3,
        0xFE => 3,
        // Operand-less sub-opcodes leave nothing for the wrapper's bounds
        // to replace; there is no valid layout for them.
        _ => {
            return Err(Error::MalformedSseq {
                reason: format!("random wrapper around unsupported opcode {sub:#04x}"),
                offset,
            })
        }
    };
    Ok(4 + base)
}

/// Decode the non-address-operand event at `offset`. Address-typed opcodes
/// (`0x93`-`0x95`) are handled by the reachability pass in the reader.
pub(crate) fn parse_basic_event(data: &[u8], offset: usize) -> Result<SequenceEvent> {
    let byte_at = |at: usize| -> Result<u8> {
        data.get(at).copied().ok_or(Error::MalformedSseq {
            reason: "event operand runs past the end".into(),
            offset: at,
        })
    };
    let i16_at = |at: usize| -> Result<i16> {
        Ok(i16::from_le_bytes([byte_at(at)?, byte_at(at + 1)?]))
    };

    let opcode = byte_at(offset)?;
    let event = match opcode {
        0x00..=0x7F => {
            let velocity_and_flag = byte_at(offset + 1)?;
            let (duration, _) = read_variable_length_int(data, offset + 2)?;
            SequenceEvent::Note {
                pitch: opcode,
                velocity: velocity_and_flag & 0x7F,
                unknown_flag: velocity_and_flag & 0x80 != 0,
                duration,
            }
        }
        0x80 => {
            let (duration, _) = read_variable_length_int(data, offset + 1)?;
            SequenceEvent::Rest { duration }
        }
        0x81 => {
            let (packed, _) = read_variable_length_int(data, offset + 1)?;
            SequenceEvent::InstrumentSwitch {
                bank_id: (packed >> 7) as u16,
                instrument_id: (packed & 0x7F) as u8,
            }
        }
        0xA0 => {
            let sub = byte_at(offset + 1)?;
            let total = random_len_for(sub, offset)?;
            let mut args = Vec::with_capacity(total - 6);
            for i in 0..total - 6 {
                args.push(byte_at(offset + 2 + i)?);
            }
            SequenceEvent::Random {
                sub_type: sub,
                args,
                min: i16_at(offset + total - 4)?,
                max: i16_at(offset + total - 2)?,
            }
        }
        0xA1 => {
            let sub = byte_at(offset + 1)?;
            if (0xB0..=0xBD).contains(&sub) {
                SequenceEvent::FromVariable {
                    sub_type: sub,
                    unknown: Some(byte_at(offset + 2)? as i8),
                    variable: byte_at(offset + 3)?,
                }
            } else {
                SequenceEvent::FromVariable {
                    sub_type: sub,
                    variable: byte_at(offset + 2)?,
                    unknown: None,
                }
            }
        }
        0xA2 => SequenceEvent::If,
        0xB0..=0xBD => SequenceEvent::Variable {
            op: VariableOp::from_u8(opcode).unwrap(),
            variable: byte_at(offset + 1)?,
            value: i16_at(offset + 2)?,
        },
        0xC0..=0xD6 => SequenceEvent::Control {
            kind: TrackControl::from_u8(opcode).unwrap(),
            value: byte_at(offset + 1)?,
        },
        0xE0 | 0xE1 | 0xE3 => SequenceEvent::Control16 {
            kind: TrackControl16::from_u8(opcode).unwrap(),
            value: i16_at(offset + 1)?,
        },
        0xFC => SequenceEvent::EndLoop,
        0xFE => {
            let tracks = u16::from_le_bytes([byte_at(offset + 1)?, byte_at(offset + 2)?]);
            SequenceEvent::DefineTracks { tracks }
        }
        _ => {
            return Err(Error::MalformedSseq {
                reason: format!("unrecognized event {opcode:#04x}"),
                offset,
            })
        }
    };
    Ok(event)
}

/// Append the encoding of `event`, substituting resolved offsets for
/// address operands via `offset_of`.
pub(crate) fn write_event(
    event: &SequenceEvent,
    out: &mut Vec<u8>,
    offset_of: impl Fn(EventRef) -> Result<u32>,
) -> Result<()> {
    match event {
        SequenceEvent::Note {
            pitch,
            velocity,
            unknown_flag,
            duration,
        } => {
            if *pitch > 127 {
                return Err(Error::PreconditionFailed(format!(
                    "note pitch must be < 128 (found {pitch})"
                )));
            }
            if *velocity > 127 {
                return Err(Error::PreconditionFailed(format!(
                    "note velocity must be < 128 (found {velocity})"
                )));
            }
            out.push(*pitch);
            out.push(*velocity | if *unknown_flag { 0x80 } else { 0 });
            write_variable_length_int(out, *duration);
        }
        SequenceEvent::Rest { duration } => {
            out.push(0x80);
            write_variable_length_int(out, *duration);
        }
        SequenceEvent::InstrumentSwitch {
            bank_id,
            instrument_id,
        } => {
            out.push(0x81);
            write_variable_length_int(out, packed_instrument(*bank_id, *instrument_id));
        }
        SequenceEvent::BeginTrack {
            track_number,
            first_event,
        } => {
            out.push(0x93);
            out.push(*track_number);
            out.extend_from_slice(&offset_of(*first_event)?.to_le_bytes()[..3]);
        }
        SequenceEvent::Jump { destination } => {
            out.push(0x94);
            out.extend_from_slice(&offset_of(*destination)?.to_le_bytes()[..3]);
        }
        SequenceEvent::Call { destination } => {
            out.push(0x95);
            out.extend_from_slice(&offset_of(*destination)?.to_le_bytes()[..3]);
        }
        SequenceEvent::Random {
            sub_type,
            args,
            min,
            max,
        } => {
            out.push(0xA0);
            out.push(*sub_type);
            out.extend_from_slice(args);
            out.extend_from_slice(&min.to_le_bytes());
            out.extend_from_slice(&max.to_le_bytes());
        }
        SequenceEvent::FromVariable {
            sub_type,
            variable,
            unknown,
        } => {
            out.push(0xA1);
            out.push(*sub_type);
            if let Some(unknown) = unknown {
                out.push(*unknown as u8);
            }
            out.push(*variable);
        }
        SequenceEvent::If => out.push(0xA2),
        SequenceEvent::Variable {
            op,
            variable,
            value,
        } => {
            out.push(*op as u8);
            out.push(*variable);
            out.extend_from_slice(&value.to_le_bytes());
        }
        SequenceEvent::Control { kind, value } => {
            out.push(*kind as u8);
            out.push(*value);
        }
        SequenceEvent::Control16 { kind, value } => {
            out.push(*kind as u8);
            out.extend_from_slice(&value.to_le_bytes());
        }
        SequenceEvent::EndLoop => out.push(0xFC),
        SequenceEvent::Return => out.push(0xFD),
        SequenceEvent::DefineTracks { tracks } => {
            out.push(0xFE);
            out.extend_from_slice(&tracks.to_le_bytes());
        }
        SequenceEvent::EndTrack => out.push(0xFF),
        SequenceEvent::RawData { data } => out.extend_from_slice(data),
    }
    Ok(())
}
