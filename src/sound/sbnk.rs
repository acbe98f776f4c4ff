//! SBNK instrument banks
//!
//! The wire format is a table of `(type, pointer)` pairs followed by the
//! instrument structs the pointers reference. Real banks frequently contain
//! instrument data that no table entry points at; those bytes are recovered
//! heuristically and kept (keyed by the preceding referenced instrument) so
//! the bank re-serializes faithfully.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use byteorder::{ByteOrder, LittleEndian};

use crate::bytes::ByteWriter;
use crate::error::{Error, Result};
use crate::formats::common::{std_header, StdHeader};

pub const NO_INSTRUMENT_TYPE: u8 = 0;
pub const SINGLE_NOTE_PCM_TYPE: u8 = 1;
pub const SINGLE_NOTE_PSG_SQUARE_TYPE: u8 = 2;
pub const SINGLE_NOTE_PSG_NOISE_TYPE: u8 = 3;
pub const RANGE_INSTRUMENT_TYPE: u8 = 16;
pub const REGIONAL_INSTRUMENT_TYPE: u8 = 17;

/// A note definition: a sample (or PSG setting) plus envelope parameters.
///
/// `note_type` 1 is PCM (`wave_id` names an SWAV), 2 is a PSG square wave
/// (`wave_id` holds the duty cycle), 3 is PSG white noise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteDefinition {
    pub wave_id: u16,
    /// Index into the bank's wave-archive slot list (not an SDAT ID).
    pub wave_archive_id_id: u16,
    pub pitch: u8,
    pub attack: u8,
    pub decay: u8,
    pub sustain: u8,
    pub release: u8,
    pub pan: u8,
    pub note_type: u16,
}

impl Default for NoteDefinition {
    fn default() -> Self {
        Self {
            wave_id: 0,
            wave_archive_id_id: 0,
            pitch: 60,
            attack: 127,
            decay: 127,
            sustain: 127,
            release: 127,
            pan: 64,
            note_type: u16::from(SINGLE_NOTE_PCM_TYPE),
        }
    }
}

impl NoteDefinition {
    /// Parse a 10-byte note struct; the type comes from elsewhere.
    fn from_data(data: &[u8], note_type: u16) -> Result<Self> {
        if data.len() < 10 {
            return Err(Error::MalformedSbnk(
                "note definition is truncated".into(),
            ));
        }
        Ok(Self {
            wave_id: LittleEndian::read_u16(&data[0..2]),
            wave_archive_id_id: LittleEndian::read_u16(&data[2..4]),
            pitch: data[4],
            attack: data[5],
            decay: data[6],
            sustain: data[7],
            release: data[8],
            pan: data[9],
            note_type,
        })
    }

    /// Parse a 12-byte note struct that leads with its type value.
    fn from_data_with_type(data: &[u8]) -> Result<Self> {
        if data.len() < 12 {
            return Err(Error::MalformedSbnk(
                "typed note definition is truncated".into(),
            ));
        }
        Self::from_data(&data[2..12], LittleEndian::read_u16(&data[0..2]))
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.wave_id.to_le_bytes());
        out.extend_from_slice(&self.wave_archive_id_id.to_le_bytes());
        out.extend_from_slice(&[
            self.pitch,
            self.attack,
            self.decay,
            self.sustain,
            self.release,
            self.pan,
        ]);
    }

    fn write_with_type(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.note_type.to_le_bytes());
        self.write(out);
    }
}

/// A region within a regional instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    /// Highest pitch this region covers.
    pub last_pitch: u8,
    pub note: NoteDefinition,
}

/// The shape of one instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstrumentKind {
    /// One note definition for every pitch (types 1 through 15).
    SingleNote(NoteDefinition),
    /// One note definition per pitch in `first_pitch..`.
    Range {
        first_pitch: u8,
        notes: Vec<NoteDefinition>,
    },
    /// The pitch range partitioned into up to 8 regions.
    Regional { regions: Vec<Region> },
}

/// An instrument slot's contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instrument {
    pub kind: InstrumentKind,
    /// Sort key preserving the original data order within each category.
    pub bank_order_key: u32,
    /// Byte-identical instrument structs share storage only when these
    /// match.
    pub data_merge_optimization_id: u32,
}

impl Instrument {
    /// The type byte written in the instrument table.
    #[must_use]
    pub fn type_value(&self) -> u8 {
        match &self.kind {
            InstrumentKind::SingleNote(note) => note.note_type as u8,
            InstrumentKind::Range { .. } => RANGE_INSTRUMENT_TYPE,
            InstrumentKind::Regional { .. } => REGIONAL_INSTRUMENT_TYPE,
        }
    }

    /// The instrument's data struct, without the table entry.
    fn payload(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match &self.kind {
            InstrumentKind::SingleNote(note) => note.write(&mut out),
            InstrumentKind::Range { first_pitch, notes } => {
                out.push(*first_pitch);
                out.push(first_pitch + (notes.len() as u8).saturating_sub(1));
                for note in notes {
                    note.write_with_type(&mut out);
                }
            }
            InstrumentKind::Regional { regions } => {
                let mut ends = [0u8; 8];
                for (i, region) in regions.iter().take(8).enumerate() {
                    ends[i] = region.last_pitch;
                }
                out.extend_from_slice(&ends);
                for region in regions {
                    region.note.write_with_type(&mut out);
                }
            }
        }
        out
    }
}

/// Parse the instrument struct of the given type at `offset`, returning the
/// instrument and the number of bytes consumed.
fn instrument_from_data(type_value: u8, data: &[u8], offset: usize) -> Result<(Instrument, usize)> {
    let make = |kind: InstrumentKind, consumed: usize| {
        (
            Instrument {
                kind,
                bank_order_key: offset as u32,
                data_merge_optimization_id: offset as u32,
            },
            consumed,
        )
    };

    let tail = data.get(offset..).ok_or_else(|| {
        Error::MalformedSbnk(format!("instrument data offset {offset:#x} is out of range"))
    })?;

    match type_value {
        1..=15 => {
            let note = NoteDefinition::from_data(tail, u16::from(type_value))?;
            Ok(make(InstrumentKind::SingleNote(note), 10))
        }
        RANGE_INSTRUMENT_TYPE => {
            if tail.len() < 2 {
                return Err(Error::MalformedSbnk("range instrument header is truncated".into()));
            }
            let first_pitch = tail[0];
            let last_pitch = tail[1];
            let count = (i32::from(last_pitch) - i32::from(first_pitch) + 1).max(0) as usize;

            let mut notes = Vec::with_capacity(count);
            let mut consumed = 2;
            for _ in 0..count {
                let note_data = tail.get(consumed..).unwrap_or_default();
                notes.push(NoteDefinition::from_data_with_type(note_data)?);
                consumed += 0xC;
            }
            Ok(make(InstrumentKind::Range { first_pitch, notes }, consumed))
        }
        REGIONAL_INSTRUMENT_TYPE => {
            if tail.len() < 8 {
                return Err(Error::MalformedSbnk("regional instrument header is truncated".into()));
            }
            let mut regions = Vec::new();
            let mut consumed = 8;
            for (i, &end) in tail[..8].iter().enumerate() {
                if end == 0 && i != 0 {
                    break;
                }
                let note_data = tail.get(consumed..).unwrap_or_default();
                let note = NoteDefinition::from_data_with_type(note_data)?;
                consumed += 0xC;
                regions.push(Region {
                    last_pitch: end,
                    note,
                });
            }
            Ok(make(InstrumentKind::Regional { regions }, consumed))
        }
        _ => Err(Error::MalformedSbnk(format!(
            "instrument type {type_value} is invalid"
        ))),
    }
}

/// Guess the type of an unreferenced instrument struct from its bytes and
/// the set of types its position allows. Purely heuristic.
fn guess_instrument_type(
    data: &[u8],
    offset: usize,
    mut possible: BTreeSet<u8>,
    bytes_available: usize,
) -> Option<u8> {
    // The PSG single-note types parse identically to PCM.
    if possible.remove(&SINGLE_NOTE_PSG_SQUARE_TYPE) {
        possible.insert(SINGLE_NOTE_PCM_TYPE);
    }
    if possible.remove(&SINGLE_NOTE_PSG_NOISE_TYPE) {
        possible.insert(SINGLE_NOTE_PCM_TYPE);
    }

    macro_rules! early {
        () => {
            if possible.len() < 2 {
                return possible.iter().next().copied();
            }
        };
    }
    early!();

    if bytes_available < 10 {
        possible.remove(&NO_INSTRUMENT_TYPE);
    }
    if bytes_available < 2 + 0xC {
        possible.remove(&RANGE_INSTRUMENT_TYPE);
    }
    if bytes_available < 8 + 0xC {
        possible.remove(&REGIONAL_INSTRUMENT_TYPE);
    }
    early!();

    if possible.contains(&SINGLE_NOTE_PCM_TYPE) {
        // Retail SWAV/SWAR IDs stay small, and pitch zero is unheard of.
        if data.get(offset + 1).is_some_and(|&b| b >= 10)
            || data.get(offset + 3).is_some_and(|&b| b >= 10)
            || data.get(offset + 4) == Some(&0)
        {
            possible.remove(&SINGLE_NOTE_PCM_TYPE);
        }
        if data.get(offset + 4) == Some(&0x3C) {
            return Some(SINGLE_NOTE_PCM_TYPE);
        }
    }
    early!();

    if possible.contains(&RANGE_INSTRUMENT_TYPE) {
        let first = data.get(offset).copied().unwrap_or(0xFF);
        let last = data.get(offset + 1).copied().unwrap_or(0);
        if first > last {
            possible.remove(&RANGE_INSTRUMENT_TYPE);
        } else {
            let expected = 2 + 0xC * (usize::from(last) - usize::from(first) + 1);
            if expected > bytes_available {
                possible.remove(&RANGE_INSTRUMENT_TYPE);
            }
        }
    }
    early!();

    if possible.contains(&REGIONAL_INSTRUMENT_TYPE) {
        let ends = &data[offset.min(data.len())..(offset + 8).min(data.len())];
        // Region ends must be strictly increasing, then all zero.
        let mut previous = -1i32;
        let mut plausible = ends.len() == 8;
        for &end in ends {
            if previous != 0 && end == 0 {
                previous = 0;
            } else if previous == 0 && end != 0 {
                plausible = false;
                break;
            } else if previous != 0 {
                if i32::from(end) <= previous {
                    plausible = false;
                    break;
                }
                previous = i32::from(end);
            }
        }
        if plausible {
            let region_count = ends.iter().take_while(|&&e| e != 0).count();
            if 8 + 0xC * region_count > bytes_available {
                plausible = false;
            }
        }
        if !plausible {
            possible.remove(&REGIONAL_INSTRUMENT_TYPE);
        }
    }

    possible.iter().next().copied()
}

/// A SBNK instrument bank file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sbnk {
    /// Instruments by ID; `None` is an empty slot.
    pub instruments: Vec<Option<Instrument>>,
    /// Parseable-but-unreferenced instruments, keyed by the ID of the
    /// referenced instrument whose data precedes them (`None` = before
    /// all referenced data).
    pub inaccessible_instruments: BTreeMap<Option<usize>, Vec<Instrument>>,

    // INFO record fields
    pub unk02: u16,
    /// Up to 4 wave-archive slots. Whether these hold SDAT wave-archive IDs
    /// or raw file IDs depends on the group load mode.
    pub wave_archive_ids: Vec<Option<u16>>,
    /// Byte-identical banks share an SDAT file slot only when these match.
    pub data_merge_optimization_id: u32,
}

impl Sbnk {
    /// Parse a SBNK file.
    ///
    /// # Errors
    /// Returns an error on a bad magic, version, or malformed instrument
    /// table.
    pub fn from_bytes(file: &[u8], unk02: u16, wave_archive_ids: Vec<Option<u16>>) -> Result<Self> {
        let header = StdHeader::read(file, "SBNK")?;
        if header.version != 0x100 {
            return Err(Error::UnknownVersion {
                format: "SBNK",
                version: u32::from(header.version),
            });
        }
        if file.len() < 0x3C {
            return Err(Error::MalformedSbnk("file is shorter than its headers".into()));
        }
        if &file[0x10..0x14] != b"DATA" {
            return Err(Error::InvalidMagic {
                expected: "DATA",
                found: file[0x10..0x14].to_vec(),
            });
        }

        let mut bank = Self {
            unk02,
            wave_archive_ids,
            ..Self::default()
        };
        while bank.wave_archive_ids.last() == Some(&None) {
            bank.wave_archive_ids.pop();
        }

        let file_size = (header.file_size as usize).min(file.len());
        let instrument_count = LittleEndian::read_u32(&file[0x38..0x3C]) as usize;
        let table_end = 0x3C + instrument_count * 4;
        if table_end > file_size {
            return Err(Error::MalformedSbnk(format!(
                "instrument table of {instrument_count} entries does not fit the file"
            )));
        }

        let mut unconsumed: BTreeSet<usize> = (table_end..file_size).collect();
        let mut ids_to_offsets: HashMap<usize, usize> = HashMap::new();

        for id in 0..instrument_count {
            let entry = 0x3C + id * 4;
            let type_value = file[entry];
            let offset = usize::from(LittleEndian::read_u16(&file[entry + 1..entry + 3]));

            if type_value == NO_INSTRUMENT_TYPE {
                bank.instruments.push(None);
                continue;
            }

            let (instrument, consumed) = instrument_from_data(type_value, file, offset)?;
            for j in 0..consumed {
                unconsumed.remove(&(offset + j));
            }
            ids_to_offsets.insert(id, offset);
            bank.instruments.push(Some(instrument));
        }

        bank.recover_inaccessible(file, file_size, &mut unconsumed, &ids_to_offsets);
        Ok(bank)
    }

    /// Best-effort recovery of instrument structs no table entry points at.
    fn recover_inaccessible(
        &mut self,
        file: &[u8],
        file_size: usize,
        unconsumed: &mut BTreeSet<usize>,
        ids_to_offsets: &HashMap<usize, usize>,
    ) {
        while !unconsumed.is_empty() {
            // Up to 2 bytes of tail padding are expected.
            if unconsumed.contains(&(file_size.wrapping_sub(1)))
                && unconsumed.contains(&(file_size.wrapping_sub(2)))
                && !unconsumed.contains(&(file_size.wrapping_sub(3)))
            {
                unconsumed.remove(&(file_size - 1));
                unconsumed.remove(&(file_size - 2));
            }
            let Some(&this_offset) = unconsumed.iter().next() else {
                break;
            };

            let prev_id = ids_to_offsets
                .iter()
                .filter(|(_, &off)| off < this_offset)
                .max_by_key(|(_, &off)| off)
                .map(|(&id, _)| id);
            let next_id = ids_to_offsets
                .iter()
                .filter(|(_, &off)| off > this_offset)
                .min_by_key(|(_, &off)| off)
                .map(|(&id, _)| id);

            let mut possible: BTreeSet<u8> = [
                SINGLE_NOTE_PCM_TYPE,
                RANGE_INSTRUMENT_TYPE,
                REGIONAL_INSTRUMENT_TYPE,
            ]
            .into();
            if let Some(prev) = prev_id.and_then(|id| self.instruments[id].as_ref()) {
                if prev.type_value() >= RANGE_INSTRUMENT_TYPE {
                    possible.remove(&SINGLE_NOTE_PCM_TYPE);
                }
                if prev.type_value() == REGIONAL_INSTRUMENT_TYPE {
                    possible.remove(&RANGE_INSTRUMENT_TYPE);
                }
            }
            if let Some(next) = next_id.and_then(|id| self.instruments[id].as_ref()) {
                if next.type_value() <= RANGE_INSTRUMENT_TYPE {
                    possible.remove(&REGIONAL_INSTRUMENT_TYPE);
                }
                if next.type_value() < RANGE_INSTRUMENT_TYPE {
                    possible.remove(&RANGE_INSTRUMENT_TYPE);
                }
            }

            let mut run_end = this_offset + 1;
            while unconsumed.contains(&run_end) {
                run_end += 1;
            }
            let bytes_available = run_end - this_offset;

            let instrument = guess_instrument_type(file, this_offset, possible, bytes_available)
                .and_then(|t| instrument_from_data(t, file, this_offset).ok());

            match instrument {
                None => {
                    // Assume garbage and step past it.
                    unconsumed.remove(&this_offset);
                    unconsumed.remove(&(this_offset + 1));
                }
                Some((instrument, consumed)) => {
                    for j in 0..consumed {
                        unconsumed.remove(&(this_offset + j));
                    }
                    self.inaccessible_instruments
                        .entry(prev_id)
                        .or_default()
                        .push(instrument);
                }
            }
        }
    }

    /// Generate file data representing this SBNK.
    ///
    /// Identical instrument payloads (with matching merge IDs) are stored
    /// once and referenced by multiple table entries.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn save(&self) -> Vec<u8> {
        let table_len = 0x3C + 4 * self.instruments.len();

        // Instrument data is stored grouped by category (single-note, then
        // range, then regional), each category in bank_order_key order.
        let mut payloads: Vec<u8> = Vec::new();
        let mut reuse: HashMap<(Vec<u8>, u32), usize> = HashMap::new();
        let mut add_instrument = |instrument: &Instrument, payloads: &mut Vec<u8>| -> usize {
            let payload = instrument.payload();
            let key = (payload, instrument.data_merge_optimization_id);
            if let Some(&offset) = reuse.get(&key) {
                return offset;
            }
            let offset = payloads.len();
            payloads.extend_from_slice(&key.0);
            reuse.insert(key, offset);
            offset
        };

        let mut index_to_offset: Vec<Option<usize>> = vec![None; self.instruments.len()];

        if let Some(front) = self.inaccessible_instruments.get(&None) {
            for instrument in front {
                add_instrument(instrument, &mut payloads);
            }
        }

        let categories: [fn(u8) -> bool; 3] = [
            |t| t < RANGE_INSTRUMENT_TYPE,
            |t| t == RANGE_INSTRUMENT_TYPE,
            |t| t == REGIONAL_INSTRUMENT_TYPE,
        ];
        for in_category in categories {
            let mut group: Vec<(usize, &Instrument)> = self
                .instruments
                .iter()
                .enumerate()
                .filter_map(|(i, inst)| inst.as_ref().map(|inst| (i, inst)))
                .filter(|(_, inst)| in_category(inst.type_value()))
                .collect();
            group.sort_by_key(|(_, inst)| inst.bank_order_key);

            for (i, instrument) in group {
                index_to_offset[i] = Some(add_instrument(instrument, &mut payloads));
                if let Some(trailing) = self.inaccessible_instruments.get(&Some(i)) {
                    for instrument in trailing {
                        add_instrument(instrument, &mut payloads);
                    }
                }
            }
        }

        // Inaccessible groups keyed past the table still get stored.
        for (id, group) in &self.inaccessible_instruments {
            if let Some(id) = id {
                if *id >= self.instruments.len() {
                    for instrument in group {
                        add_instrument(instrument, &mut payloads);
                    }
                }
            }
        }

        let mut writer = ByteWriter::with_capacity(table_len + payloads.len());
        writer.reserve(table_len);
        for (i, instrument) in self.instruments.iter().enumerate() {
            let entry = 0x3C + 4 * i;
            let type_value = instrument.as_ref().map_or(0, Instrument::type_value);
            let offset = index_to_offset[i].map_or(0, |o| o + table_len);
            writer.patch_bytes_at(entry, &[type_value]);
            writer.patch_u16_at(entry + 1, offset as u16);
        }
        writer.write_bytes(&payloads);
        writer.align(4, 0);

        let total = writer.tell();
        std_header(*b"SBNK", total as u32, 1).write_at(&mut writer, 0);
        writer.patch_bytes_at(0x10, b"DATA");
        writer.patch_u32_at(0x14, (total - 0x10) as u32);
        writer.patch_u32_at(0x38, self.instruments.len() as u32);

        writer.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(pitch: u8, wave: u16) -> Instrument {
        Instrument {
            kind: InstrumentKind::SingleNote(NoteDefinition {
                wave_id: wave,
                pitch,
                ..NoteDefinition::default()
            }),
            bank_order_key: 0,
            data_merge_optimization_id: 0,
        }
    }

    fn sample_bank() -> Sbnk {
        Sbnk {
            instruments: vec![
                Some(single(60, 0)),
                None,
                Some(Instrument {
                    kind: InstrumentKind::Range {
                        first_pitch: 40,
                        notes: vec![NoteDefinition::default(), NoteDefinition::default()],
                    },
                    bank_order_key: 1,
                    data_merge_optimization_id: 1,
                }),
                Some(Instrument {
                    kind: InstrumentKind::Regional {
                        regions: vec![
                            Region {
                                last_pitch: 64,
                                note: NoteDefinition::default(),
                            },
                            Region {
                                last_pitch: 127,
                                note: NoteDefinition {
                                    pitch: 80,
                                    ..NoteDefinition::default()
                                },
                            },
                        ],
                    },
                    bank_order_key: 2,
                    data_merge_optimization_id: 2,
                }),
            ],
            ..Sbnk::default()
        }
    }

    #[test]
    fn round_trips_mixed_instruments() {
        let bank = sample_bank();
        let file = bank.save();
        assert_eq!(&file[..4], b"SBNK");

        let parsed = Sbnk::from_bytes(&file, 0, vec![]).unwrap();
        assert_eq!(parsed.instruments.len(), 4);
        assert!(parsed.instruments[1].is_none());

        for (a, b) in parsed.instruments.iter().zip(&bank.instruments) {
            match (a, b) {
                (Some(a), Some(b)) => assert_eq!(a.kind, b.kind),
                (None, None) => {}
                other => panic!("slot mismatch: {other:?}"),
            }
        }
        assert!(parsed.inaccessible_instruments.is_empty());
    }

    #[test]
    fn identical_payloads_share_storage() {
        let bank = Sbnk {
            instruments: vec![Some(single(60, 3)), Some(single(60, 3))],
            ..Sbnk::default()
        };
        let file = bank.save();

        let offset_a = LittleEndian::read_u16(&file[0x3D..0x3F]);
        let offset_b = LittleEndian::read_u16(&file[0x41..0x43]);
        assert_eq!(offset_a, offset_b);
    }

    #[test]
    fn distinct_merge_ids_do_not_share_storage() {
        let mut a = single(60, 3);
        let mut b = single(60, 3);
        a.data_merge_optimization_id = 1;
        b.data_merge_optimization_id = 2;
        let bank = Sbnk {
            instruments: vec![Some(a), Some(b)],
            ..Sbnk::default()
        };
        let file = bank.save();

        let offset_a = LittleEndian::read_u16(&file[0x3D..0x3F]);
        let offset_b = LittleEndian::read_u16(&file[0x41..0x43]);
        assert_ne!(offset_a, offset_b);
    }

    #[test]
    fn unreferenced_instrument_bytes_are_recovered() {
        // Build a bank of two single-note instruments, then splice an
        // orphan note struct between their data.
        let bank = Sbnk {
            instruments: vec![Some(single(60, 1)), Some(single(62, 2))],
            ..Sbnk::default()
        };
        let mut file = bank.save();

        // Append an orphan 10-byte single-note struct (middle C, small IDs).
        let orphan = NoteDefinition {
            wave_id: 4,
            pitch: 0x3C,
            ..NoteDefinition::default()
        };
        let mut orphan_bytes = Vec::new();
        orphan.write(&mut orphan_bytes);
        let insert_at = file.len();
        file.extend_from_slice(&orphan_bytes);
        let new_len = file.len() as u32;
        file[8..12].copy_from_slice(&new_len.to_le_bytes());
        file[0x14..0x18].copy_from_slice(&(new_len - 0x10).to_le_bytes());
        let _ = insert_at;

        let parsed = Sbnk::from_bytes(&file, 0, vec![]).unwrap();
        let recovered = parsed
            .inaccessible_instruments
            .get(&Some(1))
            .expect("orphan should attach to the last referenced instrument");
        assert_eq!(recovered.len(), 1);
        match &recovered[0].kind {
            InstrumentKind::SingleNote(note) => assert_eq!(note.wave_id, 4),
            other => panic!("expected single-note, got {other:?}"),
        }

        // And the orphan survives a resave.
        let resaved = parsed.save();
        let reparsed = Sbnk::from_bytes(&resaved, 0, vec![]).unwrap();
        assert_eq!(
            reparsed.inaccessible_instruments[&Some(1)][0].kind,
            recovered[0].kind
        );
    }

    #[test]
    fn trailing_wave_archive_nones_are_stripped() {
        let bank = Sbnk::from_bytes(
            &sample_bank().save(),
            0,
            vec![Some(1), None, None, None],
        )
        .unwrap();
        assert_eq!(bank.wave_archive_ids, vec![Some(1)]);
    }
}
