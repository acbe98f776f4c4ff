//! SDAT serialization
//!
//! The archive is rebuilt in encounter order: SYMB (when any name exists),
//! INFO with its eight parts, a FAT shell, then the FILE block, with the
//! FAT patched as each payload lands. Payloads that are byte-identical and
//! share a merge ID occupy a single FAT slot.

use tracing::debug;

use crate::bytes::ByteWriter;
use crate::error::{Error, Result};
use crate::formats::common::std_header;
use crate::sound::sdat::{NamedEntry, Sdat};
use crate::sound::ssar::Ssar;

/// Deduplicating payload table; entries become FAT slots.
#[derive(Default)]
struct FileTable {
    files: Vec<Vec<u8>>,
    merge_ids: Vec<u32>,
}

impl FileTable {
    fn add(&mut self, file: Vec<u8>, merge_id: u32) -> usize {
        for (i, existing) in self.files.iter().enumerate() {
            if self.merge_ids[i] == merge_id && *existing == file {
                return i;
            }
        }
        self.files.push(file);
        self.merge_ids.push(merge_id);
        self.files.len() - 1
    }
}

/// One value slot in the SYMB table: the raw value, and whether it is a
/// string offset that must be rebased past the table on write.
type SymbValue = (Option<u32>, bool);

#[derive(Default)]
struct SymbBuilder {
    strings: Vec<u8>,
    header_offsets: Vec<u32>,
    values: Vec<SymbValue>,
    any_symbols: bool,
}

impl SymbBuilder {
    fn add_string(&mut self, name: Option<&str>) -> Option<u32> {
        let name = name?;
        let offset = self.strings.len() as u32;
        self.strings.extend(crate::utils::to_latin1(name));
        self.strings.push(0);
        Some(offset)
    }

    /// Add a flat symbol list for one asset kind.
    fn add_list(&mut self, names: Vec<Option<String>>) {
        self.any_symbols |= names.iter().any(Option::is_some);
        self.header_offsets.push(self.values.len() as u32 * 4);

        self.values.push((Some(names.len() as u32), false));
        for name in names {
            let offset = self.add_string(name.as_deref());
            self.values.push((offset, true));
        }
    }

    /// Add the nested symbol list used for sequence archives: each archive
    /// carries a pointer to its own sub-list of per-entry names.
    fn add_nested_list(&mut self, archives: &[NamedEntry<Ssar>]) {
        for (name, archive) in archives {
            self.any_symbols |= name.is_some();
            if let Some(archive) = archive {
                self.any_symbols |= archive.sequences.iter().any(|(n, _)| n.is_some());
            }
        }
        self.header_offsets.push(self.values.len() as u32 * 4);

        let mut main_list: Vec<SymbValue> = Vec::new();
        let mut sub_area: Vec<SymbValue> = Vec::new();

        main_list.push((Some(archives.len() as u32), false));
        let main_list_full_len = (1 + 2 * archives.len() as u32) * 4;
        let sub_area_offset = 0x40 + self.values.len() as u32 * 4 + main_list_full_len;

        for (name, archive) in archives {
            let offset = self.add_string(name.as_deref());
            main_list.push((offset, true));

            let sub_list_offset = sub_area_offset + sub_area.len() as u32 * 4;
            let sub_names = archive.as_ref().map(Ssar::sequence_names).unwrap_or_default();

            if archive.is_some() || !sub_names.is_empty() {
                sub_area.push((Some(sub_names.len() as u32), false));
                for sub_name in &sub_names {
                    let offset = self.add_string(sub_name.as_deref());
                    sub_area.push((offset, true));
                }
                main_list.push((Some(sub_list_offset), false));
            } else {
                main_list.push((Some(0), false));
            }
        }

        self.values.extend(main_list);
        self.values.extend(sub_area);
    }
}

/// Patch an INFO part's pointer slot with the current write position.
fn declare_part(writer: &mut ByteWriter, info_offset: usize, part: usize) {
    let position = (writer.tell() - info_offset) as u32;
    writer.patch_u32_at(info_offset + 8 + 4 * part, position);
}

/// Write an INFO part: the entry count, an offset table, and one record per
/// present entry (absent entries keep a zero offset).
fn write_part<T>(
    writer: &mut ByteWriter,
    info_offset: usize,
    part: usize,
    entries: &[NamedEntry<T>],
    mut write_record: impl FnMut(&mut ByteWriter, &T) -> Result<()>,
) -> Result<()> {
    declare_part(writer, info_offset, part);

    writer.write_u32(entries.len() as u32);
    let table_offset = writer.tell();
    writer.reserve(4 * entries.len());

    for (i, (_, entry)) in entries.iter().enumerate() {
        let Some(entry) = entry else { continue };
        let record_offset = (writer.tell() - info_offset) as u32;
        writer.patch_u32_at(table_offset + 4 * i, record_offset);
        write_record(writer, entry)?;
    }
    Ok(())
}

impl Sdat {
    /// Generate file data representing this SDAT.
    ///
    /// # Errors
    /// Returns an error if a nested asset cannot be serialized or violates
    /// an INFO-record invariant.
    #[allow(clippy::too_many_lines, clippy::cast_possible_truncation)]
    pub fn save(&self) -> Result<Vec<u8>> {
        let mut writer = ByteWriter::new();
        writer.reserve(0x40);

        // ---- SYMB block ----
        let mut symb = SymbBuilder::default();
        symb.add_list(self.sequences.iter().map(|(n, _)| n.clone()).collect());
        symb.add_nested_list(&self.sequence_archives);
        symb.add_list(self.banks.iter().map(|(n, _)| n.clone()).collect());
        symb.add_list(self.wave_archives.iter().map(|(n, _)| n.clone()).collect());
        symb.add_list(self.sequence_players.iter().map(|(n, _)| n.clone()).collect());
        symb.add_list(self.groups.iter().map(|(n, _)| n.clone()).collect());
        symb.add_list(self.stream_players.iter().map(|(n, _)| n.clone()).collect());
        symb.add_list(self.streams.iter().map(|(n, _)| n.clone()).collect());

        let mut symb_block = None;
        if symb.any_symbols {
            let symb_offset = writer.tell();
            let table_len = symb.values.len() as u32 * 4;

            let unpadded_size = 0x40 + symb.values.len() * 4 + symb.strings.len();
            let padded_size = unpadded_size.div_ceil(4) * 4;
            let header_size = if self.pad_symb_size_to_4_in_header {
                padded_size
            } else {
                unpadded_size
            };

            writer.write_bytes(b"SYMB");
            writer.write_u32(padded_size as u32);
            for &offset in &symb.header_offsets {
                writer.write_u32(offset + 0x40);
            }
            writer.write_bytes(&[0; 0x18]);
            for &(value, rebase) in &symb.values {
                match value {
                    None => writer.write_u32(0),
                    Some(v) if rebase => writer.write_u32(v + table_len + 0x40),
                    Some(v) => writer.write_u32(v),
                }
            }
            writer.write_bytes(&symb.strings);

            symb_block = Some((symb_offset, header_size));
        }

        // ---- INFO block ----
        writer.align(4, 0);
        let info_offset = writer.tell();
        writer.reserve(8 + 8 * 4);
        while (writer.tell() - info_offset) % 0x20 != 0 {
            writer.write_u8(0);
        }

        let mut files = FileTable::default();

        // Part 0: SSEQ
        write_part(&mut writer, info_offset, 0, &self.sequences, |w, sseq| {
            let file_id = files.add(sseq.save()?, sseq.data_merge_optimization_id);
            w.write_u16(file_id as u16);
            w.write_u16(sseq.unk02);
            w.write_u16(sseq.bank_id);
            w.write_u8(sseq.volume);
            w.write_u8(sseq.channel_pressure);
            w.write_u8(sseq.polyphonic_pressure);
            w.write_u8(sseq.player_id);
            w.write_u16(0);
            Ok(())
        })?;

        // Part 1: SSAR
        write_part(&mut writer, info_offset, 1, &self.sequence_archives, |w, ssar| {
            let file_id = files.add(ssar.save()?, ssar.data_merge_optimization_id);
            w.write_u16(file_id as u16);
            w.write_u16(ssar.unk02);
            Ok(())
        })?;

        // Part 2: SBNK
        write_part(&mut writer, info_offset, 2, &self.banks, |w, sbnk| {
            if sbnk.wave_archive_ids.len() > 4 {
                return Err(Error::PreconditionFailed(format!(
                    "bank uses {} wave archives; the maximum is 4",
                    sbnk.wave_archive_ids.len()
                )));
            }
            let file_id = files.add(sbnk.save(), sbnk.data_merge_optimization_id);
            w.write_u16(file_id as u16);
            w.write_u16(sbnk.unk02);
            for slot in 0..4 {
                let id = sbnk.wave_archive_ids.get(slot).copied().flatten();
                w.write_i16(id.map_or(-1, |v| v as i16));
            }
            Ok(())
        })?;

        // Part 3: SWAR
        write_part(&mut writer, info_offset, 3, &self.wave_archives, |w, swar| {
            let file_id = files.add(swar.save(), swar.data_merge_optimization_id);
            w.write_u16(file_id as u16);
            w.write_u16(swar.unk02);
            Ok(())
        })?;

        // Part 4: sequence players
        write_part(&mut writer, info_offset, 4, &self.sequence_players, |w, player| {
            w.write_u16(player.max_sequences);
            w.write_u16(player.channels);
            w.write_u32(player.heap_size);
            Ok(())
        })?;

        // Part 5: groups
        write_part(&mut writer, info_offset, 5, &self.groups, |w, group| {
            w.write_u32(group.entries.len() as u32);
            for entry in &group.entries {
                w.write_u8(entry.kind as u8);
                w.write_u16(entry.options());
                w.write_u8(0);
                w.write_u32(entry.id);
            }
            Ok(())
        })?;

        // Part 6: stream players. Each record carries the channel list
        // padded to 16 slots plus four bytes that retail files require for
        // the padding to come out right.
        declare_part(&mut writer, info_offset, 6);
        writer.write_u32(self.stream_players.len() as u32);
        let sp_table_offset = writer.tell();
        writer.reserve(4 * self.stream_players.len());
        for (i, (_, player)) in self.stream_players.iter().enumerate() {
            if let Some(player) = player {
                let record_offset = (writer.tell() - info_offset) as u32;
                writer.patch_u32_at(sp_table_offset + 4 * i, record_offset);

                writer.write_u8(player.channels.len() as u8);
                let mut channels = player.channels.clone();
                channels.resize(16, 0xFF);
                writer.write_bytes(&channels);
                writer.write_bytes(&[0; 4]);
            }
            writer.align(4, 0);
        }

        // Part 7: streams
        write_part(&mut writer, info_offset, 7, &self.streams, |w, strm| {
            let file_id = files.add(strm.to_bytes()?, strm.data_merge_optimization_id);
            w.write_u16(file_id as u16);
            w.write_u16(strm.unk02);
            w.write_u8(strm.volume);
            w.write_u8(strm.priority);
            w.write_u8(strm.player_id);
            w.write_u8(strm.unk07);
            w.write_bytes(&[0; 4]);
            Ok(())
        })?;

        let info_size = writer.tell() - info_offset;
        writer.patch_bytes_at(info_offset, b"INFO");
        writer.patch_u32_at(info_offset + 4, info_size as u32);

        // ---- FAT block (patched while the FILE block is written) ----
        writer.align(4, 0);
        let fat_offset = writer.tell();
        let fat_size = 0xC + 0x10 * files.files.len();
        writer.write_bytes(b"FAT ");
        writer.write_u32(fat_size as u32);
        writer.write_u32(files.files.len() as u32);
        let fat_table_offset = writer.tell();
        writer.reserve(0x10 * files.files.len());

        // ---- FILE block ----
        writer.align(4, 0);
        let file_offset = writer.tell();
        writer.reserve(0xC);

        if let Some(alignment) = self.first_file_alignment {
            writer.align(alignment, 0);
        }

        for (i, file) in files.files.iter().enumerate() {
            writer.align(self.file_alignment, 0);
            let offset = writer.tell();
            writer.write_bytes(file);

            let mut recorded_len = file.len();
            if self.fat_lengths_include_padding {
                recorded_len = recorded_len.div_ceil(self.file_alignment) * self.file_alignment;
            }
            writer.patch_u32_at(fat_table_offset + 0x10 * i, offset as u32);
            writer.patch_u32_at(fat_table_offset + 0x10 * i + 4, recorded_len as u32);
        }

        if self.pad_at_end {
            writer.align(self.file_alignment, 0);
        }

        let file_size = writer.tell() - file_offset;
        writer.patch_bytes_at(file_offset, b"FILE");
        writer.patch_u32_at(file_offset + 4, file_size as u32);
        writer.patch_u32_at(file_offset + 8, files.files.len() as u32);

        // ---- headers ----
        let (symb_offset, symb_size) = symb_block.unwrap_or((0, 0));
        writer.patch_u32_at(0x10, symb_offset as u32);
        writer.patch_u32_at(0x14, symb_size as u32);
        writer.patch_u32_at(0x18, info_offset as u32);
        writer.patch_u32_at(0x1C, info_size as u32);
        writer.patch_u32_at(0x20, fat_offset as u32);
        writer.patch_u32_at(0x24, fat_size as u32);
        writer.patch_u32_at(0x28, file_offset as u32);
        writer.patch_u32_at(0x2C, file_size as u32);

        let block_count = if symb_block.is_some() { 4 } else { 3 };
        let mut header = std_header(*b"SDAT", writer.tell() as u32, block_count);
        header.header_size = 0x40;
        header.write_at(&mut writer, 0);

        debug!(
            files = files.files.len(),
            size = writer.tell(),
            "serialized SDAT"
        );

        Ok(writer.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sound::group::{Group, GroupEntry};
    use crate::sound::player::{SequencePlayer, StreamPlayer};
    use crate::sound::sequence::SequenceEvent;
    use crate::sound::sseq::Sseq;
    use crate::sound::swar::Swar;
    use crate::sound::swav::Swav;

    fn simple_sseq() -> Sseq {
        Sseq::from_events(vec![
            SequenceEvent::Note {
                pitch: 60,
                velocity: 100,
                unknown_flag: false,
                duration: 24,
            },
            SequenceEvent::Rest { duration: 12 },
            SequenceEvent::EndTrack,
        ])
    }

    fn sample_sdat() -> Sdat {
        let mut sdat = Sdat::new();
        sdat.sequences = vec![
            (Some("BGM_A".into()), Some(simple_sseq())),
            (Some("BGM_B".into()), Some(simple_sseq())),
        ];
        sdat.wave_archives = vec![(
            Some("WA_MAIN".into()),
            Some(Swar {
                waves: vec![Swav {
                    data: vec![0x5A; 8],
                    ..Swav::default()
                }],
                unk02: 0,
                data_merge_optimization_id: 0,
            }),
        )];
        sdat.sequence_players = vec![(
            Some("PLAYER0".into()),
            Some(SequencePlayer {
                max_sequences: 2,
                channels: 0xFFFF,
                heap_size: 0,
            }),
        )];
        sdat.stream_players = vec![(None, Some(StreamPlayer { channels: vec![4, 5] }))];
        sdat.groups = vec![(
            Some("GROUP0".into()),
            Some(Group {
                entries: vec![GroupEntry::from_wire(0, 2, 0).unwrap()],
            }),
        )];
        sdat
    }

    #[test]
    fn identical_payloads_share_one_fat_slot() {
        let sdat = sample_sdat();
        let data = sdat.save().unwrap();

        let fat_offset =
            u32::from_le_bytes(data[0x20..0x24].try_into().unwrap()) as usize;
        let fat_count =
            u32::from_le_bytes(data[fat_offset + 8..fat_offset + 12].try_into().unwrap());
        // Two identical SSEQs collapse into one slot; the SWAR gets its own.
        assert_eq!(fat_count, 2);

        let reloaded = Sdat::from_bytes(&data).unwrap();
        assert_eq!(reloaded.sequences.len(), 2);
        let a = reloaded.sequences[0].1.as_ref().unwrap();
        let b = reloaded.sequences[1].1.as_ref().unwrap();
        assert_eq!(a.data_merge_optimization_id, b.data_merge_optimization_id);
    }

    #[test]
    fn distinct_merge_ids_get_their_own_slots() {
        let mut sdat = sample_sdat();
        if let Some(sseq) = &mut sdat.sequences[1].1 {
            sseq.data_merge_optimization_id = 7;
        }
        let data = sdat.save().unwrap();

        let fat_offset =
            u32::from_le_bytes(data[0x20..0x24].try_into().unwrap()) as usize;
        let fat_count =
            u32::from_le_bytes(data[fat_offset + 8..fat_offset + 12].try_into().unwrap());
        assert_eq!(fat_count, 3);
    }

    #[test]
    fn round_trip_preserves_names_and_assets() {
        let sdat = sample_sdat();
        let data = sdat.save().unwrap();
        assert_eq!(&data[..4], b"SDAT");

        let reloaded = Sdat::from_bytes(&data).unwrap();
        assert_eq!(reloaded.sequences[0].0.as_deref(), Some("BGM_A"));
        assert_eq!(reloaded.wave_archives[0].0.as_deref(), Some("WA_MAIN"));
        assert_eq!(reloaded.groups[0].0.as_deref(), Some("GROUP0"));

        let player = reloaded.sequence_players[0].1.as_ref().unwrap();
        assert_eq!(player.max_sequences, 2);
        assert_eq!(player.channels, 0xFFFF);

        let stream_player = reloaded.stream_players[0].1.as_ref().unwrap();
        assert_eq!(stream_player.channels, vec![4, 5]);

        let group = reloaded.groups[0].1.as_ref().unwrap();
        assert_eq!(group.entries.len(), 1);

        let swar = reloaded.wave_archives[0].1.as_ref().unwrap();
        assert_eq!(swar.waves[0].data, vec![0x5A; 8]);
    }

    #[test]
    fn resave_is_stable() {
        let sdat = sample_sdat();
        let first = sdat.save().unwrap();
        let reloaded = Sdat::from_bytes(&first).unwrap();
        let second = reloaded.save().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn nameless_sdat_omits_the_symb_block() {
        let mut sdat = Sdat::new();
        sdat.sequences = vec![(None, Some(simple_sseq()))];
        let data = sdat.save().unwrap();

        // Block count 3, zero SYMB offset and size.
        assert_eq!(u16::from_le_bytes(data[14..16].try_into().unwrap()), 3);
        assert_eq!(u32::from_le_bytes(data[0x10..0x14].try_into().unwrap()), 0);
        assert_eq!(u32::from_le_bytes(data[0x14..0x18].try_into().unwrap()), 0);

        let reloaded = Sdat::from_bytes(&data).unwrap();
        assert_eq!(reloaded.sequences.len(), 1);
        assert!(reloaded.sequences[0].0.is_none());
    }

    #[test]
    fn ssar_subnames_round_trip() {
        use crate::sound::ssar::{Ssar, SsarSequence};

        let ssar = Ssar::from_events_and_sequences(
            vec![SequenceEvent::EndTrack],
            vec![
                (Some("SE_JUMP".into()), SsarSequence::new(Some(0))),
                (Some("SE_COIN".into()), SsarSequence::new(Some(0))),
            ],
        );
        let mut sdat = Sdat::new();
        sdat.sequence_archives = vec![(Some("SAR_MAIN".into()), Some(ssar))];

        let data = sdat.save().unwrap();
        let reloaded = Sdat::from_bytes(&data).unwrap();
        assert_eq!(reloaded.sequence_archives[0].0.as_deref(), Some("SAR_MAIN"));
        let archive = reloaded.sequence_archives[0].1.as_ref().unwrap();
        assert_eq!(archive.sequences[0].0.as_deref(), Some("SE_JUMP"));
        assert_eq!(archive.sequences[1].0.as_deref(), Some("SE_COIN"));
    }
}
