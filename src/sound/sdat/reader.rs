//! SDAT parsing
//!
//! Besides the obvious structure, parsing recovers the layout quirks needed
//! to rebuild the archive byte for byte: the file alignment actually in use,
//! whether FAT lengths include padding, whether the final file is padded,
//! and whether the header's SYMB size was rounded up.

use tracing::debug;

use crate::bytes::ByteCursor;
use crate::error::{Error, Result};
use crate::formats::common::StdHeader;
use crate::sound::group::{Group, GroupEntry};
use crate::sound::player::{SequencePlayer, StreamPlayer};
use crate::sound::sbnk::Sbnk;
use crate::sound::sdat::Sdat;
use crate::sound::sseq::Sseq;
use crate::sound::ssar::Ssar;
use crate::sound::strm::Strm;
use crate::sound::swar::Swar;
use crate::utils;

/// A name read from the SYMB block; SSAR entries also carry sub-names.
type Symbol = (Option<String>, Vec<Option<String>>);

struct SymbolReader<'a> {
    data: &'a [u8],
    block_offset: usize,
    /// End of the last string read, relative to the SYMB block.
    last_end_of_string: usize,
}

impl SymbolReader<'_> {
    /// Read the symbol list at `offset` (relative to the SYMB block).
    /// `has_subgroups` selects the nested layout used for SSARs.
    fn read_list(&mut self, offset: Option<usize>, has_subgroups: bool) -> Result<Vec<Symbol>> {
        let Some(offset) = offset else {
            return Ok(Vec::new());
        };

        let mut cursor = ByteCursor::le(self.data);
        cursor.seek(self.block_offset + offset)?;
        let count = cursor.read_u32()? as usize;

        let mut symbols = Vec::with_capacity(count);
        for _ in 0..count {
            let name = self.read_symbol(cursor.read_u32()? as usize)?;
            let subs = if has_subgroups {
                let sub_offset = cursor.read_u32()? as usize;
                if sub_offset == 0 {
                    Vec::new()
                } else {
                    self.read_list(Some(sub_offset), false)?
                        .into_iter()
                        .map(|(n, _)| n)
                        .collect()
                }
            } else {
                Vec::new()
            };
            symbols.push((name, subs));
        }
        Ok(symbols)
    }

    fn read_symbol(&mut self, offset: usize) -> Result<Option<String>> {
        if offset == 0 {
            return Ok(None);
        }
        let name = utils::read_cstring(self.data, self.block_offset + offset).ok_or(
            Error::MalformedSdat(format!("symbol offset {offset:#x} is out of range")),
        )?;
        self.last_end_of_string = offset + name.len() + 1;
        Ok(Some(name))
    }
}

/// Offsets of the per-kind entry tables within a block, read from the
/// block's own 8-slot pointer table.
fn read_part_offsets(data: &[u8], block_offset: usize) -> Result<[usize; 8]> {
    let mut cursor = ByteCursor::le(data);
    cursor.seek(block_offset + 8)?;
    let mut offsets = [0usize; 8];
    for slot in &mut offsets {
        *slot = cursor.read_u32()? as usize;
    }
    Ok(offsets)
}

/// Iterate an INFO part's entry offsets (absolute; `None` for empty rows).
fn info_entry_offsets(
    data: &[u8],
    info_offset: usize,
    part_offset: usize,
) -> Result<Vec<Option<usize>>> {
    let mut cursor = ByteCursor::le(data);
    cursor.seek(info_offset + part_offset)?;
    let count = cursor.read_u32()? as usize;
    let mut offsets = Vec::with_capacity(count);
    for _ in 0..count {
        let entry = cursor.read_u32()? as usize;
        offsets.push((entry != 0).then_some(info_offset + entry));
    }
    Ok(offsets)
}

/// Look up a FAT slot's payload by file ID.
fn file_for<'a>(files: &[&'a [u8]], id: usize) -> Result<&'a [u8]> {
    files
        .get(id)
        .copied()
        .ok_or_else(|| Error::MalformedSdat(format!("file ID {id} not present in FAT")))
}

/// Zip an INFO part with its symbol list, tolerating length mismatches the
/// way retail files require.
fn zip_part<T>(
    entries: Vec<Option<usize>>,
    mut symbols: Vec<Symbol>,
    mut build: impl FnMut(usize, Vec<Option<String>>) -> Result<Option<T>>,
) -> Result<Vec<(Option<String>, Option<T>)>> {
    let len = entries.len().max(symbols.len());
    symbols.resize(len, (None, Vec::new()));

    let mut out = Vec::with_capacity(len);
    for (i, (name, subs)) in symbols.into_iter().enumerate() {
        let value = match entries.get(i).copied().flatten() {
            Some(offset) => build(offset, subs)?,
            None => None,
        };
        out.push((name, value));
    }
    Ok(out)
}

impl Sdat {
    /// Parse an SDAT file.
    ///
    /// # Errors
    /// Returns an error on magic/version mismatches, truncated blocks, or a
    /// malformed nested asset.
    #[allow(clippy::too_many_lines)]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let header = StdHeader::read(data, "SDAT")?;
        if header.version != 0x100 {
            return Err(Self::unsupported_version(header.version));
        }

        let mut cursor = ByteCursor::le(data);
        cursor.seek(0x10)?;
        let symb_offset = cursor.read_u32()? as usize;
        let symb_size = cursor.read_u32()? as usize;
        let info_offset = cursor.read_u32()? as usize;
        let _info_size = cursor.read_u32()?;
        let fat_offset = cursor.read_u32()? as usize;
        let _fat_size = cursor.read_u32()?;
        let file_offset = cursor.read_u32()? as usize;
        let _file_size = cursor.read_u32()?;

        let mut sdat = Sdat::new();

        // ---- SYMB block (optional) ----
        let mut symbol_reader = SymbolReader {
            data,
            block_offset: symb_offset,
            last_end_of_string: 0,
        };
        let symb_parts: [Option<usize>; 8] = if symb_offset != 0 {
            let magic = data
                .get(symb_offset..symb_offset + 4)
                .ok_or(Error::MalformedSdat("SYMB block offset out of range".into()))?;
            if magic != b"SYMB" {
                return Err(Error::InvalidMagic {
                    expected: "SYMB",
                    found: magic.to_vec(),
                });
            }
            read_part_offsets(data, symb_offset)?.map(Some)
        } else {
            [None; 8]
        };

        // ---- FAT / FILE blocks ----
        let fat_magic = data
            .get(fat_offset..fat_offset + 4)
            .ok_or(Error::MalformedSdat("FAT block offset out of range".into()))?;
        if fat_magic != b"FAT " {
            return Err(Error::InvalidMagic {
                expected: "FAT ",
                found: fat_magic.to_vec(),
            });
        }
        let mut fat_cursor = ByteCursor::le(data);
        fat_cursor.seek(fat_offset + 8)?;
        let fat_count = fat_cursor.read_u32()? as usize;

        let mut files: Vec<&[u8]> = Vec::with_capacity(fat_count);
        sdat.file_alignment = 0x200;
        sdat.fat_lengths_include_padding = true;
        let mut final_file_end = file_offset + 8;
        for i in 0..fat_count {
            let offset = fat_cursor.read_u32()? as usize;
            let size = fat_cursor.read_u32()? as usize;
            fat_cursor.read_u32()?; // pad
            fat_cursor.read_u32()?;

            final_file_end = offset + size;

            if i != fat_count - 1 {
                let mut peek = fat_cursor.clone();
                let next_offset = peek.read_u32()? as usize;
                if next_offset.wrapping_sub(offset) != size {
                    sdat.fat_lengths_include_padding = false;
                }
            }

            // Detect the smallest alignment actually used.
            for shift in (0..=8).rev() {
                let alignment = 1usize << shift;
                if offset % (alignment * 2) == alignment {
                    sdat.file_alignment = sdat.file_alignment.min(alignment);
                }
            }
            if i == 0 {
                sdat.first_file_alignment = Some(sdat.file_alignment);
            }

            let end = (offset + size).min(data.len());
            files.push(data.get(offset..end).unwrap_or_default());
        }
        if sdat.first_file_alignment == Some(sdat.file_alignment) {
            sdat.first_file_alignment = None;
        }
        if final_file_end == data.len() && final_file_end % sdat.file_alignment != 0 {
            sdat.pad_at_end = false;
        }

        // ---- INFO block ----
        let info_magic = data
            .get(info_offset..info_offset + 4)
            .ok_or(Error::MalformedSdat("INFO block offset out of range".into()))?;
        if info_magic != b"INFO" {
            return Err(Error::InvalidMagic {
                expected: "INFO",
                found: info_magic.to_vec(),
            });
        }
        let info_parts = read_part_offsets(data, info_offset)?;

        // Part 0: SSEQ
        let entries = info_entry_offsets(data, info_offset, info_parts[0])?;
        let symbols = symbol_reader.read_list(symb_parts[0], false)?;
        sdat.sequences = zip_part(entries, symbols, |offset, _| {
            let mut cur = ByteCursor::le(data);
            cur.seek(offset)?;
            let file_id = usize::from(cur.read_u16()?);
            let unk02 = cur.read_u16()?;
            let bank_id = cur.read_u16()?;
            let volume = cur.read_u8()?;
            let channel_pressure = cur.read_u8()?;
            let polyphonic_pressure = cur.read_u8()?;
            let player_id = cur.read_u8()?;
            let mut sseq = Sseq::from_bytes(
                file_for(&files, file_id)?,
                unk02,
                bank_id,
                volume,
                channel_pressure,
                polyphonic_pressure,
                player_id,
            )?;
            sseq.data_merge_optimization_id = file_id as u32;
            Ok(Some(sseq))
        })?;

        // Part 1: SSAR
        let entries = info_entry_offsets(data, info_offset, info_parts[1])?;
        let symbols = symbol_reader.read_list(symb_parts[1], true)?;
        sdat.sequence_archives = zip_part(entries, symbols, |offset, subs| {
            let mut cur = ByteCursor::le(data);
            cur.seek(offset)?;
            let file_id = usize::from(cur.read_u16()?);
            let unk02 = cur.read_u16()?;
            let mut ssar = Ssar::from_bytes(file_for(&files, file_id)?, unk02, &subs)?;
            ssar.data_merge_optimization_id = file_id as u32;
            Ok(Some(ssar))
        })?;

        // Part 2: SBNK
        let entries = info_entry_offsets(data, info_offset, info_parts[2])?;
        let symbols = symbol_reader.read_list(symb_parts[2], false)?;
        sdat.banks = zip_part(entries, symbols, |offset, _| {
            let mut cur = ByteCursor::le(data);
            cur.seek(offset)?;
            let file_id = usize::from(cur.read_u16()?);
            let unk02 = cur.read_u16()?;
            let mut swar_ids = Vec::with_capacity(4);
            for _ in 0..4 {
                let id = cur.read_i16()?;
                swar_ids.push(u16::try_from(id).ok());
            }
            let mut sbnk = Sbnk::from_bytes(file_for(&files, file_id)?, unk02, swar_ids)?;
            sbnk.data_merge_optimization_id = file_id as u32;
            Ok(Some(sbnk))
        })?;

        // Part 3: SWAR
        let entries = info_entry_offsets(data, info_offset, info_parts[3])?;
        let symbols = symbol_reader.read_list(symb_parts[3], false)?;
        sdat.wave_archives = zip_part(entries, symbols, |offset, _| {
            let mut cur = ByteCursor::le(data);
            cur.seek(offset)?;
            let file_id = usize::from(cur.read_u16()?);
            let unk02 = cur.read_u16()?;
            let mut swar = Swar::from_bytes(file_for(&files, file_id)?, unk02)?;
            swar.data_merge_optimization_id = file_id as u32;
            Ok(Some(swar))
        })?;

        // Part 4: sequence players
        let entries = info_entry_offsets(data, info_offset, info_parts[4])?;
        let symbols = symbol_reader.read_list(symb_parts[4], false)?;
        sdat.sequence_players = zip_part(entries, symbols, |offset, _| {
            let mut cur = ByteCursor::le(data);
            cur.seek(offset)?;
            Ok(Some(SequencePlayer {
                max_sequences: cur.read_u16()?,
                channels: cur.read_u16()?,
                heap_size: cur.read_u32()?,
            }))
        })?;

        // Part 5: groups
        let entries = info_entry_offsets(data, info_offset, info_parts[5])?;
        let symbols = symbol_reader.read_list(symb_parts[5], false)?;
        sdat.groups = zip_part(entries, symbols, |offset, _| {
            let mut cur = ByteCursor::le(data);
            cur.seek(offset)?;
            let count = cur.read_u32()? as usize;
            let mut entries = Vec::with_capacity(count);
            for _ in 0..count {
                let kind = cur.read_u8()?;
                let options = cur.read_u16()?;
                cur.read_u8()?; // pad
                let id = cur.read_u32()?;
                entries.push(GroupEntry::from_wire(kind, options, id)?);
            }
            Ok(Some(Group { entries }))
        })?;

        // Part 6: stream players
        let entries = info_entry_offsets(data, info_offset, info_parts[6])?;
        let symbols = symbol_reader.read_list(symb_parts[6], false)?;
        sdat.stream_players = zip_part(entries, symbols, |offset, _| {
            let mut cur = ByteCursor::le(data);
            cur.seek(offset)?;
            let count = usize::from(cur.read_u8()?);
            let mut channels = Vec::with_capacity(count);
            for _ in 0..count {
                channels.push(cur.read_u8()?);
            }
            Ok(Some(StreamPlayer { channels }))
        })?;

        // Part 7: streams
        let entries = info_entry_offsets(data, info_offset, info_parts[7])?;
        let symbols = symbol_reader.read_list(symb_parts[7], false)?;
        sdat.streams = zip_part(entries, symbols, |offset, _| {
            let mut cur = ByteCursor::le(data);
            cur.seek(offset)?;
            let file_id = usize::from(cur.read_u16()?);
            let unk02 = cur.read_u16()?;
            let volume = cur.read_u8()?;
            let priority = cur.read_u8()?;
            let player_id = cur.read_u8()?;
            let unk07 = cur.read_u8()?;
            let mut strm =
                Strm::from_bytes(file_for(&files, file_id)?, unk02, volume, priority, player_id, unk07)?;
            strm.data_merge_optimization_id = file_id as u32;
            Ok(Some(strm))
        })?;

        // The header's SYMB size was rounded up iff the strings end
        // unaligned while the declared size is aligned.
        if symb_offset != 0
            && symb_size % 4 == 0
            && symbol_reader.last_end_of_string % 4 != 0
        {
            sdat.pad_symb_size_to_4_in_header = true;
        }

        debug!(
            sequences = sdat.sequences.len(),
            banks = sdat.banks.len(),
            wave_archives = sdat.wave_archives.len(),
            streams = sdat.streams.len(),
            "parsed SDAT"
        );

        Ok(sdat)
    }
}
