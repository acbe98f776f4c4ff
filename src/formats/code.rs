//! Executable code containers: main ARM7/ARM9 code files and overlays
//!
//! A main code file carries a "code settings" block (located through a
//! header pointer, or by heuristic search) that enumerates the sections to
//! copy into RAM. Overlays are described by 32-byte table records held in
//! the ROM; the record's flag byte says whether the overlay file is
//! code-compressed.

use std::collections::BTreeMap;

use byteorder::{ByteOrder, LittleEndian};

use crate::bytes::{ByteCursor, ByteWriter};
use crate::compression::code as code_compression;
use crate::error::{Error, Result};

/// Marker words surrounding the code settings block in ARM9 binaries.
const NITRO_CODE_MAGIC: [u8; 8] = [0x21, 0x06, 0xC0, 0xDE, 0xDE, 0xC0, 0x06, 0x21];

/// A single section within a main code file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub data: Vec<u8>,
    /// Address the section is copied to at boot.
    pub ram_address: u32,
    /// Size of the zero-filled region following the section in RAM.
    pub bss_size: u32,
    /// True for the leading section that is not listed in the section table.
    pub implicit: bool,
}

/// Either the main ARM7 code file or the main ARM9 code file.
#[derive(Debug, Clone)]
pub struct MainCode {
    pub sections: Vec<Section>,
    pub ram_address: u32,
    /// Offset of the code settings block within the decompressed data, if
    /// one was found.
    pub code_settings_offset: Option<usize>,
}

impl MainCode {
    /// Parse a main code file. Compressed input is decompressed first.
    ///
    /// `code_settings_pointer_address` is the in-RAM address of the pointer
    /// to the settings block plus 4, as stored in the ROM header; pass
    /// `None` (or 0) to rely on the heuristic search.
    ///
    /// # Errors
    /// Returns an error if decompression fails.
    pub fn parse(
        data: &[u8],
        ram_address: u32,
        code_settings_pointer_address: Option<u32>,
    ) -> Result<Self> {
        let data = code_compression::decompress(data)?;

        let mut settings_offset = None;
        if let Some(pointer_address) = code_settings_pointer_address.filter(|&p| p != 0) {
            settings_offset = pointer_address
                .checked_sub(ram_address)
                .and_then(|o| o.checked_sub(4))
                .map(|o| o as usize)
                .filter(|&o| o + 4 <= data.len())
                .map(|o| LittleEndian::read_u32(&data[o..o + 4]))
                .and_then(|addr| addr.checked_sub(ram_address))
                .map(|o| o as usize)
                .filter(|&o| o + 12 <= data.len());
        }
        if settings_offset.is_none() {
            settings_offset =
                search_code_settings(&data, ram_address).filter(|&o| o + 12 <= data.len());
        }

        let (copy_table_begin, copy_table_end, mut data_begin) = match settings_offset {
            Some(offset) => {
                let begin = LittleEndian::read_u32(&data[offset..offset + 4]);
                let end = LittleEndian::read_u32(&data[offset + 4..offset + 8]);
                let data_begin = LittleEndian::read_u32(&data[offset + 8..offset + 12]);
                (
                    begin.saturating_sub(ram_address) as usize,
                    end.saturating_sub(ram_address) as usize,
                    data_begin.saturating_sub(ram_address) as usize,
                )
            }
            // No code settings: the entire file is one implied section.
            None => (0, 0, data.len()),
        };

        data_begin = data_begin.min(data.len());

        let slice_at = |offset: usize, len: usize| -> Vec<u8> {
            let lo = offset.min(data.len());
            let hi = (offset + len).min(data.len());
            data[lo..hi].to_vec()
        };

        let mut sections = vec![Section {
            data: slice_at(0, data_begin),
            ram_address,
            bss_size: 0,
            implicit: true,
        }];

        let mut table_pos = copy_table_begin;
        while table_pos + 12 <= copy_table_end && table_pos + 12 <= data.len() {
            let sec_ram = LittleEndian::read_u32(&data[table_pos..table_pos + 4]);
            let sec_size = LittleEndian::read_u32(&data[table_pos + 4..table_pos + 8]) as usize;
            let bss_size = LittleEndian::read_u32(&data[table_pos + 8..table_pos + 12]);
            table_pos += 12;

            sections.push(Section {
                data: slice_at(data_begin, sec_size),
                ram_address: sec_ram,
                bss_size,
                implicit: false,
            });
            data_begin += sec_size;
        }

        Ok(Self {
            sections,
            ram_address,
            code_settings_offset: settings_offset,
        })
    }

    /// Create a main code file directly from a list of sections.
    #[must_use]
    pub fn from_sections(sections: Vec<Section>, ram_address: u32) -> Self {
        Self {
            sections,
            ram_address,
            code_settings_offset: None,
        }
    }

    /// Generate a byte buffer representing this code file.
    ///
    /// # Errors
    /// Returns [`Error::PreconditionFailed`] if there are no sections.
    pub fn save(&self, compress: bool) -> Result<Vec<u8>> {
        let first = self
            .sections
            .first()
            .ok_or_else(|| Error::PreconditionFailed("code file has no sections".into()))?;
        let first_len = first.data.len();

        let mut writer = ByteWriter::new();
        for section in &self.sections {
            writer.write_bytes(&section.data);
            writer.align(4, 0);
        }

        // Sections with data come first in the table, then the empty ones.
        let mut table = ByteWriter::new();
        for section in self.sections.iter().filter(|s| !s.implicit) {
            if !section.data.is_empty() {
                table.write_u32(section.ram_address);
                table.write_u32(section.data.len() as u32);
                table.write_u32(section.bss_size);
            }
        }
        for section in self.sections.iter().filter(|s| !s.implicit) {
            if section.data.is_empty() {
                table.write_u32(section.ram_address);
                table.write_u32(0);
                table.write_u32(section.bss_size);
            }
        }

        let table_offset = writer.tell();
        let table_len = table.tell();
        writer.write_bytes(table.as_slice());

        if let Some(offset) = self.code_settings_offset {
            let table_address = self.ram_address + table_offset as u32;
            writer.patch_u32_at(offset, table_address);
            writer.patch_u32_at(offset + 4, table_address + table_len as u32);
            writer.patch_u32_at(offset + 8, self.ram_address + first_len as u32);
        }

        let mut data = writer.into_inner();
        if compress {
            data = code_compression::compress(&data, true);
        }
        if let Some(offset) = self.code_settings_offset {
            let compressed_end = if compress {
                self.ram_address + data.len() as u32
            } else {
                0
            };
            if offset + 0x18 <= data.len() {
                data[offset + 0x14..offset + 0x18].copy_from_slice(&compressed_end.to_le_bytes());
            }
        }

        Ok(data)
    }
}

/// Locate the code settings block without a header pointer.
fn search_code_settings(data: &[u8], ram_address: u32) -> Option<usize> {
    // ARM9 binaries carry a recognizable marker just after the block.
    let scan_end = data.len().min(0x8000);
    for i in (0..scan_end.saturating_sub(8)).step_by(4) {
        if data[i..i + 8] == NITRO_CODE_MAGIC {
            return i.checked_sub(0x1C);
        }
    }

    // ARM7 lacks the marker; assume the section table is the very last
    // thing in the file and look for a pointer to its end.
    let expected_end = ram_address.wrapping_add(data.len() as u32);
    let needle = expected_end.to_le_bytes();
    let mut search_from = 0usize;
    while let Some(found) = find_subslice(&data[search_from..], &needle) {
        let pos = search_from + found;
        if pos >= 4 {
            let table_start = LittleEndian::read_u32(&data[pos - 4..pos]);
            if table_start % 4 == 0
                && expected_end.wrapping_sub(table_start) % 12 == 0
                && expected_end.wrapping_sub(table_start) < 0x100
            {
                return Some(pos - 4);
            }
        }
        search_from = pos + 1;
    }
    None
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// An ARM7 or ARM9 code overlay.
#[derive(Debug, Clone)]
pub struct Overlay {
    /// Decompressed overlay contents.
    pub data: Vec<u8>,
    pub ram_address: u32,
    pub ram_size: u32,
    pub bss_size: u32,
    pub static_init_start: u32,
    pub static_init_end: u32,
    pub file_id: u32,
    pub compressed_size: u32,
    pub flags: u8,
}

impl Overlay {
    /// Build an overlay from a table record and its file data, decompressing
    /// if the record's flag says so.
    ///
    /// # Errors
    /// Returns an error if decompression fails.
    #[allow(clippy::too_many_arguments)]
    pub fn parse(
        file_data: &[u8],
        ram_address: u32,
        ram_size: u32,
        bss_size: u32,
        static_init_start: u32,
        static_init_end: u32,
        file_id: u32,
        compressed_size: u32,
        flags: u8,
    ) -> Result<Self> {
        let data = if flags & 1 != 0 {
            code_compression::decompress(file_data)?
        } else {
            file_data.to_vec()
        };
        Ok(Self {
            data,
            ram_address,
            ram_size,
            bss_size,
            static_init_start,
            static_init_end,
            file_id,
            compressed_size,
            flags,
        })
    }

    #[must_use]
    pub fn compressed(&self) -> bool {
        self.flags & 1 != 0
    }

    pub fn set_compressed(&mut self, value: bool) {
        if value {
            self.flags |= 1;
        } else {
            self.flags &= !1;
        }
    }

    #[must_use]
    pub fn verify_hash(&self) -> bool {
        self.flags & 2 != 0
    }

    pub fn set_verify_hash(&mut self, value: bool) {
        if value {
            self.flags |= 2;
        } else {
            self.flags &= !2;
        }
    }

    /// Generate this overlay's file contents, updating the record fields
    /// (`ram_size`, `compressed_size`, the compressed flag) to match.
    #[must_use]
    pub fn save(&mut self, compress: bool) -> Vec<u8> {
        self.ram_size = self.data.len() as u32;
        let data = if compress {
            code_compression::compress(&self.data, false)
        } else {
            self.data.clone()
        };
        self.compressed_size = data.len() as u32;
        self.set_compressed(compress);
        data
    }
}

/// Parse overlay table data into overlays, keyed by overlay ID. The callback
/// supplies the file data for `(overlay_id, file_id)`. This is the inverse
/// of [`save_overlay_table`].
///
/// # Errors
/// Returns an error if a record is truncated or a file fails to decompress.
pub fn load_overlay_table(
    table: &[u8],
    mut file_data: impl FnMut(u32, u32) -> Result<Vec<u8>>,
    ids_to_load: Option<&[u32]>,
) -> Result<BTreeMap<u32, Overlay>> {
    let mut overlays = BTreeMap::new();
    let mut cursor = ByteCursor::le(table);

    for _ in 0..table.len() / 32 {
        let overlay_id = cursor.read_u32()?;
        let ram_address = cursor.read_u32()?;
        let ram_size = cursor.read_u32()?;
        let bss_size = cursor.read_u32()?;
        let static_init_start = cursor.read_u32()?;
        let static_init_end = cursor.read_u32()?;
        let file_id = cursor.read_u32()?;
        let compressed_size_and_flags = cursor.read_u32()?;

        if let Some(ids) = ids_to_load {
            if !ids.contains(&overlay_id) {
                continue;
            }
        }

        let data = file_data(overlay_id, file_id)?;
        overlays.insert(
            overlay_id,
            Overlay::parse(
                &data,
                ram_address,
                ram_size,
                bss_size,
                static_init_start,
                static_init_end,
                file_id,
                compressed_size_and_flags & 0xFF_FFFF,
                (compressed_size_and_flags >> 24) as u8,
            )?,
        );
    }

    Ok(overlays)
}

/// Generate overlay table data from a map of overlays. This is the inverse
/// of [`load_overlay_table`].
#[must_use]
pub fn save_overlay_table(table: &BTreeMap<u32, Overlay>) -> Vec<u8> {
    let mut writer = ByteWriter::with_capacity(table.len() * 32);
    for (&overlay_id, overlay) in table {
        writer.write_u32(overlay_id);
        writer.write_u32(overlay.ram_address);
        writer.write_u32(overlay.ram_size);
        writer.write_u32(overlay.bss_size);
        writer.write_u32(overlay.static_init_start);
        writer.write_u32(overlay.static_init_end);
        writer.write_u32(overlay.file_id);
        writer.write_u32(overlay.compressed_size | u32::from(overlay.flags) << 24);
    }
    writer.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a minimal code image: settings block + two listed sections.
    fn sample_code() -> (Vec<u8>, u32) {
        let ram = 0x0200_0000u32;

        // Implicit section: settings block at offset 0x20 inside 0x40 bytes.
        let mut data = vec![0u8; 0x40];
        let settings = 0x20usize;

        let sec1: Vec<u8> = (0..16).collect();
        let sec2 = vec![0xAB; 8];

        let table_offset = 0x40 + sec1.len() + sec2.len();
        let table_addr = ram + table_offset as u32;

        data.extend_from_slice(&sec1);
        data.extend_from_slice(&sec2);
        // Section table rows.
        for (addr, size, bss) in [(0x0280_0000u32, 16u32, 4u32), (0x0281_0000, 8, 0)] {
            data.extend_from_slice(&addr.to_le_bytes());
            data.extend_from_slice(&size.to_le_bytes());
            data.extend_from_slice(&bss.to_le_bytes());
        }

        data[settings..settings + 4].copy_from_slice(&table_addr.to_le_bytes());
        data[settings + 4..settings + 8].copy_from_slice(&(table_addr + 24).to_le_bytes());
        data[settings + 8..settings + 12].copy_from_slice(&(ram + 0x40).to_le_bytes());

        (data, ram)
    }

    #[test]
    fn parses_sections_from_settings_pointer() {
        let (data, ram) = sample_code();
        // Header-held pointer: the settings pointer lives at ram + 0x10, so
        // the header stores ram + 0x14.
        let mut data = data;
        data[0x10..0x14].copy_from_slice(&(ram + 0x20).to_le_bytes());
        let code = MainCode::parse(&data, ram, Some(ram + 0x14)).unwrap();

        assert_eq!(code.code_settings_offset, Some(0x20));
        assert_eq!(code.sections.len(), 3);
        assert!(code.sections[0].implicit);
        assert_eq!(code.sections[0].data.len(), 0x40);
        assert_eq!(code.sections[1].data, (0..16).collect::<Vec<u8>>());
        assert_eq!(code.sections[1].ram_address, 0x0280_0000);
        assert_eq!(code.sections[1].bss_size, 4);
        assert_eq!(code.sections[2].data, vec![0xAB; 8]);
    }

    #[test]
    fn save_round_trips_sections() {
        let (mut data, ram) = sample_code();
        data[0x10..0x14].copy_from_slice(&(ram + 0x20).to_le_bytes());
        let code = MainCode::parse(&data, ram, Some(ram + 0x14)).unwrap();
        let saved = code.save(false).unwrap();
        let reparsed = MainCode::parse(&saved, ram, Some(ram + 0x14)).unwrap();
        assert_eq!(reparsed.sections, code.sections);
    }

    #[test]
    fn compressed_save_round_trips() {
        let (mut data, ram) = sample_code();
        data[0x10..0x14].copy_from_slice(&(ram + 0x20).to_le_bytes());
        let code = MainCode::parse(&data, ram, Some(ram + 0x14)).unwrap();
        let saved = code.save(true).unwrap();
        let reparsed = MainCode::parse(&saved, ram, Some(ram + 0x14)).unwrap();
        assert_eq!(reparsed.sections[1..], code.sections[1..]);
    }

    #[test]
    fn whole_file_is_implicit_without_settings() {
        let data = vec![0x11u8; 0x30];
        let code = MainCode::parse(&data, 0x0238_0000, None).unwrap();
        assert_eq!(code.sections.len(), 1);
        assert!(code.sections[0].implicit);
        assert_eq!(code.sections[0].data, data);
    }

    #[test]
    fn overlay_table_round_trips() {
        let files = vec![vec![1u8, 2, 3, 4], vec![5u8, 6, 7, 8]];
        let mut table = BTreeMap::new();
        for (i, file) in files.iter().enumerate() {
            let mut ov = Overlay {
                data: file.clone(),
                ram_address: 0x0210_0000 + i as u32 * 0x1000,
                ram_size: 0,
                bss_size: 0x20,
                static_init_start: 0,
                static_init_end: 0,
                file_id: i as u32,
                compressed_size: 0,
                flags: 0,
            };
            ov.save(false);
            table.insert(i as u32, ov);
        }

        let table_data = save_overlay_table(&table);
        assert_eq!(table_data.len(), 64);

        let loaded = load_overlay_table(
            &table_data,
            |_, file_id| Ok(files[file_id as usize].clone()),
            None,
        )
        .unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[&0].data, files[0]);
        assert_eq!(loaded[&1].bss_size, 0x20);
        assert!(!loaded[&1].compressed());
    }

    #[test]
    fn compressed_overlay_round_trips() {
        let payload: Vec<u8> = (0..256u32).map(|i| (i % 16) as u8).collect();
        let mut ov = Overlay {
            data: payload.clone(),
            ram_address: 0x0210_0000,
            ram_size: 0,
            bss_size: 0,
            static_init_start: 0,
            static_init_end: 0,
            file_id: 0,
            compressed_size: 0,
            flags: 0,
        };
        let file = ov.save(true);
        assert!(ov.compressed());

        let mut table = BTreeMap::new();
        table.insert(7u32, ov);
        let table_data = save_overlay_table(&table);
        let loaded =
            load_overlay_table(&table_data, |_, _| Ok(file.clone()), None).unwrap();
        assert_eq!(loaded[&7].data, payload);
    }
}
