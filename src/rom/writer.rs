//! ROM layout and serialization

use std::collections::HashMap;

use byteorder::{ByteOrder, LittleEndian};
use tracing::debug;

use crate::bytes::ByteWriter;
use crate::error::{Error, Result};
use crate::formats::fnt;
use crate::rom::{icon_banner_length, NdsRom, SaveOptions};
use crate::utils::crc16;

impl NdsRom {
    /// Generate file data representing this ROM.
    ///
    /// The layout pass places every bank and file, then the header is filled
    /// in with the discovered offsets and freshly computed checksums.
    ///
    /// # Errors
    /// Returns an error if an overlay record references a missing file or a
    /// fixed-size header blob has the wrong length.
    #[allow(clippy::cast_possible_truncation, clippy::too_many_lines)]
    pub fn save(&mut self, options: SaveOptions) -> Result<Vec<u8>> {
        if self.pad_088.len() != 0x38 {
            return Err(Error::PreconditionFailed(format!(
                "pad_088 must be 0x38 bytes (found {:#x})",
                self.pad_088.len()
            )));
        }
        if self.nintendo_logo.len() != 0x9C {
            return Err(Error::PreconditionFailed(format!(
                "nintendo_logo must be 0x9C bytes (found {:#x})",
                self.nintendo_logo.len()
            )));
        }
        if self.pad_16c.len() != 0x94 {
            return Err(Error::PreconditionFailed(format!(
                "pad_16c must be 0x94 bytes (found {:#x})",
                self.pad_16c.len()
            )));
        }

        let mut file_offsets: HashMap<u32, usize> = HashMap::new();
        let mut writer = ByteWriter::new();

        // The header is filled in at the end.
        writer.reserve(0x200);
        writer.write_bytes(&self.pad_200);
        writer.align(0x4000, 0);

        let arm9_offset = writer.tell();
        writer.write_bytes(&self.arm9);
        writer.write_bytes(&self.arm9_post_data);
        writer.align(0x200, 0xFF);

        let arm9_ovt_offset = if self.arm9_overlay_table.is_empty() {
            0
        } else {
            let offset = writer.tell();
            writer.write_bytes(&self.arm9_overlay_table);
            writer.align(0x200, 0xFF);
            offset
        };
        self.pack_overlay_files(&self.arm9_overlay_table, &mut writer, &mut file_offsets)?;

        let arm7_offset = writer.tell();
        writer.write_bytes(&self.arm7);
        writer.align(0x200, 0xFF);

        let arm7_ovt_offset = if self.arm7_overlay_table.is_empty() {
            0
        } else {
            let offset = writer.tell();
            writer.write_bytes(&self.arm7_overlay_table);
            writer.align(0x200, 0xFF);
            offset
        };
        self.pack_overlay_files(&self.arm7_overlay_table, &mut writer, &mut file_offsets)?;

        let fnt_offset = writer.tell();
        let fnt_data = fnt::save(&self.filenames)?;
        writer.write_bytes(&fnt_data);
        writer.align(0x200, 0xFF);

        // The FAT is backpatched after files are placed.
        let fat_offset = writer.tell();
        writer.reserve(8 * self.files.len());
        writer.align(0x200, 0xFF);

        let icon_banner_offset = if self.icon_banner.is_empty() {
            0
        } else {
            if self.icon_banner.len() < 2 {
                return Err(Error::PreconditionFailed(
                    "icon banner is too short to hold its version field".into(),
                ));
            }
            let version = LittleEndian::read_u16(&self.icon_banner[0..2]);
            let expected = icon_banner_length(version);
            if self.icon_banner.len() != expected {
                return Err(Error::PreconditionFailed(format!(
                    "icon banner version {version:#x} implies length {expected:#x}, found {:#x}",
                    self.icon_banner.len()
                )));
            }
            let offset = writer.tell();
            writer.write_bytes(&self.icon_banner);
            writer.align(0x200, 0xFF);
            offset
        };

        let debug_rom_offset = if self.debug_rom.is_empty() {
            0
        } else {
            let offset = writer.tell();
            writer.write_bytes(&self.debug_rom);
            writer.align(0x200, 0xFF);
            offset
        };

        // Remaining files: preserved pack order first, stragglers after.
        // Aligning before each file instead of after leaves no pad past the
        // last one.
        let file_order: Vec<u32> = self
            .sorted_file_ids
            .iter()
            .copied()
            .filter(|id| !file_offsets.contains_key(id) && (*id as usize) < self.files.len())
            .chain(
                (0..self.files.len() as u32).filter(|id| !file_offsets.contains_key(id)),
            )
            .collect();
        let mut placed: std::collections::HashSet<u32> = file_offsets.keys().copied().collect();
        for file_id in file_order {
            if !placed.insert(file_id) {
                continue;
            }
            writer.align(0x200, 0xFF);
            file_offsets.insert(file_id, writer.tell());
            writer.write_bytes(&self.files[file_id as usize]);
        }

        // Backpatch the FAT now that every file has a place.
        for (i, file) in self.files.iter().enumerate() {
            let start = *file_offsets
                .get(&(i as u32))
                .ok_or_else(|| Error::MalformedRom(format!("file {i} was never placed")))?;
            writer.patch_u32_at(fat_offset + 8 * i, start as u32);
            writer.patch_u32_at(fat_offset + 8 * i + 4, (start + file.len()) as u32);
        }

        writer.align(0x20, 0);
        let rsa_offset = writer.tell();
        writer.write_bytes(&self.rsa_signature);

        // NSMBe compatibility: mirror the signature offset at 0x1000.
        writer.patch_u32_at(0x1000, rsa_offset as u32);

        if options.update_device_capacity {
            let total = writer.tell().max(1) as u64;
            let log2 = 64 - (total - 1).leading_zeros().min(63);
            self.device_capacity = (u32::from(log2).saturating_sub(17)) as u8;
        }

        // Header proper.
        let mut title = self.title.clone();
        title.resize(12, 0);
        writer.patch_bytes_at(0x000, &title[..12]);
        writer.patch_bytes_at(0x00C, &self.id_code);
        writer.patch_bytes_at(0x010, &self.developer_code);
        writer.patch_bytes_at(
            0x012,
            &[self.unit_code, self.encryption_seed_select, self.device_capacity],
        );
        writer.patch_bytes_at(0x015, &self.pad_015);
        writer.patch_bytes_at(0x01D, &[self.region, self.version, self.autostart]);
        writer.patch_u32_at(0x020, arm9_offset as u32);
        writer.patch_u32_at(0x024, self.arm9_entry_address);
        writer.patch_u32_at(0x028, self.arm9_ram_address);
        writer.patch_u32_at(0x02C, self.arm9.len() as u32);
        writer.patch_u32_at(0x030, arm7_offset as u32);
        writer.patch_u32_at(0x034, self.arm7_entry_address);
        writer.patch_u32_at(0x038, self.arm7_ram_address);
        writer.patch_u32_at(0x03C, self.arm7.len() as u32);
        writer.patch_u32_at(0x040, fnt_offset as u32);
        writer.patch_u32_at(0x044, fnt_data.len() as u32);
        writer.patch_u32_at(0x048, fat_offset as u32);
        writer.patch_u32_at(0x04C, (self.files.len() * 8) as u32);
        writer.patch_u32_at(0x050, arm9_ovt_offset as u32);
        writer.patch_u32_at(0x054, self.arm9_overlay_table.len() as u32);
        writer.patch_u32_at(0x058, arm7_ovt_offset as u32);
        writer.patch_u32_at(0x05C, self.arm7_overlay_table.len() as u32);
        writer.patch_u32_at(0x060, self.normal_card_control_settings);
        writer.patch_u32_at(0x064, self.secure_card_control_settings);
        writer.patch_u32_at(0x068, icon_banner_offset as u32);
        writer.patch_u16_at(0x06C, self.secure_area_checksum);
        writer.patch_u16_at(0x06E, self.secure_transfer_delay);
        writer.patch_u32_at(0x070, self.arm9_code_settings_pointer_address);
        writer.patch_u32_at(0x074, self.arm7_code_settings_pointer_address);
        writer.patch_bytes_at(0x078, &self.secure_area_disable);
        writer.patch_u32_at(0x080, rsa_offset as u32);
        writer.patch_u32_at(0x084, 0x4000);
        writer.patch_bytes_at(0x088, &self.pad_088);
        writer.patch_bytes_at(0x0C0, &self.nintendo_logo);
        writer.patch_u16_at(0x15C, crc16(&self.nintendo_logo));
        let header_crc = crc16(&writer.as_slice()[0..0x15E]);
        writer.patch_u16_at(0x15E, header_crc);
        writer.patch_u32_at(0x160, debug_rom_offset as u32);
        writer.patch_u32_at(0x164, self.debug_rom.len() as u32);
        writer.patch_u32_at(0x168, self.debug_rom_address);
        writer.patch_bytes_at(0x16C, &self.pad_16c);

        debug!(size = writer.tell(), "serialized ROM");

        Ok(writer.into_inner())
    }

    fn pack_overlay_files(
        &self,
        table: &[u8],
        writer: &mut ByteWriter,
        file_offsets: &mut HashMap<u32, usize>,
    ) -> Result<()> {
        for record in table.chunks_exact(32) {
            let file_id = LittleEndian::read_u32(&record[0x18..0x1C]);
            let file = self
                .files
                .get(file_id as usize)
                .ok_or_else(|| Error::MalformedRom(format!("overlay file ID {file_id} is out of range")))?;
            file_offsets.insert(file_id, writer.tell());
            writer.write_bytes(file);
            writer.align(0x200, 0xFF);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::fnt::Folder;

    fn sample_rom() -> NdsRom {
        let mut rom = NdsRom::new();
        rom.title = b"NEW MARIO".to_vec();
        rom.id_code = *b"A2DE";
        rom.arm9 = vec![0xE5; 0x100];
        rom.arm7 = vec![0xE7; 0x80];
        rom.files = vec![vec![1, 2, 3], vec![4, 5, 6, 7], vec![8]];
        rom.filenames = Folder {
            folders: vec![],
            files: vec!["a.bin".into(), "b.bin".into(), "c.bin".into()],
            first_id: 0,
        };
        rom
    }

    #[test]
    fn header_begins_with_title_and_id_code() {
        let mut rom = sample_rom();
        let data = rom.save(SaveOptions::default()).unwrap();
        assert_eq!(
            &data[..16],
            &[
                0x4E, 0x45, 0x57, 0x20, 0x4D, 0x41, 0x52, 0x49, 0x4F, 0x00, 0x00, 0x00, 0x41,
                0x32, 0x44, 0x45
            ]
        );
    }

    #[test]
    fn header_crc_matches_contents() {
        let mut rom = sample_rom();
        let data = rom.save(SaveOptions::default()).unwrap();
        let stored = u16::from_le_bytes([data[0x15E], data[0x15F]]);
        assert_eq!(stored, crc16(&data[..0x15E]));
    }

    #[test]
    fn round_trip_preserves_contents() {
        let mut rom = sample_rom();
        rom.sorted_file_ids = vec![2, 0, 1];
        let data = rom.save(SaveOptions::default()).unwrap();
        let loaded = NdsRom::from_bytes(&data).unwrap();

        assert_eq!(loaded.title, rom.title);
        assert_eq!(loaded.id_code, rom.id_code);
        assert_eq!(loaded.arm9, rom.arm9);
        assert_eq!(loaded.arm7, rom.arm7);
        assert_eq!(loaded.files, rom.files);
        assert_eq!(loaded.filenames, rom.filenames);
        assert_eq!(loaded.sorted_file_ids, vec![2, 0, 1]);
    }

    #[test]
    fn resave_is_stable() {
        let mut rom = sample_rom();
        let first = rom.save(SaveOptions::default()).unwrap();
        let mut reloaded = NdsRom::from_bytes(&first).unwrap();
        let second = reloaded.save(SaveOptions::default()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn device_capacity_updates_from_size() {
        let mut rom = sample_rom();
        rom.save(SaveOptions {
            update_device_capacity: true,
        })
        .unwrap();
        // The whole image is well under 0x20000 bytes.
        assert_eq!(rom.device_capacity, 0);
    }
}
