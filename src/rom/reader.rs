//! ROM parsing

use byteorder::{ByteOrder, LittleEndian};
use tracing::debug;

use crate::bytes::ByteCursor;
use crate::error::Result;
use crate::formats::fnt;
use crate::rom::{icon_banner_length, NdsRom};

impl NdsRom {
    /// Parse a ROM image.
    ///
    /// Inputs shorter than the 0x200-byte header are zero-extended, so a
    /// bare header is accepted.
    ///
    /// # Errors
    /// Returns an error if a table offset points outside the image.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut rom = NdsRom::new();

        let padded;
        let data = if data.len() < 0x200 {
            padded = {
                let mut d = data.to_vec();
                d.resize(0x200, 0);
                d
            };
            &padded[..]
        } else {
            data
        };

        let mut cursor = ByteCursor::le(data);

        let mut title = cursor.read_bytes(12)?.to_vec();
        while title.last() == Some(&0) {
            title.pop();
        }
        rom.title = title;
        rom.id_code = cursor.read_array::<4>()?;
        rom.developer_code = cursor.read_array::<2>()?;
        rom.unit_code = cursor.read_u8()?;
        rom.encryption_seed_select = cursor.read_u8()?;
        rom.device_capacity = cursor.read_u8()?;
        rom.pad_015 = cursor.read_array::<8>()?;
        rom.region = cursor.read_u8()?;
        rom.version = cursor.read_u8()?;
        rom.autostart = cursor.read_u8()?;

        let arm9_offset = cursor.read_u32()? as usize;
        rom.arm9_entry_address = cursor.read_u32()?;
        rom.arm9_ram_address = cursor.read_u32()?;
        let arm9_len = cursor.read_u32()? as usize;
        let arm7_offset = cursor.read_u32()? as usize;
        rom.arm7_entry_address = cursor.read_u32()?;
        rom.arm7_ram_address = cursor.read_u32()?;
        let arm7_len = cursor.read_u32()? as usize;

        let fnt_offset = cursor.read_u32()? as usize;
        let fnt_len = cursor.read_u32()? as usize;
        let fat_offset = cursor.read_u32()? as usize;
        let fat_len = cursor.read_u32()? as usize;
        let arm9_ovt_offset = cursor.read_u32()? as usize;
        let arm9_ovt_len = cursor.read_u32()? as usize;
        let arm7_ovt_offset = cursor.read_u32()? as usize;
        let arm7_ovt_len = cursor.read_u32()? as usize;

        rom.normal_card_control_settings = cursor.read_u32()?;
        rom.secure_card_control_settings = cursor.read_u32()?;
        let icon_banner_offset = cursor.read_u32()? as usize;
        rom.secure_area_checksum = cursor.read_u16()?;
        rom.secure_transfer_delay = cursor.read_u16()?;
        rom.arm9_code_settings_pointer_address = cursor.read_u32()?;
        rom.arm7_code_settings_pointer_address = cursor.read_u32()?;
        rom.secure_area_disable = cursor.read_array::<8>()?;

        let rom_size_or_rsa_offset = cursor.read_u32()? as usize;
        let _header_size = cursor.read_u32()?;
        rom.pad_088 = cursor.read_bytes(0x38)?.to_vec();
        rom.nintendo_logo = cursor.read_bytes(0x9C)?.to_vec();
        let _logo_checksum = cursor.read_u16()?;
        let _header_checksum = cursor.read_u16()?;
        let debug_rom_offset = cursor.read_u32()? as usize;
        let debug_rom_size = cursor.read_u32()? as usize;
        rom.debug_rom_address = cursor.read_u32()?;
        rom.pad_16c = cursor.read_bytes(0x94)?.to_vec();

        rom.pad_200 = data[0x200..arm9_offset.clamp(0x200, data.len())].to_vec();

        // The RSA signature offset lives at 0x1000 (NSMBe convention) or in
        // the used-ROM-size header field.
        let mut sig_offset = 0usize;
        if data.len() >= 0x1004 {
            sig_offset = LittleEndian::read_u32(&data[0x1000..0x1004]) as usize;
        }
        if sig_offset == 0 && data.len() > rom_size_or_rsa_offset {
            sig_offset = rom_size_or_rsa_offset;
        }
        if sig_offset != 0 && sig_offset < data.len() {
            let end = data.len().min(sig_offset + 0x88);
            rom.rsa_signature = data[sig_offset..end].to_vec();
        }

        let slice = |offset: usize, len: usize| -> Vec<u8> {
            let lo = offset.min(data.len());
            let hi = (offset + len).min(data.len());
            data[lo..hi].to_vec()
        };

        rom.arm9 = slice(arm9_offset, arm9_len);
        rom.arm7 = slice(arm7_offset, arm7_len);
        let fnt_data = slice(fnt_offset, fnt_len);
        let fat = slice(fat_offset, fat_len);
        rom.arm9_overlay_table = slice(arm9_ovt_offset, arm9_ovt_len);
        rom.arm7_overlay_table = slice(arm7_ovt_offset, arm7_ovt_len);

        if icon_banner_offset != 0 && icon_banner_offset + 2 <= data.len() {
            let version = LittleEndian::read_u16(&data[icon_banner_offset..icon_banner_offset + 2]);
            rom.icon_banner = slice(icon_banner_offset, icon_banner_length(version));
        }
        if debug_rom_offset != 0 {
            rom.debug_rom = slice(debug_rom_offset, debug_rom_size);
        }

        // A small tagged blob often follows the ARM9 bank.
        let mut post_data = Vec::new();
        let mut post_offset = arm9_offset + arm9_len;
        while post_offset + 4 <= data.len()
            && data[post_offset..post_offset + 4] == [0x21, 0x06, 0xC0, 0xDE]
        {
            post_data.extend_from_slice(&slice(post_offset, 12));
            post_offset += 12;
        }
        rom.arm9_post_data = post_data;

        if !fnt_data.is_empty() {
            rom.filenames = fnt::load(&fnt_data)?;
        }

        if !fat.is_empty() {
            let mut offsets_to_ids: Vec<(usize, u32)> = Vec::new();
            let mut fat_cursor = ByteCursor::le(&fat);
            for i in 0..fat.len() / 8 {
                let start = fat_cursor.read_u32()? as usize;
                let end = fat_cursor.read_u32()? as usize;
                rom.files.push(slice(start, end.saturating_sub(start)));
                offsets_to_ids.push((start, i as u32));
            }
            offsets_to_ids.sort_unstable();
            rom.sorted_file_ids = offsets_to_ids.into_iter().map(|(_, id)| id).collect();
        }

        debug!(
            files = rom.files.len(),
            arm9 = rom.arm9.len(),
            arm7 = rom.arm7.len(),
            "parsed ROM \"{}\"",
            String::from_utf8_lossy(&rom.title)
        );

        Ok(rom)
    }
}
