//! NDS ROM (.nds) reading and rebuilding

mod reader;
mod writer;

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::formats::code::{self, MainCode, Overlay};
use crate::formats::fnt::Folder;

/// Icon/banner blob length by version field.
pub(crate) const ICON_BANNER_LENGTHS: [(u16, usize); 4] = [
    (0x0001, 0x840),
    (0x0002, 0x940),
    (0x0003, 0x1240),
    (0x0103, 0x23C0),
];

pub(crate) fn icon_banner_length(version: u16) -> usize {
    ICON_BANNER_LENGTHS
        .iter()
        .find(|(v, _)| *v == version)
        .map_or(ICON_BANNER_LENGTHS[0].1, |(_, len)| *len)
}

/// The Nintendo logo bitmap carried at header offset 0xC0. The BIOS rejects
/// carts where this doesn't match, so it is never modified on save.
pub(crate) const NINTENDO_LOGO: [u8; 0x9C] = [
    0x24, 0xFF, 0xAE, 0x51, 0x69, 0x9A, 0xA2, 0x21, 0x3D, 0x84, 0x82, 0x0A, 0x84, 0xE4, 0x09,
    0xAD, 0x11, 0x24, 0x8B, 0x98, 0xC0, 0x81, 0x7F, 0x21, 0xA3, 0x52, 0xBE, 0x19, 0x93, 0x09,
    0xCE, 0x20, 0x10, 0x46, 0x4A, 0x4A, 0xF8, 0x27, 0x31, 0xEC, 0x58, 0xC7, 0xE8, 0x33, 0x82,
    0xE3, 0xCE, 0xBF, 0x85, 0xF4, 0xDF, 0x94, 0xCE, 0x4B, 0x09, 0xC1, 0x94, 0x56, 0x8A, 0xC0,
    0x13, 0x72, 0xA7, 0xFC, 0x9F, 0x84, 0x4D, 0x73, 0xA3, 0xCA, 0x9A, 0x61, 0x58, 0x97, 0xA3,
    0x27, 0xFC, 0x03, 0x98, 0x76, 0x23, 0x1D, 0xC7, 0x61, 0x03, 0x04, 0xAE, 0x56, 0xBF, 0x38,
    0x84, 0x00, 0x40, 0xA7, 0x0E, 0xFD, 0xFF, 0x52, 0xFE, 0x03, 0x6F, 0x95, 0x30, 0xF1, 0x97,
    0xFB, 0xC0, 0x85, 0x60, 0xD6, 0x80, 0x25, 0xA9, 0x63, 0xBE, 0x03, 0x01, 0x4E, 0x38, 0xE2,
    0xF9, 0xA2, 0x34, 0xFF, 0xBB, 0x3E, 0x03, 0x44, 0x78, 0x00, 0x90, 0xCB, 0x88, 0x11, 0x3A,
    0x94, 0x65, 0xC0, 0x7C, 0x63, 0x87, 0xF0, 0x3C, 0xAF, 0xD6, 0x25, 0xE4, 0x8B, 0x38, 0x0A,
    0xAC, 0x72, 0x21, 0xD4, 0xF8, 0x07,
];

/// Options for [`NdsRom::save`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SaveOptions {
    /// Recompute the header's device-capacity field from the final size.
    pub update_device_capacity: bool,
}

/// A Nintendo DS ROM file (.nds).
#[derive(Debug, Clone)]
pub struct NdsRom {
    /// Internal title (up to 12 bytes, trailing NULs stripped).
    pub title: Vec<u8>,
    /// Four-byte game ID code.
    pub id_code: [u8; 4],
    pub developer_code: [u8; 2],
    pub unit_code: u8,
    pub encryption_seed_select: u8,
    /// log2(size / 0x20000) of the cartridge chip.
    pub device_capacity: u8,
    pub pad_015: [u8; 8],
    pub region: u8,
    pub version: u8,
    pub autostart: u8,
    pub arm9_entry_address: u32,
    pub arm9_ram_address: u32,
    pub arm7_entry_address: u32,
    pub arm7_ram_address: u32,
    pub normal_card_control_settings: u32,
    pub secure_card_control_settings: u32,
    pub secure_area_checksum: u16,
    pub secure_transfer_delay: u16,
    pub arm9_code_settings_pointer_address: u32,
    pub arm7_code_settings_pointer_address: u32,
    pub secure_area_disable: [u8; 8],
    pub pad_088: Vec<u8>,
    pub nintendo_logo: Vec<u8>,
    pub debug_rom_address: u32,
    pub pad_16c: Vec<u8>,
    /// Raw bytes between the 0x200 header and the ARM9 bank.
    pub pad_200: Vec<u8>,

    pub rsa_signature: Vec<u8>,

    pub arm9: Vec<u8>,
    /// The `0xDEC00621`-tagged trailer immediately after the ARM9 bank.
    pub arm9_post_data: Vec<u8>,
    pub arm7: Vec<u8>,
    pub arm9_overlay_table: Vec<u8>,
    pub arm7_overlay_table: Vec<u8>,
    pub icon_banner: Vec<u8>,
    pub debug_rom: Vec<u8>,

    /// Filename table root.
    pub filenames: Folder,
    /// File data, indexed by file ID.
    pub files: Vec<Vec<u8>>,
    /// Pack order of files (by original offset); files missing from this
    /// list are packed afterwards in ascending ID order.
    pub sorted_file_ids: Vec<u32>,
}

impl Default for NdsRom {
    fn default() -> Self {
        Self::new()
    }
}

impl NdsRom {
    /// Create an empty ROM with sensible header defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            title: Vec::new(),
            id_code: *b"####",
            developer_code: [0, 0],
            unit_code: 0,
            encryption_seed_select: 0,
            device_capacity: 9,
            pad_015: [0; 8],
            region: 0,
            version: 0,
            autostart: 0,
            arm9_entry_address: 0x200_0800,
            arm9_ram_address: 0x200_0000,
            arm7_entry_address: 0x238_0000,
            arm7_ram_address: 0x238_0000,
            normal_card_control_settings: 0x0041_6657,
            secure_card_control_settings: 0x0818_08F8,
            secure_area_checksum: 0x0000,
            secure_transfer_delay: 0x0D7E,
            arm9_code_settings_pointer_address: 0,
            arm7_code_settings_pointer_address: 0,
            secure_area_disable: [0; 8],
            pad_088: vec![0; 0x38],
            nintendo_logo: NINTENDO_LOGO.to_vec(),
            debug_rom_address: 0,
            pad_16c: vec![0; 0x94],
            pad_200: vec![0; 0x3E00],
            rsa_signature: Vec::new(),
            arm9: Vec::new(),
            arm9_post_data: Vec::new(),
            arm7: Vec::new(),
            arm9_overlay_table: Vec::new(),
            arm7_overlay_table: Vec::new(),
            icon_banner: Vec::new(),
            debug_rom: Vec::new(),
            filenames: Folder::new(),
            files: Vec::new(),
            sorted_file_ids: Vec::new(),
        }
    }

    /// Load a ROM from a filesystem file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Self::from_bytes(&std::fs::read(path)?)
    }

    /// Generate file data representing this ROM, and save it to a
    /// filesystem file.
    ///
    /// # Errors
    /// Returns an error if serialization or writing fails.
    pub fn save_to_file(
        &mut self,
        path: impl AsRef<std::path::Path>,
        options: SaveOptions,
    ) -> Result<()> {
        let data = self.save(options)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Parse the main ARM9 code file.
    ///
    /// # Errors
    /// Returns an error if decompression fails.
    pub fn load_arm9(&self) -> Result<MainCode> {
        MainCode::parse(
            &self.arm9,
            self.arm9_ram_address,
            Some(self.arm9_code_settings_pointer_address),
        )
    }

    /// Parse the main ARM7 code file.
    ///
    /// # Errors
    /// Returns an error if decompression fails.
    pub fn load_arm7(&self) -> Result<MainCode> {
        MainCode::parse(
            &self.arm7,
            self.arm7_ram_address,
            Some(self.arm7_code_settings_pointer_address),
        )
    }

    /// Parse the ARM9 overlay table into overlays keyed by overlay ID.
    ///
    /// # Errors
    /// Returns an error if a record references a missing file or an overlay
    /// fails to decompress.
    pub fn load_arm9_overlays(&self, ids: Option<&[u32]>) -> Result<BTreeMap<u32, Overlay>> {
        code::load_overlay_table(&self.arm9_overlay_table, |_, file_id| self.file(file_id), ids)
    }

    /// Parse the ARM7 overlay table into overlays keyed by overlay ID.
    ///
    /// # Errors
    /// Returns an error if a record references a missing file or an overlay
    /// fails to decompress.
    pub fn load_arm7_overlays(&self, ids: Option<&[u32]>) -> Result<BTreeMap<u32, Overlay>> {
        code::load_overlay_table(&self.arm7_overlay_table, |_, file_id| self.file(file_id), ids)
    }

    fn file(&self, file_id: u32) -> Result<Vec<u8>> {
        self.files
            .get(file_id as usize)
            .cloned()
            .ok_or_else(|| Error::MalformedRom(format!("file ID {file_id} is out of range")))
    }

    /// Return the data for the file with the given filename (path).
    ///
    /// # Errors
    /// Returns [`Error::PreconditionFailed`] if the name is unknown.
    pub fn file_by_name(&self, filename: &str) -> Result<&[u8]> {
        let id = self
            .filenames
            .id_of(filename)
            .ok_or_else(|| Error::PreconditionFailed(format!("no file named \"{filename}\"")))?;
        Ok(&self.files[usize::from(id)])
    }

    /// Replace the data for the file with the given filename (path).
    ///
    /// # Errors
    /// Returns [`Error::PreconditionFailed`] if the name is unknown.
    pub fn set_file_by_name(&mut self, filename: &str, data: Vec<u8>) -> Result<()> {
        let id = self
            .filenames
            .id_of(filename)
            .ok_or_else(|| Error::PreconditionFailed(format!("no file named \"{filename}\"")))?;
        self.files[usize::from(id)] = data;
        Ok(())
    }
}
