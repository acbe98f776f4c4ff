//! Shared pieces of the Nintendo file container convention

use crate::bytes::{ByteCursor, ByteWriter, Endianness};
use crate::error::{Error, Result};

/// The 16-byte standard header most DS container files begin with.
///
/// The magic and BOM may be stored big-endian (NARC does this in most
/// games); the rest of the file stays little-endian regardless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StdHeader {
    pub magic: [u8; 4],
    pub bom: u16,
    pub version: u16,
    pub file_size: u32,
    pub header_size: u16,
    pub block_count: u16,
}

impl StdHeader {
    pub const LEN: usize = 0x10;

    /// Read a standard header, validating the magic.
    ///
    /// # Errors
    /// Returns [`Error::InvalidMagic`] on a magic mismatch and
    /// [`Error::OutOfBounds`] on truncation.
    pub fn read(data: &[u8], expected_magic: &'static str) -> Result<Self> {
        let mut cursor = ByteCursor::le(data);
        let magic = cursor.read_array::<4>()?;
        if magic != expected_magic.as_bytes() {
            return Err(Error::InvalidMagic {
                expected: expected_magic,
                found: magic.to_vec(),
            });
        }
        let bom = cursor.read_u16()?;
        let mut version = cursor.read_u16()?;
        // A byte-swapped BOM means the first 8 bytes are big-endian.
        if bom == 0xFFFE {
            version = version.rotate_left(8);
        }
        Ok(Self {
            magic,
            bom,
            version,
            file_size: cursor.read_u32()?,
            header_size: cursor.read_u16()?,
            block_count: cursor.read_u16()?,
        })
    }

    /// Write a standard header at the start of `writer`'s buffer.
    pub fn write_at(self, writer: &mut ByteWriter, offset: usize) {
        let mut version = self.version;
        if self.bom == 0xFFFE {
            version = version.rotate_left(8);
        }
        writer.patch_bytes_at(offset, &self.magic);
        writer.patch_u16_at(offset + 4, self.bom);
        writer.patch_u16_at(offset + 6, version);
        writer.patch_u32_at(offset + 8, self.file_size);
        writer.patch_u16_at(offset + 12, self.header_size);
        writer.patch_u16_at(offset + 14, self.block_count);
    }

    /// Whether the first 8 bytes use big-endian byte order.
    #[must_use]
    pub fn big_endian_prologue(&self) -> bool {
        self.bom == 0xFFFE
    }

    /// The cursor endianness implied by the BOM, for formats (like BMG)
    /// whose whole body follows the container byte order.
    #[must_use]
    pub fn endianness(&self) -> Endianness {
        if self.big_endian_prologue() {
            Endianness::Big
        } else {
            Endianness::Little
        }
    }
}

/// Build the common little-endian header with BOM 0xFEFF.
#[must_use]
pub fn std_header(magic: [u8; 4], file_size: u32, block_count: u16) -> StdHeader {
    StdHeader {
        magic,
        bom: 0xFEFF,
        version: 0x100,
        file_size,
        header_size: 0x10,
        block_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let header = std_header(*b"SDAT", 0x1234, 4);
        let mut writer = ByteWriter::new();
        writer.reserve(StdHeader::LEN);
        header.write_at(&mut writer, 0);
        assert_eq!(StdHeader::read(writer.as_slice(), "SDAT").unwrap(), header);
    }

    #[test]
    fn big_endian_prologue_swaps_version() {
        let header = StdHeader {
            magic: *b"NARC",
            bom: 0xFFFE,
            version: 1,
            file_size: 0x40,
            header_size: 0x10,
            block_count: 3,
        };
        let mut writer = ByteWriter::new();
        writer.reserve(StdHeader::LEN);
        header.write_at(&mut writer, 0);
        // On the wire the version appears as 0x0100.
        assert_eq!(&writer.as_slice()[6..8], &[0x00, 0x01]);
        let parsed = StdHeader::read(writer.as_slice(), "NARC").unwrap();
        assert_eq!(parsed.version, 1);
        assert!(parsed.big_endian_prologue());
    }

    #[test]
    fn rejects_magic_mismatch() {
        let data = [0u8; 16];
        assert!(matches!(
            StdHeader::read(&data, "SDAT"),
            Err(Error::InvalidMagic { .. })
        ));
    }
}
