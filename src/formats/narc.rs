//! NARC nested archives
//!
//! A NARC is a miniature ROM filesystem: a BTAF file-allocation block, a
//! BTNF filename table (same layout as the ROM's FNT), and a GMIF block of
//! concatenated file data. Most games store the first 8 header bytes
//! big-endian; that quirk is preserved on round-trip.

use crate::bytes::{ByteCursor, ByteWriter};
use crate::error::{Error, Result};
use crate::formats::common::{std_header, StdHeader};
use crate::formats::fnt::{self, Folder};

/// A NARC archive file.
#[derive(Debug, Clone, Default)]
pub struct Narc {
    /// Filename table; may be an empty root for nameless archives.
    pub filenames: Folder,
    /// File data, indexed by file ID.
    pub files: Vec<Vec<u8>>,
    /// Whether the magic/BOM prologue is stored big-endian.
    pub big_endian_prologue: bool,
}

impl Narc {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a NARC from file data.
    ///
    /// # Errors
    /// Returns an error on magic/version mismatches or truncated blocks.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let header = StdHeader::read(data, "NARC")?;
        if header.version != 1 {
            return Err(Error::UnknownVersion {
                format: "NARC",
                version: u32::from(header.version),
            });
        }

        let mut cursor = ByteCursor::le(data);
        cursor.seek(0x10)?;

        // Block magics are stored reversed ("BTAF" etc.).
        let fatb_magic = cursor.read_array::<4>()?;
        if fatb_magic != *b"BTAF" {
            return Err(Error::InvalidMagic {
                expected: "BTAF",
                found: fatb_magic.to_vec(),
            });
        }
        let fatb_size = cursor.read_u32()? as usize;
        let file_count = cursor.read_u32()? as usize;

        let fntb_offset = 0x10 + fatb_size;
        cursor.seek(fntb_offset)?;
        let fntb_magic = cursor.read_array::<4>()?;
        if fntb_magic != *b"BTNF" {
            return Err(Error::InvalidMagic {
                expected: "BTNF",
                found: fntb_magic.to_vec(),
            });
        }
        let fntb_size = cursor.read_u32()? as usize;

        let fimg_offset = fntb_offset + fntb_size;
        cursor.seek(fimg_offset)?;
        let fimg_magic = cursor.read_array::<4>()?;
        if fimg_magic != *b"GMIF" {
            return Err(Error::InvalidMagic {
                expected: "GMIF",
                found: fimg_magic.to_vec(),
            });
        }
        let _fimg_size = cursor.read_u32()?;
        let raw_data_offset = fimg_offset + 8;

        let mut files = Vec::with_capacity(file_count);
        let mut fat = ByteCursor::le(data);
        fat.seek(0x1C)?;
        for _ in 0..file_count {
            let start = fat.read_u32()? as usize;
            let end = fat.read_u32()? as usize;
            let lo = raw_data_offset + start;
            let hi = raw_data_offset + end;
            if lo > hi || hi > data.len() {
                return Err(Error::OutOfBounds {
                    offset: lo,
                    needed: hi.saturating_sub(lo),
                    len: data.len(),
                });
            }
            files.push(data[lo..hi].to_vec());
        }

        let fnt_end = fntb_offset + fntb_size;
        if fnt_end > data.len() || fntb_size < 8 {
            return Err(Error::OutOfBounds {
                offset: fntb_offset,
                needed: fntb_size,
                len: data.len(),
            });
        }
        let filenames = fnt::load(&data[fntb_offset + 8..fnt_end])?;

        Ok(Self {
            filenames,
            files,
            big_endian_prologue: header.big_endian_prologue(),
        })
    }

    /// Load a NARC from a filesystem file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Self::from_bytes(&std::fs::read(path)?)
    }

    /// Create a NARC from a list of files and (optionally) a filename table.
    #[must_use]
    pub fn from_files_and_names(files: Vec<Vec<u8>>, filenames: Option<Folder>) -> Self {
        Self {
            filenames: filenames.unwrap_or_default(),
            files,
            big_endian_prologue: false,
        }
    }

    /// Generate file data representing this NARC.
    ///
    /// # Errors
    /// Returns an error if the filename table cannot be serialized.
    #[allow(clippy::cast_possible_truncation)]
    pub fn save(&self) -> Result<Vec<u8>> {
        // File data block plus the allocation table it implies.
        let mut fimg = ByteWriter::new();
        fimg.reserve(8);

        let mut fatb = ByteWriter::new();
        fatb.write_bytes(b"BTAF");
        fatb.write_u32(0x0C + 8 * self.files.len() as u32);
        fatb.write_u32(self.files.len() as u32);

        for file in &self.files {
            let start = fimg.tell() - 8;
            fimg.write_bytes(file);
            fatb.write_u32(start as u32);
            fatb.write_u32((start + file.len()) as u32);
            fimg.align(4, 0);
        }

        let mut fimg = fimg.into_inner();
        let fimg_len = fimg.len() as u32;
        fimg[0..4].copy_from_slice(b"GMIF");
        fimg[4..8].copy_from_slice(&fimg_len.to_le_bytes());

        // Filename table block, padded with 0xFF like retail archives.
        let mut name_table = fnt::save(&self.filenames)?;
        while name_table.len() % 4 != 0 {
            name_table.push(0xFF);
        }

        let mut writer = ByteWriter::new();
        writer.reserve(StdHeader::LEN);
        writer.write_bytes(fatb.as_slice());
        writer.write_bytes(b"BTNF");
        writer.write_u32(name_table.len() as u32 + 8);
        writer.write_bytes(&name_table);
        writer.write_bytes(&fimg);

        let mut header = std_header(*b"NARC", writer.tell() as u32, 3);
        header.version = 1;
        if self.big_endian_prologue {
            header.bom = 0xFFFE;
        }
        header.write_at(&mut writer, 0);

        Ok(writer.into_inner())
    }

    /// Generate file data representing this NARC, and save it to a
    /// filesystem file.
    ///
    /// # Errors
    /// Returns an error if serialization or writing fails.
    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        std::fs::write(path, self.save()?)?;
        Ok(())
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

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_narc() -> Narc {
        let filenames = Folder {
            folders: vec![(
                "maps".into(),
                Folder {
                    folders: vec![],
                    files: vec!["w1.bin".into()],
                    first_id: 1,
                },
            )],
            files: vec!["header.bin".into()],
            first_id: 0,
        };
        Narc::from_files_and_names(
            vec![vec![1, 2, 3, 4, 5], vec![0xAA; 9]],
            Some(filenames),
        )
    }

    #[test]
    fn round_trip_preserves_files_and_names() {
        let narc = sample_narc();
        let data = narc.save().unwrap();
        let loaded = Narc::from_bytes(&data).unwrap();
        assert_eq!(loaded.files, narc.files);
        assert_eq!(loaded.filenames, narc.filenames);
        assert!(!loaded.big_endian_prologue);
    }

    #[test]
    fn big_endian_prologue_round_trips() {
        let mut narc = sample_narc();
        narc.big_endian_prologue = true;
        let data = narc.save().unwrap();
        assert_eq!(&data[4..6], &[0xFE, 0xFF]);
        let loaded = Narc::from_bytes(&data).unwrap();
        assert!(loaded.big_endian_prologue);
    }

    #[test]
    fn file_access_by_name() {
        let mut narc = sample_narc();
        assert_eq!(narc.file_by_name("maps/w1.bin").unwrap(), &[0xAA; 9]);
        narc.set_file_by_name("header.bin", vec![9]).unwrap();
        assert_eq!(narc.files[0], vec![9]);
        assert!(narc.file_by_name("nope").is_err());
    }
}
