//! SDAT sound data archives
//!
//! An SDAT encloses eight kinds of named sub-assets behind three parallel
//! views: a symbol table (SYMB, optional), an info table (INFO), and a file
//! allocation table (FAT) over the FILE block. Rebuilding keeps the three
//! views consistent and stores byte-identical payloads once.

mod reader;
mod writer;

use crate::error::{Error, Result};
use crate::sound::group::Group;
use crate::sound::player::{SequencePlayer, StreamPlayer};
use crate::sound::sbnk::Sbnk;
use crate::sound::sseq::Sseq;
use crate::sound::ssar::Ssar;
use crate::sound::strm::Strm;
use crate::sound::swar::Swar;

/// An entry in one of an SDAT's asset lists: an optional symbol-table name
/// and an optional value (INFO rows may be empty placeholders).
pub type NamedEntry<T> = (Option<String>, Option<T>);

/// A sound data archive file (SDAT).
#[derive(Debug, Clone, Default)]
pub struct Sdat {
    pub sequences: Vec<NamedEntry<Sseq>>,
    pub sequence_archives: Vec<NamedEntry<Ssar>>,
    pub banks: Vec<NamedEntry<Sbnk>>,
    pub wave_archives: Vec<NamedEntry<Swar>>,
    pub sequence_players: Vec<NamedEntry<SequencePlayer>>,
    pub groups: Vec<NamedEntry<Group>>,
    pub stream_players: Vec<NamedEntry<StreamPlayer>>,
    pub streams: Vec<NamedEntry<Strm>>,

    /// Whether FAT size fields include trailing alignment padding.
    pub fat_lengths_include_padding: bool,
    /// Alignment override for the first file only.
    pub first_file_alignment: Option<usize>,
    /// Alignment of files within the FILE block (0x20 in retail data).
    pub file_alignment: usize,
    /// Whether alignment padding follows the final file.
    pub pad_at_end: bool,
    /// Whether the header's SYMB size field includes its tail padding.
    pub pad_symb_size_to_4_in_header: bool,
}

impl Sdat {
    /// Create an empty SDAT with retail layout defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            fat_lengths_include_padding: false,
            first_file_alignment: None,
            file_alignment: 0x20,
            pad_at_end: true,
            pad_symb_size_to_4_in_header: false,
            ..Self::default()
        }
    }

    /// Load an SDAT from a filesystem file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Self::from_bytes(&std::fs::read(path)?)
    }

    /// Generate file data representing this SDAT, and save it to a
    /// filesystem file.
    ///
    /// # Errors
    /// Returns an error if serialization or writing fails.
    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        std::fs::write(path, self.save()?)?;
        Ok(())
    }

    /// Find the value of the entry with a given name in one of the lists.
    pub fn find_named<'a, T>(list: &'a [NamedEntry<T>], name: &str) -> Option<&'a T> {
        list.iter()
            .find(|(n, _)| n.as_deref() == Some(name))
            .and_then(|(_, v)| v.as_ref())
    }

    pub(crate) fn unsupported_version(version: u16) -> Error {
        Error::UnknownVersion {
            format: "SDAT",
            version: u32::from(version),
        }
    }
}
