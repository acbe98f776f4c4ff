//! Sound groups: preload lists inside an SDAT

use crate::error::{Error, Result};

/// The kind of asset a group entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GroupEntryKind {
    Sseq = 0,
    Sbnk = 1,
    Swar = 2,
    Ssar = 3,
}

impl GroupEntryKind {
    fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Sseq),
            1 => Ok(Self::Sbnk),
            2 => Ok(Self::Swar),
            3 => Ok(Self::Ssar),
            _ => Err(Error::MalformedSdat(format!(
                "unknown group entry type {value}"
            ))),
        }
    }
}

/// How a bank's wave-archive slots are interpreted when loaded via a group.
///
/// `FileIds` has never been observed in retail data; it is carried as
/// documented without further interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SwarLoadMethod {
    FileIds,
    #[default]
    SwarIds,
}

/// An entry in a sound group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupEntry {
    pub kind: GroupEntryKind,
    /// Ordinal into the SDAT's list of `kind` assets.
    pub id: u32,
    pub load_sseq: bool,
    pub load_sbnk_swars_from: SwarLoadMethod,
    pub load_swar: bool,
    pub load_ssar: bool,
}

impl GroupEntry {
    /// Build an entry from its wire representation.
    ///
    /// # Errors
    /// Returns an error for an unknown entry type.
    pub fn from_wire(kind: u8, options: u16, id: u32) -> Result<Self> {
        Ok(Self {
            kind: GroupEntryKind::from_u8(kind)?,
            id,
            load_sseq: options & 1 != 0,
            load_sbnk_swars_from: if options & 2 != 0 {
                SwarLoadMethod::SwarIds
            } else {
                SwarLoadMethod::FileIds
            },
            load_swar: options & 4 != 0,
            load_ssar: options & 8 != 0,
        })
    }

    /// The 4-bit load-options field.
    #[must_use]
    pub fn options(&self) -> u16 {
        let mut options = 0;
        if self.load_sseq {
            options |= 1;
        }
        if self.load_sbnk_swars_from == SwarLoadMethod::SwarIds {
            options |= 2;
        }
        if self.load_swar {
            options |= 4;
        }
        if self.load_ssar {
            options |= 8;
        }
        options
    }
}

/// A sound group: an ordered list of entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Group {
    pub entries: Vec<GroupEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_round_trip() {
        for options in 0..16u16 {
            let entry = GroupEntry::from_wire(0, options, 5).unwrap();
            assert_eq!(entry.options(), options);
        }
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert!(GroupEntry::from_wire(9, 0, 0).is_err());
    }
}
