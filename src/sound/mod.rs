//! SDAT sound data and its nested asset formats

pub mod group;
pub mod player;
pub mod sbnk;
pub mod sdat;
pub mod sequence;
pub mod sseq;
pub mod ssar;
pub mod strm;
pub mod swar;
pub mod swav;

use crate::error::{Error, Result};

// Re-export the asset types for convenience
pub use group::{Group, GroupEntry, GroupEntryKind, SwarLoadMethod};
pub use player::{SequencePlayer, StreamPlayer};
pub use sbnk::Sbnk;
pub use sdat::Sdat;
pub use sseq::Sseq;
pub use ssar::Ssar;
pub use strm::Strm;
pub use swar::Swar;
pub use swav::Swav;

/// The three kinds of wave data the DS sound hardware understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum WaveType {
    #[default]
    Pcm8 = 0,
    Pcm16 = 1,
    Adpcm = 2,
}

impl WaveType {
    pub(crate) fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Pcm8),
            1 => Ok(Self::Pcm16),
            2 => Ok(Self::Adpcm),
            _ => Err(Error::PreconditionFailed(format!(
                "unknown wave type {value}"
            ))),
        }
    }
}
