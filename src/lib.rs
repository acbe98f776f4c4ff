//! NitroKit - Native Rust support for Nintendo DS file formats
//!
//! This crate provides low-level access to the binary container and audio
//! formats used by Nintendo DS software: ROM images, NARC archives, the
//! LZ10/code compression family, executable code containers, BMG message
//! files, and the SDAT sound archive with its nested asset formats.

pub mod bytes;
pub mod cli;
pub mod compression;
pub mod error;
pub mod formats;
pub mod rom;
pub mod sound;
pub mod utils;

// Re-exports for convenience
pub use error::{Error, Result};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::formats::bmg::{Bmg, Message, MessagePart};
    pub use crate::formats::fnt::Folder;
    pub use crate::formats::narc::Narc;
    pub use crate::rom::NdsRom;
    pub use crate::sound::sdat::Sdat;
    pub use crate::compression::{code, lz10};
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
