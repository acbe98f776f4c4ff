//! File format handlers shared by ROMs and standalone files

pub mod bmg;
pub mod code;
pub mod common;
pub mod fnt;
pub mod narc;

// Re-export main document types for convenience
pub use bmg::{Bmg, Message, MessagePart};
pub use code::{MainCode, Overlay};
pub use fnt::Folder;
pub use narc::Narc;
