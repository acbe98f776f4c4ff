//! Error types for `nitrokit`

use thiserror::Error;

/// The error type for `nitrokit` operations.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    // ==================== IO Errors ====================
    /// IO error from file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ==================== Buffer Errors ====================
    /// A read or write would pass the end of the buffer.
    #[error("out of bounds at offset {offset:#x}: needed {needed} bytes, buffer is {len} bytes")]
    OutOfBounds {
        /// Offset at which the access was attempted.
        offset: usize,
        /// Number of bytes the access needed.
        needed: usize,
        /// Total length of the buffer.
        len: usize,
    },

    /// A compressed stream ended in the middle of a token.
    #[error("compressed stream truncated at offset {offset:#x}")]
    TruncatedInput {
        /// Offset at which the stream ran out.
        offset: usize,
    },

    // ==================== Structural Errors ====================
    /// A structural magic identifier did not match.
    #[error("invalid magic: expected {expected:?}, found {found:02X?}")]
    InvalidMagic {
        /// The magic bytes that were expected.
        expected: &'static str,
        /// The bytes actually found.
        found: Vec<u8>,
    },

    /// A container declared a version this crate does not support.
    #[error("unsupported {format} version: {version:#x}")]
    UnknownVersion {
        /// Which format declared the version.
        format: &'static str,
        /// The version value found.
        version: u32,
    },

    /// A filename table violated one of its structural invariants.
    #[error("malformed filename table: {reason} (at {offset:#x})")]
    MalformedFnt {
        /// Which invariant was violated.
        reason: String,
        /// Byte offset of the offending field.
        offset: usize,
    },

    /// A filename table cannot be serialized as requested.
    #[error("cannot serialize filename table: {0}")]
    InvalidFnt(String),

    /// An SDAT violated one of its structural invariants.
    #[error("malformed SDAT: {0}")]
    MalformedSdat(String),

    /// A ROM violated one of its structural invariants.
    #[error("malformed ROM: {0}")]
    MalformedRom(String),

    /// A BMG violated one of its structural invariants.
    #[error("malformed BMG: {0}")]
    MalformedBmg(String),

    /// An SBNK violated one of its structural invariants.
    #[error("malformed SBNK: {0}")]
    MalformedSbnk(String),

    /// Sequence event data violated one of its structural invariants.
    #[error("malformed sequence data: {reason} (at {offset:#x})")]
    MalformedSseq {
        /// Which invariant was violated.
        reason: String,
        /// Byte offset of the offending event.
        offset: usize,
    },

    // ==================== Sequence Graph Errors ====================
    /// An address operand points into the middle of another event.
    #[error("address operand targets offset {offset:#x}, inside a decoded event")]
    OverlappingEvents {
        /// The offending target offset.
        offset: usize,
    },

    /// An address operand does not resolve to any event in the list.
    #[error("address operand references event index {index}, which is not in the list")]
    DanglingReference {
        /// The unresolvable event index.
        index: usize,
    },

    // ==================== Emit Preconditions ====================
    /// Caller-provided object state violates an emit-time invariant.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
}

/// A specialized Result type for `nitrokit` operations.
pub type Result<T> = std::result::Result<T, Error>;
