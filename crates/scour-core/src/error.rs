//! Format-Plane Error Types
//!
//! Errors raised while decoding on-disk journal structures. These are *data
//! conditions*: a forensic scan records them in its report and keeps going,
//! it never aborts on them. Operational failures (I/O, store errors) live in
//! the journal crate's error type instead.
//!
//! ## Error Categories
//!
//! ### Header errors
//! - `Truncated`: fewer bytes than the versioned struct declares
//! - `BadMagic`: the magic string does not identify this format
//! - `InconsistentOffsets`: `trimmed <= expire <= write` violated
//! - `BadLayout`: object layout that cannot describe a journal
//!
//! ### Event errors
//! - `Truncated`: payload shorter than its fixed prefix requires
//! - `UnknownType`: type id outside the recognised table
//! - `InvalidBody`: body present but malformed (e.g. non-UTF-8 path)

use thiserror::Error;

/// Why a journal header failed to decode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderError {
    #[error("header truncated")]
    Truncated,

    #[error("bad magic")]
    BadMagic,

    #[error("inconsistent offsets: trimmed 0x{trimmed:x}, expire 0x{expire:x}, write 0x{write:x}")]
    InconsistentOffsets { trimmed: u64, expire: u64, write: u64 },

    #[error("bad layout: {0}")]
    BadLayout(String),
}

/// Why an event payload failed to decode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("event truncated: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },

    #[error("unknown event type {0:#x}")]
    UnknownType(u32),

    #[error("invalid event body: {0}")]
    InvalidBody(String),
}
