//! Operational Error Types
//!
//! Only *operational failures* live here: conditions that abort a scan or a
//! dump outright. Damaged data (missing objects, corrupt headers, invalid
//! frames) is never an error on this plane; the scanner records those in
//! its [`HealthReport`](crate::HealthReport) and keeps going.
//!
//! ## Usage
//!
//! All fallible operations in this crate return `Result<T>`, aliased to
//! `Result<T, Error>`, so `?` propagates cleanly.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Strict header decode failure; raised by the dumper's recovery
    /// handshake, never by the scanner.
    #[error("corrupt journal header: {0}")]
    Header(#[from] scour_core::HeaderError),

    #[error("journal header object {0} missing")]
    HeaderMissing(String),

    #[error("invalid dump file: {0}")]
    DumpFormat(String),
}
