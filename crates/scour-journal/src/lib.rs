//! Forensic Journal Layer
//!
//! This crate implements the damage-tolerant side of the journal tool: a
//! scanner that reads *past* corruption and missing objects, the health
//! report it produces, and a dump/restore pair for moving a journal's raw
//! byte range between the object pool and a sparse local file.
//!
//! ## Components
//!
//! - [`PoolClient`]: blob-addressed adapter over an
//!   [`object_store::ObjectStore`], keeping "object missing" (a data
//!   condition) distinct from store failures (operational errors).
//! - [`EventFramer`]: resumable state machine over the reassembled byte
//!   stream; decodes frames, resynchronises on the sentinel after
//!   corruption.
//! - [`JournalScanner`]: walks the journal's object range, feeds the
//!   framer, and accumulates a [`HealthReport`].
//! - [`Dumper`]: exports `[expire_pos, write_pos)` to a sparse file with a
//!   text preamble, and restores such files into a pool.
//! - [`EventFilter`] / [`FilterSet`]: post-decode predicates for selective
//!   event extraction.
//!
//! ## Error planes
//!
//! Everything wrong with the *data* (missing objects, corrupt headers,
//! invalid frames) lands in the [`HealthReport`]; the scan itself still
//! returns `Ok`. Only operational failures (store I/O, unreadable dump
//! files) surface as [`Error`].

pub mod config;
pub mod dump;
pub mod error;
pub mod filter;
pub mod framer;
pub mod pool;
pub mod report;
pub mod scanner;

pub use config::ScanConfig;
pub use dump::{encode_preamble, parse_preamble, DumpInfo, Dumper, PREAMBLE_LEN};
pub use error::{Error, Result};
pub use filter::{EventFilter, FilterSet};
pub use framer::{EventFramer, Step};
pub use pool::{PoolClient, ReadOutcome};
pub use report::{HealthReport, Range};
pub use scanner::JournalScanner;
