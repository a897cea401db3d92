//! Scan Configuration
//!
//! Caller-supplied options for a journal scan. Defaults suit forensic use:
//! payloads are kept, nothing is filtered, and the cancellation token never
//! fires unless the caller arranges it.

use tokio_util::sync::CancellationToken;

use crate::filter::FilterSet;

#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Rank of the metadata server whose journal to scan.
    pub rank: u32,

    /// Metadata pool id the journal is expected to live in.
    pub pool_id: i64,

    /// Retain raw payload bytes on decoded events.
    pub keep_payloads: bool,

    /// Post-decode predicates; non-matching events are decoded, counted,
    /// then dropped.
    pub filter: FilterSet,

    /// Checked before each object read; once cancelled the scan returns a
    /// partial report.
    pub cancel: CancellationToken,
}

impl ScanConfig {
    pub fn new(rank: u32, pool_id: i64) -> Self {
        Self {
            rank,
            pool_id,
            keep_payloads: true,
            filter: FilterSet::default(),
            cancel: CancellationToken::new(),
        }
    }
}
