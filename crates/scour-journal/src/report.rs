//! Health Report
//!
//! Structured outcome of a journal scan. A report is created empty by the
//! scanner, mutated only during a single `scan()` call, and owned by the
//! caller afterwards; the events in it are owned by the report and die with
//! it.
//!
//! A report existing does not mean the journal is healthy, only that the
//! checks ran. `is_healthy()` is the verdict.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use scour_core::{Header, LogEvent};

/// Half-open range of stream offsets; `hi = None` runs to the end of the
/// known journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Range {
    pub lo: u64,
    pub hi: Option<u64>,
}

/// Structured outcome of a journal scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HealthReport {
    /// The header object read successfully.
    pub header_present: bool,
    /// The header decoded and passed its invariant checks.
    pub header_valid: bool,
    /// Decode failure reason when `header_present && !header_valid`.
    pub header_error: Option<String>,
    pub header: Option<Header>,
    pub objects_present: BTreeSet<u64>,
    pub objects_missing: BTreeSet<u64>,
    /// Stream regions the framer rejected; disjoint and ascending.
    pub ranges_invalid: Vec<Range>,
    /// Offsets of successfully decoded frames, ascending. Includes events
    /// later dropped by filters.
    pub events_valid: Vec<u64>,
    /// Decoded events that passed the filters, keyed by stream offset.
    pub events: BTreeMap<u64, LogEvent>,
    /// Events decoded but dropped by the filters.
    pub events_filtered: u64,
    /// The scan was cancelled before covering the full object range.
    pub cancelled: bool,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.header_present
            && self.header_valid
            && self.ranges_invalid.is_empty()
            && self.objects_missing.is_empty()
    }

    /// Total bytes covered by invalid ranges; open-ended ranges are measured
    /// to the journal's write position.
    pub fn gap_bytes(&self) -> u64 {
        let end = self.header.as_ref().map(|h| h.write_pos).unwrap_or(0);
        self.ranges_invalid
            .iter()
            .map(|r| r.hi.unwrap_or(end).saturating_sub(r.lo))
            .sum()
    }

    /// One-line health summary for operator output.
    pub fn summary(&self) -> String {
        format!(
            "healthy={}; {} missing objects; {} gap bytes",
            self.is_healthy(),
            self.objects_missing.len(),
            self.gap_bytes()
        )
    }
}
