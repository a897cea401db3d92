//! Journal Scanner
//!
//! Sequential reader for metadata-server journals that detects, records,
//! and reads *past* corruption and missing objects, where the regular
//! journal replay machinery would give up.
//!
//! ## Scan shape
//!
//! ```text
//! header object ──► decode + validate ──► HealthReport flags
//!                                              │
//! objects [expire/S .. write/S] ──► rolling buffer ──► EventFramer
//!        │ (missing: record + skip)                       │
//!        ▼                                                ▼
//!   objects_present / objects_missing        events / ranges_invalid
//! ```
//!
//! ## Error planes
//!
//! Damage is data, not failure: a missing or corrupt header, absent
//! objects, invalid frames and undecodable payloads are all recorded in the
//! report and the scan keeps going. Only store I/O errors abort it.
//! Returning `Ok` therefore means "the checks ran", not "the journal is
//! healthy"; ask the report.

use std::sync::Arc;

use tracing::{debug, info, warn};

use scour_core::{object_name, EventDecoder, Header, MdsEventDecoder};

use crate::config::ScanConfig;
use crate::error::Result;
use crate::framer::{EventFramer, Step};
use crate::pool::{PoolClient, ReadOutcome};
use crate::report::{HealthReport, Range};

pub struct JournalScanner {
    pool: PoolClient,
    config: ScanConfig,
    decoder: Arc<dyn EventDecoder>,
}

impl JournalScanner {
    pub fn new(pool: PoolClient, config: ScanConfig) -> Self {
        Self::with_decoder(pool, config, Arc::new(MdsEventDecoder))
    }

    /// Scanner with a custom event decoder.
    pub fn with_decoder(
        pool: PoolClient,
        config: ScanConfig,
        decoder: Arc<dyn EventDecoder>,
    ) -> Self {
        Self {
            pool,
            config,
            decoder,
        }
    }

    /// Read the header, then walk the journal's object range. Returns `Ok`
    /// whenever the checks could run, however damaged the journal is.
    pub async fn scan(&self) -> Result<HealthReport> {
        let mut report = HealthReport::default();
        self.scan_header(&mut report).await?;
        if report.header_valid {
            self.scan_events(&mut report).await?;
        }
        info!(summary = %report.summary(), "journal scan complete");
        Ok(report)
    }

    async fn scan_header(&self, report: &mut HealthReport) -> Result<()> {
        let name = object_name(self.config.rank, 0);
        debug!(object = %name, "reading journal header");
        let data = match self.pool.read(&name).await? {
            ReadOutcome::Present(data) => data,
            ReadOutcome::Missing => {
                warn!(object = %name, "journal header object missing");
                return Ok(());
            }
        };
        report.header_present = true;

        match Header::decode(&data) {
            Ok(header) => {
                if header.layout.pool_id != self.config.pool_id {
                    warn!(
                        header_pool = header.layout.pool_id,
                        expected_pool = self.config.pool_id,
                        "journal header names a different pool"
                    );
                }
                debug!(
                    trimmed = format_args!("{:#x}", header.trimmed_pos),
                    expire = format_args!("{:#x}", header.expire_pos),
                    write = format_args!("{:#x}", header.write_pos),
                    "journal header decoded"
                );
                report.header_valid = true;
                report.header = Some(header);
            }
            Err(err) => {
                warn!(error = %err, "journal header is corrupt");
                report.header_error = Some(err.to_string());
            }
        }
        Ok(())
    }

    async fn scan_events(&self, report: &mut HealthReport) -> Result<()> {
        let Some(header) = report.header.clone() else {
            return Ok(());
        };
        if header.expire_pos == header.write_pos {
            debug!("journal is empty, nothing to scan");
            return Ok(());
        }

        let object_size = header.layout.object_size_or_default();
        if header.layout.object_size == 0 {
            warn!(
                default = object_size,
                "header reports zero object size, using format default"
            );
        }

        let first = header.expire_pos / object_size;
        let last = (header.write_pos - 1) / object_size;
        debug!(
            first,
            last,
            start = format_args!("{:#x}", header.expire_pos),
            "starting journal scan"
        );

        // Frames are capped at two objects, which also caps the rolling buffer.
        let mut framer = EventFramer::new(
            self.decoder.clone(),
            header.expire_pos,
            header.write_pos,
            (2 * object_size) as usize,
        );

        for index in first..=last {
            if self.config.cancel.is_cancelled() {
                info!(next_object = index, "scan cancelled");
                report.cancelled = true;
                return Ok(());
            }

            let object_base = index * object_size;
            // Stream bytes this object is expected to carry.
            let span_lo = object_base.max(header.expire_pos);
            let span_hi = (object_base + object_size).min(header.write_pos);

            let name = object_name(self.config.rank, index);
            let data = match self.pool.read(&name).await? {
                ReadOutcome::Present(data) => data,
                ReadOutcome::Missing => {
                    warn!(object = %name, "missing journal object");
                    report.objects_missing.insert(index);
                    framer.enter_gap(span_hi);
                    continue;
                }
            };
            report.objects_present.insert(index);

            let skip = (span_lo - object_base) as usize;
            let take = (span_hi - span_lo) as usize;
            let available = data.len().saturating_sub(skip).min(take);
            if available > 0 {
                framer.feed(&data[skip..skip + available]);
            }
            self.drain(&mut framer, report);

            if available < take {
                // The object exists but is shorter than the stream needs;
                // treat the missing tail like a hole.
                warn!(
                    object = %name,
                    have = data.len(),
                    need = skip + take,
                    "short journal object"
                );
                framer.enter_gap(span_hi);
            }
        }

        // End of range: an open gap, or a residual the framer could not
        // finish, runs to the end of the known journal.
        if let Some(gap_start) = framer.open_gap() {
            report.ranges_invalid.push(Range {
                lo: gap_start,
                hi: None,
            });
        } else if framer.cursor() < header.write_pos {
            report.ranges_invalid.push(Range {
                lo: framer.cursor(),
                hi: None,
            });
        }

        debug!(
            present = report.objects_present.len(),
            missing = report.objects_missing.len(),
            events = report.events_valid.len(),
            gaps = report.ranges_invalid.len(),
            "journal object range scanned"
        );
        Ok(())
    }

    /// Run the framer until it wants more data, folding each step into the
    /// report.
    fn drain(&self, framer: &mut EventFramer, report: &mut HealthReport) {
        loop {
            match framer.step() {
                Step::NeedMore => return,
                Step::Event { offset, mut event } => {
                    report.events_valid.push(offset);
                    if self.config.filter.matches(offset, &event) {
                        if !self.config.keep_payloads {
                            event.drop_payload();
                        }
                        report.events.insert(offset, event);
                    } else {
                        report.events_filtered += 1;
                    }
                }
                Step::GapEnd { gap_start, resume } => {
                    report.ranges_invalid.push(Range {
                        lo: gap_start,
                        hi: Some(resume),
                    });
                }
                // Gaps are recorded when they close (or at end of range).
                Step::GapStart { .. } | Step::BadFrame { .. } => {}
            }
        }
    }
}
