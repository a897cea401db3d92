//! Journal Dump and Restore
//!
//! Copies the journal's live byte range `[expire_pos, write_pos)` to a local
//! *sparse* file and restores such a file back into the object pool.
//!
//! ## Dump file layout
//!
//! ```text
//! ┌──────────────────────────┬─── hole ───┬────────────────────────┐
//! │ 200-byte text preamble   │ (sparse)   │ journal bytes at their │
//! │ NUL padded, 0x04 ended   │            │ original offsets       │
//! └──────────────────────────┴────────────┴────────────────────────┘
//! file offset 0              200          start            start+len
//! ```
//!
//! Placing the data at its journal offsets makes every file offset equal
//! its stream offset, so an operator can correlate the dump with a scan
//! report byte for byte. The region between the preamble and `start` is a
//! filesystem hole: the dumper seeks past it instead of writing zeros.
//!
//! ## Preamble
//!
//! ```text
//! Ceph mds<rank> journal dump
//!  start offset <decimal> (0x<hex>)
//!        length <decimal> (0x<hex>)
//! <0x04>
//! ```
//!
//! Restore parses it line by line: the `start offset` and `length` lines
//! are located by field name and their first token parsed as decimal.
//! Either line missing fails the restore before anything touches the pool.

use std::path::Path;

use bytes::{Bytes, BytesMut};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use scour_core::{object_name, Header, JournalLayout, BASE_INO, JOURNAL_MAGIC};

use crate::error::{Error, Result};
use crate::pool::{PoolClient, ReadOutcome};

/// Size of the dump file's text preamble.
pub const PREAMBLE_LEN: usize = 200;

const PREAMBLE_TERMINATOR: u8 = 0x04;

/// Byte range a dump or restore covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpInfo {
    pub start: u64,
    pub len: u64,
}

pub struct Dumper {
    pool: PoolClient,
    rank: u32,
    pool_id: i64,
}

impl Dumper {
    pub fn new(pool: PoolClient, rank: u32, pool_id: i64) -> Self {
        Self {
            pool,
            rank,
            pool_id,
        }
    }

    /// Recovery handshake: the dump range comes from a strictly valid
    /// header. A journal too damaged for this is a scanner job, not a
    /// dumper job.
    async fn recover(&self) -> Result<Header> {
        let name = object_name(self.rank, 0);
        let data = match self.pool.read(&name).await? {
            ReadOutcome::Present(data) => data,
            ReadOutcome::Missing => return Err(Error::HeaderMissing(name)),
        };
        let header = Header::decode(&data)?;
        debug!(
            start = format_args!("{:#x}", header.expire_pos),
            end = format_args!("{:#x}", header.write_pos),
            "journal recovered"
        );
        Ok(header)
    }

    /// Dump the journal's live byte range to a sparse local file.
    pub async fn dump(&self, path: &Path) -> Result<DumpInfo> {
        let header = self.recover().await?;
        let start = header.expire_pos;
        let end = header.write_pos;
        let len = end - start;
        let object_size = header.layout.object_size_or_default();
        info!(
            start = format_args!("{start:#x}"),
            len,
            path = %path.display(),
            "dumping journal"
        );

        let mut file = File::create(path).await?;
        file.write_all(&encode_preamble(self.rank, start, len))
            .await?;

        if len > 0 {
            let first = start / object_size;
            let last = (end - 1) / object_size;
            for index in first..=last {
                let object_base = index * object_size;
                let lo = object_base.max(start);
                let hi = (object_base + object_size).min(end);
                let name = object_name(self.rank, index);
                match self.pool.read(&name).await? {
                    ReadOutcome::Present(data) => {
                        let skip = (lo - object_base) as usize;
                        let take = (hi - lo) as usize;
                        if data.len() < skip + take {
                            warn!(
                                object = %name,
                                have = data.len(),
                                need = skip + take,
                                "short journal object, dump will have a hole"
                            );
                        }
                        let available = data.len().saturating_sub(skip).min(take);
                        if available > 0 {
                            file.seek(std::io::SeekFrom::Start(lo)).await?;
                            file.write_all(&data[skip..skip + available]).await?;
                        }
                    }
                    ReadOutcome::Missing => {
                        warn!(object = %name, "missing journal object, leaving hole");
                    }
                }
            }
            // Extend to the full range even when the tail was unreadable,
            // so the file's length matches the journal's write position.
            file.set_len(end).await?;
        }
        file.flush().await?;

        info!(bytes = len, "journal dump written");
        Ok(DumpInfo { start, len })
    }

    /// Restore a dump file into the pool: synthesise a header, then stream
    /// the data region back to its original offsets.
    pub async fn undump(&self, path: &Path) -> Result<DumpInfo> {
        let mut file = File::open(path).await?;
        let mut preamble = [0u8; PREAMBLE_LEN];
        file.read_exact(&mut preamble).await?;
        let (start, len) = parse_preamble(&preamble)?;
        let end = start + len;
        info!(
            start = format_args!("{start:#x}"),
            len,
            path = %path.display(),
            "restoring journal"
        );

        let layout = JournalLayout::with_pool(self.pool_id);
        let object_size = layout.object_size_or_default();
        let header = Header {
            magic: JOURNAL_MAGIC.to_string(),
            trimmed_pos: start,
            expire_pos: start,
            write_pos: end,
            layout,
            stream_id: BASE_INO + self.rank as u64,
        };
        let header_bytes = header.encode();

        let first = if len > 0 { start / object_size } else { u64::MAX };
        if first != 0 {
            let name = object_name(self.rank, 0);
            debug!(object = %name, "writing restored header");
            self.pool.write_full(&name, header_bytes.clone()).await?;
        }

        if len > 0 {
            let last = (end - 1) / object_size;
            for index in first..=last {
                let object_base = index * object_size;
                let lo = object_base.max(start);
                let hi = (object_base + object_size).min(end);

                file.seek(std::io::SeekFrom::Start(lo)).await?;
                let mut data = vec![0u8; (hi - lo) as usize];
                file.read_exact(&mut data).await?;

                let image = if index == 0 {
                    // The data region reaches into the header object; lay the
                    // header down in front of it.
                    if (lo as usize) < header_bytes.len() {
                        return Err(Error::DumpFormat(format!(
                            "restored range starting at {lo:#x} overlaps the journal header"
                        )));
                    }
                    let mut image = BytesMut::with_capacity(hi as usize);
                    image.extend_from_slice(&header_bytes);
                    image.resize(lo as usize, 0);
                    image.extend_from_slice(&data);
                    image.freeze()
                } else if lo > object_base {
                    // Leading hole inside the first data object.
                    let mut image = BytesMut::with_capacity((hi - object_base) as usize);
                    image.resize((lo - object_base) as usize, 0);
                    image.extend_from_slice(&data);
                    image.freeze()
                } else {
                    Bytes::from(data)
                };

                let name = object_name(self.rank, index);
                debug!(
                    object = %name,
                    lo = format_args!("{lo:#x}"),
                    hi = format_args!("{hi:#x}"),
                    "writing restored object"
                );
                self.pool.write_full(&name, image).await?;
            }
        }

        info!(bytes = len, "journal restored");
        Ok(DumpInfo { start, len })
    }
}

/// Build the 200-byte NUL-padded text preamble.
pub fn encode_preamble(rank: u32, start: u64, len: u64) -> [u8; PREAMBLE_LEN] {
    let mut buf = [0u8; PREAMBLE_LEN];
    let text = format!(
        "Ceph mds{rank} journal dump\n start offset {start} (0x{start:x})\n       length {len} (0x{len:x})\n\x04"
    );
    buf[..text.len()].copy_from_slice(text.as_bytes());
    buf
}

/// Parse a dump preamble into `(start, len)`.
pub fn parse_preamble(buf: &[u8]) -> Result<(u64, u64)> {
    let end = buf
        .iter()
        .position(|&b| b == PREAMBLE_TERMINATOR)
        .ok_or_else(|| Error::DumpFormat("preamble terminator missing".to_string()))?;
    let text = std::str::from_utf8(&buf[..end])
        .map_err(|_| Error::DumpFormat("preamble is not valid text".to_string()))?;

    let mut start = None;
    let mut len = None;
    for line in text.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("start offset") {
            start = Some(parse_first_number("start offset", rest)?);
        } else if let Some(rest) = line.strip_prefix("length") {
            len = Some(parse_first_number("length", rest)?);
        }
    }
    match (start, len) {
        (Some(start), Some(len)) => Ok((start, len)),
        (None, _) => Err(Error::DumpFormat("start offset line missing".to_string())),
        (_, None) => Err(Error::DumpFormat("length line missing".to_string())),
    }
}

fn parse_first_number(field: &str, rest: &str) -> Result<u64> {
    rest.split_whitespace()
        .next()
        .ok_or_else(|| Error::DumpFormat(format!("{field} line has no value")))?
        .parse()
        .map_err(|_| Error::DumpFormat(format!("{field} value is not a number")))
}
