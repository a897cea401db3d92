//! Log Events and the Pluggable Event Decoder
//!
//! Frame payloads are encoded log events: a `u32` type id followed by an
//! opaque body. The scanner does not interpret event semantics; it only
//! needs a type tag, the raw bytes (for re-encoding and binary export), and
//! an optional derived summary for the recognised subset.
//!
//! ## Ownership
//!
//! A [`LogEvent`] is a plain owned value. The health report owns its events
//! outright and dropping the report drops them; there is no shared or
//! manually managed event storage anywhere.
//!
//! ## Capability queries
//!
//! Code that wants update-specific fields asks the event:
//!
//! ```ignore
//! if let Some(update) = event.as_update() {
//!     println!("{}", update.path);
//! }
//! ```
//!
//! There is no downcasting; an event that is not an update simply answers
//! `None`.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Serialize;

use crate::error::DecodeError;

pub const EVENT_SUBTREEMAP: u32 = 1;
pub const EVENT_EXPORT: u32 = 2;
pub const EVENT_IMPORTSTART: u32 = 3;
pub const EVENT_IMPORTFINISH: u32 = 4;
pub const EVENT_RESETJOURNAL: u32 = 9;
pub const EVENT_SESSION: u32 = 10;
pub const EVENT_UPDATE: u32 = 20;
pub const EVENT_PEERUPDATE: u32 = 21;
pub const EVENT_OPEN: u32 = 22;
pub const EVENT_COMMITTED: u32 = 23;

/// Tag for a recognised event type id.
pub fn type_tag(type_id: u32) -> Option<&'static str> {
    match type_id {
        EVENT_SUBTREEMAP => Some("subtreemap"),
        EVENT_EXPORT => Some("export"),
        EVENT_IMPORTSTART => Some("importstart"),
        EVENT_IMPORTFINISH => Some("importfinish"),
        EVENT_RESETJOURNAL => Some("resetjournal"),
        EVENT_SESSION => Some("session"),
        EVENT_UPDATE => Some("update"),
        EVENT_PEERUPDATE => Some("peerupdate"),
        EVENT_OPEN => Some("open"),
        EVENT_COMMITTED => Some("committed"),
        _ => None,
    }
}

/// One decoded log event, owned by the report that holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEvent {
    pub type_id: u32,
    pub type_tag: String,
    /// Payload length on disk.
    pub size: usize,
    /// Raw payload bytes, retained when the scan keeps payloads.
    #[serde(skip)]
    pub raw: Option<Bytes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<EventSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum EventSummary {
    Update {
        path: String,
        inode: u64,
        dir_inode: u64,
    },
}

/// Borrowed view of an update event's summary fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateView<'a> {
    pub path: &'a str,
    pub inode: u64,
    pub dir_inode: u64,
}

impl LogEvent {
    /// Update-specific fields, if this is an update event with a summary.
    pub fn as_update(&self) -> Option<UpdateView<'_>> {
        match &self.summary {
            Some(EventSummary::Update {
                path,
                inode,
                dir_inode,
            }) => Some(UpdateView {
                path,
                inode: *inode,
                dir_inode: *dir_inode,
            }),
            None => None,
        }
    }

    /// Release the retained payload bytes, keeping tag and summary.
    pub fn drop_payload(&mut self) {
        self.raw = None;
    }
}

/// Decodes frame payloads into [`LogEvent`]s. Pluggable so that scans can be
/// run with a different event vocabulary.
pub trait EventDecoder: Send + Sync {
    fn decode(&self, payload: &[u8]) -> Result<LogEvent, DecodeError>;
}

/// Default decoder for the metadata-server event vocabulary.
#[derive(Debug, Default, Clone, Copy)]
pub struct MdsEventDecoder;

impl EventDecoder for MdsEventDecoder {
    fn decode(&self, payload: &[u8]) -> Result<LogEvent, DecodeError> {
        if payload.len() < 4 {
            return Err(DecodeError::Truncated {
                need: 4,
                have: payload.len(),
            });
        }
        let mut buf = payload;
        let type_id = buf.get_u32_le();
        let tag = type_tag(type_id).ok_or(DecodeError::UnknownType(type_id))?;
        let summary = if type_id == EVENT_UPDATE {
            Some(decode_update_summary(buf)?)
        } else {
            None
        };
        Ok(LogEvent {
            type_id,
            type_tag: tag.to_string(),
            size: payload.len(),
            raw: Some(Bytes::copy_from_slice(payload)),
            summary,
        })
    }
}

/// Update bodies open with `u32 path_len | path | u64 inode | u64 dir_inode`;
/// anything after that prefix is opaque here.
fn decode_update_summary(mut buf: &[u8]) -> Result<EventSummary, DecodeError> {
    if buf.remaining() < 4 {
        return Err(DecodeError::Truncated {
            need: 4,
            have: buf.remaining(),
        });
    }
    let path_len = buf.get_u32_le() as usize;
    if buf.remaining() < path_len + 16 {
        return Err(DecodeError::Truncated {
            need: path_len + 16,
            have: buf.remaining(),
        });
    }
    let path = std::str::from_utf8(&buf[..path_len])
        .map_err(|_| DecodeError::InvalidBody("update path is not UTF-8".to_string()))?
        .to_string();
    buf.advance(path_len);
    let inode = buf.get_u64_le();
    let dir_inode = buf.get_u64_le();
    Ok(EventSummary::Update {
        path,
        inode,
        dir_inode,
    })
}

/// Encode an update event payload.
pub fn encode_update_payload(path: &str, inode: u64, dir_inode: u64) -> Bytes {
    let mut buf = BytesMut::with_capacity(4 + 4 + path.len() + 16);
    buf.put_u32_le(EVENT_UPDATE);
    buf.put_u32_le(path.len() as u32);
    buf.put_slice(path.as_bytes());
    buf.put_u64_le(inode);
    buf.put_u64_le(dir_inode);
    buf.freeze()
}

/// Encode an event payload with an opaque body.
pub fn encode_event_payload(type_id: u32, body: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(4 + body.len());
    buf.put_u32_le(type_id);
    buf.put_slice(body);
    buf.freeze()
}
