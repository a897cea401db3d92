//! Journal Header Codec
//!
//! The header lives in object index 0 of the journal and pins down the
//! journal's identity and geometry:
//!
//! ```text
//! ┌──────────────┬───────────────┬─────────────────┐
//! │ struct_v (1) │ compat_v (1)  │ payload_len (4) │
//! ├──────────────┴───────────────┴─────────────────┤
//! │ magic_len (4) │ magic bytes (ASCII)            │
//! ├────────────────────────────────────────────────┤
//! │ trimmed_pos (8) │ expire_pos (8) │ write_pos (8)│
//! ├────────────────────────────────────────────────┤
//! │ stripe_unit (4) │ stripe_count (4) │ object_size (4) │
//! ├────────────────────────────────────────────────┤
//! │ pool_id (8, signed) │ stream_id (8)            │
//! └────────────────────────────────────────────────┘
//! ```
//!
//! All integers little-endian. The three positions must satisfy
//! `trimmed_pos <= expire_pos <= write_pos`; the journal's live region is
//! `[expire_pos, write_pos)`.
//!
//! A header that fails to decode is a data condition, not an operational
//! failure: the scanner records it and carries on, so decoding returns the
//! precise [`HeaderError`] reason rather than panicking or aborting.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::HeaderError;

/// Magic string identifying the on-disk journal format.
pub const JOURNAL_MAGIC: &str = "ceph fs volume v011";

/// Object size used when a header reports zero.
pub const DEFAULT_OBJECT_SIZE: u64 = 4 * 1024 * 1024;

const HEADER_VERSION: u8 = 1;
const HEADER_COMPAT: u8 = 1;

/// Fixed payload bytes after the magic string: three positions, the layout,
/// the pool id and the stream id.
const FIXED_PAYLOAD_LEN: usize = 8 * 3 + 4 * 3 + 8 + 8;

/// Object layout of the journal stripe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalLayout {
    pub stripe_unit: u32,
    pub stripe_count: u32,
    /// Size of each journal object; zero means "use the format default".
    pub object_size: u32,
    pub pool_id: i64,
}

impl JournalLayout {
    /// Default layout bound to the given metadata pool.
    pub fn with_pool(pool_id: i64) -> Self {
        Self {
            stripe_unit: DEFAULT_OBJECT_SIZE as u32,
            stripe_count: 1,
            object_size: DEFAULT_OBJECT_SIZE as u32,
            pool_id,
        }
    }

    /// Object size in bytes, substituting the format default when the header
    /// reports zero.
    pub fn object_size_or_default(&self) -> u64 {
        if self.object_size == 0 {
            DEFAULT_OBJECT_SIZE
        } else {
            self.object_size as u64
        }
    }
}

/// Decoded journal header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub magic: String,
    pub trimmed_pos: u64,
    pub expire_pos: u64,
    pub write_pos: u64,
    pub layout: JournalLayout,
    pub stream_id: u64,
}

impl Header {
    /// Encode into the versioned on-disk representation.
    pub fn encode(&self) -> Bytes {
        let mut payload = BytesMut::with_capacity(4 + self.magic.len() + FIXED_PAYLOAD_LEN);
        payload.put_u32_le(self.magic.len() as u32);
        payload.put_slice(self.magic.as_bytes());
        payload.put_u64_le(self.trimmed_pos);
        payload.put_u64_le(self.expire_pos);
        payload.put_u64_le(self.write_pos);
        payload.put_u32_le(self.layout.stripe_unit);
        payload.put_u32_le(self.layout.stripe_count);
        payload.put_u32_le(self.layout.object_size);
        payload.put_i64_le(self.layout.pool_id);
        payload.put_u64_le(self.stream_id);

        let mut buf = BytesMut::with_capacity(6 + payload.len());
        buf.put_u8(HEADER_VERSION);
        buf.put_u8(HEADER_COMPAT);
        buf.put_u32_le(payload.len() as u32);
        buf.extend_from_slice(&payload);
        buf.freeze()
    }

    /// Decode and validate a header.
    pub fn decode(data: &[u8]) -> Result<Self, HeaderError> {
        let mut buf = data;
        if buf.remaining() < 6 {
            return Err(HeaderError::Truncated);
        }
        let version = buf.get_u8();
        let compat = buf.get_u8();
        if compat > HEADER_VERSION {
            return Err(HeaderError::BadLayout(format!(
                "header version {version} requires compat {compat}, this tool understands {HEADER_VERSION}"
            )));
        }
        let payload_len = buf.get_u32_le() as usize;
        if buf.remaining() < payload_len {
            return Err(HeaderError::Truncated);
        }
        let mut buf = &buf[..payload_len];

        if buf.remaining() < 4 {
            return Err(HeaderError::Truncated);
        }
        let magic_len = buf.get_u32_le() as usize;
        if buf.remaining() < magic_len {
            return Err(HeaderError::Truncated);
        }
        let magic = std::str::from_utf8(&buf[..magic_len])
            .map_err(|_| HeaderError::BadMagic)?
            .to_string();
        buf.advance(magic_len);
        if magic != JOURNAL_MAGIC {
            return Err(HeaderError::BadMagic);
        }

        if buf.remaining() < FIXED_PAYLOAD_LEN {
            return Err(HeaderError::Truncated);
        }
        let trimmed_pos = buf.get_u64_le();
        let expire_pos = buf.get_u64_le();
        let write_pos = buf.get_u64_le();
        if !(trimmed_pos <= expire_pos && expire_pos <= write_pos) {
            return Err(HeaderError::InconsistentOffsets {
                trimmed: trimmed_pos,
                expire: expire_pos,
                write: write_pos,
            });
        }

        let stripe_unit = buf.get_u32_le();
        let stripe_count = buf.get_u32_le();
        let object_size = buf.get_u32_le();
        let pool_id = buf.get_i64_le();
        let stream_id = buf.get_u64_le();
        if stripe_count == 0 {
            return Err(HeaderError::BadLayout("zero stripe count".to_string()));
        }
        if object_size != 0 && !object_size.is_power_of_two() {
            return Err(HeaderError::BadLayout(format!(
                "object size {object_size:#x} is not a power of two"
            )));
        }

        Ok(Self {
            magic,
            trimmed_pos,
            expire_pos,
            write_pos,
            layout: JournalLayout {
                stripe_unit,
                stripe_count,
                object_size,
                pool_id,
            },
            stream_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> Header {
        Header {
            magic: JOURNAL_MAGIC.to_string(),
            trimmed_pos: 0x1000,
            expire_pos: 0x2000,
            write_pos: 0x8000,
            layout: JournalLayout {
                stripe_unit: 0x1000,
                stripe_count: 1,
                object_size: 0x1000,
                pool_id: 7,
            },
            stream_id: 0x200,
        }
    }

    // ---------------------------------------------------------------
    // Round-trip
    // ---------------------------------------------------------------

    #[test]
    fn test_roundtrip() {
        let header = sample_header();
        let encoded = header.encode();
        let decoded = Header::decode(&encoded).unwrap();
        assert_eq!(header, decoded);
    }

    #[test]
    fn test_roundtrip_with_pool_layout() {
        let header = Header {
            layout: JournalLayout::with_pool(-3),
            ..sample_header()
        };
        let decoded = Header::decode(&header.encode()).unwrap();
        assert_eq!(decoded.layout.pool_id, -3);
        assert_eq!(decoded.layout.object_size as u64, DEFAULT_OBJECT_SIZE);
    }

    #[test]
    fn test_roundtrip_equal_positions() {
        // Empty journal: expire == write is legal.
        let header = Header {
            trimmed_pos: 0x4000,
            expire_pos: 0x4000,
            write_pos: 0x4000,
            ..sample_header()
        };
        let decoded = Header::decode(&header.encode()).unwrap();
        assert_eq!(decoded.expire_pos, decoded.write_pos);
    }

    #[test]
    fn test_trailing_bytes_after_payload_ignored() {
        let mut encoded = sample_header().encode().to_vec();
        encoded.extend_from_slice(&[0u8; 32]);
        let decoded = Header::decode(&encoded).unwrap();
        assert_eq!(decoded, sample_header());
    }

    // ---------------------------------------------------------------
    // Corrupt headers
    // ---------------------------------------------------------------

    #[test]
    fn test_decode_empty_is_truncated() {
        assert_eq!(Header::decode(&[]), Err(HeaderError::Truncated));
    }

    #[test]
    fn test_decode_cut_payload_is_truncated() {
        let encoded = sample_header().encode();
        let cut = &encoded[..encoded.len() - 10];
        assert_eq!(Header::decode(cut), Err(HeaderError::Truncated));
    }

    #[test]
    fn test_decode_bad_magic() {
        let header = Header {
            magic: "not a journal".to_string(),
            ..sample_header()
        };
        assert_eq!(Header::decode(&header.encode()), Err(HeaderError::BadMagic));
    }

    #[test]
    fn test_decode_non_utf8_magic() {
        let mut encoded = sample_header().encode().to_vec();
        // First magic byte sits right after the 6-byte envelope + 4-byte length.
        encoded[10] = 0xFF;
        assert_eq!(Header::decode(&encoded), Err(HeaderError::BadMagic));
    }

    #[test]
    fn test_decode_inconsistent_offsets() {
        let header = Header {
            trimmed_pos: 0x9000,
            expire_pos: 0x2000,
            write_pos: 0x8000,
            ..sample_header()
        };
        match Header::decode(&header.encode()) {
            Err(HeaderError::InconsistentOffsets { trimmed, .. }) => {
                assert_eq!(trimmed, 0x9000)
            }
            other => panic!("expected InconsistentOffsets, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_expire_past_write() {
        let header = Header {
            trimmed_pos: 0x1000,
            expire_pos: 0x9000,
            write_pos: 0x8000,
            ..sample_header()
        };
        assert!(matches!(
            Header::decode(&header.encode()),
            Err(HeaderError::InconsistentOffsets { .. })
        ));
    }

    #[test]
    fn test_decode_non_power_of_two_object_size() {
        let mut header = sample_header();
        header.layout.object_size = 0x1001;
        assert!(matches!(
            Header::decode(&header.encode()),
            Err(HeaderError::BadLayout(_))
        ));
    }

    #[test]
    fn test_decode_zero_stripe_count() {
        let mut header = sample_header();
        header.layout.stripe_count = 0;
        assert!(matches!(
            Header::decode(&header.encode()),
            Err(HeaderError::BadLayout(_))
        ));
    }

    #[test]
    fn test_decode_future_compat_rejected() {
        let mut encoded = sample_header().encode().to_vec();
        encoded[0] = 9; // struct_v
        encoded[1] = 9; // compat_v
        assert!(matches!(
            Header::decode(&encoded),
            Err(HeaderError::BadLayout(_))
        ));
    }

    // ---------------------------------------------------------------
    // Zero object size
    // ---------------------------------------------------------------

    #[test]
    fn test_zero_object_size_decodes() {
        let mut header = sample_header();
        header.layout.object_size = 0;
        let decoded = Header::decode(&header.encode()).unwrap();
        assert_eq!(decoded.layout.object_size, 0);
        assert_eq!(decoded.layout.object_size_or_default(), DEFAULT_OBJECT_SIZE);
    }

    #[test]
    fn test_nonzero_object_size_is_kept() {
        let layout = JournalLayout {
            stripe_unit: 0x1000,
            stripe_count: 1,
            object_size: 0x2000,
            pool_id: 0,
        };
        assert_eq!(layout.object_size_or_default(), 0x2000);
    }
}
