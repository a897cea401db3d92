//! Event Frame Wire Format
//!
//! Every log event is framed on disk as:
//!
//! ```text
//! ┌──────────────┬─────────────────┬─────────────────┬───────────────┐
//! │ sentinel (8) │ payload_len (4) │ payload (N)     │ start_ptr (8) │
//! └──────────────┴─────────────────┴─────────────────┴───────────────┘
//! ```
//!
//! All integers little-endian. `start_ptr` repeats the stream offset at
//! which the frame's sentinel was written; a reader resynchronising after
//! corruption uses the sentinel to find a candidate frame and the
//! `start_ptr` cross-check to reject coincidental sentinel bit patterns.

use bytes::{BufMut, Bytes, BytesMut};

/// Fixed bit pattern opening every frame.
pub const FRAME_SENTINEL: u64 = 0x3141_5926_5358_9793;

/// Bytes of sentinel plus payload-length prefix.
pub const FRAME_HEADER_LEN: usize = 8 + 4;

/// Bytes of the trailing start pointer.
pub const FRAME_TRAILER_LEN: usize = 8;

/// Fixed bytes wrapped around every payload.
pub const FRAME_OVERHEAD: usize = FRAME_HEADER_LEN + FRAME_TRAILER_LEN;

/// Encode one frame written at stream offset `start`.
pub fn encode_frame(start: u64, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(FRAME_OVERHEAD + payload.len());
    buf.put_u64_le(FRAME_SENTINEL);
    buf.put_u32_le(payload.len() as u32);
    buf.put_slice(payload);
    buf.put_u64_le(start);
    buf.freeze()
}
