//! Event Framer
//!
//! Resumable state machine that turns a reassembled journal byte stream into
//! decoded events, surviving corruption by resynchronising on the frame
//! sentinel.
//!
//! ## Model
//!
//! The framer owns an append-only rolling buffer plus a `cursor`: the stream
//! offset of the buffer's first byte. The scanner feeds it object contents
//! and calls [`step()`](EventFramer::step) until it answers
//! [`Step::NeedMore`].
//!
//! Two states:
//!
//! - **InFrame**: a frame is expected exactly at the cursor. The sentinel
//!   and length are peeked without consuming; the frame is consumed only
//!   once its trailing `start_ptr` matches the cursor *and* its payload
//!   decodes. Any mismatch opens a gap.
//! - **Resync**: scanning forward, byte by byte, for the next sentinel.
//!   A candidate only closes the gap if the frame at it carries a
//!   `start_ptr` equal to the candidate's own stream offset; that
//!   cross-check is what rejects coincidental sentinel bit patterns in the
//!   middle of corrupted data.
//!
//! ## Rejected frames
//!
//! A frame whose `start_ptr` or payload is wrong advances the cursor by
//! exactly one byte, so the sentinel search re-examines the rejected frame's
//! own bytes. The buffer and cursor always stay in exact correspondence.
//!
//! ## Bounds
//!
//! The framer knows the journal's write position and treats any frame that
//! would extend past it as corruption immediately, instead of waiting
//! forever for bytes that cannot exist. It also enforces a maximum frame
//! length (the scanner uses twice the object size), which bounds the
//! rolling buffer: a corrupted length field cannot make the framer buffer
//! an arbitrarily large stretch of journal.

use std::sync::Arc;

use bytes::{Buf, BytesMut};
use tracing::{debug, trace};

use scour_core::{EventDecoder, LogEvent, FRAME_HEADER_LEN, FRAME_OVERHEAD, FRAME_SENTINEL};

/// What one `step()` produced.
#[derive(Debug)]
pub enum Step {
    /// Not enough buffered bytes to make progress; feed more data.
    NeedMore,
    /// A frame decoded cleanly at `offset`.
    Event { offset: u64, event: LogEvent },
    /// Corruption detected at `offset`; the framer is now resynchronising.
    GapStart { offset: u64 },
    /// A frame at `offset` carried a mismatched start pointer or an
    /// undecodable payload; the framer is now resynchronising.
    BadFrame { offset: u64 },
    /// A sentinel candidate validated at `resume`; the gap
    /// `[gap_start, resume)` is closed.
    GapEnd { gap_start: u64, resume: u64 },
}

enum State {
    InFrame,
    Resync { gap_start: u64 },
}

pub struct EventFramer {
    decoder: Arc<dyn EventDecoder>,
    buf: BytesMut,
    /// Stream offset of `buf[0]`.
    cursor: u64,
    /// One past the last stream offset that can hold journal data.
    limit: u64,
    /// Longest frame accepted; bounds the rolling buffer.
    max_frame: usize,
    state: State,
}

impl EventFramer {
    /// Framer positioned at `start`, bounded by the journal's write position
    /// and a maximum accepted frame length.
    pub fn new(decoder: Arc<dyn EventDecoder>, start: u64, limit: u64, max_frame: usize) -> Self {
        Self {
            decoder,
            buf: BytesMut::new(),
            cursor: start,
            limit,
            max_frame,
            state: State::InFrame,
        }
    }

    /// Stream offset of the next unexamined byte.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Start of the open gap, if resynchronising.
    pub fn open_gap(&self) -> Option<u64> {
        match self.state {
            State::Resync { gap_start } => Some(gap_start),
            State::InFrame => None,
        }
    }

    /// Append stream bytes continuing at `cursor + buffered()`.
    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Skip a region that can never be read (a missing or truncated object):
    /// discard the buffer, move the cursor to `resume`, and resynchronise.
    /// The gap starts at the current cursor unless one is already open.
    pub fn enter_gap(&mut self, resume: u64) {
        let gap_start = match self.state {
            State::Resync { gap_start } => gap_start,
            State::InFrame => self.cursor,
        };
        debug!(
            gap_start = format_args!("{gap_start:#x}"),
            resume = format_args!("{resume:#x}"),
            "skipping unreadable region"
        );
        self.buf.clear();
        self.cursor = resume;
        self.state = State::Resync { gap_start };
    }

    /// Advance the state machine by at most one event or transition.
    pub fn step(&mut self) -> Step {
        match self.state {
            State::InFrame => self.step_in_frame(),
            State::Resync { gap_start } => self.step_resync(gap_start),
        }
    }

    fn step_in_frame(&mut self) -> Step {
        if self.buf.len() < FRAME_HEADER_LEN {
            return Step::NeedMore;
        }
        let mut peek = &self.buf[..];
        let sentinel = peek.get_u64_le();
        let payload_len = peek.get_u32_le() as usize;
        let offset = self.cursor;

        if sentinel != FRAME_SENTINEL {
            debug!(offset = format_args!("{offset:#x}"), "invalid sentinel");
            self.state = State::Resync { gap_start: offset };
            return Step::GapStart { offset };
        }

        let total = FRAME_OVERHEAD + payload_len;
        if total > self.max_frame || offset + total as u64 > self.limit {
            debug!(
                offset = format_args!("{offset:#x}"),
                payload_len, "frame length cannot be real"
            );
            self.state = State::Resync { gap_start: offset };
            return Step::GapStart { offset };
        }
        if self.buf.len() < total {
            return Step::NeedMore;
        }

        let mut trailer = &self.buf[FRAME_HEADER_LEN + payload_len..total];
        let start_ptr = trailer.get_u64_le();
        if start_ptr != offset {
            debug!(
                offset = format_args!("{offset:#x}"),
                start_ptr = format_args!("{start_ptr:#x}"),
                "frame start pointer mismatch"
            );
            return self.reject_frame(offset);
        }

        match self
            .decoder
            .decode(&self.buf[FRAME_HEADER_LEN..FRAME_HEADER_LEN + payload_len])
        {
            Ok(event) => {
                self.buf.advance(total);
                self.cursor += total as u64;
                trace!(
                    offset = format_args!("{offset:#x}"),
                    tag = %event.type_tag,
                    "valid event"
                );
                Step::Event { offset, event }
            }
            Err(err) => {
                debug!(
                    offset = format_args!("{offset:#x}"),
                    error = %err,
                    "payload decode failed"
                );
                self.reject_frame(offset)
            }
        }
    }

    /// Advance one byte past a rejected frame so the sentinel search
    /// re-examines the frame's own bytes.
    fn reject_frame(&mut self, offset: u64) -> Step {
        self.buf.advance(1);
        self.cursor += 1;
        self.state = State::Resync { gap_start: offset };
        Step::BadFrame { offset }
    }

    fn step_resync(&mut self, gap_start: u64) -> Step {
        let sentinel_bytes = FRAME_SENTINEL.to_le_bytes();
        loop {
            match self
                .buf
                .windows(sentinel_bytes.len())
                .position(|w| w == sentinel_bytes)
            {
                Some(idx) => {
                    if idx > 0 {
                        self.buf.advance(idx);
                        self.cursor += idx as u64;
                    }
                    // Candidate sentinel at the cursor; validate with the
                    // frame's start pointer before trusting it.
                    if self.buf.len() < FRAME_HEADER_LEN {
                        return Step::NeedMore;
                    }
                    let mut peek = &self.buf[8..FRAME_HEADER_LEN];
                    let payload_len = peek.get_u32_le() as usize;
                    let total = FRAME_OVERHEAD + payload_len;
                    if total > self.max_frame || self.cursor + total as u64 > self.limit {
                        // Cannot be a real frame; step past this candidate.
                        self.buf.advance(1);
                        self.cursor += 1;
                        continue;
                    }
                    if self.buf.len() < total {
                        return Step::NeedMore;
                    }
                    let mut trailer = &self.buf[FRAME_HEADER_LEN + payload_len..total];
                    let start_ptr = trailer.get_u64_le();
                    if start_ptr == self.cursor {
                        let resume = self.cursor;
                        debug!(
                            gap_start = format_args!("{gap_start:#x}"),
                            resume = format_args!("{resume:#x}"),
                            "resynchronised on sentinel"
                        );
                        self.state = State::InFrame;
                        return Step::GapEnd { gap_start, resume };
                    }
                    // Coincidental sentinel bit pattern; keep searching.
                    trace!(
                        candidate = format_args!("{:#x}", self.cursor),
                        start_ptr = format_args!("{start_ptr:#x}"),
                        "rejecting sentinel candidate"
                    );
                    self.buf.advance(1);
                    self.cursor += 1;
                }
                None => {
                    // Keep a sentinel-sized tail in case the pattern
                    // straddles the next append.
                    let keep = sentinel_bytes.len() - 1;
                    if self.buf.len() > keep {
                        let discard = self.buf.len() - keep;
                        self.buf.advance(discard);
                        self.cursor += discard as u64;
                    }
                    return Step::NeedMore;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};
    use scour_core::event::{encode_event_payload, encode_update_payload, EVENT_SESSION};
    use scour_core::{encode_frame, MdsEventDecoder};

    fn framer(start: u64, limit: u64) -> EventFramer {
        EventFramer::new(Arc::new(MdsEventDecoder), start, limit, 1 << 20)
    }

    fn session_frame(start: u64, body: &[u8]) -> Vec<u8> {
        encode_frame(start, &encode_event_payload(EVENT_SESSION, body)).to_vec()
    }

    /// Drain the framer, collecting every step until NeedMore.
    fn drain(framer: &mut EventFramer) -> Vec<Step> {
        let mut steps = Vec::new();
        loop {
            match framer.step() {
                Step::NeedMore => return steps,
                step => steps.push(step),
            }
        }
    }

    // ---------------------------------------------------------------
    // Clean parsing
    // ---------------------------------------------------------------

    #[test]
    fn test_single_frame() {
        let bytes = session_frame(0x1000, b"client.1");
        let mut framer = framer(0x1000, 0x1000 + bytes.len() as u64);
        framer.feed(&bytes);

        let steps = drain(&mut framer);
        assert_eq!(steps.len(), 1);
        match &steps[0] {
            Step::Event { offset, event } => {
                assert_eq!(*offset, 0x1000);
                assert_eq!(event.type_tag, "session");
            }
            other => panic!("expected Event, got {other:?}"),
        }
        assert_eq!(framer.cursor(), 0x1000 + bytes.len() as u64);
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn test_split_delivery_needs_more() {
        let bytes = session_frame(0, b"client.2");
        let mut framer = framer(0, bytes.len() as u64);

        framer.feed(&bytes[..5]);
        assert!(matches!(framer.step(), Step::NeedMore));

        framer.feed(&bytes[5..15]);
        assert!(matches!(framer.step(), Step::NeedMore));

        framer.feed(&bytes[15..]);
        match framer.step() {
            Step::Event { offset, .. } => assert_eq!(offset, 0),
            other => panic!("expected Event, got {other:?}"),
        }
    }

    #[test]
    fn test_back_to_back_frames() {
        let first = session_frame(0, b"a");
        let second = session_frame(first.len() as u64, b"bb");
        let mut stream = first.clone();
        stream.extend_from_slice(&second);

        let mut framer = framer(0, stream.len() as u64);
        framer.feed(&stream);
        let steps = drain(&mut framer);
        let offsets: Vec<u64> = steps
            .iter()
            .map(|s| match s {
                Step::Event { offset, .. } => *offset,
                other => panic!("expected Event, got {other:?}"),
            })
            .collect();
        assert_eq!(offsets, vec![0, first.len() as u64]);
    }

    #[test]
    fn test_sentinel_pattern_inside_payload_is_not_examined() {
        // A valid frame whose payload embeds the sentinel bit pattern; the
        // length prefix must carry parsing straight over it.
        let mut body = BytesMut::new();
        body.put_u64_le(FRAME_SENTINEL);
        body.put_u64_le(FRAME_SENTINEL);
        let first = session_frame(0, &body);
        let second = session_frame(first.len() as u64, b"after");
        let mut stream = first.clone();
        stream.extend_from_slice(&second);

        let mut framer = framer(0, stream.len() as u64);
        framer.feed(&stream);
        let steps = drain(&mut framer);
        assert_eq!(steps.len(), 2);
        assert!(matches!(steps[0], Step::Event { offset: 0, .. }));
        assert!(matches!(steps[1], Step::Event { offset, .. } if offset == first.len() as u64));
    }

    // ---------------------------------------------------------------
    // Corruption and resync
    // ---------------------------------------------------------------

    #[test]
    fn test_invalid_sentinel_opens_gap_and_resyncs() {
        let garbage = vec![0xCCu8; 64];
        let frame = session_frame(64, b"recovered");
        let mut stream = garbage;
        stream.extend_from_slice(&frame);

        let mut framer = framer(0, stream.len() as u64);
        framer.feed(&stream);
        let steps = drain(&mut framer);

        assert!(matches!(steps[0], Step::GapStart { offset: 0 }));
        assert!(matches!(
            steps[1],
            Step::GapEnd { gap_start: 0, resume: 64 }
        ));
        assert!(matches!(steps[2], Step::Event { offset: 64, .. }));
    }

    #[test]
    fn test_start_ptr_mismatch_is_bad_frame() {
        // Frame claims it was written at 0x9999 but sits at 0.
        let bytes = session_frame(0x9999, b"misplaced");
        let mut framer = framer(0, bytes.len() as u64);
        framer.feed(&bytes);

        let steps = drain(&mut framer);
        assert!(matches!(steps[0], Step::BadFrame { offset: 0 }));
        assert!(framer.open_gap() == Some(0));
        // One-byte advance: the rejected frame's bytes stay searchable.
        assert_eq!(framer.cursor(), stream_cursor_after_reject(&bytes));
    }

    fn stream_cursor_after_reject(bytes: &[u8]) -> u64 {
        // After rejecting at offset 0 the cursor is 1, then the sentinel
        // search discards everything but a 7-byte tail (no sentinel at any
        // later position in a single frame).
        (bytes.len() - 7) as u64
    }

    #[test]
    fn test_undecodable_payload_is_bad_frame() {
        // Valid framing around a payload with an unknown event type.
        let frame = encode_frame(0, &encode_event_payload(0xDEAD, b"x"));
        let next = session_frame(frame.len() as u64, b"ok");
        let mut stream = frame.to_vec();
        stream.extend_from_slice(&next);

        let mut framer = framer(0, stream.len() as u64);
        framer.feed(&stream);
        let steps = drain(&mut framer);

        assert!(matches!(steps[0], Step::BadFrame { offset: 0 }));
        assert!(matches!(
            steps[1],
            Step::GapEnd { gap_start: 0, resume } if resume == frame.len() as u64
        ));
        assert!(matches!(steps[2], Step::Event { .. }));
    }

    #[test]
    fn test_resync_rejects_candidate_with_wrong_start_ptr() {
        // Garbage, then a sentinel whose frame lies about its position, then
        // a genuine frame. The false candidate must not close the gap.
        let garbage = vec![0xEEu8; 32];
        let liar = session_frame(0x4444, b"liar");
        let genuine_at = (32 + liar.len()) as u64;
        let genuine = session_frame(genuine_at, b"genuine");

        let mut stream = garbage;
        stream.extend_from_slice(&liar);
        stream.extend_from_slice(&genuine);

        let mut framer = framer(0, stream.len() as u64);
        framer.feed(&stream);
        let steps = drain(&mut framer);

        assert!(matches!(steps[0], Step::GapStart { offset: 0 }));
        assert!(matches!(
            steps[1],
            Step::GapEnd { gap_start: 0, resume } if resume == genuine_at
        ));
        assert!(matches!(steps[2], Step::Event { offset, .. } if offset == genuine_at));
    }

    #[test]
    fn test_corrupted_payload_then_recovery() {
        // Three frames; the middle one's path bytes are stomped with 0xFF,
        // which fails UTF-8 validation in the decoder.
        let f1 = encode_frame(0, &encode_update_payload("/a/b", 1, 2)).to_vec();
        let f2_at = f1.len() as u64;
        let mut f2 = encode_frame(f2_at, &encode_update_payload("/c/d", 3, 4)).to_vec();
        let f3_at = f2_at + f2.len() as u64;
        let f3 = encode_frame(f3_at, &encode_update_payload("/e/f", 5, 6)).to_vec();
        // Stomp the path bytes (frame header 12 + type 4 + len 4 = byte 20).
        f2[20] = 0xFF;
        f2[21] = 0xFF;

        let mut stream = f1.clone();
        stream.extend_from_slice(&f2);
        stream.extend_from_slice(&f3);

        let mut framer = framer(0, stream.len() as u64);
        framer.feed(&stream);
        let steps = drain(&mut framer);

        assert!(matches!(steps[0], Step::Event { offset: 0, .. }));
        assert!(matches!(steps[1], Step::BadFrame { offset } if offset == f2_at));
        assert!(
            matches!(steps[2], Step::GapEnd { gap_start, resume } if gap_start == f2_at && resume == f3_at)
        );
        assert!(matches!(steps[3], Step::Event { offset, .. } if offset == f3_at));
    }

    #[test]
    fn test_frame_past_limit_opens_gap() {
        // Valid sentinel but a length that runs past the write position.
        let mut bytes = BytesMut::new();
        bytes.put_u64_le(FRAME_SENTINEL);
        bytes.put_u32_le(0x0100_0000);
        bytes.put_slice(&[0u8; 32]);

        let mut framer = framer(0, 64);
        framer.feed(&bytes);
        let steps = drain(&mut framer);
        assert!(matches!(steps[0], Step::GapStart { offset: 0 }));
    }

    #[test]
    fn test_frame_over_max_length_opens_gap() {
        // Within the journal's range, but longer than any frame the framer
        // is willing to buffer.
        let mut bytes = BytesMut::new();
        bytes.put_u64_le(FRAME_SENTINEL);
        bytes.put_u32_le(0x400);
        bytes.put_slice(&[0u8; 32]);

        let mut framer = EventFramer::new(Arc::new(MdsEventDecoder), 0, 1 << 30, 256);
        framer.feed(&bytes);
        let steps = drain(&mut framer);
        assert!(matches!(steps[0], Step::GapStart { offset: 0 }));
        // The search does not stall on the oversized candidate.
        assert!(framer.open_gap() == Some(0));
    }

    // ---------------------------------------------------------------
    // Explicit gaps (missing objects)
    // ---------------------------------------------------------------

    #[test]
    fn test_enter_gap_then_resync() {
        let frame = session_frame(0x2000, b"after hole");
        let mut framer = framer(0x1000, 0x2000 + frame.len() as u64);

        // Scanner found object(s) covering [0x1000, 0x2000) missing.
        framer.enter_gap(0x2000);
        assert_eq!(framer.cursor(), 0x2000);
        assert_eq!(framer.open_gap(), Some(0x1000));

        framer.feed(&frame);
        let steps = drain(&mut framer);
        assert!(matches!(
            steps[0],
            Step::GapEnd { gap_start: 0x1000, resume: 0x2000 }
        ));
        assert!(matches!(steps[1], Step::Event { offset: 0x2000, .. }));
    }

    #[test]
    fn test_enter_gap_preserves_existing_gap_start() {
        let mut framer = framer(0x1000, 0x10000);
        framer.feed(&[0u8; 16]); // garbage opens a gap at 0x1000
        assert!(matches!(framer.step(), Step::GapStart { offset: 0x1000 }));
        let _ = framer.step(); // sentinel search consumes garbage

        framer.enter_gap(0x3000);
        assert_eq!(framer.open_gap(), Some(0x1000));
        assert_eq!(framer.cursor(), 0x3000);
    }

    #[test]
    fn test_enter_gap_discards_partial_frame() {
        let frame = session_frame(0x1000, b"straddles the hole");
        let mut framer = framer(0x1000, 0x10000);
        // Only half the frame arrived before the hole.
        framer.feed(&frame[..10]);
        assert!(matches!(framer.step(), Step::NeedMore));

        framer.enter_gap(0x2000);
        assert_eq!(framer.buffered(), 0);
        // The gap starts at the partial frame, not at the hole.
        assert_eq!(framer.open_gap(), Some(0x1000));
    }
}
