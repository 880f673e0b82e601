//! Annex-B access-unit reframing
//!
//! The capture process emits one continuous H.264 byte stream on its stdout.
//! Access units inside it are delimited by start codes, which come in a
//! 3-byte (`00 00 01`) and a 4-byte (`00 00 00 01`) form. This module splits
//! that stream back into discrete units so each can be handed to the media
//! transport as one timed sample.
//!
//! The boundary search itself is a pure function of (buffer, end-of-stream
//! flag), so the splitting logic unit-tests without any process or network
//! dependency. [`AccessUnitReader`] is the async driver that feeds it from an
//! `AsyncRead` and normalizes every emitted unit to the canonical 4-byte
//! start code, which is what sample-based receivers expect.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// 3-byte Annex-B start code.
pub const START_CODE_3: [u8; 3] = [0x00, 0x00, 0x01];

/// 4-byte Annex-B start code, the canonical form emitted by this module.
pub const START_CODE_4: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// Hard cap on a single access unit. A malformed stream with no start codes
/// would otherwise buffer without bound; past this size the whole buffer is
/// force-emitted as one unit.
pub const DEFAULT_MAX_UNIT_LEN: usize = 2 * 1024 * 1024;

const READ_CHUNK: usize = 64 * 1024;

/// Outcome of one boundary scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSplit {
    /// No complete unit in the buffer yet; more input is required.
    NeedMore,
    /// A complete unit occupies the first `len` bytes of the buffer.
    Unit { len: usize },
}

/// Locate the next access-unit boundary in `buf`.
///
/// If the buffer begins with a start code the search skips past it, so the
/// reported boundary is the start of the *next* unit rather than the leading
/// marker. A boundary sitting at a 4-byte start code is placed before its
/// extra leading zero so the unit does not absorb it.
///
/// With no boundary in sight the caller is asked for more input, unless the
/// stream ended (trailing bytes become the final unit) or the buffer exceeds
/// `max_unit_len` (the whole buffer is emitted, trading exactness for
/// liveness on malformed input).
pub fn split_unit(buf: &[u8], at_eof: bool, max_unit_len: usize) -> FrameSplit {
    if buf.is_empty() {
        return FrameSplit::NeedMore;
    }

    let search_from = if buf.starts_with(&START_CODE_4) {
        4
    } else if buf.starts_with(&START_CODE_3) {
        3
    } else {
        1
    };

    if let Some(pos) = find_start_code(&buf[search_from..]) {
        let mut boundary = search_from + pos;
        // A 4-byte start code is found through its embedded 3-byte form;
        // back up so its leading zero belongs to the next unit.
        if boundary > search_from && buf[boundary - 1] == 0x00 {
            boundary -= 1;
        }
        return FrameSplit::Unit { len: boundary };
    }

    if at_eof || buf.len() > max_unit_len {
        return FrameSplit::Unit { len: buf.len() };
    }

    FrameSplit::NeedMore
}

fn find_start_code(buf: &[u8]) -> Option<usize> {
    buf.windows(START_CODE_3.len()).position(|w| w == START_CODE_3)
}

/// Rewrite a raw unit with the canonical 4-byte start code.
///
/// Units whose payload after the start code is empty carry no data (bare
/// markers, stray zeros) and are reported as `None` so callers can drop them.
pub fn normalize_unit(raw: &[u8]) -> Option<Bytes> {
    let payload = if raw.starts_with(&START_CODE_4) {
        &raw[START_CODE_4.len()..]
    } else if raw.starts_with(&START_CODE_3) {
        &raw[START_CODE_3.len()..]
    } else {
        raw
    };

    if payload.is_empty() {
        return None;
    }

    let mut out = BytesMut::with_capacity(START_CODE_4.len() + payload.len());
    out.put_slice(&START_CODE_4);
    out.put_slice(payload);
    Some(out.freeze())
}

/// Incremental access-unit reader over any byte source.
///
/// Repeatedly buffers input and applies [`split_unit`] until a unit is
/// available, the way the delivery pump consumes the capture process stdout.
pub struct AccessUnitReader<R> {
    src: R,
    buf: BytesMut,
    max_unit_len: usize,
    at_eof: bool,
}

impl<R: AsyncRead + Unpin> AccessUnitReader<R> {
    pub fn new(src: R) -> Self {
        Self::with_max_unit_len(src, DEFAULT_MAX_UNIT_LEN)
    }

    pub fn with_max_unit_len(src: R, max_unit_len: usize) -> Self {
        Self {
            src,
            buf: BytesMut::with_capacity(READ_CHUNK),
            max_unit_len,
            at_eof: false,
        }
    }

    /// Next normalized access unit, or `None` once the source is drained.
    ///
    /// Sub-minimum units are skipped silently. A zero-length final flush is
    /// a no-op.
    pub async fn next_unit(&mut self) -> std::io::Result<Option<Bytes>> {
        loop {
            match split_unit(&self.buf, self.at_eof, self.max_unit_len) {
                FrameSplit::Unit { len } => {
                    let raw = self.buf.split_to(len);
                    if let Some(unit) = normalize_unit(&raw) {
                        return Ok(Some(unit));
                    }
                }
                FrameSplit::NeedMore if self.at_eof => return Ok(None),
                FrameSplit::NeedMore => {
                    self.buf.reserve(READ_CHUNK);
                    let n = self.src.read_buf(&mut self.buf).await?;
                    if n == 0 {
                        self.at_eof = true;
                    }
                }
            }
        }
    }
}
