//! Cairn wire format — the binary data-frame layout and protocol constants.
//!
//! Control traffic is JSON (see [`crate::frame`]); file bytes travel in
//! binary frames whose layout is fixed:
//!
//! ```text
//! offset 0..36   36 ASCII bytes — file id, right-padded with 0x20
//! offset 36..    raw file bytes
//! ```
//!
//! The prefix width is a wire-format commitment. Senders emit exactly
//! [`FILE_ID_LEN`] bytes; receivers strip trailing spaces before matching
//! against a file id. Padding is space (0x20), never NUL.

use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Width of the file-id prefix on every binary frame.
/// A hyphenated UUID renders to exactly this many bytes.
pub const FILE_ID_LEN: usize = 36;

/// Payload size of hub→client download frames. The last frame of a file
/// may be shorter. Uploaders may use any chunk size up to the frame cap.
pub const DOWNLOAD_CHUNK: usize = 64 * 1024;

/// Per-frame cap enforced at the WebSocket layer. There is no hub-wide
/// quota; buffered files must fit in memory.
pub const MAX_FRAME_BYTES: usize = 100 * 1024 * 1024;

/// Maximum age of a buffered file, and of an idle empty session.
pub const FILE_TTL: Duration = Duration::from_secs(30 * 60);

/// Interval between janitor sweeps.
pub const JANITOR_PERIOD: Duration = Duration::from_secs(5 * 60);

/// Delay before the one-shot check that reaps a session which just
/// went empty. Redundant with the periodic sweep; removal is idempotent.
pub const EMPTY_SESSION_GRACE: Duration = Duration::from_secs(5 * 60);

/// Interval between WebSocket protocol pings sent on every connection.
pub const KEEPALIVE_PERIOD: Duration = Duration::from_secs(30);

/// Device display names are truncated to this many characters on ingest.
pub const MAX_DEVICE_NAME: usize = 64;

// ── Data frames ───────────────────────────────────────────────────────────────

/// Encode a binary data frame: 36-byte space-padded file id, then payload.
pub fn encode_data_frame(file_id: &str, payload: &[u8]) -> Result<Bytes, FrameError> {
    if file_id.len() > FILE_ID_LEN {
        return Err(FrameError::IdTooLong(file_id.len()));
    }

    let mut buf = BytesMut::with_capacity(FILE_ID_LEN + payload.len());
    buf.put_slice(file_id.as_bytes());
    buf.put_bytes(b' ', FILE_ID_LEN - file_id.len());
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Split a binary data frame into its file id and payload.
///
/// The returned id has trailing padding spaces stripped. The payload slice
/// borrows from the input; callers that need ownership should slice the
/// original buffer at [`FILE_ID_LEN`].
pub fn split_data_frame(frame: &[u8]) -> Result<(&str, &[u8]), FrameError> {
    if frame.len() < FILE_ID_LEN {
        return Err(FrameError::Truncated(frame.len()));
    }

    let id = std::str::from_utf8(&frame[..FILE_ID_LEN]).map_err(|_| FrameError::InvalidId)?;
    Ok((id.trim_end_matches(' '), &frame[FILE_ID_LEN..]))
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting wire-format data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("file id is {0} bytes, wider than the {FILE_ID_LEN}-byte prefix")]
    IdTooLong(usize),

    #[error("data frame is {0} bytes, shorter than the {FILE_ID_LEN}-byte prefix")]
    Truncated(usize),

    #[error("file id prefix is not valid UTF-8")]
    InvalidId,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
