//! Devices and their outbound queues.
//!
//! Each connection owns exactly one writer task draining an unbounded
//! channel of [`Outbound`] items. Routing every hub→client frame through
//! that single queue is what serialises writes per connection; a download
//! travels as one queue item so its many data frames can never interleave
//! with frames from other senders.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use cairn_core::frame::{DeviceKind, ServerFrame};
use cairn_core::wire::MAX_DEVICE_NAME;

/// Handle for pushing frames to one connection. Cloned wherever a frame
/// producer needs to reach that client.
pub type ConnectionSender = mpsc::UnboundedSender<Outbound>;

/// One item on a connection's outbound queue.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// A pre-serialised JSON control frame. Broadcasts serialise once and
    /// share the allocation across all recipients.
    Control(Arc<String>),
    /// A full file download, streamed by the writer task.
    Download(Download),
}

/// A complete file queued for streaming to one client: the bracketing
/// control frames plus the immutable body to be chunked on the wire.
#[derive(Debug, Clone)]
pub struct Download {
    pub file_id: String,
    pub start: Arc<String>,
    pub body: Bytes,
    pub complete: Arc<String>,
}

/// One live connection with a display name and platform hint. Exists for
/// the lifetime of its connection; belongs to at most one session.
#[derive(Debug, Clone)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub kind: DeviceKind,
    pub connected_at: u64,
    pub sender: ConnectionSender,
}

impl Device {
    pub fn new(id: String, name: String, kind: DeviceKind, sender: ConnectionSender) -> Self {
        let mut name = name;
        if name.len() > MAX_DEVICE_NAME {
            let mut end = MAX_DEVICE_NAME;
            while !name.is_char_boundary(end) {
                end -= 1;
            }
            name.truncate(end);
        }
        Self {
            id,
            name,
            kind,
            connected_at: crate::unix_millis(),
            sender,
        }
    }

    /// Serialise and enqueue a control frame for this device.
    /// Returns false if the connection's writer is gone.
    pub fn send_frame(&self, frame: &ServerFrame) -> bool {
        match serde_json::to_string(frame) {
            Ok(json) => self.sender.send(Outbound::Control(Arc::new(json))).is_ok(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialise control frame");
                false
            }
        }
    }
}
