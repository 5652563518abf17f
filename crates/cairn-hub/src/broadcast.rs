//! Broadcast fan-out — one serialisation, many recipients.
//!
//! The member list is snapshotted under the session lock and the sends
//! happen after it is released, so no lock is ever held across delivery.
//! Enqueueing to a dead connection is logged and skipped; the failed
//! peer is reaped by its own close path, never by the broadcaster.

use std::sync::Arc;

use cairn_core::frame::ServerFrame;

use crate::device::{ConnectionSender, Outbound};
use crate::registry::Session;

/// A snapshot of one recipient: enough to address and deliver.
#[derive(Clone)]
pub struct Recipient {
    pub device_id: String,
    pub sender: ConnectionSender,
}

/// Deliver `frame` to every recipient except `exclude`, serialising it
/// exactly once. Returns the number of successful enqueues.
pub fn fan_out(recipients: &[Recipient], frame: &ServerFrame, exclude: Option<&str>) -> usize {
    let json = match serde_json::to_string(frame) {
        Ok(json) => Arc::new(json),
        Err(e) => {
            tracing::warn!(error = %e, "failed to serialise broadcast frame");
            return 0;
        }
    };

    let mut delivered = 0;
    for recipient in recipients {
        if exclude == Some(recipient.device_id.as_str()) {
            continue;
        }
        if recipient.sender.send(Outbound::Control(json.clone())).is_ok() {
            delivered += 1;
        } else {
            tracing::debug!(device = %recipient.device_id, "skipping broadcast to closed connection");
        }
    }
    delivered
}

/// Snapshot a session's members and fan `frame` out to them.
pub async fn to_session(session: &Session, frame: &ServerFrame, exclude: Option<&str>) -> usize {
    let recipients = snapshot(session).await;
    fan_out(&recipients, frame, exclude)
}

/// Capture `(device id, sender)` pairs under the session lock.
pub async fn snapshot(session: &Session) -> Vec<Recipient> {
    session
        .state
        .lock()
        .await
        .devices
        .iter()
        .map(|d| Recipient {
            device_id: d.id.clone(),
            sender: d.sender.clone(),
        })
        .collect()
}
