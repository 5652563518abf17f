//! Per-connection protocol state machine.
//!
//! A connection starts `Unregistered` (device id assigned, no session),
//! moves to `InSession` on a successful create or join, and ends `Closed`
//! when the transport drops. Frames that are not valid in the current
//! state are ignored — a misbehaving client never gets disconnected, it
//! just gets no reply.

use std::sync::Arc;

use bytes::Bytes;

use cairn_core::frame::{ClientFrame, DeviceKind, ServerFrame};
use cairn_core::wire;

use crate::broadcast;
use crate::device::{ConnectionSender, Device, Download, Outbound};
use crate::janitor;
use crate::registry::{JoinError, Session};
use crate::Hub;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnState {
    /// Connection open, no session yet. Accepts create, join, and ping.
    Unregistered,
    /// Bound to the session with this code; full protocol available.
    InSession(String),
    /// Transport gone; the device has been removed from its session.
    Closed,
}

pub struct ConnectionCtx {
    pub device_id: String,
    sender: ConnectionSender,
    state: ConnState,
}

impl ConnectionCtx {
    /// Allocate a fresh device id for a new connection.
    pub fn new(sender: ConnectionSender) -> Self {
        Self {
            device_id: cairn_core::ids::device_id(),
            sender,
            state: ConnState::Unregistered,
        }
    }

    pub fn state(&self) -> &ConnState {
        &self.state
    }

    /// Dispatch one inbound control frame.
    pub async fn handle_control(&mut self, hub: &Arc<Hub>, frame: ClientFrame) {
        if self.state == ConnState::Closed {
            return;
        }

        match frame {
            ClientFrame::Ping => self.reply(&ServerFrame::Pong),
            ClientFrame::CreateSession {
                device_name,
                device_type,
            } => self.create_session(hub, device_name, device_type).await,
            ClientFrame::JoinSession {
                session_code,
                device_name,
                device_type,
            } => {
                self.join_session(hub, session_code, device_name, device_type)
                    .await
            }
            ClientFrame::FileStart {
                file_name,
                file_size,
                mime_type,
            } => self.file_start(hub, file_name, file_size, mime_type).await,
            ClientFrame::FileComplete { file_id } => self.file_complete(hub, file_id).await,
            ClientFrame::RequestFile { file_id } => self.request_file(hub, file_id).await,
            ClientFrame::DeleteFile { file_id } => self.delete_file(hub, file_id).await,
        }
    }

    /// Dispatch one inbound binary frame (an upload chunk).
    pub async fn handle_data(&mut self, hub: &Arc<Hub>, frame: Bytes) {
        let Some(session) = self.session(hub).await else {
            return;
        };

        let file_id = match wire::split_data_frame(&frame) {
            Ok((id, _)) => id.to_string(),
            Err(e) => {
                tracing::debug!(device = %self.device_id, error = %e, "ignoring malformed data frame");
                return;
            }
        };
        let payload = frame.slice(wire::FILE_ID_LEN..);

        let progress = {
            let mut state = session.state.lock().await;
            state.files.append(&file_id, payload)
        };
        match progress {
            Some(p) => self.reply(&ServerFrame::UploadProgress {
                file_id,
                progress: p.percent,
                received: p.received,
                total: p.total,
            }),
            None => {
                tracing::debug!(device = %self.device_id, file_id, "dropped chunk for unknown or full file");
            }
        }
    }

    /// The transport closed. Remove the device from its session and tell
    /// the peers. Safe to call more than once.
    pub async fn closed(&mut self, hub: &Arc<Hub>) {
        let was_in_session = matches!(self.state, ConnState::InSession(_));
        self.state = ConnState::Closed;
        if !was_in_session {
            return;
        }

        if let Some(outcome) = hub.registry.leave(&self.device_id).await {
            broadcast::to_session(
                &outcome.session,
                &ServerFrame::DeviceLeft {
                    device_id: self.device_id.clone(),
                    total_devices: outcome.remaining,
                },
                None,
            )
            .await;
            tracing::info!(
                code = %outcome.session.code,
                device = %self.device_id,
                remaining = outcome.remaining,
                "device left session"
            );
            if outcome.remaining == 0 {
                janitor::schedule_empty_check(hub.clone(), outcome.session.code.clone());
            }
        }
    }

    // ── Handlers ──────────────────────────────────────────────────────────────

    async fn create_session(&mut self, hub: &Arc<Hub>, name: String, kind: DeviceKind) {
        if self.state != ConnState::Unregistered {
            tracing::debug!(device = %self.device_id, "create_session while already in a session, ignoring");
            return;
        }

        let device = Device::new(self.device_id.clone(), name, kind, self.sender.clone());
        let session = hub.registry.create(device).await;
        hub.stats.record_session().await;
        hub.stats.record_user().await;

        self.state = ConnState::InSession(session.code.clone());
        self.reply(&ServerFrame::SessionCreated {
            session_code: session.code.clone(),
            device_id: self.device_id.clone(),
            connected_devices: 1,
        });
        tracing::info!(code = %session.code, device = %self.device_id, "session created");
    }

    async fn join_session(
        &mut self,
        hub: &Arc<Hub>,
        session_code: String,
        name: String,
        kind: DeviceKind,
    ) {
        if self.state != ConnState::Unregistered {
            tracing::debug!(device = %self.device_id, "join_session while already in a session, ignoring");
            return;
        }

        let device = Device::new(self.device_id.clone(), name, kind, self.sender.clone());
        let device_name = device.name.clone();

        match hub.registry.join(&session_code, device).await {
            Ok(outcome) => {
                hub.stats.record_user().await;
                self.state = ConnState::InSession(outcome.session.code.clone());

                self.reply(&ServerFrame::SessionJoined {
                    session_code: outcome.session.code.clone(),
                    device_id: self.device_id.clone(),
                    connected_devices: outcome.connected,
                });
                if !outcome.existing.is_empty() {
                    self.reply(&ServerFrame::ExistingFiles {
                        files: outcome.existing,
                    });
                }
                broadcast::to_session(
                    &outcome.session,
                    &ServerFrame::DeviceJoined {
                        device_id: self.device_id.clone(),
                        device_name,
                        device_type: kind,
                        total_devices: outcome.connected,
                    },
                    Some(&self.device_id),
                )
                .await;
                tracing::info!(
                    code = %outcome.session.code,
                    device = %self.device_id,
                    members = outcome.connected,
                    "device joined session"
                );
            }
            Err(JoinError::NotFound(code)) => {
                tracing::debug!(device = %self.device_id, code = %code, "join of unknown session");
                self.reply(&ServerFrame::SessionError {
                    error: "Session not found. Check the code and try again.".to_string(),
                });
            }
            Err(JoinError::AlreadyInSession(_)) => {
                tracing::debug!(device = %self.device_id, "device already indexed, ignoring join");
            }
        }
    }

    async fn file_start(&mut self, hub: &Arc<Hub>, name: String, size: u64, mimetype: String) {
        let Some(session) = self.session(hub).await else {
            return;
        };

        let file_id = {
            let mut state = session.state.lock().await;
            state
                .files
                .begin(&self.device_id, name.clone(), size, mimetype)
        };
        tracing::debug!(
            code = %session.code,
            file = %file_id,
            name = %name,
            size,
            "upload started"
        );
        self.reply(&ServerFrame::FileStartAck {
            file_id,
            file_name: name,
        });
    }

    async fn file_complete(&mut self, hub: &Arc<Hub>, file_id: String) {
        let Some(session) = self.session(hub).await else {
            return;
        };

        let meta = {
            let mut state = session.state.lock().await;
            state.files.complete(&file_id)
        };
        // Unknown id or size mismatch: no ack, the janitor reclaims it.
        let Some(meta) = meta else {
            return;
        };

        broadcast::to_session(
            &session,
            &ServerFrame::NewFile { file: meta.clone() },
            Some(&self.device_id),
        )
        .await;
        self.reply(&ServerFrame::FileCompleteAck {
            file_id: meta.id.clone(),
        });
        tracing::info!(code = %session.code, file = %meta.id, size = meta.size, "file complete");
    }

    async fn request_file(&mut self, hub: &Arc<Hub>, file_id: String) {
        let Some(session) = self.session(hub).await else {
            return;
        };

        let found = {
            let state = session.state.lock().await;
            state.files.get_complete(&file_id)
        };
        let Some((meta, body)) = found else {
            tracing::debug!(device = %self.device_id, file_id, "request for unknown file");
            return;
        };

        let start = serde_json::to_string(&ServerFrame::FileDownloadStart {
            file_id: meta.id.clone(),
            file_name: meta.original_name.clone(),
            file_size: meta.size,
            mime_type: meta.mimetype.clone(),
        });
        let complete = serde_json::to_string(&ServerFrame::FileDownloadComplete {
            file_id: meta.id.clone(),
        });
        let (Ok(start), Ok(complete)) = (start, complete) else {
            tracing::warn!(file = %meta.id, "failed to serialise download frames");
            return;
        };

        // The whole download travels as one queue item; the writer task
        // streams it so nothing can interleave on this connection.
        let _ = self.sender.send(Outbound::Download(Download {
            file_id: meta.id,
            start: Arc::new(start),
            body,
            complete: Arc::new(complete),
        }));
    }

    async fn delete_file(&mut self, hub: &Arc<Hub>, file_id: String) {
        let Some(session) = self.session(hub).await else {
            return;
        };

        let removed = {
            let mut state = session.state.lock().await;
            state.files.remove(&file_id)
        };
        if removed {
            broadcast::to_session(&session, &ServerFrame::FileRemoved { file_id: file_id.clone() }, None)
                .await;
            tracing::info!(code = %session.code, file = %file_id, "file deleted");
        }
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    /// The session this connection is bound to, or `None` (logged) when
    /// the frame arrived in a state that has no session.
    async fn session(&self, hub: &Hub) -> Option<Arc<Session>> {
        match &self.state {
            ConnState::InSession(_) => hub.registry.lookup(&self.device_id).await,
            _ => {
                tracing::debug!(device = %self.device_id, "frame requires a session, ignoring");
                None
            }
        }
    }

    fn reply(&self, frame: &ServerFrame) {
        match serde_json::to_string(frame) {
            Ok(json) => {
                if self.sender.send(Outbound::Control(Arc::new(json))).is_err() {
                    tracing::debug!(device = %self.device_id, "reply dropped, connection writer gone");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialise reply"),
        }
    }
}
