//! Control frames — the JSON half of the relay protocol.
//!
//! Every control frame is a JSON object with a string `type` tag. Inbound
//! frames decode into [`ClientFrame`]; anything that fails to decode
//! (bad JSON, unknown tag, missing fields) is logged and dropped by the
//! connection handler — a malformed frame never closes a connection.

use serde::{Deserialize, Serialize};

/// Platform hint supplied by the client when registering a device.
/// Unrecognized values map to `Unknown`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Iphone,
    Android,
    Mac,
    Windows,
    #[default]
    #[serde(other)]
    Unknown,
}

/// File metadata as exposed to session peers. Byte content is never
/// carried here — it is delivered only in response to `request_file`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMeta {
    pub id: String,
    pub original_name: String,
    pub size: u64,
    pub mimetype: String,
    /// Wall-clock upload time, milliseconds since the Unix epoch.
    pub uploaded_at: u64,
}

/// Frames the hub accepts from a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientFrame {
    CreateSession {
        device_name: String,
        #[serde(default)]
        device_type: DeviceKind,
    },
    JoinSession {
        session_code: String,
        device_name: String,
        #[serde(default)]
        device_type: DeviceKind,
    },
    FileStart {
        file_name: String,
        file_size: u64,
        mime_type: String,
    },
    FileComplete {
        file_id: String,
    },
    RequestFile {
        file_id: String,
    },
    DeleteFile {
        file_id: String,
    },
    Ping,
}

/// Frames the hub sends to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerFrame {
    SessionCreated {
        session_code: String,
        device_id: String,
        connected_devices: usize,
    },
    SessionJoined {
        session_code: String,
        device_id: String,
        connected_devices: usize,
    },
    SessionError {
        error: String,
    },
    DeviceJoined {
        device_id: String,
        device_name: String,
        device_type: DeviceKind,
        total_devices: usize,
    },
    DeviceLeft {
        device_id: String,
        total_devices: usize,
    },
    ExistingFiles {
        files: Vec<FileMeta>,
    },
    NewFile {
        file: FileMeta,
    },
    FileRemoved {
        file_id: String,
    },
    FileStartAck {
        file_id: String,
        file_name: String,
    },
    UploadProgress {
        file_id: String,
        /// Integer percent, `round(received / total * 100)`.
        progress: u32,
        received: u64,
        total: u64,
    },
    FileCompleteAck {
        file_id: String,
    },
    FileDownloadStart {
        file_id: String,
        file_name: String,
        file_size: u64,
        mime_type: String,
    },
    FileDownloadComplete {
        file_id: String,
    },
    Pong,
}
