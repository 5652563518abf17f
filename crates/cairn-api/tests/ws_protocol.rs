//! End-to-end protocol tests against a live in-process hub.
//!
//! Each test binds the full router on an ephemeral port and talks to it
//! over real WebSocket connections, exactly as a browser client would.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use cairn_api::ApiState;
use cairn_core::config::HubConfig;
use cairn_core::wire::FILE_ID_LEN;
use cairn_hub::Hub;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

// ── Harness ───────────────────────────────────────────────────────────────────

struct TestHub {
    url: String,
    _dir: tempfile::TempDir,
}

async fn start_hub() -> TestHub {
    let dir = tempfile::tempdir().unwrap();
    let config = HubConfig {
        port: 0,
        public_dir: dir.path().join("public"),
        data_dir: dir.path().join("data"),
    };
    let hub = Arc::new(Hub::new(&config).unwrap());
    let state = ApiState {
        hub,
        config: Arc::new(config),
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, cairn_api::router(state)).await.unwrap();
    });

    TestHub {
        url: format!("ws://{addr}/ws"),
        _dir: dir,
    }
}

struct Client {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Client {
    async fn connect(url: &str) -> Self {
        let (ws, _) = connect_async(url).await.expect("websocket connect failed");
        Self { ws }
    }

    async fn send_json(&mut self, value: Value) {
        self.ws
            .send(Message::Text(value.to_string().into()))
            .await
            .unwrap();
    }

    async fn send_chunk(&mut self, file_id: &str, payload: &[u8]) {
        let mut frame = file_id.as_bytes().to_vec();
        frame.resize(FILE_ID_LEN, b' ');
        frame.extend_from_slice(payload);
        self.ws.send(Message::Binary(frame.into())).await.unwrap();
    }

    async fn recv_message(&mut self) -> Message {
        tokio::time::timeout(RECV_TIMEOUT, self.ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("connection closed")
            .expect("websocket error")
    }

    /// Next JSON control frame, skipping transport keepalives.
    async fn recv_json(&mut self) -> Value {
        loop {
            match self.recv_message().await {
                Message::Text(text) => return serde_json::from_str(&text).unwrap(),
                Message::Ping(_) | Message::Pong(_) => continue,
                other => panic!("expected a text frame, got {other:?}"),
            }
        }
    }

    /// Next binary frame, skipping transport keepalives.
    async fn recv_binary(&mut self) -> Vec<u8> {
        loop {
            match self.recv_message().await {
                Message::Binary(data) => return data.to_vec(),
                Message::Ping(_) | Message::Pong(_) => continue,
                other => panic!("expected a binary frame, got {other:?}"),
            }
        }
    }

    /// Assert no protocol frame arrives within `wait`.
    async fn expect_silence(&mut self, wait: Duration) {
        let deadline = tokio::time::sleep(wait);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => return,
                frame = self.ws.next() => match frame {
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                    Some(Ok(other)) => panic!("expected silence, got {other:?}"),
                    _ => return,
                }
            }
        }
    }

    async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

async fn create_session(client: &mut Client, name: &str, kind: &str) -> (String, String) {
    client
        .send_json(json!({"type": "create_session", "deviceName": name, "deviceType": kind}))
        .await;
    let frame = client.recv_json().await;
    assert_eq!(frame["type"], "session_created");
    assert_eq!(frame["connectedDevices"], 1);
    let code = frame["sessionCode"].as_str().unwrap().to_string();
    let device_id = frame["deviceId"].as_str().unwrap().to_string();
    assert_eq!(code.len(), 6);
    assert_eq!(device_id.len(), FILE_ID_LEN);
    (code, device_id)
}

async fn join_session(client: &mut Client, code: &str, name: &str, kind: &str) -> Value {
    client
        .send_json(json!({
            "type": "join_session",
            "sessionCode": code,
            "deviceName": name,
            "deviceType": kind,
        }))
        .await;
    let frame = client.recv_json().await;
    assert_eq!(frame["type"], "session_joined");
    frame
}

/// Upload `data` as a single chunk and wait for the completion ack.
/// Returns the file id.
async fn upload(client: &mut Client, name: &str, mime: &str, data: &[u8]) -> String {
    client
        .send_json(json!({
            "type": "file_start",
            "fileName": name,
            "fileSize": data.len(),
            "mimeType": mime,
        }))
        .await;
    let ack = client.recv_json().await;
    assert_eq!(ack["type"], "file_start_ack");
    assert_eq!(ack["fileName"], name);
    let file_id = ack["fileId"].as_str().unwrap().to_string();
    assert_eq!(file_id.len(), FILE_ID_LEN);

    client.send_chunk(&file_id, data).await;
    let progress = client.recv_json().await;
    assert_eq!(progress["type"], "upload_progress");
    assert_eq!(progress["progress"], 100);

    client
        .send_json(json!({"type": "file_complete", "fileId": file_id}))
        .await;
    assert_eq!(client.recv_json().await["type"], "file_complete_ack");
    file_id
}

// ── Scenarios ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_then_join_with_lowercased_code() {
    let hub = start_hub().await;
    let mut a = Client::connect(&hub.url).await;
    let (code, _) = create_session(&mut a, "Mac", "mac").await;

    let mut b = Client::connect(&hub.url).await;
    let joined = join_session(&mut b, &code.to_lowercase(), "iPhone", "iphone").await;
    assert_eq!(joined["connectedDevices"], 2);
    assert_eq!(joined["sessionCode"], code.as_str());

    let device_joined = a.recv_json().await;
    assert_eq!(device_joined["type"], "device_joined");
    assert_eq!(device_joined["deviceName"], "iPhone");
    assert_eq!(device_joined["deviceType"], "iphone");
    assert_eq!(device_joined["totalDevices"], 2);

    // No files yet: the joiner must not see an existing_files frame.
    b.expect_silence(Duration::from_millis(300)).await;
}

#[tokio::test]
async fn upload_fans_out_and_download_is_byte_exact() {
    let hub = start_hub().await;
    let mut a = Client::connect(&hub.url).await;
    let (code, _) = create_session(&mut a, "Mac", "mac").await;
    let mut b = Client::connect(&hub.url).await;
    join_session(&mut b, &code, "iPhone", "iphone").await;
    assert_eq!(a.recv_json().await["type"], "device_joined");

    let file_id = upload(&mut a, "hi.txt", "text/plain", b"hello").await;

    let new_file = b.recv_json().await;
    assert_eq!(new_file["type"], "new_file");
    assert_eq!(new_file["file"]["id"], file_id.as_str());
    assert_eq!(new_file["file"]["originalName"], "hi.txt");
    assert_eq!(new_file["file"]["size"], 5);
    assert_eq!(new_file["file"]["mimetype"], "text/plain");

    // The uploader observes the ack only — never its own new_file.
    a.expect_silence(Duration::from_millis(300)).await;

    b.send_json(json!({"type": "request_file", "fileId": file_id}))
        .await;
    let start = b.recv_json().await;
    assert_eq!(start["type"], "file_download_start");
    assert_eq!(start["fileName"], "hi.txt");
    assert_eq!(start["fileSize"], 5);
    assert_eq!(start["mimeType"], "text/plain");

    let frame = b.recv_binary().await;
    assert_eq!(&frame[..FILE_ID_LEN], file_id.as_bytes());
    assert_eq!(&frame[FILE_ID_LEN..], b"hello");

    assert_eq!(b.recv_json().await["type"], "file_download_complete");
}

#[tokio::test]
async fn unknown_session_code_leaves_connection_usable() {
    let hub = start_hub().await;
    let mut c = Client::connect(&hub.url).await;

    c.send_json(json!({
        "type": "join_session",
        "sessionCode": "ZZZZZZ",
        "deviceName": "Pixel",
        "deviceType": "android",
    }))
    .await;
    let error = c.recv_json().await;
    assert_eq!(error["type"], "session_error");
    assert!(error["error"]
        .as_str()
        .unwrap()
        .to_lowercase()
        .contains("not found"));

    // Still Unregistered, still connected: a create now succeeds.
    create_session(&mut c, "Pixel", "android").await;
}

#[tokio::test]
async fn peer_disconnect_fans_out_device_left() {
    let hub = start_hub().await;
    let mut a = Client::connect(&hub.url).await;
    let (code, _) = create_session(&mut a, "Mac", "mac").await;
    let mut b = Client::connect(&hub.url).await;
    let joined = join_session(&mut b, &code, "iPhone", "iphone").await;
    let b_id = joined["deviceId"].as_str().unwrap().to_string();
    assert_eq!(a.recv_json().await["type"], "device_joined");

    b.close().await;

    let left = a.recv_json().await;
    assert_eq!(left["type"], "device_left");
    assert_eq!(left["deviceId"], b_id.as_str());
    assert_eq!(left["totalDevices"], 1);
}

#[tokio::test]
async fn delete_notifies_all_members_and_kills_downloads() {
    let hub = start_hub().await;
    let mut a = Client::connect(&hub.url).await;
    let (code, _) = create_session(&mut a, "Mac", "mac").await;
    let mut b = Client::connect(&hub.url).await;
    join_session(&mut b, &code, "iPhone", "iphone").await;
    assert_eq!(a.recv_json().await["type"], "device_joined");

    let file_id = upload(&mut a, "hi.txt", "text/plain", b"hello").await;
    assert_eq!(b.recv_json().await["type"], "new_file");

    a.send_json(json!({"type": "delete_file", "fileId": file_id}))
        .await;

    for client in [&mut a, &mut b] {
        let removed = client.recv_json().await;
        assert_eq!(removed["type"], "file_removed");
        assert_eq!(removed["fileId"], file_id.as_str());
    }

    // A request for the deleted file yields nothing at all.
    b.send_json(json!({"type": "request_file", "fileId": file_id}))
        .await;
    b.expect_silence(Duration::from_millis(300)).await;
}

#[tokio::test]
async fn chunked_upload_reports_rising_progress() {
    let hub = start_hub().await;
    let mut a = Client::connect(&hub.url).await;
    create_session(&mut a, "Mac", "mac").await;

    a.send_json(json!({
        "type": "file_start",
        "fileName": "two.bin",
        "fileSize": 10,
        "mimeType": "application/octet-stream",
    }))
    .await;
    let file_id = a.recv_json().await["fileId"].as_str().unwrap().to_string();

    a.send_chunk(&file_id, b"hello").await;
    let first = a.recv_json().await;
    assert_eq!(first["progress"], 50);
    assert_eq!(first["received"], 5);
    assert_eq!(first["total"], 10);

    a.send_chunk(&file_id, b"world").await;
    let second = a.recv_json().await;
    assert_eq!(second["progress"], 100);
    assert_eq!(second["received"], 10);
}

#[tokio::test]
async fn late_joiner_sees_existing_files() {
    let hub = start_hub().await;
    let mut a = Client::connect(&hub.url).await;
    let (code, _) = create_session(&mut a, "Mac", "mac").await;
    let file_id = upload(&mut a, "early.txt", "text/plain", b"first!").await;

    let mut b = Client::connect(&hub.url).await;
    join_session(&mut b, &code, "iPhone", "iphone").await;

    let existing = b.recv_json().await;
    assert_eq!(existing["type"], "existing_files");
    let files = existing["files"].as_array().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0]["id"], file_id.as_str());
    assert_eq!(files[0]["originalName"], "early.txt");
}

#[tokio::test]
async fn large_download_arrives_in_order_in_fixed_chunks() {
    let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();

    let hub = start_hub().await;
    let mut a = Client::connect(&hub.url).await;
    let (code, _) = create_session(&mut a, "Mac", "mac").await;

    // Upload in four 50 KB chunks.
    a.send_json(json!({
        "type": "file_start",
        "fileName": "big.bin",
        "fileSize": data.len(),
        "mimeType": "application/octet-stream",
    }))
    .await;
    let file_id = a.recv_json().await["fileId"].as_str().unwrap().to_string();
    for chunk in data.chunks(50_000) {
        a.send_chunk(&file_id, chunk).await;
        assert_eq!(a.recv_json().await["type"], "upload_progress");
    }
    a.send_json(json!({"type": "file_complete", "fileId": file_id}))
        .await;
    assert_eq!(a.recv_json().await["type"], "file_complete_ack");

    let mut b = Client::connect(&hub.url).await;
    join_session(&mut b, &code, "windows", "windows").await;
    assert_eq!(b.recv_json().await["type"], "existing_files");

    b.send_json(json!({"type": "request_file", "fileId": file_id}))
        .await;
    assert_eq!(b.recv_json().await["type"], "file_download_start");

    let mut received = Vec::new();
    loop {
        match b.recv_message().await {
            Message::Binary(frame) => {
                assert_eq!(&frame[..FILE_ID_LEN], file_id.as_bytes());
                let payload = &frame[FILE_ID_LEN..];
                assert!(payload.len() <= 64 * 1024);
                received.extend_from_slice(payload);
            }
            Message::Text(text) => {
                let frame: Value = serde_json::from_str(&text).unwrap();
                assert_eq!(frame["type"], "file_download_complete");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame {other:?}"),
        }
    }
    assert_eq!(received, data);
}

#[tokio::test]
async fn malformed_frames_never_kill_the_connection() {
    let hub = start_hub().await;
    let mut c = Client::connect(&hub.url).await;

    c.ws.send(Message::Text("this is not json".into())).await.unwrap();
    c.send_json(json!({"type": "warp_core_breach"})).await;
    c.ws.send(Message::Binary(vec![1, 2, 3].into())).await.unwrap();

    c.send_json(json!({"type": "ping"})).await;
    assert_eq!(c.recv_json().await["type"], "pong");
}
