//! /api/info and /api/qrcode — connection details for onboarding.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use cairn_hub::netinfo;

use super::ApiState;

// ── /api/info ─────────────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoResponse {
    pub ip: String,
    pub port: u16,
    pub url: String,
    pub connected_devices: usize,
}

pub async fn handle_info(State(state): State<ApiState>) -> Json<InfoResponse> {
    let ip = netinfo::local_ipv4().to_string();
    let port = state.config.port;
    Json(InfoResponse {
        url: format!("http://{ip}:{port}"),
        ip,
        port,
        connected_devices: state.hub.registry.device_count().await,
    })
}

// ── /api/qrcode ───────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct QrQuery {
    pub session: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QrResponse {
    pub qr_code: String,
    pub url: String,
    pub ip: String,
}

pub async fn handle_qrcode(
    State(state): State<ApiState>,
    Query(query): Query<QrQuery>,
) -> Result<Json<QrResponse>, (StatusCode, String)> {
    let ip = netinfo::local_ipv4().to_string();
    let url = join_url(&ip, state.config.port, query.session.as_deref());

    let qr_code = qr_data_url(&url).map_err(|e| {
        tracing::error!(error = %e, "QR render failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "QR render failed".to_string())
    })?;

    Ok(Json(QrResponse { qr_code, url, ip }))
}

/// The URL a phone lands on when it scans the code. An explicit session
/// code pre-fills the join form.
fn join_url(ip: &str, port: u16, session: Option<&str>) -> String {
    match session {
        Some(code) => format!("http://{ip}:{port}/?session={}", code.trim().to_ascii_uppercase()),
        None => format!("http://{ip}:{port}"),
    }
}

/// Render `content` as a QR code and pack it into a PNG data URL.
fn qr_data_url(content: &str) -> anyhow::Result<String> {
    let code = qrcode::QrCode::new(content.as_bytes())?;
    let png = code
        .render::<image::Luma<u8>>()
        .min_dimensions(240, 240)
        .build();

    let mut buf = Vec::new();
    image::DynamicImage::ImageLuma8(png)
        .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)?;

    Ok(format!("data:image/png;base64,{}", BASE64.encode(buf)))
}
