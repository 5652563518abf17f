//! cairn-api — the HTTP + WebSocket facade.
//!
//! One listener serves three things on the same origin and port: the
//! WebSocket relay endpoint at `/ws`, the read-only JSON API under
//! `/api`, and static assets for everything else.

pub mod handlers;
pub mod ws;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

pub use handlers::ApiState;

/// Build the full application router.
pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/qrcode", get(handlers::handle_qrcode))
        .route("/info", get(handlers::handle_info))
        .route("/stats", get(handlers::handle_stats))
        .route("/feedback", post(handlers::handle_feedback));

    Router::new()
        .route("/ws", get(ws::handle_upgrade))
        .nest("/api", api_routes)
        .fallback_service(ServeDir::new(&state.config.public_dir))
        .layer(cors)
        .with_state(state)
}

/// Bind `0.0.0.0:<config.port>` and serve until the task is cancelled.
pub async fn serve(state: ApiState) -> anyhow::Result<()> {
    let port = state.config.port;
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "hub listening on 0.0.0.0");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
