//! Janitor — periodic reclamation of stale files and empty sessions.
//!
//! Two mechanisms overlap: the periodic sweep, and a one-shot check
//! scheduled when a session goes empty. Both call idempotent removals,
//! so the redundancy is harmless.

use std::sync::Arc;
use std::time::Duration;

use cairn_core::frame::ServerFrame;
use cairn_core::wire::{EMPTY_SESSION_GRACE, FILE_TTL, JANITOR_PERIOD};

use crate::broadcast;
use crate::Hub;

/// Run the sweep loop forever. Cancel by dropping the task handle.
pub async fn run(hub: Arc<Hub>) {
    let mut interval = tokio::time::interval(JANITOR_PERIOD);
    loop {
        interval.tick().await;
        sweep(&hub).await;
    }
}

/// One janitor tick at the configured TTL.
pub async fn sweep(hub: &Hub) {
    sweep_with_ttl(hub, FILE_TTL).await;
}

/// Expire files older than `ttl` (broadcasting `file_removed` for each)
/// and drop sessions that have been empty at least as long.
pub async fn sweep_with_ttl(hub: &Hub, ttl: Duration) {
    for session in hub.registry.sessions().await {
        let expired = {
            let mut state = session.state.lock().await;
            state.files.expire_older_than(ttl)
        };
        if expired.is_empty() {
            continue;
        }

        tracing::info!(code = %session.code, count = expired.len(), "expired stale files");
        for file_id in expired {
            broadcast::to_session(&session, &ServerFrame::FileRemoved { file_id }, None).await;
        }
    }

    hub.registry.remove_idle_empty(ttl).await;
}

/// Schedule the one-shot check for a session that just went empty.
pub fn schedule_empty_check(hub: Arc<Hub>, code: String) {
    tokio::spawn(async move {
        tokio::time::sleep(EMPTY_SESSION_GRACE).await;
        if hub.registry.remove_if_empty(&code).await {
            tracing::info!(code = %code, "removed session still empty after grace period");
        }
    });
}
