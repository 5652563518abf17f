//! Usage counters persisted to a small JSON file.
//!
//! The counters are advisory — the hub never reads them for decisions —
//! so persistence failures are logged and swallowed. Writes go through
//! `tokio::fs` so no connection task ever blocks on disk.

use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatsSnapshot {
    /// Devices that have registered into a session, ever.
    pub total_users: u64,
    /// Sessions created, ever.
    pub total_sessions: u64,
}

pub struct StatsStore {
    path: PathBuf,
    counters: Mutex<StatsSnapshot>,
}

impl StatsStore {
    /// Load counters from `path`, starting from zero when the file is
    /// missing or unreadable. Runs at startup, before any traffic.
    pub fn load(path: PathBuf) -> Self {
        let counters = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "unparseable stats file, starting fresh");
                    StatsSnapshot::default()
                }
            },
            Err(_) => StatsSnapshot::default(),
        };
        Self {
            path,
            counters: Mutex::new(counters),
        }
    }

    pub async fn record_user(&self) {
        let snapshot = {
            let mut counters = self.counters.lock().expect("stats lock poisoned");
            counters.total_users += 1;
            *counters
        };
        self.persist(snapshot).await;
    }

    pub async fn record_session(&self) {
        let snapshot = {
            let mut counters = self.counters.lock().expect("stats lock poisoned");
            counters.total_sessions += 1;
            *counters
        };
        self.persist(snapshot).await;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        *self.counters.lock().expect("stats lock poisoned")
    }

    async fn persist(&self, snapshot: StatsSnapshot) {
        let text = match serde_json::to_string_pretty(&snapshot) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialise stats");
                return;
            }
        };
        if let Err(e) = tokio::fs::write(&self.path, text).await {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to persist stats");
        }
    }
}
