//! Session registry — the authoritative map of live sessions, plus the
//! device→session index kept in lockstep with membership.
//!
//! One mutex guards the session map and the index together so create,
//! join, and leave update both atomically. Each session carries its own
//! mutex for membership and files. Registry lock is always taken before
//! a session lock, never the other way around.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use cairn_core::frame::FileMeta;
use cairn_core::ids;

use crate::device::Device;
use crate::files::FileStore;

/// One live session: a code, its members, and its buffered files.
#[derive(Debug)]
pub struct Session {
    pub code: String,
    pub created_at: u64,
    pub state: Mutex<SessionState>,
}

/// Interior session state, guarded by [`Session::state`].
#[derive(Debug)]
pub struct SessionState {
    /// Members in join order, keyed by device id.
    pub devices: Vec<Device>,
    pub files: FileStore,
    /// Set when the last member leaves; cleared on join. Read by the
    /// janitor and the one-shot empty check.
    pub empty_since: Option<Instant>,
}

impl SessionState {
    fn device_index(&self, device_id: &str) -> Option<usize> {
        self.devices.iter().position(|d| d.id == device_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    #[error("session {0} not found")]
    NotFound(String),
    #[error("device {0} already belongs to a session")]
    AlreadyInSession(String),
}

/// Result of a successful join, captured under the locks so the caller
/// can reply and broadcast without re-acquiring them.
#[derive(Debug)]
pub struct JoinOutcome {
    pub session: Arc<Session>,
    /// Member count including the new device.
    pub connected: usize,
    /// Metadata of files already completed in the session.
    pub existing: Vec<FileMeta>,
}

/// Result of removing a device from its session.
pub struct LeaveOutcome {
    pub session: Arc<Session>,
    /// Members remaining after the departure.
    pub remaining: usize,
}

struct RegistryInner {
    sessions: HashMap<String, Arc<Session>>,
    /// device id → session code. Derived from membership; must agree with
    /// it at all times.
    index: HashMap<String, String>,
}

pub struct SessionRegistry {
    inner: Mutex<RegistryInner>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                sessions: HashMap::new(),
                index: HashMap::new(),
            }),
        }
    }

    /// Create a session with `device` as its first member. The code is
    /// minted here and re-minted until it is unique among live sessions.
    pub async fn create(&self, device: Device) -> Arc<Session> {
        let mut inner = self.inner.lock().await;

        let code = loop {
            let candidate = ids::session_code();
            if !inner.sessions.contains_key(&candidate) {
                break candidate;
            }
        };

        let session = Arc::new(Session {
            code: code.clone(),
            created_at: crate::unix_millis(),
            state: Mutex::new(SessionState {
                devices: vec![device.clone()],
                files: FileStore::new(),
                empty_since: None,
            }),
        });

        inner.index.insert(device.id, code.clone());
        inner.sessions.insert(code, session.clone());
        session
    }

    /// Add `device` to the session with the given code. Codes match
    /// case-insensitively. A missing code is an error the caller reports
    /// to the client; it never tears the connection down.
    pub async fn join(&self, code: &str, device: Device) -> Result<JoinOutcome, JoinError> {
        let code = code.trim().to_ascii_uppercase();
        let mut inner = self.inner.lock().await;

        if inner.index.contains_key(&device.id) {
            return Err(JoinError::AlreadyInSession(device.id));
        }
        let Some(session) = inner.sessions.get(&code).cloned() else {
            return Err(JoinError::NotFound(code));
        };

        let (connected, existing) = {
            let mut state = session.state.lock().await;
            state.empty_since = None;
            state.devices.push(device.clone());
            (state.devices.len(), state.files.metas())
        };
        inner.index.insert(device.id, code);

        Ok(JoinOutcome {
            session,
            connected,
            existing,
        })
    }

    /// Remove a device from its session, if it has one. An emptied
    /// session is only marked — deletion is the janitor's job.
    pub async fn leave(&self, device_id: &str) -> Option<LeaveOutcome> {
        let mut inner = self.inner.lock().await;
        let code = inner.index.remove(device_id)?;
        let session = inner.sessions.get(&code).cloned()?;

        let remaining = {
            let mut state = session.state.lock().await;
            if let Some(at) = state.device_index(device_id) {
                state.devices.remove(at);
            }
            if state.devices.is_empty() {
                state.empty_since = Some(Instant::now());
            }
            state.devices.len()
        };

        Some(LeaveOutcome { session, remaining })
    }

    /// Session a device currently belongs to.
    pub async fn lookup(&self, device_id: &str) -> Option<Arc<Session>> {
        let inner = self.inner.lock().await;
        let code = inner.index.get(device_id)?;
        inner.sessions.get(code).cloned()
    }

    /// Delete a session if it is still empty. Idempotent.
    pub async fn remove_if_empty(&self, code: &str) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(session) = inner.sessions.get(code).cloned() else {
            return false;
        };
        let empty = session.state.lock().await.devices.is_empty();
        if empty {
            inner.sessions.remove(code);
        }
        empty
    }

    /// Delete every session that has been empty for at least `min_empty`.
    /// Returns how many were removed.
    pub async fn remove_idle_empty(&self, min_empty: Duration) -> usize {
        let mut inner = self.inner.lock().await;

        let mut stale = Vec::new();
        for (code, session) in inner.sessions.iter() {
            let state = session.state.lock().await;
            if let Some(since) = state.empty_since {
                if state.devices.is_empty() && since.elapsed() >= min_empty {
                    stale.push(code.clone());
                }
            }
        }
        for code in &stale {
            inner.sessions.remove(code);
            tracing::info!(code = %code, "removed idle empty session");
        }
        stale.len()
    }

    /// Snapshot of every live session, for janitor sweeps.
    pub async fn sessions(&self) -> Vec<Arc<Session>> {
        self.inner.lock().await.sessions.values().cloned().collect()
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.inner.lock().await.sessions.len()
    }

    /// Number of connected devices across all sessions.
    pub async fn device_count(&self) -> usize {
        self.inner.lock().await.index.len()
    }

    /// Test hook: pretend a session emptied `age` ago.
    #[cfg(test)]
    pub(crate) async fn backdate_empty(&self, code: &str, age: Duration) {
        let inner = self.inner.lock().await;
        if let Some(session) = inner.sessions.get(code) {
            session.state.lock().await.empty_since = Some(Instant::now() - age);
        }
    }
}
