//! cairn-hub — the session and transfer core of the Cairn relay.
//!
//! Everything here is transport-agnostic: connections are represented by
//! their outbound queues ([`device::ConnectionSender`]), and the WebSocket
//! plumbing lives in `cairn-api`. Lock hierarchy, outermost first:
//! registry → session state → (lock-free) connection queue.

pub mod broadcast;
pub mod connection;
pub mod device;
pub mod feedback;
pub mod files;
pub mod janitor;
pub mod netinfo;
pub mod registry;
pub mod stats;

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;

use cairn_core::config::HubConfig;

pub use connection::ConnectionCtx;
pub use device::{ConnectionSender, Device, Download, Outbound};
pub use registry::SessionRegistry;

/// Whole-process hub state: the session registry plus the two JSON-backed
/// collaborators (usage counters and the feedback log).
pub struct Hub {
    pub registry: SessionRegistry,
    pub stats: stats::StatsStore,
    pub feedback: feedback::FeedbackLog,
}

impl Hub {
    pub fn new(config: &HubConfig) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.data_dir).with_context(|| {
            format!("failed to create data directory {}", config.data_dir.display())
        })?;

        Ok(Self {
            registry: SessionRegistry::new(),
            stats: stats::StatsStore::load(config.data_dir.join("stats.json")),
            feedback: feedback::FeedbackLog::new(config.data_dir.join("feedback.json")),
        })
    }
}

/// Wall-clock milliseconds since the Unix epoch.
pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
