//! Append-only feedback log, persisted as a JSON array.
//!
//! File I/O goes through `tokio::fs`; the read-modify-write of the log
//! file is serialised by an async mutex held across the await points.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum FeedbackError {
    #[error("rating {0} is outside 1..=5")]
    InvalidRating(u8),
    #[error("failed to persist feedback: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub rating: u8,
    pub feedback: String,
    /// Milliseconds since the Unix epoch.
    pub at: u64,
}

pub struct FeedbackLog {
    path: PathBuf,
    // Serialises the read-modify-write of the log file.
    write_lock: Mutex<()>,
}

impl FeedbackLog {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    /// Validate and append one feedback entry.
    pub async fn record(&self, rating: u8, feedback: &str) -> Result<(), FeedbackError> {
        if !(1..=5).contains(&rating) {
            return Err(FeedbackError::InvalidRating(rating));
        }

        let _guard = self.write_lock.lock().await;
        let mut entries = self.read_entries().await;
        entries.push(FeedbackEntry {
            rating,
            feedback: feedback.to_string(),
            at: crate::unix_millis(),
        });

        let text = serde_json::to_string_pretty(&entries)
            .expect("feedback entries always serialise");
        tokio::fs::write(&self.path, text).await?;
        Ok(())
    }

    /// All recorded entries, oldest first.
    pub async fn entries(&self) -> Vec<FeedbackEntry> {
        let _guard = self.write_lock.lock().await;
        self.read_entries().await
    }

    async fn read_entries(&self) -> Vec<FeedbackEntry> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                tracing::warn!(path = %self.path.display(), error = %e, "unparseable feedback log, starting fresh");
                Vec::new()
            }),
            Err(_) => Vec::new(),
        }
    }
}
