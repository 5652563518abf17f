//! Hub configuration, resolved from the environment.
//!
//! The hub takes no CLI flags. `PORT` selects the listen port (default
//! 3000); `CAIRN_PUBLIC_DIR` and `CAIRN_DATA_DIR` relocate the static
//! asset root and the stats/feedback JSON files.

use std::path::PathBuf;

/// Default listen port when `PORT` is unset or unparseable.
pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone)]
pub struct HubConfig {
    /// TCP port for the combined HTTP + WebSocket listener. Binds 0.0.0.0.
    pub port: u16,
    /// Directory served as static assets on non-API routes.
    pub public_dir: PathBuf,
    /// Directory holding the stats counter and feedback log.
    pub data_dir: PathBuf,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            public_dir: PathBuf::from("public"),
            data_dir: PathBuf::from("data"),
        }
    }
}

impl HubConfig {
    /// Resolve configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = get("PORT") {
            match raw.parse() {
                Ok(port) => config.port = port,
                Err(_) => {
                    tracing::warn!(value = %raw, default = DEFAULT_PORT, "ignoring unparseable PORT");
                }
            }
        }
        if let Some(dir) = get("CAIRN_PUBLIC_DIR") {
            config.public_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get("CAIRN_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        config
    }
}
