//! cairnd — the Cairn LAN file-relay hub.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use cairn_api::ApiState;
use cairn_core::config::HubConfig;
use cairn_hub::{janitor, Hub};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = HubConfig::from_env();
    tracing::info!(
        port = config.port,
        public_dir = %config.public_dir.display(),
        data_dir = %config.data_dir.display(),
        "cairnd starting"
    );

    let hub = Arc::new(Hub::new(&config).context("failed to initialise hub state")?);
    let janitor_task = tokio::spawn(janitor::run(hub.clone()));

    let state = ApiState {
        hub,
        config: Arc::new(config),
    };

    tokio::select! {
        result = cairn_api::serve(state) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
        }
    }

    janitor_task.abort();
    Ok(())
}
