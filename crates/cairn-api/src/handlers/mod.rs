//! HTTP API handlers — read-only hub state as JSON, plus feedback intake.

pub mod info;
pub mod stats;

use std::sync::Arc;

use cairn_core::config::HubConfig;
use cairn_hub::Hub;

#[derive(Clone)]
pub struct ApiState {
    pub hub: Arc<Hub>,
    pub config: Arc<HubConfig>,
}

pub use info::{handle_info, handle_qrcode};
pub use stats::{handle_feedback, handle_stats};
