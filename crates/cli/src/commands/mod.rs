pub mod ask;
pub mod chat;
pub mod config_cmd;
pub mod resume;
pub mod verify_audit;

use chatscout_config::AppConfig;
use std::path::Path;

/// Load the configuration from `path`, or from the default location.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => AppConfig::load_at(path),
        None => AppConfig::load(),
    };
    config.map_err(|e| format!("Failed to load config: {e}").into())
}
