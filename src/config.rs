use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "config/chat.json";
pub const DEFAULT_PROFILE_PATH: &str = "config/profile.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Hub endpoint; `http(s)` is negotiated first, then upgraded to `ws(s)`.
    pub hub_url: String,
    /// Plain HTTP endpoint that accepts a posted message and fans it out.
    pub broadcast_url: String,
    /// Name of the push event carrying `(sender, body)`.
    pub event_name: String,
    pub retry_delay_secs: u64,
    pub keep_alive_secs: u64,
    pub server_timeout_secs: u64,
    pub skip_negotiation: bool,
    pub channel_capacity: usize,
    pub profile_path: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            hub_url: "https://localhost:44379/chatsocket".to_string(),
            broadcast_url: "https://localhost:44379/api/chat/send".to_string(),
            event_name: "ReceiveOne".to_string(),
            retry_delay_secs: 5,
            keep_alive_secs: 15,
            server_timeout_secs: 30,
            skip_negotiation: false,
            channel_capacity: 256,
            profile_path: DEFAULT_PROFILE_PATH.to_string(),
        }
    }
}

impl AppConfig {
    /// Never below one second, so a hub that keeps refusing cannot spin the
    /// connection loop.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs.max(1))
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs.max(1))
    }

    pub fn server_timeout(&self) -> Duration {
        Duration::from_secs(self.server_timeout_secs.max(1))
    }
}

pub fn load_config(path: &str) -> AppConfig {
    let path = Path::new(path);
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Failed to parse config file {}: {err}", path.display());
                AppConfig::default()
            }
        },
        Err(err) => {
            log::info!(
                "Config file {} not found ({err}); using defaults",
                path.display()
            );
            AppConfig::default()
        }
    }
}
