//! Runtime configuration
//!
//! Configuration can be built from defaults, from `MINDPAUSE_*` environment
//! variables, or from a JSON/TOML file (format chosen by extension).
//!
//! ## Environment Variables
//! - `MINDPAUSE_API_BASE_URL`: backend base URL (required for env loading)
//! - `MINDPAUSE_SOCKET_URL`: realtime socket base URL (defaults to the API URL)
//! - `MINDPAUSE_SYNC_INTERVAL_SECS`: sync interval in seconds
//! - `MINDPAUSE_REQUEST_TIMEOUT_SECS`: HTTP timeout in seconds
//! - `MINDPAUSE_LOCK_EVENT`: socket event carrying lock commands
//! - `MINDPAUSE_RECONNECT_DELAY_SECS`: delay before reconnecting the socket

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PauseError;

/// Production cadence for the core sync
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 15 * 60;

/// Cadence of the dense wellbeing-refresh preset
pub const WELLBEING_REFRESH_INTERVAL_SECS: u64 = 60;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

pub const DEFAULT_LOCK_EVENT: &str = "lock_device";

/// Query parameter that carries the local user identifier
pub const DEFAULT_USER_QUERY_KEY: &str = "clerkId";

/// Android channel used for escalation reminders
pub const DEFAULT_NOTIFICATION_CHANNEL: &str = "mindpause-alerts";

/// Deep-link route attached to escalation reminders
pub const DEFAULT_NOTIFICATION_ROUTE: &str = "/(tabs)/wellbeing";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PauseConfig {
    pub api: ApiConfig,
    pub sync: SyncConfig,
    pub realtime: RealtimeConfig,
    pub notifications: NotificationConfig,
}

/// Backend metrics API settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub user_query_key: String,
}

/// Sync loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub interval_secs: u64,
    /// Also post the per-app usage snapshot when the source provides one
    pub report_usage: bool,
}

/// Realtime socket settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Falls back to `api.base_url` when unset
    pub socket_url: Option<String>,
    pub lock_event: String,
    pub reconnect_delay_secs: u64,
}

/// Local notification settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub channel_id: String,
    pub channel_name: String,
    pub route: String,
}

impl Default for PauseConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            sync: SyncConfig::default(),
            realtime: RealtimeConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            user_query_key: DEFAULT_USER_QUERY_KEY.to_string(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            report_usage: true,
        }
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            socket_url: None,
            lock_event: DEFAULT_LOCK_EVENT.to_string(),
            reconnect_delay_secs: 5,
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            channel_id: DEFAULT_NOTIFICATION_CHANNEL.to_string(),
            channel_name: "Pausas saludables".to_string(),
            route: DEFAULT_NOTIFICATION_ROUTE.to_string(),
        }
    }
}

impl SyncConfig {
    /// Dense one-minute preset used by the wellbeing screen
    pub fn wellbeing_refresh() -> Self {
        Self {
            interval_secs: WELLBEING_REFRESH_INTERVAL_SECS,
            ..Self::default()
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

impl RealtimeConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

impl PauseConfig {
    /// Socket base URL, falling back to the API base URL
    pub fn socket_base_url(&self) -> &str {
        self.realtime
            .socket_url
            .as_deref()
            .unwrap_or(&self.api.base_url)
    }

    /// Load from environment variables
    ///
    /// `MINDPAUSE_API_BASE_URL` is required; everything else falls back to
    /// defaults.
    pub fn from_env() -> Result<Self, PauseError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, PauseError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        config.api.base_url = lookup("MINDPAUSE_API_BASE_URL")
            .ok_or_else(|| PauseError::Config("MINDPAUSE_API_BASE_URL is not set".to_string()))?;

        if let Some(url) = lookup("MINDPAUSE_SOCKET_URL") {
            config.realtime.socket_url = Some(url);
        }
        if let Some(raw) = lookup("MINDPAUSE_SYNC_INTERVAL_SECS") {
            config.sync.interval_secs = parse_secs("MINDPAUSE_SYNC_INTERVAL_SECS", &raw)?;
        }
        if let Some(raw) = lookup("MINDPAUSE_REQUEST_TIMEOUT_SECS") {
            config.api.request_timeout_secs = parse_secs("MINDPAUSE_REQUEST_TIMEOUT_SECS", &raw)?;
        }
        if let Some(event) = lookup("MINDPAUSE_LOCK_EVENT") {
            config.realtime.lock_event = event;
        }
        if let Some(raw) = lookup("MINDPAUSE_RECONNECT_DELAY_SECS") {
            config.realtime.reconnect_delay_secs =
                parse_secs("MINDPAUSE_RECONNECT_DELAY_SECS", &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load from a `.json` or `.toml` file
    pub fn from_file(path: &Path) -> Result<Self, PauseError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PauseError::Config(format!("cannot read {}: {}", path.display(), e)))?;

        let config: PauseConfig = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::from_str(&content)
                .map_err(|e| PauseError::Config(format!("invalid TOML: {e}")))?,
            Some("json") => serde_json::from_str(&content)?,
            other => {
                return Err(PauseError::Config(format!(
                    "unsupported config format: {}",
                    other.unwrap_or("<none>")
                )))
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<(), PauseError> {
        url::Url::parse(&self.api.base_url)
            .map_err(|e| PauseError::Config(format!("invalid api.base_url: {e}")))?;
        if let Some(socket) = &self.realtime.socket_url {
            url::Url::parse(socket)
                .map_err(|e| PauseError::Config(format!("invalid realtime.socket_url: {e}")))?;
        }
        if self.sync.interval_secs == 0 {
            return Err(PauseError::Config("sync.interval_secs must be positive".to_string()));
        }
        if self.realtime.lock_event.is_empty() {
            return Err(PauseError::Config("realtime.lock_event is empty".to_string()));
        }
        Ok(())
    }
}

fn parse_secs(key: &str, raw: &str) -> Result<u64, PauseError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|e| PauseError::Config(format!("invalid {key}: {e}")))
}
