//! Settings file management

use std::time::Duration;

use openapi_client::Environment;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::ConsoleError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Console settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines
    #[serde(default)]
    pub json_logs: bool,

    /// Backend configuration
    #[serde(default)]
    pub backend: BackendSettings,

    /// Prepare status polling interval in milliseconds
    #[serde(default = "default_prepare_poll_interval")]
    pub prepare_poll_interval_ms: u64,

    /// Monitor summary polling interval in milliseconds
    #[serde(default = "default_monitor_poll_interval")]
    pub monitor_poll_interval_ms: u64,

    /// Environment preselected on the deploy stage
    #[serde(default)]
    pub default_environment: Environment,
}

fn default_prepare_poll_interval() -> u64 {
    2_000
}

fn default_monitor_poll_interval() -> u64 {
    5_000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Warn,
            json_logs: false,
            backend: BackendSettings::default(),
            prepare_poll_interval_ms: default_prepare_poll_interval(),
            monitor_poll_interval_ms: default_monitor_poll_interval(),
            default_environment: Environment::Dev,
        }
    }
}

impl Settings {
    pub fn prepare_poll_interval(&self) -> Duration {
        Duration::from_millis(self.prepare_poll_interval_ms)
    }

    pub fn monitor_poll_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_poll_interval_ms)
    }

    /// Reject values the pollers cannot run with
    pub fn validate(&self) -> Result<(), ConsoleError> {
        if self.backend.base_url.trim().is_empty() {
            return Err(ConsoleError::ConfigError(
                "backend.base_url must not be empty".to_string(),
            ));
        }
        if self.prepare_poll_interval_ms == 0 || self.monitor_poll_interval_ms == 0 {
            return Err(ConsoleError::ConfigError(
                "poll intervals must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Backend API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    /// Base URL for the control-plane API
    #[serde(default = "default_backend_url")]
    pub base_url: String,

    /// Bearer token sent with every request
    #[serde(default, skip_serializing)]
    pub api_token: Option<SecretString>,
}

fn default_backend_url() -> String {
    "http://localhost:8000/api".to_string()
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            api_token: None,
        }
    }
}

/// Load settings, writing the defaults on first use
pub async fn load_or_init(settings_file: &File) -> Result<Settings, ConsoleError> {
    if !settings_file.exists().await {
        let settings = Settings::default();
        info!(
            "No settings found, writing defaults to {}",
            settings_file.path().display()
        );
        settings_file.write_json(&settings).await?;
        return Ok(settings);
    }

    let settings: Settings = settings_file.read_json().await?;
    settings.validate()?;
    Ok(settings)
}
