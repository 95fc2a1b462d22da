use crate::error::App;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::fs;

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    /// Zero disables the prepare timeout.
    pub prepare_timeout_secs: u64,
    pub notification: NotificationConfig,
}

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub app_name: String,
    pub title: String,
    pub icon: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            prepare_timeout_secs: 30,
            notification: NotificationConfig::default(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            app_name: "playbridge".to_string(),
            title: "Media Playback".to_string(),
            icon: "audio-x-generic".to_string(),
        }
    }
}

impl Config {
    /// Reads the config file, falling back to defaults when it does not exist.
    pub async fn load(path: &Path) -> Result<Self, App> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, App> {
        Ok(toml::from_str(content)?)
    }

    pub fn prepare_timeout(&self) -> Option<Duration> {
        (self.prepare_timeout_secs > 0).then(|| Duration::from_secs(self.prepare_timeout_secs))
    }
}
