//! Remote avatar settings.
//!
//! The application API stores the admin-selected voice and persona. Fetching
//! them is best effort: every failure degrades to the built-in defaults.

use crate::config::SettingsEndpointConfig;
use ong_types::AvatarSettings;
use std::time::Duration;
use tracing::{info, warn};

pub const SETTINGS_PATH: &str = "/api/avatar/settings";

/// Client for `GET {base}/api/avatar/settings`.
#[derive(Debug, Clone)]
pub struct SettingsClient {
    http: reqwest::Client,
    url: String,
    timeout: Duration,
}

fn build_http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent("OngAvatarAgent/1.0 (settings)")
        .build()
        .unwrap_or_default()
}

impl SettingsClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            http: build_http_client(timeout),
            url: format!("{}{}", base_url.trim_end_matches('/'), SETTINGS_PATH),
            timeout,
        }
    }

    pub fn from_config(config: &SettingsEndpointConfig) -> Self {
        Self::new(&config.api_base_url, config.timeout())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetches the settings, returning the defaults on any failure.
    ///
    /// Never fails and never waits longer than the configured timeout.
    pub async fn fetch(&self) -> AvatarSettings {
        match tokio::time::timeout(self.timeout, self.try_fetch()).await {
            Ok(Ok(settings)) => {
                info!(voice = %settings.voice, "fetched avatar settings");
                settings
            }
            Ok(Err(reason)) => {
                warn!(url = %self.url, "failed to fetch avatar settings: {}", reason);
                AvatarSettings::default()
            }
            Err(_) => {
                warn!(
                    url = %self.url,
                    timeout_secs = self.timeout.as_secs_f32(),
                    "avatar settings request timed out"
                );
                AvatarSettings::default()
            }
        }
    }

    async fn try_fetch(&self) -> Result<AvatarSettings, String> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| format!("request error: {}", e))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(format!("HTTP {}", status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| format!("body read error: {}", e))?;
        AvatarSettings::from_json(&body).map_err(|e| format!("invalid settings body: {}", e))
    }
}

/// One-shot helper: fetches the settings from `base_url` within `timeout`.
pub async fn fetch_remote_settings(base_url: &str, timeout: Duration) -> AvatarSettings {
    SettingsClient::new(base_url, timeout).fetch().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_without_double_slash() {
        let client = SettingsClient::new("http://localhost:5000/", Duration::from_secs(5));
        assert_eq!(client.url(), "http://localhost:5000/api/avatar/settings");
    }

    #[test]
    fn url_from_default_config() {
        let client = SettingsClient::from_config(&SettingsEndpointConfig::default());
        assert_eq!(client.url(), "http://localhost:5000/api/avatar/settings");
    }
}
