use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

fn default_token_ttl_seconds() -> u64 {
    3600
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LiveKitConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default, skip_serializing)]
    pub api_secret: String,
    /// JWT token TTL in seconds for LiveKit join tokens. Default: 3600 (1 hour).
    #[serde(default = "default_token_ttl_seconds")]
    pub token_ttl_seconds: u64,
}

impl Default for LiveKitConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            token_ttl_seconds: default_token_ttl_seconds(),
        }
    }
}

impl fmt::Debug for LiveKitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveKitConfig")
            .field("url", &self.url)
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .field("token_ttl_seconds", &self.token_ttl_seconds)
            .finish()
    }
}

impl LiveKitConfig {
    pub fn new(
        url: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            token_ttl_seconds: default_token_ttl_seconds(),
        }
    }
}

fn default_settings_base_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_settings_timeout_secs() -> u64 {
    5
}

/// Where the avatar settings live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsEndpointConfig {
    /// Base URL of the application API; `/api/avatar/settings` is appended.
    #[serde(default = "default_settings_base_url")]
    pub api_base_url: String,
    /// Total request budget in seconds.
    #[serde(default = "default_settings_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SettingsEndpointConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_settings_base_url(),
            timeout_secs: default_settings_timeout_secs(),
        }
    }
}

impl SettingsEndpointConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_avatar_api_url() -> String {
    "https://api.simli.ai".to_string()
}

fn default_max_session_length_secs() -> u64 {
    3600
}

fn default_max_idle_time_secs() -> u64 {
    300
}

fn default_avatar_participant_name() -> String {
    "Ong".to_string()
}

/// Avatar rendering service settings.
///
/// The session and idle ceilings are enforced by the remote service, which
/// removes the avatar participant on its own once either is exceeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvatarServiceConfig {
    #[serde(default = "default_avatar_api_url")]
    pub api_url: String,
    #[serde(default = "default_max_session_length_secs")]
    pub max_session_length_secs: u64,
    #[serde(default = "default_max_idle_time_secs")]
    pub max_idle_time_secs: u64,
    /// Display name of the avatar participant in the room.
    #[serde(default = "default_avatar_participant_name")]
    pub participant_name: String,
}

impl Default for AvatarServiceConfig {
    fn default() -> Self {
        Self {
            api_url: default_avatar_api_url(),
            max_session_length_secs: default_max_session_length_secs(),
            max_idle_time_secs: default_max_idle_time_secs(),
            participant_name: default_avatar_participant_name(),
        }
    }
}

fn default_model_url() -> String {
    "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent".to_string()
}

fn default_model_name() -> String {
    "models/gemini-2.0-flash-live-001".to_string()
}

fn default_setup_timeout_secs() -> u64 {
    10
}

/// Realtime model endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelServiceConfig {
    #[serde(default = "default_model_url")]
    pub url: String,
    #[serde(default = "default_model_name")]
    pub model: String,
    /// How long to wait for the server to acknowledge the setup message.
    #[serde(default = "default_setup_timeout_secs")]
    pub setup_timeout_secs: u64,
}

impl Default for ModelServiceConfig {
    fn default() -> Self {
        Self {
            url: default_model_url(),
            model: default_model_name(),
            setup_timeout_secs: default_setup_timeout_secs(),
        }
    }
}

impl ModelServiceConfig {
    pub fn setup_timeout(&self) -> Duration {
        Duration::from_secs(self.setup_timeout_secs)
    }
}

/// Instruction sent to the model for the opening utterance.
pub const GREETING_INSTRUCTIONS: &str = "Greet the user warmly and briefly introduce yourself \
based on your persona. Ask how you can help them today. Keep it natural and conversational.";

/// Upper bound for a single release step during cleanup.
pub const DEFAULT_CLEANUP_STEP_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-session behaviour handed to the controller at construction.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub greeting_instructions: String,
    pub cleanup_step_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            greeting_instructions: GREETING_INSTRUCTIONS.to_string(),
            cleanup_step_timeout: DEFAULT_CLEANUP_STEP_TIMEOUT,
        }
    }
}
