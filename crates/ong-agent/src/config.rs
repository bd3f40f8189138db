//! Worker configuration loading from file and environment variables.

use ong_session::credentials::{AvatarCredentials, ModelKeys};
use ong_session::{
    AvatarServiceConfig, LiveKitConfig, ModelServiceConfig, SessionOptions,
    SettingsEndpointConfig,
};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use thiserror::Error;

/// Top-level worker configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Webhook listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// LiveKit connection. Usually supplied through `LIVEKIT_*` variables.
    #[serde(default)]
    pub livekit: LiveKitConfig,

    /// Avatar settings endpoint.
    #[serde(default)]
    pub settings: SettingsEndpointConfig,

    /// Avatar rendering service.
    #[serde(default)]
    pub avatar: AvatarServiceConfig,

    /// Realtime model service.
    #[serde(default)]
    pub model: ModelServiceConfig,

    /// Job lifecycle settings.
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration for the webhook listener.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Job lifecycle configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// How long shutdown waits for running sessions to clean up.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    /// Upper bound for each release step of a session cleanup.
    #[serde(default = "default_cleanup_step_timeout_secs")]
    pub cleanup_step_timeout_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "ong_session=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    8081
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

fn default_cleanup_step_timeout_secs() -> u64 {
    10
}

fn default_log_level() -> String {
    "info,livekit_api=warn,tungstenite=warn".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            cleanup_step_timeout_secs: default_cleanup_step_timeout_secs(),
        }
    }
}

impl WorkerConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            cleanup_step_timeout: Duration::from_secs(self.cleanup_step_timeout_secs),
            ..SessionOptions::default()
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Required environment variables are unset.
    #[error("missing required environment variables: {}", .0.join(", "))]
    MissingEnvironment(Vec<String>),
}

/// Loads configuration from a TOML file, falling back to defaults, then
/// applies overrides from the process environment.
///
/// Environment variable overrides:
/// - `ONG_HOST` / `ONG_PORT` override `server.host` / `server.port`
/// - `LIVEKIT_URL`, `LIVEKIT_API_KEY`, `LIVEKIT_API_SECRET` override `livekit.*`
/// - `API_BASE_URL` overrides `settings.api_base_url`
/// - `ONG_SETTINGS_TIMEOUT_SECS` overrides `settings.timeout_secs`
/// - `ONG_LOG_LEVEL` overrides `logging.level`
/// - `ONG_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    load_config_with(path, |name| std::env::var(name).ok())
}

/// Same as [`load_config`] with an explicit variable lookup.
pub fn load_config_with(
    path: Option<&str>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    if let Some(host) = lookup("ONG_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = lookup("ONG_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(url) = lookup("LIVEKIT_URL") {
        config.livekit.url = url;
    }
    if let Some(key) = lookup("LIVEKIT_API_KEY") {
        config.livekit.api_key = key;
    }
    if let Some(secret) = lookup("LIVEKIT_API_SECRET") {
        config.livekit.api_secret = secret;
    }
    if let Some(base) = lookup("API_BASE_URL") {
        config.settings.api_base_url = base;
    }
    if let Some(timeout) = lookup("ONG_SETTINGS_TIMEOUT_SECS") {
        if let Ok(parsed) = timeout.parse() {
            config.settings.timeout_secs = parsed;
        }
    }
    if let Some(level) = lookup("ONG_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("ONG_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }

    Ok(config)
}

/// Service credentials read from the environment. Never written to disk or
/// logged.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub avatar: AvatarCredentials,
    pub model_keys: ModelKeys,
}

impl Secrets {
    pub fn from_env() -> Self {
        Self {
            avatar: AvatarCredentials::from_env(),
            model_keys: ModelKeys::from_env(),
        }
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            avatar: AvatarCredentials::from_lookup(&lookup),
            model_keys: ModelKeys::from_lookup(&lookup),
        }
    }

    /// Values that must never appear in log output.
    pub fn redactions(&self, config: &Config) -> Vec<String> {
        let mut values: Vec<String> = self.model_keys.secrets().map(str::to_string).collect();
        values.extend(self.avatar.api_key.clone());
        if !config.livekit.api_secret.is_empty() {
            values.push(config.livekit.api_secret.clone());
        }
        values
    }
}

/// Checks that everything a session needs is configured before the worker
/// accepts any job.
///
/// # Errors
///
/// Returns [`ConfigError::MissingEnvironment`] listing every missing variable.
pub fn validate(config: &Config, secrets: &Secrets) -> Result<(), ConfigError> {
    let mut missing = Vec::new();
    let livekit = [
        ("LIVEKIT_URL", &config.livekit.url),
        ("LIVEKIT_API_KEY", &config.livekit.api_key),
        ("LIVEKIT_API_SECRET", &config.livekit.api_secret),
    ];
    for (name, value) in livekit {
        if value.trim().is_empty() {
            missing.push(name.to_string());
        }
    }
    if secrets.model_keys.is_empty() {
        missing.push("GEMINI_API_KEY_1..5 or GOOGLE_AI_API_KEY".to_string());
    }
    missing.extend(secrets.avatar.missing().into_iter().map(str::to_string));

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::MissingEnvironment(missing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn full_env() -> Vec<(&'static str, &'static str)> {
        vec![
            ("LIVEKIT_URL", "wss://example.livekit.cloud"),
            ("LIVEKIT_API_KEY", "APIkey"),
            ("LIVEKIT_API_SECRET", "lk-secret"),
            ("SIMLI_API_KEY", "simli-secret"),
            ("SIMLI_FACE_ID", "face-1"),
            ("GEMINI_API_KEY_3", "gemini-secret"),
        ]
    }

    #[test]
    fn defaults_without_file() {
        let config = load_config_with(None, |_| None).unwrap();
        assert_eq!(config.server.port, 8081);
        assert_eq!(config.settings.api_base_url, "http://localhost:5000");
        assert_eq!(config.settings.timeout_secs, 5);
        assert_eq!(config.worker.shutdown_timeout(), Duration::from_secs(30));
        assert_eq!(config.avatar.max_idle_time_secs, 300);
        assert!(config.logging.level.contains("livekit_api=warn"));
    }

    #[test]
    fn missing_file_uses_defaults() {
        let config = load_config_with(Some("/nonexistent/ong.toml"), |_| None).unwrap();
        assert_eq!(config.server.port, 8081);
    }

    #[test]
    fn env_overrides_apply() {
        let env = lookup(&[
            ("ONG_PORT", "9000"),
            ("API_BASE_URL", "https://mien.example"),
            ("ONG_SETTINGS_TIMEOUT_SECS", "2"),
            ("LIVEKIT_URL", "wss://lk"),
            ("ONG_LOG_JSON", "1"),
        ]);
        let config = load_config_with(None, env).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.settings.api_base_url, "https://mien.example");
        assert_eq!(config.settings.timeout_secs, 2);
        assert_eq!(config.livekit.url, "wss://lk");
        assert!(config.logging.json);
    }

    #[test]
    fn file_sections_parse() {
        let path = std::env::temp_dir().join(format!("ong-config-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            r#"
                [server]
                port = 7000

                [avatar]
                max_session_length_secs = 1800

                [worker]
                shutdown_timeout_secs = 5
            "#,
        )
        .unwrap();

        let config = load_config_with(path.to_str(), |_| None).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.server.port, 7000);
        assert_eq!(config.avatar.max_session_length_secs, 1800);
        assert_eq!(config.avatar.max_idle_time_secs, 300);
        assert_eq!(config.worker.shutdown_timeout_secs, 5);
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let path = std::env::temp_dir().join(format!("ong-bad-{}.toml", std::process::id()));
        std::fs::write(&path, "[server\nport = ").unwrap();
        let result = load_config_with(path.to_str(), |_| None);
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn complete_environment_validates() {
        let env = lookup(&full_env());
        let config = load_config_with(None, &env).unwrap();
        let secrets = Secrets::from_lookup(&env);
        assert!(validate(&config, &secrets).is_ok());
    }

    #[test]
    fn validation_lists_every_missing_variable() {
        let config = load_config_with(None, |_| None).unwrap();
        let secrets = Secrets::from_lookup(|_| None);
        match validate(&config, &secrets) {
            Err(ConfigError::MissingEnvironment(missing)) => {
                assert_eq!(missing.len(), 6);
                assert!(missing.contains(&"LIVEKIT_API_SECRET".to_string()));
                assert!(missing.contains(&"SIMLI_FACE_ID".to_string()));
                assert!(missing.iter().any(|m| m.contains("GOOGLE_AI_API_KEY")));
            }
            other => panic!("expected missing environment, got {:?}", other),
        }
    }

    #[test]
    fn fallback_key_alone_satisfies_model_requirement() {
        let mut env = full_env();
        env.retain(|(k, _)| !k.starts_with("GEMINI"));
        env.push(("GOOGLE_AI_API_KEY", "google-secret"));
        let env = lookup(&env);
        let config = load_config_with(None, &env).unwrap();
        assert!(validate(&config, &Secrets::from_lookup(&env)).is_ok());
    }

    #[test]
    fn redactions_cover_all_secrets() {
        let env = lookup(&full_env());
        let config = load_config_with(None, &env).unwrap();
        let redactions = Secrets::from_lookup(&env).redactions(&config);
        for secret in ["lk-secret", "simli-secret", "gemini-secret"] {
            assert!(redactions.iter().any(|r| r == secret), "{} not redacted", secret);
        }
        assert!(!redactions.iter().any(|r| r == "face-1"));
    }
}
