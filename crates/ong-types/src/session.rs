//! Resolved per-session configuration.

use crate::settings::AvatarSettings;
use std::fmt;
use thiserror::Error;

/// Credentials for the two AI services used by one session.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialSet {
    pub avatar_api_key: String,
    pub avatar_face_id: String,
    pub model_api_key: String,
}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSet")
            .field("avatar_api_key", &"[REDACTED]")
            .field("avatar_face_id", &self.avatar_face_id)
            .field("model_api_key", &"[REDACTED]")
            .finish()
    }
}

/// Where the model key of a session came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKeySource {
    /// One of the rotating slots, 0-based.
    Rotation(usize),
    /// The single fallback key, used when every rotating slot is empty.
    Fallback,
}

impl fmt::Display for ModelKeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rotation(slot) => write!(f, "rotation[{slot}]"),
            Self::Fallback => f.write_str("fallback"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionConfigError {
    #[error("session configuration is missing {0}")]
    Missing(&'static str),
}

/// Immutable snapshot of everything a session needs before it touches an
/// external service.
///
/// Construction through [`SessionConfig::new`] guarantees every field is
/// non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    room_name: String,
    credentials: CredentialSet,
    model_key_index: usize,
    model_key_source: ModelKeySource,
    voice: String,
    persona_prompt: String,
}

impl SessionConfig {
    pub fn new(
        room_name: impl Into<String>,
        credentials: CredentialSet,
        model_key_index: usize,
        model_key_source: ModelKeySource,
        settings: AvatarSettings,
    ) -> Result<Self, SessionConfigError> {
        let config = Self {
            room_name: room_name.into(),
            credentials,
            model_key_index,
            model_key_source,
            voice: settings.voice,
            persona_prompt: settings.prompt,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), SessionConfigError> {
        let required = [
            ("room name", &self.room_name),
            ("avatar API key", &self.credentials.avatar_api_key),
            ("avatar face id", &self.credentials.avatar_face_id),
            ("model API key", &self.credentials.model_api_key),
            ("voice", &self.voice),
            ("persona prompt", &self.persona_prompt),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(SessionConfigError::Missing(name));
            }
        }
        Ok(())
    }

    pub fn room_name(&self) -> &str {
        &self.room_name
    }

    pub fn credentials(&self) -> &CredentialSet {
        &self.credentials
    }

    /// The rotation slot requested by the room, which may differ from the
    /// slot actually used; see [`SessionConfig::model_key_source`].
    pub fn model_key_index(&self) -> usize {
        self.model_key_index
    }

    pub fn model_key_source(&self) -> ModelKeySource {
        self.model_key_source
    }

    pub fn voice(&self) -> &str {
        &self.voice
    }

    pub fn persona_prompt(&self) -> &str {
        &self.persona_prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> CredentialSet {
        CredentialSet {
            avatar_api_key: "simli-secret".into(),
            avatar_face_id: "face-1".into(),
            model_api_key: "gemini-secret".into(),
        }
    }

    #[test]
    fn resolved_config_exposes_fields() {
        let config = SessionConfig::new(
            "room-a",
            credentials(),
            1,
            ModelKeySource::Rotation(1),
            AvatarSettings::default(),
        )
        .unwrap();
        assert_eq!(config.room_name(), "room-a");
        assert_eq!(config.voice(), crate::DEFAULT_VOICE);
        assert_eq!(config.model_key_source(), ModelKeySource::Rotation(1));
    }

    #[test]
    fn empty_credential_is_rejected() {
        let mut creds = credentials();
        creds.model_api_key = String::new();
        let err = SessionConfig::new(
            "room-a",
            creds,
            0,
            ModelKeySource::Fallback,
            AvatarSettings::default(),
        )
        .unwrap_err();
        assert_eq!(err, SessionConfigError::Missing("model API key"));
    }

    #[test]
    fn empty_room_name_is_rejected() {
        let err = SessionConfig::new(
            " ",
            credentials(),
            0,
            ModelKeySource::Rotation(0),
            AvatarSettings::default(),
        )
        .unwrap_err();
        assert_eq!(err, SessionConfigError::Missing("room name"));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let rendered = format!("{:?}", credentials());
        assert!(!rendered.contains("simli-secret"));
        assert!(!rendered.contains("gemini-secret"));
        assert!(rendered.contains("face-1"));
    }
}
