//! Credential lookup and model key rotation.
//!
//! Up to [`MODEL_KEY_SLOTS`] model keys are provisioned as
//! `GEMINI_API_KEY_1` .. `GEMINI_API_KEY_5` (slots 0-4), plus one fallback
//! key under `GOOGLE_AI_API_KEY`. A room picks its slot through metadata;
//! resolution falls back in three tiers: the requested slot, the first
//! non-empty slot, then the fallback key.

use crate::error::SessionError;
use ong_types::{CredentialSet, ModelKeySource};
use std::fmt;

pub const MODEL_KEY_SLOTS: usize = 5;
pub const MODEL_KEY_ENV_PREFIX: &str = "GEMINI_API_KEY_";
pub const FALLBACK_MODEL_KEY_ENV: &str = "GOOGLE_AI_API_KEY";
pub const AVATAR_API_KEY_ENV: &str = "SIMLI_API_KEY";
pub const AVATAR_FACE_ID_ENV: &str = "SIMLI_FACE_ID";

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Avatar service credentials.
#[derive(Clone, Default)]
pub struct AvatarCredentials {
    pub api_key: Option<String>,
    pub face_id: Option<String>,
}

impl fmt::Debug for AvatarCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AvatarCredentials")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("face_id", &self.face_id)
            .finish()
    }
}

impl AvatarCredentials {
    pub fn new(api_key: impl Into<String>, face_id: impl Into<String>) -> Self {
        Self {
            api_key: present(Some(api_key.into())),
            face_id: present(Some(face_id.into())),
        }
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            api_key: present(lookup(AVATAR_API_KEY_ENV)),
            face_id: present(lookup(AVATAR_FACE_ID_ENV)),
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    /// Names of the variables that are unset or blank.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.api_key.is_none() {
            missing.push(AVATAR_API_KEY_ENV);
        }
        if self.face_id.is_none() {
            missing.push(AVATAR_FACE_ID_ENV);
        }
        missing
    }
}

/// The rotating model keys plus the fallback key.
#[derive(Clone, Default)]
pub struct ModelKeys {
    slots: [Option<String>; MODEL_KEY_SLOTS],
    fallback: Option<String>,
}

impl fmt::Debug for ModelKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let populated: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, k)| k.as_ref().map(|_| i))
            .collect();
        f.debug_struct("ModelKeys")
            .field("populated_slots", &populated)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

impl ModelKeys {
    /// Builds the key set from slot values in index order. Extra values past
    /// the last slot are ignored.
    pub fn new(slots: impl IntoIterator<Item = Option<String>>, fallback: Option<String>) -> Self {
        let mut keys = Self {
            fallback: present(fallback),
            ..Self::default()
        };
        for (slot, value) in keys.slots.iter_mut().zip(slots) {
            *slot = present(value);
        }
        keys
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let slots = (1..=MODEL_KEY_SLOTS).map(|n| lookup(&format!("{MODEL_KEY_ENV_PREFIX}{n}")));
        Self::new(slots, lookup(FALLBACK_MODEL_KEY_ENV))
    }

    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    /// Whether no model key at all is available.
    pub fn is_empty(&self) -> bool {
        self.fallback.is_none() && self.slots.iter().all(Option::is_none)
    }

    /// Picks the key for `index`, falling back to the first populated slot and
    /// then to the fallback key.
    pub fn select(&self, index: usize) -> Option<(&str, ModelKeySource)> {
        if let Some(Some(key)) = self.slots.get(index) {
            return Some((key.as_str(), ModelKeySource::Rotation(index)));
        }
        if let Some((slot, key)) = self
            .slots
            .iter()
            .enumerate()
            .find_map(|(i, k)| k.as_deref().map(|k| (i, k)))
        {
            return Some((key, ModelKeySource::Rotation(slot)));
        }
        self.fallback
            .as_deref()
            .map(|key| (key, ModelKeySource::Fallback))
    }

    /// Every configured key, for log redaction.
    pub fn secrets(&self) -> impl Iterator<Item = &str> {
        self.slots
            .iter()
            .chain(std::iter::once(&self.fallback))
            .filter_map(|k| k.as_deref())
    }
}

/// Resolves the credential set for a session whose room requested `selector`.
///
/// # Errors
///
/// Returns [`SessionError::MissingCredentials`] naming every missing piece when
/// the avatar credentials are incomplete or no model key is configured.
pub fn resolve_credentials(
    avatar: &AvatarCredentials,
    keys: &ModelKeys,
    selector: usize,
) -> Result<(CredentialSet, ModelKeySource), SessionError> {
    let model = keys.select(selector);

    let mut missing: Vec<String> = avatar.missing().iter().map(|s| s.to_string()).collect();
    if model.is_none() {
        missing.push(format!(
            "{MODEL_KEY_ENV_PREFIX}1..{MODEL_KEY_SLOTS} or {FALLBACK_MODEL_KEY_ENV}"
        ));
    }

    match (&avatar.api_key, &avatar.face_id, model) {
        (Some(api_key), Some(face_id), Some((model_key, source))) => Ok((
            CredentialSet {
                avatar_api_key: api_key.clone(),
                avatar_face_id: face_id.clone(),
                model_api_key: model_key.to_string(),
            },
            source,
        )),
        _ => Err(SessionError::MissingCredentials(missing.join(", "))),
    }
}
