//! Avatar settings and room metadata.
//!
//! `AvatarSettings` is what the settings endpoint returns after defaults are
//! applied. `RoomMetadata` is the JSON blob attached to a room when the
//! front-end creates it.

use serde::{Deserialize, Serialize};

/// Persona used when the settings endpoint is unavailable.
pub const DEFAULT_INSTRUCTIONS: &str = "\
You are Ong, a friendly AI companion for the Mien Kingdom community.

Your role:
- Help users learn about Mien culture, traditions, and history
- Assist with Mien language translation and pronunciation
- Share knowledge about Mien cuisine, clothing, and customs
- Be warm, patient, and encouraging with users of all ages
- Speak naturally and conversationally, like a wise friend

Guidelines:
- Keep responses concise and conversational (1-3 sentences typically)
- Use simple, clear language
- Be respectful of Mien cultural traditions
- If you don't know something about Mien culture, admit it honestly
- Encourage users to explore and learn more about their heritage

Remember: You represent the Mien Kingdom community - be welcoming and inclusive!
";

/// Voice used when the settings endpoint is unavailable.
pub const DEFAULT_VOICE: &str = "Charon";

/// Resolved avatar settings: a prebuilt voice name and the persona prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvatarSettings {
    pub voice: String,
    pub prompt: String,
}

impl Default for AvatarSettings {
    fn default() -> Self {
        Self {
            voice: DEFAULT_VOICE.to_string(),
            prompt: DEFAULT_INSTRUCTIONS.to_string(),
        }
    }
}

/// Raw body of `GET /api/avatar/settings`. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
struct SettingsBody {
    #[serde(default)]
    voice: Option<String>,
    #[serde(default)]
    prompt: Option<String>,
}

impl AvatarSettings {
    /// Parses a settings response body, applying defaults per field.
    ///
    /// Missing, `null` and blank fields fall back to the built-in values.
    pub fn from_json(body: &[u8]) -> Result<Self, serde_json::Error> {
        let raw: SettingsBody = serde_json::from_slice(body)?;
        Ok(Self {
            voice: non_blank(raw.voice).unwrap_or_else(|| DEFAULT_VOICE.to_string()),
            prompt: non_blank(raw.prompt).unwrap_or_else(|| DEFAULT_INSTRUCTIONS.to_string()),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Room metadata written by the front-end when it creates a room.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomMetadata {
    /// Which rotating model key the client was assigned.
    #[serde(rename = "geminiKeyIndex", default, skip_serializing_if = "Option::is_none")]
    pub gemini_key_index: Option<u64>,
}

/// Extracts the model key selector from raw room metadata.
///
/// Empty or malformed metadata, a missing field or a non-integer value all
/// select slot 0.
pub fn key_index_from_metadata(metadata: &str) -> usize {
    if metadata.trim().is_empty() {
        return 0;
    }
    serde_json::from_str::<RoomMetadata>(metadata)
        .ok()
        .and_then(|m| m.gemini_key_index)
        .and_then(|i| usize::try_from(i).ok())
        .unwrap_or(0)
}
