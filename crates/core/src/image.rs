//! Decoding of the `character_image` artifact.
//!
//! The service inlines the generated character as
//! `data:image/png;base64,<payload>`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::CoreError;

/// A decoded character image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterImage {
    /// Media type from the data URL, e.g. `image/png`.
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl CharacterImage {
    /// Parse a base64 `data:` URL.
    pub fn from_data_url(url: &str) -> Result<Self, CoreError> {
        let rest = url
            .trim()
            .strip_prefix("data:")
            .ok_or_else(|| CoreError::InvalidImage("not a data URL".to_string()))?;

        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| CoreError::InvalidImage("data URL has no payload".to_string()))?;

        let media_type = header
            .strip_suffix(";base64")
            .ok_or_else(|| CoreError::InvalidImage("only base64 data URLs are supported".to_string()))?;

        if !media_type.starts_with("image/") {
            return Err(CoreError::InvalidImage(format!(
                "unexpected media type '{media_type}'"
            )));
        }

        let bytes = STANDARD
            .decode(payload)
            .map_err(|e| CoreError::InvalidImage(format!("bad base64 payload: {e}")))?;

        Ok(Self {
            media_type: media_type.to_string(),
            bytes,
        })
    }

    /// File extension matching the media type (`png` for `image/png`).
    pub fn extension(&self) -> &str {
        match self.media_type.as_str() {
            "image/jpeg" => "jpg",
            other => other.strip_prefix("image/").unwrap_or("bin"),
        }
    }
}
