//! Inbound input: the value object every boundary (gateway, CLI, API)
//! constructs and the pipeline consumes.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Where an input came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputSource {
    Network,
    Cli,
    Api,
}

/// The content type of an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    Text,
    Image,
    TextAndImage,
    Audio,
    Video,
}

impl std::fmt::Display for InputType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::TextAndImage => "text_and_image",
            Self::Audio => "audio",
            Self::Video => "video",
        };
        f.write_str(label)
    }
}

/// One inbound message.
///
/// Serialized in the boundary shape
/// `{source, userId, agentId, roomId, type, text?, imageUrls?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Input {
    pub source: InputSource,

    #[serde(default)]
    pub user_id: String,

    #[serde(default)]
    pub agent_id: String,

    #[serde(default)]
    pub room_id: String,

    #[serde(rename = "type")]
    pub kind: InputType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_urls: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
}

impl Input {
    /// Create a plain text input.
    pub fn text(
        source: InputSource,
        user_id: impl Into<String>,
        agent_id: impl Into<String>,
        room_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            source,
            user_id: user_id.into(),
            agent_id: agent_id.into(),
            room_id: room_id.into(),
            kind: InputType::Text,
            text: Some(text.into()),
            image_urls: Vec::new(),
            audio_url: None,
            video_url: None,
        }
    }

    /// Attach image references, upgrading a text input to `text_and_image`.
    pub fn with_images(mut self, image_urls: Vec<String>) -> Self {
        if self.kind == InputType::Text && !image_urls.is_empty() {
            self.kind = InputType::TextAndImage;
        }
        self.image_urls = image_urls;
        self
    }

    /// The text payload, treating an empty string as absent.
    pub fn text_content(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.is_empty())
    }

    pub fn has_images(&self) -> bool {
        !self.image_urls.is_empty()
    }

    /// Check the required identifiers and the type-dependent payload rules.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut missing = Vec::new();
        if self.user_id.is_empty() {
            missing.push("userId");
        }
        if self.agent_id.is_empty() {
            missing.push("agentId");
        }
        if !missing.is_empty() {
            return Err(ValidationError::MissingRequiredFields(missing));
        }

        match self.kind {
            InputType::Text if self.text_content().is_none() => Err(ValidationError::MissingText),
            InputType::TextAndImage if self.text_content().is_none() || !self.has_images() => {
                Err(ValidationError::MissingTextOrImages)
            }
            _ => Ok(()),
        }
    }
}
