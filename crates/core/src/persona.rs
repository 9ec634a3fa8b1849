//! Character data: the persona an agent speaks as.
//!
//! Characters are plain data loaded from a TOML or JSON file. How the lists
//! are sampled into a prompt is decided by the agent, not here.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::Error;

/// One line of an example conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExampleMessage {
    pub user: String,
    pub text: String,
}

/// Style guidance, split by medium.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Style {
    #[serde(default)]
    pub all: Vec<String>,
    #[serde(default)]
    pub chat: Vec<String>,
    #[serde(default)]
    pub post: Vec<String>,
}

/// The agent's persona.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub name: String,

    pub agent_id: String,

    /// Core behavioral instructions
    pub system: String,

    #[serde(default)]
    pub bio: Vec<String>,

    #[serde(default)]
    pub lore: Vec<String>,

    /// Example conversations, each an ordered list of messages
    #[serde(default)]
    pub message_examples: Vec<Vec<ExampleMessage>>,

    #[serde(default)]
    pub post_examples: Vec<String>,

    #[serde(default)]
    pub topics: Vec<String>,

    #[serde(default)]
    pub style: Style,

    #[serde(default)]
    pub adjectives: Vec<String>,
}

impl Character {
    /// The built-in mentor persona used when no character file is configured.
    pub fn default_character() -> Self {
        Self {
            name: "Stern".into(),
            agent_id: "stern".into(),
            system: "You are Stern, an AI mentor focused on providing direct, practical guidance.".into(),
            bio: vec![
                "Stern is a direct and efficient mentor with extensive experience in guiding others.".into(),
            ],
            lore: vec![
                "Built expertise through years of practical experience and mentoring.".into(),
            ],
            message_examples: vec![vec![
                ExampleMessage {
                    user: "student1".into(),
                    text: "How can I improve my skills?".into(),
                },
                ExampleMessage {
                    user: "Stern".into(),
                    text: "Let's be specific. What skills are you currently working on?".into(),
                },
            ]],
            post_examples: vec!["Here's a structured approach to skill development...".into()],
            topics: vec![
                "mentoring".into(),
                "skill development".into(),
                "growth".into(),
            ],
            style: Style {
                all: vec!["direct".into(), "professional".into()],
                chat: vec!["analytical".into()],
                post: vec!["structured".into()],
            },
            adjectives: vec!["efficient".into(), "practical".into()],
        }
    }

    /// Load a character from a `.toml` or `.json` file.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("Failed to read character file {}: {e}", path.display()),
        })?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let character: Self = if is_json {
            serde_json::from_str(&content)?
        } else {
            toml::from_str(&content).map_err(|e| Error::Config {
                message: format!("Failed to parse character file {}: {e}", path.display()),
            })?
        };

        character.validate()?;
        debug!(file = %path.display(), agent_id = %character.agent_id, "Loaded character");
        Ok(character)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.agent_id.trim().is_empty() {
            return Err(Error::Config {
                message: "character agent_id must not be empty".into(),
            });
        }
        if self.system.trim().is_empty() {
            return Err(Error::Config {
                message: format!("character '{}' has an empty system prompt", self.agent_id),
            });
        }
        Ok(())
    }
}

impl Default for Character {
    fn default() -> Self {
        Self::default_character()
    }
}
