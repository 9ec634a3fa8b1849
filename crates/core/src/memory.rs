//! Memory trait: append-only storage of conversational turns.
//!
//! The pipeline only needs two operations from storage: append a turn and
//! fetch the most recent turns for a user or room. Creation time is the
//! sole ordering key.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MemoryError;
use crate::input::Input;

/// Who authored a memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Generator {
    /// User-authored content
    External,
    /// Agent-authored content
    Llm,
}

impl Generator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::External => "external",
            Self::Llm => "llm",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "external" => Some(Self::External),
            "llm" => Some(Self::Llm),
            _ => None,
        }
    }
}

/// One persisted conversational turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    /// Unique ID (assigned by the store when empty)
    pub id: String,

    pub user_id: String,

    pub agent_id: String,

    pub room_id: String,

    /// Free-form kind tag ("text", "agent", "contract")
    pub kind: String,

    pub generator: Generator,

    /// Content payload; text turns keep their text under `text`
    pub content: serde_json::Value,

    pub created_at: DateTime<Utc>,
}

impl Memory {
    /// Record an inbound input verbatim as a user-authored memory.
    pub fn from_input(input: &Input) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: input.user_id.clone(),
            agent_id: input.agent_id.clone(),
            room_id: input.room_id.clone(),
            kind: "text".into(),
            generator: Generator::External,
            content: serde_json::to_value(input).unwrap_or(serde_json::Value::Null),
            created_at: Utc::now(),
        }
    }

    /// Record an agent reply.
    pub fn agent_reply(input: &Input, kind: &str, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: input.user_id.clone(),
            agent_id: input.agent_id.clone(),
            room_id: input.room_id.clone(),
            kind: kind.into(),
            generator: Generator::Llm,
            content: serde_json::json!({ "text": text.into() }),
            created_at: Utc::now(),
        }
    }

    /// The text of this turn, if the content carries one.
    pub fn text(&self) -> Option<&str> {
        self.content.get("text").and_then(|v| v.as_str())
    }
}

/// Which turns a query covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", content = "id", rename_all = "snake_case")]
pub enum MemoryScope {
    User(String),
    Room(String),
}

/// A history query. Results are always newest-first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryQuery {
    pub scope: MemoryScope,

    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    100
}

impl MemoryQuery {
    pub fn matches(&self, memory: &Memory) -> bool {
        match &self.scope {
            MemoryScope::User(id) => &memory.user_id == id,
            MemoryScope::Room(id) => &memory.room_id == id,
        }
    }
}

/// The core MemoryStore trait.
///
/// Implementations: SQLite, in-memory (for testing), none (no-op).
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory", "none").
    fn name(&self) -> &str;

    /// Append a memory. Returns its ID.
    async fn append(&self, memory: Memory) -> std::result::Result<String, MemoryError>;

    /// Fetch up to `limit` memories in scope, newest first.
    async fn query(&self, query: MemoryQuery) -> std::result::Result<Vec<Memory>, MemoryError>;

    /// Total stored memories.
    async fn count(&self) -> std::result::Result<usize, MemoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::InputSource;

    #[test]
    fn inbound_memory_keeps_the_text() {
        let input = Input::text(InputSource::Api, "alice", "stern", "stern_alice", "hello");
        let memory = Memory::from_input(&input);
        assert_eq!(memory.generator, Generator::External);
        assert_eq!(memory.text(), Some("hello"));
        assert_eq!(memory.content["type"], "text");
    }

    #[test]
    fn agent_reply_is_llm_generated() {
        let input = Input::text(InputSource::Api, "alice", "stern", "stern_alice", "hello");
        let memory = Memory::agent_reply(&input, "agent", "hi there");
        assert_eq!(memory.generator, Generator::Llm);
        assert_eq!(memory.kind, "agent");
        assert_eq!(memory.text(), Some("hi there"));
    }

    #[test]
    fn query_scope_matching() {
        let input = Input::text(InputSource::Api, "alice", "stern", "room-1", "x");
        let memory = Memory::from_input(&input);
        let by_user = MemoryQuery { scope: MemoryScope::User("alice".into()), limit: 10 };
        let by_other_room = MemoryQuery { scope: MemoryScope::Room("room-2".into()), limit: 10 };
        assert!(by_user.matches(&memory));
        assert!(!by_other_room.matches(&memory));
    }

    #[test]
    fn generator_parse_roundtrip() {
        for generator in [Generator::External, Generator::Llm] {
            assert_eq!(Generator::parse(generator.as_str()), Some(generator));
        }
        assert_eq!(Generator::parse("system"), None);
    }
}
