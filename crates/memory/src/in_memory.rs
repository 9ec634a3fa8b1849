//! In-memory store: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use std::sync::Arc;
use steward_core::error::MemoryError;
use steward_core::memory::{Memory, MemoryQuery, MemoryStore};
use tokio::sync::RwLock;
use uuid::Uuid;

/// An in-memory store that keeps memories in a Vec, in append order.
pub struct InMemoryStore {
    entries: Arc<RwLock<Vec<Memory>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn append(&self, mut memory: Memory) -> Result<String, MemoryError> {
        if memory.id.is_empty() {
            memory.id = Uuid::new_v4().to_string();
        }
        let id = memory.id.clone();
        self.entries.write().await.push(memory);
        Ok(id)
    }

    async fn query(&self, query: MemoryQuery) -> Result<Vec<Memory>, MemoryError> {
        let entries = self.entries.read().await;

        // Walk newest appends first so equal timestamps keep append order reversed.
        let mut results: Vec<Memory> = entries
            .iter()
            .rev()
            .filter(|m| query.matches(m))
            .cloned()
            .collect();

        results.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        results.truncate(query.limit);
        Ok(results)
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        Ok(self.entries.read().await.len())
    }
}
