//! No-op memory store: disables conversation history entirely.

use async_trait::async_trait;
use steward_core::error::MemoryError;
use steward_core::memory::{Memory, MemoryQuery, MemoryStore};

/// A memory store that keeps nothing. Every request sees an empty history.
pub struct NoopStore;

#[async_trait]
impl MemoryStore for NoopStore {
    fn name(&self) -> &str {
        "none"
    }

    async fn append(&self, memory: Memory) -> Result<String, MemoryError> {
        Ok(memory.id)
    }

    async fn query(&self, _query: MemoryQuery) -> Result<Vec<Memory>, MemoryError> {
        Ok(Vec::new())
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        Ok(0)
    }
}
