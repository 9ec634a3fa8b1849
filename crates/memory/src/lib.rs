//! Conversation memory stores for Steward.

pub mod in_memory;
pub mod noop;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStore;
pub use noop::NoopStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use std::sync::Arc;
use steward_config::AppConfig;
use steward_core::error::MemoryError;
use steward_core::memory::MemoryStore;

/// Connection URL of the configured SQLite database, creating its directory
/// if needed. Other stores that share the database open it through this.
pub fn sqlite_url(config: &AppConfig) -> Result<String, MemoryError> {
    let path = config.memory_db_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            MemoryError::Storage(format!("Failed to create {}: {e}", parent.display()))
        })?;
    }
    Ok(format!("sqlite://{}", path.display()))
}

/// Build the configured memory store.
pub async fn build_from_config(config: &AppConfig) -> Result<Arc<dyn MemoryStore>, MemoryError> {
    match config.memory.backend.as_str() {
        "in_memory" => Ok(Arc::new(InMemoryStore::new())),
        "none" => Ok(Arc::new(NoopStore)),
        #[cfg(feature = "sqlite")]
        "sqlite" => Ok(Arc::new(SqliteStore::new(&sqlite_url(config)?).await?)),
        other => Err(MemoryError::Storage(format!(
            "Memory backend '{other}' is not available in this build"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builds_each_backend() {
        let mut config = AppConfig::default();

        config.memory.backend = "in_memory".into();
        assert_eq!(build_from_config(&config).await.unwrap().name(), "in_memory");

        config.memory.backend = "none".into();
        assert_eq!(build_from_config(&config).await.unwrap().name(), "none");

        let dir = tempfile::tempdir().unwrap();
        config.memory.backend = "sqlite".into();
        config.memory.path = Some(dir.path().join("nested/memory.db").display().to_string());
        assert_eq!(build_from_config(&config).await.unwrap().name(), "sqlite");
    }

    #[test]
    fn sqlite_url_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.memory.path = Some(dir.path().join("a/b/memory.db").display().to_string());

        let url = sqlite_url(&config).unwrap();
        assert!(url.starts_with("sqlite://"));
        assert!(url.ends_with("memory.db"));
        assert!(dir.path().join("a/b").is_dir());
    }
}
