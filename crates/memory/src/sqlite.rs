//! SQLite memory store.
//!
//! One `memories` table, indexed for the two history lookups the pipeline
//! makes: by user and by room, newest first. Timestamps are stored as
//! fixed-width RFC3339 strings so lexical order matches time order.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use steward_core::error::MemoryError;
use steward_core::memory::{Generator, Memory, MemoryQuery, MemoryScope, MemoryStore};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A SQLite-backed memory store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a SQLite store.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral database (useful for tests).
    pub async fn new(path: &str) -> Result<Self, MemoryError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| MemoryError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let max_connections = if path.contains(":memory:") { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite memory store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, MemoryError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS memories (
                iid          INTEGER PRIMARY KEY AUTOINCREMENT,
                id           TEXT UNIQUE NOT NULL,
                user_id      TEXT NOT NULL,
                agent_id     TEXT NOT NULL,
                room_id      TEXT NOT NULL,
                kind         TEXT NOT NULL,
                generator    TEXT NOT NULL,
                content      TEXT NOT NULL,
                created_at   TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("memories table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_memories_user ON memories(user_id, created_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("user index: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_memories_room ON memories(room_id, created_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("room index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_memory(row: &sqlx::sqlite::SqliteRow) -> Result<Memory, MemoryError> {
        let column = |name: &str| -> Result<String, MemoryError> {
            row.try_get::<String, _>(name)
                .map_err(|e| MemoryError::QueryFailed(format!("{name} column: {e}")))
        };

        let generator_str = column("generator")?;
        let generator = Generator::parse(&generator_str).ok_or_else(|| {
            MemoryError::QueryFailed(format!("unknown generator '{generator_str}'"))
        })?;

        let content = serde_json::from_str(&column("content")?)
            .map_err(|e| MemoryError::QueryFailed(format!("content column: {e}")))?;

        let created_at = chrono::DateTime::parse_from_rfc3339(&column("created_at")?)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| MemoryError::QueryFailed(format!("created_at column: {e}")))?;

        Ok(Memory {
            id: column("id")?,
            user_id: column("user_id")?,
            agent_id: column("agent_id")?,
            room_id: column("room_id")?,
            kind: column("kind")?,
            generator,
            content,
            created_at,
        })
    }
}

#[async_trait]
impl MemoryStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn append(&self, mut memory: Memory) -> Result<String, MemoryError> {
        if memory.id.is_empty() {
            memory.id = Uuid::new_v4().to_string();
        }
        let content = serde_json::to_string(&memory.content)
            .map_err(|e| MemoryError::Storage(format!("Content serialization: {e}")))?;
        let created_at = memory.created_at.to_rfc3339_opts(SecondsFormat::Micros, true);

        sqlx::query(
            r#"
            INSERT INTO memories (id, user_id, agent_id, room_id, kind, generator, content, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&memory.id)
        .bind(&memory.user_id)
        .bind(&memory.agent_id)
        .bind(&memory.room_id)
        .bind(&memory.kind)
        .bind(memory.generator.as_str())
        .bind(&content)
        .bind(&created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("INSERT failed: {e}")))?;

        debug!(id = %memory.id, room_id = %memory.room_id, "Stored memory");
        Ok(memory.id)
    }

    async fn query(&self, query: MemoryQuery) -> Result<Vec<Memory>, MemoryError> {
        let (sql, key) = match &query.scope {
            MemoryScope::User(id) => (
                "SELECT * FROM memories WHERE user_id = ?1 ORDER BY created_at DESC, iid DESC LIMIT ?2",
                id,
            ),
            MemoryScope::Room(id) => (
                "SELECT * FROM memories WHERE room_id = ?1 ORDER BY created_at DESC, iid DESC LIMIT ?2",
                id,
            ),
        };

        let rows = sqlx::query(sql)
            .bind(key)
            .bind(query.limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("History query: {e}")))?;

        Ok(rows
            .iter()
            .filter_map(|row| match Self::row_to_memory(row) {
                Ok(memory) => Some(memory),
                Err(e) => {
                    let id = row.try_get::<String, _>("id").unwrap_or_default();
                    warn!(id = %id, error = %e, "Failed to load a memory, skipping");
                    None
                }
            })
            .collect())
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM memories")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("Count: {e}")))?;
        let n: i64 = row
            .try_get("n")
            .map_err(|e| MemoryError::QueryFailed(format!("Count column: {e}")))?;
        Ok(n as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use steward_core::input::{Input, InputSource};

    async fn test_store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.unwrap()
    }

    fn input(user: &str, room: &str, text: &str) -> Input {
        Input::text(InputSource::Network, user, "stern", room, text)
    }

    #[tokio::test]
    async fn append_and_query_roundtrip() {
        let store = test_store().await;
        let original = Memory::from_input(&input("u1", "stern_u1", "hello there"));
        let id = store.append(original.clone()).await.unwrap();
        assert_eq!(id, original.id);

        let found = store
            .query(MemoryQuery {
                scope: MemoryScope::User("u1".into()),
                limit: 100,
            })
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text(), Some("hello there"));
        assert_eq!(found[0].generator, Generator::External);
        assert_eq!(found[0].kind, "text");
    }

    #[tokio::test]
    async fn query_is_newest_first_and_limited() {
        let store = test_store().await;
        let base = Utc::now();
        for i in 0..5 {
            let mut memory = Memory::agent_reply(&input("u1", "r1", ""), "agent", format!("reply {i}"));
            memory.created_at = base + Duration::milliseconds(i);
            store.append(memory).await.unwrap();
        }

        let found = store
            .query(MemoryQuery {
                scope: MemoryScope::User("u1".into()),
                limit: 3,
            })
            .await
            .unwrap();
        let texts: Vec<_> = found.iter().filter_map(|m| m.text()).collect();
        assert_eq!(texts, vec!["reply 4", "reply 3", "reply 2"]);
        assert!(found.iter().all(|m| m.generator == Generator::Llm));
    }

    #[tokio::test]
    async fn room_scope_filters_other_rooms() {
        let store = test_store().await;
        store.append(Memory::from_input(&input("u1", "r1", "a"))).await.unwrap();
        store.append(Memory::from_input(&input("u2", "r1", "b"))).await.unwrap();
        store.append(Memory::from_input(&input("u1", "r2", "c"))).await.unwrap();

        let found = store
            .query(MemoryQuery {
                scope: MemoryScope::Room("r1".into()),
                limit: 10,
            })
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn corrupt_rows_are_skipped() {
        let store = test_store().await;
        store.append(Memory::from_input(&input("u1", "r1", "good"))).await.unwrap();
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        for (id, generator, content, created_at) in [
            ("bad-json", "external", "{not json", now.as_str()),
            ("bad-generator", "robot", "{\"text\":\"x\"}", now.as_str()),
            ("bad-time", "external", "{\"text\":\"x\"}", "yesterday"),
        ] {
            sqlx::query(
                "INSERT INTO memories (id, user_id, agent_id, room_id, kind, generator, content, created_at) \
                 VALUES (?1, 'u1', 'stern', 'r1', 'text', ?2, ?3, ?4)",
            )
            .bind(id)
            .bind(generator)
            .bind(content)
            .bind(created_at)
            .execute(&store.pool)
            .await
            .unwrap();
        }

        let found = store
            .query(MemoryQuery {
                scope: MemoryScope::User("u1".into()),
                limit: 10,
            })
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text(), Some("good"));
        assert_eq!(store.count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn duplicate_ids_rejected() {
        let store = test_store().await;
        let memory = Memory::from_input(&input("u1", "r1", "a"));
        store.append(memory.clone()).await.unwrap();
        assert!(matches!(
            store.append(memory).await,
            Err(MemoryError::Storage(_))
        ));
    }

    #[tokio::test]
    async fn file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = format!("sqlite://{}", dir.path().join("memory.db").display());

        {
            let store = SqliteStore::new(&path).await.unwrap();
            store.append(Memory::from_input(&input("u1", "r1", "kept"))).await.unwrap();
        }

        let reopened = SqliteStore::new(&path).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
    }
}
