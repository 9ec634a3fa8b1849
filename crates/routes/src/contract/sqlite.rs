//! SQLite contract store.
//!
//! Contracts live in a `contracts` table, normally in the same database file
//! as conversation memory. Timestamps are fixed-width RFC3339 strings so
//! lexical order matches time order.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::store::{Contract, ContractError, ContractStatus, ContractStore, NewContract};

pub struct SqliteContractStore {
    pool: SqlitePool,
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(name: &str, value: &str) -> Result<DateTime<Utc>, ContractError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ContractError::Storage(format!("{name} column: {e}")))
}

impl SqliteContractStore {
    /// Open (or create) the store. `"sqlite::memory:"` gives an ephemeral one.
    pub async fn new(path: &str) -> Result<Self, ContractError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| ContractError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let max_connections = if path.contains(":memory:") { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| ContractError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.create_schema().await?;
        info!("SQLite contract store initialized at {path}");
        Ok(store)
    }

    async fn create_schema(&self) -> Result<(), ContractError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS contracts (
                id             TEXT PRIMARY KEY NOT NULL,
                user_id        TEXT NOT NULL,
                goal           TEXT NOT NULL,
                deadline       TEXT NOT NULL,
                return_address TEXT NOT NULL,
                amount         REAL,
                status         TEXT NOT NULL,
                created_at     TEXT NOT NULL,
                updated_at     TEXT NOT NULL,
                completed_at   TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ContractError::Storage(format!("contracts table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_contracts_user ON contracts(user_id, status, created_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ContractError::Storage(format!("contracts index: {e}")))?;

        Ok(())
    }

    fn row_to_contract(row: &sqlx::sqlite::SqliteRow) -> Result<Contract, ContractError> {
        let column = |name: &str| -> Result<String, ContractError> {
            row.try_get::<String, _>(name)
                .map_err(|e| ContractError::Storage(format!("{name} column: {e}")))
        };

        let status_str = column("status")?;
        let status = ContractStatus::parse(&status_str)
            .ok_or_else(|| ContractError::Storage(format!("unknown status '{status_str}'")))?;

        let amount = row
            .try_get::<Option<f64>, _>("amount")
            .map_err(|e| ContractError::Storage(format!("amount column: {e}")))?;
        let completed_at = row
            .try_get::<Option<String>, _>("completed_at")
            .map_err(|e| ContractError::Storage(format!("completed_at column: {e}")))?
            .map(|value| parse_timestamp("completed_at", &value))
            .transpose()?;

        Ok(Contract {
            id: column("id")?,
            user_id: column("user_id")?,
            goal: column("goal")?,
            deadline: parse_timestamp("deadline", &column("deadline")?)?,
            return_address: column("return_address")?,
            amount,
            status,
            created_at: parse_timestamp("created_at", &column("created_at")?)?,
            updated_at: parse_timestamp("updated_at", &column("updated_at")?)?,
            completed_at,
        })
    }

    async fn fetch(&self, id: &str) -> Result<Option<Contract>, ContractError> {
        sqlx::query("SELECT * FROM contracts WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ContractError::Storage(format!("Contract lookup: {e}")))?
            .as_ref()
            .map(Self::row_to_contract)
            .transpose()
    }
}

#[async_trait]
impl ContractStore for SqliteContractStore {
    async fn create(&self, new: NewContract) -> Result<Contract, ContractError> {
        let now = Utc::now();
        let contract = Contract {
            id: Uuid::new_v4().to_string(),
            user_id: new.user_id,
            goal: new.goal,
            deadline: new.deadline,
            return_address: new.return_address,
            amount: new.amount,
            status: ContractStatus::Active,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO contracts (id, user_id, goal, deadline, return_address, amount, status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&contract.id)
        .bind(&contract.user_id)
        .bind(&contract.goal)
        .bind(timestamp(contract.deadline))
        .bind(&contract.return_address)
        .bind(contract.amount)
        .bind(contract.status.to_string())
        .bind(timestamp(contract.created_at))
        .bind(timestamp(contract.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| ContractError::Storage(format!("INSERT failed: {e}")))?;

        debug!(id = %contract.id, user_id = %contract.user_id, "Stored contract");
        Ok(contract)
    }

    async fn get_for_user(&self, id: &str, user_id: &str) -> Result<Option<Contract>, ContractError> {
        Ok(self.fetch(id).await?.filter(|c| c.user_id == user_id))
    }

    async fn list_active(&self, user_id: &str) -> Result<Vec<Contract>, ContractError> {
        let rows = sqlx::query(
            "SELECT * FROM contracts WHERE user_id = ?1 AND status = 'active' ORDER BY created_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ContractError::Storage(format!("Active contracts query: {e}")))?;

        Ok(rows
            .iter()
            .filter_map(|row| match Self::row_to_contract(row) {
                Ok(contract) => Some(contract),
                Err(e) => {
                    warn!(user_id, error = %e, "Failed to load a contract, skipping");
                    None
                }
            })
            .collect())
    }

    async fn update_status(&self, id: &str, status: ContractStatus) -> Result<Contract, ContractError> {
        let now = timestamp(Utc::now());
        let completed_at = (status == ContractStatus::Completed).then(|| now.clone());

        let result = sqlx::query(
            r#"
            UPDATE contracts
            SET status = ?1, updated_at = ?2, completed_at = COALESCE(?3, completed_at)
            WHERE id = ?4
            "#,
        )
        .bind(status.to_string())
        .bind(&now)
        .bind(completed_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| ContractError::Storage(format!("UPDATE failed: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(ContractError::NotFound(id.to_string()));
        }

        self.fetch(id)
            .await?
            .ok_or_else(|| ContractError::NotFound(id.to_string()))
    }
}
