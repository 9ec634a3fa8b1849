//! Goal contracts and their storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use steward_core::error::PipelineError;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractStatus {
    Active,
    Completed,
    Cancelled,
    Failed,
}

impl ContractStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// An accountability contract between a user and the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub id: String,
    pub user_id: String,
    pub goal: String,
    pub deadline: DateTime<Utc>,
    pub return_address: String,
    pub amount: Option<f64>,
    pub status: ContractStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Fields supplied when a contract is formed.
#[derive(Debug, Clone)]
pub struct NewContract {
    pub user_id: String,
    pub goal: String,
    pub deadline: DateTime<Utc>,
    pub return_address: String,
    pub amount: Option<f64>,
}

#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    #[error("Contract not found: {0}")]
    NotFound(String),

    #[error("Contract storage error: {0}")]
    Storage(String),
}

impl From<ContractError> for PipelineError {
    fn from(e: ContractError) -> Self {
        PipelineError::stage("contract_store", e)
    }
}

#[async_trait]
pub trait ContractStore: Send + Sync {
    async fn create(&self, contract: NewContract) -> Result<Contract, ContractError>;

    /// A contract by id, only if it belongs to `user_id`.
    async fn get_for_user(&self, id: &str, user_id: &str) -> Result<Option<Contract>, ContractError>;

    async fn list_active(&self, user_id: &str) -> Result<Vec<Contract>, ContractError>;

    /// Move a contract to `status`. Completion stamps `completed_at`.
    async fn update_status(&self, id: &str, status: ContractStatus) -> Result<Contract, ContractError>;
}

/// Contracts kept in process memory.
#[derive(Default)]
pub struct InMemoryContractStore {
    contracts: RwLock<HashMap<String, Contract>>,
}

impl InMemoryContractStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully-formed contract, replacing any with the same id.
    pub async fn insert(&self, contract: Contract) {
        self.contracts
            .write()
            .await
            .insert(contract.id.clone(), contract);
    }
}

#[async_trait]
impl ContractStore for InMemoryContractStore {
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
        self.insert(contract.clone()).await;
        Ok(contract)
    }

    async fn get_for_user(&self, id: &str, user_id: &str) -> Result<Option<Contract>, ContractError> {
        Ok(self
            .contracts
            .read()
            .await
            .get(id)
            .filter(|c| c.user_id == user_id)
            .cloned())
    }

    async fn list_active(&self, user_id: &str) -> Result<Vec<Contract>, ContractError> {
        let mut active: Vec<Contract> = self
            .contracts
            .read()
            .await
            .values()
            .filter(|c| c.user_id == user_id && c.status == ContractStatus::Active)
            .cloned()
            .collect();
        active.sort_by_key(|c| c.created_at);
        Ok(active)
    }

    async fn update_status(&self, id: &str, status: ContractStatus) -> Result<Contract, ContractError> {
        let mut contracts = self.contracts.write().await;
        let contract = contracts
            .get_mut(id)
            .ok_or_else(|| ContractError::NotFound(id.to_string()))?;

        let now = Utc::now();
        contract.status = status;
        contract.updated_at = now;
        if status == ContractStatus::Completed {
            contract.completed_at = Some(now);
        }
        Ok(contract.clone())
    }
}
