//! Goal-contract routes.
//!
//! A contract is a user's commitment to a goal by a deadline. These routes
//! form, verify and cancel contracts from conversational input: a small
//! extraction call pulls the relevant fields out of the assembled context,
//! and every reply is remembered as a `contract` turn. When the extraction
//! says the user isn't actually talking about contracts (`abort`), the
//! request is handed to the conversation route instead.

pub mod store;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use store::{Contract, ContractError, ContractStatus, ContractStore, InMemoryContractStore, NewContract};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteContractStore;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use steward_agent::{AgentRequest, AgentResponse, RouteHandler};
use steward_core::error::PipelineError;
use steward_core::memory::{Memory, MemoryStore};
use steward_core::provider::{CompletionService, ModelSize, OutputShape, complete_structured};
use tracing::info;

use crate::conversation::ConversationRoute;

pub const CONTRACT_CREATE_ROUTE: &str = "contract_create";
pub const CONTRACT_CREATE_DESCRIPTION: &str = "Call if the user wants to create an accountability contract AND has provided a goal, deadline, and solana return address.";

pub const CONTRACT_FORMATION_HELP_ROUTE: &str = "contract_formation_help";
pub const CONTRACT_FORMATION_HELP_DESCRIPTION: &str = "Call if the user seems to want to form an accountability contract, but has not provided all of the following: a goal, deadline, and solana return address.";

pub const CONTRACT_VERIFICATION_ROUTE: &str = "contract_verification";
pub const CONTRACT_VERIFICATION_DESCRIPTION: &str =
    "Call if the user wants to verify they have fulfilled a contract.";

pub const CONTRACT_CANCEL_ROUTE: &str = "contract_cancel";
pub const CONTRACT_CANCEL_DESCRIPTION: &str =
    "Call if the user made a contract in the last couple of hours and wants to cancel it.";

/// How long after creation a contract may still be cancelled.
pub const CANCEL_WINDOW_HOURS: i64 = 2;

/// True for a base58 string of 32 to 44 characters.
pub fn is_valid_return_address(address: &str) -> bool {
    const BASE58: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
    (32..=44).contains(&address.chars().count()) && address.chars().all(|c| BASE58.contains(c))
}

/// Parse a deadline given as RFC 3339, a plain date, or a date and time.
///
/// Dates without a zone are taken as UTC; a plain date means the end of
/// that day.
pub fn parse_deadline(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(23, 59, 59).map(|dt| dt.and_utc());
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|dt| dt.and_utc())
}

/// Collaborators every contract route needs.
#[derive(Clone)]
pub struct ContractDeps {
    pub completions: Arc<dyn CompletionService>,
    pub memory: Arc<dyn MemoryStore>,
    pub contracts: Arc<dyn ContractStore>,
    pub conversation: Arc<ConversationRoute>,
}

impl ContractDeps {
    pub fn new(
        completions: Arc<dyn CompletionService>,
        memory: Arc<dyn MemoryStore>,
        contracts: Arc<dyn ContractStore>,
    ) -> Self {
        let conversation = Arc::new(ConversationRoute::new(
            Arc::clone(&completions),
            Arc::clone(&memory),
        ));
        Self {
            completions,
            memory,
            contracts,
            conversation,
        }
    }

    /// Remember the reply as a contract turn, then send it.
    async fn reply(
        &self,
        req: &AgentRequest,
        res: &mut AgentResponse,
        text: impl Into<String> + Send,
    ) -> Result<(), PipelineError> {
        let text = text.into();
        self.memory
            .append(Memory::agent_reply(&req.input, "contract", text.clone()))
            .await?;
        res.send(text).await
    }

    /// The user's active contracts, one per line, for extraction prompts.
    async fn active_contracts_section(&self, user_id: &str) -> Result<String, PipelineError> {
        let active = self.contracts.list_active(user_id).await?;
        if active.is_empty() {
            return Ok("<ACTIVE_CONTRACTS>\nNone\n</ACTIVE_CONTRACTS>".to_string());
        }
        let lines = active
            .iter()
            .map(|c| {
                format!(
                    "- {}: \"{}\" (deadline {})",
                    c.id,
                    c.goal,
                    c.deadline.format("%Y-%m-%d %H:%M UTC")
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        Ok(format!("<ACTIVE_CONTRACTS>\n{lines}\n</ACTIVE_CONTRACTS>"))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateExtraction {
    #[serde(default)]
    goal: Option<String>,
    #[serde(default)]
    deadline: Option<String>,
    #[serde(default)]
    return_address: Option<String>,
    #[serde(default)]
    abort: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerificationExtraction {
    #[serde(default)]
    contract_id: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    abort: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelExtraction {
    #[serde(default)]
    contract_id: Option<String>,
    #[serde(default)]
    abort: Option<bool>,
}

fn optional_strings_shape(name: &str, fields: &[&str]) -> OutputShape {
    let mut properties = serde_json::Map::new();
    for field in fields {
        properties.insert((*field).to_string(), serde_json::json!({ "type": "string" }));
    }
    properties.insert("abort".to_string(), serde_json::json!({ "type": "boolean" }));
    OutputShape::new(
        name,
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "additionalProperties": false,
        }),
    )
}

/// Treats a blank extracted field as missing.
fn present(field: Option<String>) -> Option<String> {
    field.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Forms a contract once goal, deadline and return address are all known.
pub struct ContractCreateRoute {
    deps: ContractDeps,
}

impl ContractCreateRoute {
    pub fn new(deps: ContractDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl RouteHandler for ContractCreateRoute {
    async fn handle(
        &self,
        context: &str,
        req: &AgentRequest,
        res: &mut AgentResponse,
    ) -> Result<(), PipelineError> {
        let prompt = format!(
            "{context}\n\n<SYSTEM> The user is trying to create an accountability contract. \
             They have provided a goal, deadline, and solana return address. Extract them. \
             Give the deadline as an ISO 8601 date or date-time. If they do not seem to want \
             to create a contract, return true for the abort field. </SYSTEM>"
        );
        let shape = optional_strings_shape("contract_create", &["goal", "deadline", "returnAddress"]);
        let analysis: CreateExtraction =
            complete_structured(self.deps.completions.as_ref(), &prompt, &shape, ModelSize::Small)
                .await?;

        if analysis.abort.unwrap_or(false) {
            return self.deps.conversation.handle(context, req, res).await;
        }

        let fields = (
            present(analysis.goal),
            present(analysis.deadline),
            present(analysis.return_address),
        );
        let (goal, deadline, return_address) = match fields {
            (Some(goal), Some(deadline), Some(address)) => (goal, deadline, address),
            (goal, deadline, address) => {
                let missing: Vec<&str> = [
                    (goal.is_none(), "a specific goal"),
                    (deadline.is_none(), "a deadline"),
                    (address.is_none(), "a Solana return address"),
                ]
                .into_iter()
                .filter_map(|(absent, label)| absent.then_some(label))
                .collect();
                return self
                    .deps
                    .reply(
                        req,
                        res,
                        format!(
                            "To create a contract, I'll need: {}. Please provide these details.",
                            missing.join(", ")
                        ),
                    )
                    .await;
            }
        };

        if !is_valid_return_address(&return_address) {
            return self
                .deps
                .reply(
                    req,
                    res,
                    "The provided Solana address appears to be invalid. Please check and provide a valid address.",
                )
                .await;
        }

        let Some(deadline) = parse_deadline(&deadline) else {
            return self
                .deps
                .reply(
                    req,
                    res,
                    "I couldn't understand that deadline. Please give a date such as 2030-01-31.",
                )
                .await;
        };
        if deadline <= Utc::now() {
            return self
                .deps
                .reply(req, res, "The deadline must be in the future.")
                .await;
        }

        let contract = self
            .deps
            .contracts
            .create(NewContract {
                user_id: req.input.user_id.clone(),
                goal,
                deadline,
                return_address,
                amount: None,
            })
            .await?;
        info!(contract_id = %contract.id, user_id = %contract.user_id, "Contract created");

        self.deps
            .reply(
                req,
                res,
                format!(
                    "Contract created successfully! I'll help you stay accountable to your goal.\n\n\
                     Contract ID: {}\nGoal: {}\nDeadline: {}",
                    contract.id,
                    contract.goal,
                    contract.deadline.format("%Y-%m-%d %H:%M UTC")
                ),
            )
            .await
    }
}

/// Guides a user who wants a contract but hasn't given every detail.
pub struct ContractFormationHelpRoute {
    deps: ContractDeps,
}

impl ContractFormationHelpRoute {
    pub fn new(deps: ContractDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl RouteHandler for ContractFormationHelpRoute {
    async fn handle(
        &self,
        context: &str,
        req: &AgentRequest,
        res: &mut AgentResponse,
    ) -> Result<(), PipelineError> {
        let prompt = format!(
            "{context}\n\n<SYSTEM> The user is trying to create an accountability contract, \
             but has not provided all of the following: a goal, deadline, and solana return \
             address. Guide them along and ask for the missing information. If it is not clear \
             they want to create a contract, ask them for clarification. </SYSTEM>"
        );
        let reply = self.deps.completions.complete(&prompt, ModelSize::Large).await?;
        self.deps.reply(req, res, reply).await
    }
}

/// Marks a contract completed when the user shows they met the goal.
pub struct ContractVerificationRoute {
    deps: ContractDeps,
}

impl ContractVerificationRoute {
    pub fn new(deps: ContractDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl RouteHandler for ContractVerificationRoute {
    async fn handle(
        &self,
        context: &str,
        req: &AgentRequest,
        res: &mut AgentResponse,
    ) -> Result<(), PipelineError> {
        let active = self.deps.active_contracts_section(&req.input.user_id).await?;
        let prompt = format!(
            "{context}\n\n{active}\n\n<SYSTEM> The user claims to have completed their contract. \
             See if they provided proof of the completion. If they did then return the contractId \
             of the contract they completed. Give them the benefit of doubt and believe them \
             unless they provide no proof at all. If the proof is insufficient, don't return a \
             contractId and include a message asking them to provide more proof. If the user is \
             not trying to complete a contract, return true for the abort field. </SYSTEM>"
        );
        let shape = optional_strings_shape("contract_verification", &["contractId", "message"]);
        let analysis: VerificationExtraction =
            complete_structured(self.deps.completions.as_ref(), &prompt, &shape, ModelSize::Large)
                .await?;

        if analysis.abort.unwrap_or(false) {
            return self.deps.conversation.handle(context, req, res).await;
        }

        let Some(contract_id) = present(analysis.contract_id) else {
            let message = present(analysis.message).unwrap_or_else(|| {
                "Please share some proof that you completed your goal so I can verify your contract."
                    .to_string()
            });
            return self.deps.reply(req, res, message).await;
        };

        let Some(contract) = self
            .deps
            .contracts
            .get_for_user(&contract_id, &req.input.user_id)
            .await?
        else {
            return self
                .deps
                .reply(req, res, "I couldn't find that specific contract. Please try again.")
                .await;
        };

        if contract.status != ContractStatus::Active {
            return self
                .deps
                .reply(req, res, format!("That contract is already {}.", contract.status))
                .await;
        }

        self.deps
            .contracts
            .update_status(&contract.id, ContractStatus::Completed)
            .await?;
        info!(contract_id = %contract.id, user_id = %contract.user_id, "Contract completed");

        self.deps
            .reply(
                req,
                res,
                format!(
                    "Contract completed successfully. Congratulations on reaching your goal: {}",
                    contract.goal
                ),
            )
            .await
    }
}

/// Cancels a recently formed contract.
pub struct ContractCancelRoute {
    deps: ContractDeps,
}

impl ContractCancelRoute {
    pub fn new(deps: ContractDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl RouteHandler for ContractCancelRoute {
    async fn handle(
        &self,
        context: &str,
        req: &AgentRequest,
        res: &mut AgentResponse,
    ) -> Result<(), PipelineError> {
        let active = self.deps.active_contracts_section(&req.input.user_id).await?;
        let prompt = format!(
            "{context}\n\n{active}\n\n<SYSTEM> The user may be trying to cancel a contract. If so \
             return the contractId of the contract they want to cancel. If they are not trying to \
             cancel a contract, return true for the abort field. </SYSTEM>"
        );
        let shape = optional_strings_shape("contract_cancel", &["contractId"]);
        let analysis: CancelExtraction =
            complete_structured(self.deps.completions.as_ref(), &prompt, &shape, ModelSize::Small)
                .await?;

        if analysis.abort.unwrap_or(false) {
            return self.deps.conversation.handle(context, req, res).await;
        }

        let contract = match present(analysis.contract_id) {
            Some(id) => {
                self.deps
                    .contracts
                    .get_for_user(&id, &req.input.user_id)
                    .await?
            }
            None => None,
        };
        let Some(contract) = contract else {
            return self
                .deps
                .reply(
                    req,
                    res,
                    "I couldn't find that specific contract. Please check the contract ID and try again.",
                )
                .await;
        };

        if contract.status != ContractStatus::Active {
            return self
                .deps
                .reply(req, res, format!("That contract is already {}.", contract.status))
                .await;
        }

        if contract.created_at < Utc::now() - Duration::hours(CANCEL_WINDOW_HOURS) {
            return self
                .deps
                .reply(
                    req,
                    res,
                    "You can only cancel a contract within 2 hours of creating it.",
                )
                .await;
        }

        self.deps
            .contracts
            .update_status(&contract.id, ContractStatus::Cancelled)
            .await?;
        info!(contract_id = %contract.id, user_id = %contract.user_id, "Contract cancelled");

        self.deps
            .reply(req, res, "Contract cancelled successfully.")
            .await
    }
}
