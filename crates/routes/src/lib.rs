//! Route handlers for Steward agents.
//!
//! The intent router picks one of these per request:
//!
//! | Route | Handles |
//! |---|---|
//! | `conversation` | small talk, and anything no other route claims |
//! | `contract_create` | forming a goal contract from complete details |
//! | `contract_formation_help` | asking for the details still missing |
//! | `contract_verification` | marking a contract completed |
//! | `contract_cancel` | cancelling a contract shortly after forming it |

pub mod contract;
pub mod conversation;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use contract::{
    Contract, ContractCancelRoute, ContractCreateRoute, ContractDeps, ContractError,
    ContractFormationHelpRoute, ContractStatus, ContractStore, ContractVerificationRoute,
    InMemoryContractStore, NewContract,
};
pub use conversation::ConversationRoute;

#[cfg(feature = "sqlite")]
pub use contract::SqliteContractStore;

use std::sync::Arc;
use steward_agent::{Agent, Route};
use steward_core::error::RoutingError;
use steward_core::memory::MemoryStore;
use steward_core::provider::CompletionService;

/// All five routes, conversation first.
pub fn standard_routes(
    completions: Arc<dyn CompletionService>,
    memory: Arc<dyn MemoryStore>,
    contracts: Arc<dyn ContractStore>,
) -> Vec<Route> {
    let deps = ContractDeps::new(completions, memory, contracts);

    vec![
        Route::new(
            conversation::CONVERSATION_ROUTE,
            conversation::CONVERSATION_DESCRIPTION,
            deps.conversation.clone(),
        ),
        Route::new(
            contract::CONTRACT_CREATE_ROUTE,
            contract::CONTRACT_CREATE_DESCRIPTION,
            Arc::new(ContractCreateRoute::new(deps.clone())),
        ),
        Route::new(
            contract::CONTRACT_FORMATION_HELP_ROUTE,
            contract::CONTRACT_FORMATION_HELP_DESCRIPTION,
            Arc::new(ContractFormationHelpRoute::new(deps.clone())),
        ),
        Route::new(
            contract::CONTRACT_VERIFICATION_ROUTE,
            contract::CONTRACT_VERIFICATION_DESCRIPTION,
            Arc::new(ContractVerificationRoute::new(deps.clone())),
        ),
        Route::new(
            contract::CONTRACT_CANCEL_ROUTE,
            contract::CONTRACT_CANCEL_DESCRIPTION,
            Arc::new(ContractCancelRoute::new(deps)),
        ),
    ]
}

/// Register [`standard_routes`] on `agent`.
pub fn register_standard_routes(
    agent: &mut Agent,
    completions: Arc<dyn CompletionService>,
    memory: Arc<dyn MemoryStore>,
    contracts: Arc<dyn ContractStore>,
) -> Result<(), RoutingError> {
    for route in standard_routes(completions, memory, contracts) {
        agent.add_route(route)?;
    }
    Ok(())
}
