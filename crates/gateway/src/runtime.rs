//! Runtime assembly: completion service, memory, agent and pipeline built
//! once from configuration and shared by the gateway and the CLI.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use steward_agent::{Agent, Pipeline, standard_pipeline};
use steward_config::AppConfig;
use steward_core::error::RoutingError;
use steward_core::event::EventBus;
use steward_core::memory::MemoryStore;
use steward_core::persona::Character;
use steward_core::provider::CompletionService;
use steward_routes::{
    ContractStore, InMemoryContractStore, SqliteContractStore, register_standard_routes,
};
use tracing::{info, warn};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Everything needed to serve requests.
pub struct Runtime {
    pub pipeline: Pipeline,
    pub agents: HashMap<String, Arc<Agent>>,
    pub primary_agent: String,
    pub event_bus: Arc<EventBus>,
    pub memory: Arc<dyn MemoryStore>,
}

impl Runtime {
    /// Wire a runtime from already-built collaborators.
    pub fn assemble(
        config: &AppConfig,
        character: Character,
        completions: Arc<dyn CompletionService>,
        memory: Arc<dyn MemoryStore>,
        contracts: Arc<dyn ContractStore>,
    ) -> Result<Self, RoutingError> {
        let mut agent = Agent::new(character).with_sampling(config.agent.persona_sampling);
        register_standard_routes(
            &mut agent,
            Arc::clone(&completions),
            Arc::clone(&memory),
            contracts,
        )?;

        let primary_agent = agent.agent_id().to_string();
        let event_bus = Arc::new(EventBus::default());
        let pipeline = standard_pipeline(
            config,
            completions,
            Arc::clone(&memory),
            Some(Arc::clone(&event_bus)),
        );

        let mut agents = HashMap::new();
        agents.insert(primary_agent.clone(), Arc::new(agent));

        Ok(Self {
            pipeline,
            agents,
            primary_agent,
            event_bus,
            memory,
        })
    }

    pub fn agent(&self, agent_id: &str) -> Option<Arc<Agent>> {
        self.agents.get(agent_id).cloned()
    }

    pub fn primary(&self) -> Option<Arc<Agent>> {
        self.agent(&self.primary_agent)
    }
}

/// Contracts share the memory database when memory is SQLite-backed and
/// live in process memory otherwise.
pub async fn build_contract_store(config: &AppConfig) -> Result<Arc<dyn ContractStore>, BoxError> {
    match config.memory.backend.as_str() {
        "sqlite" => {
            let url = steward_memory::sqlite_url(config)?;
            Ok(Arc::new(SqliteContractStore::new(&url).await?))
        }
        _ => Ok(Arc::new(InMemoryContractStore::new())),
    }
}

/// Build a runtime from configuration.
pub async fn build_runtime(config: &AppConfig) -> Result<Runtime, BoxError> {
    config.validate()?;

    let providers = steward_providers::build_from_config(config);
    let completions = providers
        .default()
        .ok_or_else(|| format!("Provider '{}' is not configured", config.default_provider))?;
    if !config.has_api_key() {
        warn!(provider = %config.default_provider, "No API key configured; completions will fail");
    }

    let memory = steward_memory::build_from_config(config).await?;
    let contracts = build_contract_store(config).await?;

    let character = match &config.agent.character_path {
        Some(path) => Character::load(Path::new(path))?,
        None => Character::default(),
    };

    let runtime = Runtime::assemble(config, character, completions, memory, contracts)?;
    info!(
        agent_id = %runtime.primary_agent,
        provider = %config.default_provider,
        memory = runtime.memory.name(),
        stages = ?runtime.pipeline.stage_names(),
        "Runtime ready"
    );
    Ok(runtime)
}
