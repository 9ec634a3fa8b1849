//! Request side of the pipeline.

use std::sync::Arc;
use steward_core::input::Input;
use steward_core::memory::Memory;

use crate::agent::Agent;

/// Mutable per-request state passed from stage to stage.
pub struct AgentRequest {
    pub input: Input,

    pub agent: Arc<Agent>,

    /// History, newest first. `None` until the load stage has run.
    pub memories: Option<Vec<Memory>>,

    /// The assembled prompt context
    pub context: Option<String>,

    /// Best-effort description of attached images
    pub image_description: Option<String>,
}

impl AgentRequest {
    pub fn new(input: Input, agent: Arc<Agent>) -> Self {
        Self {
            input,
            agent,
            memories: None,
            context: None,
            image_description: None,
        }
    }
}
