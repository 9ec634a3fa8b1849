//! The fallback route: plain conversation.

use async_trait::async_trait;
use std::sync::Arc;
use steward_agent::{AgentRequest, AgentResponse, RouteHandler};
use steward_core::error::PipelineError;
use steward_core::memory::{Memory, MemoryStore};
use steward_core::provider::{CompletionService, ModelSize};
use tracing::debug;

pub const CONVERSATION_ROUTE: &str = "conversation";
pub const CONVERSATION_DESCRIPTION: &str =
    "Call if the user is just conversing or if none of the other routes apply";

/// Replies to the assembled context with the chat model and remembers the
/// reply.
pub struct ConversationRoute {
    completions: Arc<dyn CompletionService>,
    memory: Arc<dyn MemoryStore>,
}

impl ConversationRoute {
    pub fn new(completions: Arc<dyn CompletionService>, memory: Arc<dyn MemoryStore>) -> Self {
        Self {
            completions,
            memory,
        }
    }
}

#[async_trait]
impl RouteHandler for ConversationRoute {
    async fn handle(
        &self,
        context: &str,
        req: &AgentRequest,
        res: &mut AgentResponse,
    ) -> Result<(), PipelineError> {
        let reply = if req.input.has_images() {
            self.completions
                .complete_with_images(context, &req.input.image_urls)
                .await?
        } else {
            self.completions.complete(context, ModelSize::Large).await?
        };

        self.memory
            .append(Memory::agent_reply(&req.input, "agent", reply.clone()))
            .await?;
        debug!(room_id = %req.input.room_id, chars = reply.len(), "Conversation reply stored");

        res.send(reply).await
    }
}
