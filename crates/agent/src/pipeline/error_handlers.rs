//! Error handlers run when a request fails.

use async_trait::async_trait;
use steward_core::error::PipelineError;
use tracing::error;

use super::request::AgentRequest;
use super::response::{FailureReply, GENERIC_FAILURE_MESSAGE};

/// Observes a request failure. All registered handlers run, in order.
#[async_trait]
pub trait ErrorHandler: Send + Sync {
    fn name(&self) -> &str;

    async fn handle(
        &self,
        error: &PipelineError,
        req: &AgentRequest,
        reply: &mut FailureReply,
    ) -> Result<(), PipelineError>;
}

/// Logs the failure with the request identifiers.
pub struct LogErrorHandler;

#[async_trait]
impl ErrorHandler for LogErrorHandler {
    fn name(&self) -> &str {
        "log"
    }

    async fn handle(
        &self,
        error: &PipelineError,
        req: &AgentRequest,
        _reply: &mut FailureReply,
    ) -> Result<(), PipelineError> {
        error!(
            kind = %error.kind(),
            agent_id = %req.input.agent_id,
            user_id = %req.input.user_id,
            room_id = %req.input.room_id,
            source = ?req.input.source,
            error = %error,
            "Request failed"
        );
        Ok(())
    }
}

/// Answers the user with a fixed failure message, unless an earlier
/// handler already did.
pub struct ReplyErrorHandler {
    message: String,
}

impl ReplyErrorHandler {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Default for ReplyErrorHandler {
    fn default() -> Self {
        Self::new(GENERIC_FAILURE_MESSAGE)
    }
}

#[async_trait]
impl ErrorHandler for ReplyErrorHandler {
    fn name(&self) -> &str {
        "reply"
    }

    async fn handle(
        &self,
        _error: &PipelineError,
        _req: &AgentRequest,
        reply: &mut FailureReply,
    ) -> Result<(), PipelineError> {
        if reply.is_delivered() {
            return Ok(());
        }
        reply.send(self.message.clone()).await
    }
}
