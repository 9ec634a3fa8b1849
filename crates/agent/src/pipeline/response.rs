//! Response side of the pipeline: outcomes, sinks and the per-request
//! response handle.
//!
//! Every request ends in exactly one [`Outcome`] delivered to its
//! [`ResponseSink`]. [`AgentResponse`] enforces that: the first `send`,
//! `json` or `error` finalizes it, and later writes are rejected or logged.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use steward_core::error::{ErrorKind, PipelineError};
use steward_core::event::{DomainEvent, EventBus};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use super::error_handlers::ErrorHandler;
use super::request::AgentRequest;

/// The user-facing acknowledgment for any failure.
pub const GENERIC_FAILURE_MESSAGE: &str = "Sorry, something went wrong while handling your message.";

/// The single terminal result of a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Text(String),
    Json(serde_json::Value),
    Failure { kind: ErrorKind, message: String },
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }
}

/// Where a request's outcome goes.
#[async_trait]
pub trait ResponseSink: Send + Sync {
    async fn deliver(&self, outcome: Outcome) -> Result<(), PipelineError>;
}

/// A sink that keeps delivered outcomes for the caller to collect.
#[derive(Default)]
pub struct BufferedSink {
    outcomes: Mutex<Vec<Outcome>>,
}

impl BufferedSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first delivered outcome, removing everything buffered.
    pub async fn take(&self) -> Option<Outcome> {
        let mut outcomes = self.outcomes.lock().await;
        let first = outcomes.drain(..).next();
        first
    }

    /// A copy of every outcome delivered so far.
    pub async fn outcomes(&self) -> Vec<Outcome> {
        self.outcomes.lock().await.clone()
    }
}

#[async_trait]
impl ResponseSink for BufferedSink {
    async fn deliver(&self, outcome: Outcome) -> Result<(), PipelineError> {
        self.outcomes.lock().await.push(outcome);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseState {
    Open,
    Sent,
    Failed,
}

/// The response handle owned by one in-flight request.
pub struct AgentResponse {
    sink: Arc<dyn ResponseSink>,
    error_handlers: Arc<Vec<Arc<dyn ErrorHandler>>>,
    event_bus: Option<Arc<EventBus>>,
    room_id: String,
    state: ResponseState,
}

impl AgentResponse {
    pub(crate) fn new(
        sink: Arc<dyn ResponseSink>,
        error_handlers: Arc<Vec<Arc<dyn ErrorHandler>>>,
        event_bus: Option<Arc<EventBus>>,
        room_id: String,
    ) -> Self {
        Self {
            sink,
            error_handlers,
            event_bus,
            room_id,
            state: ResponseState::Open,
        }
    }

    /// Whether a terminal outcome has been produced.
    pub fn is_finalized(&self) -> bool {
        self.state != ResponseState::Open
    }

    /// Whether the request ended in failure.
    pub fn is_failed(&self) -> bool {
        self.state == ResponseState::Failed
    }

    /// Deliver a text reply.
    pub async fn send(&mut self, content: impl Into<String> + Send) -> Result<(), PipelineError> {
        self.deliver_success(Outcome::Text(content.into())).await
    }

    /// Deliver a structured reply.
    pub async fn json(&mut self, value: serde_json::Value) -> Result<(), PipelineError> {
        self.deliver_success(Outcome::Json(value)).await
    }

    async fn deliver_success(&mut self, outcome: Outcome) -> Result<(), PipelineError> {
        if self.is_finalized() {
            warn!(room_id = %self.room_id, "Response already finalized, dropping write");
            return Err(PipelineError::AlreadyFinalized);
        }
        self.state = ResponseState::Sent;
        self.sink.deliver(outcome).await?;

        debug!(room_id = %self.room_id, "Response sent");
        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::ResponseSent {
                room_id: self.room_id.clone(),
                timestamp: Utc::now(),
            });
        }
        Ok(())
    }

    /// Finalize the request as failed and fan the error out to every
    /// registered error handler, in order.
    ///
    /// A handler that fails is logged and skipped. If no handler delivers a
    /// failure reply, the generic acknowledgment is delivered. Errors raised
    /// after the response was finalized are logged only.
    pub async fn error(&mut self, req: &AgentRequest, error: PipelineError) {
        if self.is_finalized() {
            warn!(
                room_id = %self.room_id,
                kind = %error.kind(),
                error = %error,
                "Error raised after response was finalized"
            );
            return;
        }
        self.state = ResponseState::Failed;

        let mut reply = FailureReply::new(Arc::clone(&self.sink), error.kind());
        for handler in self.error_handlers.iter() {
            if let Err(handler_error) = handler.handle(&error, req, &mut reply).await {
                error!(
                    handler = handler.name(),
                    error = %handler_error,
                    "Error handler failed"
                );
            }
        }

        if !reply.is_delivered() {
            if let Err(e) = reply.send(GENERIC_FAILURE_MESSAGE).await {
                error!(room_id = %self.room_id, error = %e, "Failed to deliver failure reply");
            }
        }

        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::RequestFailed {
                room_id: self.room_id.clone(),
                kind: error.kind().to_string(),
                error_message: error.to_string(),
                timestamp: Utc::now(),
            });
        }
    }
}

/// The channel error handlers use to answer a failed request.
///
/// Delivers at most one failure message.
pub struct FailureReply {
    sink: Arc<dyn ResponseSink>,
    kind: ErrorKind,
    delivered: bool,
}

impl FailureReply {
    fn new(sink: Arc<dyn ResponseSink>, kind: ErrorKind) -> Self {
        Self {
            sink,
            kind,
            delivered: false,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is_delivered(&self) -> bool {
        self.delivered
    }

    pub async fn send(&mut self, message: impl Into<String> + Send) -> Result<(), PipelineError> {
        if self.delivered {
            return Err(PipelineError::AlreadyFinalized);
        }
        self.delivered = true;
        self.sink
            .deliver(Outcome::Failure {
                kind: self.kind,
                message: message.into(),
            })
            .await
    }
}
