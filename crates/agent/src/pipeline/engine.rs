//! The pipeline engine: an ordered chain of stages run once per request.
//!
//! Each stage receives the request, the response and a [`Next`] cursor.
//! Calling `next.run(..)` advances to the following stage; returning
//! without calling it ends the chain. A stage that returns `Err` is caught
//! at its call site and turned into `response.error(..)`; the chain is not
//! resumed after that.

use async_trait::async_trait;
use chrono::Utc;
use futures::future::BoxFuture;
use std::sync::Arc;
use steward_core::error::PipelineError;
use steward_core::event::{DomainEvent, EventBus};
use steward_core::input::Input;
use tracing::{debug, info_span, warn, Instrument};

use super::error_handlers::ErrorHandler;
use super::request::AgentRequest;
use super::response::{AgentResponse, ResponseSink};
use super::room_locks::RoomLocks;
use crate::agent::Agent;

/// One unit of the middleware chain.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stage name used in logs and stage errors.
    fn name(&self) -> &'static str;

    async fn handle(
        &self,
        req: &mut AgentRequest,
        res: &mut AgentResponse,
        next: Next<'_>,
    ) -> Result<(), PipelineError>;
}

/// Cursor over the remaining stages of one request.
pub struct Next<'a> {
    stages: &'a [Arc<dyn Stage>],
    index: usize,
}

impl<'a> Next<'a> {
    fn new(stages: &'a [Arc<dyn Stage>]) -> Self {
        Self { stages, index: 0 }
    }

    /// Run the next stage. Past the last stage this is a no-op.
    pub fn run<'r>(self, req: &'r mut AgentRequest, res: &'r mut AgentResponse) -> BoxFuture<'r, ()>
    where
        'a: 'r,
    {
        Box::pin(async move {
            let Some(stage) = self.stages.get(self.index) else {
                return;
            };
            let next = Next {
                stages: self.stages,
                index: self.index + 1,
            };

            debug!(stage = stage.name(), index = self.index, "Entering stage");
            if let Err(e) = stage.handle(req, res, next).await {
                debug!(stage = stage.name(), error = %e, "Stage failed");
                res.error(req, e).await;
            }
        })
    }

    /// Number of stages after the current one.
    pub fn remaining(&self) -> usize {
        self.stages.len().saturating_sub(self.index)
    }
}

/// The request pipeline. Built once at startup, then shared behind an `Arc`.
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
    error_handlers: Arc<Vec<Arc<dyn ErrorHandler>>>,
    event_bus: Option<Arc<EventBus>>,
    room_locks: Option<RoomLocks>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage. Stages run in registration order.
    pub fn use_stage(&mut self, stage: impl Stage + 'static) -> &mut Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Register an error handler. Every handler observes every failure.
    pub fn on_error(&mut self, handler: impl ErrorHandler + 'static) -> &mut Self {
        Arc::make_mut(&mut self.error_handlers).push(Arc::new(handler));
        self
    }

    pub fn with_event_bus(&mut self, bus: Arc<EventBus>) -> &mut Self {
        self.event_bus = Some(bus);
        self
    }

    /// Serialize requests that share a room.
    pub fn serialize_rooms(&mut self, enabled: bool) -> &mut Self {
        self.room_locks = enabled.then(RoomLocks::new);
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run one input through every stage.
    ///
    /// Exactly one outcome reaches `sink` unless a stage neither advances nor
    /// responds; that is logged as a warning.
    pub async fn process(&self, input: Input, agent: Arc<Agent>, sink: Arc<dyn ResponseSink>) {
        let span = info_span!(
            "request",
            agent_id = %input.agent_id,
            user_id = %input.user_id,
            room_id = %input.room_id,
        );

        async move {
            let _room_guard = match &self.room_locks {
                Some(locks) => Some(locks.acquire(&input.room_id).await),
                None => None,
            };

            if let Some(bus) = &self.event_bus {
                bus.publish(DomainEvent::InputReceived {
                    agent_id: input.agent_id.clone(),
                    user_id: input.user_id.clone(),
                    room_id: input.room_id.clone(),
                    timestamp: Utc::now(),
                });
            }

            let room_id = input.room_id.clone();
            let mut req = AgentRequest::new(input, agent);
            let mut res = AgentResponse::new(
                sink,
                Arc::clone(&self.error_handlers),
                self.event_bus.clone(),
                room_id,
            );

            Next::new(&self.stages).run(&mut req, &mut res).await;

            if !res.is_finalized() {
                warn!("Request finished without a response");
            }
        }
        .instrument(span)
        .await
    }
}
