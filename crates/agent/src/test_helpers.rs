//! Shared test helpers for pipeline and router tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use steward_core::error::{MemoryError, PipelineError, ProviderError};
use steward_core::input::{Input, InputSource};
use steward_core::memory::{Memory, MemoryQuery, MemoryStore};
use steward_core::persona::Character;
use steward_core::provider::{CompletionService, ModelSize, OutputShape};

use crate::agent::Agent;
use crate::pipeline::{AgentRequest, AgentResponse, Next, Stage};
use crate::router::{Route, RouteHandler};

/// A completion service that replays scripted responses in order.
///
/// Panics if more calls are made than responses provided.
#[derive(Default)]
pub struct ScriptedCompletions {
    texts: Mutex<VecDeque<String>>,
    jsons: Mutex<VecDeque<serde_json::Value>>,
    failure: Option<ProviderError>,
    sizes: Mutex<Vec<ModelSize>>,
    json_calls: Mutex<usize>,
}

impl ScriptedCompletions {
    pub fn json(responses: Vec<serde_json::Value>) -> Self {
        Self {
            jsons: Mutex::new(responses.into()),
            ..Self::default()
        }
    }

    pub fn text(responses: Vec<&str>) -> Self {
        Self {
            texts: Mutex::new(responses.into_iter().map(String::from).collect()),
            ..Self::default()
        }
    }

    /// Every call fails with `error`.
    pub fn failing(error: ProviderError) -> Self {
        Self {
            failure: Some(error),
            ..Self::default()
        }
    }

    pub fn json_calls(&self) -> usize {
        *self.json_calls.lock().unwrap()
    }

    pub fn sizes(&self) -> Vec<ModelSize> {
        self.sizes.lock().unwrap().clone()
    }

    fn next_text(&self) -> Result<String, ProviderError> {
        if let Some(e) = &self.failure {
            return Err(e.clone());
        }
        Ok(self
            .texts
            .lock()
            .unwrap()
            .pop_front()
            .expect("ScriptedCompletions: no more text responses"))
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletions {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _prompt: &str, size: ModelSize) -> Result<String, ProviderError> {
        self.sizes.lock().unwrap().push(size);
        self.next_text()
    }

    async fn complete_json(
        &self,
        _prompt: &str,
        _shape: &OutputShape,
        size: ModelSize,
    ) -> Result<serde_json::Value, ProviderError> {
        self.sizes.lock().unwrap().push(size);
        *self.json_calls.lock().unwrap() += 1;
        if let Some(e) = &self.failure {
            return Err(e.clone());
        }
        Ok(self
            .jsons
            .lock()
            .unwrap()
            .pop_front()
            .expect("ScriptedCompletions: no more json responses"))
    }

    async fn complete_with_images(
        &self,
        _prompt: &str,
        _image_urls: &[String],
    ) -> Result<String, ProviderError> {
        self.next_text()
    }
}

/// A route decision payload as the classifier would return it.
pub fn decision(route: &str, confidence: f64) -> serde_json::Value {
    serde_json::json!({
        "selectedRoute": route,
        "confidence": confidence,
        "reasoning": format!("looks like {route}"),
    })
}

pub fn route(name: &str, description: &str, handler: impl RouteHandler + 'static) -> Route {
    Route::new(name, description, Arc::new(handler))
}

/// Replies with a fixed text.
pub struct StaticReply(pub &'static str);

#[async_trait]
impl RouteHandler for StaticReply {
    async fn handle(
        &self,
        _context: &str,
        _req: &AgentRequest,
        res: &mut AgentResponse,
    ) -> Result<(), PipelineError> {
        res.send(self.0).await
    }
}

/// Always fails.
pub struct FailingRoute;

#[async_trait]
impl RouteHandler for FailingRoute {
    async fn handle(
        &self,
        _context: &str,
        _req: &AgentRequest,
        _res: &mut AgentResponse,
    ) -> Result<(), PipelineError> {
        Err(ProviderError::Network("connection reset".into()).into())
    }
}

/// Sets a fixed assembled context and advances.
pub struct FixedContext(pub &'static str);

#[async_trait]
impl Stage for FixedContext {
    fn name(&self) -> &'static str {
        "fixed_context"
    }

    async fn handle(
        &self,
        req: &mut AgentRequest,
        res: &mut AgentResponse,
        next: Next<'_>,
    ) -> Result<(), PipelineError> {
        req.context = Some(self.0.to_string());
        next.run(req, res).await;
        Ok(())
    }
}

/// Terminal stage that replies with the assembled context.
pub struct EchoContext;

#[async_trait]
impl Stage for EchoContext {
    fn name(&self) -> &'static str {
        "echo_context"
    }

    async fn handle(
        &self,
        req: &mut AgentRequest,
        res: &mut AgentResponse,
        _next: Next<'_>,
    ) -> Result<(), PipelineError> {
        res.send(req.context.clone().unwrap_or_default()).await
    }
}

/// A store whose every call fails.
pub struct FailingStore;

#[async_trait]
impl MemoryStore for FailingStore {
    fn name(&self) -> &str {
        "failing"
    }

    async fn append(&self, _memory: Memory) -> Result<String, MemoryError> {
        Err(MemoryError::Storage("disk full".into()))
    }

    async fn query(&self, _query: MemoryQuery) -> Result<Vec<Memory>, MemoryError> {
        Err(MemoryError::QueryFailed("database locked".into()))
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        Ok(0)
    }
}

pub fn test_agent() -> Arc<Agent> {
    Arc::new(Agent::new(Character::default()))
}

pub fn text_input(text: &str) -> Input {
    Input::text(InputSource::Api, "u1", "stern", "stern_u1", text)
}

pub fn request(agent: Arc<Agent>, text: &str) -> AgentRequest {
    AgentRequest::new(text_input(text), agent)
}
