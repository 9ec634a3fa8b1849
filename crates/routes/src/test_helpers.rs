//! Shared test helpers for route handler tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use steward_agent::{
    Agent, AgentRequest, AgentResponse, BufferedSink, Next, Outcome, Pipeline, RouteHandler, Stage,
};
use steward_core::error::{PipelineError, ProviderError};
use steward_core::input::{Input, InputSource};
use steward_core::persona::Character;
use steward_core::provider::{CompletionService, ModelSize, OutputShape};

/// Replays scripted text and JSON responses in order.
#[derive(Default)]
pub struct ScriptedCompletions {
    texts: Mutex<VecDeque<String>>,
    jsons: Mutex<VecDeque<serde_json::Value>>,
    fail: bool,
    sizes: Mutex<Vec<ModelSize>>,
    image_calls: Mutex<usize>,
}

impl ScriptedCompletions {
    pub fn json(responses: Vec<serde_json::Value>) -> Self {
        Self {
            jsons: Mutex::new(responses.into()),
            ..Self::default()
        }
    }

    pub fn text(responses: Vec<&str>) -> Self {
        Self::default().with_texts(responses)
    }

    pub fn with_texts(self, responses: Vec<&str>) -> Self {
        Self {
            texts: Mutex::new(responses.into_iter().map(String::from).collect()),
            ..self
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Model sizes requested by text and JSON calls, in order.
    pub fn sizes(&self) -> Vec<ModelSize> {
        self.sizes.lock().unwrap().clone()
    }

    pub fn image_calls(&self) -> usize {
        *self.image_calls.lock().unwrap()
    }

    fn next_text(&self) -> Result<String, ProviderError> {
        if self.fail {
            return Err(ProviderError::Timeout("120s".into()));
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
        if self.fail {
            return Err(ProviderError::Timeout("120s".into()));
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
        *self.image_calls.lock().unwrap() += 1;
        self.next_text()
    }
}

/// Terminal stage that hands the request straight to one route handler.
struct Invoke(Arc<dyn RouteHandler>);

#[async_trait]
impl Stage for Invoke {
    fn name(&self) -> &'static str {
        "invoke"
    }

    async fn handle(
        &self,
        req: &mut AgentRequest,
        res: &mut AgentResponse,
        _next: Next<'_>,
    ) -> Result<(), PipelineError> {
        let context = req
            .context
            .clone()
            .unwrap_or_else(|| req.input.text_content().unwrap_or_default().to_string());
        self.0.handle(&context, req, res).await
    }
}

pub fn text_input(text: &str) -> Input {
    Input::text(InputSource::Api, "u1", "stern", "stern_u1", text)
}

/// Run one handler for `input` and collect what reached the sink.
pub async fn run_handler(handler: impl RouteHandler + 'static, input: Input) -> Vec<Outcome> {
    let mut pipeline = Pipeline::new();
    pipeline.use_stage(Invoke(Arc::new(handler)));

    let sink = Arc::new(BufferedSink::new());
    let agent = Arc::new(Agent::new(Character::default()));
    pipeline.process(input, agent, sink.clone()).await;
    sink.outcomes().await
}
