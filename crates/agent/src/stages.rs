//! The built-in pipeline stages, in the order the standard pipeline runs
//! them: validate, load history, wrap context, persist the input.

use async_trait::async_trait;
use std::sync::Arc;
use steward_config::HistoryScope;
use steward_core::error::PipelineError;
use steward_core::memory::{Memory, MemoryQuery, MemoryScope, MemoryStore};
use steward_core::provider::CompletionService;
use tracing::{debug, warn};

use crate::context::ContextAssembler;
use crate::pipeline::{AgentRequest, AgentResponse, Next, Stage};

/// Rejects malformed input before any storage or completion call.
pub struct ValidateInput;

#[async_trait]
impl Stage for ValidateInput {
    fn name(&self) -> &'static str {
        "validate_input"
    }

    async fn handle(
        &self,
        req: &mut AgentRequest,
        res: &mut AgentResponse,
        next: Next<'_>,
    ) -> Result<(), PipelineError> {
        req.input.validate()?;
        next.run(req, res).await;
        Ok(())
    }
}

/// Loads recent history for the user (or room) into the request.
pub struct LoadMemories {
    store: Arc<dyn MemoryStore>,
    limit: usize,
    scope: HistoryScope,
}

impl LoadMemories {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self {
            store,
            limit: 100,
            scope: HistoryScope::User,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_scope(mut self, scope: HistoryScope) -> Self {
        self.scope = scope;
        self
    }
}

#[async_trait]
impl Stage for LoadMemories {
    fn name(&self) -> &'static str {
        "load_memories"
    }

    async fn handle(
        &self,
        req: &mut AgentRequest,
        res: &mut AgentResponse,
        next: Next<'_>,
    ) -> Result<(), PipelineError> {
        let scope = match self.scope {
            HistoryScope::User => MemoryScope::User(req.input.user_id.clone()),
            HistoryScope::Room => MemoryScope::Room(req.input.room_id.clone()),
        };

        let memories = self
            .store
            .query(MemoryQuery {
                scope,
                limit: self.limit,
            })
            .await
            .map_err(|e| PipelineError::stage(self.name(), e))?;

        debug!(count = memories.len(), store = self.store.name(), "Loaded memories");
        req.memories = Some(memories);
        next.run(req, res).await;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("history was never loaded for this request")]
struct HistoryNotLoaded;

/// Assembles the prompt context, describing attached images first when a
/// vision-capable service is configured.
pub struct WrapContext {
    assembler: ContextAssembler,
    vision: Option<Arc<dyn CompletionService>>,
}

impl WrapContext {
    pub fn new() -> Self {
        Self {
            assembler: ContextAssembler::new(),
            vision: None,
        }
    }

    pub fn with_image_descriptions(mut self, service: Arc<dyn CompletionService>) -> Self {
        self.vision = Some(service);
        self
    }

    /// Best effort: a failed description is logged and skipped.
    async fn describe_images(&self, req: &AgentRequest) -> Option<String> {
        let service = self.vision.as_ref()?;
        if !req.input.has_images() {
            return None;
        }

        match service.describe_images(&req.input.image_urls).await {
            Ok(description) => Some(description),
            Err(e) => {
                warn!(error = %e, images = req.input.image_urls.len(), "Image description failed");
                None
            }
        }
    }
}

impl Default for WrapContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Stage for WrapContext {
    fn name(&self) -> &'static str {
        "wrap_context"
    }

    async fn handle(
        &self,
        req: &mut AgentRequest,
        res: &mut AgentResponse,
        next: Next<'_>,
    ) -> Result<(), PipelineError> {
        if req.memories.is_none() {
            return Err(PipelineError::stage(self.name(), HistoryNotLoaded));
        }

        req.image_description = self.describe_images(req).await;

        let agent_context = req.agent.agent_context();
        let context = self.assembler.assemble(
            req.memories.as_deref().unwrap_or_default(),
            &agent_context,
            &req.input,
            req.image_description.as_deref(),
        );
        req.context = Some(context);

        next.run(req, res).await;
        Ok(())
    }
}

/// Stores the inbound input as a user-authored memory.
pub struct PersistInput {
    store: Arc<dyn MemoryStore>,
}

impl PersistInput {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Stage for PersistInput {
    fn name(&self) -> &'static str {
        "persist_input"
    }

    async fn handle(
        &self,
        req: &mut AgentRequest,
        res: &mut AgentResponse,
        next: Next<'_>,
    ) -> Result<(), PipelineError> {
        self.store
            .append(Memory::from_input(&req.input))
            .await
            .map_err(|e| PipelineError::stage(self.name(), e))?;

        next.run(req, res).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NO_HISTORY_MARKER;
    use crate::pipeline::{BufferedSink, Outcome, Pipeline};
    use crate::test_helpers::{EchoContext, FailingStore, ScriptedCompletions, test_agent, text_input};
    use steward_core::error::{ErrorKind, ProviderError};
    use steward_core::input::InputSource;
    use steward_core::input::Input;
    use steward_memory::InMemoryStore;

    async fn run(pipeline: &Pipeline, input: Input) -> Vec<Outcome> {
        let sink = Arc::new(BufferedSink::new());
        pipeline.process(input, test_agent(), sink.clone()).await;
        sink.outcomes().await
    }

    #[tokio::test]
    async fn empty_text_fails_validation_before_storage() {
        let store = Arc::new(InMemoryStore::new());
        let mut pipeline = Pipeline::new();
        pipeline
            .use_stage(ValidateInput)
            .use_stage(PersistInput::new(store.clone()));

        let outcomes = run(&pipeline, text_input("")).await;
        assert!(matches!(
            &outcomes[..],
            [Outcome::Failure { kind: ErrorKind::Validation, .. }]
        ));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn store_failure_is_a_stage_error() {
        let mut pipeline = Pipeline::new();
        pipeline.use_stage(LoadMemories::new(Arc::new(FailingStore)));

        let outcomes = run(&pipeline, text_input("hi")).await;
        assert!(matches!(
            &outcomes[..],
            [Outcome::Failure { kind: ErrorKind::Collaborator, .. }]
        ));
    }

    #[tokio::test]
    async fn wrap_without_history_fails_closed() {
        let mut pipeline = Pipeline::new();
        pipeline.use_stage(WrapContext::new()).use_stage(EchoContext);

        let outcomes = run(&pipeline, text_input("hi")).await;
        assert!(matches!(
            &outcomes[..],
            [Outcome::Failure { kind: ErrorKind::Collaborator, .. }]
        ));
    }

    #[tokio::test]
    async fn history_flows_into_context_and_input_is_persisted() {
        let store = Arc::new(InMemoryStore::new());
        let mut pipeline = Pipeline::new();
        pipeline
            .use_stage(ValidateInput)
            .use_stage(LoadMemories::new(store.clone()))
            .use_stage(WrapContext::new())
            .use_stage(PersistInput::new(store.clone()))
            .use_stage(EchoContext);

        let first = run(&pipeline, text_input("first message")).await;
        let Outcome::Text(context) = &first[0] else {
            panic!("expected text outcome, got {first:?}");
        };
        assert!(context.contains(NO_HISTORY_MARKER));
        assert!(context.contains("Text: first message"));

        let second = run(&pipeline, text_input("second message")).await;
        let Outcome::Text(context) = &second[0] else {
            panic!("expected text outcome, got {second:?}");
        };
        assert!(context.contains("User u1: first message"));
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn room_scope_ignores_other_rooms() {
        let store = Arc::new(InMemoryStore::new());
        let other_room = Input::text(InputSource::Api, "u1", "stern", "elsewhere", "old news");
        store.append(Memory::from_input(&other_room)).await.unwrap();

        let mut pipeline = Pipeline::new();
        pipeline
            .use_stage(LoadMemories::new(store.clone()).with_scope(HistoryScope::Room))
            .use_stage(WrapContext::new())
            .use_stage(EchoContext);

        let outcomes = run(&pipeline, text_input("hi")).await;
        let Outcome::Text(context) = &outcomes[0] else {
            panic!("expected text outcome");
        };
        assert!(!context.contains("old news"));
    }

    #[tokio::test]
    async fn image_description_added_when_available() {
        let vision = Arc::new(ScriptedCompletions::text(vec!["a red bicycle"]));
        let mut pipeline = Pipeline::new();
        pipeline
            .use_stage(LoadMemories::new(Arc::new(InMemoryStore::new())))
            .use_stage(WrapContext::new().with_image_descriptions(vision))
            .use_stage(EchoContext);

        let input = text_input("what is this?").with_images(vec!["https://img/1.png".into()]);
        let outcomes = run(&pipeline, input).await;
        let Outcome::Text(context) = &outcomes[0] else {
            panic!("expected text outcome");
        };
        assert!(context.contains("<IMAGE_DESCRIPTION>\na red bicycle\n</IMAGE_DESCRIPTION>"));
    }

    #[tokio::test]
    async fn image_description_failure_is_skipped() {
        let vision = Arc::new(ScriptedCompletions::failing(ProviderError::Image(
            "Failed to process images".into(),
        )));
        let mut pipeline = Pipeline::new();
        pipeline
            .use_stage(LoadMemories::new(Arc::new(InMemoryStore::new())))
            .use_stage(WrapContext::new().with_image_descriptions(vision))
            .use_stage(EchoContext);

        let input = text_input("what is this?").with_images(vec!["https://img/1.png".into()]);
        let outcomes = run(&pipeline, input).await;
        let Outcome::Text(context) = &outcomes[0] else {
            panic!("expected text outcome");
        };
        assert!(!context.contains("<IMAGE_DESCRIPTION>"));
        assert!(context.contains("Image: https://img/1.png"));
    }
}
