//! The request pipeline and intent router: the heart of Steward.
//!
//! Every inbound message runs through the same ordered stages:
//!
//! 1. **Validate** the input shape
//! 2. **Load** recent history from the memory store
//! 3. **Wrap** history, persona and input into one context string
//! 4. **Persist** the inbound message
//! 5. **Route**: an LLM classifies the context and the matching route
//!    handler produces the reply
//!
//! Any stage can end the request by responding or failing; exactly one
//! outcome reaches the response sink.

pub mod agent;
pub mod context;
pub mod pipeline;
pub mod router;
pub mod stages;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use agent::Agent;
pub use context::{ContextAssembler, NO_HISTORY_MARKER};
pub use pipeline::{
    AgentRequest, AgentResponse, BufferedSink, ErrorHandler, FailureReply,
    GENERIC_FAILURE_MESSAGE, LogErrorHandler, Next, Outcome, Pipeline, ReplyErrorHandler,
    ResponseSink, Stage,
};
pub use router::{IntentRouter, Route, RouteDecision, RouteHandler, RouteRegistry};
pub use stages::{LoadMemories, PersistInput, ValidateInput, WrapContext};

use std::sync::Arc;
use steward_config::AppConfig;
use steward_core::event::EventBus;
use steward_core::memory::MemoryStore;
use steward_core::provider::CompletionService;

/// Build the standard five-stage pipeline from configuration.
pub fn standard_pipeline(
    config: &AppConfig,
    completions: Arc<dyn CompletionService>,
    store: Arc<dyn MemoryStore>,
    event_bus: Option<Arc<EventBus>>,
) -> Pipeline {
    let mut wrap = WrapContext::new();
    if config.pipeline.describe_images {
        wrap = wrap.with_image_descriptions(Arc::clone(&completions));
    }

    let mut router = IntentRouter::new(completions)
        .with_threshold(config.router.confidence_threshold)
        .with_model_size(config.router.classifier_size);
    if let Some(bus) = &event_bus {
        router = router.with_event_bus(Arc::clone(bus));
    }

    let mut pipeline = Pipeline::new();
    pipeline
        .use_stage(ValidateInput)
        .use_stage(
            LoadMemories::new(Arc::clone(&store))
                .with_limit(config.memory.history_limit)
                .with_scope(config.memory.scope),
        )
        .use_stage(wrap)
        .use_stage(PersistInput::new(store))
        .use_stage(router)
        .on_error(LogErrorHandler)
        .on_error(ReplyErrorHandler::default())
        .serialize_rooms(config.pipeline.serialize_rooms);

    if let Some(bus) = event_bus {
        pipeline.with_event_bus(bus);
    }

    pipeline
}
