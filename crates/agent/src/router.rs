//! Intent routing: an LLM picks one registered route per request.
//!
//! The router asks the completion service for a [`RouteDecision`], checks it
//! against the agent's live route table, and dispatches to the matching
//! handler. A decision naming an unknown route fails the request; there is
//! no fallback route. Low confidence is logged, never blocked.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use steward_core::error::{PipelineError, ProviderError, RoutingError};
use steward_core::event::{DomainEvent, EventBus};
use steward_core::provider::{CompletionService, ModelSize, OutputShape, complete_structured};
use tracing::{debug, info, warn};

use crate::agent::Agent;
use crate::pipeline::{AgentRequest, AgentResponse, Next, Stage};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Handles the requests routed to one intent.
#[async_trait]
pub trait RouteHandler: Send + Sync {
    async fn handle(
        &self,
        context: &str,
        req: &AgentRequest,
        res: &mut AgentResponse,
    ) -> Result<(), PipelineError>;
}

/// A named, described handler the router can select.
#[derive(Clone)]
pub struct Route {
    pub name: String,
    pub description: String,
    pub handler: Arc<dyn RouteHandler>,
}

impl Route {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: Arc<dyn RouteHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            handler,
        }
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Routes in registration order, unique by name.
#[derive(Debug, Clone, Default)]
pub struct RouteRegistry {
    routes: Vec<Route>,
}

impl RouteRegistry {
    pub fn add(&mut self, route: Route) -> Result<(), RoutingError> {
        if self.get(&route.name).is_some() {
            return Err(RoutingError::DuplicateRoute(route.name));
        }
        self.routes.push(route);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.routes.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Structured classifier output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDecision {
    pub selected_route: String,
    pub confidence: f64,
    pub reasoning: String,
}

impl RouteDecision {
    pub fn shape() -> OutputShape {
        OutputShape::new(
            "route_decision",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "selectedRoute": { "type": "string" },
                    "confidence": { "type": "number", "minimum": 0, "maximum": 1 },
                    "reasoning": { "type": "string" }
                },
                "required": ["selectedRoute", "confidence", "reasoning"],
                "additionalProperties": false
            }),
        )
    }

    pub fn validate(&self) -> Result<(), RoutingError> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(RoutingError::MalformedDecision(format!(
                "confidence {} is outside [0, 1]",
                self.confidence
            )));
        }
        Ok(())
    }
}

/// Build the classification prompt for the agent's current route table.
pub fn routing_prompt(context: &str, agent: &Agent) -> String {
    let routes = agent
        .routes()
        .iter()
        .map(|r| format!("\"{}\": {}", r.name, r.description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "<CONTEXT>\n{context}\n</CONTEXT>\n\n\
         <SYSTEM>\n\
         You are functioning as a request router for an AI agent with the following system prompt:\n\n\
         {system}\n\n\
         Your task is to analyze incoming messages and route them to the most appropriate handler based on the available routes below. \
         Consider the agent's purpose and capabilities when making this decision.\n\n\
         Available Routes:\n{routes}\n\n\
         Based on the agent's system description and the available routes, select the most appropriate route to handle this interaction.\n\n\
         Respond with a JSON object containing:\n\
         - selectedRoute: The name of the selected route\n\
         - confidence: A number between 0 and 1 indicating confidence in the selection\n\
         - reasoning: A brief explanation of why this route was selected\n\
         </SYSTEM>",
        system = agent.system_prompt(),
    )
}

/// The routing stage.
pub struct IntentRouter {
    completions: Arc<dyn CompletionService>,
    threshold: f64,
    size: ModelSize,
    event_bus: Option<Arc<EventBus>>,
}

impl IntentRouter {
    pub fn new(completions: Arc<dyn CompletionService>) -> Self {
        Self {
            completions,
            threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            size: ModelSize::Large,
            event_bus: None,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_model_size(mut self, size: ModelSize) -> Self {
        self.size = size;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Classify the context and resolve the decision to a registered route.
    pub async fn select(&self, context: &str, agent: &Agent) -> Result<(RouteDecision, Route), RoutingError> {
        debug!(state = "pending_classification", routes = agent.routes().len(), "Classifying request");

        let prompt = routing_prompt(context, agent);
        let decision: RouteDecision =
            complete_structured(self.completions.as_ref(), &prompt, &RouteDecision::shape(), self.size)
                .await
                .map_err(|e| match e {
                    ProviderError::MalformedOutput { .. } => RoutingError::MalformedDecision(e.to_string()),
                    other => RoutingError::Classification(other),
                })?;
        decision.validate()?;

        let route = agent
            .routes()
            .get(&decision.selected_route)
            .cloned()
            .ok_or_else(|| RoutingError::UnmatchedRoute {
                route: decision.selected_route.clone(),
            })?;

        Ok((decision, route))
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("no context was assembled for this request")]
struct ContextNotAssembled;

#[async_trait]
impl Stage for IntentRouter {
    fn name(&self) -> &'static str {
        "router"
    }

    async fn handle(
        &self,
        req: &mut AgentRequest,
        res: &mut AgentResponse,
        next: Next<'_>,
    ) -> Result<(), PipelineError> {
        let Some(context) = req.context.clone() else {
            return Err(PipelineError::stage(self.name(), ContextNotAssembled));
        };
        let agent = Arc::clone(&req.agent);

        let (decision, route) = self.select(&context, &agent).await?;

        info!(
            state = "routed",
            route = %route.name,
            confidence = decision.confidence,
            "Route selected"
        );
        self.publish(DomainEvent::RouteSelected {
            route: route.name.clone(),
            confidence: decision.confidence,
            timestamp: Utc::now(),
        });

        if decision.confidence < self.threshold {
            warn!(
                route = %route.name,
                confidence = %format!("{:.2}", decision.confidence),
                threshold = self.threshold,
                reasoning = %decision.reasoning,
                "Low confidence routing decision"
            );
            self.publish(DomainEvent::LowConfidenceRoute {
                route: route.name.clone(),
                confidence: decision.confidence,
                reasoning: decision.reasoning.clone(),
                timestamp: Utc::now(),
            });
        }

        if let Err(e) = route.handler.handle(&context, req, res).await {
            debug!(state = "failed", route = %route.name, "Route handler failed");
            return Err(PipelineError::handler(route.name, e));
        }

        debug!(state = "handled", route = %route.name, "Route handled");
        next.run(req, res).await;
        Ok(())
    }
}
