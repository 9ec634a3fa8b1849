//! HTTP gateway for Steward.
//!
//! Exposes the agent pipeline over HTTP:
//!
//! - `POST /agent/input` runs one input through the pipeline and returns
//!   the agent's reply
//! - `GET /health` for liveness checks
//!
//! Built on Axum. Every request is traced, bodies are capped at 1 MB and
//! clients are rate limited with a sliding window (`/health` exempt).

pub mod runtime;

pub use runtime::{BoxError, Runtime, build_contract_store, build_runtime};

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::State,
    http::{HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::Json,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use steward_agent::{BufferedSink, GENERIC_FAILURE_MESSAGE, Outcome};
use steward_config::AppConfig;
use steward_core::error::ErrorKind;
use steward_core::input::{Input, InputSource, InputType};

type SharedState = Arc<Runtime>;

/// Build the Axum router with all gateway routes and layers.
pub fn build_router(runtime: SharedState, rate_limit_per_minute: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("http://localhost:3000"))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(Duration::from_secs(3600));

    let rate_limiter = Arc::new(RateLimiter::new(rate_limit_per_minute, Duration::from_secs(60)));

    Router::new()
        .route("/health", get(health_handler))
        .route("/agent/input", post(agent_input_handler))
        .with_state(runtime)
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1 MB body limit
        .layer(middleware::from_fn(move |req: axum::extract::Request, next: Next| {
            let limiter = rate_limiter.clone();
            rate_limit_middleware(limiter, req, next)
        }))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), BoxError> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let runtime = Arc::new(build_runtime(&config).await?);
    let app = build_router(runtime, config.gateway.rate_limit_per_minute);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Rate Limiter ---

/// Simple in-memory sliding-window rate limiter.
///
/// Tracks request timestamps per client key.
/// Thread-safe via `std::sync::Mutex` (non-async, held briefly).
struct RateLimiter {
    max_requests: usize,
    window: Duration,
    clients: std::sync::Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Check if the client is within rate limits. Returns `true` if allowed.
    fn check(&self, client_key: &str) -> bool {
        let now = Instant::now();
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());

        if clients.len() > 10_000 {
            clients.retain(|_, timestamps| {
                timestamps
                    .last()
                    .is_some_and(|t| now.duration_since(*t) < self.window)
            });
        }

        let timestamps = clients.entry(client_key.to_string()).or_default();
        timestamps.retain(|t| now.duration_since(*t) < self.window);

        if timestamps.len() >= self.max_requests {
            return false;
        }

        timestamps.push(now);
        true
    }
}

/// Keys clients by `X-Forwarded-For`, then `Authorization`, else
/// "anonymous". Returns 429 Too Many Requests when exceeded.
async fn rate_limit_middleware(
    limiter: Arc<RateLimiter>,
    req: axum::extract::Request,
    next: Next,
) -> Result<axum::response::Response, StatusCode> {
    if req.uri().path() == "/health" {
        return Ok(next.run(req).await);
    }

    let client_key = {
        let header_value = |name: &str| {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        };
        header_value("X-Forwarded-For")
            .or_else(|| header_value("Authorization"))
            .unwrap_or_else(|| "anonymous".to_string())
    };

    if !limiter.check(&client_key) {
        warn!(client = %client_key.chars().take(20).collect::<String>(), "Rate limit exceeded");
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }

    Ok(next.run(req).await)
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Deserialize)]
struct AgentInputRequest {
    input: InputBody,
}

/// The inbound input as clients send it. Only `agentId` and `userId` are
/// needed to address a conversation; the pipeline validates the rest.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InputBody {
    #[serde(default)]
    agent_id: String,
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    room_id: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<InputType>,
    #[serde(default)]
    image_urls: Vec<String>,
}

impl InputBody {
    fn into_input(self) -> Input {
        let has_text = self.text.as_deref().is_some_and(|t| !t.is_empty());
        let kind = self.kind.unwrap_or(match (has_text, self.image_urls.is_empty()) {
            (true, false) => InputType::TextAndImage,
            (false, false) => InputType::Image,
            _ => InputType::Text,
        });
        let room_id = self
            .room_id
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| format!("{}_{}", self.agent_id, self.user_id));

        Input {
            source: InputSource::Network,
            user_id: self.user_id,
            agent_id: self.agent_id,
            room_id,
            kind,
            text: self.text,
            image_urls: self.image_urls,
            audio_url: None,
            video_url: None,
        }
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn agent_input_handler(
    State(runtime): State<SharedState>,
    Json(payload): Json<AgentInputRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    let Some(agent) = runtime.agent(&payload.input.agent_id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Agent not found" })),
        );
    };

    let input = payload.input.into_input();
    let sink = Arc::new(BufferedSink::new());
    runtime.pipeline.process(input, agent, sink.clone()).await;

    match sink.take().await {
        Some(Outcome::Text(text)) => (StatusCode::OK, Json(serde_json::Value::String(text))),
        Some(Outcome::Json(value)) => (StatusCode::OK, Json(value)),
        Some(Outcome::Failure { kind, message }) => {
            (status_for(kind), Json(json!({ "error": message })))
        }
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": GENERIC_FAILURE_MESSAGE })),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use steward_core::error::ProviderError;
    use steward_core::memory::{MemoryQuery, MemoryScope, MemoryStore};
    use steward_core::persona::Character;
    use steward_core::provider::{CompletionService, ModelSize, OutputShape};
    use steward_memory::InMemoryStore;
    use steward_routes::InMemoryContractStore;
    use tower::ServiceExt;

    /// Replays route decisions and text replies in order.
    #[derive(Default)]
    struct Scripted {
        jsons: Mutex<VecDeque<serde_json::Value>>,
        texts: Mutex<VecDeque<String>>,
        calls: Mutex<usize>,
    }

    impl Scripted {
        fn new(jsons: Vec<serde_json::Value>, texts: Vec<&str>) -> Self {
            Self {
                jsons: Mutex::new(jsons.into()),
                texts: Mutex::new(texts.into_iter().map(String::from).collect()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl CompletionService for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _prompt: &str, _size: ModelSize) -> Result<String, ProviderError> {
            *self.calls.lock().unwrap() += 1;
            self.texts
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ProviderError::Network("script exhausted".into()))
        }

        async fn complete_json(
            &self,
            _prompt: &str,
            _shape: &OutputShape,
            _size: ModelSize,
        ) -> Result<serde_json::Value, ProviderError> {
            *self.calls.lock().unwrap() += 1;
            self.jsons
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ProviderError::Network("script exhausted".into()))
        }
    }

    fn decision(route: &str) -> serde_json::Value {
        json!({ "selectedRoute": route, "confidence": 0.9, "reasoning": "test" })
    }

    struct Harness {
        app: Router,
        completions: Arc<Scripted>,
        memory: Arc<InMemoryStore>,
    }

    fn harness(completions: Scripted, rate_limit: usize) -> Harness {
        let config = AppConfig::default();
        let completions = Arc::new(completions);
        let memory = Arc::new(InMemoryStore::new());
        let runtime = Runtime::assemble(
            &config,
            Character::default(),
            completions.clone(),
            memory.clone(),
            Arc::new(InMemoryContractStore::new()),
        )
        .unwrap();
        Harness {
            app: build_router(Arc::new(runtime), rate_limit),
            completions,
            memory,
        }
    }

    fn post_input(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/agent/input")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint() {
        let h = harness(Scripted::default(), 60);
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();

        let response = h.app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn conversation_reply_is_returned() {
        let h = harness(Scripted::new(vec![decision("conversation")], vec!["Hello, u1."]), 60);

        let response = h
            .app
            .oneshot(post_input(json!({ "input": { "agentId": "stern", "userId": "u1", "text": "hi" } })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!("Hello, u1."));

        let stored = h
            .memory
            .query(MemoryQuery {
                scope: MemoryScope::Room("stern_u1".into()),
                limit: 10,
            })
            .await
            .unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[tokio::test]
    async fn unknown_agent_is_404() {
        let h = harness(Scripted::default(), 60);

        let response = h
            .app
            .oneshot(post_input(json!({ "input": { "agentId": "nobody", "userId": "u1", "text": "hi" } })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await, json!({ "error": "Agent not found" }));
    }

    #[tokio::test]
    async fn empty_text_is_400_without_completions() {
        let h = harness(Scripted::default(), 60);

        let response = h
            .app
            .oneshot(post_input(json!({ "input": { "agentId": "stern", "userId": "u1", "text": "" } })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await, json!({ "error": GENERIC_FAILURE_MESSAGE }));
        assert_eq!(h.completions.calls(), 0);
        assert_eq!(h.memory.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unmatched_route_is_500() {
        let h = harness(Scripted::new(vec![decision("refund")], vec![]), 60);

        let response = h
            .app
            .oneshot(post_input(json!({ "input": { "agentId": "stern", "userId": "u1", "text": "refund me" } })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(h.completions.calls(), 1);
    }

    #[tokio::test]
    async fn rate_limit_spares_health() {
        let h = harness(Scripted::default(), 1);
        let missing_user = || post_input(json!({ "input": { "agentId": "stern", "text": "hi" } }));

        let first = h.app.clone().oneshot(missing_user()).await.unwrap();
        assert_eq!(first.status(), StatusCode::BAD_REQUEST);

        let second = h.app.clone().oneshot(missing_user()).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);

        let health = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = h.app.oneshot(health).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn input_type_follows_payload() {
        let body: AgentInputRequest = serde_json::from_value(json!({
            "input": { "agentId": "stern", "userId": "u1", "text": "look", "imageUrls": ["https://img/1.png"] }
        }))
        .unwrap();
        let input = body.input.into_input();
        assert_eq!(input.kind, InputType::TextAndImage);
        assert_eq!(input.room_id, "stern_u1");
        assert_eq!(input.source, InputSource::Network);

        let body: AgentInputRequest = serde_json::from_value(json!({
            "input": { "agentId": "stern", "userId": "u1", "roomId": "lobby", "imageUrls": ["https://img/1.png"] }
        }))
        .unwrap();
        let input = body.input.into_input();
        assert_eq!(input.kind, InputType::Image);
        assert_eq!(input.room_id, "lobby");
    }
}
