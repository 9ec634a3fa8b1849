//! Error types for the Steward domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`PipelineError`] is the
//! single type that flows through the request pipeline and its error handlers.

use thiserror::Error;

/// The top-level error type for non-pipeline Steward operations
/// (startup, configuration, persona loading).
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Routing errors ---
    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Completion did not match shape '{shape}': {reason}")]
    MalformedOutput { shape: String, reason: String },

    #[error("Image processing failed: {0}")]
    Image(String),
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    #[error("Message delivery failed to {channel}: {reason}")]
    DeliveryFailed { channel: String, reason: String },

    #[error("Channel connection lost: {0}")]
    ConnectionLost(String),
}

/// Malformed inbound input. Raised before any storage or completion call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required fields: {}", .0.join(", "))]
    MissingRequiredFields(Vec<&'static str>),

    #[error("text input requires a non-empty text field")]
    MissingText,

    #[error("text and image input requires both text and at least one image reference")]
    MissingTextOrImages,
}

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("No handler found for route: {route}")]
    UnmatchedRoute { route: String },

    #[error("Malformed route decision: {0}")]
    MalformedDecision(String),

    #[error("Classification failed: {0}")]
    Classification(#[source] ProviderError),

    #[error("Route with name '{0}' already exists")]
    DuplicateRoute(String),
}

/// Coarse classification of a [`PipelineError`], used for logging and for
/// mapping failures onto boundary status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Collaborator,
    Routing,
    Handler,
    Response,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Validation => "validation",
            Self::Collaborator => "collaborator",
            Self::Routing => "routing",
            Self::Handler => "handler",
            Self::Response => "response",
        };
        f.write_str(label)
    }
}

/// Any failure raised while a request moves through the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("Stage '{stage}' failed: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Router error: {0}")]
    Routing(#[from] RoutingError),

    #[error("Route handler error ({route}): {source}")]
    Handler {
        route: String,
        #[source]
        source: Box<PipelineError>,
    },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error("Response already finalized")]
    AlreadyFinalized,

    #[error("Response delivery failed: {0}")]
    Delivery(String),

    #[error("{0}")]
    Other(String),
}

impl PipelineError {
    /// Wrap a collaborator failure with the name of the stage that hit it.
    pub fn stage(
        stage: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Stage {
            stage,
            source: Box::new(source),
        }
    }

    /// Wrap a handler failure with the route that produced it.
    pub fn handler(route: impl Into<String>, source: PipelineError) -> Self {
        Self::Handler {
            route: route.into(),
            source: Box::new(source),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Stage { .. } | Self::Provider(_) | Self::Memory(_) | Self::Other(_) => {
                ErrorKind::Collaborator
            }
            Self::Routing(_) => ErrorKind::Routing,
            Self::Handler { .. } => ErrorKind::Handler,
            Self::AlreadyFinalized | Self::Delivery(_) => ErrorKind::Response,
        }
    }
}
