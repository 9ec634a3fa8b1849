//! The request pipeline: engine, request/response state, error handlers.

pub mod engine;
pub mod error_handlers;
pub mod request;
pub mod response;
pub mod room_locks;

pub use engine::{Next, Pipeline, Stage};
pub use error_handlers::{ErrorHandler, LogErrorHandler, ReplyErrorHandler};
pub use request::AgentRequest;
pub use response::{
    AgentResponse, BufferedSink, FailureReply, GENERIC_FAILURE_MESSAGE, Outcome, ResponseSink,
};
pub use room_locks::RoomLocks;
