//! # Steward Core
//!
//! Domain types, traits, and error definitions for the Steward agent pipeline.
//! This crate has **no framework dependencies**: it defines the domain model
//! that all other crates implement against.
//!
//! Every external collaborator (completion service, memory store, input
//! channel) is a trait here. Implementations live in their respective crates,
//! so tests can swap in scripted stand-ins.

pub mod channel;
pub mod error;
pub mod event;
pub mod input;
pub mod memory;
pub mod persona;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use channel::Channel;
pub use error::{
    ChannelError, Error, ErrorKind, MemoryError, PipelineError, ProviderError, Result,
    RoutingError, ValidationError,
};
pub use event::{DomainEvent, EventBus};
pub use input::{Input, InputSource, InputType};
pub use memory::{Generator, Memory, MemoryQuery, MemoryScope, MemoryStore};
pub use persona::{Character, ExampleMessage, Style};
pub use provider::{CompletionService, ModelSize, OutputShape, complete_structured};
