//! Completion service implementations for Steward.
//!
//! All services implement the `steward_core::CompletionService` trait.
//! The router selects the correct service based on configuration.

pub mod openai_compat;
pub mod router;

pub use openai_compat::{ModelTiers, OpenAiCompatProvider};
pub use router::{ProviderRouter, build_from_config};
