//! Interactive input channels for Steward.
//!
//! A channel turns a conversation surface into a stream of [`Input`]s for
//! the pipeline and prints replies back. The terminal is the only surface
//! shipped here; the HTTP boundary lives in `steward-gateway`.
//!
//! [`Input`]: steward_core::input::Input

pub mod cli;

pub use cli::CliChannel;
