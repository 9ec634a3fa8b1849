//! Channel trait: the abstraction over interactive input sources.
//!
//! A Channel turns an external conversation surface (terminal, chat
//! platform) into a stream of [`Input`]s and carries replies back.

use async_trait::async_trait;

use crate::error::ChannelError;
use crate::input::Input;

/// The core Channel trait.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Human-readable channel name (e.g., "cli").
    fn name(&self) -> &str;

    /// Start listening for incoming inputs.
    async fn start(
        &self,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<Input, ChannelError>>,
        ChannelError,
    >;

    /// Send a reply into a room.
    async fn send(&self, room_id: &str, content: &str) -> std::result::Result<(), ChannelError>;

    /// Stop the channel gracefully.
    async fn stop(&self) -> std::result::Result<(), ChannelError> {
        Ok(())
    }
}
