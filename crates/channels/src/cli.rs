//! CLI channel: interactive terminal-based chat.
//!
//! Reads one message per line and prints replies to stdout. A line of the
//! form `/image <url> [text]` attaches an image reference to the message.
//! Used by `steward chat`.

use async_trait::async_trait;
use steward_core::channel::Channel;
use steward_core::error::ChannelError;
use steward_core::input::{Input, InputSource, InputType};
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

/// User id for terminal sessions.
pub const CLI_USER_ID: &str = "cli_user";

const EXIT_COMMANDS: [&str; 5] = ["exit", "quit", "/exit", "/quit", ":q"];

type LineSource = Box<dyn AsyncBufRead + Send + Unpin>;

/// Interactive CLI channel for terminal-based chat.
pub struct CliChannel {
    agent_id: String,
    user_id: String,
    source: Mutex<Option<LineSource>>,
}

impl CliChannel {
    /// A channel reading stdin on behalf of [`CLI_USER_ID`].
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            user_id: CLI_USER_ID.into(),
            source: Mutex::new(Some(Box::new(BufReader::new(io::stdin())))),
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    /// Read lines from `reader` instead of stdin.
    pub fn with_reader(self, reader: impl AsyncBufRead + Send + Unpin + 'static) -> Self {
        Self {
            source: Mutex::new(Some(Box::new(reader))),
            ..self
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The terminal session's room, `{agent}_{user}`.
    pub fn room_id(&self) -> String {
        format!("{}_{}", self.agent_id, self.user_id)
    }

    /// Turn one typed line into an input. `None` for blank lines.
    pub fn parse_line(&self, line: &str) -> Option<Input> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let base = |text: &str| {
            Input::text(
                InputSource::Cli,
                self.user_id.clone(),
                self.agent_id.clone(),
                self.room_id(),
                text,
            )
        };

        let Some(rest) = line.strip_prefix("/image ") else {
            return Some(base(line));
        };

        let rest = rest.trim_start();
        let (url, text) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        let text = text.trim();
        let mut input = base(text).with_images(vec![url.to_string()]);
        if text.is_empty() {
            input.kind = InputType::Image;
            input.text = None;
        }
        Some(input)
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<mpsc::Receiver<Result<Input, ChannelError>>, ChannelError> {
        let mut reader = self
            .source
            .lock()
            .await
            .take()
            .ok_or_else(|| ChannelError::NotConfigured("cli channel already started".into()))?;

        let (tx, rx) = mpsc::channel(32);
        let parser = CliChannel {
            agent_id: self.agent_id.clone(),
            user_id: self.user_id.clone(),
            source: Mutex::new(None),
        };

        tokio::spawn(async move {
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => break, // EOF (Ctrl+D)
                    Ok(_) => {
                        let trimmed = line.trim();
                        if EXIT_COMMANDS.contains(&trimmed) {
                            debug!("CLI session ended by user");
                            break;
                        }
                        let Some(input) = parser.parse_line(trimmed) else {
                            continue;
                        };
                        if tx.send(Ok(input)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(ChannelError::ConnectionLost(e.to_string()))).await;
                        break;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn send(&self, _room_id: &str, content: &str) -> Result<(), ChannelError> {
        println!("{content}");
        Ok(())
    }
}
