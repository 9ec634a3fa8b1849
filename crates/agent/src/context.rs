//! Context assembly: renders history, persona and the current input into
//! the single prompt string every route sees.
//!
//! # Determinism
//!
//! Assembly is a pure function of its arguments. Randomness lives in persona
//! sampling, which happens before the assembler is called.

use chrono::SecondsFormat;
use steward_core::input::Input;
use steward_core::memory::{Generator, Memory};

/// Shown in place of history when there is none.
pub const NO_HISTORY_MARKER: &str = "No previous conversation history.";

#[derive(Debug, Clone, Copy, Default)]
pub struct ContextAssembler;

impl ContextAssembler {
    pub fn new() -> Self {
        Self
    }

    /// Render history oldest first, whatever order the store returned it in.
    /// Memories with equal timestamps keep their relative order.
    pub fn format_memories(&self, memories: &[Memory]) -> String {
        if memories.is_empty() {
            return NO_HISTORY_MARKER.to_string();
        }

        let mut ordered: Vec<&Memory> = memories.iter().collect();
        ordered.sort_by_key(|memory| memory.created_at);

        ordered
            .into_iter()
            .map(|memory| {
                let timestamp = memory
                    .created_at
                    .to_rfc3339_opts(SecondsFormat::Millis, true);
                let text = memory.text().unwrap_or_default();
                match memory.generator {
                    Generator::External => format!("[{timestamp}] User {}: {text}", memory.user_id),
                    Generator::Llm => format!("[{timestamp}] You: {text}"),
                }
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Render the current input with one line per payload part.
    pub fn format_input(&self, input: &Input) -> String {
        let mut parts = Vec::new();
        if let Some(text) = input.text_content() {
            parts.push(format!("Text: {text}"));
        }
        for url in &input.image_urls {
            parts.push(format!("Image: {url}"));
        }
        if let Some(url) = &input.audio_url {
            parts.push(format!("Audio: {url}"));
        }
        if let Some(url) = &input.video_url {
            parts.push(format!("Video: {url}"));
        }

        format!("Current Input ({}):\n{}", input.kind, parts.join("\n"))
    }

    /// Assemble the full context.
    pub fn assemble(
        &self,
        memories: &[Memory],
        agent_context: &str,
        input: &Input,
        image_description: Option<&str>,
    ) -> String {
        let mut context = format!(
            "<PREVIOUS_CONVERSATION>\n{}\n</PREVIOUS_CONVERSATION>\n\n\
             <AGENT_CONTEXT>\n{}\n</AGENT_CONTEXT>\n\n\
             <CURRENT_USER_INPUT>\n{}\n</CURRENT_USER_INPUT>",
            self.format_memories(memories),
            agent_context,
            self.format_input(input),
        );

        if let Some(description) = image_description {
            context.push_str(&format!(
                "\n\n<IMAGE_DESCRIPTION>\n{description}\n</IMAGE_DESCRIPTION>"
            ));
        }

        context
    }
}
