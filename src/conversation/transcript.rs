//! In-memory, size-bounded conversation transcript.
//!
//! The transcript owns the message history between the system prompt and
//! the current turn. Trimming never splits an assistant-with-tool-calls
//! message from the tool results that answer it: the whole group is
//! dropped as a unit so every retained tool result keeps its antecedent.

use crate::error::{AssistantError, Result};
use crate::llm::{ChatMessage, LlmResponse, Role};

/// Bounded message log with tool-call entries.
pub struct Transcript {
    system_prompt: String,
    max_history: usize,
    messages: Vec<ChatMessage>,
}

impl Transcript {
    /// Create an empty transcript.
    ///
    /// `system_prompt` is constant for the process lifetime and prepended
    /// to every snapshot. `max_history` bounds the body length.
    pub fn new(system_prompt: impl Into<String>, max_history: usize) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            max_history,
            messages: Vec::new(),
        }
    }

    /// Append a user message.
    ///
    /// # Errors
    ///
    /// Rejects text that is empty after trimming.
    pub fn append_user(&mut self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(AssistantError::Transcript(
                "user message must not be empty".into(),
            ));
        }
        self.messages.push(ChatMessage::user(text));
        self.trim();
        Ok(())
    }

    /// Append a plain assistant reply.
    pub fn append_assistant_text(&mut self, text: &str) {
        self.messages.push(ChatMessage::assistant(text));
        self.trim();
    }

    /// Append an assistant message that contains tool calls.
    pub fn append_assistant_tool_calls(&mut self, response: &LlmResponse) {
        let text = if response.content.is_empty() {
            None
        } else {
            Some(response.content.clone())
        };
        self.messages.push(ChatMessage::assistant_with_tool_calls(
            text,
            response.tool_calls.clone(),
        ));
        self.trim();
    }

    /// Append a tool result answering an earlier tool call.
    pub fn append_tool_result(&mut self, tool_call_id: &str, result: &str) {
        self.messages
            .push(ChatMessage::tool_result(tool_call_id, result));
        self.trim();
    }

    /// Return `[system] ++ body` for LLM consumption.
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        let mut out = Vec::with_capacity(self.messages.len() + 1);
        out.push(ChatMessage::system(self.system_prompt.clone()));
        out.extend(self.messages.iter().cloned());
        out
    }

    /// Number of body messages (system prompt excluded).
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the body is empty.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drop whole messages (or whole tool-call groups) from the head until
    /// the body fits `max_history`.
    fn trim(&mut self) {
        while self.messages.len() > self.max_history {
            let group = self.head_group_len();
            self.messages.drain(..group);
        }
    }

    /// Length of the atomic group starting at the head: an assistant
    /// message with tool calls plus its following tool results, or a
    /// single message otherwise.
    fn head_group_len(&self) -> usize {
        let Some(head) = self.messages.first() else {
            return 0;
        };
        if head.role != Role::Assistant || head.tool_calls.is_empty() {
            return 1;
        }
        1 + self
            .messages
            .iter()
            .skip(1)
            .take_while(|m| m.role == Role::Tool)
            .count()
    }
}
