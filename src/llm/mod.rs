//! Language model capability: message types and the backend trait.
//!
//! The OpenAI-style function-calling schema is canonical inside the
//! assistant: assistant messages may carry tool calls, and tool results
//! reference the originating call by id. Backends with a different native
//! format (Anthropic content blocks) translate at their boundary in both
//! directions, preserving the call-id linkage.

pub mod anthropic;
pub mod openai;
pub mod router;

pub use anthropic::AnthropicClient;
pub use openai::OpenAiCompatClient;
pub use router::LlmRouter;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions.
    System,
    /// User input.
    User,
    /// Assistant (model) output.
    Assistant,
    /// Tool execution result.
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// A tool invocation requested by the model.
///
/// The `id` is opaque and must be echoed verbatim in the tool result that
/// answers it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Opaque call identifier assigned by the backend.
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// Decoded JSON arguments (always an object).
    pub arguments: serde_json::Value,
}

/// The content of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    /// Plain text content.
    Text {
        /// The text content.
        text: String,
    },
    /// Tool execution result.
    ToolResult {
        /// The tool call ID this result corresponds to.
        call_id: String,
        /// The tool's output content.
        content: String,
    },
}

/// A message in an LLM conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who sent this message.
    pub role: Role,
    /// The message content.
    pub content: MessageContent,
    /// Tool calls made by the assistant (only for the Assistant role).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl ChatMessage {
    /// Create a text message with the given role.
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text { text: text.into() },
            tool_calls: Vec::new(),
        }
    }

    /// Create a system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::text(Role::System, text)
    }

    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::text(Role::User, text)
    }

    /// Create an assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::text(Role::Assistant, text)
    }

    /// Create an assistant message with tool calls and optional text.
    pub fn assistant_with_tool_calls(text: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text {
                text: text.unwrap_or_default(),
            },
            tool_calls,
        }
    }

    /// Create a tool result message.
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: MessageContent::ToolResult {
                call_id: call_id.into(),
                content: content.into(),
            },
            tool_calls: Vec::new(),
        }
    }

    /// Text content of this message, empty for tool results.
    pub fn text_content(&self) -> &str {
        match &self.content {
            MessageContent::Text { text } => text,
            MessageContent::ToolResult { .. } => "",
        }
    }
}

/// A tool definition provided to the LLM for function calling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name (e.g. `"ha_control_device"`).
    pub name: String,
    /// Human-readable description shown to the model.
    pub description: String,
    /// JSON Schema describing the tool's parameters.
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Create a new tool definition.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A complete model reply.
///
/// Both fields may be empty; that is a terminal no-op reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LlmResponse {
    /// Assistant text (possibly empty).
    pub content: String,
    /// Tool invocations requested by the model, in model order.
    pub tool_calls: Vec<ToolCall>,
}

/// Trait for LLM backends.
///
/// A single async method; concrete backends and the composing
/// [`LlmRouter`] all implement it.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send the conversation to the model and return its reply.
    ///
    /// `tools` may be empty, in which case no function-calling schema is
    /// sent to the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be
    /// parsed.
    async fn chat(&self, messages: &[ChatMessage], tools: &[ToolDefinition])
    -> Result<LlmResponse>;
}
