//! Anthropic Messages API backend (the cloud side of the router).
//!
//! The Messages API uses content blocks rather than the OpenAI-style
//! function-calling schema, so this adapter translates in both directions:
//! assistant tool calls become `tool_use` blocks, tool results become
//! `tool_result` blocks inside a user message, and `tool_use` blocks in a
//! reply come back as [`ToolCall`]s. Call ids survive the round trip
//! verbatim.

use crate::config::CloudLlmConfig;
use crate::error::{AssistantError, Result};
use crate::llm::{
    ChatMessage, LlmClient, LlmResponse, MessageContent, Role, ToolCall, ToolDefinition,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Cloud LLM backend using the Anthropic Messages API.
pub struct AnthropicClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: usize,
}

impl AnthropicClient {
    /// Create a new client from the cloud backend config.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is empty or the HTTP client cannot
    /// be constructed.
    pub fn new(config: &CloudLlmConfig) -> Result<Self> {
        if !config.enabled() {
            return Err(AssistantError::Config(
                "cloud backend requires llm.cloud.api_key".into(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AssistantError::Llm(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    fn build_body(&self, messages: &[ChatMessage], tools: &[ToolDefinition]) -> serde_json::Value {
        let (system, converted) = convert_messages(messages);

        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": converted,
        });
        if let Some(system) = system {
            body["system"] = serde_json::Value::String(system);
        }
        if !tools.is_empty() {
            let defs: Vec<serde_json::Value> = tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters,
                    })
                })
                .collect();
            body["tools"] = serde_json::Value::Array(defs);
        }
        body
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_body(messages, tools);
        debug!(model = self.model.as_str(), "cloud chat request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| AssistantError::Llm(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AssistantError::Llm(format!(
                "cloud backend returned {status}: {detail}"
            )));
        }

        let reply: MessagesResponse = response
            .json()
            .await
            .map_err(|e| AssistantError::Llm(format!("invalid messages response: {e}")))?;

        let mut content = String::new();
        let mut tool_calls = Vec::new();
        for block in reply.content {
            match block {
                ContentBlock::Text { text } => content.push_str(&text),
                ContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCall {
                        id,
                        name,
                        arguments: input,
                    });
                }
                ContentBlock::Other => {}
            }
        }

        Ok(LlmResponse {
            content,
            tool_calls,
        })
    }
}

/// Convert canonical messages to Anthropic format.
///
/// Returns `(system_text, messages)`: the system message is hoisted to the
/// top-level `system` field, everything else becomes content-block
/// messages.
fn convert_messages(messages: &[ChatMessage]) -> (Option<String>, Vec<serde_json::Value>) {
    let mut system: Option<String> = None;
    let mut result = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => {
                system = Some(msg.text_content().to_owned());
            }
            Role::User => {
                result.push(serde_json::json!({
                    "role": "user",
                    "content": [{"type": "text", "text": msg.text_content()}],
                }));
            }
            Role::Assistant => {
                let mut blocks: Vec<serde_json::Value> = Vec::new();
                let text = msg.text_content();
                if !text.is_empty() {
                    blocks.push(serde_json::json!({"type": "text", "text": text}));
                }
                for tc in &msg.tool_calls {
                    blocks.push(serde_json::json!({
                        "type": "tool_use",
                        "id": tc.id,
                        "name": tc.name,
                        "input": tc.arguments,
                    }));
                }
                if !blocks.is_empty() {
                    result.push(serde_json::json!({
                        "role": "assistant",
                        "content": blocks,
                    }));
                }
            }
            Role::Tool => {
                if let MessageContent::ToolResult { call_id, content } = &msg.content {
                    result.push(serde_json::json!({
                        "role": "user",
                        "content": [{
                            "type": "tool_result",
                            "tool_use_id": call_id,
                            "content": content,
                        }],
                    }));
                }
            }
        }
    }

    (system, result)
}

// ── Response wire types ───────────────────────────────────────

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}
