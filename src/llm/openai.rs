//! OpenAI-compatible chat completions backend.
//!
//! Works against any server implementing `/v1/chat/completions` with
//! function calling: Ollama, vLLM, llama.cpp server, LM Studio, etc.
//! This is the assistant's local backend.

use crate::config::LocalLlmConfig;
use crate::error::{AssistantError, Result};
use crate::llm::{
    ChatMessage, LlmClient, LlmResponse, MessageContent, Role, ToolCall, ToolDefinition,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// LLM backend using an OpenAI-compatible HTTP API.
pub struct OpenAiCompatClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OpenAiCompatClient {
    /// Create a new client from the local backend config.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &LocalLlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AssistantError::Llm(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            model: config.model.clone(),
        })
    }

    fn build_body(&self, messages: &[ChatMessage], tools: &[ToolDefinition]) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages.iter().map(message_to_wire).collect::<Vec<_>>(),
        });
        if !tools.is_empty() {
            body["tools"] = tools_to_wire(tools);
        }
        body
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(messages, tools);
        debug!(model = self.model.as_str(), url = url.as_str(), "local chat request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AssistantError::Llm(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AssistantError::Llm(format!(
                "local backend returned {status}: {detail}"
            )));
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| AssistantError::Llm(format!("invalid completion response: {e}")))?;

        let message = completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| AssistantError::Llm("completion response has no choices".into()))?;

        let tool_calls = message
            .tool_calls
            .into_iter()
            .map(|tc| ToolCall {
                // Some servers (older Ollama builds) omit call ids; the
                // transcript needs one to link the result back.
                id: if tc.id.is_empty() {
                    format!("call_{}", uuid::Uuid::new_v4())
                } else {
                    tc.id
                },
                name: tc.function.name,
                arguments: parse_arguments(&tc.function.arguments),
            })
            .collect();

        Ok(LlmResponse {
            content: message.content.unwrap_or_default(),
            tool_calls,
        })
    }
}

/// Convert a message to the chat completions wire format.
fn message_to_wire(msg: &ChatMessage) -> serde_json::Value {
    match &msg.content {
        MessageContent::Text { text } => {
            let role = match msg.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            };
            let mut obj = serde_json::json!({
                "role": role,
                "content": text,
            });
            if !msg.tool_calls.is_empty() {
                let calls: Vec<serde_json::Value> = msg
                    .tool_calls
                    .iter()
                    .map(|tc| {
                        serde_json::json!({
                            "id": tc.id,
                            "type": "function",
                            "function": {
                                "name": tc.name,
                                "arguments": tc.arguments.to_string(),
                            }
                        })
                    })
                    .collect();
                if let Some(obj) = obj.as_object_mut() {
                    obj.insert("tool_calls".into(), serde_json::json!(calls));
                }
            }
            obj
        }
        MessageContent::ToolResult { call_id, content } => serde_json::json!({
            "role": "tool",
            "tool_call_id": call_id,
            "content": content,
        }),
    }
}

/// Convert tool definitions to the OpenAI tools array.
fn tools_to_wire(tools: &[ToolDefinition]) -> serde_json::Value {
    let entries: Vec<serde_json::Value> = tools
        .iter()
        .map(|t| {
            serde_json::json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                }
            })
        })
        .collect();
    serde_json::json!(entries)
}

/// Decode a function-call arguments string, tolerating malformed JSON.
fn parse_arguments(raw: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        return serde_json::json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!("unparseable tool arguments ({e}): {raw}");
        serde_json::json!({})
    })
}

// ── Response wire types ───────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}
