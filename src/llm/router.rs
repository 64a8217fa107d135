//! Routing between the fast local backend and the smart cloud backend.
//!
//! Short, simple queries go to the local model (fast, free). Long or
//! complexity-keyword queries go to the cloud model (smart, tool-savvy).
//! Either direction falls back to the other exactly once on failure.

use crate::error::Result;
use crate::llm::{ChatMessage, LlmClient, LlmResponse, Role, ToolDefinition};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Keywords that suggest a complex query needing the cloud model.
const COMPLEX_KEYWORDS: &[&str] = &[
    "analyze",
    "explain",
    "refactor",
    "debug",
    "review",
    "write code",
    "implement",
    "architecture",
    "design",
    "compare",
    "summarize",
    "translate",
    "improve yourself",
    "edit your code",
    "add a feature",
    "complex",
];

/// An [`LlmClient`] that routes each call to a local or cloud backend.
pub struct LlmRouter {
    local: Arc<dyn LlmClient>,
    cloud: Option<Arc<dyn LlmClient>>,
    complexity_threshold: usize,
}

impl LlmRouter {
    /// Create a router over a required local backend and an optional cloud
    /// backend.
    pub fn new(
        local: Arc<dyn LlmClient>,
        cloud: Option<Arc<dyn LlmClient>>,
        complexity_threshold: usize,
    ) -> Self {
        Self {
            local,
            cloud,
            complexity_threshold,
        }
    }

    /// Decide whether the conversation should go to the cloud backend.
    ///
    /// Inspects the most recent user message: length above the threshold or
    /// any complexity keyword (case-insensitive) routes to the cloud.
    fn should_use_cloud(&self, messages: &[ChatMessage]) -> bool {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(ChatMessage::text_content)
            .unwrap_or_default();

        if last_user.is_empty() {
            return false;
        }
        // Character count, not byte length, so multi-byte text trips the
        // threshold at the same point as ASCII.
        if last_user.chars().count() > self.complexity_threshold {
            return true;
        }

        let lower = last_user.to_lowercase();
        COMPLEX_KEYWORDS.iter().any(|kw| lower.contains(kw))
    }
}

#[async_trait]
impl LlmClient for LlmRouter {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse> {
        match (&self.cloud, self.should_use_cloud(messages)) {
            (Some(cloud), true) => {
                info!("router: using cloud backend");
                match cloud.chat(messages, tools).await {
                    Ok(resp) => Ok(resp),
                    Err(e) => {
                        warn!("router: cloud failed ({e}), falling back to local");
                        self.local.chat(messages, tools).await
                    }
                }
            }
            _ => {
                info!("router: using local backend");
                match self.local.chat(messages, tools).await {
                    Ok(resp) => Ok(resp),
                    Err(e) => match &self.cloud {
                        Some(cloud) => {
                            warn!("router: local failed ({e}), falling back to cloud");
                            cloud.chat(messages, tools).await
                        }
                        None => Err(e),
                    },
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::error::AssistantError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted backend that counts calls and returns a fixed outcome.
    struct ScriptedBackend {
        reply: Option<String>,
        calls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn ok(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Some(reply.to_owned()),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedBackend {
        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _tools: &[ToolDefinition],
        ) -> Result<LlmResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Some(content) => Ok(LlmResponse {
                    content: content.clone(),
                    tool_calls: Vec::new(),
                }),
                None => Err(AssistantError::Llm("backend down".into())),
            }
        }
    }

    fn user(text: &str) -> Vec<ChatMessage> {
        vec![ChatMessage::system("sys"), ChatMessage::user(text)]
    }

    #[tokio::test]
    async fn local_only_always_routes_local() {
        let local = ScriptedBackend::ok("hi");
        let router = LlmRouter::new(local.clone(), None, 500);
        let resp = router
            .chat(&user("please analyze this complex architecture"), &[])
            .await
            .unwrap();
        assert_eq!(resp.content, "hi");
        assert_eq!(local.calls(), 1);
    }

    #[tokio::test]
    async fn short_plain_message_routes_local() {
        let local = ScriptedBackend::ok("local");
        let cloud = ScriptedBackend::ok("cloud");
        let router = LlmRouter::new(local.clone(), Some(cloud.clone()), 500);
        let resp = router.chat(&user("what time is it"), &[]).await.unwrap();
        assert_eq!(resp.content, "local");
        assert_eq!(cloud.calls(), 0);
    }

    #[tokio::test]
    async fn keyword_routes_cloud_case_insensitive() {
        let local = ScriptedBackend::ok("local");
        let cloud = ScriptedBackend::ok("cloud");
        let router = LlmRouter::new(local.clone(), Some(cloud.clone()), 500);
        let resp = router.chat(&user("ANALYZE this log"), &[]).await.unwrap();
        assert_eq!(resp.content, "cloud");
        assert_eq!(local.calls(), 0);
    }

    #[tokio::test]
    async fn long_message_routes_cloud() {
        let local = ScriptedBackend::ok("local");
        let cloud = ScriptedBackend::ok("cloud");
        let router = LlmRouter::new(local.clone(), Some(cloud.clone()), 20);
        let resp = router
            .chat(&user("a perfectly ordinary sentence over the limit"), &[])
            .await
            .unwrap();
        assert_eq!(resp.content, "cloud");
        assert_eq!(local.calls(), 0);
    }

    #[tokio::test]
    async fn length_threshold_counts_characters_not_bytes() {
        let local = ScriptedBackend::ok("local");
        let cloud = ScriptedBackend::ok("cloud");
        let router = LlmRouter::new(local.clone(), Some(cloud.clone()), 20);
        // 13 characters but 39 bytes: must stay local.
        let resp = router
            .chat(&user("ラジオをつけてくださいよね"), &[])
            .await
            .unwrap();
        assert_eq!(resp.content, "local");
        assert_eq!(cloud.calls(), 0);
    }

    #[tokio::test]
    async fn routing_uses_last_user_message() {
        let local = ScriptedBackend::ok("local");
        let cloud = ScriptedBackend::ok("cloud");
        let router = LlmRouter::new(local.clone(), Some(cloud.clone()), 500);
        let messages = vec![
            ChatMessage::system("sys"),
            ChatMessage::user("analyze everything"),
            ChatMessage::assistant("done"),
            ChatMessage::user("thanks"),
        ];
        let resp = router.chat(&messages, &[]).await.unwrap();
        assert_eq!(resp.content, "local");
        assert_eq!(cloud.calls(), 0);
    }

    #[tokio::test]
    async fn cloud_failure_falls_back_to_local_once() {
        let local = ScriptedBackend::ok("local");
        let cloud = ScriptedBackend::failing();
        let router = LlmRouter::new(local.clone(), Some(cloud.clone()), 500);
        let resp = router.chat(&user("debug my router"), &[]).await.unwrap();
        assert_eq!(resp.content, "local");
        assert_eq!(cloud.calls(), 1);
        assert_eq!(local.calls(), 1);
    }

    #[tokio::test]
    async fn local_failure_falls_back_to_cloud_once() {
        let local = ScriptedBackend::failing();
        let cloud = ScriptedBackend::ok("cloud");
        let router = LlmRouter::new(local.clone(), Some(cloud.clone()), 500);
        let resp = router.chat(&user("hello"), &[]).await.unwrap();
        assert_eq!(resp.content, "cloud");
        assert_eq!(local.calls(), 1);
        assert_eq!(cloud.calls(), 1);
    }

    #[tokio::test]
    async fn local_failure_without_cloud_propagates() {
        let local = ScriptedBackend::failing();
        let router = LlmRouter::new(local.clone(), None, 500);
        assert!(router.chat(&user("hello"), &[]).await.is_err());
        assert_eq!(local.calls(), 1);
    }

    #[tokio::test]
    async fn both_failing_propagates_after_one_fallback() {
        let local = ScriptedBackend::failing();
        let cloud = ScriptedBackend::failing();
        let router = LlmRouter::new(local.clone(), Some(cloud.clone()), 500);
        assert!(router.chat(&user("summarize this"), &[]).await.is_err());
        // One attempt each, no ping-pong.
        assert_eq!(cloud.calls(), 1);
        assert_eq!(local.calls(), 1);
    }
}
