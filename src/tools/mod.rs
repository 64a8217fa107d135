//! Tool system: the [`Tool`] trait, the registry, and the executor.
//!
//! Tools are registered once at startup and shared read-only. The executor
//! is the only entry point the conversation driver uses: it never returns
//! an error. Lookup failures and execution failures both come back as
//! result strings so the model can see them and recover.

pub mod builtin;

use crate::error::{AssistantError, Result};
use crate::llm::ToolDefinition;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// A capability the model may invoke by name with JSON arguments.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name, `[a-z0-9_]`.
    fn name(&self) -> &str;

    /// Description of what the tool does (shown to the model).
    fn description(&self) -> &str;

    /// JSON Schema for the tool parameters.
    fn parameters(&self) -> serde_json::Value;

    /// Execute the tool with decoded arguments.
    ///
    /// # Errors
    ///
    /// Returns an error on failure; the executor converts it to a result
    /// string, so it never propagates to the driver.
    async fn execute(&self, args: serde_json::Value) -> Result<String>;
}

/// Registry of named tools.
///
/// Names are unique; registration fails on duplicates. A `BTreeMap` keeps
/// schema export order deterministic.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool.
    ///
    /// # Errors
    ///
    /// Returns an error if a tool with the same name is already present.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name().to_owned();
        if self.tools.contains_key(&name) {
            return Err(AssistantError::Tool(format!(
                "tool '{name}' is already registered"
            )));
        }
        debug!("registered tool: {name}");
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Names of all registered tools, sorted.
    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry holds no tools.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Dispatches model tool calls against a registry.
#[derive(Clone)]
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
}

impl ToolExecutor {
    /// Create an executor over a registry.
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    /// Whether any tools are available.
    pub fn has_tools(&self) -> bool {
        !self.registry.is_empty()
    }

    /// Export tool definitions for LLM function calling.
    pub fn schemas(&self) -> Vec<ToolDefinition> {
        self.registry
            .tools
            .values()
            .map(|t| ToolDefinition::new(t.name(), t.description(), t.parameters()))
            .collect()
    }

    /// Invoke a tool by name and return its result as a string.
    ///
    /// Never fails: an unknown name or a tool error comes back as an
    /// `Error:` string the model can read.
    pub async fn invoke(&self, name: &str, arguments: serde_json::Value) -> String {
        let Some(tool) = self.registry.get(name) else {
            return format!(
                "Error: unknown tool '{name}'. Available tools: {}",
                self.registry.names().join(", ")
            );
        };

        match tool.execute(arguments).await {
            Ok(result) => result,
            Err(e) => {
                warn!("tool '{name}' failed: {e}");
                format!("Error: tool '{name}' failed: {e}")
            }
        }
    }
}

/// Read a required string argument from a tool's JSON arguments.
///
/// # Errors
///
/// Returns an error naming the missing argument.
pub(crate) fn require_str<'a>(args: &'a serde_json::Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AssistantError::Tool(format!("missing required argument: {key}")))
}

/// Read an optional string argument, defaulting to empty.
pub(crate) fn optional_str<'a>(args: &'a serde_json::Value, key: &str) -> &'a str {
    args.get(key).and_then(|v| v.as_str()).unwrap_or_default()
}
