//! Built-in tools registered at startup.
//!
//! There is no runtime discovery: the full set is listed here and
//! registered explicitly when the app is constructed.

mod home_assistant;
mod network;
mod system;
mod web;

pub use home_assistant::{HaControlDeviceTool, HaListEntitiesTool, HaTriggerSceneTool};
pub use network::{KubectlTool, SshCommandTool};
pub use system::{GetCurrentTimeTool, GetSystemInfoTool, RunShellCommandTool};
pub use web::FetchUrlTool;

use crate::config::HomeAssistantConfig;
use crate::error::Result;
use crate::tools::ToolRegistry;
use std::sync::Arc;

/// Register every built-in tool.
///
/// Home Assistant tools are always registered; when the integration is
/// unconfigured they answer with an error string instead of failing
/// startup.
///
/// # Errors
///
/// Returns an error on duplicate registration (a bug in this list).
pub fn register_builtin_tools(
    registry: &mut ToolRegistry,
    ha_config: &HomeAssistantConfig,
) -> Result<()> {
    let http = reqwest::Client::new();

    registry.register(Arc::new(HaListEntitiesTool::new(
        ha_config.clone(),
        http.clone(),
    )))?;
    registry.register(Arc::new(HaControlDeviceTool::new(
        ha_config.clone(),
        http.clone(),
    )))?;
    registry.register(Arc::new(HaTriggerSceneTool::new(
        ha_config.clone(),
        http.clone(),
    )))?;
    registry.register(Arc::new(GetCurrentTimeTool))?;
    registry.register(Arc::new(GetSystemInfoTool))?;
    registry.register(Arc::new(RunShellCommandTool))?;
    registry.register(Arc::new(SshCommandTool))?;
    registry.register(Arc::new(KubectlTool))?;
    registry.register(Arc::new(FetchUrlTool::new(http)))?;

    Ok(())
}
