//! Local system tools: clock, host info, shell commands.

use crate::error::{AssistantError, Result};
use crate::tools::{Tool, require_str};
use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;

/// Timeout for local shell commands.
const SHELL_TIMEOUT: Duration = Duration::from_secs(30);

/// Returns the current date and time.
pub struct GetCurrentTimeTool;

#[async_trait]
impl Tool for GetCurrentTimeTool {
    fn name(&self) -> &str {
        "get_current_time"
    }

    fn description(&self) -> &str {
        "Get the current date, time, and day of the week."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}, "required": []})
    }

    async fn execute(&self, _args: serde_json::Value) -> Result<String> {
        Ok(chrono::Local::now()
            .format("%A, %B %d, %Y at %I:%M %p")
            .to_string())
    }
}

/// Returns information about the host machine.
pub struct GetSystemInfoTool;

#[async_trait]
impl Tool for GetSystemInfoTool {
    fn name(&self) -> &str {
        "get_system_info"
    }

    fn description(&self) -> &str {
        "Get system information: OS, kernel, architecture, and uptime."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}, "required": []})
    }

    async fn execute(&self, _args: serde_json::Value) -> Result<String> {
        let mut info = vec![
            format!("OS: {}", std::env::consts::OS),
            format!("Arch: {}", std::env::consts::ARCH),
        ];

        // uname and uptime are best-effort: absent on some hosts.
        if let Ok(output) = Command::new("uname").arg("-sr").output().await
            && output.status.success()
        {
            info.push(format!(
                "Kernel: {}",
                String::from_utf8_lossy(&output.stdout).trim()
            ));
        }
        if let Ok(output) = Command::new("uptime").arg("-p").output().await
            && output.status.success()
        {
            info.push(format!(
                "Uptime: {}",
                String::from_utf8_lossy(&output.stdout).trim()
            ));
        }

        Ok(info.join("\n"))
    }
}

/// Runs a shell command and returns its output.
pub struct RunShellCommandTool;

#[async_trait]
impl Tool for RunShellCommandTool {
    fn name(&self) -> &str {
        "run_shell_command"
    }

    fn description(&self) -> &str {
        "Run a shell command on the local system and return its output. Use for \
         checking system status, running scripts, managing services, etc."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String> {
        let command = require_str(&args, "command")?;

        let mut shell = Command::new("/bin/sh");
        shell.arg("-c").arg(command);
        let output = tokio::time::timeout(SHELL_TIMEOUT, shell.output())
            .await
            .map_err(|_| {
                AssistantError::Tool(format!(
                    "command timed out after {}s",
                    SHELL_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| AssistantError::Tool(format!("failed to spawn shell: {e}")))?;

        Ok(format_command_output(
            &output.stdout,
            &output.stderr,
            output.status.code(),
        ))
    }
}

/// Render captured process output the way the model expects it: stdout,
/// then STDERR, then a non-zero exit code.
pub(crate) fn format_command_output(
    stdout: &[u8],
    stderr: &[u8],
    exit_code: Option<i32>,
) -> String {
    let mut out = String::from_utf8_lossy(stdout).into_owned();
    if !stderr.is_empty() {
        out.push_str(&format!("\nSTDERR: {}", String::from_utf8_lossy(stderr)));
    }
    if let Some(code) = exit_code
        && code != 0
    {
        out.push_str(&format!("\nExit code: {code}"));
    }
    let out = out.trim().to_owned();
    if out.is_empty() {
        "(no output)".to_owned()
    } else {
        out
    }
}
