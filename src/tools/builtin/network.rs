//! Network tools: remote execution over SSH and Kubernetes management
//! via kubectl.

use crate::error::{AssistantError, Result};
use crate::tools::builtin::system::format_command_output;
use crate::tools::{Tool, optional_str, require_str};
use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;

/// Timeout for the whole SSH round trip.
const SSH_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for kubectl invocations.
const KUBECTL_TIMEOUT: Duration = Duration::from_secs(30);

/// Execute commands on remote hosts via SSH.
///
/// Requires key-based authentication; `BatchMode=yes` keeps the subprocess
/// from ever prompting.
pub struct SshCommandTool;

#[async_trait]
impl Tool for SshCommandTool {
    fn name(&self) -> &str {
        "ssh_command"
    }

    fn description(&self) -> &str {
        "Run a command on a remote host via SSH. Requires SSH key-based \
         authentication to be configured (no password prompts). Use for \
         managing routers, switches, servers, and other network devices."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "host": {
                    "type": "string",
                    "description": "Hostname or IP address to connect to \
                        (e.g. 'router.local' or '192.168.1.1')"
                },
                "command": {
                    "type": "string",
                    "description": "The command to execute on the remote host"
                },
                "user": {
                    "type": "string",
                    "description": "SSH username (defaults to the current user)"
                },
                "port": {
                    "type": "integer",
                    "description": "SSH port (defaults to 22)"
                }
            },
            "required": ["host", "command"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String> {
        let host = require_str(&args, "host")?;
        let command = require_str(&args, "command")?;
        let user = optional_str(&args, "user");
        let port = args.get("port").and_then(|v| v.as_u64()).unwrap_or(22);

        let mut ssh = Command::new("ssh");
        ssh.arg("-o")
            .arg("StrictHostKeyChecking=accept-new")
            .arg("-o")
            .arg("ConnectTimeout=10")
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-p")
            .arg(port.to_string());
        if !user.is_empty() {
            ssh.arg("-l").arg(user);
        }
        ssh.arg(host).arg(command);

        let output = tokio::time::timeout(SSH_TIMEOUT, ssh.output())
            .await
            .map_err(|_| {
                AssistantError::Tool(format!(
                    "ssh command timed out after {}s",
                    SSH_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| AssistantError::Tool(format!("failed to spawn ssh: {e}")))?;

        Ok(format_command_output(
            &output.stdout,
            &output.stderr,
            output.status.code(),
        ))
    }
}

/// Execute kubectl commands for Kubernetes cluster management.
pub struct KubectlTool;

#[async_trait]
impl Tool for KubectlTool {
    fn name(&self) -> &str {
        "kubectl"
    }

    fn description(&self) -> &str {
        "Run kubectl commands to manage the Kubernetes cluster. Can list \
         pods, services, deployments, check logs, scale resources, etc. \
         Examples: 'get pods -A', 'logs deploy/myapp', 'get nodes'."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "args": {
                    "type": "string",
                    "description": "kubectl arguments (e.g. 'get pods -n default', \
                        'logs deploy/myapp --tail=50')"
                },
                "context": {
                    "type": "string",
                    "description": "Kubernetes context to use (optional, uses the \
                        current context if not specified)"
                }
            },
            "required": ["args"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String> {
        let kubectl_args = require_str(&args, "args")?;
        let context = optional_str(&args, "context");

        let mut kubectl = Command::new("kubectl");
        if !context.is_empty() {
            kubectl.arg("--context").arg(context);
        }
        kubectl.args(kubectl_args.split_whitespace());

        let output = tokio::time::timeout(KUBECTL_TIMEOUT, kubectl.output())
            .await
            .map_err(|_| {
                AssistantError::Tool(format!(
                    "kubectl command timed out after {}s",
                    KUBECTL_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| AssistantError::Tool(format!("failed to spawn kubectl: {e}")))?;

        Ok(format_command_output(
            &output.stdout,
            &output.stderr,
            output.status.code(),
        ))
    }
}
