//! Claude Code CLI executor.

use std::path::Path;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use command_group::AsyncCommandGroup;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};
use workspace_utils::shell::get_shell_command;

use crate::command::{CmdOverrides, CommandBuilder, apply_overrides};
use crate::executors::{CodingAgent, ExecutorError, WorkerRequest, WorkerResponse};

/// How much stderr to keep when reporting a failed exit.
const STDERR_TAIL: usize = 600;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaudeCode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub dangerously_skip_permissions: bool,
    #[serde(flatten)]
    pub cmd: CmdOverrides,
}

impl ClaudeCode {
    fn build_command_builder(&self, request: &WorkerRequest) -> CommandBuilder {
        let mut builder =
            CommandBuilder::new("npx -y @anthropic-ai/claude-code@latest").params(["-p"]);

        if self.dangerously_skip_permissions {
            builder = builder.extend_params(["--dangerously-skip-permissions"]);
        }
        if let Some(model) = &self.model {
            builder = builder.extend_params(["--model", model]);
        }
        if !request.allowed_tools.is_empty() {
            builder = builder.extend_params(["--allowedTools", &request.allowed_tools.join(",")]);
        }
        if let Some(turns) = request.max_turns {
            builder = builder.extend_params(["--max-turns", &turns.to_string()]);
        }

        apply_overrides(builder, &self.cmd)
    }
}

#[async_trait]
impl CodingAgent for ClaudeCode {
    async fn invoke(
        &self,
        current_dir: &Path,
        request: &WorkerRequest,
    ) -> Result<WorkerResponse, ExecutorError> {
        let (shell_cmd, shell_arg) = get_shell_command();
        let agent_command = self.build_command_builder(request).build_initial();
        debug!("Invoking agent in {}: {agent_command}", current_dir.display());

        let started = Instant::now();
        let mut command = Command::new(shell_cmd);
        command
            .kill_on_drop(true)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .current_dir(current_dir)
            .arg(shell_arg)
            .arg(&agent_command)
            .env("NODE_NO_WARNINGS", "1");

        let mut child = command.group_spawn()?;

        // Feed the instruction in, then close the pipe so the CLI sees EOF
        if let Some(mut stdin) = child.inner().stdin.take() {
            stdin.write_all(request.instruction.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        let elapsed = started.elapsed();
        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let exit_code = output.status.code();

        if text.is_empty() {
            return match exit_code {
                Some(0) | None => Err(ExecutorError::EmptyOutput),
                Some(status) => {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    let tail: String = stderr
                        .chars()
                        .skip(stderr.chars().count().saturating_sub(STDERR_TAIL))
                        .collect();
                    Err(ExecutorError::FailedExit { status, stderr: tail })
                }
            };
        }

        if !output.status.success() {
            // Output exists, so let extraction decide what it is worth
            warn!(
                "Agent exited with {:?} but produced {} chars of output",
                exit_code,
                text.len()
            );
        }

        Ok(WorkerResponse {
            text,
            exit_code,
            elapsed,
        })
    }
}
