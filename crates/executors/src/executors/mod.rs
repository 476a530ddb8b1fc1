//! Coding agent executors.
//!
//! An executor turns a [`WorkerRequest`] into free text by driving an
//! external agent process inside a working directory. Callers own
//! deadlines and retries; an executor only reports what the process did.

pub mod claude;
pub mod scripted;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use claude::ClaudeCode;
pub use scripted::{ScriptedAgent, ScriptedStep};

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("failed to spawn worker process: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("worker exited with status {status} and produced no usable output: {stderr}")]
    FailedExit { status: i32, stderr: String },
    #[error("worker produced no output")]
    EmptyOutput,
}

/// One instruction for the agent: natural-language text plus the explicit
/// capability allow-list and turn budget for this stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerRequest {
    pub instruction: String,
    pub allowed_tools: Vec<String>,
    pub max_turns: Option<u32>,
}

impl WorkerRequest {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            allowed_tools: Vec::new(),
            max_turns: None,
        }
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_turns(mut self, turns: u32) -> Self {
        self.max_turns = Some(turns);
        self
    }
}

/// What came back. `text` is the agent's raw stdout; downstream extraction
/// decides what it means.
#[derive(Debug, Clone)]
pub struct WorkerResponse {
    pub text: String,
    pub exit_code: Option<i32>,
    pub elapsed: Duration,
}

#[async_trait]
pub trait CodingAgent: Send + Sync {
    /// Run one request to completion inside `current_dir`.
    ///
    /// Errors only on invocation-level failure (spawn error, or an exit
    /// with nothing on stdout). A non-zero exit that still produced text
    /// returns `Ok` with the exit code recorded, so tolerant extraction
    /// gets its chance.
    async fn invoke(
        &self,
        current_dir: &Path,
        request: &WorkerRequest,
    ) -> Result<WorkerResponse, ExecutorError>;
}
