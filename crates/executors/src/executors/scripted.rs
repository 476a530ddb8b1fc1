//! Deterministic scripted executor for tests.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::executors::{CodingAgent, ExecutorError, WorkerRequest, WorkerResponse};

/// One scripted turn.
#[derive(Debug, Clone)]
pub enum ScriptedStep {
    /// Reply immediately with this text.
    Reply(String),
    /// Sleep first, then reply. Lets tests exercise deadline handling.
    Delay(Duration, String),
    /// Fail the invocation as a spawn error with this message.
    Fail(String),
    /// Exit cleanly with nothing on stdout.
    Empty,
}

/// Replays a fixed script of steps, one per invocation, and records every
/// request it saw. Once the script runs out it serves `fallback` forever,
/// or fails if none is set.
#[derive(Debug, Default)]
pub struct ScriptedAgent {
    steps: Mutex<VecDeque<ScriptedStep>>,
    fallback: Option<String>,
    requests: Mutex<Vec<WorkerRequest>>,
}

impl ScriptedAgent {
    pub fn new<I>(steps: I) -> Self
    where
        I: IntoIterator<Item = ScriptedStep>,
    {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Serve the same reply for every invocation.
    pub fn always(text: impl Into<String>) -> Self {
        Self {
            steps: Mutex::new(VecDeque::new()),
            fallback: Some(text.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(text.into());
        self
    }

    /// Requests seen so far, in invocation order.
    pub fn requests(&self) -> Vec<WorkerRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn invocation_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn next_step(&self) -> Option<ScriptedStep> {
        self.steps.lock().unwrap().pop_front()
    }
}

#[async_trait]
impl CodingAgent for ScriptedAgent {
    async fn invoke(
        &self,
        _current_dir: &Path,
        request: &WorkerRequest,
    ) -> Result<WorkerResponse, ExecutorError> {
        self.requests.lock().unwrap().push(request.clone());

        let step = match self.next_step() {
            Some(step) => step,
            None => match &self.fallback {
                Some(text) => ScriptedStep::Reply(text.clone()),
                None => {
                    return Err(ExecutorError::Spawn(std::io::Error::other(
                        "scripted agent exhausted",
                    )));
                }
            },
        };

        match step {
            ScriptedStep::Reply(text) => Ok(WorkerResponse {
                text,
                exit_code: Some(0),
                elapsed: Duration::ZERO,
            }),
            ScriptedStep::Delay(pause, text) => {
                tokio::time::sleep(pause).await;
                Ok(WorkerResponse {
                    text,
                    exit_code: Some(0),
                    elapsed: pause,
                })
            }
            ScriptedStep::Fail(message) => {
                Err(ExecutorError::Spawn(std::io::Error::other(message)))
            }
            ScriptedStep::Empty => Err(ExecutorError::EmptyOutput),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_plays_in_order_then_falls_back() {
        let agent = ScriptedAgent::new([
            ScriptedStep::Reply("first".to_string()),
            ScriptedStep::Empty,
        ])
        .with_fallback("later");

        let dir = Path::new(".");
        let req = WorkerRequest::new("go");
        assert_eq!(agent.invoke(dir, &req).await.unwrap().text, "first");
        assert!(matches!(
            agent.invoke(dir, &req).await,
            Err(ExecutorError::EmptyOutput)
        ));
        assert_eq!(agent.invoke(dir, &req).await.unwrap().text, "later");
        assert_eq!(agent.invocation_count(), 3);
    }
}
