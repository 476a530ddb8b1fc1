//! Deadline and degradation handling for external operations.
//!
//! Every Worker, git, or HTTP call goes through [`DeadlineManager::guard`]
//! (or its fallback variant). A timeout abandons the result locally; the
//! still-running operation's side effects are not rolled back, which is why
//! stage outputs are written idempotently. With a fallback configured the
//! caller always gets a value and can check `degraded` to see which path
//! produced it.

use std::future::Future;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use strum_macros::Display;
use tracing::warn;

/// Operation classes with distinct deadline defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OpClass {
    Analysis,
    Setup,
    Implementation,
    Validation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadlineConfig {
    pub analysis_secs: u64,
    pub setup_secs: u64,
    pub implementation_secs: u64,
    pub validation_secs: u64,
    /// Budget growth per complexity point away from the midpoint (5),
    /// as a fraction of the base budget.
    pub complexity_scale: f64,
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        Self {
            analysis_secs: 180,
            setup_secs: 300,
            implementation_secs: 1800,
            validation_secs: 300,
            complexity_scale: 0.15,
        }
    }
}

/// Outcome of a guarded operation.
#[derive(Debug)]
pub struct Guarded<T> {
    pub value: Option<T>,
    /// The value (if any) came from the fallback, not the operation.
    pub degraded: bool,
    /// The deadline fired before the operation resolved.
    pub timed_out: bool,
    pub elapsed: Duration,
    pub error: Option<String>,
}

impl<T> Guarded<T> {
    /// Operation completed on the primary path.
    pub fn completed(&self) -> bool {
        self.value.is_some() && !self.degraded
    }

    pub fn into_value(self) -> Option<T> {
        self.value
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeadlineManager {
    config: DeadlineConfig,
}

impl DeadlineManager {
    pub fn new(config: DeadlineConfig) -> Self {
        Self { config }
    }

    pub fn budget(&self, class: OpClass) -> Duration {
        let secs = match class {
            OpClass::Analysis => self.config.analysis_secs,
            OpClass::Setup => self.config.setup_secs,
            OpClass::Implementation => self.config.implementation_secs,
            OpClass::Validation => self.config.validation_secs,
        };
        Duration::from_secs(secs)
    }

    /// Class budget scaled by task complexity. Complexity 5 is the
    /// baseline; harder tasks get more time, trivial ones less, floored at
    /// a quarter of the base budget.
    pub fn budget_for(&self, class: OpClass, complexity: u8) -> Duration {
        let base = self.budget(class);
        let multiplier =
            (1.0 + self.config.complexity_scale * (f64::from(complexity) - 5.0)).max(0.25);
        Duration::from_secs_f64(base.as_secs_f64() * multiplier)
    }

    /// Race `op` against `deadline`. No fallback: a timeout or operation
    /// error leaves `value` empty with the flags telling which it was.
    pub async fn guard<T, E, F>(&self, class: OpClass, deadline: Duration, op: F) -> Guarded<T>
    where
        F: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let started = Instant::now();
        match tokio::time::timeout(deadline, op).await {
            Ok(Ok(value)) => Guarded {
                value: Some(value),
                degraded: false,
                timed_out: false,
                elapsed: started.elapsed(),
                error: None,
            },
            Ok(Err(err)) => {
                warn!("[DEADLINE] {class} operation failed: {err}");
                Guarded {
                    value: None,
                    degraded: false,
                    timed_out: false,
                    elapsed: started.elapsed(),
                    error: Some(err.to_string()),
                }
            }
            Err(_) => {
                warn!("[DEADLINE] {class} operation exceeded {deadline:?}; abandoning result");
                Guarded {
                    value: None,
                    degraded: false,
                    timed_out: true,
                    elapsed: started.elapsed(),
                    error: Some(format!("timed out after {deadline:?}")),
                }
            }
        }
    }

    /// Like [`DeadlineManager::guard`], but a timeout or operation error
    /// invokes `fallback` and returns its value with `degraded = true`.
    pub async fn guard_with_fallback<T, E, F>(
        &self,
        class: OpClass,
        deadline: Duration,
        op: F,
        fallback: impl FnOnce() -> T,
    ) -> Guarded<T>
    where
        F: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut guarded = self.guard(class, deadline, op).await;
        if guarded.value.is_none() {
            warn!("[DEADLINE] {class} falling back to degraded value");
            guarded.value = Some(fallback());
            guarded.degraded = true;
        }
        guarded
    }
}
