//! Plan items produced during prep.

use serde::{Deserialize, Serialize};

/// One independently completable slice of work from the prep plan.
///
/// Belongs to exactly one task's implementation plan. `depends_on` names
/// sibling subtasks by id; the resulting graph must be acyclic, which the
/// dependency resolver enforces before execution ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscreteSubtask {
    pub id: String,
    pub description: String,
    /// 1 = most urgent, as stated by the plan.
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub estimated_minutes: u32,
}

fn default_priority() -> u8 {
    5
}

impl DiscreteSubtask {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            priority: default_priority(),
            depends_on: Vec::new(),
            estimated_minutes: 0,
        }
    }

    pub fn with_deps<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }
}
