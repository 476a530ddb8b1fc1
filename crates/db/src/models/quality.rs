//! Quality gate results as persisted on the task record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a single named check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    /// 0..=100 before weighting.
    pub score: u8,
    #[serde(default)]
    pub evidence: Vec<String>,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl CheckResult {
    pub fn new(name: impl Into<String>, passed: bool, score: u8) -> Self {
        Self {
            name: name.into(),
            passed,
            score: score.min(100),
            evidence: Vec::new(),
            issues: Vec::new(),
            recommendations: Vec::new(),
        }
    }

    pub fn with_evidence(mut self, line: impl Into<String>) -> Self {
        self.evidence.push(line.into());
        self
    }

    pub fn with_issue(mut self, line: impl Into<String>) -> Self {
        self.issues.push(line.into());
        self
    }

    pub fn with_recommendation(mut self, line: impl Into<String>) -> Self {
        self.recommendations.push(line.into());
        self
    }
}

/// Immutable record of one quality gate run. Re-running the gate writes a
/// fresh record rather than editing this one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityGateRecord {
    pub evaluated_at: DateTime<Utc>,
    pub passed: bool,
    /// Rounded weighted aggregate, 0..=100.
    pub score: u8,
    pub strict: bool,
    pub checks: Vec<CheckResult>,
    /// Deduplicated issues from failed checks.
    pub blockers: Vec<String>,
    /// Deduplicated issues from checks that still passed.
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
}

impl QualityGateRecord {
    pub fn failing_checks(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|c| !c.passed)
    }
}
