//! Per-task progress record.
//!
//! Exclusively owned by its Task and mutated only through the methods here,
//! which enforce the forward-only discipline: completed steps stay
//! completed for the remainder of a run, and a finished evaluation is only
//! discarded through an explicit staleness reset.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::Display;

use super::quality::QualityGateRecord;
use super::subtask::DiscreteSubtask;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EvaluationStatus {
    NotEvaluated,
    InProgress,
    Evaluated,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Decision {
    Go,
    NoGo,
    Caution,
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Unknown,
}

/// Shared status shape for the prep and implementation steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StepStatus {
    NotStarted,
    InProgress,
    Completed,
    Failed,
}

impl StepStatus {
    fn rank(&self) -> u8 {
        match self {
            StepStatus::NotStarted => 0,
            StepStatus::InProgress => 1,
            StepStatus::Failed => 2,
            StepStatus::Completed => 3,
        }
    }

    /// Forward-only, with one exception: a failed step may re-enter
    /// `InProgress` on a later run. `Completed` is sticky.
    pub fn can_become(&self, next: StepStatus) -> bool {
        if *self == StepStatus::Failed && next == StepStatus::InProgress {
            return true;
        }
        next.rank() > self.rank()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub evaluation_status: EvaluationStatus,
    pub evaluated_at: Option<DateTime<Utc>>,
    pub decision: Decision,
    /// 1..=10, defaulting to the midpoint before any evaluation ran.
    pub complexity: u8,
    /// 0..=100.
    pub success_probability: u8,
    pub risk_level: RiskLevel,
    /// Parse-quality signal for the evaluation, 0..=100.
    pub confidence: u8,
    pub rationale: Vec<String>,

    pub prep_status: StepStatus,
    pub environment_validated: bool,
    pub plan: Vec<DiscreteSubtask>,

    pub implementation_status: StepStatus,
    pub tests_passing: bool,
    pub requirements_met: bool,
    pub quality_validated: bool,
    pub ready_for_submission: bool,
    pub implementation_notes: Option<String>,

    pub quality_gate: Option<QualityGateRecord>,

    /// Last computed availability; display-only, admission always
    /// recomputes from fresh signals.
    pub available: bool,
    pub signal_disagreements: Vec<String>,

    pub last_error: Option<String>,
}

impl Default for ProgressRecord {
    fn default() -> Self {
        Self {
            evaluation_status: EvaluationStatus::NotEvaluated,
            evaluated_at: None,
            decision: Decision::Pending,
            complexity: 5,
            success_probability: 0,
            risk_level: RiskLevel::Unknown,
            confidence: 0,
            rationale: Vec::new(),
            prep_status: StepStatus::NotStarted,
            environment_validated: false,
            plan: Vec::new(),
            implementation_status: StepStatus::NotStarted,
            tests_passing: false,
            requirements_met: false,
            quality_validated: false,
            ready_for_submission: false,
            implementation_notes: None,
            quality_gate: None,
            available: false,
            signal_disagreements: Vec::new(),
            last_error: None,
        }
    }
}

/// Evaluation fields produced by the Worker response extraction.
#[derive(Debug, Clone)]
pub struct EvaluationUpdate {
    pub decision: Decision,
    pub complexity: u8,
    pub success_probability: u8,
    pub risk_level: RiskLevel,
    pub confidence: u8,
    pub rationale: Vec<String>,
}

/// Outcome flags parsed from the implementation response.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImplementationFlags {
    pub tests_passing: bool,
    pub requirements_met: bool,
    pub quality_validated: bool,
}

impl ProgressRecord {
    pub fn begin_evaluation(&mut self) {
        if self.evaluation_status != EvaluationStatus::Evaluated {
            self.evaluation_status = EvaluationStatus::InProgress;
        }
    }

    pub fn record_evaluation(&mut self, update: EvaluationUpdate) {
        self.decision = update.decision;
        self.complexity = update.complexity.clamp(1, 10);
        self.success_probability = update.success_probability.min(100);
        self.risk_level = update.risk_level;
        self.confidence = update.confidence.min(100);
        self.rationale = update.rationale;
        self.evaluation_status = EvaluationStatus::Evaluated;
        self.evaluated_at = Some(Utc::now());
        self.last_error = None;
    }

    pub fn fail_evaluation(&mut self, error: impl Into<String>) {
        self.evaluation_status = EvaluationStatus::Failed;
        self.evaluated_at = Some(Utc::now());
        self.last_error = Some(error.into());
    }

    /// Whether a stored evaluation (or failure) is old enough to redo.
    pub fn evaluation_is_stale(&self, window_hours: u32, now: DateTime<Utc>) -> bool {
        match self.evaluated_at {
            Some(at) => now.signed_duration_since(at).num_hours() >= i64::from(window_hours),
            None => true,
        }
    }

    /// Discard evaluation results for a staleness reset. Prep and
    /// implementation fields survive; they have their own lifecycle.
    pub(crate) fn clear_evaluation(&mut self) {
        self.evaluation_status = EvaluationStatus::NotEvaluated;
        self.evaluated_at = None;
        self.decision = Decision::Pending;
        self.confidence = 0;
        self.rationale.clear();
    }

    pub fn begin_prep(&mut self) -> bool {
        self.step_to(Step::Prep, StepStatus::InProgress)
    }

    pub fn complete_prep(&mut self, environment_validated: bool) -> bool {
        if self.step_to(Step::Prep, StepStatus::Completed) {
            self.environment_validated = environment_validated;
            true
        } else {
            false
        }
    }

    pub fn fail_prep(&mut self, error: impl Into<String>) -> bool {
        if self.step_to(Step::Prep, StepStatus::Failed) {
            self.last_error = Some(error.into());
            true
        } else {
            false
        }
    }

    pub fn begin_implementation(&mut self) -> bool {
        self.step_to(Step::Implementation, StepStatus::InProgress)
    }

    /// Record a finished implementation. Sticky: once completed, later
    /// calls in the same run cannot downgrade the flags.
    pub fn complete_implementation(
        &mut self,
        flags: ImplementationFlags,
        notes: Option<String>,
    ) -> bool {
        if !self.step_to(Step::Implementation, StepStatus::Completed) {
            return false;
        }
        self.tests_passing = flags.tests_passing;
        self.requirements_met = flags.requirements_met;
        self.quality_validated = flags.quality_validated;
        self.ready_for_submission =
            flags.tests_passing && flags.requirements_met && flags.quality_validated;
        self.implementation_notes = notes;
        true
    }

    pub fn fail_implementation(&mut self, error: impl Into<String>) -> bool {
        if self.step_to(Step::Implementation, StepStatus::Failed) {
            self.last_error = Some(error.into());
            true
        } else {
            false
        }
    }

    /// Replace the quality gate record wholesale (records are immutable
    /// once written, re-runs produce a new one).
    pub fn set_quality_gate(&mut self, record: QualityGateRecord) {
        self.quality_gate = Some(record);
    }

    pub fn set_availability(&mut self, available: bool, disagreements: Vec<String>) {
        self.available = available;
        self.signal_disagreements = disagreements;
    }

    fn step_to(&mut self, step: Step, next: StepStatus) -> bool {
        let current = match step {
            Step::Prep => &mut self.prep_status,
            Step::Implementation => &mut self.implementation_status,
        };
        if current.can_become(next) {
            *current = next;
            true
        } else {
            false
        }
    }
}

enum Step {
    Prep,
    Implementation,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluated() -> EvaluationUpdate {
        EvaluationUpdate {
            decision: Decision::Go,
            complexity: 4,
            success_probability: 80,
            risk_level: RiskLevel::Low,
            confidence: 85,
            rationale: vec!["clear scope".to_string()],
        }
    }

    #[test]
    fn record_evaluation_clamps_ranges() {
        let mut progress = ProgressRecord::default();
        progress.record_evaluation(EvaluationUpdate {
            complexity: 14,
            success_probability: 140,
            ..evaluated()
        });
        assert_eq!(progress.complexity, 10);
        assert_eq!(progress.success_probability, 100);
        assert_eq!(progress.evaluation_status, EvaluationStatus::Evaluated);
        assert!(progress.evaluated_at.is_some());
    }

    #[test]
    fn completed_implementation_is_sticky() {
        let mut progress = ProgressRecord::default();
        progress.begin_implementation();
        assert!(progress.complete_implementation(
            ImplementationFlags {
                tests_passing: true,
                requirements_met: true,
                quality_validated: true,
            },
            None,
        ));
        assert!(progress.ready_for_submission);

        // A second completion attempt must not revert anything
        assert!(!progress.complete_implementation(ImplementationFlags::default(), None));
        assert!(progress.tests_passing);
        assert!(progress.ready_for_submission);
        assert!(!progress.fail_implementation("late failure"));
        assert_eq!(progress.implementation_status, StepStatus::Completed);
    }

    #[test]
    fn failed_step_can_restart_later() {
        let mut progress = ProgressRecord::default();
        progress.begin_prep();
        progress.fail_prep("prep document too short");
        assert_eq!(progress.prep_status, StepStatus::Failed);
        assert!(progress.begin_prep());
        assert_eq!(progress.prep_status, StepStatus::InProgress);
    }

    #[test]
    fn staleness_window_gates_reevaluation() {
        let mut progress = ProgressRecord::default();
        assert!(progress.evaluation_is_stale(24, Utc::now()));

        progress.record_evaluation(evaluated());
        let now = Utc::now();
        assert!(!progress.evaluation_is_stale(24, now));
        assert!(progress.evaluation_is_stale(0, now));

        let later = now + chrono::Duration::hours(25);
        assert!(progress.evaluation_is_stale(24, later));
    }

    #[test]
    fn partial_flags_do_not_mark_ready() {
        let mut progress = ProgressRecord::default();
        progress.begin_implementation();
        progress.complete_implementation(
            ImplementationFlags {
                tests_passing: true,
                requirements_met: true,
                quality_validated: false,
            },
            Some("lint debt remains".to_string()),
        );
        assert!(!progress.ready_for_submission);
        assert_eq!(progress.implementation_status, StepStatus::Completed);
    }
}
