//! Weighted multi-check quality gate.
//!
//! Five fixed checks run against a task's recorded outcome flags; nothing
//! here talks to the outside world, so the gate is deterministic given the
//! progress record. Checks run first, then the weighted aggregate; strict
//! mode is a final AND over the per-check passes and can only turn a
//! passing verdict into a failing one.

use chrono::Utc;
use thiserror::Error;
use tracing::debug;
use utils::text::phrase_occurrences;

use db::models::progress::{ProgressRecord, StepStatus};
use db::models::quality::{CheckResult, QualityGateRecord};
use db::models::task::Task;

pub const CHECK_TESTS: &str = "tests-pass";
pub const CHECK_REQUIREMENTS: &str = "requirements-met";
pub const CHECK_CODE_QUALITY: &str = "code-quality";
pub const CHECK_SUBMISSION: &str = "submission-ready";
pub const CHECK_COMPLETE: &str = "implementation-complete";

/// Phrases in implementation notes that count as red flags.
const RED_FLAG_PHRASES: &[&str] = &[
    "todo",
    "fixme",
    "hack",
    "workaround",
    "partially",
    "incomplete",
    "not implemented",
    "gave up",
];

#[derive(Debug, Error)]
pub enum QualityGateError {
    #[error("check weights must sum to 1.0 (got {sum:.3})")]
    InvalidWeights { sum: f64 },
}

#[derive(Debug, Clone)]
pub struct CheckWeights {
    pub tests: f64,
    pub requirements: f64,
    pub code_quality: f64,
    pub submission: f64,
    pub completeness: f64,
}

impl Default for CheckWeights {
    fn default() -> Self {
        Self {
            tests: 0.30,
            requirements: 0.25,
            code_quality: 0.20,
            submission: 0.15,
            completeness: 0.10,
        }
    }
}

impl CheckWeights {
    fn sum(&self) -> f64 {
        self.tests + self.requirements + self.code_quality + self.submission + self.completeness
    }
}

#[derive(Debug, Clone)]
pub struct QualityGateConfig {
    /// Aggregate score required to pass, 0..=100.
    pub threshold: u8,
    pub strict: bool,
    pub weights: CheckWeights,
}

impl Default for QualityGateConfig {
    fn default() -> Self {
        Self {
            threshold: 70,
            strict: false,
            weights: CheckWeights::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QualityGate {
    config: QualityGateConfig,
}

impl QualityGate {
    pub fn new(config: QualityGateConfig) -> Result<Self, QualityGateError> {
        let sum = config.weights.sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(QualityGateError::InvalidWeights { sum });
        }
        Ok(Self { config })
    }

    /// Default weights and threshold, non-strict.
    pub fn standard() -> Self {
        Self {
            config: QualityGateConfig::default(),
        }
    }

    pub fn strict(mut self) -> Self {
        self.config.strict = true;
        self
    }

    pub fn with_threshold(mut self, threshold: u8) -> Self {
        self.config.threshold = threshold.min(100);
        self
    }

    pub fn evaluate(&self, task: &Task) -> QualityGateRecord {
        let progress = &task.progress;
        let notes = progress.implementation_notes.as_deref().unwrap_or("");
        let red_flags = phrase_occurrences(&notes.to_lowercase(), RED_FLAG_PHRASES);

        let checks = vec![
            check_tests(progress.tests_passing),
            check_requirements(progress.requirements_met),
            check_code_quality(progress, red_flags),
            check_submission(progress),
            check_complete(progress),
        ];

        let weights = [
            self.config.weights.tests,
            self.config.weights.requirements,
            self.config.weights.code_quality,
            self.config.weights.submission,
            self.config.weights.completeness,
        ];
        let aggregate: f64 = checks
            .iter()
            .zip(weights)
            .map(|(check, weight)| weight * f64::from(check.score))
            .sum();
        let score = aggregate.round().clamp(0.0, 100.0) as u8;

        let all_passed = checks.iter().all(|c| c.passed);
        let passed = score >= self.config.threshold && (!self.config.strict || all_passed);

        let mut blockers = Vec::new();
        let mut warnings = Vec::new();
        let mut recommendations = Vec::new();
        for check in &checks {
            let sink = if check.passed { &mut warnings } else { &mut blockers };
            for issue in &check.issues {
                if !sink.contains(issue) {
                    sink.push(issue.clone());
                }
            }
            for rec in &check.recommendations {
                if !recommendations.contains(rec) {
                    recommendations.push(rec.clone());
                }
            }
        }

        debug!(
            "Quality gate for {}: score {score} (threshold {}), passed={passed}",
            task.id, self.config.threshold
        );

        QualityGateRecord {
            evaluated_at: Utc::now(),
            passed,
            score,
            strict: self.config.strict,
            checks,
            blockers,
            warnings,
            recommendations,
        }
    }
}

fn check_tests(tests_passing: bool) -> CheckResult {
    if tests_passing {
        CheckResult::new(CHECK_TESTS, true, 100)
            .with_evidence("implementation reports the test suite passing")
    } else {
        CheckResult::new(CHECK_TESTS, false, 0)
            .with_issue("test suite not confirmed passing")
            .with_recommendation("re-run the suite inside the workspace and record the outcome")
    }
}

fn check_requirements(requirements_met: bool) -> CheckResult {
    if requirements_met {
        CheckResult::new(CHECK_REQUIREMENTS, true, 100)
            .with_evidence("implementation reports the requirements met")
    } else {
        CheckResult::new(CHECK_REQUIREMENTS, false, 0)
            .with_issue("requirements coverage not confirmed")
            .with_recommendation("compare the diff against the task description point by point")
    }
}

fn check_code_quality(progress: &ProgressRecord, red_flags: usize) -> CheckResult {
    let mut score: i64 = if progress.quality_validated { 85 } else { 35 };
    let mut check = CheckResult::new(CHECK_CODE_QUALITY, false, 0);

    if progress.quality_validated {
        check = check.with_evidence("quality validation recorded by the implementation");
    } else {
        check = check.with_issue("code quality not validated");
    }

    if red_flags == 0 {
        score += 15;
        check = check.with_evidence("no red-flag phrases in the implementation notes");
    } else {
        score -= 10 * red_flags as i64;
        check = check.with_issue(format!(
            "{red_flags} red-flag phrase(s) in the implementation notes"
        ));
        check = check.with_recommendation("resolve the flagged leftovers before submitting");
    }

    // Hard tasks that finished without any notes deserve suspicion
    if progress.complexity >= 8 && progress.implementation_notes.is_none() {
        score -= 10;
        check = check.with_issue("complex task finished without implementation notes");
    }

    check.score = score.clamp(0, 100) as u8;
    check.passed = check.score >= 60;
    check
}

fn check_submission(progress: &ProgressRecord) -> CheckResult {
    if progress.ready_for_submission {
        CheckResult::new(CHECK_SUBMISSION, true, 100)
            .with_evidence("all three outcome flags recorded true")
    } else {
        let mut missing = Vec::new();
        if !progress.tests_passing {
            missing.push("tests");
        }
        if !progress.requirements_met {
            missing.push("requirements");
        }
        if !progress.quality_validated {
            missing.push("quality");
        }
        CheckResult::new(CHECK_SUBMISSION, false, 0)
            .with_issue(format!("not ready for submission (missing: {})", missing.join(", ")))
    }
}

fn check_complete(progress: &ProgressRecord) -> CheckResult {
    let (passed, score) = match progress.implementation_status {
        StepStatus::Completed => (true, 100),
        StepStatus::InProgress => (false, 50),
        StepStatus::Failed => (false, 10),
        StepStatus::NotStarted => (false, 0),
    };
    let mut check = CheckResult::new(CHECK_COMPLETE, passed, score);
    if passed {
        check = check.with_evidence("implementation step completed");
    } else {
        check = check.with_issue(format!(
            "implementation step is {}",
            progress.implementation_status
        ));
    }
    if let Some(error) = &progress.last_error {
        check = check.with_issue(format!("last recorded error: {error}"));
    }
    check
}

#[cfg(test)]
mod tests {
    use super::*;
    use db::models::progress::ImplementationFlags;
    use db::models::task::{IngestedTask, Reward};

    fn task_with_flags(tests: bool, requirements: bool, quality: bool) -> Task {
        let mut task = Task::from_ingested(IngestedTask {
            id: "t-1".to_string(),
            org: "acme".to_string(),
            repo: "widget".to_string(),
            issue_number: Some(1),
            title: "Fix widget".to_string(),
            body: "it is broken".to_string(),
            url: "https://example.com/t-1".to_string(),
            reward: Reward {
                amount_cents: 10_000,
                currency: "USD".to_string(),
            },
            attempt_count: 0,
        });
        task.progress.begin_implementation();
        task.progress.complete_implementation(
            ImplementationFlags {
                tests_passing: tests,
                requirements_met: requirements,
                quality_validated: quality,
            },
            None,
        );
        task
    }

    #[test]
    fn test_aggregate_is_rounded_weighted_sum() {
        // tests 100, requirements 0, quality 100, submission 0, complete 100
        let task = task_with_flags(true, false, true);
        let record = QualityGate::standard().evaluate(&task);
        let expected: f64 = (0.30 * 100.0) + (0.25 * 0.0) + (0.20 * 100.0) + (0.15 * 0.0) + (0.10 * 100.0);
        assert_eq!(record.score, expected.round() as u8);
        assert_eq!(record.score, 60);
        assert!(!record.passed, "60 is below the default threshold of 70");
    }

    #[test]
    fn test_all_flags_true_passes_cleanly() {
        let task = task_with_flags(true, true, true);
        let record = QualityGate::standard().evaluate(&task);
        assert_eq!(record.score, 100);
        assert!(record.passed);
        assert!(record.blockers.is_empty());
    }

    #[test]
    fn test_strict_mode_only_flips_pass_to_fail() {
        // requirements+tests+quality good, submission blocked by ready flag
        let mut task = task_with_flags(true, true, true);
        task.progress.ready_for_submission = false;
        let relaxed = QualityGate::standard().evaluate(&task);
        assert!(relaxed.score >= 70);
        assert!(relaxed.passed);

        let strict = QualityGate::standard().strict().evaluate(&task);
        assert_eq!(strict.score, relaxed.score);
        assert!(!strict.passed, "one failing check must fail strict mode");
    }

    #[test]
    fn test_strict_mode_never_flips_fail_to_pass() {
        // Every check passes, but the aggregate lands at 98: the complexity
        // heuristic trims code-quality to 90 when a hard task has no notes
        let mut task = task_with_flags(true, true, true);
        task.progress.complexity = 9;
        let config = |strict| QualityGateConfig {
            threshold: 99,
            strict,
            weights: CheckWeights::default(),
        };

        let relaxed = QualityGate::new(config(false)).unwrap().evaluate(&task);
        assert!(relaxed.checks.iter().all(|c| c.passed));
        assert_eq!(relaxed.score, 98);
        assert!(!relaxed.passed);

        let strict = QualityGate::new(config(true)).unwrap().evaluate(&task);
        assert_eq!(strict.score, relaxed.score);
        assert!(!strict.passed);
    }

    #[test]
    fn test_issues_split_into_blockers_and_warnings() {
        let mut task = task_with_flags(true, true, true);
        // Passing code-quality check with a red flag becomes a warning
        task.progress.implementation_notes = Some("small workaround in the config loader".to_string());
        let record = QualityGate::standard().evaluate(&task);

        let quality = record
            .checks
            .iter()
            .find(|c| c.name == CHECK_CODE_QUALITY)
            .unwrap();
        assert!(quality.passed);
        assert!(record.warnings.iter().any(|w| w.contains("red-flag")));
        assert!(!record.blockers.iter().any(|b| b.contains("red-flag")));

        let failing = task_with_flags(false, true, true);
        let failing_record = QualityGate::standard().evaluate(&failing);
        assert!(failing_record
            .blockers
            .iter()
            .any(|b| b.contains("test suite not confirmed")));
    }

    #[test]
    fn test_invalid_weights_rejected() {
        let config = QualityGateConfig {
            threshold: 70,
            strict: false,
            weights: CheckWeights {
                tests: 0.5,
                requirements: 0.5,
                code_quality: 0.5,
                submission: 0.0,
                completeness: 0.0,
            },
        };
        assert!(matches!(
            QualityGate::new(config),
            Err(QualityGateError::InvalidWeights { .. })
        ));
    }
}
