//! Knobs for one pipeline run.

use services::services::RiskTolerance;

/// Everything `run` accepts. Defaults are deliberately cautious: one worker,
/// sequential processing with politeness delays, moderate risk.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Cap on how many tasks each stage picks up this run.
    pub max_tasks_per_stage: usize,
    pub min_reward_cents: u64,
    /// Tasks other hunters already attempted more often are skipped.
    pub max_attempt_count: u32,
    pub org_filter: Option<String>,
    /// Admit `caution` decisions as well as `go`.
    pub relaxed_admission: bool,
    pub risk_tolerance: RiskTolerance,
    /// Quality gate requires every individual check to pass.
    pub strict_quality: bool,
    pub quality_gates_enabled: bool,
    /// Tasks dispatched per batch; the whole batch is awaited before the
    /// next one starts.
    pub batch_size: usize,
    /// Concurrent tasks within a batch. 1 means strict sequential.
    pub worker_count: usize,
    pub politeness_delay_ms: u64,
    /// Staleness window before a stored evaluation is redone.
    pub reevaluate_after_hours: u32,
    pub min_success_probability: u8,
    pub cache_max_age_hours: u32,
    /// Terminal tasks untouched this long get archived at run end.
    pub archive_after_hours: u32,
    /// Stop after the evaluation stage; no repository is touched.
    pub evaluate_only: bool,
    /// Run evaluation and prep but leave implementation for a later run.
    pub skip_implementation: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_tasks_per_stage: 5,
            min_reward_cents: 0,
            max_attempt_count: 10,
            org_filter: None,
            relaxed_admission: false,
            risk_tolerance: RiskTolerance::Moderate,
            strict_quality: false,
            quality_gates_enabled: true,
            batch_size: 4,
            worker_count: 1,
            politeness_delay_ms: 1500,
            reevaluate_after_hours: 24,
            min_success_probability: 70,
            cache_max_age_hours: 24,
            archive_after_hours: 168,
            evaluate_only: false,
            skip_implementation: false,
        }
    }
}
