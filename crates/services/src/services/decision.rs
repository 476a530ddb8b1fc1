//! Risk-weighted admission scoring.
//!
//! Turns an evaluated task into an admission score from four factors:
//! evaluation confidence, per-organization track record, simplicity, and
//! reward size. The risk tolerance profile shifts both the factor weights
//! and the admission threshold. Organization counters are seeded once from
//! the loaded index and only ever updated by completed outcomes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use strum_macros::Display;
use tracing::debug;

use db::TaskStore;
use db::models::task::{Task, TaskState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RiskTolerance {
    Conservative,
    #[default]
    Moderate,
    Aggressive,
}

#[derive(Debug, Clone, Copy)]
pub struct FactorWeights {
    pub confidence: f64,
    pub track_record: f64,
    pub simplicity: f64,
    pub reward: f64,
}

impl RiskTolerance {
    /// Weights always sum to 1.0.
    pub fn weights(&self) -> FactorWeights {
        match self {
            RiskTolerance::Conservative => FactorWeights {
                confidence: 0.30,
                track_record: 0.30,
                simplicity: 0.25,
                reward: 0.15,
            },
            RiskTolerance::Moderate => FactorWeights {
                confidence: 0.30,
                track_record: 0.25,
                simplicity: 0.20,
                reward: 0.25,
            },
            RiskTolerance::Aggressive => FactorWeights {
                confidence: 0.25,
                track_record: 0.15,
                simplicity: 0.15,
                reward: 0.45,
            },
        }
    }

    pub fn threshold(&self) -> f64 {
        match self {
            RiskTolerance::Conservative => 0.72,
            RiskTolerance::Moderate => 0.60,
            RiskTolerance::Aggressive => 0.48,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct OrgHistory {
    pub attempts: u32,
    pub successes: u32,
}

impl OrgHistory {
    /// Unknown organizations start at the midpoint rather than zero, so a
    /// first task from a new org is neither favored nor buried.
    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.5
        } else {
            f64::from(self.successes) / f64::from(self.attempts)
        }
    }
}

/// Per-organization outcome counters. Explicitly passed, never global.
#[derive(Debug, Default)]
pub struct OrgHistoryStore {
    counters: HashMap<String, OrgHistory>,
    seeded: bool,
}

impl OrgHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed counters from completed outcomes already in the index. Runs at
    /// most once; a second call is a no-op so mid-run state never resets.
    pub fn seed_from(&mut self, store: &TaskStore) {
        if self.seeded {
            return;
        }
        self.seeded = true;
        for task in store.iter() {
            let outcome = match task.status {
                TaskState::Ready => Some(true),
                TaskState::Rejected => Some(false),
                TaskState::Archived => Some(task.progress.ready_for_submission),
                _ => None,
            };
            if let Some(success) = outcome {
                let entry = self.counters.entry(task.org.clone()).or_default();
                entry.attempts += 1;
                entry.successes += u32::from(success);
            }
        }
        debug!("Seeded history for {} organizations", self.counters.len());
    }

    pub fn record_outcome(&mut self, org: &str, success: bool) {
        let entry = self.counters.entry(org.to_string()).or_default();
        entry.attempts += 1;
        entry.successes += u32::from(success);
    }

    pub fn get(&self, org: &str) -> OrgHistory {
        self.counters.get(org).copied().unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct Factor {
    pub name: &'static str,
    pub weight: f64,
    /// Normalized 0.0..=1.0.
    pub value: f64,
    pub contribution: f64,
}

/// Ephemeral: recomputed at every decision point, never persisted.
#[derive(Debug, Clone)]
pub struct DecisionRecord {
    pub task_id: String,
    pub factors: Vec<Factor>,
    pub score: f64,
    pub confidence: u8,
    pub admitted: bool,
    pub rationale: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DecisionEngine {
    tolerance: RiskTolerance,
    max_admissions: usize,
    /// Rewards at or above this normalize to 1.0.
    reward_cap_cents: u64,
}

impl DecisionEngine {
    pub fn new(tolerance: RiskTolerance, max_admissions: usize) -> Self {
        Self {
            tolerance,
            max_admissions,
            reward_cap_cents: 50_000,
        }
    }

    pub fn with_reward_cap(mut self, cents: u64) -> Self {
        self.reward_cap_cents = cents.max(1);
        self
    }

    pub fn score(&self, task: &Task, history: &OrgHistory) -> DecisionRecord {
        let weights = self.tolerance.weights();
        let progress = &task.progress;

        let confidence_value = f64::from(progress.confidence) / 100.0;
        let track_value = history.success_rate();
        let simplicity_value = 1.0 - (f64::from(progress.complexity) - 1.0) / 9.0;
        let reward_value =
            (task.reward.amount_cents as f64 / self.reward_cap_cents as f64).min(1.0);

        let factors = vec![
            factor("confidence", weights.confidence, confidence_value),
            factor("track-record", weights.track_record, track_value),
            factor("simplicity", weights.simplicity, simplicity_value),
            factor("reward", weights.reward, reward_value),
        ];
        let score: f64 = factors.iter().map(|f| f.contribution).sum();
        let threshold = self.tolerance.threshold();
        let admitted = score >= threshold;

        let mut rationale: Vec<String> = factors
            .iter()
            .map(|f| format!("{}: {:.2} × {:.2} = {:.3}", f.name, f.value, f.weight, f.contribution))
            .collect();
        rationale.push(format!(
            "org history: {} successes / {} attempts",
            history.successes, history.attempts
        ));
        rationale.push(if admitted {
            format!("score {score:.3} ≥ {threshold:.2} ({})", self.tolerance)
        } else {
            format!("score {score:.3} < {threshold:.2} ({})", self.tolerance)
        });

        DecisionRecord {
            task_id: task.id.clone(),
            factors,
            score,
            confidence: progress.confidence,
            admitted,
            rationale,
        }
    }

    /// Admitted records ranked by score (descending, ties by id) and capped
    /// at the configured admission count.
    pub fn rank(&self, records: Vec<DecisionRecord>) -> Vec<DecisionRecord> {
        let mut admitted: Vec<DecisionRecord> =
            records.into_iter().filter(|r| r.admitted).collect();
        admitted.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.task_id.cmp(&b.task_id))
        });
        admitted.truncate(self.max_admissions);
        admitted
    }
}

fn factor(name: &'static str, weight: f64, value: f64) -> Factor {
    let value = value.clamp(0.0, 1.0);
    Factor {
        name,
        weight,
        value,
        contribution: weight * value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use db::models::task::{IngestedTask, Reward};

    fn scored_task(id: &str, org: &str, confidence: u8, complexity: u8, cents: u64) -> Task {
        let mut task = Task::from_ingested(IngestedTask {
            id: id.to_string(),
            org: org.to_string(),
            repo: "widget".to_string(),
            issue_number: Some(1),
            title: "Fix".to_string(),
            body: "broken".to_string(),
            url: format!("https://example.com/{id}"),
            reward: Reward {
                amount_cents: cents,
                currency: "USD".to_string(),
            },
            attempt_count: 0,
        });
        task.progress.confidence = confidence;
        task.progress.complexity = complexity;
        task
    }

    #[test]
    fn test_risk_profiles_shift_the_admission_line() {
        // confidence 0.40, track 0.50, simplicity 0.556, reward 0.80
        let task = scored_task("t-1", "acme", 40, 5, 40_000);
        let history = OrgHistory::default();

        let conservative = DecisionEngine::new(RiskTolerance::Conservative, 10)
            .score(&task, &history);
        let moderate = DecisionEngine::new(RiskTolerance::Moderate, 10).score(&task, &history);
        let aggressive = DecisionEngine::new(RiskTolerance::Aggressive, 10).score(&task, &history);

        assert!(!conservative.admitted);
        assert!(!moderate.admitted);
        assert!(aggressive.admitted, "reward-heavy profile admits at {:.3}", aggressive.score);
    }

    #[test]
    fn test_score_is_weighted_sum_of_factors() {
        let task = scored_task("t-1", "acme", 80, 1, 50_000);
        let record = DecisionEngine::new(RiskTolerance::Moderate, 10)
            .score(&task, &OrgHistory::default());
        // 0.30×0.8 + 0.25×0.5 + 0.20×1.0 + 0.25×1.0
        let expected = 0.24 + 0.125 + 0.20 + 0.25;
        assert!((record.score - expected).abs() < 1e-9);
        assert!(record.admitted);
        assert_eq!(record.factors.len(), 4);
    }

    #[test]
    fn test_history_seeds_once_and_never_resets() {
        let mut store = TaskStore::new();
        let mut ready = scored_task("t-1", "acme", 80, 3, 10_000);
        ready.status = TaskState::Ready;
        let mut rejected = scored_task("t-2", "acme", 80, 3, 10_000);
        rejected.status = TaskState::Rejected;
        store.insert(ready);
        store.insert(rejected);

        let mut history = OrgHistoryStore::new();
        history.seed_from(&store);
        assert_eq!(history.get("acme").attempts, 2);
        assert_eq!(history.get("acme").successes, 1);

        // Second seed must not double-count
        history.seed_from(&store);
        assert_eq!(history.get("acme").attempts, 2);

        history.record_outcome("acme", true);
        assert_eq!(history.get("acme").attempts, 3);
        assert_eq!(history.get("acme").successes, 2);
    }

    #[test]
    fn test_unknown_org_starts_at_midpoint() {
        let history = OrgHistoryStore::new();
        assert!((history.get("nobody").success_rate() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_rank_caps_and_breaks_ties_by_id() {
        let engine = DecisionEngine::new(RiskTolerance::Aggressive, 2);
        let history = OrgHistory::default();
        let records = vec![
            engine.score(&scored_task("t-b", "acme", 90, 2, 50_000), &history),
            engine.score(&scored_task("t-a", "acme", 90, 2, 50_000), &history),
            engine.score(&scored_task("t-c", "acme", 95, 2, 50_000), &history),
        ];
        let ranked = engine.rank(records);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].task_id, "t-c");
        assert_eq!(ranked[1].task_id, "t-a", "equal scores fall back to id order");
    }
}
