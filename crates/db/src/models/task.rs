use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

use super::progress::ProgressRecord;

/// Lifecycle stage of a task inside the pipeline.
///
/// Stages only move forward within a run; the sole sanctioned backward move
/// is [`Task::reset_for_reevaluation`] once the staleness window elapsed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskState {
    Discovered,
    Evaluating,
    Evaluated,
    Skipped,
    Prepping,
    Prepped,
    Implementing,
    Implemented,
    QualityGating,
    Ready,
    Rejected,
    Archived,
}

impl TaskState {
    /// Position in the pipeline. `Skipped`/`Prepping` and `Ready`/`Rejected`
    /// are parallel branches and share a rank.
    pub fn rank(&self) -> u8 {
        match self {
            TaskState::Discovered => 0,
            TaskState::Evaluating => 1,
            TaskState::Evaluated => 2,
            TaskState::Skipped | TaskState::Prepping => 3,
            TaskState::Prepped => 4,
            TaskState::Implementing => 5,
            TaskState::Implemented => 6,
            TaskState::QualityGating => 7,
            TaskState::Ready | TaskState::Rejected => 8,
            TaskState::Archived => 9,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Ready | TaskState::Rejected | TaskState::Archived
        )
    }
}

/// Bounty reward, kept in cents to avoid float money.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    pub amount_cents: u64,
    pub currency: String,
}

impl Reward {
    pub fn new(amount_cents: u64, currency: &str) -> Self {
        Self {
            amount_cents,
            currency: currency.to_string(),
        }
    }
}

impl std::fmt::Display for Reward {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{:02} {}",
            self.amount_cents / 100,
            self.amount_cents % 100,
            self.currency
        )
    }
}

/// Normalized task record as delivered by the ingestion collaborator.
/// The pipeline only consumes this shape, it never produces it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestedTask {
    pub id: String,
    pub org: String,
    pub repo: String,
    pub issue_number: Option<u64>,
    pub title: String,
    pub body: String,
    pub url: String,
    pub reward: Reward,
    #[serde(default)]
    pub attempt_count: u32,
}

/// An externally posted paid work item plus its pipeline progress.
///
/// Created on ingestion, mutated only forward, never deleted — a finished
/// task is archived and stays in the index document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub org: String,
    pub repo: String,
    pub issue_number: Option<u64>,
    pub title: String,
    pub body: String,
    pub url: String,
    pub reward: Reward,
    pub attempt_count: u32,
    pub status: TaskState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub progress: ProgressRecord,
}

impl Task {
    pub fn from_ingested(record: IngestedTask) -> Self {
        let now = Utc::now();
        Self {
            id: record.id,
            org: record.org,
            repo: record.repo,
            issue_number: record.issue_number,
            title: record.title,
            body: record.body,
            url: record.url,
            reward: record.reward,
            attempt_count: record.attempt_count,
            status: TaskState::Discovered,
            created_at: now,
            updated_at: now,
            progress: ProgressRecord::default(),
        }
    }

    /// Move the task forward. Backward or same-rank moves (other than the
    /// branch siblings sharing a rank) are ignored and reported as `false`.
    pub fn advance(&mut self, next: TaskState) -> bool {
        if next.rank() > self.status.rank() {
            self.status = next;
            self.updated_at = Utc::now();
            true
        } else {
            false
        }
    }

    /// Re-enter the pipeline for a fresh evaluation. Only legal from the
    /// evaluation-adjacent stages; anything at `Prepping` or beyond keeps
    /// its progress. The caller is responsible for checking the staleness
    /// window first.
    pub fn reset_for_reevaluation(&mut self) -> bool {
        match self.status {
            TaskState::Evaluating | TaskState::Evaluated | TaskState::Skipped => {
                self.status = TaskState::Discovered;
                self.progress.clear_evaluation();
                self.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }

    pub fn archive(&mut self) -> bool {
        if self.status == TaskState::Archived {
            return false;
        }
        self.status = TaskState::Archived;
        self.updated_at = Utc::now();
        true
    }

    /// Prompt-ready description of the work item.
    pub fn to_prompt(&self) -> String {
        format!(
            "Title: {}\nRepository: {}/{}\nReward: {}\n\n{}",
            self.title, self.org, self.repo, self.reward, self.body
        )
    }
}
