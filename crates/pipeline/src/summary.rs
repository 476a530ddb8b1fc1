//! Per-run report.
//!
//! Counts what each stage did plus every task failure with enough context
//! to find it again. Written to `runs/run-<timestamp>.json` at the end of a
//! run; the document is append-only history, nothing reads it back.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use db::TaskStore;
use db::models::progress::Decision;

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DecisionCounts {
    pub go: usize,
    pub no_go: usize,
    pub caution: usize,
    pub pending: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskFailure {
    pub task_id: String,
    pub stage: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,

    pub evaluated: usize,
    pub evaluation_failures: usize,
    /// Guard-passing tasks admitted by the decision engine.
    pub admitted: usize,
    /// Evaluated but turned away by an admission guard.
    pub skipped: usize,
    /// Admissible but ranked out or currently unavailable; retried next run.
    pub deferred: usize,
    /// Excluded this run because the availability signals conflicted.
    pub excluded: usize,
    pub prepped: usize,
    pub prep_failures: usize,
    pub implemented: usize,
    pub implementation_failures: usize,
    pub ready: usize,
    pub rejected: usize,
    pub archived: usize,

    pub decisions: DecisionCounts,
    pub failures: Vec<TaskFailure>,
}

impl RunSummary {
    pub fn started_now() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            evaluated: 0,
            evaluation_failures: 0,
            admitted: 0,
            skipped: 0,
            deferred: 0,
            excluded: 0,
            prepped: 0,
            prep_failures: 0,
            implemented: 0,
            implementation_failures: 0,
            ready: 0,
            rejected: 0,
            archived: 0,
            decisions: DecisionCounts::default(),
            failures: Vec::new(),
        }
    }

    pub fn record_failure(
        &mut self,
        task_id: impl Into<String>,
        stage: &str,
        error: impl Into<String>,
    ) {
        self.failures.push(TaskFailure {
            task_id: task_id.into(),
            stage: stage.to_string(),
            error: error.into(),
        });
    }

    /// Decision distribution over the whole store, not just this run's
    /// tasks, so the report shows the index as it stands.
    pub fn tally_decisions(&mut self, store: &TaskStore) {
        let mut counts = DecisionCounts::default();
        for task in store.iter() {
            match task.progress.decision {
                Decision::Go => counts.go += 1,
                Decision::NoGo => counts.no_go += 1,
                Decision::Caution => counts.caution += 1,
                Decision::Pending => counts.pending += 1,
            }
        }
        self.decisions = counts;
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn save(&self, runs_dir: &Path) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(runs_dir)?;
        let stamp = self.started_at.format("%Y%m%dT%H%M%S%3f");
        let path = runs_dir.join(format!("run-{stamp}.json"));
        let json = serde_json::to_string_pretty(self)
            .map_err(|err| std::io::Error::other(err.to_string()))?;
        std::fs::write(&path, json)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use db::models::task::{IngestedTask, Reward, Task};

    fn task(id: &str, decision: Decision) -> Task {
        let mut task = Task::from_ingested(IngestedTask {
            id: id.to_string(),
            org: "acme".to_string(),
            repo: "widget".to_string(),
            issue_number: None,
            title: "Fix".to_string(),
            body: "broken".to_string(),
            url: format!("https://example.com/{id}"),
            reward: Reward::new(1_000, "USD"),
            attempt_count: 0,
        });
        task.progress.decision = decision;
        task
    }

    #[test]
    fn test_tally_counts_every_decision() {
        let mut store = TaskStore::new();
        store.insert(task("t-1", Decision::Go));
        store.insert(task("t-2", Decision::Go));
        store.insert(task("t-3", Decision::NoGo));
        store.insert(task("t-4", Decision::Pending));

        let mut summary = RunSummary::started_now();
        summary.tally_decisions(&store);
        assert_eq!(summary.decisions.go, 2);
        assert_eq!(summary.decisions.no_go, 1);
        assert_eq!(summary.decisions.caution, 0);
        assert_eq!(summary.decisions.pending, 1);
    }

    #[test]
    fn test_save_writes_timestamped_report() {
        let dir = tempfile::tempdir().unwrap();
        let mut summary = RunSummary::started_now();
        summary.evaluated = 3;
        summary.record_failure("t-9", "evaluation", "worker timed out");
        summary.finish();

        let path = summary.save(dir.path()).unwrap();
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("run-"));
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"evaluated\": 3"));
        assert!(raw.contains("worker timed out"));
    }
}
