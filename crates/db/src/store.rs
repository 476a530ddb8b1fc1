//! In-memory task store backing the index document.
//!
//! Flat map keyed by task id plus an insertion-order list, so iteration is
//! deterministic and the by-organization grouping is always derived, never
//! stored. Mutation happens here or on the tasks themselves; the grouping
//! cannot drift.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::index::{IndexError, TaskIndex};
use crate::models::task::{IngestedTask, Task, TaskState};

#[derive(Debug, Default)]
pub struct TaskStore {
    tasks: HashMap<String, Task>,
    order: Vec<String>,
}

/// What an ingestion merge did, for the run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub added: usize,
    pub refreshed: usize,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let index = TaskIndex::load(path)?;
        let mut store = Self::new();
        for task in index.into_tasks() {
            store.insert(task);
        }
        Ok(store)
    }

    /// Regenerate the grouped document and write it atomically.
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        let tasks: Vec<Task> = self.iter().cloned().collect();
        TaskIndex::build(tasks).save(path)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.get_mut(id)
    }

    /// Insert or replace. New ids go to the end of the iteration order.
    pub fn insert(&mut self, task: Task) {
        if !self.tasks.contains_key(&task.id) {
            self.order.push(task.id.clone());
        }
        self.tasks.insert(task.id.clone(), task);
    }

    /// Tasks in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.order.iter().filter_map(|id| self.tasks.get(id))
    }

    /// Snapshot of ids in insertion order, for iterate-while-mutating loops.
    pub fn ids(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Derived grouping view. Organizations ascending, tasks in insertion
    /// order within each.
    pub fn by_org(&self) -> BTreeMap<&str, Vec<&Task>> {
        let mut groups: BTreeMap<&str, Vec<&Task>> = BTreeMap::new();
        for task in self.iter() {
            groups.entry(task.org.as_str()).or_default().push(task);
        }
        groups
    }

    /// Merge freshly ingested marketplace records. Unseen ids become new
    /// `Discovered` tasks; known ids get their marketplace-owned fields
    /// refreshed without touching progress.
    pub fn merge_ingested(&mut self, records: Vec<IngestedTask>) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        for record in records {
            match self.tasks.get_mut(&record.id) {
                Some(existing) => {
                    existing.title = record.title;
                    existing.body = record.body;
                    existing.url = record.url;
                    existing.reward = record.reward;
                    existing.attempt_count = record.attempt_count;
                    existing.updated_at = Utc::now();
                    outcome.refreshed += 1;
                }
                None => {
                    self.insert(Task::from_ingested(record));
                    outcome.added += 1;
                }
            }
        }
        info!(
            "Ingestion merge: {} new, {} refreshed, {} total",
            outcome.added,
            outcome.refreshed,
            self.len()
        );
        outcome
    }

    /// Archive terminal tasks whose last update is older than the window.
    /// Archived tasks stay in the document; selection skips them.
    pub fn archive_completed(&mut self, older_than_hours: u32, now: DateTime<Utc>) -> Vec<String> {
        let cutoff = now - Duration::hours(i64::from(older_than_hours));
        let mut archived = Vec::new();
        for id in self.ids() {
            let Some(task) = self.tasks.get_mut(&id) else {
                continue;
            };
            let terminal = matches!(task.status, TaskState::Ready | TaskState::Rejected);
            if terminal && task.updated_at <= cutoff {
                if task.archive() {
                    archived.push(id);
                } else {
                    warn!("Could not archive task {id} in state {}", task.status);
                }
            }
        }
        if !archived.is_empty() {
            info!("Archived {} completed tasks", archived.len());
        }
        archived
    }
}
