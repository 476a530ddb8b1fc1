//! The persisted task index document.
//!
//! A single versioned JSON file holding every tracked task, grouped by
//! organization for human inspection. The in-memory source of truth is the
//! flat [`crate::store::TaskStore`]; this module only shapes it for disk
//! and back.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::models::task::{Task, TaskState};

/// Current schema version. Documents with any other version are refused.
pub const INDEX_VERSION: u32 = 2;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index not found at {path}")]
    Missing { path: PathBuf },
    #[error("failed to read or write index: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse index document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unsupported index version {found} (this build reads version {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
}

/// Coarse state counters recomputed on every save.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub total: usize,
    pub discovered: usize,
    pub evaluated: usize,
    pub prepped: usize,
    pub implemented: usize,
    pub ready: usize,
    pub rejected: usize,
    pub archived: usize,
}

impl IndexStats {
    fn count(tasks: &[Task]) -> Self {
        let mut stats = Self {
            total: tasks.len(),
            ..Self::default()
        };
        for task in tasks {
            match task.status {
                TaskState::Discovered | TaskState::Evaluating => stats.discovered += 1,
                TaskState::Evaluated | TaskState::Skipped => stats.evaluated += 1,
                TaskState::Prepping | TaskState::Prepped => stats.prepped += 1,
                TaskState::Implementing
                | TaskState::Implemented
                | TaskState::QualityGating => stats.implemented += 1,
                TaskState::Ready => stats.ready += 1,
                TaskState::Rejected => stats.rejected += 1,
                TaskState::Archived => stats.archived += 1,
            }
        }
        stats
    }
}

/// One organization's tasks, sorted by task id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgTasks {
    pub org: String,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskIndex {
    pub version: u32,
    pub generated_at: DateTime<Utc>,
    pub stats: IndexStats,
    pub organizations: Vec<OrgTasks>,
}

// Parsed ahead of the full document so a future-versioned file fails with
// a version error instead of a field mismatch.
#[derive(Deserialize)]
struct VersionProbe {
    #[serde(default)]
    version: u32,
}

impl TaskIndex {
    /// Derive the document from the flat task list: group by organization
    /// (ascending), sort each group's tasks by id, recount stats.
    pub fn build(tasks: Vec<Task>) -> Self {
        let stats = IndexStats::count(&tasks);
        let mut groups: std::collections::BTreeMap<String, Vec<Task>> =
            std::collections::BTreeMap::new();
        for task in tasks {
            groups.entry(task.org.clone()).or_default().push(task);
        }
        let organizations = groups
            .into_iter()
            .map(|(org, mut tasks)| {
                tasks.sort_by(|a, b| a.id.cmp(&b.id));
                OrgTasks { org, tasks }
            })
            .collect();
        Self {
            version: INDEX_VERSION,
            generated_at: Utc::now(),
            stats,
            organizations,
        }
    }

    /// Flatten back into task order: org ascending, id ascending within.
    pub fn into_tasks(self) -> Vec<Task> {
        self.organizations
            .into_iter()
            .flat_map(|group| group.tasks)
            .collect()
    }

    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                IndexError::Missing {
                    path: path.to_path_buf(),
                }
            } else {
                IndexError::Io(e)
            }
        })?;

        let probe: VersionProbe = serde_json::from_str(&raw)?;
        if probe.version != INDEX_VERSION {
            return Err(IndexError::UnsupportedVersion {
                found: probe.version,
                supported: INDEX_VERSION,
            });
        }

        let index: TaskIndex = serde_json::from_str(&raw)?;
        debug!(
            "Loaded index: {} tasks across {} organizations",
            index.stats.total,
            index.organizations.len()
        );
        Ok(index)
    }

    /// Write atomically: serialize to a sibling temp file, then rename over
    /// the target so readers never observe a half-written document.
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        debug!("Saved index with {} tasks to {}", self.stats.total, path.display());
        Ok(())
    }
}
