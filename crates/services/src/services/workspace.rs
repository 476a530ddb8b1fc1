//! Per-task workspaces.
//!
//! A workspace is a local clone of a cache mirror on a task-specific
//! branch. It belongs to exactly one task, so there is no locking here;
//! the only shared resource is the mirror, which is read-only from this
//! side of the fence.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::services::git::{GitError, GitService};

#[derive(Debug, Clone)]
pub struct Workspace {
    pub task_id: String,
    pub path: PathBuf,
    pub branch: String,
    /// True when an existing checkout on the right branch was kept.
    pub reused: bool,
}

#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
    git: GitService,
}

impl WorkspaceManager {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            git: GitService::new(),
        }
    }

    pub fn branch_name(task_id: &str) -> String {
        format!("bounty/{task_id}")
    }

    pub fn path_for(&self, task_id: &str) -> PathBuf {
        self.root.join(task_id)
    }

    /// Clone the mirror into a task-owned checkout on `bounty/<task_id>`.
    /// An existing checkout already on that branch is reused as-is; anything
    /// else at the path is replaced.
    pub fn create_workspace(
        &self,
        cache_path: &Path,
        task_id: &str,
    ) -> Result<Workspace, GitError> {
        let path = self.path_for(task_id);
        let branch = Self::branch_name(task_id);

        if self.git.is_repository(&path) {
            if self.git.current_branch(&path)?.as_deref() == Some(branch.as_str()) {
                debug!("Reusing workspace for {task_id} at {}", path.display());
                return Ok(Workspace {
                    task_id: task_id.to_string(),
                    path,
                    branch,
                    reused: true,
                });
            }
            std::fs::remove_dir_all(&path)?;
        } else if path.exists() {
            std::fs::remove_dir_all(&path)?;
        }

        self.git
            .clone_repository(&cache_path.to_string_lossy(), &path)?;
        self.git.create_or_checkout_branch(&path, &branch)?;
        info!("Created workspace for {task_id} on {branch}");

        Ok(Workspace {
            task_id: task_id.to_string(),
            path,
            branch,
            reused: false,
        })
    }

    /// Delete a task's checkout. Returns whether anything was removed.
    pub fn remove_workspace(&self, task_id: &str) -> std::io::Result<bool> {
        let path = self.path_for(task_id);
        if path.exists() {
            std::fs::remove_dir_all(&path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
