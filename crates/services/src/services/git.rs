//! Thin git2 wrapper used by the cache and workspace managers.
//!
//! Local-path remotes work the same as https ones, which is what keeps the
//! cache manager testable without a network.

use std::path::Path;

use git2::build::CheckoutBuilder;
use git2::{BranchType, FetchOptions, ObjectType, Repository, ResetType};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("git operation failed: {0}")]
    Git(#[from] git2::Error),
    #[error("io error during git operation: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GitService;

impl GitService {
    pub fn new() -> Self {
        Self
    }

    pub fn is_repository(&self, path: &Path) -> bool {
        Repository::open(path).is_ok()
    }

    pub fn clone_repository(&self, url: &str, dest: &Path) -> Result<(), GitError> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        debug!("Cloning {url} into {}", dest.display());
        Repository::clone(url, dest)?;
        Ok(())
    }

    /// Fetch origin and hard-reset the current branch to its remote tip.
    pub fn fetch_and_reset(&self, path: &Path) -> Result<(), GitError> {
        let repo = Repository::open(path)?;
        {
            let mut remote = repo.find_remote("origin")?;
            let mut options = FetchOptions::new();
            remote.fetch(
                &["+refs/heads/*:refs/remotes/origin/*"],
                Some(&mut options),
                None,
            )?;
        }
        let branch = repo
            .head()?
            .shorthand()
            .unwrap_or("HEAD")
            .to_string();
        let remote_ref = repo.find_reference(&format!("refs/remotes/origin/{branch}"))?;
        let target = remote_ref.peel(ObjectType::Commit)?;
        repo.reset(&target, ResetType::Hard, None)?;
        debug!("Reset {} to origin/{branch}", path.display());
        Ok(())
    }

    pub fn head_commit_id(&self, path: &Path) -> Result<String, GitError> {
        let repo = Repository::open(path)?;
        let commit = repo.head()?.peel_to_commit()?;
        Ok(commit.id().to_string())
    }

    pub fn current_branch(&self, path: &Path) -> Result<Option<String>, GitError> {
        let repo = Repository::open(path)?;
        Ok(repo.head()?.shorthand().map(str::to_string))
    }

    /// Create `name` at HEAD if it does not exist yet, then check it out.
    pub fn create_or_checkout_branch(&self, path: &Path, name: &str) -> Result<(), GitError> {
        let repo = Repository::open(path)?;
        if repo.find_branch(name, BranchType::Local).is_err() {
            let head = repo.head()?.peel_to_commit()?;
            repo.branch(name, &head, false)?;
        }
        repo.set_head(&format!("refs/heads/{name}"))?;
        let mut checkout = CheckoutBuilder::new();
        checkout.force();
        repo.checkout_head(Some(&mut checkout))?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;

    use git2::{Repository, Signature};

    /// Initialize a repo with one commit and return the commit id.
    pub fn init_source_repo(dir: &Path) -> String {
        let repo = Repository::init(dir).unwrap();
        commit_file(&repo, dir, "README.md", "hello", "init")
    }

    pub fn commit_file(
        repo: &Repository,
        dir: &Path,
        file: &str,
        content: &str,
        message: &str,
    ) -> String {
        std::fs::write(dir.join(file), content).unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new(file)).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let signature = Signature::now("tester", "tester@example.com").unwrap();
        let parent = repo
            .head()
            .ok()
            .and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<_> = parent.iter().collect();
        let id = repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
            .unwrap();
        id.to_string()
    }
}
