//! Freshness-bounded local mirrors of external source repositories.
//!
//! One mirror per org/repo, shared read-only across tasks; per-task
//! checkouts are derived by the workspace manager and never touch the
//! mirror. All mutation runs under a single mutex, and the metadata
//! document is written only after the underlying filesystem operation has
//! fully succeeded, so a crash can leave an orphaned directory but never a
//! metadata entry pointing at a half-finished one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::services::git::{GitError, GitService};

const METADATA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Git(#[from] GitError),
    #[error("cache io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache metadata serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("cache worker thread failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub org: String,
    pub repo: String,
    pub path: PathBuf,
    pub refreshed_at: DateTime<Utc>,
    /// Head commit id after the last clone/refresh.
    pub fingerprint: String,
    pub ref_count: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheMetadata {
    version: u32,
    entries: Vec<CacheEntry>,
}

/// What a `get_repository` call resolved to.
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub path: PathBuf,
    pub fingerprint: String,
    /// True when this call performed a clone or refresh.
    pub refreshed: bool,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
}

pub struct RepoCache {
    root: PathBuf,
    metadata_path: PathBuf,
    /// Prefix the org/repo pair is appended to. Local paths work too,
    /// which is how the tests stay offline.
    remote_base: String,
    git: GitService,
    state: Mutex<CacheState>,
}

impl RepoCache {
    pub fn new(root: PathBuf, metadata_path: PathBuf) -> Self {
        let state = CacheState {
            entries: load_metadata(&metadata_path),
        };
        Self {
            root,
            metadata_path,
            remote_base: "https://github.com".to_string(),
            git: GitService::new(),
            state: Mutex::new(state),
        }
    }

    pub fn with_remote_base(mut self, base: impl Into<String>) -> Self {
        self.remote_base = base.into();
        self
    }

    fn remote_url(&self, org: &str, repo: &str) -> String {
        format!("{}/{org}/{repo}", self.remote_base.trim_end_matches('/'))
    }

    fn local_path(&self, org: &str, repo: &str) -> PathBuf {
        self.root.join(org).join(repo)
    }

    /// Return a fresh mirror path, cloning or refreshing as needed.
    ///
    /// `pin` increments the entry's reference count; pair it with
    /// [`RepoCache::release`]. A stale entry gets exactly one refresh
    /// attempt; if that fails the mirror is deleted and re-cloned.
    pub async fn get_repository(
        &self,
        org: &str,
        repo: &str,
        max_age_hours: u32,
        pin: bool,
    ) -> Result<CacheHit, CacheError> {
        let mut state = self.state.lock().await;
        let key = format!("{org}/{repo}");
        let local = self.local_path(org, repo);
        let now = Utc::now();

        let existing = state.entries.get(&key).cloned();
        let fresh = existing.as_ref().is_some_and(|entry| {
            now.signed_duration_since(entry.refreshed_at)
                < Duration::hours(i64::from(max_age_hours))
        });

        // git2 is synchronous; keep it off the async threads. The metadata
        // lock stays held across the wait, so there is still exactly one
        // writer at a time.
        let (refreshed, fingerprint) = {
            let git = self.git;
            let remote = self.remote_url(org, repo);
            let label = key.clone();
            let target = local.clone();
            tokio::task::spawn_blocking(move || {
                let refreshed = if fresh && git.is_repository(&target) {
                    false
                } else {
                    materialize(&git, &remote, &label, &target)?;
                    true
                };
                let fingerprint = git.head_commit_id(&target)?;
                Ok::<_, CacheError>((refreshed, fingerprint))
            })
            .await??
        };

        let refreshed_at = if refreshed {
            now
        } else {
            existing.as_ref().map(|e| e.refreshed_at).unwrap_or(now)
        };
        let ref_count = existing.map(|e| e.ref_count).unwrap_or(0) + u32::from(pin);
        state.entries.insert(
            key,
            CacheEntry {
                org: org.to_string(),
                repo: repo.to_string(),
                path: local.clone(),
                refreshed_at,
                fingerprint: fingerprint.clone(),
                ref_count,
            },
        );
        persist_metadata(&state, &self.metadata_path)?;

        Ok(CacheHit {
            path: local,
            fingerprint,
            refreshed,
        })
    }

    /// Drop one pinned reference. Saturating; releasing an unknown entry is
    /// a no-op.
    pub async fn release(&self, org: &str, repo: &str) -> Result<(), CacheError> {
        let mut state = self.state.lock().await;
        let key = format!("{org}/{repo}");
        if let Some(entry) = state.entries.get_mut(&key) {
            entry.ref_count = entry.ref_count.saturating_sub(1);
            persist_metadata(&state, &self.metadata_path)?;
        }
        Ok(())
    }

    /// Delete mirrors older than the retention window. Entries still
    /// referenced survive when `keep_active` is set.
    pub async fn cleanup(
        &self,
        max_age_hours: u32,
        keep_active: bool,
    ) -> Result<Vec<String>, CacheError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| {
                let old = now.signed_duration_since(entry.refreshed_at)
                    >= Duration::hours(i64::from(max_age_hours));
                old && (entry.ref_count == 0 || !keep_active)
            })
            .map(|(key, _)| key.clone())
            .collect();

        let mut removed = Vec::new();
        for key in expired {
            let Some(entry) = state.entries.get(&key) else {
                continue;
            };
            if entry.path.exists() {
                if let Err(err) = std::fs::remove_dir_all(&entry.path) {
                    // Keep the entries already removed out of the document
                    persist_metadata(&state, &self.metadata_path)?;
                    return Err(err.into());
                }
            }
            state.entries.remove(&key);
            removed.push(key);
        }
        if !removed.is_empty() {
            info!("Cache cleanup removed {} mirrors", removed.len());
            persist_metadata(&state, &self.metadata_path)?;
        }
        Ok(removed)
    }

    pub async fn entry(&self, org: &str, repo: &str) -> Option<CacheEntry> {
        let state = self.state.lock().await;
        state.entries.get(&format!("{org}/{repo}")).cloned()
    }

    #[cfg(test)]
    async fn force_age(&self, org: &str, repo: &str, hours: i64) {
        let mut state = self.state.lock().await;
        if let Some(entry) = state.entries.get_mut(&format!("{org}/{repo}")) {
            entry.refreshed_at = Utc::now() - Duration::hours(hours);
        }
    }
}

/// Clone or refresh the mirror on disk. Metadata is untouched here.
fn materialize(
    git: &GitService,
    remote_url: &str,
    label: &str,
    local: &Path,
) -> Result<(), CacheError> {
    if git.is_repository(local) {
        match git.fetch_and_reset(local) {
            Ok(()) => {
                debug!("Refreshed mirror {label}");
                return Ok(());
            }
            Err(err) => {
                warn!("Refresh of {label} failed ({err}); re-cloning");
            }
        }
    }
    if local.exists() {
        std::fs::remove_dir_all(local)?;
    }
    git.clone_repository(remote_url, local)?;
    info!("Cloned mirror {label}");
    Ok(())
}

fn load_metadata(path: &Path) -> HashMap<String, CacheEntry> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(_) => return HashMap::new(),
    };
    match serde_json::from_str::<CacheMetadata>(&raw) {
        Ok(metadata) if metadata.version == METADATA_VERSION => metadata
            .entries
            .into_iter()
            .map(|e| (format!("{}/{}", e.org, e.repo), e))
            .collect(),
        Ok(metadata) => {
            warn!(
                "Cache metadata has version {} (expected {METADATA_VERSION}); starting empty",
                metadata.version
            );
            HashMap::new()
        }
        Err(err) => {
            warn!("Cache metadata unreadable ({err}); starting empty");
            HashMap::new()
        }
    }
}

fn persist_metadata(state: &CacheState, path: &Path) -> Result<(), CacheError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut entries: Vec<CacheEntry> = state.entries.values().cloned().collect();
    entries.sort_by(|a, b| (&a.org, &a.repo).cmp(&(&b.org, &b.repo)));
    let metadata = CacheMetadata {
        version: METADATA_VERSION,
        entries,
    };
    let json = serde_json::to_string_pretty(&metadata)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::git::test_support::{commit_file, init_source_repo};
    use git2::Repository;

    struct Fixture {
        _sources: tempfile::TempDir,
        _data: tempfile::TempDir,
        source_base: PathBuf,
        cache: RepoCache,
        metadata_path: PathBuf,
        cache_root: PathBuf,
    }

    fn fixture() -> Fixture {
        let sources = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        let source_base = sources.path().to_path_buf();
        let cache_root = data.path().join("cache");
        let metadata_path = cache_root.join("metadata.json");
        let cache = RepoCache::new(cache_root.clone(), metadata_path.clone())
            .with_remote_base(source_base.to_str().unwrap());
        Fixture {
            _sources: sources,
            _data: data,
            source_base,
            cache,
            metadata_path,
            cache_root,
        }
    }

    fn seed_source(fixture: &Fixture, org: &str, repo: &str) -> PathBuf {
        let dir = fixture.source_base.join(org).join(repo);
        std::fs::create_dir_all(&dir).unwrap();
        init_source_repo(&dir);
        dir
    }

    #[tokio::test]
    async fn test_fresh_hit_returns_existing_path_without_refresh() {
        let fx = fixture();
        seed_source(&fx, "acme", "widget");

        let first = fx.cache.get_repository("acme", "widget", 24, false).await.unwrap();
        assert!(first.refreshed);

        let second = fx.cache.get_repository("acme", "widget", 24, false).await.unwrap();
        assert!(!second.refreshed);
        assert_eq!(second.path, first.path);
        assert_eq!(second.fingerprint, first.fingerprint);
    }

    #[tokio::test]
    async fn test_stale_entry_gets_exactly_one_refresh() {
        let fx = fixture();
        let source = seed_source(&fx, "acme", "widget");
        let first = fx.cache.get_repository("acme", "widget", 24, false).await.unwrap();

        let source_repo = Repository::open(&source).unwrap();
        let newer = commit_file(&source_repo, &source, "more.txt", "x", "second");
        fx.cache.force_age("acme", "widget", 48).await;

        let second = fx.cache.get_repository("acme", "widget", 24, false).await.unwrap();
        assert!(second.refreshed);
        assert_eq!(second.fingerprint, newer);
        assert_ne!(second.fingerprint, first.fingerprint);

        // Now fresh again: no further refresh
        let third = fx.cache.get_repository("acme", "widget", 24, false).await.unwrap();
        assert!(!third.refreshed);
    }

    #[tokio::test]
    async fn test_broken_mirror_is_recloned() {
        let fx = fixture();
        seed_source(&fx, "acme", "widget");
        let hit = fx.cache.get_repository("acme", "widget", 24, false).await.unwrap();

        // Wreck the mirror so it is no longer a repository
        std::fs::remove_dir_all(hit.path.join(".git")).unwrap();
        fx.cache.force_age("acme", "widget", 48).await;

        let repaired = fx.cache.get_repository("acme", "widget", 24, false).await.unwrap();
        assert!(repaired.refreshed);
        assert!(fx.cache_root.join("acme").join("widget").join(".git").exists());
    }

    #[tokio::test]
    async fn test_pin_and_release_track_reference_counts() {
        let fx = fixture();
        seed_source(&fx, "acme", "widget");

        fx.cache.get_repository("acme", "widget", 24, true).await.unwrap();
        fx.cache.get_repository("acme", "widget", 24, true).await.unwrap();
        assert_eq!(fx.cache.entry("acme", "widget").await.unwrap().ref_count, 2);

        fx.cache.release("acme", "widget").await.unwrap();
        assert_eq!(fx.cache.entry("acme", "widget").await.unwrap().ref_count, 1);

        // Releasing below zero saturates
        fx.cache.release("acme", "widget").await.unwrap();
        fx.cache.release("acme", "widget").await.unwrap();
        assert_eq!(fx.cache.entry("acme", "widget").await.unwrap().ref_count, 0);
    }

    #[tokio::test]
    async fn test_cleanup_respects_keep_active() {
        let fx = fixture();
        seed_source(&fx, "acme", "widget");
        seed_source(&fx, "acme", "gadget");

        fx.cache.get_repository("acme", "widget", 24, true).await.unwrap();
        fx.cache.get_repository("acme", "gadget", 24, false).await.unwrap();

        // Everything is "old" with a zero-hour window; widget is pinned
        let removed = fx.cache.cleanup(0, true).await.unwrap();
        assert_eq!(removed, vec!["acme/gadget".to_string()]);
        assert!(fx.cache.entry("acme", "widget").await.is_some());
        assert!(!fx.cache_root.join("acme").join("gadget").exists());

        // Without keep_active even pinned mirrors go
        let removed = fx.cache.cleanup(0, false).await.unwrap();
        assert_eq!(removed, vec!["acme/widget".to_string()]);
    }

    #[tokio::test]
    async fn test_metadata_survives_restart() {
        let fx = fixture();
        seed_source(&fx, "acme", "widget");
        let hit = fx.cache.get_repository("acme", "widget", 24, true).await.unwrap();

        let reopened = RepoCache::new(fx.cache_root.clone(), fx.metadata_path.clone())
            .with_remote_base(fx.source_base.to_str().unwrap());
        let entry = reopened.entry("acme", "widget").await.unwrap();
        assert_eq!(entry.fingerprint, hit.fingerprint);
        assert_eq!(entry.ref_count, 1);

        let again = reopened.get_repository("acme", "widget", 24, false).await.unwrap();
        assert!(!again.refreshed);
    }

    #[tokio::test]
    async fn test_corrupt_metadata_starts_empty() {
        let fx = fixture();
        seed_source(&fx, "acme", "widget");
        std::fs::create_dir_all(&fx.cache_root).unwrap();
        std::fs::write(&fx.metadata_path, "{not json").unwrap();

        let cache = RepoCache::new(fx.cache_root.clone(), fx.metadata_path.clone())
            .with_remote_base(fx.source_base.to_str().unwrap());
        assert!(cache.entry("acme", "widget").await.is_none());
        let hit = cache.get_repository("acme", "widget", 24, false).await.unwrap();
        assert!(hit.refreshed);
    }
}
