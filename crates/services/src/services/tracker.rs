//! Issue tracker capability.
//!
//! The tracker is the second availability source: whoever the upstream
//! issue is assigned to has first claim on the work, whatever the
//! marketplace says.

use async_trait::async_trait;
use tracing::debug;

use crate::services::marketplace::SignalError;

/// Assignment status as reported by the issue tracker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerSignal {
    pub assignee: Option<String>,
}

#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Fresh assignment status for one issue.
    async fn assignment_signal(
        &self,
        org: &str,
        repo: &str,
        issue: u64,
    ) -> Result<TrackerSignal, SignalError>;
}

pub struct GithubTracker {
    client: octocrab::Octocrab,
}

impl GithubTracker {
    pub fn new(token: Option<String>) -> Result<Self, SignalError> {
        let mut builder = octocrab::Octocrab::builder();
        if let Some(token) = token {
            builder = builder.personal_token(token);
        }
        let client = builder
            .build()
            .map_err(|err| SignalError::Tracker(err.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl IssueTracker for GithubTracker {
    async fn assignment_signal(
        &self,
        org: &str,
        repo: &str,
        issue: u64,
    ) -> Result<TrackerSignal, SignalError> {
        let issue = self
            .client
            .issues(org, repo)
            .get(issue)
            .await
            .map_err(|err| SignalError::Tracker(err.to_string()))?;

        // GitHub keeps both a legacy single assignee and a list; either
        // one counts as "taken"
        let number = issue.number;
        let assignee = issue
            .assignee
            .map(|a| a.login)
            .or_else(|| issue.assignees.into_iter().next().map(|a| a.login));
        debug!("Tracker signal for {org}/{repo}#{number}: {assignee:?}");
        Ok(TrackerSignal { assignee })
    }
}
