pub mod availability;
pub mod config;
pub mod decision;
pub mod deps;
pub mod git;
pub mod marketplace;
pub mod quality;
pub mod repo_cache;
pub mod timeout;
pub mod tracker;
pub mod workspace;

pub use availability::{AvailabilityError, AvailabilityVerdict, ConsistencyValidator};
pub use config::{ConfigError, PipelineConfig};
pub use decision::{DecisionEngine, DecisionRecord, OrgHistoryStore, RiskTolerance};
pub use deps::{DependencyError, UnknownDeps, resolve_order};
pub use git::{GitError, GitService};
pub use marketplace::{HttpMarketplace, MarketSignal, Marketplace, SignalError};
pub use quality::{QualityGate, QualityGateConfig, QualityGateError};
pub use repo_cache::{CacheError, RepoCache};
pub use timeout::{DeadlineConfig, DeadlineManager, Guarded, OpClass};
pub use tracker::{GithubTracker, IssueTracker, TrackerSignal};
pub use workspace::WorkspaceManager;
