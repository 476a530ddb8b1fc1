//! Wiring for a real run: load the documents, build the live
//! collaborators, drive the pipeline, persist everything back.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use db::{IndexError, TaskStore};
use services::services::{
    ConfigError, GithubTracker, HttpMarketplace, PipelineConfig, SignalError,
};

use crate::engine::{Collaborators, Pipeline, PipelinePaths};
use crate::options::RunOptions;
use crate::summary::RunSummary;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("task index: {0}")]
    Index(#[from] IndexError),
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("issue tracker client: {0}")]
    Tracker(#[from] SignalError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One full pipeline run against the standard data directory.
///
/// The index document comes from ingestion; a missing or unreadable one
/// is fatal, the engine never guesses at state.
pub async fn run(options: RunOptions) -> Result<RunSummary, SetupError> {
    let paths = PipelinePaths::standard();
    let config = PipelineConfig::load_or_init(&paths.config)?;
    let mut store = TaskStore::load(&paths.index)?;

    let collaborators = Collaborators {
        agent: Arc::new(config.agent.clone()),
        tracker: Arc::new(GithubTracker::new(config.github_token())?),
        marketplace: Arc::new(HttpMarketplace::new(
            config.marketplace_url.clone(),
            config.marketplace_token(),
        )),
    };

    let mut pipeline = Pipeline::new(options, collaborators, paths.clone())?
        .with_deadlines(config.deadlines.clone())
        .with_quality_threshold(config.quality_threshold);

    let summary = pipeline.run(&mut store).await;

    store.save(&paths.index)?;
    match summary.save(&paths.runs) {
        Ok(path) => info!("Run report written to {}", path.display()),
        Err(err) => warn!("Could not write the run report: {err}"),
    }

    Ok(summary)
}
