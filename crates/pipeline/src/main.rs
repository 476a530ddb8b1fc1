use clap::{Parser, ValueEnum};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use pipeline::{RunOptions, run};
use services::services::RiskTolerance;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RiskArg {
    Conservative,
    Moderate,
    Aggressive,
}

impl From<RiskArg> for RiskTolerance {
    fn from(arg: RiskArg) -> Self {
        match arg {
            RiskArg::Conservative => RiskTolerance::Conservative,
            RiskArg::Moderate => RiskTolerance::Moderate,
            RiskArg::Aggressive => RiskTolerance::Aggressive,
        }
    }
}

/// Automated bounty pipeline: evaluate, admit, prep, and implement paid
/// tasks from the index document.
#[derive(Debug, Parser)]
#[command(name = "bounty-pipe", version)]
struct Cli {
    /// Cap on how many tasks each stage picks up this run.
    #[arg(long, default_value_t = 5)]
    max_tasks: usize,

    /// Ignore tasks paying less than this, in cents.
    #[arg(long, default_value_t = 0)]
    min_reward_cents: u64,

    /// Ignore tasks attempted by more hunters than this.
    #[arg(long, default_value_t = 10)]
    max_attempts: u32,

    /// Only consider tasks from this organization.
    #[arg(long)]
    org: Option<String>,

    /// Admit `caution` decisions as well as `go`.
    #[arg(long)]
    relaxed: bool,

    #[arg(long, value_enum, default_value_t = RiskArg::Moderate)]
    risk: RiskArg,

    /// Require every individual quality check to pass.
    #[arg(long)]
    strict_quality: bool,

    /// Skip the quality gate entirely.
    #[arg(long)]
    no_quality_gates: bool,

    /// Tasks dispatched per batch when running concurrently.
    #[arg(long, default_value_t = 4)]
    batch_size: usize,

    /// Concurrent tasks within a batch; 1 is strictly sequential.
    #[arg(long, default_value_t = 1)]
    workers: usize,

    /// Pause between tasks or batches, in milliseconds.
    #[arg(long, default_value_t = 1500)]
    politeness_ms: u64,

    /// Redo evaluations older than this many hours.
    #[arg(long, default_value_t = 24)]
    reevaluate_after: u32,

    /// Minimum evaluated success probability for admission.
    #[arg(long, default_value_t = 70)]
    min_probability: u8,

    /// Repository mirrors older than this are refreshed, in hours.
    #[arg(long, default_value_t = 24)]
    cache_max_age: u32,

    /// Archive finished tasks untouched for this many hours.
    #[arg(long, default_value_t = 168)]
    archive_after: u32,

    /// Stop after evaluation; no repository is touched.
    #[arg(long)]
    evaluate_only: bool,

    /// Run evaluation and prep but leave implementation for later.
    #[arg(long)]
    skip_implementation: bool,

    /// Log verbosity for the pipeline crates (overridden by RUST_LOG).
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn into_options(self) -> RunOptions {
        RunOptions {
            max_tasks_per_stage: self.max_tasks,
            min_reward_cents: self.min_reward_cents,
            max_attempt_count: self.max_attempts,
            org_filter: self.org,
            relaxed_admission: self.relaxed,
            risk_tolerance: self.risk.into(),
            strict_quality: self.strict_quality,
            quality_gates_enabled: !self.no_quality_gates,
            batch_size: self.batch_size,
            worker_count: self.workers,
            politeness_delay_ms: self.politeness_ms,
            reevaluate_after_hours: self.reevaluate_after,
            min_success_probability: self.min_probability,
            cache_max_age_hours: self.cache_max_age,
            archive_after_hours: self.archive_after,
            evaluate_only: self.evaluate_only,
            skip_implementation: self.skip_implementation,
        }
    }
}

fn init_tracing(level: &str) {
    let default_filter = format!(
        "warn,pipeline={level},services={level},db={level},executors={level},utils={level}"
    );
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(env_filter))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let summary = run(cli.into_options()).await?;

    tracing::info!(
        "Done: {} evaluated ({} failed), {} admitted, {} prepped ({} failed), \
         {} implemented ({} failed), {} ready, {} rejected, {} archived",
        summary.evaluated,
        summary.evaluation_failures,
        summary.admitted,
        summary.prepped,
        summary.prep_failures,
        summary.implemented,
        summary.implementation_failures,
        summary.ready,
        summary.rejected,
        summary.archived,
    );
    Ok(())
}
