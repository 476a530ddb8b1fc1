//! Stage orchestration.
//!
//! One [`Pipeline`] owns the collaborators and drives a full run over the
//! task store: evaluation, admission, prep, implementation, finalization.
//! Stages never reach backward; a task that fails a stage keeps its record
//! and is picked up again on a later run. All mutation of the store happens
//! between dispatches, so concurrent workers only ever touch their own
//! task clone.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use futures::stream;
use tracing::{debug, info, warn};

use db::TaskStore;
use db::models::progress::{
    Decision, EvaluationUpdate, ImplementationFlags, RiskLevel, StepStatus,
};
use db::models::subtask::DiscreteSubtask;
use db::models::task::{Task, TaskState};
use executors::CodingAgent;
use executors::extract::{
    PlannedSubtask, RiskBand, Verdict, extract_evaluation, extract_implementation, extract_plan,
};
use services::services::{
    ConsistencyValidator, DeadlineConfig, DeadlineManager, DecisionEngine, IssueTracker,
    MarketSignal, Marketplace, OpClass, OrgHistoryStore, QualityGate, RepoCache, TrackerSignal,
    UnknownDeps, WorkspaceManager, resolve_order,
};

use crate::content::validate_prep_document;
use crate::options::RunOptions;
use crate::prompts;
use crate::summary::RunSummary;

/// Where the pipeline keeps its documents and working directories.
#[derive(Debug, Clone)]
pub struct PipelinePaths {
    pub data_dir: PathBuf,
    pub config: PathBuf,
    pub index: PathBuf,
    pub cache_root: PathBuf,
    pub cache_metadata: PathBuf,
    pub workspaces: PathBuf,
    pub runs: PathBuf,
}

impl PipelinePaths {
    pub fn standard() -> Self {
        Self {
            data_dir: utils::assets::data_dir(),
            config: utils::assets::config_path(),
            index: utils::assets::index_path(),
            cache_root: utils::assets::cache_dir(),
            cache_metadata: utils::assets::cache_metadata_path(),
            workspaces: utils::assets::workspaces_dir(),
            runs: utils::assets::runs_dir(),
        }
    }

    /// Same filing structure under an explicit data directory.
    pub fn under(data_dir: PathBuf) -> Self {
        Self {
            config: data_dir.join("config.json"),
            index: data_dir.join("index.json"),
            cache_root: data_dir.join("cache"),
            cache_metadata: data_dir.join("cache").join("metadata.json"),
            workspaces: data_dir.join("workspaces"),
            runs: data_dir.join("runs"),
            data_dir,
        }
    }
}

/// External capabilities handed to the pipeline at construction.
pub struct Collaborators {
    pub agent: Arc<dyn CodingAgent>,
    pub tracker: Arc<dyn IssueTracker>,
    pub marketplace: Arc<dyn Marketplace>,
}

/// What one dispatched stage handler did to its task clone.
struct StageOutcome {
    task: Task,
    error: Option<String>,
}

impl StageOutcome {
    fn ok(task: Task) -> Self {
        Self { task, error: None }
    }

    fn failed(task: Task, error: impl Into<String>) -> Self {
        Self {
            task,
            error: Some(error.into()),
        }
    }
}

#[derive(Clone, Copy)]
enum Stage {
    Evaluate,
    Prep,
    Implement,
}

impl Stage {
    fn name(&self) -> &'static str {
        match self {
            Stage::Evaluate => "evaluation",
            Stage::Prep => "prep",
            Stage::Implement => "implementation",
        }
    }
}

pub struct Pipeline {
    options: RunOptions,
    paths: PipelinePaths,
    agent: Arc<dyn CodingAgent>,
    tracker: Arc<dyn IssueTracker>,
    marketplace: Arc<dyn Marketplace>,
    cache: RepoCache,
    workspaces: WorkspaceManager,
    deadlines: DeadlineManager,
    gate: QualityGate,
    decision: DecisionEngine,
    history: OrgHistoryStore,
}

impl Pipeline {
    pub fn new(
        options: RunOptions,
        collaborators: Collaborators,
        paths: PipelinePaths,
    ) -> std::io::Result<Self> {
        std::fs::create_dir_all(&paths.data_dir)?;
        std::fs::create_dir_all(&paths.cache_root)?;
        std::fs::create_dir_all(&paths.workspaces)?;
        std::fs::create_dir_all(&paths.runs)?;

        let cache = RepoCache::new(paths.cache_root.clone(), paths.cache_metadata.clone());
        let workspaces = WorkspaceManager::new(paths.workspaces.clone());
        let decision = DecisionEngine::new(options.risk_tolerance, options.max_tasks_per_stage);
        let gate = build_gate(70, options.strict_quality);

        Ok(Self {
            options,
            paths,
            agent: collaborators.agent,
            tracker: collaborators.tracker,
            marketplace: collaborators.marketplace,
            cache,
            workspaces,
            deadlines: DeadlineManager::default(),
            gate,
            decision,
            history: OrgHistoryStore::new(),
        })
    }

    pub fn with_deadlines(mut self, config: DeadlineConfig) -> Self {
        self.deadlines = DeadlineManager::new(config);
        self
    }

    pub fn with_quality_threshold(mut self, threshold: u8) -> Self {
        self.gate = build_gate(threshold, self.options.strict_quality);
        self
    }

    /// Point the repository cache somewhere other than github.com. Local
    /// paths work, which is how the tests stay offline.
    pub fn with_remote_base(mut self, base: impl Into<String>) -> Self {
        self.cache = RepoCache::new(
            self.paths.cache_root.clone(),
            self.paths.cache_metadata.clone(),
        )
        .with_remote_base(base);
        self
    }

    /// One full pass over the store.
    pub async fn run(&mut self, store: &mut TaskStore) -> RunSummary {
        let mut summary = RunSummary::started_now();
        info!("Pipeline run starting over {} tasks", store.len());

        self.history.seed_from(store);
        self.reset_stale(store);

        self.evaluation_stage(store, &mut summary).await;

        if !self.options.evaluate_only {
            self.admission_stage(store, &mut summary).await;
            if !self.options.skip_implementation {
                self.implementation_stage(store, &mut summary).await;
                self.finalize_stage(store, &mut summary).await;
            }
        }

        summary.archived = store
            .archive_completed(self.options.archive_after_hours, Utc::now())
            .len();
        if let Err(err) = self.cache.cleanup(self.options.archive_after_hours, true).await {
            warn!("Cache cleanup failed: {err}");
        }

        summary.tally_decisions(store);
        summary.finish();
        info!(
            "Pipeline run finished: {} evaluated, {} admitted, {} prepped, {} implemented, {} ready",
            summary.evaluated, summary.admitted, summary.prepped, summary.implemented, summary.ready
        );
        summary
    }

    /// Send stale evaluations back to `Discovered`. Tasks at prep or
    /// beyond keep their progress; staleness only reopens the triage
    /// question, never finished work.
    fn reset_stale(&self, store: &mut TaskStore) {
        let now = Utc::now();
        let window = self.options.reevaluate_after_hours;
        for id in store.ids() {
            let Some(task) = store.get_mut(&id) else {
                continue;
            };
            let eligible = matches!(
                task.status,
                TaskState::Evaluating | TaskState::Evaluated | TaskState::Skipped
            );
            if eligible
                && task.progress.evaluation_is_stale(window, now)
                && task.reset_for_reevaluation()
            {
                debug!("Evaluation for {id} is stale; rediscovered");
            }
        }
    }

    fn passes_filters(&self, task: &Task) -> bool {
        if task.reward.amount_cents < self.options.min_reward_cents {
            return false;
        }
        if task.attempt_count > self.options.max_attempt_count {
            return false;
        }
        if let Some(org) = &self.options.org_filter
            && !task.org.eq_ignore_ascii_case(org)
        {
            return false;
        }
        true
    }

    // ---------- evaluation ----------

    async fn evaluation_stage(&self, store: &mut TaskStore, summary: &mut RunSummary) {
        let batch: Vec<Task> = store
            .iter()
            .filter(|t| t.status == TaskState::Discovered && self.passes_filters(t))
            .take(self.options.max_tasks_per_stage)
            .cloned()
            .collect();
        if batch.is_empty() {
            debug!("No tasks to evaluate");
            return;
        }
        info!("Evaluating {} tasks", batch.len());

        for outcome in self.dispatch(Stage::Evaluate, batch).await {
            match &outcome.error {
                None => summary.evaluated += 1,
                Some(error) => {
                    summary.evaluation_failures += 1;
                    summary.record_failure(&outcome.task.id, "evaluation", error);
                }
            }
            store.insert(outcome.task);
        }
    }

    async fn evaluate_task(&self, mut task: Task) -> StageOutcome {
        task.advance(TaskState::Evaluating);
        task.progress.begin_evaluation();

        let request = prompts::evaluation_request(&task);
        let budget = self
            .deadlines
            .budget_for(OpClass::Analysis, task.progress.complexity);
        let guarded = self
            .deadlines
            .guard(
                OpClass::Analysis,
                budget,
                self.agent.invoke(&self.paths.data_dir, &request),
            )
            .await;

        match guarded.value {
            Some(response) => {
                let outcome = extract_evaluation(&response.text);
                debug!(
                    "Evaluated {} via {}: {} (p={})",
                    task.id, outcome.origin, outcome.verdict, outcome.success_probability
                );
                task.progress.record_evaluation(EvaluationUpdate {
                    decision: decision_from(outcome.verdict),
                    complexity: outcome.complexity,
                    success_probability: outcome.success_probability,
                    risk_level: risk_from(outcome.risk),
                    confidence: outcome.confidence,
                    rationale: outcome.rationale,
                });
                task.advance(TaskState::Evaluated);
                StageOutcome::ok(task)
            }
            None => {
                let error = guarded
                    .error
                    .unwrap_or_else(|| "evaluation produced no result".to_string());
                warn!("Evaluation of {} failed: {error}", task.id);
                task.progress.fail_evaluation(&error);
                StageOutcome::failed(task, error)
            }
        }
    }

    // ---------- admission ----------

    async fn admission_stage(&self, store: &mut TaskStore, summary: &mut RunSummary) {
        let candidates: Vec<String> = store
            .iter()
            .filter(|t| {
                // A failed prep keeps its stage and queues up again here
                let retrying = t.status == TaskState::Prepping
                    && t.progress.prep_status == StepStatus::Failed;
                (t.status == TaskState::Evaluated || retrying)
                    && t.progress.prep_status != StepStatus::Completed
                    && self.passes_filters(t)
            })
            .map(|t| t.id.clone())
            .collect();
        if candidates.is_empty() {
            debug!("No tasks at the admission point");
            return;
        }

        let mut guard_passed: Vec<Task> = Vec::new();
        let mut first = true;
        for id in candidates {
            let Some(task) = store.get(&id) else {
                continue;
            };
            // Availability probes hit the same services the stages do.
            if !first {
                self.politeness_pause().await;
            }
            first = false;
            let (org, repo, issue) = (task.org.clone(), task.repo.clone(), task.issue_number);

            let (tracker, market, mut warnings) =
                self.fetch_signals(&org, &repo, issue, &id).await;
            let verdict = match ConsistencyValidator::check(tracker.as_ref(), market.as_ref()) {
                Ok(verdict) => {
                    warnings.extend(verdict.warnings.clone());
                    verdict
                }
                Err(err) => {
                    warn!("Excluding {id} from admission: {err}");
                    if let Some(task) = store.get_mut(&id) {
                        task.progress.set_availability(false, warnings);
                        task.progress.last_error = Some(err.to_string());
                    }
                    summary.excluded += 1;
                    summary.record_failure(&id, "admission", err.to_string());
                    continue;
                }
            };

            let Some(task) = store.get_mut(&id) else {
                continue;
            };
            task.progress.set_availability(verdict.available, warnings);

            let decision_ok = match task.progress.decision {
                Decision::Go => true,
                Decision::Caution => self.options.relaxed_admission,
                Decision::NoGo | Decision::Pending => false,
            };
            let probability_ok =
                task.progress.success_probability >= self.options.min_success_probability;
            if !decision_ok || !probability_ok {
                debug!(
                    "Skipping {id}: decision={}, p={}",
                    task.progress.decision, task.progress.success_probability
                );
                task.advance(TaskState::Skipped);
                summary.skipped += 1;
                continue;
            }
            if !verdict.available {
                debug!("Deferring {id}: not currently available");
                summary.deferred += 1;
                continue;
            }
            guard_passed.push(task.clone());
        }

        let records: Vec<_> = guard_passed
            .iter()
            .map(|t| self.decision.score(t, &self.history.get(&t.org)))
            .collect();
        let admitted = self.decision.rank(records);
        summary.admitted += admitted.len();
        summary.deferred += guard_passed.len() - admitted.len();
        info!(
            "Admission: {} of {} guard-passing tasks admitted",
            admitted.len(),
            guard_passed.len()
        );

        let mut to_prep = Vec::with_capacity(admitted.len());
        for record in admitted {
            let Some(task) = store.get_mut(&record.task_id) else {
                continue;
            };
            if let Some(line) = record.rationale.last() {
                task.progress.rationale.push(format!("admission: {line}"));
            }
            to_prep.push(task.clone());
        }

        for outcome in self.dispatch(Stage::Prep, to_prep).await {
            match &outcome.error {
                None => summary.prepped += 1,
                Some(error) => {
                    summary.prep_failures += 1;
                    summary.record_failure(&outcome.task.id, "prep", error);
                }
            }
            store.insert(outcome.task);
        }
    }

    /// Probe both availability sources under the validation deadline. A
    /// failed probe degrades to an absent signal with a warning; the
    /// validator decides what absence means.
    async fn fetch_signals(
        &self,
        org: &str,
        repo: &str,
        issue: Option<u64>,
        task_id: &str,
    ) -> (Option<TrackerSignal>, Option<MarketSignal>, Vec<String>) {
        let budget = self.deadlines.budget(OpClass::Validation);
        let mut warnings = Vec::new();

        let tracker = match issue {
            Some(number) => {
                let guarded = self
                    .deadlines
                    .guard(
                        OpClass::Validation,
                        budget,
                        self.tracker.assignment_signal(org, repo, number),
                    )
                    .await;
                if let Some(error) = &guarded.error {
                    warnings.push(format!("tracker probe failed: {error}"));
                }
                guarded.value
            }
            None => {
                warnings.push("task carries no tracker issue".to_string());
                None
            }
        };

        let guarded = self
            .deadlines
            .guard(
                OpClass::Validation,
                budget,
                self.marketplace.claim_signal(task_id),
            )
            .await;
        if let Some(error) = &guarded.error {
            warnings.push(format!("marketplace probe failed: {error}"));
        }

        (tracker, guarded.value, warnings)
    }

    // ---------- prep ----------

    async fn prep_task(&self, mut task: Task) -> StageOutcome {
        task.advance(TaskState::Prepping);
        task.progress.begin_prep();

        let hit = match self
            .cache
            .get_repository(&task.org, &task.repo, self.options.cache_max_age_hours, true)
            .await
        {
            Ok(hit) => hit,
            Err(err) => {
                let error = format!("repository cache: {err}");
                task.progress.fail_prep(&error);
                return StageOutcome::failed(task, error);
            }
        };

        let workspace = match self.workspaces.create_workspace(&hit.path, &task.id) {
            Ok(workspace) => workspace,
            Err(err) => {
                let error = format!("workspace: {err}");
                task.progress.fail_prep(&error);
                let _ = self.cache.release(&task.org, &task.repo).await;
                return StageOutcome::failed(task, error);
            }
        };

        let request = prompts::prep_request(&task);
        let budget = self
            .deadlines
            .budget_for(OpClass::Setup, task.progress.complexity);
        let guarded = self
            .deadlines
            .guard(
                OpClass::Setup,
                budget,
                self.agent.invoke(&workspace.path, &request),
            )
            .await;

        let Some(response) = guarded.value else {
            let error = guarded
                .error
                .unwrap_or_else(|| "prep produced no result".to_string());
            task.progress.fail_prep(&error);
            let _ = self.cache.release(&task.org, &task.repo).await;
            return StageOutcome::failed(task, error);
        };

        if let Err(issue) = validate_prep_document(&response.text) {
            let error = issue.to_string();
            warn!("Prep document for {} rejected: {error}", task.id);
            task.progress.fail_prep(&error);
            let _ = self.cache.release(&task.org, &task.repo).await;
            return StageOutcome::failed(task, error);
        }

        let (planned, origin) = extract_plan(&response.text);
        let subtasks: Vec<DiscreteSubtask> = planned.into_iter().map(subtask_from).collect();
        let order = match resolve_order(&subtasks, UnknownDeps::Ignore) {
            Ok(order) => order,
            Err(err) => {
                let error = format!("plan ordering: {err}");
                task.progress.fail_prep(&error);
                let _ = self.cache.release(&task.org, &task.repo).await;
                return StageOutcome::failed(task, error);
            }
        };
        task.progress.plan = order
            .iter()
            .filter_map(|id| subtasks.iter().find(|s| &s.id == id).cloned())
            .collect();
        debug!(
            "Prep for {} produced a {}-step plan via {origin}",
            task.id,
            task.progress.plan.len()
        );

        task.progress.complete_prep(true);
        task.advance(TaskState::Prepped);
        // Each stage pins the mirror only for its own duration
        let _ = self.cache.release(&task.org, &task.repo).await;
        StageOutcome::ok(task)
    }

    // ---------- implementation ----------

    async fn implementation_stage(&self, store: &mut TaskStore, summary: &mut RunSummary) {
        let batch: Vec<Task> = store
            .iter()
            .filter(|t| {
                let retrying = t.status == TaskState::Implementing
                    && t.progress.implementation_status == StepStatus::Failed;
                (t.status == TaskState::Prepped || retrying)
                    && t.progress.environment_validated
                    && matches!(
                        t.progress.implementation_status,
                        StepStatus::NotStarted | StepStatus::Failed
                    )
                    && self.passes_filters(t)
            })
            .take(self.options.max_tasks_per_stage)
            .cloned()
            .collect();
        if batch.is_empty() {
            debug!("No tasks ready for implementation");
            return;
        }
        info!("Implementing {} tasks", batch.len());

        for outcome in self.dispatch(Stage::Implement, batch).await {
            match &outcome.error {
                None => summary.implemented += 1,
                Some(error) => {
                    summary.implementation_failures += 1;
                    summary.record_failure(&outcome.task.id, "implementation", error);
                }
            }
            store.insert(outcome.task);
        }
    }

    async fn implement_task(&self, mut task: Task) -> StageOutcome {
        task.advance(TaskState::Implementing);
        task.progress.begin_implementation();

        let hit = match self
            .cache
            .get_repository(&task.org, &task.repo, self.options.cache_max_age_hours, true)
            .await
        {
            Ok(hit) => hit,
            Err(err) => {
                let error = format!("repository cache: {err}");
                task.progress.fail_implementation(&error);
                return StageOutcome::failed(task, error);
            }
        };
        let workspace = match self.workspaces.create_workspace(&hit.path, &task.id) {
            Ok(workspace) => workspace,
            Err(err) => {
                let error = format!("workspace: {err}");
                task.progress.fail_implementation(&error);
                let _ = self.cache.release(&task.org, &task.repo).await;
                return StageOutcome::failed(task, error);
            }
        };

        let request = prompts::implementation_request(&task, &task.progress.plan);
        let budget = self
            .deadlines
            .budget_for(OpClass::Implementation, task.progress.complexity);
        let guarded = self
            .deadlines
            .guard(
                OpClass::Implementation,
                budget,
                self.agent.invoke(&workspace.path, &request),
            )
            .await;

        match guarded.value {
            Some(response) => {
                let outcome = extract_implementation(&response.text);
                debug!(
                    "Implementation of {} reported via {}: tests={}, requirements={}, quality={}",
                    task.id,
                    outcome.origin,
                    outcome.tests_passing,
                    outcome.requirements_met,
                    outcome.quality_validated
                );
                task.progress.complete_implementation(
                    ImplementationFlags {
                        tests_passing: outcome.tests_passing,
                        requirements_met: outcome.requirements_met,
                        quality_validated: outcome.quality_validated,
                    },
                    outcome.summary,
                );
                task.advance(TaskState::Implemented);
                StageOutcome::ok(task)
            }
            None => {
                let error = guarded
                    .error
                    .unwrap_or_else(|| "implementation produced no result".to_string());
                warn!("Implementation of {} failed: {error}", task.id);
                task.progress.fail_implementation(&error);
                let _ = self.cache.release(&task.org, &task.repo).await;
                StageOutcome::failed(task, error)
            }
        }
    }

    // ---------- finalization ----------

    async fn finalize_stage(&mut self, store: &mut TaskStore, summary: &mut RunSummary) {
        let ids: Vec<String> = store
            .iter()
            .filter(|t| t.status == TaskState::Implemented)
            .map(|t| t.id.clone())
            .collect();

        for id in ids {
            let (org, repo, success) = {
                let Some(task) = store.get_mut(&id) else {
                    continue;
                };
                let success = if self.options.quality_gates_enabled {
                    task.advance(TaskState::QualityGating);
                    let record = self.gate.evaluate(task);
                    let passed = record.passed;
                    task.progress.set_quality_gate(record);
                    passed && task.progress.ready_for_submission
                } else {
                    task.progress.ready_for_submission
                };
                if success {
                    task.advance(TaskState::Ready);
                    summary.ready += 1;
                    info!("Task {id} is ready for submission");
                } else {
                    task.advance(TaskState::Rejected);
                    summary.rejected += 1;
                    info!("Task {id} rejected at finalization");
                }
                (task.org.clone(), task.repo.clone(), success)
            };
            self.history.record_outcome(&org, success);
            if let Err(err) = self.cache.release(&org, &repo).await {
                warn!("Releasing mirror {org}/{repo} failed: {err}");
            }
        }
    }

    // ---------- dispatch ----------

    async fn handle(&self, stage: Stage, task: Task) -> StageOutcome {
        match stage {
            Stage::Evaluate => self.evaluate_task(task).await,
            Stage::Prep => self.prep_task(task).await,
            Stage::Implement => self.implement_task(task).await,
        }
    }

    /// Run one stage over a batch of task clones. A single worker processes
    /// sequentially with a politeness pause between tasks; more workers
    /// process `batch_size` chunks concurrently with the pause between
    /// chunks, so the external services never see an unbounded burst.
    async fn dispatch(&self, stage: Stage, tasks: Vec<Task>) -> Vec<StageOutcome> {
        let mut outcomes = Vec::with_capacity(tasks.len());

        if self.options.worker_count <= 1 {
            let mut first = true;
            for task in tasks {
                if !first {
                    self.politeness_pause().await;
                }
                first = false;
                outcomes.push(self.handle(stage, task).await);
            }
            return outcomes;
        }

        let chunk_size = self.options.batch_size.max(1);
        let mut remaining = tasks;
        let mut first = true;
        while !remaining.is_empty() {
            if !first {
                self.politeness_pause().await;
            }
            first = false;
            let take = chunk_size.min(remaining.len());
            let chunk: Vec<Task> = remaining.drain(..take).collect();
            debug!("Dispatching {} {} tasks concurrently", chunk.len(), stage.name());
            let mut batch: Vec<StageOutcome> = stream::iter(chunk)
                .map(|task| self.handle(stage, task))
                .buffer_unordered(self.options.worker_count)
                .collect()
                .await;
            outcomes.append(&mut batch);
        }
        outcomes
    }

    async fn politeness_pause(&self) {
        if self.options.politeness_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.options.politeness_delay_ms)).await;
        }
    }
}

fn build_gate(threshold: u8, strict: bool) -> QualityGate {
    let gate = QualityGate::standard().with_threshold(threshold);
    if strict { gate.strict() } else { gate }
}

fn decision_from(verdict: Verdict) -> Decision {
    match verdict {
        Verdict::Go => Decision::Go,
        Verdict::NoGo => Decision::NoGo,
        Verdict::Caution => Decision::Caution,
        Verdict::Pending => Decision::Pending,
    }
}

fn risk_from(band: RiskBand) -> RiskLevel {
    match band {
        RiskBand::Low => RiskLevel::Low,
        RiskBand::Medium => RiskLevel::Medium,
        RiskBand::High => RiskLevel::High,
        RiskBand::Unknown => RiskLevel::Unknown,
    }
}

fn subtask_from(planned: PlannedSubtask) -> DiscreteSubtask {
    DiscreteSubtask {
        id: planned.id,
        description: planned.description,
        priority: planned.priority,
        depends_on: planned.depends_on,
        estimated_minutes: planned.estimated_minutes,
    }
}
