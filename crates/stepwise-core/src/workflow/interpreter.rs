//! Workflow interpreter: sequential step walking with full run telemetry.
//!
//! `WorkflowInterpreter::execute` validates a workflow, snapshots it into an
//! [`ExecutionPlan`], and walks it from the entry step. Each step's config is
//! resolved against the current data context, handed to the registered
//! executor, and recorded as a `StepRecord`. The step's output becomes the new
//! context. Condition steps pick exactly one successor; `parallel` and `loop`
//! steps run nested sequential sub-walks.
//!
//! # Execution flow
//!
//! 1. Validate. An invalid workflow is rejected before any run exists.
//! 2. Create the `Run` record and register a cancellation token.
//! 3. For each step: check cancellation and the step budget, resolve the
//!    config, execute under the step timeout (raced against cancellation),
//!    close the step record.
//! 4. Stop at a terminal step (completed) or the first failure (failed).
//!
//! Failures never escape as errors: the returned `Run` carries them.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use futures_util::future::join_all;
use serde_json::{json, Map, Value};
use stepwise_types::config::EngineConfig;
use stepwise_types::event::RunEvent;
use stepwise_types::run::{BranchRecord, Run, StepFailure, StepRecord};
use stepwise_types::workflow::{StepDefinition, StepType, TriggerType, Workflow};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::event::bus::EventBus;

use super::capability::{HttpClient, StepLogger};
use super::definition::{validate_workflow, ValidationReport};
use super::graph::{child_entries, ExecutionPlan, Successor};
use super::step_runner::{json_type, StepError, StepOutput, StepRegistry};
use super::template;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default per-step timeout.
pub const DEFAULT_STEP_TIMEOUT_MS: u64 = 30_000;

/// Default bound on executed steps per run, nested steps included.
pub const DEFAULT_MAX_STEPS: usize = 1_000;

// ---------------------------------------------------------------------------
// Options and inputs
// ---------------------------------------------------------------------------

/// Recognized interpreter options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterpreterOptions {
    /// Timeout for each leaf step, unless the step sets `timeoutMs`.
    pub step_timeout: Duration,
    /// Guard against runaway paths.
    pub max_steps: usize,
}

impl Default for InterpreterOptions {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_millis(DEFAULT_STEP_TIMEOUT_MS),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

impl From<&EngineConfig> for InterpreterOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            step_timeout: Duration::from_millis(config.step_timeout_ms),
            max_steps: config.max_steps,
        }
    }
}

/// What started the run and the data it carried.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerInput {
    pub trigger_type: TriggerType,
    /// Initial data context.
    pub data: Value,
}

impl TriggerInput {
    pub fn new(trigger_type: TriggerType, data: Value) -> Self {
        Self { trigger_type, data }
    }

    pub fn manual(data: Value) -> Self {
        Self::new(TriggerType::Manual, data)
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors surfaced by the interpreter's public operations.
///
/// Step failures are not here: they are recorded on the returned `Run`.
#[derive(Debug, thiserror::Error)]
pub enum InterpreterError {
    /// The workflow failed validation; no run was created.
    #[error("{0}")]
    Invalid(ValidationReport),

    /// `cancel` was called for a run that is not in flight.
    #[error("no active run with ID '{0}'")]
    RunNotFound(String),
}

// ---------------------------------------------------------------------------
// Run-scoped state
// ---------------------------------------------------------------------------

/// Unregisters a run's cancellation token when dropped, so a caller that
/// abandons the execution future does not leave it behind.
struct ActiveRun<'a> {
    runs: &'a DashMap<String, CancellationToken>,
    run_id: String,
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        self.runs.remove(&self.run_id);
    }
}

/// State shared by every walk of one run, including nested ones.
struct Frame {
    run_id: String,
    token: CancellationToken,
    executed: AtomicUsize,
}

/// Result of one sequential walk.
struct Walk {
    records: Vec<StepRecord>,
    result: Result<Value, StepFailure>,
}

type WalkFuture<'a> = Pin<Box<dyn Future<Output = Walk> + Send + 'a>>;

// ---------------------------------------------------------------------------
// WorkflowInterpreter
// ---------------------------------------------------------------------------

/// Executes workflows and produces `Run` records.
///
/// Holds no per-run mutable state besides the cancellation token map, so one
/// instance can serve many concurrent runs.
pub struct WorkflowInterpreter {
    registry: StepRegistry,
    options: InterpreterOptions,
    event_bus: Option<EventBus>,
    /// Cancellation tokens keyed by run_id.
    active_runs: DashMap<String, CancellationToken>,
}

impl WorkflowInterpreter {
    /// Create an interpreter with default options and no event bus.
    pub fn new(registry: StepRegistry) -> Self {
        Self {
            registry,
            options: InterpreterOptions::default(),
            event_bus: None,
            active_runs: DashMap::new(),
        }
    }

    /// Wire the built-in executors to the given capabilities and apply
    /// `config` (timeouts, step budget, event channel capacity).
    pub fn from_config(
        config: &EngineConfig,
        http: Arc<dyn HttpClient>,
        logger: Arc<dyn StepLogger>,
    ) -> Self {
        Self::new(StepRegistry::new(http, logger))
            .with_options(InterpreterOptions::from(config))
            .with_event_bus(EventBus::new(config.event_capacity))
    }

    pub fn with_options(mut self, options: InterpreterOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn options(&self) -> &InterpreterOptions {
        &self.options
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    pub fn event_bus(&self) -> Option<&EventBus> {
        self.event_bus.as_ref()
    }

    /// IDs of runs currently in flight.
    pub fn active_runs(&self) -> Vec<String> {
        self.active_runs.iter().map(|e| e.key().clone()).collect()
    }

    /// Structural validation without execution.
    pub fn validate(&self, workflow: &Workflow) -> ValidationReport {
        validate_workflow(workflow)
    }

    /// Execute `workflow` with a fresh cancellation token.
    ///
    /// Use [`cancel`](Self::cancel) with the run ID from the `RunStarted`
    /// event (or [`active_runs`](Self::active_runs)) to stop it.
    pub async fn execute(
        &self,
        workflow: &Workflow,
        trigger: TriggerInput,
    ) -> Result<Run, InterpreterError> {
        self.execute_with_token(workflow, trigger, CancellationToken::new())
            .await
    }

    /// Execute `workflow`, stopping cooperatively once `token` is cancelled.
    pub async fn execute_with_token(
        &self,
        workflow: &Workflow,
        trigger: TriggerInput,
        token: CancellationToken,
    ) -> Result<Run, InterpreterError> {
        let report = validate_workflow(workflow);
        if !report.valid {
            tracing::warn!(
                workflow = workflow.id.as_str(),
                errors = report.errors.len(),
                "rejecting invalid workflow"
            );
            return Err(InterpreterError::Invalid(report));
        }

        let plan = ExecutionPlan::new(workflow);
        let run_id = Uuid::now_v7().to_string();
        let mut run = Run::start(
            run_id.clone(),
            plan.workflow_id(),
            plan.workflow_name(),
            trigger.trigger_type,
            trigger.data.clone(),
            Utc::now(),
        );

        self.active_runs.insert(run_id.clone(), token.clone());
        let registration = ActiveRun {
            runs: &self.active_runs,
            run_id: run_id.clone(),
        };
        self.publish(RunEvent::RunStarted {
            run_id: run_id.clone(),
            workflow_id: run.workflow_id.clone(),
            workflow_name: run.workflow_name.clone(),
            trigger_type: run.trigger_type,
        });

        tracing::info!(
            run_id = %run_id,
            workflow = plan.workflow_name(),
            trigger = %trigger.trigger_type,
            "starting workflow run"
        );

        let frame = Frame {
            run_id: run_id.clone(),
            token,
            executed: AtomicUsize::new(0),
        };
        let walk = match plan.entry() {
            Some(entry) => {
                self.walk(&plan, &frame, entry.to_string(), trigger.data, true)
                    .await
            }
            None => Walk {
                records: Vec::new(),
                result: Ok(trigger.data),
            },
        };

        drop(registration);

        run.steps = walk.records;
        match walk.result {
            Ok(context) => run.complete(context, Utc::now()),
            Err(failure) => run.fail(failure, Utc::now()),
        }

        let duration_ms = run.duration_ms.unwrap_or_default();
        match &run.error_message {
            None => tracing::info!(
                run_id = %run_id,
                steps = run.steps.len(),
                duration_ms,
                "workflow run completed"
            ),
            Some(error) => tracing::warn!(
                run_id = %run_id,
                steps = run.steps.len(),
                duration_ms,
                error = error.as_str(),
                "workflow run failed"
            ),
        }

        self.publish(RunEvent::RunFinished {
            run_id,
            status: run.status,
            duration_ms,
            error_message: run.error_message.clone(),
            failure_kind: run.failure_kind,
        });

        Ok(run)
    }

    /// Cancel an in-flight run started by this interpreter.
    pub fn cancel(&self, run_id: &str) -> Result<(), InterpreterError> {
        let token = self
            .active_runs
            .get(run_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| InterpreterError::RunNotFound(run_id.to_string()))?;
        tracing::info!(run_id, "cancelling workflow run");
        token.cancel();
        Ok(())
    }

    fn publish(&self, event: RunEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }

    /// Walk from `start` until a terminal step or the first failure.
    ///
    /// Only top-level walks publish step events; nested records surface
    /// through their parent's `branches`.
    fn walk<'a>(
        &'a self,
        plan: &'a ExecutionPlan,
        frame: &'a Frame,
        start: String,
        mut context: Value,
        top_level: bool,
    ) -> WalkFuture<'a> {
        Box::pin(async move {
            let mut records = Vec::new();
            let mut current = Some(start);

            while let Some(step_id) = current.take() {
                let Some(step) = plan.step(&step_id).cloned() else {
                    let err = StepError::UnknownStep(step_id);
                    return Walk {
                        records,
                        result: Err(failure_of(&err)),
                    };
                };

                let mut record = StepRecord::start(
                    step.id.clone(),
                    step.name.clone(),
                    step.step_type,
                    context.clone(),
                    Utc::now(),
                );

                let result = match self.admit(frame) {
                    Err(err) => Err(err),
                    Ok(()) => {
                        if top_level {
                            self.publish(RunEvent::StepStarted {
                                run_id: frame.run_id.clone(),
                                step_id: step.id.clone(),
                                step_name: step.name.clone(),
                                step_type: step.step_type,
                            });
                        }
                        tracing::debug!(
                            run_id = frame.run_id.as_str(),
                            step_id = step.id.as_str(),
                            step_type = %step.step_type,
                            "executing step"
                        );
                        match step.step_type {
                            StepType::Parallel => {
                                self.run_parallel(plan, frame, &step, &context, &mut record)
                                    .await
                            }
                            StepType::Loop => {
                                self.run_loop(plan, frame, &step, &context, &mut record)
                                    .await
                            }
                            _ => self.run_leaf(frame, &step, &context).await,
                        }
                    }
                };

                match result {
                    Ok(output) => {
                        let branch = output.branch();
                        context = output.into_value();
                        record.branch = branch;
                        record.complete(context.clone(), Utc::now());
                        self.record(frame, &mut records, record, top_level);

                        current = match plan.successor(&step_id) {
                            Successor::End => None,
                            Successor::Next(next) => Some(next.clone()),
                            Successor::Branch { on_true, on_false } => {
                                if branch == Some(true) {
                                    on_true.clone()
                                } else {
                                    on_false.clone()
                                }
                            }
                        };
                    }
                    Err(err) => {
                        let failure = failure_of(&err);
                        tracing::warn!(
                            run_id = frame.run_id.as_str(),
                            step_id = step.id.as_str(),
                            kind = %failure.kind,
                            error = failure.message.as_str(),
                            "step failed"
                        );
                        record.fail(failure.clone(), Utc::now());
                        self.record(frame, &mut records, record, top_level);
                        return Walk {
                            records,
                            result: Err(failure),
                        };
                    }
                }
            }

            Walk {
                records,
                result: Ok(context),
            }
        })
    }

    /// Checks made before any step runs: cancellation, then the step budget.
    fn admit(&self, frame: &Frame) -> Result<(), StepError> {
        if frame.token.is_cancelled() {
            return Err(StepError::Cancelled);
        }
        let executed = frame.executed.fetch_add(1, Ordering::SeqCst) + 1;
        if executed > self.options.max_steps {
            return Err(StepError::StepLimit {
                max: self.options.max_steps,
            });
        }
        Ok(())
    }

    fn record(
        &self,
        frame: &Frame,
        records: &mut Vec<StepRecord>,
        record: StepRecord,
        top_level: bool,
    ) {
        if top_level {
            self.publish(RunEvent::StepRecorded {
                run_id: frame.run_id.clone(),
                record: record.clone(),
            });
        }
        records.push(record);
    }

    /// Resolve the config and run the registered executor under the step
    /// timeout, racing cancellation.
    async fn run_leaf(
        &self,
        frame: &Frame,
        step: &StepDefinition,
        context: &Value,
    ) -> Result<StepOutput, StepError> {
        let executor = self
            .registry
            .get(step.step_type)
            .ok_or(StepError::NoExecutor(step.step_type))?;

        let config = template::resolve(&step.config, context);
        let timeout_ms = step
            .timeout_ms
            .unwrap_or(self.options.step_timeout.as_millis() as u64);

        tokio::select! {
            biased;
            _ = frame.token.cancelled() => Err(StepError::Cancelled),
            result = tokio::time::timeout(
                Duration::from_millis(timeout_ms),
                executor.execute(&step.id, &config, context),
            ) => match result {
                Ok(output) => output,
                Err(_elapsed) => Err(StepError::Timeout {
                    step_id: step.id.clone(),
                    timeout_ms,
                }),
            },
        }
    }

    /// Run each branch as its own sequential walk, concurrently, and join.
    ///
    /// Output: `{ "<branch start id>": <branch final context>, ... }`.
    async fn run_parallel(
        &self,
        plan: &ExecutionPlan,
        frame: &Frame,
        step: &StepDefinition,
        context: &Value,
        record: &mut StepRecord,
    ) -> Result<StepOutput, StepError> {
        let branches: Vec<String> = child_entries(step).into_iter().map(String::from).collect();
        let walks = join_all(
            branches
                .iter()
                .map(|start| self.walk(plan, frame, start.clone(), context.clone(), false)),
        )
        .await;

        let mut output = Map::new();
        let mut first_failure = None;
        for (label, walk) in branches.into_iter().zip(walks) {
            record.branches.push(BranchRecord {
                label: label.clone(),
                steps: walk.records,
            });
            match walk.result {
                Ok(value) => {
                    output.insert(label, value);
                }
                Err(failure) => {
                    if first_failure.is_none() {
                        first_failure = Some(StepError::Nested {
                            label: format!("branch '{label}'"),
                            kind: failure.kind,
                            message: failure.message,
                        });
                    }
                }
            }
        }

        match first_failure {
            Some(err) => Err(err),
            None => Ok(StepOutput::Value(Value::Object(output))),
        }
    }

    /// Run the body walk once per item of the resolved `items` array.
    ///
    /// Each iteration sees the context extended with `item` and `index` (a
    /// non-object context is wrapped as `input`). Output: `{ "results": [...] }`.
    async fn run_loop(
        &self,
        plan: &ExecutionPlan,
        frame: &Frame,
        step: &StepDefinition,
        context: &Value,
        record: &mut StepRecord,
    ) -> Result<StepOutput, StepError> {
        let config = template::resolve(&step.config, context);
        let items = match config.get("items") {
            Some(Value::Array(items)) => items.clone(),
            Some(other) => {
                return Err(StepError::InvalidConfig(format!(
                    "'items' must be an array, got {}",
                    json_type(other)
                )));
            }
            None => return Err(StepError::InvalidConfig("missing 'items'".to_string())),
        };
        let body = child_entries(step)
            .first()
            .map(|b| b.to_string())
            .ok_or_else(|| StepError::InvalidConfig("missing 'body'".to_string()))?;

        let limit = config
            .get("maxIterations")
            .and_then(Value::as_u64)
            .map(|m| m as usize)
            .unwrap_or(items.len());
        if items.len() > limit {
            tracing::warn!(
                run_id = frame.run_id.as_str(),
                step_id = step.id.as_str(),
                items = items.len(),
                limit,
                "loop capped by maxIterations"
            );
        }

        let mut results = Vec::with_capacity(items.len().min(limit));
        for (index, item) in items.into_iter().take(limit).enumerate() {
            let iteration = iteration_context(context, item, index);
            let walk = self
                .walk(plan, frame, body.clone(), iteration, false)
                .await;
            let label = format!("{body}[{index}]");
            record.branches.push(BranchRecord {
                label: label.clone(),
                steps: walk.records,
            });
            match walk.result {
                Ok(value) => results.push(value),
                Err(failure) => {
                    return Err(StepError::Nested {
                        label: format!("iteration '{label}'"),
                        kind: failure.kind,
                        message: failure.message,
                    });
                }
            }
        }

        Ok(StepOutput::Value(json!({ "results": results })))
    }
}

impl std::fmt::Debug for WorkflowInterpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowInterpreter")
            .field("options", &self.options)
            .field("registry", &self.registry)
            .field("active_runs", &self.active_runs.len())
            .finish()
    }
}

fn failure_of(err: &StepError) -> StepFailure {
    StepFailure {
        kind: err.kind(),
        message: err.to_string(),
    }
}

fn iteration_context(context: &Value, item: Value, index: usize) -> Value {
    match context {
        Value::Object(map) => {
            let mut map = map.clone();
            map.insert("item".to_string(), item);
            map.insert("index".to_string(), Value::from(index));
            Value::Object(map)
        }
        other => json!({ "input": other, "item": item, "index": index }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
