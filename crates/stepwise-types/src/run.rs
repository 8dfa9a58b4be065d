//! Execution tracking types: runs and per-step audit records.
//!
//! A `Run` is created when a trigger hands data to the interpreter and is
//! appended to as each step executes. Once its status leaves `running` it is
//! never touched again, so it doubles as the persistence and UI record for
//! both the success and the failure path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::workflow::{StepType, TriggerType};

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

/// Overall status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Status of an individual step execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Category of a step failure.
///
/// `Cancelled` is kept apart from the other kinds so callers can tell
/// "operator cancelled" from "step failed".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The executor reported a failure (network error, bad config, non-2xx, ...).
    Execution,
    /// The executor exceeded its time budget.
    Timeout,
    /// The run was cancelled while this step was pending or in flight.
    Cancelled,
    /// The run exhausted its `max_steps` budget.
    Limit,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureKind::Execution => "execution",
            FailureKind::Timeout => "timeout",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Limit => "limit",
        };
        f.write_str(s)
    }
}

/// Failure detail recorded on a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    pub kind: FailureKind,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Step Record
// ---------------------------------------------------------------------------

/// Audit trail for one step execution within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    /// Mirrors the step definition ID.
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Data context before the step ran.
    pub input: Value,
    /// Data context the step produced. Mutually exclusive with `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StepFailure>,
    /// Branch selected by a condition step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<bool>,
    /// Nested sub-interpretations of `parallel` and `loop` steps.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<BranchRecord>,
}

impl StepRecord {
    /// Open a record in the `running` state.
    pub fn start(
        id: impl Into<String>,
        name: impl Into<String>,
        step_type: StepType,
        input: Value,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            step_type,
            status: StepStatus::Running,
            started_at,
            completed_at: None,
            duration_ms: None,
            input,
            output: None,
            error: None,
            branch: None,
            branches: Vec::new(),
        }
    }

    /// Close the record as completed with the produced context.
    pub fn complete(&mut self, output: Value, completed_at: DateTime<Utc>) {
        self.status = StepStatus::Completed;
        self.output = Some(output);
        self.error = None;
        self.close(completed_at);
    }

    /// Close the record as failed.
    pub fn fail(&mut self, failure: StepFailure, completed_at: DateTime<Utc>) {
        self.status = StepStatus::Failed;
        self.output = None;
        self.error = Some(failure);
        self.close(completed_at);
    }

    fn close(&mut self, completed_at: DateTime<Utc>) {
        self.completed_at = Some(completed_at);
        self.duration_ms = Some(millis_between(self.started_at, completed_at));
    }
}

/// One nested sequential sub-interpretation (a parallel branch or a loop iteration).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchRecord {
    /// Branch start step ID, or `"<body>[<index>]"` for loop iterations.
    pub label: String,
    pub steps: Vec<StepRecord>,
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// One execution instance of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    /// UUIDv7 run ID.
    pub id: String,
    pub workflow_id: String,
    /// Denormalized for display.
    pub workflow_name: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub trigger_type: TriggerType,
    /// Initial data context.
    pub trigger_data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    /// Final data context, set when the run completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Step records in execution order.
    #[serde(default)]
    pub steps: Vec<StepRecord>,
}

impl Run {
    /// Create a run in the `running` state.
    pub fn start(
        id: impl Into<String>,
        workflow_id: impl Into<String>,
        workflow_name: impl Into<String>,
        trigger_type: TriggerType,
        trigger_data: Value,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            workflow_id: workflow_id.into(),
            workflow_name: workflow_name.into(),
            status: RunStatus::Running,
            started_at,
            completed_at: None,
            duration_ms: None,
            trigger_type,
            trigger_data,
            error_message: None,
            failure_kind: None,
            output: None,
            steps: Vec::new(),
        }
    }

    /// Mark the run completed with its final context.
    pub fn complete(&mut self, output: Value, completed_at: DateTime<Utc>) {
        self.status = RunStatus::Completed;
        self.output = Some(output);
        self.close(completed_at);
    }

    /// Mark the run failed.
    pub fn fail(&mut self, failure: StepFailure, completed_at: DateTime<Utc>) {
        self.status = RunStatus::Failed;
        self.error_message = Some(failure.message);
        self.failure_kind = Some(failure.kind);
        self.close(completed_at);
    }

    fn close(&mut self, completed_at: DateTime<Utc>) {
        self.completed_at = Some(completed_at);
        self.duration_ms = Some(millis_between(self.started_at, completed_at));
    }

    /// The step record that failed the run, if any.
    pub fn failed_step(&self) -> Option<&StepRecord> {
        self.steps
            .iter()
            .rev()
            .find(|s| s.status == StepStatus::Failed)
    }

    /// IDs of the top-level steps executed, in order.
    pub fn step_path(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.id.as_str()).collect()
    }
}

fn millis_between(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    (end - start).num_milliseconds().max(0) as u64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
