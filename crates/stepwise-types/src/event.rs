//! Live-progress events for workflow runs.
//!
//! `RunEvent` is broadcast by the interpreter while a run executes. All
//! variants are Clone + Send + Sync for use with tokio broadcast channels.

use serde::{Deserialize, Serialize};

use crate::run::{FailureKind, RunStatus, StepRecord};
use crate::workflow::{StepType, TriggerType};

/// Events emitted during workflow execution.
///
/// Subscribers (CLI progress output, persistence, UI bridges) see step
/// records in the same order they are appended to the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// A run was created and is about to execute its entry step.
    RunStarted {
        run_id: String,
        workflow_id: String,
        workflow_name: String,
        trigger_type: TriggerType,
    },

    /// A step began executing.
    StepStarted {
        run_id: String,
        step_id: String,
        step_name: String,
        step_type: StepType,
    },

    /// A step record was closed and appended.
    StepRecorded { run_id: String, record: StepRecord },

    /// The run reached a terminal status.
    RunFinished {
        run_id: String,
        status: RunStatus,
        duration_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        failure_kind: Option<FailureKind>,
    },
}

impl RunEvent {
    /// The run this event belongs to.
    pub fn run_id(&self) -> &str {
        match self {
            RunEvent::RunStarted { run_id, .. }
            | RunEvent::StepStarted { run_id, .. }
            | RunEvent::StepRecorded { run_id, .. }
            | RunEvent::RunFinished { run_id, .. } => run_id,
        }
    }
}
