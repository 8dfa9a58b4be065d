//! Workflow definition types for Stepwise.
//!
//! Defines the canonical definition shape for workflows: a named automation
//! holding an ordered list of typed steps, the edges between them (either
//! per-step `next` pointers or a separate `connections` list), and an optional
//! trigger that designates the entry step. Presentation fields such as canvas
//! `position` are carried along but never read by the interpreter.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::WorkflowEditError;

// ---------------------------------------------------------------------------
// Workflow Definition
// ---------------------------------------------------------------------------

/// The canonical workflow definition.
///
/// Builders, the persistence layer, and the interpreter all share this shape.
/// The interpreter only ever reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    /// Unique workflow ID (e.g. "wf_lead_intake").
    pub id: String,
    /// Human-readable workflow name.
    pub name: String,
    /// Industry / category tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Optional longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Version string (e.g. "1.0.0").
    #[serde(default = "default_version")]
    pub version: String,
    /// Lifecycle status of the definition.
    #[serde(default)]
    pub status: WorkflowStatus,
    /// Designated trigger. When it names a `next` step, that step is the entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<TriggerDefinition>,
    /// Ordered list of steps. Without a trigger `next`, the first one is the entry.
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
    /// Directed edges, an alternative to per-step `next` pointers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connections: Vec<Connection>,
    /// Extensible metadata.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

/// Lifecycle status of a workflow definition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    #[default]
    Draft,
    Active,
    Inactive,
    Error,
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkflowStatus::Draft => "draft",
            WorkflowStatus::Active => "active",
            WorkflowStatus::Inactive => "inactive",
            WorkflowStatus::Error => "error",
        };
        f.write_str(s)
    }
}

impl Workflow {
    /// Create an empty draft workflow.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: None,
            description: None,
            version: default_version(),
            status: WorkflowStatus::Draft,
            trigger: None,
            steps: Vec::new(),
            connections: Vec::new(),
            metadata: Map::new(),
        }
    }

    /// The ID of the step execution starts at, if one is defined.
    ///
    /// A trigger with a `next` pointer wins; otherwise the first step.
    pub fn entry_step_id(&self) -> Option<&str> {
        match self.trigger.as_ref().and_then(|t| t.next.as_deref()) {
            Some(next) => Some(next),
            None => self.steps.first().map(|s| s.id.as_str()),
        }
    }

    /// Look up a step by ID.
    pub fn step(&self, id: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.id == id)
    }

    fn step_mut(&mut self, id: &str) -> Option<&mut StepDefinition> {
        self.steps.iter_mut().find(|s| s.id == id)
    }

    /// Append a step. Fails if the ID is already taken.
    pub fn add_step(&mut self, step: StepDefinition) -> Result<(), WorkflowEditError> {
        if self.step(&step.id).is_some() {
            return Err(WorkflowEditError::DuplicateStep(step.id));
        }
        self.steps.push(step);
        Ok(())
    }

    /// Remove a step and every edge that points at or leaves it.
    pub fn remove_step(&mut self, id: &str) -> Result<StepDefinition, WorkflowEditError> {
        let idx = self
            .steps
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| WorkflowEditError::UnknownStep(id.to_string()))?;
        let removed = self.steps.remove(idx);

        for step in &mut self.steps {
            step.next = match step.next.take() {
                Some(StepNext::Step(next)) if next == id => None,
                Some(StepNext::Branch { on_true, on_false }) => Some(StepNext::Branch {
                    on_true: on_true.filter(|n| n != id),
                    on_false: on_false.filter(|n| n != id),
                }),
                other => other,
            };
        }
        self.connections.retain(|c| c.from != id && c.to != id);
        if let Some(trigger) = &mut self.trigger {
            if trigger.next.as_deref() == Some(id) {
                trigger.next = None;
            }
        }

        Ok(removed)
    }

    /// Point `from`'s single successor at `to`.
    pub fn connect(&mut self, from: &str, to: &str) -> Result<(), WorkflowEditError> {
        if self.step(to).is_none() {
            return Err(WorkflowEditError::UnknownStep(to.to_string()));
        }
        let step = self
            .step_mut(from)
            .ok_or_else(|| WorkflowEditError::UnknownStep(from.to_string()))?;
        if step.step_type == StepType::Condition {
            return Err(WorkflowEditError::BranchRequired(from.to_string()));
        }
        step.next = Some(StepNext::Step(to.to_string()));
        Ok(())
    }

    /// Point one branch of a condition step at `to`.
    pub fn connect_branch(
        &mut self,
        from: &str,
        branch: bool,
        to: &str,
    ) -> Result<(), WorkflowEditError> {
        if self.step(to).is_none() {
            return Err(WorkflowEditError::UnknownStep(to.to_string()));
        }
        let step = self
            .step_mut(from)
            .ok_or_else(|| WorkflowEditError::UnknownStep(from.to_string()))?;
        if step.step_type != StepType::Condition {
            return Err(WorkflowEditError::NotACondition(from.to_string()));
        }

        let (mut on_true, mut on_false) = match step.next.take() {
            Some(StepNext::Branch { on_true, on_false }) => (on_true, on_false),
            _ => (None, None),
        };
        if branch {
            on_true = Some(to.to_string());
        } else {
            on_false = Some(to.to_string());
        }
        step.next = Some(StepNext::Branch { on_true, on_false });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// The trigger that starts a workflow. Trigger delivery itself is external;
/// the definition only records its kind and the entry step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerDefinition {
    #[serde(rename = "type", alias = "triggerType")]
    pub trigger_type: TriggerType,
    /// Entry step ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    /// Trigger-specific settings (cron expression, webhook path, ...).
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub config: Value,
}

/// How a run was (or can be) started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    #[default]
    Manual,
    Webhook,
    Schedule,
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TriggerType::Manual => "manual",
            TriggerType::Webhook => "webhook",
            TriggerType::Schedule => "schedule",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for TriggerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(TriggerType::Manual),
            "webhook" => Ok(TriggerType::Webhook),
            "schedule" => Ok(TriggerType::Schedule),
            other => Err(format!("unknown trigger type '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Step Definition
// ---------------------------------------------------------------------------

/// A single node in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    /// Step ID, unique within the workflow.
    pub id: String,
    /// Human-readable step name.
    pub name: String,
    /// The kind of step.
    #[serde(rename = "type")]
    pub step_type: StepType,
    /// Type-specific configuration. May contain `$.path` placeholders.
    #[serde(default = "empty_config")]
    pub config: Value,
    /// Canvas position (visual builder only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    /// Successor pointer. Absent means terminal (unless `connections` say otherwise).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<StepNext>,
    /// Per-step timeout override in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

fn empty_config() -> Value {
    Value::Object(Map::new())
}

impl StepDefinition {
    /// Create a terminal step with the given config.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        step_type: StepType,
        config: Value,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            step_type,
            config,
            position: None,
            next: None,
            timeout_ms: None,
        }
    }

    /// Builder-style single successor.
    pub fn with_next(mut self, next: impl Into<String>) -> Self {
        self.next = Some(StepNext::Step(next.into()));
        self
    }

    /// Builder-style branch successors for condition steps.
    pub fn with_branches(mut self, on_true: Option<&str>, on_false: Option<&str>) -> Self {
        self.next = Some(StepNext::Branch {
            on_true: on_true.map(String::from),
            on_false: on_false.map(String::from),
        });
        self
    }
}

/// The kind of step in a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Trigger,
    HttpRequest,
    DataTransform,
    Condition,
    Delay,
    Log,
    Webhook,
    Ai,
    Database,
    Loop,
    Parallel,
}

impl StepType {
    /// The snake_case wire name of this step type.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::Trigger => "trigger",
            StepType::HttpRequest => "http_request",
            StepType::DataTransform => "data_transform",
            StepType::Condition => "condition",
            StepType::Delay => "delay",
            StepType::Log => "log",
            StepType::Webhook => "webhook",
            StepType::Ai => "ai",
            StepType::Database => "database",
            StepType::Loop => "loop",
            StepType::Parallel => "parallel",
        }
    }
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Successor pointer of a step.
///
/// Serialized either as a plain step ID or, for condition steps, as
/// `{ "true": "<id>", "false": "<id>" }`. A missing branch ends the run
/// when that branch is selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepNext {
    Step(String),
    Branch {
        #[serde(rename = "true", default, skip_serializing_if = "Option::is_none")]
        on_true: Option<String>,
        #[serde(rename = "false", default, skip_serializing_if = "Option::is_none")]
        on_false: Option<String>,
    },
}

impl StepNext {
    /// All step IDs this pointer references.
    pub fn targets(&self) -> Vec<&str> {
        match self {
            StepNext::Step(id) => vec![id.as_str()],
            StepNext::Branch { on_true, on_false } => on_true
                .iter()
                .chain(on_false.iter())
                .map(String::as_str)
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Connections
// ---------------------------------------------------------------------------

/// A directed edge between two steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub from: String,
    pub to: String,
    /// Branch label, only meaningful when `from` is a condition step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<BranchLabel>,
}

/// Which side of a condition an edge belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BranchLabel {
    #[serde(rename = "true")]
    True,
    #[serde(rename = "false")]
    False,
}

impl BranchLabel {
    pub fn as_bool(self) -> bool {
        matches!(self, BranchLabel::True)
    }
}

// ---------------------------------------------------------------------------
// Visual Builder Metadata
// ---------------------------------------------------------------------------

/// Canvas position coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
