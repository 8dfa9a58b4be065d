//! Step graph: normalized successors, cycle detection, and reachability.
//!
//! A workflow expresses edges either through per-step `next` pointers or a
//! separate `connections` list. [`ExecutionPlan`] folds both into one
//! successor per step and snapshots the definition so that edits made while
//! a run is in flight never affect it. The `petgraph` helpers are used by
//! validation.

use std::collections::HashMap;
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use stepwise_types::workflow::{StepDefinition, StepNext, StepType, Workflow};

// ---------------------------------------------------------------------------
// Successors
// ---------------------------------------------------------------------------

/// Where control goes after a step completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Successor {
    /// Terminal step.
    End,
    Next(String),
    /// Condition step. A `None` side ends the run when selected.
    Branch {
        on_true: Option<String>,
        on_false: Option<String>,
    },
}

impl Successor {
    /// Every step ID this successor can lead to.
    pub fn targets(&self) -> Vec<&str> {
        match self {
            Successor::End => Vec::new(),
            Successor::Next(id) => vec![id.as_str()],
            Successor::Branch { on_true, on_false } => on_true
                .iter()
                .chain(on_false.iter())
                .map(String::as_str)
                .collect(),
        }
    }
}

/// Compute the successor of `step` within `workflow`.
///
/// The step's own `next` wins. Otherwise the `connections` leaving it are
/// used: labeled edges for condition steps, the first edge for everything
/// else (validation rejects more than one).
pub fn successor_of(workflow: &Workflow, step: &StepDefinition) -> Successor {
    if let Some(next) = &step.next {
        return match next {
            StepNext::Step(id) => Successor::Next(id.clone()),
            StepNext::Branch { on_true, on_false } => Successor::Branch {
                on_true: on_true.clone(),
                on_false: on_false.clone(),
            },
        };
    }

    let mut outgoing = workflow.connections.iter().filter(|c| c.from == step.id);

    if step.step_type == StepType::Condition {
        let mut on_true = None;
        let mut on_false = None;
        for conn in outgoing {
            match conn.branch.map(|b| b.as_bool()) {
                Some(true) if on_true.is_none() => on_true = Some(conn.to.clone()),
                Some(false) if on_false.is_none() => on_false = Some(conn.to.clone()),
                _ => {}
            }
        }
        if on_true.is_none() && on_false.is_none() {
            return Successor::End;
        }
        return Successor::Branch { on_true, on_false };
    }

    match outgoing.next() {
        Some(conn) => Successor::Next(conn.to.clone()),
        None => Successor::End,
    }
}

/// Step IDs a composite step starts sub-interpretations at.
///
/// `parallel` steps list them in `config.branches`; `loop` steps name one in
/// `config.body`. Read from the unresolved config.
pub fn child_entries(step: &StepDefinition) -> Vec<&str> {
    match step.step_type {
        StepType::Parallel => step
            .config
            .get("branches")
            .and_then(|b| b.as_array())
            .map(|items| items.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default(),
        StepType::Loop => step
            .config
            .get("body")
            .and_then(|b| b.as_str())
            .into_iter()
            .collect(),
        _ => Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Execution plan
// ---------------------------------------------------------------------------

/// Read-only snapshot of a workflow taken at run start.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    workflow_id: String,
    workflow_name: String,
    entry: Option<String>,
    steps: HashMap<String, Arc<StepDefinition>>,
    successors: HashMap<String, Successor>,
}

impl ExecutionPlan {
    /// Snapshot `workflow`. Expects a workflow that passed validation; an
    /// unknown step ID at run time is reported by the interpreter, not here.
    pub fn new(workflow: &Workflow) -> Self {
        let steps = workflow
            .steps
            .iter()
            .map(|s| (s.id.clone(), Arc::new(s.clone())))
            .collect();
        let successors = workflow
            .steps
            .iter()
            .map(|s| (s.id.clone(), successor_of(workflow, s)))
            .collect();

        Self {
            workflow_id: workflow.id.clone(),
            workflow_name: workflow.name.clone(),
            entry: workflow.entry_step_id().map(String::from),
            steps,
            successors,
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn workflow_name(&self) -> &str {
        &self.workflow_name
    }

    pub fn entry(&self) -> Option<&str> {
        self.entry.as_deref()
    }

    pub fn step(&self, id: &str) -> Option<&Arc<StepDefinition>> {
        self.steps.get(id)
    }

    pub fn successor(&self, id: &str) -> &Successor {
        self.successors.get(id).unwrap_or(&Successor::End)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Graph checks (petgraph)
// ---------------------------------------------------------------------------

struct StepGraph<'a> {
    graph: DiGraph<&'a str, ()>,
    index: HashMap<&'a str, NodeIndex>,
}

/// Build a graph of every known step with an edge for each successor and
/// each composite child entry. Edges to unknown IDs are skipped.
fn build_graph(workflow: &Workflow) -> StepGraph<'_> {
    let mut graph = DiGraph::<&str, ()>::new();
    let mut index = HashMap::new();
    for step in &workflow.steps {
        index
            .entry(step.id.as_str())
            .or_insert_with(|| graph.add_node(step.id.as_str()));
    }

    for step in &workflow.steps {
        let from = index[step.id.as_str()];
        let successor = successor_of(workflow, step);
        let targets: Vec<String> = successor
            .targets()
            .into_iter()
            .chain(child_entries(step))
            .map(String::from)
            .collect();
        for target in targets {
            if let Some(&to) = index.get(target.as_str()) {
                graph.add_edge(from, to, ());
            }
        }
    }

    StepGraph { graph, index }
}

/// Return a step ID that participates in a cycle, if any.
pub fn find_cycle(workflow: &Workflow) -> Option<String> {
    let StepGraph { graph, .. } = build_graph(workflow);
    toposort(&graph, None)
        .err()
        .map(|cycle| graph[cycle.node_id()].to_string())
}

/// Step IDs that cannot be reached from the entry step, in definition order.
pub fn unreachable_steps(workflow: &Workflow) -> Vec<String> {
    let Some(entry) = workflow.entry_step_id() else {
        return Vec::new();
    };
    let StepGraph { graph, index } = build_graph(workflow);
    let Some(&start) = index.get(entry) else {
        return Vec::new();
    };

    let mut reached = vec![false; graph.node_count()];
    let mut dfs = Dfs::new(&graph, start);
    while let Some(node) = dfs.next(&graph) {
        reached[node.index()] = true;
    }

    workflow
        .steps
        .iter()
        .filter(|s| index.get(s.id.as_str()).is_some_and(|n| !reached[n.index()]))
        .map(|s| s.id.clone())
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stepwise_types::workflow::{BranchLabel, Connection};

    fn step(id: &str, step_type: StepType) -> StepDefinition {
        StepDefinition::new(id, id.to_uppercase(), step_type, json!({}))
    }

    fn conn(from: &str, to: &str, branch: Option<BranchLabel>) -> Connection {
        Connection {
            from: from.into(),
            to: to.into(),
            branch,
        }
    }

    #[test]
    fn test_next_pointer_wins_over_connections() {
        let mut wf = Workflow::new("wf", "wf");
        wf.steps = vec![
            step("a", StepType::Log).with_next("b"),
            step("b", StepType::Log),
            step("c", StepType::Log),
        ];
        wf.connections = vec![conn("a", "c", None)];

        let plan = ExecutionPlan::new(&wf);
        assert_eq!(plan.successor("a"), &Successor::Next("b".into()));
        assert_eq!(plan.successor("b"), &Successor::End);
    }

    #[test]
    fn test_connections_drive_successors() {
        let mut wf = Workflow::new("wf", "wf");
        wf.steps = vec![
            step("a", StepType::Trigger),
            step("check", StepType::Condition),
            step("yes", StepType::Log),
            step("no", StepType::Log),
        ];
        wf.connections = vec![
            conn("a", "check", None),
            conn("check", "yes", Some(BranchLabel::True)),
            conn("check", "no", Some(BranchLabel::False)),
        ];

        let plan = ExecutionPlan::new(&wf);
        assert_eq!(plan.entry(), Some("a"));
        assert_eq!(plan.successor("a"), &Successor::Next("check".into()));
        assert_eq!(
            plan.successor("check"),
            &Successor::Branch {
                on_true: Some("yes".into()),
                on_false: Some("no".into())
            }
        );
    }

    #[test]
    fn test_plan_is_a_snapshot() {
        let mut wf = Workflow::new("wf", "wf");
        wf.steps = vec![step("a", StepType::Log).with_next("b"), step("b", StepType::Log)];
        let plan = ExecutionPlan::new(&wf);

        wf.remove_step("b").unwrap();
        assert!(plan.step("b").is_some());
        assert_eq!(plan.successor("a"), &Successor::Next("b".into()));
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn test_find_cycle() {
        let mut wf = Workflow::new("wf", "wf");
        wf.steps = vec![
            step("a", StepType::Log).with_next("b"),
            step("b", StepType::Log).with_next("c"),
            step("c", StepType::Log).with_next("a"),
        ];
        let cyclic = find_cycle(&wf).unwrap();
        assert!(["a", "b", "c"].contains(&cyclic.as_str()));

        wf.steps[2].next = None;
        assert_eq!(find_cycle(&wf), None);
    }

    #[test]
    fn test_loop_body_pointing_back_is_a_cycle() {
        let mut wf = Workflow::new("wf", "wf");
        wf.steps = vec![
            StepDefinition::new("each", "Each", StepType::Loop, json!({ "items": "$.", "body": "work" })),
            step("work", StepType::Log).with_next("each"),
        ];
        assert!(find_cycle(&wf).is_some());
    }

    #[test]
    fn test_unreachable_steps_include_orphans_only() {
        let mut wf = Workflow::new("wf", "wf");
        wf.steps = vec![
            StepDefinition::new("fan", "Fan", StepType::Parallel, json!({ "branches": ["x", "y"] }))
                .with_next("done"),
            step("x", StepType::Log),
            step("y", StepType::Log),
            step("done", StepType::Log),
            step("orphan", StepType::Log),
        ];
        assert_eq!(unreachable_steps(&wf), vec!["orphan".to_string()]);
    }

    #[test]
    fn test_child_entries() {
        let parallel = StepDefinition::new(
            "p",
            "P",
            StepType::Parallel,
            json!({ "branches": ["a", 3, "b"] }),
        );
        assert_eq!(child_entries(&parallel), vec!["a", "b"]);
        let lp = StepDefinition::new("l", "L", StepType::Loop, json!({ "body": "a" }));
        assert_eq!(child_entries(&lp), vec!["a"]);
        assert!(child_entries(&step("x", StepType::Log)).is_empty());
    }
}
