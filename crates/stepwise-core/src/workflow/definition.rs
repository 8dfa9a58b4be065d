//! Workflow definition parsing and structural validation.
//!
//! Converts JSON or YAML documents into the canonical `Workflow` shape and
//! checks the structural constraints the interpreter relies on: every edge
//! points at a defined step, the entry step exists, conditions parse, and the
//! graph is acyclic.

use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use stepwise_types::workflow::{StepNext, StepType, Workflow};
use thiserror::Error;

use super::expression;
use super::graph::{child_entries, find_cycle, unreachable_steps};
use super::template;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors raised while loading a workflow document.
#[derive(Debug, Error)]
pub enum DefinitionError {
    /// JSON/YAML parse failure.
    #[error("parse error: {0}")]
    Parse(String),

    /// The file extension is not one of json, yaml, yml.
    #[error("unsupported workflow file extension: {0}")]
    UnsupportedFormat(String),

    /// Filesystem I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a JSON document into a `Workflow`. Does not validate.
pub fn parse_workflow_json(json: &str) -> Result<Workflow, DefinitionError> {
    serde_json::from_str(json).map_err(|e| DefinitionError::Parse(e.to_string()))
}

/// Parse a YAML document into a `Workflow`. Does not validate.
pub fn parse_workflow_yaml(yaml: &str) -> Result<Workflow, DefinitionError> {
    serde_yaml_ng::from_str(yaml).map_err(|e| DefinitionError::Parse(e.to_string()))
}

/// Serialize a `Workflow` as pretty-printed JSON.
pub fn serialize_workflow_json(workflow: &Workflow) -> Result<String, DefinitionError> {
    serde_json::to_string_pretty(workflow).map_err(|e| DefinitionError::Parse(e.to_string()))
}

/// Load a workflow file, choosing the parser by extension.
pub async fn load_workflow_file(path: &Path) -> Result<Workflow, DefinitionError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let content = tokio::fs::read_to_string(path).await?;
    match ext.as_str() {
        "json" => parse_workflow_json(&content),
        "yaml" | "yml" => parse_workflow_yaml(&content),
        other => Err(DefinitionError::UnsupportedFormat(other.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Outcome of [`validate_workflow`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    /// Non-fatal findings (unreachable steps, ignored connections).
    pub warnings: Vec<String>,
}

impl std::fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.valid {
            return f.write_str("workflow is valid");
        }
        write!(f, "invalid workflow: {}", self.errors.join("; "))
    }
}

/// Check a workflow's structural validity without executing it.
///
/// Checks:
/// - at least one step exists and step IDs are unique
/// - `trigger.next` and the entry step are defined
/// - every `next`, branch, connection, parallel branch, and loop body
///   reference names a defined step
/// - condition steps use branch successors; other steps use a single one
/// - condition steps carry a parsable `condition`
/// - `timeoutMs`, when set, is positive
/// - the step graph has no cycles
///
/// Steps unreachable from the entry are reported as warnings.
pub fn validate_workflow(workflow: &Workflow) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if workflow.steps.is_empty() {
        errors.push("workflow must have at least one step".to_string());
        return finish(errors, warnings);
    }

    let mut ids = HashSet::new();
    for step in &workflow.steps {
        if !ids.insert(step.id.as_str()) {
            errors.push(format!("duplicate step ID: '{}'", step.id));
        }
    }

    if let Some(next) = workflow.trigger.as_ref().and_then(|t| t.next.as_deref()) {
        if !ids.contains(next) {
            errors.push(format!("trigger references unknown step '{next}'"));
        }
    }

    for step in &workflow.steps {
        let is_condition = step.step_type == StepType::Condition;

        match &step.next {
            Some(StepNext::Step(target)) => {
                if is_condition {
                    errors.push(format!(
                        "condition step '{}' must use true/false branches, not a single next",
                        step.id
                    ));
                }
                if !ids.contains(target.as_str()) {
                    errors.push(format!(
                        "step '{}' references unknown next step '{target}'",
                        step.id
                    ));
                }
            }
            Some(next @ StepNext::Branch { .. }) => {
                if !is_condition {
                    errors.push(format!(
                        "step '{}' has branch successors but is not a condition step",
                        step.id
                    ));
                }
                for target in next.targets() {
                    if !ids.contains(target) {
                        errors.push(format!(
                            "step '{}' references unknown branch step '{target}'",
                            step.id
                        ));
                    }
                }
            }
            None => {}
        }

        let outgoing: Vec<_> = workflow
            .connections
            .iter()
            .filter(|c| c.from == step.id)
            .collect();
        if step.next.is_some() && !outgoing.is_empty() {
            warnings.push(format!(
                "step '{}' has a next pointer; its connections are ignored",
                step.id
            ));
        } else if is_condition {
            let mut seen = HashSet::new();
            for conn in &outgoing {
                match conn.branch {
                    None => errors.push(format!(
                        "connection from condition step '{}' to '{}' needs a branch label",
                        step.id, conn.to
                    )),
                    Some(label) if !seen.insert(label) => errors.push(format!(
                        "condition step '{}' has more than one '{}' connection",
                        step.id,
                        label.as_bool()
                    )),
                    Some(_) => {}
                }
            }
        } else if outgoing.len() > 1 {
            errors.push(format!(
                "step '{}' has {} outgoing connections; only condition steps may branch",
                step.id,
                outgoing.len()
            ));
        }

        if step.timeout_ms == Some(0) {
            errors.push(format!("step '{}' has a zero timeoutMs", step.id));
        }

        match step.step_type {
            StepType::Condition => check_condition(step.id.as_str(), &step.config, &mut errors),
            StepType::Parallel => {
                let branches = child_entries(step);
                if branches.is_empty() {
                    errors.push(format!(
                        "parallel step '{}' requires a non-empty 'branches' list of step IDs",
                        step.id
                    ));
                }
                for target in branches {
                    if !ids.contains(target) {
                        errors.push(format!(
                            "parallel step '{}' references unknown branch step '{target}'",
                            step.id
                        ));
                    }
                }
            }
            StepType::Loop => {
                match child_entries(step).first() {
                    None => errors.push(format!(
                        "loop step '{}' requires a 'body' step ID",
                        step.id
                    )),
                    Some(body) if !ids.contains(body) => errors.push(format!(
                        "loop step '{}' references unknown body step '{body}'",
                        step.id
                    )),
                    Some(_) => {}
                }
                if step.config.get("items").is_none() {
                    errors.push(format!("loop step '{}' requires 'items'", step.id));
                }
            }
            _ => {}
        }
    }

    for conn in &workflow.connections {
        if !ids.contains(conn.from.as_str()) {
            errors.push(format!("connection from unknown step '{}'", conn.from));
        }
        if !ids.contains(conn.to.as_str()) {
            errors.push(format!(
                "connection from '{}' references unknown step '{}'",
                conn.from, conn.to
            ));
        }
    }

    if let Some(cyclic) = find_cycle(workflow) {
        errors.push(format!("cycle detected involving step '{cyclic}'"));
    }

    for id in unreachable_steps(workflow) {
        warnings.push(format!("step '{id}' is not reachable from the entry step"));
    }

    finish(errors, warnings)
}

fn check_condition(step_id: &str, config: &Value, errors: &mut Vec<String>) {
    match config.get("condition") {
        None | Some(Value::Null) => {
            errors.push(format!("condition step '{step_id}' requires a 'condition'"));
        }
        // Placeholders are only known at run time.
        Some(Value::String(src)) if template::is_placeholder(src) => {}
        Some(Value::String(src)) => {
            if let Err(e) = expression::check_condition(src) {
                errors.push(format!(
                    "condition step '{step_id}' has an invalid condition '{src}': {e}"
                ));
            }
        }
        Some(_) => {}
    }
}

fn finish(errors: Vec<String>, warnings: Vec<String>) -> ValidationReport {
    ValidationReport {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stepwise_types::workflow::{BranchLabel, Connection, StepDefinition, TriggerDefinition, TriggerType};

    fn log(id: &str) -> StepDefinition {
        StepDefinition::new(id, id, StepType::Log, json!({ "message": id }))
    }

    fn condition(id: &str, expr: &str) -> StepDefinition {
        StepDefinition::new(id, id, StepType::Condition, json!({ "condition": expr }))
    }

    fn workflow(steps: Vec<StepDefinition>) -> Workflow {
        let mut wf = Workflow::new("wf_test", "Test");
        wf.steps = steps;
        wf
    }

    #[test]
    fn test_valid_linear_workflow() {
        let wf = workflow(vec![log("a").with_next("b"), log("b").with_next("c"), log("c")]);
        let report = validate_workflow(&wf);
        assert!(report.valid, "{report}");
        assert!(report.errors.is_empty());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_dangling_next_is_rejected() {
        let wf = workflow(vec![log("a").with_next("step_99")]);
        let report = validate_workflow(&wf);
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("step_99"), "{}", report.errors[0]);
    }

    #[test]
    fn test_empty_workflow_is_rejected() {
        let report = validate_workflow(&workflow(vec![]));
        assert!(!report.valid);
        assert!(report.errors[0].contains("at least one step"));
    }

    #[test]
    fn test_dangling_trigger_entry_is_rejected() {
        let mut wf = workflow(vec![log("a")]);
        wf.trigger = Some(TriggerDefinition {
            trigger_type: TriggerType::Webhook,
            next: Some("ghost".into()),
            config: Value::Null,
        });
        let report = validate_workflow(&wf);
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("trigger references unknown step 'ghost'")));
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let report = validate_workflow(&workflow(vec![log("a"), log("a")]));
        assert!(report.errors.iter().any(|e| e.contains("duplicate step ID: 'a'")));
    }

    #[test]
    fn test_condition_shape_rules() {
        let wf = workflow(vec![
            condition("c", "x > 1").with_next("a"),
            log("a").with_branches(Some("c"), None),
        ]);
        let report = validate_workflow(&wf);
        assert!(report.errors.iter().any(|e| e.contains("must use true/false branches")));
        assert!(report.errors.iter().any(|e| e.contains("is not a condition step")));
    }

    #[test]
    fn test_unparsable_condition_is_rejected() {
        let wf = workflow(vec![condition("c", "input.length >")]);
        let report = validate_workflow(&wf);
        assert!(!report.valid);
        assert!(report.errors[0].contains("invalid condition"));
    }

    #[test]
    fn test_placeholder_condition_is_deferred() {
        let wf = workflow(vec![condition("c", "$.rule")]);
        assert!(validate_workflow(&wf).valid);
    }

    #[test]
    fn test_dollar_rooted_expression_is_checked() {
        let report = validate_workflow(&workflow(vec![condition("c", "$.x >")]));
        assert!(!report.valid);
        assert!(report.errors[0].contains("invalid condition '$.x >'"));

        assert!(validate_workflow(&workflow(vec![condition("c", "$.age >= 18")])).valid);
    }

    #[test]
    fn test_overlong_condition_is_rejected() {
        let src = "(".repeat(100_000);
        let report = validate_workflow(&workflow(vec![condition("c", &src)]));
        assert!(!report.valid);
    }

    #[test]
    fn test_missing_condition_is_rejected() {
        let wf = workflow(vec![StepDefinition::new("c", "c", StepType::Condition, json!({}))]);
        assert!(validate_workflow(&wf).errors[0].contains("requires a 'condition'"));
    }

    #[test]
    fn test_connection_rules() {
        let mut wf = workflow(vec![condition("c", "true"), log("a"), log("b"), log("d")]);
        wf.connections = vec![
            Connection { from: "c".into(), to: "a".into(), branch: None },
            Connection { from: "a".into(), to: "b".into(), branch: None },
            Connection { from: "a".into(), to: "d".into(), branch: None },
            Connection { from: "b".into(), to: "zzz".into(), branch: None },
        ];
        let report = validate_workflow(&wf);
        assert!(report.errors.iter().any(|e| e.contains("needs a branch label")));
        assert!(report.errors.iter().any(|e| e.contains("2 outgoing connections")));
        assert!(report.errors.iter().any(|e| e.contains("unknown step 'zzz'")));
    }

    #[test]
    fn test_duplicate_branch_label_is_rejected() {
        let mut wf = workflow(vec![condition("c", "true"), log("a"), log("b")]);
        wf.connections = vec![
            Connection { from: "c".into(), to: "a".into(), branch: Some(BranchLabel::True) },
            Connection { from: "c".into(), to: "b".into(), branch: Some(BranchLabel::True) },
        ];
        let report = validate_workflow(&wf);
        assert!(report.errors.iter().any(|e| e.contains("more than one 'true' connection")));
    }

    #[test]
    fn test_composite_step_rules() {
        let wf = workflow(vec![
            StepDefinition::new("p", "p", StepType::Parallel, json!({ "branches": [] }))
                .with_next("l"),
            StepDefinition::new("l", "l", StepType::Loop, json!({ "body": "nope" })),
        ]);
        let report = validate_workflow(&wf);
        assert!(report.errors.iter().any(|e| e.contains("non-empty 'branches'")));
        assert!(report.errors.iter().any(|e| e.contains("unknown body step 'nope'")));
        assert!(report.errors.iter().any(|e| e.contains("requires 'items'")));
    }

    #[test]
    fn test_cycle_and_zero_timeout_are_rejected() {
        let mut a = log("a").with_next("b");
        a.timeout_ms = Some(0);
        let wf = workflow(vec![a, log("b").with_next("a")]);
        let report = validate_workflow(&wf);
        assert!(report.errors.iter().any(|e| e.contains("cycle detected")));
        assert!(report.errors.iter().any(|e| e.contains("zero timeoutMs")));
    }

    #[test]
    fn test_unreachable_step_is_a_warning() {
        let wf = workflow(vec![log("a"), log("island")]);
        let report = validate_workflow(&wf);
        assert!(report.valid);
        assert_eq!(report.warnings, vec!["step 'island' is not reachable from the entry step"]);
    }

    #[test]
    fn test_parse_json_and_yaml_agree() {
        let json_doc = r#"{
            "id": "wf_1",
            "name": "Welcome",
            "steps": [
                { "id": "s1", "name": "Log", "type": "log", "config": { "message": "hi" } }
            ]
        }"#;
        let yaml_doc = r#"
id: wf_1
name: Welcome
steps:
  - id: s1
    name: Log
    type: log
    config:
      message: hi
"#;
        let from_json = parse_workflow_json(json_doc).unwrap();
        let from_yaml = parse_workflow_yaml(yaml_doc).unwrap();
        assert_eq!(from_json, from_yaml);
        assert_eq!(from_json.steps[0].step_type, StepType::Log);
    }

    #[test]
    fn test_parse_error_is_reported() {
        assert!(matches!(
            parse_workflow_json("{ not json"),
            Err(DefinitionError::Parse(_))
        ));
        assert!(matches!(
            parse_workflow_yaml("steps: [ { type: teleport } ]"),
            Err(DefinitionError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_load_workflow_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let wf = workflow(vec![log("a")]);

        let json_path = dir.path().join("wf.json");
        tokio::fs::write(&json_path, serialize_workflow_json(&wf).unwrap())
            .await
            .unwrap();
        assert_eq!(load_workflow_file(&json_path).await.unwrap(), wf);

        let yaml_path = dir.path().join("wf.yml");
        tokio::fs::write(&yaml_path, serde_yaml_ng::to_string(&wf).unwrap())
            .await
            .unwrap();
        assert_eq!(load_workflow_file(&yaml_path).await.unwrap(), wf);

        let txt_path = dir.path().join("wf.txt");
        tokio::fs::write(&txt_path, "id: x").await.unwrap();
        assert!(matches!(
            load_workflow_file(&txt_path).await,
            Err(DefinitionError::UnsupportedFormat(ext)) if ext == "txt"
        ));

        assert!(matches!(
            load_workflow_file(&dir.path().join("missing.json")).await,
            Err(DefinitionError::Io(_))
        ));
    }
}
