//! CLI workflow management subcommands.
//!
//! Provides create, list, show, delete, and trigger operations for workflow
//! definitions stored in the data directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use stepwise_core::repository::workflow::WorkflowRepository;
use stepwise_core::workflow::definition::{load_workflow_file, validate_workflow};
use stepwise_core::workflow::graph::{Successor, successor_of};
use stepwise_core::workflow::interpreter::TriggerInput;
use stepwise_types::workflow::{TriggerType, Workflow};

use super::output::{self, Output};
use super::run::{ensure_completed, execute_run, read_payload};
use crate::state::AppState;

/// Workflow management subcommands.
#[derive(Subcommand)]
pub enum WorkflowCommand {
    /// Register (or replace) a workflow from a JSON or YAML file.
    Create {
        /// Path to the workflow file.
        file: PathBuf,
    },

    /// List registered workflows.
    #[command(alias = "ls")]
    List,

    /// Show a registered workflow and its step graph.
    Show {
        /// Workflow ID.
        id: String,
    },

    /// Delete a registered workflow and its stored runs.
    #[command(alias = "rm")]
    Delete {
        /// Workflow ID.
        id: String,
    },

    /// Run a registered workflow and store the run record.
    Trigger {
        /// Workflow ID.
        id: String,

        /// Trigger payload as inline JSON, or @path to read it from a file.
        #[arg(long)]
        payload: Option<String>,

        /// Trigger type recorded on the run.
        #[arg(long, default_value = "manual")]
        trigger: TriggerType,
    },
}

/// Handle a workflow subcommand.
pub async fn handle_workflow_command(
    cmd: WorkflowCommand,
    state: &AppState,
    out: Output,
) -> Result<()> {
    match cmd {
        WorkflowCommand::Create { file } => handle_create(&file, state, out).await,
        WorkflowCommand::List => handle_list(state, out).await,
        WorkflowCommand::Show { id } => handle_show(&id, state, out).await,
        WorkflowCommand::Delete { id } => handle_delete(&id, state, out).await,
        WorkflowCommand::Trigger {
            id,
            payload,
            trigger,
        } => handle_trigger(&id, payload.as_deref(), trigger, state, out).await,
    }
}

async fn fetch(state: &AppState, id: &str) -> Result<Workflow> {
    state
        .repo
        .get_definition(id)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to look up workflow: {e}"))?
        .ok_or_else(|| anyhow::anyhow!("Workflow '{id}' not found"))
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

async fn handle_create(file: &Path, state: &AppState, out: Output) -> Result<()> {
    let workflow = load_workflow_file(file)
        .await
        .with_context(|| format!("Failed to load workflow from {}", file.display()))?;

    let report = validate_workflow(&workflow);
    if !report.valid {
        output::print_report(&report, &file.display().to_string(), out)?;
        bail!("Refusing to register an invalid workflow");
    }

    state
        .repo
        .save_definition(&workflow)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to save workflow: {e}"))?;

    if out.json {
        return output::print_json(&serde_json::json!({
            "id": workflow.id,
            "name": workflow.name,
            "steps": workflow.steps.len(),
            "warnings": report.warnings,
        }));
    }
    if out.quiet {
        return Ok(());
    }

    println!();
    println!(
        "  {} Registered workflow '{}'",
        style("*").green().bold(),
        style(&workflow.name).cyan()
    );
    println!("  ID: {}", workflow.id);
    println!("  Steps: {}", workflow.steps.len());
    println!(
        "  Stored in: {}",
        style(state.data_dir.join("workflows").display()).dim()
    );
    for warning in &report.warnings {
        println!("  {} {warning}", style("warning:").yellow());
    }
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

async fn handle_list(state: &AppState, out: Output) -> Result<()> {
    let workflows = state
        .repo
        .list_definitions()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to list workflows: {e}"))?;

    if out.json {
        let summary: Vec<_> = workflows
            .iter()
            .map(|w| {
                serde_json::json!({
                    "id": w.id,
                    "name": w.name,
                    "version": w.version,
                    "status": w.status,
                    "steps": w.steps.len(),
                    "trigger": w.trigger.as_ref().map(|t| t.trigger_type),
                })
            })
            .collect();
        return output::print_json(&summary);
    }

    if workflows.is_empty() {
        println!();
        println!("  No workflows registered.");
        println!(
            "  Register one with: {}",
            style("stepwise workflow create <file.yaml>").dim()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("ID").fg(Color::Cyan),
            Cell::new("Name"),
            Cell::new("Version"),
            Cell::new("Status"),
            Cell::new("Steps"),
            Cell::new("Trigger"),
        ]);

    for w in &workflows {
        let trigger = w
            .trigger
            .as_ref()
            .map(|t| t.trigger_type.to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            Cell::new(&w.id),
            Cell::new(&w.name),
            Cell::new(&w.version),
            Cell::new(w.status.to_string()),
            Cell::new(w.steps.len()),
            Cell::new(trigger),
        ]);
    }

    println!();
    println!("{table}");
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// Show
// ---------------------------------------------------------------------------

/// Human-readable successor column for one step.
fn describe_successor(successor: &Successor) -> String {
    match successor {
        Successor::End => "(end)".to_string(),
        Successor::Next(next) => next.clone(),
        Successor::Branch { on_true, on_false } => format!(
            "true: {} / false: {}",
            on_true.as_deref().unwrap_or("(end)"),
            on_false.as_deref().unwrap_or("(end)")
        ),
    }
}

async fn handle_show(id: &str, state: &AppState, out: Output) -> Result<()> {
    let workflow = fetch(state, id).await?;

    if out.json {
        return output::print_json(&workflow);
    }

    println!();
    println!(
        "  {} {} ({})",
        style("Workflow:").bold(),
        style(&workflow.name).cyan(),
        workflow.id
    );
    println!("  Version: {}", workflow.version);
    println!("  Status: {}", workflow.status);
    if let Some(description) = &workflow.description {
        println!("  Description: {description}");
    }
    if let Some(entry) = workflow.entry_step_id() {
        println!("  Entry: {}", style(entry).cyan());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Step").fg(Color::Cyan),
            Cell::new("Name"),
            Cell::new("Type"),
            Cell::new("Next"),
        ]);

    for step in &workflow.steps {
        let successor = successor_of(&workflow, step);
        table.add_row(vec![
            Cell::new(&step.id),
            Cell::new(&step.name),
            Cell::new(step.step_type.to_string()),
            Cell::new(describe_successor(&successor)),
        ]);
    }

    println!();
    println!("{table}");

    let report = validate_workflow(&workflow);
    for warning in &report.warnings {
        println!("  {} {warning}", style("warning:").yellow());
    }
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

async fn handle_delete(id: &str, state: &AppState, out: Output) -> Result<()> {
    let deleted = state
        .repo
        .delete_definition(id)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to delete workflow: {e}"))?;

    if !deleted {
        bail!("Workflow '{id}' not found");
    }

    if out.json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else if !out.quiet {
        println!();
        println!(
            "  {} Deleted workflow '{}' and its runs",
            style("*").green().bold(),
            style(id).cyan()
        );
        println!();
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

async fn handle_trigger(
    id: &str,
    payload: Option<&str>,
    trigger: TriggerType,
    state: &AppState,
    out: Output,
) -> Result<()> {
    let workflow = fetch(state, id).await?;
    let data = read_payload(payload).await?;

    let run = execute_run(state, &workflow, TriggerInput::new(trigger, data), out).await?;

    state
        .repo
        .save_run(&run)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to save run: {e}"))?;

    output::print_run(&run, out)?;
    if !out.json && !out.quiet {
        println!(
            "  Inspect later: {}",
            style(format!("stepwise run-show {}", run.id)).dim()
        );
        println!();
    }
    ensure_completed(&run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stepwise_types::workflow::{StepDefinition, StepType};

    #[test]
    fn test_describe_successor() {
        let mut wf = Workflow::new("wf", "Wf");
        wf.steps = vec![
            StepDefinition::new("check", "Check", StepType::Condition, json!({ "condition": "ok" }))
                .with_branches(Some("yes"), None),
            StepDefinition::new("yes", "Yes", StepType::Log, json!({})).with_next("done"),
            StepDefinition::new("done", "Done", StepType::Log, json!({})),
        ];

        let describe = |id: &str| {
            let step = wf.step(id).unwrap();
            describe_successor(&successor_of(&wf, step))
        };
        assert_eq!(describe("check"), "true: yes / false: (end)");
        assert_eq!(describe("yes"), "done");
        assert_eq!(describe("done"), "(end)");
    }
}
