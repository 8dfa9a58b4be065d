//! Run-oriented commands: validate, run, runs, run-show.
//!
//! Also hosts [`execute_run`], used by `workflow trigger` as well, which
//! streams step progress and turns Ctrl-C into a cooperative cancellation.

use std::path::Path;

use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde_json::Value;
use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use stepwise_core::repository::workflow::WorkflowRepository;
use stepwise_core::workflow::definition::{load_workflow_file, validate_workflow};
use stepwise_core::workflow::interpreter::{InterpreterError, TriggerInput};
use stepwise_types::event::RunEvent;
use stepwise_types::run::{Run, RunStatus};
use stepwise_types::workflow::{TriggerType, Workflow};

use super::output::{self, Output};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Validate
// ---------------------------------------------------------------------------

pub async fn handle_validate(file: &Path, out: Output) -> Result<()> {
    let workflow = load_workflow_file(file)
        .await
        .with_context(|| format!("Failed to load workflow from {}", file.display()))?;

    let report = validate_workflow(&workflow);
    if !output::print_report(&report, &file.display().to_string(), out)? {
        bail!("{} has {} validation error(s)", file.display(), report.errors.len());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

pub async fn handle_run(
    state: &AppState,
    file: &Path,
    payload: Option<&str>,
    trigger: TriggerType,
    save: bool,
    out: Output,
) -> Result<()> {
    let workflow = load_workflow_file(file)
        .await
        .with_context(|| format!("Failed to load workflow from {}", file.display()))?;
    let data = read_payload(payload).await?;

    let run = execute_run(state, &workflow, TriggerInput::new(trigger, data), out).await?;

    if save {
        state
            .repo
            .save_run(&run)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to save run: {e}"))?;
    }

    output::print_run(&run, out)?;
    ensure_completed(&run)
}

/// Parse `--payload`: inline JSON, `@path` to a JSON file, or `{}` when absent.
pub async fn read_payload(payload: Option<&str>) -> Result<Value> {
    let Some(raw) = payload else {
        return Ok(Value::Object(Default::default()));
    };

    let text = match raw.strip_prefix('@') {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read payload file '{path}'"))?,
        None => raw.to_string(),
    };
    serde_json::from_str(&text).context("Invalid JSON payload")
}

/// Execute a workflow, printing progress to stderr and cancelling on Ctrl-C.
pub async fn execute_run(
    state: &AppState,
    workflow: &Workflow,
    trigger: TriggerInput,
    out: Output,
) -> Result<Run> {
    let show_progress = !out.json && !out.quiet;
    let mut events = state.interpreter.event_bus().map(|bus| bus.subscribe());
    let token = CancellationToken::new();

    if show_progress {
        eprintln!();
        eprintln!(
            "  {} Running '{}'",
            style("▶").cyan().bold(),
            style(&workflow.name).cyan()
        );
    }

    let execution = state
        .interpreter
        .execute_with_token(workflow, trigger, token.clone());
    tokio::pin!(execution);

    let result = loop {
        tokio::select! {
            result = &mut execution => break result,
            event = recv_event(&mut events), if show_progress => match event {
                Ok(event) => output::print_progress(&event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "progress display lagged");
                }
                Err(RecvError::Closed) => events = None,
            },
            _ = tokio::signal::ctrl_c(), if !token.is_cancelled() => {
                eprintln!("  {} cancelling run...", style("!").yellow().bold());
                token.cancel();
            }
        }
    };

    // Flush progress events that arrived after the last poll.
    if show_progress {
        if let Some(rx) = events.as_mut() {
            while let Ok(event) = rx.try_recv() {
                output::print_progress(&event);
            }
        }
    }

    match result {
        Ok(run) => Ok(run),
        Err(InterpreterError::Invalid(report)) => {
            output::print_report(&report, &workflow.id, out)?;
            bail!("workflow '{}' failed validation", workflow.id)
        }
        Err(other) => Err(other.into()),
    }
}

async fn recv_event(events: &mut Option<Receiver<RunEvent>>) -> Result<RunEvent, RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Map a failed run to a non-zero exit.
pub fn ensure_completed(run: &Run) -> Result<()> {
    if run.status == RunStatus::Failed {
        bail!(
            "run {} failed: {}",
            output::short_id(&run.id),
            run.error_message.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

pub async fn handle_runs(state: &AppState, workflow_id: &str, limit: usize, out: Output) -> Result<()> {
    let runs = state
        .repo
        .list_runs(workflow_id, limit)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to list runs: {e}"))?;

    if out.json {
        let summary: Vec<_> = runs
            .iter()
            .map(|r| {
                serde_json::json!({
                    "id": r.id,
                    "status": r.status,
                    "trigger": r.trigger_type,
                    "startedAt": r.started_at.to_rfc3339(),
                    "durationMs": r.duration_ms,
                    "steps": r.steps.len(),
                    "error": r.error_message,
                })
            })
            .collect();
        return output::print_json(&summary);
    }

    if runs.is_empty() {
        println!();
        println!("  No runs for workflow '{workflow_id}'.");
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Run ID").fg(Color::Cyan),
            Cell::new("Status"),
            Cell::new("Trigger"),
            Cell::new("Started"),
            Cell::new("Duration"),
            Cell::new("Steps"),
            Cell::new("Error"),
        ]);

    for r in &runs {
        table.add_row(vec![
            Cell::new(&r.id),
            output::run_status_cell(r.status),
            Cell::new(r.trigger_type.to_string()),
            Cell::new(r.started_at.format("%Y-%m-%d %H:%M:%S").to_string()),
            Cell::new(
                r.duration_ms
                    .map(|d| format!("{d}ms"))
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(r.steps.len()),
            Cell::new(
                r.error_message
                    .as_deref()
                    .map(|e| output::truncate(e, 40))
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ]);
    }

    println!();
    println!("  Runs for workflow '{}'", style(workflow_id).cyan());
    println!();
    println!("{table}");
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// Run show
// ---------------------------------------------------------------------------

pub async fn handle_run_show(state: &AppState, run_id: &str, out: Output) -> Result<()> {
    let run = state
        .repo
        .get_run(run_id)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to get run: {e}"))?
        .ok_or_else(|| anyhow::anyhow!("Run '{run_id}' not found"))?;

    output::print_run(&run, out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use stepwise_types::run::{FailureKind, StepFailure};

    #[tokio::test]
    async fn test_read_payload_defaults_to_empty_object() {
        assert_eq!(read_payload(None).await.unwrap(), json!({}));
    }

    #[tokio::test]
    async fn test_read_payload_inline_and_file() {
        assert_eq!(
            read_payload(Some(r#"{"a":[1,2]}"#)).await.unwrap(),
            json!({ "a": [1, 2] })
        );

        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("payload.json");
        tokio::fs::write(&path, r#"["x"]"#).await.unwrap();
        let arg = format!("@{}", path.display());
        assert_eq!(read_payload(Some(arg.as_str())).await.unwrap(), json!(["x"]));
    }

    #[tokio::test]
    async fn test_read_payload_rejects_bad_json() {
        let err = read_payload(Some("{nope")).await.unwrap_err();
        assert!(err.to_string().contains("Invalid JSON payload"));
    }

    #[test]
    fn test_ensure_completed() {
        let mut run = Run::start("0192abcd-ef", "wf", "Wf", TriggerType::Manual, json!({}), Utc::now());
        run.complete(json!({}), Utc::now());
        assert!(ensure_completed(&run).is_ok());

        run.fail(
            StepFailure {
                kind: FailureKind::Cancelled,
                message: "run cancelled".into(),
            },
            Utc::now(),
        );
        let err = ensure_completed(&run).unwrap_err();
        assert_eq!(err.to_string(), "run 0192abcd failed: run cancelled");
    }
}
