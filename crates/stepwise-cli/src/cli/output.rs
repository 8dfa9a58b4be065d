//! Terminal rendering shared by the command handlers.

use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde_json::Value;

use stepwise_core::workflow::definition::ValidationReport;
use stepwise_types::event::RunEvent;
use stepwise_types::run::{Run, RunStatus, StepRecord, StepStatus};

/// Global output switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct Output {
    pub json: bool,
    pub quiet: bool,
}

/// Longest detail text shown in a table cell.
const DETAIL_WIDTH: usize = 60;

pub fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn run_status_cell(status: RunStatus) -> Cell {
    match status {
        RunStatus::Running => Cell::new("running").fg(Color::Blue),
        RunStatus::Completed => Cell::new("completed").fg(Color::Green),
        RunStatus::Failed => Cell::new("failed").fg(Color::Red),
    }
}

fn step_status_cell(status: StepStatus) -> Cell {
    match status {
        StepStatus::Pending => Cell::new("pending").fg(Color::Yellow),
        StepStatus::Running => Cell::new("running").fg(Color::Blue),
        StepStatus::Completed => Cell::new("completed").fg(Color::Green),
        StepStatus::Failed => Cell::new("failed").fg(Color::Red),
    }
}

pub fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut out: String = text.chars().take(width.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

pub fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

/// One table row per step record, nested branch records indented under
/// their parent.
pub(crate) fn step_rows(steps: &[StepRecord]) -> Vec<(String, &StepRecord)> {
    fn walk<'a>(steps: &'a [StepRecord], prefix: &str, rows: &mut Vec<(String, &'a StepRecord)>) {
        for step in steps {
            rows.push((format!("{prefix}{}", step.id), step));
            for branch in &step.branches {
                let nested = format!("{prefix}  {} / ", branch.label);
                walk(&branch.steps, &nested, rows);
            }
        }
    }

    let mut rows = Vec::new();
    walk(steps, "", &mut rows);
    rows
}

fn step_detail(step: &StepRecord) -> String {
    if let Some(error) = &step.error {
        return truncate(&error.message, DETAIL_WIDTH);
    }
    let mut detail = match step.branch {
        Some(true) => "branch: true".to_string(),
        Some(false) => "branch: false".to_string(),
        None => String::new(),
    };
    if detail.is_empty() {
        if let Some(output) = &step.output {
            detail = truncate(&compact(output), DETAIL_WIDTH);
        }
    }
    detail
}

fn compact(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

/// Print a run record: full JSON, or a summary with a step table.
pub fn print_run(run: &Run, out: Output) -> anyhow::Result<()> {
    if out.json {
        return print_json(run);
    }
    if out.quiet {
        return Ok(());
    }

    let status = match run.status {
        RunStatus::Completed => style(run.status.to_string()).green(),
        RunStatus::Failed => style(run.status.to_string()).red(),
        RunStatus::Running => style(run.status.to_string()).blue(),
    };

    println!();
    println!(
        "  {} Run {} of '{}'",
        style("*").bold(),
        style(&run.id).cyan(),
        style(&run.workflow_name).cyan()
    );
    println!("  Status: {status}");
    println!("  Trigger: {}", run.trigger_type);
    println!("  Started: {}", run.started_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(duration) = run.duration_ms {
        println!("  Duration: {duration}ms");
    }
    if let Some(error) = &run.error_message {
        println!("  Error: {}", style(error).red());
    }

    if !run.steps.is_empty() {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("Step").fg(Color::Cyan),
                Cell::new("Type"),
                Cell::new("Status"),
                Cell::new("Duration"),
                Cell::new("Detail"),
            ]);

        for (label, step) in step_rows(&run.steps) {
            let duration = step
                .duration_ms
                .map(|d| format!("{d}ms"))
                .unwrap_or_else(|| "-".to_string());
            table.add_row(vec![
                Cell::new(label),
                Cell::new(step.step_type.to_string()),
                step_status_cell(step.status),
                Cell::new(duration),
                Cell::new(step_detail(step)),
            ]);
        }

        println!();
        println!("{table}");
    }

    if let Some(output) = &run.output {
        println!();
        println!("  Output:");
        let pretty = serde_json::to_string_pretty(output)?;
        for line in pretty.lines() {
            println!("    {}", style(line).dim());
        }
    }
    println!();

    Ok(())
}

/// Print a validation report. Returns whether the workflow is valid.
pub fn print_report(report: &ValidationReport, source: &str, out: Output) -> anyhow::Result<bool> {
    if out.json {
        print_json(report)?;
        return Ok(report.valid);
    }

    if report.valid {
        if !out.quiet {
            println!();
            println!("  {} '{}' is valid", style("✓").green(), style(source).cyan());
        }
    } else {
        eprintln!();
        eprintln!("  {} '{}' is invalid", style("✗").red(), style(source).cyan());
        for error in &report.errors {
            eprintln!("    {} {error}", style("error:").red().bold());
        }
    }

    if !out.quiet {
        for warning in &report.warnings {
            println!("    {} {warning}", style("warning:").yellow());
        }
        println!();
    }
    Ok(report.valid)
}

/// One progress line per top-level step, on stderr so stdout stays clean.
pub fn print_progress(event: &RunEvent) {
    if let RunEvent::StepRecorded { record, .. } = event {
        let mark = match record.status {
            StepStatus::Completed => style("✓").green(),
            StepStatus::Failed => style("✗").red(),
            _ => style("·").dim(),
        };
        let duration = record
            .duration_ms
            .map(|d| format!("{d}ms"))
            .unwrap_or_default();
        eprintln!(
            "  {mark} {} {} {}",
            style(&record.id).cyan(),
            style(record.step_type.to_string()).dim(),
            style(duration).dim()
        );
    }
}
