//! CLI command definitions and dispatch for the `stepwise` binary.
//!
//! Uses clap derive macros for argument parsing. Workflow files can be run
//! directly (`stepwise run flow.yaml`) or registered in the data directory
//! and triggered by ID (`stepwise workflow trigger wf_onboard`).

pub mod output;
pub mod run;
pub mod workflow;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use stepwise_types::workflow::TriggerType;

pub use output::Output;

/// Run and manage step-based automation workflows.
#[derive(Parser)]
#[command(name = "stepwise", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for info, -vv for debug, -vvv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Directory holding config.toml, workflows and runs (default: ~/.stepwise).
    #[arg(long, global = true, env = "STEPWISE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Export spans to stdout via OpenTelemetry.
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check a workflow file for structural errors without running it.
    Validate {
        /// Path to a workflow file (.json, .yaml or .yml).
        file: PathBuf,
    },

    /// Execute a workflow file once and print its run record.
    Run {
        /// Path to a workflow file (.json, .yaml or .yml).
        file: PathBuf,

        /// Trigger payload as inline JSON, or @path to read it from a file.
        #[arg(long)]
        payload: Option<String>,

        /// Trigger type recorded on the run.
        #[arg(long, default_value = "manual")]
        trigger: TriggerType,

        /// Persist the run record in the data directory.
        #[arg(long)]
        save: bool,
    },

    /// Manage registered workflows.
    #[command(alias = "wf")]
    Workflow {
        #[command(subcommand)]
        action: workflow::WorkflowCommand,
    },

    /// List recent runs of a registered workflow.
    Runs {
        /// Workflow ID.
        workflow_id: String,

        /// Maximum number of runs to display.
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Show a stored run with its step records.
    #[command(name = "run-show")]
    RunShow {
        /// Run ID.
        run_id: String,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_options() {
        let cli = Cli::try_parse_from([
            "stepwise",
            "--json",
            "run",
            "flow.yaml",
            "--payload",
            r#"{"email":"x@y.com"}"#,
            "--trigger",
            "webhook",
            "--save",
        ])
        .unwrap();

        assert!(cli.json);
        match cli.command {
            Commands::Run {
                file,
                payload,
                trigger,
                save,
            } => {
                assert_eq!(file, PathBuf::from("flow.yaml"));
                assert_eq!(payload.as_deref(), Some(r#"{"email":"x@y.com"}"#));
                assert_eq!(trigger, TriggerType::Webhook);
                assert!(save);
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_unknown_trigger_is_rejected() {
        let result = Cli::try_parse_from(["stepwise", "run", "flow.yaml", "--trigger", "cron"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_verbose_is_counted() {
        let cli = Cli::try_parse_from(["stepwise", "-vv", "runs", "wf_a"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Runs { limit: 10, .. }));
    }
}
