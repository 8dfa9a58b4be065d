//! Stepwise CLI entry point.
//!
//! Binary name: `stepwise`
//!
//! Parses CLI arguments, initializes tracing, the data directory and the
//! interpreter, then dispatches to the appropriate command handler.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;
use stepwise_observe::tracing_setup::{
    TracingOptions, init_tracing, shutdown_tracing, verbosity_filter,
};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Shell completions don't need tracing or app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "stepwise", &mut std::io::stdout());
        return Ok(());
    }

    init_tracing(&TracingOptions {
        default_filter: verbosity_filter(cli.verbose, cli.quiet).to_string(),
        json: false,
        otel: cli.otel,
    })
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = dispatch(cli).await;
    shutdown_tracing();
    result
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let out = cli::Output {
        json: cli.json,
        quiet: cli.quiet,
    };

    // Validation works on a file alone
    if let Commands::Validate { file } = &cli.command {
        return cli::run::handle_validate(file, out).await;
    }

    let state = AppState::init(cli.data_dir.as_deref()).await?;

    match cli.command {
        Commands::Run {
            file,
            payload,
            trigger,
            save,
        } => cli::run::handle_run(&state, &file, payload.as_deref(), trigger, save, out).await,

        Commands::Workflow { action } => {
            cli::workflow::handle_workflow_command(action, &state, out).await
        }

        Commands::Runs { workflow_id, limit } => {
            cli::run::handle_runs(&state, &workflow_id, limit, out).await
        }

        Commands::RunShow { run_id } => cli::run::handle_run_show(&state, &run_id, out).await,

        Commands::Validate { .. } | Commands::Completions { .. } => {
            unreachable!("handled above")
        }
    }
}
