//! Application state wiring the interpreter to its collaborators.
//!
//! AppState pins the core ports to the concrete infra implementations: the
//! JSON-file repository, the reqwest HTTP client and the tracing step logger.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use stepwise_core::workflow::capability::TracingStepLogger;
use stepwise_core::workflow::interpreter::WorkflowInterpreter;
use stepwise_infra::config::load_engine_config;
use stepwise_infra::filesystem::{FsWorkflowRepository, resolve_data_dir};
use stepwise_infra::http::ReqwestHttpClient;

/// Shared application state used by every command handler.
pub struct AppState {
    pub data_dir: PathBuf,
    pub repo: FsWorkflowRepository,
    pub interpreter: Arc<WorkflowInterpreter>,
}

impl AppState {
    /// Resolve the data directory, load `config.toml`, and build the interpreter.
    pub async fn init(data_dir: Option<&Path>) -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir(data_dir);

        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let config = load_engine_config(&data_dir).await;
        let http = ReqwestHttpClient::new(&config).context("failed to build HTTP client")?;
        let interpreter =
            WorkflowInterpreter::from_config(&config, Arc::new(http), Arc::new(TracingStepLogger));

        tracing::debug!(
            data_dir = %data_dir.display(),
            step_timeout_ms = config.step_timeout_ms,
            max_steps = config.max_steps,
            "application state initialized"
        );

        Ok(Self {
            repo: FsWorkflowRepository::new(&data_dir),
            data_dir,
            interpreter: Arc::new(interpreter),
        })
    }
}
