//! JSON-file workflow repository.
//!
//! Implements `WorkflowRepository` from `stepwise-core` with one pretty-printed
//! JSON document per entity:
//!
//! ```text
//! {data_dir}/workflows/{workflow_id}.json
//! {data_dir}/runs/{workflow_id}/{run_id}.json
//! ```
//!
//! Writes go to a temporary sibling and are renamed into place.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use stepwise_core::repository::workflow::WorkflowRepository;
use stepwise_types::error::RepositoryError;
use stepwise_types::run::Run;
use stepwise_types::workflow::Workflow;

/// Filesystem-backed implementation of `WorkflowRepository`.
#[derive(Debug, Clone)]
pub struct FsWorkflowRepository {
    root: PathBuf,
}

impl FsWorkflowRepository {
    /// Create a repository rooted at `data_dir`. Directories are created lazily.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: data_dir.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn workflows_dir(&self) -> PathBuf {
        self.root.join("workflows")
    }

    fn runs_root(&self) -> PathBuf {
        self.root.join("runs")
    }

    fn workflow_path(&self, id: &str) -> Result<PathBuf, RepositoryError> {
        Ok(self.workflows_dir().join(format!("{}.json", safe_component(id)?)))
    }

    fn runs_dir(&self, workflow_id: &str) -> Result<PathBuf, RepositoryError> {
        Ok(self.runs_root().join(safe_component(workflow_id)?))
    }
}

// ---------------------------------------------------------------------------
// File helpers
// ---------------------------------------------------------------------------

/// Reject IDs that would escape their directory.
fn safe_component(id: &str) -> Result<&str, RepositoryError> {
    let invalid = id.is_empty()
        || id.starts_with('.')
        || id.contains(['/', '\\'])
        || id.chars().any(char::is_control);
    if invalid {
        return Err(RepositoryError::Io(format!("invalid identifier '{id}'")));
    }
    Ok(id)
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), RepositoryError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| RepositoryError::Serialization(e.to_string()))?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| RepositoryError::Io(format!("create {}: {e}", parent.display())))?;
    }

    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json)
        .await
        .map_err(|e| RepositoryError::Io(format!("write {}: {e}", tmp.display())))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| RepositoryError::Io(format!("rename to {}: {e}", path.display())))
}

/// Read and parse a JSON file. A missing file is `Ok(None)`.
async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, RepositoryError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(RepositoryError::Io(format!("read {}: {e}", path.display()))),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| RepositoryError::Serialization(format!("{}: {e}", path.display())))
}

/// Paths of the `*.json` files directly under `dir`. A missing directory is empty.
async fn json_files(dir: &Path) -> Result<Vec<PathBuf>, RepositoryError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(RepositoryError::Io(format!("list {}: {e}", dir.display()))),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| RepositoryError::Io(format!("list {}: {e}", dir.display())))?
    {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Subdirectories directly under `dir`. A missing directory is empty.
async fn subdirs(dir: &Path) -> Result<Vec<PathBuf>, RepositoryError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(RepositoryError::Io(format!("list {}: {e}", dir.display()))),
    };

    let mut dirs = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| RepositoryError::Io(format!("list {}: {e}", dir.display())))?
    {
        let is_dir = entry
            .file_type()
            .await
            .map(|t| t.is_dir())
            .unwrap_or(false);
        if is_dir {
            dirs.push(entry.path());
        }
    }
    Ok(dirs)
}

// ---------------------------------------------------------------------------
// WorkflowRepository
// ---------------------------------------------------------------------------

impl WorkflowRepository for FsWorkflowRepository {
    async fn save_definition(&self, workflow: &Workflow) -> Result<(), RepositoryError> {
        let path = self.workflow_path(&workflow.id)?;
        write_json(&path, workflow).await?;
        tracing::debug!(workflow_id = workflow.id.as_str(), path = %path.display(), "saved workflow");
        Ok(())
    }

    async fn get_definition(&self, id: &str) -> Result<Option<Workflow>, RepositoryError> {
        read_json(&self.workflow_path(id)?).await
    }

    async fn list_definitions(&self) -> Result<Vec<Workflow>, RepositoryError> {
        let mut workflows = Vec::new();
        for path in json_files(&self.workflows_dir()).await? {
            match read_json::<Workflow>(&path).await {
                Ok(Some(workflow)) => workflows.push(workflow),
                Ok(None) => {}
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable workflow"),
            }
        }
        workflows.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(workflows)
    }

    async fn delete_definition(&self, id: &str) -> Result<bool, RepositoryError> {
        let path = self.workflow_path(id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(RepositoryError::Io(format!("delete {}: {e}", path.display()))),
        }

        let runs = self.runs_dir(id)?;
        match tokio::fs::remove_dir_all(&runs).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(RepositoryError::Io(format!("delete {}: {e}", runs.display()))),
        }

        tracing::debug!(workflow_id = id, "deleted workflow and its runs");
        Ok(true)
    }

    async fn save_run(&self, run: &Run) -> Result<(), RepositoryError> {
        let path = self
            .runs_dir(&run.workflow_id)?
            .join(format!("{}.json", safe_component(&run.id)?));
        write_json(&path, run).await?;
        tracing::debug!(run_id = run.id.as_str(), workflow_id = run.workflow_id.as_str(), "saved run");
        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<Run>, RepositoryError> {
        let file_name = format!("{}.json", safe_component(run_id)?);
        for dir in subdirs(&self.runs_root()).await? {
            if let Some(run) = read_json(&dir.join(&file_name)).await? {
                return Ok(Some(run));
            }
        }
        Ok(None)
    }

    async fn list_runs(&self, workflow_id: &str, limit: usize) -> Result<Vec<Run>, RepositoryError> {
        let mut runs = Vec::new();
        for path in json_files(&self.runs_dir(workflow_id)?).await? {
            match read_json::<Run>(&path).await {
                Ok(Some(run)) => runs.push(run),
                Ok(None) => {}
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable run"),
            }
        }
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at).then_with(|| b.id.cmp(&a.id)));
        runs.truncate(limit);
        Ok(runs)
    }
}
