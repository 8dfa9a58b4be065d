//! Workflow repository trait definition.
//!
//! Defines the storage interface for workflow definitions and their runs.
//! The infrastructure layer (stepwise-infra) implements this trait with
//! JSON files on disk.

use stepwise_types::error::RepositoryError;
use stepwise_types::run::Run;
use stepwise_types::workflow::Workflow;

/// Repository trait for workflow persistence.
///
/// Covers two entity families:
/// - **Definitions:** CRUD for workflow definitions.
/// - **Runs:** terminal run records with their step records.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait WorkflowRepository: Send + Sync {
    // -----------------------------------------------------------------------
    // Definitions
    // -----------------------------------------------------------------------

    /// Upsert a workflow definition (insert or replace by ID).
    fn save_definition(
        &self,
        workflow: &Workflow,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a workflow definition by ID.
    fn get_definition(
        &self,
        id: &str,
    ) -> impl std::future::Future<Output = Result<Option<Workflow>, RepositoryError>> + Send;

    /// List all workflow definitions, ordered by ID.
    fn list_definitions(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Workflow>, RepositoryError>> + Send;

    /// Delete a workflow definition and its runs. Returns `true` if it existed.
    fn delete_definition(
        &self,
        id: &str,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    /// Persist a run. Saving the same run ID twice replaces it.
    fn save_run(&self, run: &Run) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a run by its ID.
    fn get_run(
        &self,
        run_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<Run>, RepositoryError>> + Send;

    /// List runs of a workflow, newest first, capped at `limit`.
    fn list_runs(
        &self,
        workflow_id: &str,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<Run>, RepositoryError>> + Send;
}
