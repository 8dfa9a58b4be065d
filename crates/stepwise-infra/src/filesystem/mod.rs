//! Filesystem adapters for Stepwise.
//!
//! Provides the data directory layout and the JSON-file implementation of
//! `WorkflowRepository`.

pub mod workflow;

pub use workflow::FsWorkflowRepository;

use std::path::{Path, PathBuf};

/// Environment variable that overrides the data directory.
pub const DATA_DIR_ENV: &str = "STEPWISE_DATA_DIR";

/// Resolve the data directory.
///
/// Priority:
/// 1. An explicit path (e.g. from `--data-dir`)
/// 2. `STEPWISE_DATA_DIR` environment variable
/// 3. `~/.stepwise`
pub fn resolve_data_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }

    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".stepwise");
    }

    // Last resort: current directory
    PathBuf::from(".stepwise")
}
