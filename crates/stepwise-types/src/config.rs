//! Engine configuration types for Stepwise.
//!
//! `EngineConfig` is the top-level `config.toml` that controls step time
//! budgets, the runaway-path guard, and outbound HTTP settings.

use serde::{Deserialize, Serialize};

/// Interpreter and collaborator settings.
///
/// Loaded from `<data_dir>/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Time budget for a single step executor invocation, in milliseconds.
    #[serde(default = "default_step_timeout_ms")]
    pub step_timeout_ms: u64,

    /// Maximum number of steps one run may execute, nested steps included.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Transport-level timeout of the HTTP client, in milliseconds.
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,

    /// User-Agent header sent by `http_request` and `webhook` steps.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Capacity of the run event broadcast channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_step_timeout_ms() -> u64 {
    30_000
}

fn default_max_steps() -> usize {
    1_000
}

fn default_http_timeout_ms() -> u64 {
    30_000
}

fn default_user_agent() -> String {
    "stepwise-workflow/0.1".to_string()
}

fn default_event_capacity() -> usize {
    1024
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_timeout_ms: default_step_timeout_ms(),
            max_steps: default_max_steps(),
            http_timeout_ms: default_http_timeout_ms(),
            user_agent: default_user_agent(),
            event_capacity: default_event_capacity(),
        }
    }
}
