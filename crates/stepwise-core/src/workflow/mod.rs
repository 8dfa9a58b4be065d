//! Workflow engine: definitions, templates, conditions, executors, interpreter.
//!
//! - `definition` -- JSON/YAML parsing, file loading, structural validation
//! - `graph` -- successor resolution, execution plan snapshots, cycle detection
//! - `template` -- `$.`-placeholder resolution against the data context
//! - `expression` -- the condition language used by `condition` steps
//! - `capability` -- injectable HTTP client and step logger
//! - `step_runner` -- executors for the built-in step types and their registry
//! - `interpreter` -- walks a workflow and records the run

pub mod capability;
pub mod definition;
pub mod expression;
pub mod graph;
pub mod interpreter;
pub mod step_runner;
pub mod template;

#[cfg(test)]
pub(crate) mod testing;

pub use definition::{ValidationReport, validate_workflow};
pub use interpreter::{InterpreterError, InterpreterOptions, TriggerInput, WorkflowInterpreter};
pub use step_runner::{StepError, StepExecutor, StepOutput, StepRegistry};
