//! Workflow interpretation core for Stepwise.
//!
//! Holds the template resolver, the condition language, the step executors,
//! and the interpreter that walks a workflow and produces its `Run` record.
//! It also defines the repository trait (port) that `stepwise-infra`
//! implements. The crate depends only on `stepwise-types` and never performs
//! network or disk IO of its own, except for loading definition files.

pub mod event;
pub mod repository;
pub mod workflow;
