//! Shared domain types for Stepwise.
//!
//! This crate contains the workflow data model (definitions, steps, edges),
//! the execution records produced by the interpreter (runs and step records),
//! live-progress events, and engine configuration.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod config;
pub mod error;
pub mod event;
pub mod run;
pub mod workflow;
