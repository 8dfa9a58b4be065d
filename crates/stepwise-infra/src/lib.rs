//! Infrastructure layer for Stepwise.
//!
//! Contains the concrete collaborators behind the ports defined in
//! `stepwise-core`: the `reqwest`-backed [`HttpClient`](stepwise_core::workflow::capability::HttpClient),
//! the `config.toml` loader, and JSON-file storage for workflows and runs.

pub mod config;
pub mod filesystem;
pub mod http;
