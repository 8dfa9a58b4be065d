//! Injectable capabilities used by step executors.
//!
//! The core crate never performs I/O itself. `http_request` and `webhook`
//! steps go through an [`HttpClient`], and `log` steps through a
//! [`StepLogger`]. The infrastructure layer provides the real implementations
//! (e.g. a `reqwest` client); tests plug in mocks.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// An outbound HTTP call built from a resolved step config.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// Upper-case method name ("GET", "POST", ...).
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    /// JSON body. `None` sends no body.
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }
}

/// The response handed back to the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    /// Parsed JSON body, or a JSON string holding the raw text when the body
    /// is not valid JSON.
    pub body: Value,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport-level HTTP failures. Non-2xx statuses are NOT errors at this level.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HttpError {
    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("request to '{url}' failed: {message}")]
    Transport { url: String, message: String },

    #[error("failed to read response body from '{url}': {message}")]
    Body { url: String, message: String },

    #[error("no HTTP client configured")]
    Unavailable,
}

/// Boxed future returned by [`HttpClient::send`].
pub type HttpFuture<'a> =
    Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>>;

/// Transport used by `http_request` and `webhook` steps.
///
/// Object safe so a single `Arc<dyn HttpClient>` can be shared by every run.
pub trait HttpClient: Send + Sync {
    fn send(&self, request: HttpRequest) -> HttpFuture<'_>;
}

/// Client that refuses every request. Useful for workflows that never call out.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHttpClient;

impl HttpClient for NoHttpClient {
    fn send(&self, _request: HttpRequest) -> HttpFuture<'_> {
        Box::pin(async { Err(HttpError::Unavailable) })
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Severity accepted by `log` steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Parse a config value. Unknown levels fall back to `Info`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "debug" | "trace" => LogLevel::Debug,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(s)
    }
}

/// Sink for messages emitted by `log` steps.
pub trait StepLogger: Send + Sync {
    fn log(&self, level: LogLevel, step_id: &str, message: &str);
}

/// Routes `log` step output into `tracing` under the `stepwise::step_log` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStepLogger;

impl StepLogger for TracingStepLogger {
    fn log(&self, level: LogLevel, step_id: &str, message: &str) {
        match level {
            LogLevel::Debug => {
                tracing::debug!(target: "stepwise::step_log", step_id, "{message}")
            }
            LogLevel::Info => tracing::info!(target: "stepwise::step_log", step_id, "{message}"),
            LogLevel::Warn => tracing::warn!(target: "stepwise::step_log", step_id, "{message}"),
            LogLevel::Error => {
                tracing::error!(target: "stepwise::step_log", step_id, "{message}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_parse_is_lenient() {
        assert_eq!(LogLevel::parse_lenient("WARN"), LogLevel::Warn);
        assert_eq!(LogLevel::parse_lenient("warning"), LogLevel::Warn);
        assert_eq!(LogLevel::parse_lenient("error"), LogLevel::Error);
        assert_eq!(LogLevel::parse_lenient("debug"), LogLevel::Debug);
        assert_eq!(LogLevel::parse_lenient("verbose"), LogLevel::Info);
    }

    #[test]
    fn response_success_range() {
        let mut resp = HttpResponse {
            status: 204,
            headers: BTreeMap::new(),
            body: Value::Null,
        };
        assert!(resp.is_success());
        resp.status = 302;
        assert!(!resp.is_success());
    }

    #[tokio::test]
    async fn no_http_client_is_unavailable() {
        let err = NoHttpClient
            .send(HttpRequest::new("GET", "http://localhost"))
            .await
            .unwrap_err();
        assert_eq!(err, HttpError::Unavailable);
    }
}
