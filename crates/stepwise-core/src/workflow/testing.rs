//! Test doubles for the injectable capabilities.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;

use super::capability::{HttpClient, HttpError, HttpFuture, HttpRequest, HttpResponse, LogLevel, StepLogger};

/// Canned-response HTTP client that records every request it receives.
///
/// Unrouted URLs fail with a transport error.
#[derive(Default)]
pub struct MockHttpClient {
    routes: HashMap<String, (u16, Value)>,
    latency: Option<Duration>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, url: &str, status: u16, body: Value) -> Self {
        self.routes.insert(url.to_string(), (status, body));
        self
    }

    /// Sleep before answering (for timeout and cancellation tests).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl HttpClient for MockHttpClient {
    fn send(&self, request: HttpRequest) -> HttpFuture<'_> {
        Box::pin(async move {
            self.requests.lock().unwrap().push(request.clone());
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            match self.routes.get(&request.url) {
                Some((status, body)) => Ok(HttpResponse {
                    status: *status,
                    headers: BTreeMap::new(),
                    body: body.clone(),
                }),
                None => Err(HttpError::Transport {
                    url: request.url,
                    message: "connection refused".to_string(),
                }),
            }
        })
    }
}

/// Logger that keeps every entry in memory.
#[derive(Default)]
pub struct RecordingLogger {
    entries: Mutex<Vec<(LogLevel, String, String)>>,
}

impl RecordingLogger {
    pub fn entries(&self) -> Vec<(LogLevel, String, String)> {
        self.entries.lock().unwrap().clone()
    }
}

impl StepLogger for RecordingLogger {
    fn log(&self, level: LogLevel, step_id: &str, message: &str) {
        self.entries
            .lock()
            .unwrap()
            .push((level, step_id.to_string(), message.to_string()));
    }
}
