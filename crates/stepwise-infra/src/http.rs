//! `reqwest`-backed HTTP client for `http_request` and `webhook` steps.
//!
//! Request bodies are sent as JSON. Response bodies are parsed as JSON when
//! possible and otherwise handed back as a JSON string holding the raw text.
//! Non-2xx statuses are returned as responses; the executors decide whether
//! they fail the step.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;
use stepwise_core::workflow::capability::{
    HttpClient, HttpError, HttpFuture, HttpRequest, HttpResponse,
};
use stepwise_types::config::EngineConfig;

/// HTTP client shared by every run of an interpreter.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    http: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Build a client with the configured transport timeout and User-Agent.
    pub fn new(config: &EngineConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_millis(config.http_timeout_ms))
            .build()?;
        Ok(Self { http })
    }

    /// Wrap an existing `reqwest::Client`.
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn dispatch(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| HttpError::InvalidMethod(request.method.clone()))?;
        let url = request.url;

        let mut builder = self.http.request(method.clone(), url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        tracing::debug!(method = %method, url = url.as_str(), "sending step request");

        let response = builder.send().await.map_err(|e| HttpError::Transport {
            url: url.clone(),
            message: e.to_string(),
        })?;

        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let text = response.text().await.map_err(|e| HttpError::Body {
            url: url.clone(),
            message: e.to_string(),
        })?;

        tracing::debug!(url = url.as_str(), status, bytes = text.len(), "step request finished");

        Ok(HttpResponse {
            status,
            headers,
            body: parse_body(text),
        })
    }
}

impl HttpClient for ReqwestHttpClient {
    fn send(&self, request: HttpRequest) -> HttpFuture<'_> {
        Box::pin(self.dispatch(request))
    }
}

fn parse_body(text: String) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    match serde_json::from_str(&text) {
        Ok(value) => value,
        Err(_) => Value::String(text),
    }
}
