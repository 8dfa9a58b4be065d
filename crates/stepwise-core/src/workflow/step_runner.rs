//! Step executors for the leaf step types.
//!
//! Every executor implements [`StepExecutor`]: given the step's resolved
//! config and the current data context, produce new output data or a typed
//! [`StepError`]. The [`StepRegistry`] maps each `StepType` to its executor.
//!
//! Built-in executors: trigger, http_request, data_transform, condition,
//! delay, log, webhook. `ai` and `database` steps need a caller-registered
//! executor. `parallel` and `loop` are composite and are driven by the
//! interpreter itself.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use stepwise_types::run::FailureKind;
use stepwise_types::workflow::StepType;

use super::capability::{
    HttpClient, HttpError, HttpRequest, LogLevel, NoHttpClient, StepLogger, TracingStepLogger,
};
use super::expression::{self, ExpressionError};

// ---------------------------------------------------------------------------
// StepOutput
// ---------------------------------------------------------------------------

/// Output from a step execution.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutput {
    /// New data context.
    Value(Value),
    /// Condition result: the selected branch plus the new data context.
    Branch { condition_met: bool, value: Value },
}

impl StepOutput {
    pub fn value(&self) -> &Value {
        match self {
            StepOutput::Value(v) | StepOutput::Branch { value: v, .. } => v,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            StepOutput::Value(v) | StepOutput::Branch { value: v, .. } => v,
        }
    }

    /// The selected branch, for condition outputs.
    pub fn branch(&self) -> Option<bool> {
        match self {
            StepOutput::Branch { condition_met, .. } => Some(*condition_met),
            StepOutput::Value(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// StepError
// ---------------------------------------------------------------------------

/// Errors that can occur during step execution.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StepError {
    /// Generic executor failure.
    #[error("step execution failed: {0}")]
    ExecutionFailed(String),

    /// The resolved config is missing a field or has the wrong shape.
    #[error("invalid step config: {0}")]
    InvalidConfig(String),

    #[error("invalid condition: {0}")]
    Expression(#[from] ExpressionError),

    #[error(transparent)]
    Http(#[from] HttpError),

    /// The server answered with a non-2xx status.
    #[error("HTTP {status} from '{url}'")]
    HttpStatus { status: u16, url: String, body: Value },

    #[error("step '{step_id}' timed out after {timeout_ms}ms")]
    Timeout { step_id: String, timeout_ms: u64 },

    #[error("run cancelled")]
    Cancelled,

    #[error("no executor registered for step type '{0}'")]
    NoExecutor(StepType),

    #[error("step limit of {max} exceeded")]
    StepLimit { max: usize },

    /// A step ID resolved at run time does not exist in the workflow.
    #[error("step '{0}' is not defined")]
    UnknownStep(String),

    /// A parallel branch or loop iteration failed.
    #[error("{label} failed: {message}")]
    Nested {
        label: String,
        kind: FailureKind,
        message: String,
    },
}

impl StepError {
    /// Failure category recorded on the step and run.
    pub fn kind(&self) -> FailureKind {
        match self {
            StepError::Timeout { .. } => FailureKind::Timeout,
            StepError::Cancelled => FailureKind::Cancelled,
            StepError::StepLimit { .. } => FailureKind::Limit,
            StepError::Nested { kind, .. } => *kind,
            _ => FailureKind::Execution,
        }
    }
}

// ---------------------------------------------------------------------------
// StepExecutor trait
// ---------------------------------------------------------------------------

/// Boxed future returned by [`StepExecutor::execute`].
pub type StepFuture<'a> = Pin<Box<dyn Future<Output = Result<StepOutput, StepError>> + Send + 'a>>;

/// Common capability implemented by every leaf step type.
///
/// `config` has already been through the template resolver. Executors must
/// not mutate shared state: the same instance serves concurrent runs.
pub trait StepExecutor: Send + Sync {
    fn execute<'a>(&'a self, step_id: &'a str, config: &'a Value, context: &'a Value)
    -> StepFuture<'a>;
}

// ---------------------------------------------------------------------------
// Built-in executors
// ---------------------------------------------------------------------------

/// `trigger`: passes the trigger payload through.
#[derive(Debug, Default, Clone, Copy)]
pub struct TriggerExecutor;

impl StepExecutor for TriggerExecutor {
    fn execute<'a>(&'a self, _step_id: &'a str, _config: &'a Value, context: &'a Value) -> StepFuture<'a> {
        Box::pin(async move { Ok(StepOutput::Value(context.clone())) })
    }
}

/// `http_request`: issues a call through the injected [`HttpClient`].
///
/// Config: `url` (required), `method` (default GET), `headers`, `body`.
/// Output on 2xx: `{ "success": true, "status": <u16>, "body": <json> }`.
pub struct HttpRequestExecutor {
    client: Arc<dyn HttpClient>,
}

impl HttpRequestExecutor {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self { client }
    }
}

impl StepExecutor for HttpRequestExecutor {
    fn execute<'a>(&'a self, step_id: &'a str, config: &'a Value, _context: &'a Value) -> StepFuture<'a> {
        Box::pin(async move {
            let mut request = build_request(config, "GET")?;
            request.body = config.get("body").filter(|b| !b.is_null()).cloned();

            tracing::debug!(step_id, method = request.method.as_str(), url = request.url.as_str(), "http_request step");

            let url = request.url.clone();
            let response = self.client.send(request).await?;
            if !response.is_success() {
                return Err(StepError::HttpStatus {
                    status: response.status,
                    url,
                    body: response.body,
                });
            }

            Ok(StepOutput::Value(json!({
                "success": true,
                "status": response.status,
                "body": response.body,
            })))
        })
    }
}

/// `data_transform`: the resolved `transform` map becomes the new context.
#[derive(Debug, Default, Clone, Copy)]
pub struct DataTransformExecutor;

impl StepExecutor for DataTransformExecutor {
    fn execute<'a>(&'a self, step_id: &'a str, config: &'a Value, _context: &'a Value) -> StepFuture<'a> {
        Box::pin(async move {
            match config.get("transform") {
                Some(Value::Object(map)) => {
                    tracing::debug!(step_id, keys = map.len(), "data_transform step");
                    Ok(StepOutput::Value(Value::Object(map.clone())))
                }
                Some(other) => Err(StepError::InvalidConfig(format!(
                    "'transform' must be an object, got {}",
                    json_type(other)
                ))),
                None => Err(StepError::InvalidConfig("missing 'transform'".to_string())),
            }
        })
    }
}

/// `condition`: evaluates `condition` and selects a branch.
///
/// A string condition is parsed as an expression. Any other resolved value
/// (e.g. a boolean substituted from `$.flag`) is judged by truthiness. The
/// output is `trueValue` / `falseValue` when given, else the context.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConditionExecutor;

impl StepExecutor for ConditionExecutor {
    fn execute<'a>(&'a self, step_id: &'a str, config: &'a Value, context: &'a Value) -> StepFuture<'a> {
        Box::pin(async move {
            let condition_met = match config.get("condition") {
                None | Some(Value::Null) => {
                    return Err(StepError::InvalidConfig("missing 'condition'".to_string()));
                }
                Some(Value::String(src)) => expression::evaluate_condition(src, context)?,
                Some(other) => expression::truthy(other),
            };

            let key = if condition_met { "trueValue" } else { "falseValue" };
            let value = config
                .get(key)
                .cloned()
                .unwrap_or_else(|| context.clone());

            tracing::debug!(step_id, condition_met, "condition step");
            Ok(StepOutput::Branch {
                condition_met,
                value,
            })
        })
    }
}

/// `delay`: sleeps `duration` milliseconds, then passes the context through.
///
/// `duration` may be a number or a numeric string; anything else means no wait.
#[derive(Debug, Default, Clone, Copy)]
pub struct DelayExecutor;

impl DelayExecutor {
    fn duration(config: &Value) -> Duration {
        let ms = match config.get("duration") {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
            _ => 0.0,
        };
        if ms.is_finite() && ms > 0.0 {
            Duration::from_millis(ms as u64)
        } else {
            Duration::ZERO
        }
    }
}

impl StepExecutor for DelayExecutor {
    fn execute<'a>(&'a self, step_id: &'a str, config: &'a Value, context: &'a Value) -> StepFuture<'a> {
        Box::pin(async move {
            let duration = Self::duration(config);
            tracing::debug!(step_id, duration_ms = duration.as_millis() as u64, "delay step");
            if !duration.is_zero() {
                tokio::time::sleep(duration).await;
            }
            Ok(StepOutput::Value(context.clone()))
        })
    }
}

/// `log`: emits `message` at `level` through the injected [`StepLogger`].
pub struct LogExecutor {
    logger: Arc<dyn StepLogger>,
}

impl LogExecutor {
    pub fn new(logger: Arc<dyn StepLogger>) -> Self {
        Self { logger }
    }
}

impl StepExecutor for LogExecutor {
    fn execute<'a>(&'a self, step_id: &'a str, config: &'a Value, context: &'a Value) -> StepFuture<'a> {
        Box::pin(async move {
            let level = config
                .get("level")
                .and_then(Value::as_str)
                .map(LogLevel::parse_lenient)
                .unwrap_or_default();
            let message = match config.get("message") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            };
            self.logger.log(level, step_id, &message);
            Ok(StepOutput::Value(context.clone()))
        })
    }
}

/// `webhook`: POSTs `payload` (default: the context) to `url`, then passes
/// the context through.
pub struct WebhookExecutor {
    client: Arc<dyn HttpClient>,
}

impl WebhookExecutor {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self { client }
    }
}

impl StepExecutor for WebhookExecutor {
    fn execute<'a>(&'a self, step_id: &'a str, config: &'a Value, context: &'a Value) -> StepFuture<'a> {
        Box::pin(async move {
            let mut request = build_request(config, "POST")?;
            request.body = Some(
                config
                    .get("payload")
                    .filter(|p| !p.is_null())
                    .cloned()
                    .unwrap_or_else(|| context.clone()),
            );

            tracing::debug!(step_id, url = request.url.as_str(), "webhook step");

            let url = request.url.clone();
            let response = self.client.send(request).await?;
            if !response.is_success() {
                return Err(StepError::HttpStatus {
                    status: response.status,
                    url,
                    body: response.body,
                });
            }
            Ok(StepOutput::Value(context.clone()))
        })
    }
}

fn build_request(config: &Value, default_method: &str) -> Result<HttpRequest, StepError> {
    let url = match config.get("url") {
        Some(Value::String(url)) if !url.is_empty() => url.clone(),
        _ => return Err(StepError::InvalidConfig("missing 'url'".to_string())),
    };
    let method = config
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or(default_method)
        .to_ascii_uppercase();

    let mut headers = BTreeMap::new();
    match config.get("headers") {
        Some(Value::Object(map)) => {
            for (name, value) in map {
                let value = match value {
                    Value::String(s) => s.clone(),
                    Value::Null => continue,
                    other => other.to_string(),
                };
                headers.insert(name.clone(), value);
            }
        }
        None | Some(Value::Null) => {}
        Some(other) => {
            return Err(StepError::InvalidConfig(format!(
                "'headers' must be an object, got {}",
                json_type(other)
            )));
        }
    }

    let mut request = HttpRequest::new(method, url);
    request.headers = headers;
    Ok(request)
}

pub(crate) fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// StepRegistry
// ---------------------------------------------------------------------------

/// Maps step types to their executors.
#[derive(Clone)]
pub struct StepRegistry {
    executors: HashMap<StepType, Arc<dyn StepExecutor>>,
}

impl StepRegistry {
    /// Registry with every built-in executor wired to the given capabilities.
    pub fn new(http: Arc<dyn HttpClient>, logger: Arc<dyn StepLogger>) -> Self {
        let mut registry = Self::empty();
        registry.register(StepType::Trigger, Arc::new(TriggerExecutor));
        registry.register(StepType::HttpRequest, Arc::new(HttpRequestExecutor::new(http.clone())));
        registry.register(StepType::DataTransform, Arc::new(DataTransformExecutor));
        registry.register(StepType::Condition, Arc::new(ConditionExecutor));
        registry.register(StepType::Delay, Arc::new(DelayExecutor));
        registry.register(StepType::Log, Arc::new(LogExecutor::new(logger)));
        registry.register(StepType::Webhook, Arc::new(WebhookExecutor::new(http)));
        registry
    }

    /// Registry with no executors at all.
    pub fn empty() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    /// Install or replace the executor for `step_type`.
    ///
    /// `parallel` and `loop` are always driven by the interpreter; executors
    /// registered for them are never called.
    pub fn register(&mut self, step_type: StepType, executor: Arc<dyn StepExecutor>) -> &mut Self {
        self.executors.insert(step_type, executor);
        self
    }

    pub fn get(&self, step_type: StepType) -> Option<&Arc<dyn StepExecutor>> {
        self.executors.get(&step_type)
    }

    /// Registered step types, sorted by wire name.
    pub fn step_types(&self) -> Vec<StepType> {
        let mut types: Vec<StepType> = self.executors.keys().copied().collect();
        types.sort_by_key(|t| t.as_str());
        types
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::new(Arc::new(NoHttpClient), Arc::new(TracingStepLogger))
    }
}

impl std::fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepRegistry")
            .field("step_types", &self.step_types())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::testing::{MockHttpClient, RecordingLogger};

    fn registry(http: &Arc<MockHttpClient>, logger: &Arc<RecordingLogger>) -> StepRegistry {
        StepRegistry::new(http.clone(), logger.clone())
    }

    async fn run(
        registry: &StepRegistry,
        step_type: StepType,
        config: Value,
        context: Value,
    ) -> Result<StepOutput, StepError> {
        let executor = registry.get(step_type).expect("executor registered");
        executor.execute("step_1", &config, &context).await
    }

    #[tokio::test]
    async fn test_trigger_passes_context_through() {
        let reg = StepRegistry::default();
        let out = run(&reg, StepType::Trigger, json!({}), json!({ "a": 1 })).await.unwrap();
        assert_eq!(out, StepOutput::Value(json!({ "a": 1 })));
    }

    #[tokio::test]
    async fn test_http_request_success_shape() {
        let http = Arc::new(MockHttpClient::new().respond("https://api.test/users", 201, json!({ "id": 9 })));
        let logger = Arc::new(RecordingLogger::default());
        let reg = registry(&http, &logger);

        let out = run(
            &reg,
            StepType::HttpRequest,
            json!({
                "url": "https://api.test/users",
                "method": "post",
                "headers": { "X-Trace": "abc", "X-Retry": 2, "X-None": null },
                "body": { "email": "x@y.com" }
            }),
            json!({}),
        )
        .await
        .unwrap();

        assert_eq!(out.value(), &json!({ "success": true, "status": 201, "body": { "id": 9 } }));

        let sent = http.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method, "POST");
        assert_eq!(sent[0].headers.get("X-Trace").map(String::as_str), Some("abc"));
        assert_eq!(sent[0].headers.get("X-Retry").map(String::as_str), Some("2"));
        assert!(!sent[0].headers.contains_key("X-None"));
        assert_eq!(sent[0].body, Some(json!({ "email": "x@y.com" })));
    }

    #[tokio::test]
    async fn test_http_request_defaults_to_get_without_body() {
        let http = Arc::new(MockHttpClient::new().respond("https://api.test/ping", 200, json!("pong")));
        let reg = registry(&http, &Arc::new(RecordingLogger::default()));
        run(&reg, StepType::HttpRequest, json!({ "url": "https://api.test/ping" }), json!({}))
            .await
            .unwrap();
        let sent = http.requests();
        assert_eq!(sent[0].method, "GET");
        assert_eq!(sent[0].body, None);
    }

    #[tokio::test]
    async fn test_http_request_non_2xx_fails() {
        let http = Arc::new(MockHttpClient::new().respond("https://api.test/x", 503, json!({ "err": "down" })));
        let reg = registry(&http, &Arc::new(RecordingLogger::default()));
        let err = run(&reg, StepType::HttpRequest, json!({ "url": "https://api.test/x" }), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::HttpStatus { status: 503, .. }));
        assert_eq!(err.kind(), FailureKind::Execution);
        assert_eq!(err.to_string(), "HTTP 503 from 'https://api.test/x'");
    }

    #[tokio::test]
    async fn test_http_request_network_error_and_missing_url() {
        let http = Arc::new(MockHttpClient::new());
        let reg = registry(&http, &Arc::new(RecordingLogger::default()));

        let err = run(&reg, StepType::HttpRequest, json!({ "url": "https://unrouted.test" }), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::Http(HttpError::Transport { .. })));

        let err = run(&reg, StepType::HttpRequest, json!({ "url": null }), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::InvalidConfig(msg) if msg.contains("url")));
    }

    #[tokio::test]
    async fn test_data_transform_builds_output() {
        let reg = StepRegistry::default();
        let out = run(
            &reg,
            StepType::DataTransform,
            json!({ "transform": { "to": "x@y.com", "greeting": "hi" } }),
            json!({ "ignored": true }),
        )
        .await
        .unwrap();
        assert_eq!(out.into_value(), json!({ "to": "x@y.com", "greeting": "hi" }));
    }

    #[tokio::test]
    async fn test_data_transform_malformed() {
        let reg = StepRegistry::default();
        let err = run(&reg, StepType::DataTransform, json!({ "transform": ["a"] }), json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("must be an object, got array"));
        let err = run(&reg, StepType::DataTransform, json!({}), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_condition_selects_branch_and_value() {
        let reg = StepRegistry::default();
        let config = json!({
            "condition": "input.length > 0",
            "trueValue": { "hasItems": true },
            "falseValue": { "hasItems": false }
        });

        let out = run(&reg, StepType::Condition, config.clone(), json!([1, 2])).await.unwrap();
        assert_eq!(out.branch(), Some(true));
        assert_eq!(out.value(), &json!({ "hasItems": true }));

        let out = run(&reg, StepType::Condition, config, json!([])).await.unwrap();
        assert_eq!(out.branch(), Some(false));
        assert_eq!(out.value(), &json!({ "hasItems": false }));
    }

    #[tokio::test]
    async fn test_condition_without_values_passes_context() {
        let reg = StepRegistry::default();
        let ctx = json!({ "score": 80 });
        let out = run(&reg, StepType::Condition, json!({ "condition": "score >= 50" }), ctx.clone())
            .await
            .unwrap();
        assert_eq!(out, StepOutput::Branch { condition_met: true, value: ctx });
    }

    #[tokio::test]
    async fn test_condition_non_string_uses_truthiness() {
        let reg = StepRegistry::default();
        let out = run(&reg, StepType::Condition, json!({ "condition": false }), json!({})).await.unwrap();
        assert_eq!(out.branch(), Some(false));
        let out = run(&reg, StepType::Condition, json!({ "condition": [0] }), json!({})).await.unwrap();
        assert_eq!(out.branch(), Some(true));
    }

    #[tokio::test]
    async fn test_condition_unparsable_fails() {
        let reg = StepRegistry::default();
        let err = run(&reg, StepType::Condition, json!({ "condition": "a ==" }), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::Expression(ExpressionError::Parse(_))));
        let err = run(&reg, StepType::Condition, json!({}), json!({})).await.unwrap_err();
        assert!(matches!(err, StepError::InvalidConfig(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_waits_then_passes_through() {
        let reg = StepRegistry::default();
        let start = tokio::time::Instant::now();
        let out = run(&reg, StepType::Delay, json!({ "duration": "250" }), json!({ "k": "v" }))
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(250));
        assert_eq!(out.into_value(), json!({ "k": "v" }));
    }

    #[test]
    fn test_delay_duration_parsing() {
        assert_eq!(DelayExecutor::duration(&json!({ "duration": 1500 })), Duration::from_millis(1500));
        assert_eq!(DelayExecutor::duration(&json!({ "duration": " 20 " })), Duration::from_millis(20));
        assert_eq!(DelayExecutor::duration(&json!({ "duration": -5 })), Duration::ZERO);
        assert_eq!(DelayExecutor::duration(&json!({ "duration": "soon" })), Duration::ZERO);
        assert_eq!(DelayExecutor::duration(&json!({})), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_log_emits_through_logger() {
        let http = Arc::new(MockHttpClient::new());
        let logger = Arc::new(RecordingLogger::default());
        let reg = registry(&http, &logger);

        let out = run(
            &reg,
            StepType::Log,
            json!({ "message": "new lead", "level": "warn" }),
            json!({ "lead": 1 }),
        )
        .await
        .unwrap();
        assert_eq!(out.into_value(), json!({ "lead": 1 }));

        run(&reg, StepType::Log, json!({ "message": { "n": 1 } }), json!({})).await.unwrap();

        let entries = logger.entries();
        assert_eq!(entries[0], (LogLevel::Warn, "step_1".to_string(), "new lead".to_string()));
        assert_eq!(entries[1], (LogLevel::Info, "step_1".to_string(), "{\"n\":1}".to_string()));
    }

    #[tokio::test]
    async fn test_webhook_posts_context_by_default() {
        let http = Arc::new(MockHttpClient::new().respond("https://hooks.test/in", 202, Value::Null));
        let reg = registry(&http, &Arc::new(RecordingLogger::default()));
        let ctx = json!({ "order": 42 });

        let out = run(&reg, StepType::Webhook, json!({ "url": "https://hooks.test/in" }), ctx.clone())
            .await
            .unwrap();
        assert_eq!(out.into_value(), ctx);

        let sent = http.requests();
        assert_eq!(sent[0].method, "POST");
        assert_eq!(sent[0].body, Some(ctx));
    }

    #[tokio::test]
    async fn test_missing_executor_for_ai_and_database() {
        let reg = StepRegistry::default();
        assert!(reg.get(StepType::Ai).is_none());
        assert!(reg.get(StepType::Database).is_none());
        assert_eq!(
            StepError::NoExecutor(StepType::Ai).to_string(),
            "no executor registered for step type 'ai'"
        );
    }

    #[test]
    fn test_register_replaces_executor() {
        let mut reg = StepRegistry::empty();
        assert!(reg.step_types().is_empty());
        reg.register(StepType::Database, Arc::new(TriggerExecutor))
            .register(StepType::Ai, Arc::new(TriggerExecutor));
        assert_eq!(reg.step_types(), vec![StepType::Ai, StepType::Database]);
        assert!(format!("{reg:?}").contains("StepRegistry"));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(StepError::Cancelled.kind(), FailureKind::Cancelled);
        assert_eq!(
            StepError::Timeout { step_id: "s".into(), timeout_ms: 5 }.kind(),
            FailureKind::Timeout
        );
        assert_eq!(StepError::StepLimit { max: 3 }.kind(), FailureKind::Limit);
        assert_eq!(StepError::InvalidConfig("x".into()).kind(), FailureKind::Execution);
        let nested = StepError::Nested {
            label: "branch 'b'".into(),
            kind: FailureKind::Timeout,
            message: "step 'x' timed out after 5ms".into(),
        };
        assert_eq!(nested.kind(), FailureKind::Timeout);
        assert_eq!(nested.to_string(), "branch 'b' failed: step 'x' timed out after 5ms");
    }
}
