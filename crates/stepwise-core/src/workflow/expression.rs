//! JEXL evaluator for `condition` steps.
//!
//! Wraps `jexl_eval::Evaluator` with the standard transforms pre-registered.
//! Conditions are written in JEXL with a few conveniences layered on top
//! by [`rewrite`]:
//!
//! - `input` and `$` name the whole data context: `input.length > 0`,
//!   `$.user.age >= 18`;
//! - any other bare identifier reads a field of the context: `user.age`;
//! - `.length` reads the length of a string, array or object
//!   (`name.length == 5` is `name|length == 5`);
//! - numeric dot segments index arrays (`items.1.sku` is `items[1].sku`).
//!
//! Transforms: `length`, `exists`, `contains`, `not`, `lower`, `upper`,
//! `trim`, `startsWith`, `endsWith`. A missing path evaluates to `null` and
//! non-boolean results are coerced with JavaScript-like truthiness.
//!
//! **Security note:** data is always passed as the evaluation context, never
//! interpolated into the expression source.

use jexl_eval::error::EvaluationError;
use serde_json::{json, Value};

/// Longest condition accepted, in characters.
pub const MAX_EXPRESSION_LEN: usize = 1024;

/// Deepest bracket nesting accepted.
pub const MAX_NESTING: usize = 32;

/// Context key the data is bound to during evaluation.
const ROOT: &str = "input";

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while checking or evaluating a condition.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExpressionError {
    #[error("empty expression")]
    Empty,

    #[error("expression is longer than {max} characters")]
    TooLong { max: usize },

    #[error("expression nests deeper than {max} levels")]
    TooDeep { max: usize },

    #[error("{0}")]
    Parse(String),

    #[error("{0}")]
    UnknownTransform(String),

    #[error("expression evaluation failed: {0}")]
    EvalFailed(String),
}

impl ExpressionError {
    fn from_jexl(err: &EvaluationError<'_>) -> Self {
        let message = err.to_string();
        match err {
            EvaluationError::ParseError(_) => ExpressionError::Parse(message),
            EvaluationError::UnknownTransform(_) => ExpressionError::UnknownTransform(message),
            _ => ExpressionError::EvalFailed(message),
        }
    }

    /// Whether the error is a defect of the expression itself rather than
    /// of the data it was evaluated against.
    pub fn is_static(&self) -> bool {
        !matches!(self, ExpressionError::EvalFailed(_))
    }
}

// ---------------------------------------------------------------------------
// WorkflowEvaluator
// ---------------------------------------------------------------------------

/// JEXL expression evaluator with the condition transforms registered.
pub struct WorkflowEvaluator {
    evaluator: jexl_eval::Evaluator<'static>,
}

impl WorkflowEvaluator {
    pub fn new() -> Self {
        let evaluator = jexl_eval::Evaluator::new()
            .with_transform("length", |args: &[Value]| {
                let len = match args.first() {
                    Some(Value::Object(map)) => match map.get("length") {
                        Some(own) => return Ok(own.clone()),
                        None => map.len(),
                    },
                    Some(Value::Array(items)) => items.len(),
                    Some(Value::String(s)) => s.chars().count(),
                    _ => 0,
                };
                Ok(json!(len as f64))
            })
            .with_transform("exists", |args: &[Value]| {
                Ok(json!(args.first().is_some_and(|v| !v.is_null())))
            })
            .with_transform("contains", |args: &[Value]| {
                let needle = args.get(1).unwrap_or(&Value::Null);
                let found = match args.first() {
                    Some(Value::String(s)) => needle.as_str().is_some_and(|n| s.contains(n)),
                    Some(Value::Array(items)) => items.iter().any(|item| loose_eq(item, needle)),
                    Some(Value::Object(map)) => needle.as_str().is_some_and(|k| map.contains_key(k)),
                    _ => false,
                };
                Ok(json!(found))
            })
            .with_transform("not", |args: &[Value]| {
                Ok(json!(!truthy(args.first().unwrap_or(&Value::Null))))
            })
            .with_transform("lower", |args: &[Value]| {
                let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(s.to_lowercase()))
            })
            .with_transform("upper", |args: &[Value]| {
                let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(s.to_uppercase()))
            })
            .with_transform("trim", |args: &[Value]| {
                let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(s.trim()))
            })
            .with_transform("startsWith", |args: &[Value]| {
                let subject = args.first().and_then(|v| v.as_str()).unwrap_or("");
                let prefix = args.get(1).and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(subject.starts_with(prefix)))
            })
            .with_transform("endsWith", |args: &[Value]| {
                let subject = args.first().and_then(|v| v.as_str()).unwrap_or("");
                let suffix = args.get(1).and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(subject.ends_with(suffix)))
            });

        Self { evaluator }
    }

    /// Evaluate a condition and return the raw JSON value.
    pub fn evaluate_value(&self, expression: &str, context: &Value) -> Result<Value, ExpressionError> {
        let source = rewrite(expression)?;
        let scope = json!({ "input": widen_numbers(context) });
        self.evaluator
            .eval_in_context(&source, &scope)
            .map_err(|e| ExpressionError::from_jexl(&e))
    }

    /// Evaluate a condition, coercing the result with [`truthy`].
    pub fn evaluate_bool(&self, expression: &str, context: &Value) -> Result<bool, ExpressionError> {
        Ok(truthy(&self.evaluate_value(expression, context)?))
    }

    /// Check that a condition is well formed without any data at hand.
    ///
    /// Evaluates against an empty context and only reports errors that do
    /// not depend on the data: syntax errors and unknown transforms.
    pub fn check(&self, expression: &str) -> Result<(), ExpressionError> {
        match self.evaluate_value(expression, &json!({})) {
            Err(e) if e.is_static() => Err(e),
            _ => Ok(()),
        }
    }
}

impl Default for WorkflowEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

/// Evaluate a condition against `context` in one go.
pub fn evaluate_condition(expression: &str, context: &Value) -> Result<bool, ExpressionError> {
    WorkflowEvaluator::new().evaluate_bool(expression, context)
}

/// Check a condition for data-independent errors.
pub fn check_condition(expression: &str) -> Result<(), ExpressionError> {
    WorkflowEvaluator::new().check(expression)
}

/// JavaScript-like truthiness.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// JEXL number literals are floats; widen context numbers to match so that
/// `status == 200` holds for an integer `status`.
fn widen_numbers(value: &Value) -> Value {
    match value {
        Value::Number(n) => n.as_f64().map(Value::from).unwrap_or_else(|| value.clone()),
        Value::Array(items) => Value::Array(items.iter().map(widen_numbers).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), widen_numbers(v)))
                .collect(),
        ),
        _ => value.clone(),
    }
}

fn loose_eq(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => l == r,
    }
}

// ---------------------------------------------------------------------------
// Source rewriting
// ---------------------------------------------------------------------------

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

fn last_significant(out: &str) -> Option<char> {
    out.trim_end().chars().last()
}

/// `out` ends in a `.` that directly follows a value (identifier, index or
/// group), so the next token is a path segment.
fn follows_value_dot(out: &str) -> bool {
    let mut tail = out.chars().rev();
    tail.next() == Some('.')
        && tail
            .next()
            .is_some_and(|c| is_ident_char(c) || c == ']' || c == ')')
}

/// Translate the condition dialect into plain JEXL over `{ "input": data }`.
///
/// String literals pass through untouched. Also enforces the length and
/// nesting limits, since the evaluator recurses over the parsed tree.
pub(crate) fn rewrite(source: &str) -> Result<String, ExpressionError> {
    if source.trim().is_empty() {
        return Err(ExpressionError::Empty);
    }
    if source.chars().count() > MAX_EXPRESSION_LEN {
        return Err(ExpressionError::TooLong {
            max: MAX_EXPRESSION_LEN,
        });
    }

    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len() + 16);
    let mut open: Vec<char> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' => {
                let start = i;
                i += 1;
                while i < chars.len() && chars[i] != c {
                    if chars[i] == '\\' {
                        i += 1;
                    }
                    i += 1;
                }
                i = (i + 1).min(chars.len());
                out.extend(&chars[start..i]);
            }
            '(' | '[' | '{' => {
                open.push(c);
                if open.len() > MAX_NESTING {
                    return Err(ExpressionError::TooDeep { max: MAX_NESTING });
                }
                out.push(c);
                i += 1;
            }
            ')' | ']' | '}' => {
                open.pop();
                out.push(c);
                i += 1;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                if follows_value_dot(&out) {
                    out.pop();
                    out.push('[');
                    out.extend(&chars[start..i]);
                    out.push(']');
                    continue;
                }
                if i + 1 < chars.len() && chars[i] == '.' && chars[i + 1].is_ascii_digit() {
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                out.extend(&chars[start..i]);
            }
            c if is_ident_start(c) => {
                let start = i;
                while i < chars.len() && is_ident_char(chars[i]) {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();

                match last_significant(&out) {
                    Some('.') if word == "length" && follows_value_dot(&out) => {
                        out.pop();
                        out.push_str("|length");
                    }
                    // Path segment or transform name.
                    Some('.') | Some('|') => out.push_str(&word),
                    // Object literal key.
                    Some('{') | Some(',') if open.last() == Some(&'{') => out.push_str(&word),
                    _ => match word.as_str() {
                        "true" | "false" | "null" | "in" => out.push_str(&word),
                        "$" | ROOT => out.push_str(ROOT),
                        _ => {
                            out.push_str(ROOT);
                            out.push('.');
                            out.push_str(&word);
                        }
                    },
                }
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }

    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn eval_bool(src: &str, ctx: &Value) -> bool {
        evaluate_condition(src, ctx).unwrap()
    }

    // -------------------------------------------------------------------
    // Rewriting
    // -------------------------------------------------------------------

    #[test]
    fn test_rewrite_roots_and_fields() {
        assert_eq!(rewrite("input.length > 0").unwrap(), "input|length > 0");
        assert_eq!(rewrite("$.age >= 18").unwrap(), "input.age >= 18");
        assert_eq!(rewrite("user.age < 31").unwrap(), "input.user.age < 31");
        assert_eq!(
            rewrite("type == 'push' && branch == \"main\"").unwrap(),
            "input.type == 'push' && input.branch == \"main\""
        );
    }

    #[test]
    fn test_rewrite_leaves_strings_and_transforms_alone() {
        assert_eq!(
            rewrite("msg|contains('user.name')").unwrap(),
            "input.msg|contains('user.name')"
        );
        assert_eq!(rewrite("'a' in roles").unwrap(), "'a' in input.roles");
        assert_eq!(rewrite("flag == null").unwrap(), "input.flag == null");
    }

    #[test]
    fn test_rewrite_numeric_segments_and_decimals() {
        assert_eq!(rewrite("items.1.sku").unwrap(), "input.items[1].sku");
        assert_eq!(rewrite("grid.0.2 > 1.5").unwrap(), "input.grid[0][2] > 1.5");
        assert_eq!(rewrite("items[idx]").unwrap(), "input.items[input.idx]");
    }

    #[test]
    fn test_rewrite_limits() {
        assert_eq!(rewrite("   "), Err(ExpressionError::Empty));

        let deep = format!("{}true{}", "(".repeat(MAX_NESTING + 1), ")".repeat(MAX_NESTING + 1));
        assert_eq!(rewrite(&deep), Err(ExpressionError::TooDeep { max: MAX_NESTING }));

        let long = "a == 1 && ".repeat(200);
        assert_eq!(
            rewrite(&long),
            Err(ExpressionError::TooLong {
                max: MAX_EXPRESSION_LEN
            })
        );

        let pathological = "(".repeat(100_000);
        assert!(check_condition(&pathological).is_err());
    }

    // -------------------------------------------------------------------
    // Paths
    // -------------------------------------------------------------------

    #[test]
    fn test_input_length_on_array_context() {
        assert!(eval_bool("input.length > 0", &json!(["a"])));
        assert!(!eval_bool("input.length > 0", &json!([])));
    }

    #[test]
    fn test_length_on_string_and_object_fields() {
        let ctx = json!({ "name": "hello", "tags": { "a": 1, "b": 2 } });
        assert!(eval_bool("name.length == 5", &ctx));
        assert!(eval_bool("tags|length == 2", &ctx));
    }

    #[test]
    fn test_length_key_wins_over_builtin() {
        let ctx = json!({ "box": { "length": 42 } });
        assert!(eval_bool("box.length == 42", &ctx));
    }

    #[test]
    fn test_dollar_root_and_nested_path() {
        let ctx = json!({ "user": { "profile": { "age": 30 } } });
        assert!(eval_bool("$.user.profile.age >= 18", &ctx));
        assert!(eval_bool("user.profile.age < 31", &ctx));
        assert!(eval_bool("input.user.profile.age == 30", &ctx));
    }

    #[test]
    fn test_array_index_segment() {
        let ctx = json!({ "items": [{ "sku": "A1" }, { "sku": "B2" }] });
        assert!(eval_bool("items.1.sku == 'B2'", &ctx));
        assert!(eval_bool("items[0].sku == 'A1'", &ctx));
    }

    #[test]
    fn test_missing_path_is_null() {
        let ctx = json!({ "event": {} });
        assert_eq!(
            WorkflowEvaluator::new().evaluate_value("event.nonexistent", &ctx).unwrap(),
            Value::Null
        );
        assert!(eval_bool("event.nonexistent == null", &ctx));
        assert!(!eval_bool("event.nonexistent", &ctx));
    }

    // -------------------------------------------------------------------
    // Operators and transforms
    // -------------------------------------------------------------------

    #[test]
    fn test_boolean_combinators() {
        let ctx = json!({ "type": "push", "branch": "main" });
        assert!(eval_bool("type == 'push' && branch == 'main'", &ctx));
        assert!(!eval_bool("type == 'push' && branch == 'dev'", &ctx));
        assert!(eval_bool("branch == 'dev' || branch == 'main'", &ctx));
        assert!(eval_bool("(branch == 'dev')|not", &ctx));
    }

    #[test]
    fn test_numeric_comparisons() {
        let ctx = json!({ "score": 7, "threshold": 7.0 });
        assert!(eval_bool("score == threshold", &ctx));
        assert!(eval_bool("score >= 7 && score <= 7", &ctx));
        assert!(!eval_bool("score > 10", &ctx));
    }

    #[test]
    fn test_exists_and_contains() {
        let ctx = json!({
            "email": "x@y.com",
            "phone": null,
            "roles": ["admin", "user"],
            "msg": "critical error"
        });
        assert!(eval_bool("email|exists", &ctx));
        assert!(!eval_bool("phone|exists", &ctx));
        assert!(!eval_bool("address|exists", &ctx));
        assert!(eval_bool("roles|contains('admin')", &ctx));
        assert!(!eval_bool("roles|contains('root')", &ctx));
        assert!(eval_bool("msg|contains('error')", &ctx));
        assert!(eval_bool("'user' in roles", &ctx));
        assert!(eval_bool("roles.length == 2", &ctx));
    }

    // -------------------------------------------------------------------
    // Truthiness
    // -------------------------------------------------------------------

    #[test]
    fn test_truthiness_rules() {
        assert!(!truthy(&json!("")));
        assert!(truthy(&json!("x")));
        assert!(!truthy(&json!(0)));
        assert!(truthy(&json!(0.5)));
        assert!(truthy(&json!([])));
        assert!(!truthy(&Value::Null));
    }

    #[test]
    fn test_integer_fields_equal_number_literals() {
        let ctx = json!({ "status": 200, "ids": [1, 2] });
        assert!(eval_bool("status == 200", &ctx));
        assert!(eval_bool("ids|contains(2)", &ctx));
        assert_eq!(
            widen_numbers(&json!({ "n": 3, "xs": [1, "a"] })),
            json!({ "n": 3.0, "xs": [1.0, "a"] })
        );
    }

    #[test]
    fn test_non_object_context_is_bound_to_input() {
        assert!(eval_bool("input == 'go'", &json!("go")));
        assert!(eval_bool("input", &json!(3)));
    }

    // -------------------------------------------------------------------
    // Checking
    // -------------------------------------------------------------------

    #[test]
    fn test_check_reports_static_errors() {
        assert!(matches!(check_condition("input.length >"), Err(ExpressionError::Parse(_))));
        assert!(matches!(check_condition("$.x >"), Err(ExpressionError::Parse(_))));
        assert!(matches!(
            check_condition("name|shout"),
            Err(ExpressionError::UnknownTransform(_))
        ));
        assert_eq!(check_condition(""), Err(ExpressionError::Empty));
    }

    #[test]
    fn test_check_accepts_data_dependent_conditions() {
        assert_eq!(check_condition("$.age >= 18"), Ok(()));
        assert_eq!(check_condition("input.length > 0"), Ok(()));
        assert_eq!(check_condition("roles|contains('admin') && vip == true"), Ok(()));
    }
}
