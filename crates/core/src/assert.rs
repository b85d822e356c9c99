//! Response assertions
//!
//! Every check runs independently so a single response can fail in several
//! ways at once.

use serde_json::Value;

use crate::http::HttpResponse;
use crate::schema::SchemaValidator;
use crate::types::{ExpectedResponse, HeaderExpectation};

/// Collected assertion outcome
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assessment {
    pub failures: Vec<String>,
    /// Soft findings; never fail a test
    pub warnings: Vec<String>,
}

impl Assessment {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    /// Failures joined into a single message
    pub fn error(&self) -> Option<String> {
        (!self.failures.is_empty()).then(|| self.failures.join("; "))
    }
}

/// Evaluate `expected` against `actual`.
pub fn assess(
    expected: &ExpectedResponse,
    actual: &HttpResponse,
    validator: &dyn SchemaValidator,
) -> Assessment {
    let mut outcome = Assessment::default();

    if let Some(status) = expected.status {
        if status != actual.status {
            outcome.failures.push(format!(
                "Status mismatch: expected {status}, got {}",
                actual.status
            ));
        }
    }

    if let Some(warning) = unexpected_message(expected, actual) {
        outcome.warnings.push(warning);
    }

    for (name, expectation) in &expected.headers {
        let found = actual.header(name);
        match (expectation, found) {
            (HeaderExpectation::Present(true), Some(_)) => {}
            (_, None) => outcome.failures.push(format!("Header '{name}' not found")),
            (expectation, Some(value)) => {
                let wanted = expectation.to_string();
                if wanted != value {
                    outcome.failures.push(format!(
                        "Header '{name}' mismatch: expected '{wanted}', got '{value}'"
                    ));
                }
            }
        }
    }

    if let Some(json) = &expected.json {
        for (key, wanted) in json {
            let found = actual.body.get(key);
            if !found.is_some_and(|value| json_eq(wanted, value)) {
                let shown = found.map_or_else(|| "undefined".to_string(), Value::to_string);
                outcome
                    .failures
                    .push(format!("Data property '{key}' mismatch: expected {wanted}, got {shown}"));
            }
        }
    }

    if let Some(schema) = &expected.schema {
        let validation = validator.validate(&actual.body, schema);
        if !validation.success {
            outcome.failures.push(format!(
                "Schema validation failed: {}",
                validation.errors.join(", ")
            ));
        }
    }

    outcome
}

/// A 200 test that expects no `message` but got one back.
fn unexpected_message(expected: &ExpectedResponse, actual: &HttpResponse) -> Option<String> {
    if expected.status != Some(200) {
        return None;
    }
    let expected_message = expected
        .json
        .as_ref()
        .and_then(|json| json.get("message"))
        .is_some_and(is_truthy);
    if expected_message {
        return None;
    }
    match actual.body.get("message") {
        Some(message) if is_truthy(message) => {
            let text = message
                .as_str()
                .map_or_else(|| message.to_string(), str::to_string);
            Some(format!("Unexpected status message: {text}"))
        }
        _ => None,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Structural equality; numbers compare by value so `1` equals `1.0`.
pub fn json_eq(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| json_eq(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, x)| b.get(key).is_some_and(|y| json_eq(x, y)))
        }
        _ => expected == actual,
    }
}
