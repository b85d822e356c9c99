//! Test definitions, results and run reports

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::hooks::TestHooks;
use crate::http::{HttpRequest, HttpResponse};

/// Execution phase; translated into implicit dependency edges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Setup,
    #[default]
    Main,
    Teardown,
}

/// Cookie handling for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Credentials {
    /// Attach the session cookie captured earlier in the run
    Include,
    SameOrigin,
    Omit,
}

/// How the request of a test case is built
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSpec {
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default)]
    pub credentials: Option<Credentials>,
}

/// Expected header: `true` asserts presence, anything else an exact value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderExpectation {
    Present(bool),
    Value(String),
}

impl fmt::Display for HeaderExpectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderExpectation::Present(flag) => write!(f, "{flag}"),
            HeaderExpectation::Value(value) => write!(f, "{value}"),
        }
    }
}

/// Assertions on the response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedResponse {
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub headers: BTreeMap<String, HeaderExpectation>,
    /// Subset of top-level body keys that must match
    #[serde(default)]
    pub json: Option<Map<String, Value>>,
    /// Schema handed to the configured [`SchemaValidator`](crate::SchemaValidator)
    #[serde(default)]
    pub schema: Option<Value>,
}

/// One HTTP expectation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub name: String,
    #[serde(default)]
    pub endpoint: String,
    /// Dependency key; defaults to `name` during validation
    #[serde(default)]
    pub operation_id: String,
    #[serde(default, deserialize_with = "one_or_many")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub phase: Phase,
    #[serde(default)]
    pub request: RequestSpec,
    #[serde(default)]
    pub response: ExpectedResponse,
    /// Milliseconds to wait before sending
    #[serde(default)]
    pub delay: Option<u64>,
    /// Extra sequential runs
    #[serde(default)]
    pub repeat: u32,
    /// Extra parallel duplicate runs
    #[serde(default)]
    pub bombard: u32,
    #[serde(default)]
    pub skip: bool,
    #[serde(default)]
    pub focus: bool,
    #[serde(default)]
    pub rps: Option<f64>,
    /// Per-test timeout in milliseconds
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub order: Option<u64>,
    #[serde(default)]
    pub suite_name: Option<String>,
    #[serde(skip)]
    pub hooks: TestHooks,
}

impl TestCase {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Copy every field, overriding the name and, when present, bumping the
    /// order past the source's value by `order_offset`.
    pub fn duplicate(&self, name: String, order_offset: u64) -> Self {
        let mut clone = self.clone();
        clone.name = name;
        clone.order = self.order.map(|order| order + order_offset);
        clone
    }

    /// Expected status, defaulting to 200
    pub fn expected_status(&self) -> u16 {
        self.response.status.unwrap_or(200)
    }

    pub fn is_happy_path(&self) -> bool {
        (200..300).contains(&self.expected_status())
    }

    pub fn has_tag(&self, wanted: &[String]) -> bool {
        self.tags
            .iter()
            .any(|tag| wanted.iter().any(|w| w.eq_ignore_ascii_case(tag)))
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(tag)) => vec![tag],
        Some(OneOrMany::Many(tags)) => tags,
    })
}

/// A named collection of test cases from one source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Suite {
    pub name: String,
    #[serde(default)]
    pub tests: Vec<TestCase>,
    #[serde(default)]
    pub setup: Vec<TestCase>,
    #[serde(default)]
    pub teardown: Vec<TestCase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_path: Option<PathBuf>,
}

impl Suite {
    pub fn new(name: impl Into<String>, tests: Vec<TestCase>) -> Self {
        Self {
            name: name.into(),
            tests,
            ..Default::default()
        }
    }

    /// Setup, main and teardown tests as one list, with phase and suite
    /// name stamped on every test.
    pub fn flatten(&self) -> Vec<TestCase> {
        let stamp = |test: &TestCase, phase: Option<Phase>| {
            let mut test = test.clone();
            if let Some(phase) = phase {
                test.phase = phase;
            }
            if test.suite_name.is_none() {
                test.suite_name = Some(self.name.clone());
            }
            test
        };

        self.setup
            .iter()
            .map(|t| stamp(t, Some(Phase::Setup)))
            .chain(self.tests.iter().map(|t| stamp(t, None)))
            .chain(self.teardown.iter().map(|t| stamp(t, Some(Phase::Teardown))))
            .collect()
    }
}

/// Outcome of executing one test case
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub passed: bool,
    /// Joined assertion failures, or the transport error
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Milliseconds from just after the delay until assertions finished
    pub latency: u64,
    #[serde(default)]
    pub request_id: Option<String>,
    pub test_name: String,
    pub operation_id: String,
    #[serde(default)]
    pub suite_name: Option<String>,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default)]
    pub request: Option<HttpRequest>,
    #[serde(default)]
    pub response: Option<HttpResponse>,
}

/// Why a test did not execute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "operationId", rename_all = "camelCase")]
pub enum SkipReason {
    NotFocused,
    TagMismatch,
    NameMismatch,
    NotHappyPath,
    NotPreviouslyFailing,
    Explicit,
    /// A dependency executed and failed
    DependencyFailed(String),
    /// A dependency was itself skipped at run time
    DependencySkipped(String),
    /// A `dependsOn` entry names no runnable test
    UnresolvedDependency(String),
    /// Never became ready (dependency cycle)
    Unreachable,
    Aborted,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotFocused => write!(f, "not focused"),
            SkipReason::TagMismatch => write!(f, "no matching tag"),
            SkipReason::NameMismatch => write!(f, "name does not match filter"),
            SkipReason::NotHappyPath => write!(f, "not a happy-path test"),
            SkipReason::NotPreviouslyFailing => write!(f, "passed in last snapshot"),
            SkipReason::Explicit => write!(f, "marked skip"),
            SkipReason::DependencyFailed(op) => write!(f, "dependency '{op}' failed"),
            SkipReason::DependencySkipped(op) => write!(f, "dependency '{op}' was skipped"),
            SkipReason::UnresolvedDependency(op) => write!(f, "unknown dependency '{op}'"),
            SkipReason::Unreachable => write!(f, "dependencies never completed"),
            SkipReason::Aborted => write!(f, "run aborted"),
        }
    }
}

/// A test excluded from execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedTest {
    pub name: String,
    pub operation_id: String,
    pub suite_name: Option<String>,
    pub reason: SkipReason,
}

impl SkippedTest {
    pub fn new(test: &TestCase, reason: SkipReason) -> Self {
        Self {
            name: test.name.clone(),
            operation_id: test.operation_id.clone(),
            suite_name: test.suite_name.clone(),
            reason,
        }
    }
}

/// Everything a finished run produced
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    /// Results in completion order
    pub results: Vec<TestResult>,
    pub skipped: Vec<SkippedTest>,
    pub duration_ms: u64,
    /// Snapshot file the results were merged into, when that succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_saved: Option<PathBuf>,
}

impl RunReport {
    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.passed()
    }

    /// True iff every executed test passed; skipped tests do not count.
    pub fn success(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    pub fn result(&self, name: &str) -> Option<&TestResult> {
        self.results.iter().find(|r| r.test_name == name)
    }

    pub fn is_skipped(&self, name: &str) -> bool {
        self.skipped.iter().any(|s| s.name == name)
    }

    /// Results grouped by suite name, in first-seen order
    pub fn by_suite(&self) -> Vec<(String, Vec<&TestResult>)> {
        let mut groups: Vec<(String, Vec<&TestResult>)> = Vec::new();
        for result in &self.results {
            let suite = result.suite_name.clone().unwrap_or_else(|| "unknown".to_string());
            match groups.iter_mut().find(|(name, _)| *name == suite) {
                Some((_, items)) => items.push(result),
                None => groups.push((suite, vec![result])),
            }
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_test_case() {
        let json = r#"{
            "name": "Create comment",
            "operationId": "createComment",
            "endpoint": "/comments",
            "tags": "posts",
            "dependsOn": ["fetchPost1"],
            "request": {
                "method": "POST",
                "headers": {"Content-Type": "application/json"},
                "body": {"postId": 1},
                "credentials": "include"
            },
            "response": {
                "status": 201,
                "headers": {"x-request-id": true, "content-type": "application/json"},
                "json": {"postId": 1}
            },
            "repeat": 2
        }"#;
        let test: TestCase = serde_json::from_str(json).unwrap();
        assert_eq!(test.operation_id, "createComment");
        assert_eq!(test.tags, vec!["posts".to_string()]);
        assert_eq!(test.phase, Phase::Main);
        assert_eq!(test.request.credentials, Some(Credentials::Include));
        assert_eq!(
            test.response.headers.get("x-request-id"),
            Some(&HeaderExpectation::Present(true))
        );
        assert_eq!(test.expected_status(), 201);
        assert_eq!(test.repeat, 2);
    }

    #[test]
    fn test_tags_accept_list_and_match_case_insensitively() {
        let test: TestCase =
            serde_json::from_str(r#"{"name": "t", "endpoint": "/", "tags": ["Smoke", "auth"]}"#)
                .unwrap();
        assert!(test.has_tag(&["smoke".to_string()]));
        assert!(!test.has_tag(&["posts".to_string()]));
    }

    #[test]
    fn test_duplicate_overrides_name_and_bumps_order() {
        let mut source = TestCase::new("X", "/x");
        source.order = Some(4);
        source.tags = vec!["a".into()];

        let clone = source.duplicate("(Run 2) X".into(), 1);
        assert_eq!(clone.name, "(Run 2) X");
        assert_eq!(clone.order, Some(5));
        assert_eq!(clone.tags, source.tags);
        assert_eq!(clone.endpoint, source.endpoint);

        let unordered = TestCase::new("Y", "/y").duplicate("(Run 2) Y".into(), 1);
        assert_eq!(unordered.order, None);
    }

    #[test]
    fn test_suite_flatten_stamps_phase_and_suite() {
        let mut suite = Suite::new("users", vec![TestCase::new("main", "/m")]);
        suite.setup = vec![TestCase::new("login", "/login")];
        suite.teardown = vec![TestCase::new("logout", "/logout")];

        let tests = suite.flatten();
        let phases: Vec<Phase> = tests.iter().map(|t| t.phase).collect();
        assert_eq!(phases, vec![Phase::Setup, Phase::Main, Phase::Teardown]);
        assert!(tests.iter().all(|t| t.suite_name.as_deref() == Some("users")));
    }

    #[test]
    fn test_happy_path_defaults_to_200() {
        let mut test = TestCase::new("t", "/");
        assert!(test.is_happy_path());
        test.response.status = Some(404);
        assert!(!test.is_happy_path());
    }
}
