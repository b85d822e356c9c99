//! Mutable state shared by the tests of one run

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::http::HttpResponse;

/// Response memo of a test that passed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletedCase {
    pub response: Option<HttpResponse>,
}

/// Per-run record. Hooks only ever see clones of it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    /// Last `Set-Cookie` value seen
    pub session_cookie: Option<String>,
    /// Last passing response per operationId
    pub completed_cases: BTreeMap<String, CompletedCase>,
    /// Fields stored by `postTest` hooks
    #[serde(flatten)]
    pub memo: Map<String, Value>,
}

impl RunState {
    /// Body of the last passing response of `operation_id`
    pub fn completed_body(&self, operation_id: &str) -> Option<&Value> {
        self.completed_cases
            .get(operation_id)
            .and_then(|case| case.response.as_ref())
            .map(|response| &response.body)
    }
}

/// Handle to the live [`RunState`].
///
/// Writes to the cookie and completed cases are reserved to the engine;
/// hooks may only read snapshots and store memo fields.
#[derive(Debug, Clone, Default)]
pub struct SharedRunState {
    inner: Arc<RwLock<RunState>>,
}

impl SharedRunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deep copy of the current state
    pub fn snapshot(&self) -> RunState {
        self.inner.read().clone()
    }

    pub fn session_cookie(&self) -> Option<String> {
        self.inner.read().session_cookie.clone()
    }

    /// Store a custom field for later hooks
    pub fn remember(&self, key: impl Into<String>, value: Value) {
        self.inner.write().memo.insert(key.into(), value);
    }

    pub fn recall(&self, key: &str) -> Option<Value> {
        self.inner.read().memo.get(key).cloned()
    }

    pub(crate) fn set_session_cookie(&self, cookie: String) {
        self.inner.write().session_cookie = Some(cookie);
    }

    pub(crate) fn record_completed(&self, operation_id: &str, response: Option<HttpResponse>) {
        self.inner
            .write()
            .completed_cases
            .insert(operation_id.to_string(), CompletedCase { response });
    }
}
