//! Per-test hooks: `beforeSend` and `postTest`

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::http::{HttpRequest, HttpResponse};
use crate::state::{RunState, SharedRunState};
use crate::target::LogEntry;

/// Rewrites the request just before it is sent.
///
/// Receives a detached copy of the run state; returning `None` keeps the
/// request unchanged.
#[async_trait]
pub trait BeforeSend: Send + Sync {
    async fn before_send(&self, request: HttpRequest, state: &RunState)
        -> Result<Option<HttpRequest>>;
}

#[async_trait]
impl<F> BeforeSend for F
where
    F: Fn(HttpRequest, &RunState) -> Result<Option<HttpRequest>> + Send + Sync,
{
    async fn before_send(
        &self,
        request: HttpRequest,
        state: &RunState,
    ) -> Result<Option<HttpRequest>> {
        self(request, state)
    }
}

/// Extra context handed to `postTest`
#[derive(Debug, Clone, Default)]
pub struct PostTestContext {
    pub request_id: Option<String>,
    /// Target server log lines mentioning the request id
    pub logs: Vec<LogEntry>,
}

/// Observes the response after it arrives and before assertions run.
#[async_trait]
pub trait PostTest: Send + Sync {
    async fn post_test(
        &self,
        response: &HttpResponse,
        state: &SharedRunState,
        ctx: &PostTestContext,
    ) -> Result<()>;
}

#[async_trait]
impl<F> PostTest for F
where
    F: Fn(&HttpResponse, &SharedRunState, &PostTestContext) -> Result<()> + Send + Sync,
{
    async fn post_test(
        &self,
        response: &HttpResponse,
        state: &SharedRunState,
        ctx: &PostTestContext,
    ) -> Result<()> {
        self(response, state, ctx)
    }
}

/// Hooks attached to a test case; absent for tests loaded from data files.
#[derive(Clone, Default)]
pub struct TestHooks {
    pub before_send: Option<Arc<dyn BeforeSend>>,
    pub post_test: Option<Arc<dyn PostTest>>,
}

impl TestHooks {
    pub fn before_send(hook: impl BeforeSend + 'static) -> Self {
        Self {
            before_send: Some(Arc::new(hook)),
            post_test: None,
        }
    }

    pub fn post_test(hook: impl PostTest + 'static) -> Self {
        Self {
            before_send: None,
            post_test: Some(Arc::new(hook)),
        }
    }

    pub fn with_post_test(mut self, hook: impl PostTest + 'static) -> Self {
        self.post_test = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for TestHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestHooks")
            .field("before_send", &self.before_send.is_some())
            .field("post_test", &self.post_test.is_some())
            .finish()
    }
}
