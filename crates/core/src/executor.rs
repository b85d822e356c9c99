//! Single test execution
//!
//! Builds the request, runs the test's hooks, waits for a rate-limiter slot,
//! sends through the plugin fetch chain and asserts on the response.
//! Transport failures become failed results; hook and plugin failures are
//! returned as errors and abort the run.

use std::time::Instant;
use tracing::{debug, warn};

use crate::assert::assess;
use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::hooks::PostTestContext;
use crate::http::HttpRequest;
use crate::target::logs_for_request;
use crate::types::{Credentials, TestCase, TestResult};

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Build the outbound request from the test's request spec.
pub fn build_request(test: &TestCase, session_cookie: Option<&str>) -> HttpRequest {
    let method = test.request.method.as_deref().unwrap_or("GET");
    let mut request = HttpRequest::new(method.to_ascii_uppercase(), test.endpoint.clone());
    request.headers = test.request.headers.clone();
    request.body = test.request.body.clone();

    if test.request.credentials == Some(Credentials::Include) {
        if let Some(cookie) = session_cookie {
            request.set_header("Cookie", cookie);
        }
    }
    request
}

/// Run one test to completion.
pub async fn execute(test: &TestCase, ctx: &RunContext) -> Result<TestResult> {
    if let Some(delay) = test.delay.filter(|ms| *ms > 0) {
        tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
    }

    let started = Instant::now();
    let timeout = ctx.timeout_for(test.timeout);
    let mut request = build_request(test, ctx.state.session_cookie().as_deref());
    let request_id = request.header(REQUEST_ID_HEADER).map(str::to_string);

    if let Some(hook) = &test.hooks.before_send {
        let snapshot = ctx.state.snapshot();
        if let Some(replacement) = hook
            .before_send(request.clone(), &snapshot)
            .await
            .map_err(|e| Error::hook("beforeSend", &test.name, e))?
        {
            request = replacement;
        }
    }

    let mut result = TestResult {
        passed: false,
        error: None,
        warnings: Vec::new(),
        latency: 0,
        request_id: request_id.clone(),
        test_name: test.name.clone(),
        operation_id: test.operation_id.clone(),
        suite_name: test.suite_name.clone(),
        timed_out: false,
        request: None,
        response: None,
    };

    if ctx.limiter.acquire().await.is_err() {
        result.error = Some("Run aborted before the request was sent".to_string());
        result.request = Some(request);
        result.latency = started.elapsed().as_millis() as u64;
        return Ok(result);
    }

    let request = ctx.plugins.transform_request(request).await?;
    debug!(test = %test.name, "{} {}", request.method, request.url);

    let response = match ctx.transport.send(&request, timeout).await {
        Ok(response) => response,
        Err(e) => {
            warn!(test = %test.name, "Request failed: {}", e);
            result.timed_out = e.is_timeout();
            result.error = Some(e.to_string());
            result.request = Some(request);
            result.latency = started.elapsed().as_millis() as u64;
            return Ok(result);
        }
    };

    if let Some(cookie) = response.cookies.first() {
        ctx.state.set_session_cookie(cookie.clone());
    }

    if let Some(hook) = &test.hooks.post_test {
        let post_ctx = PostTestContext {
            request_id: request_id.clone(),
            logs: logs_for_request(&ctx.target.logs(), request_id.as_deref()),
        };
        hook.post_test(&response, &ctx.state, &post_ctx)
            .await
            .map_err(|e| Error::hook("postTest", &test.name, e))?;
    }

    let outcome = assess(&test.response, &response, ctx.validator.as_ref());
    result.passed = outcome.passed();
    result.error = outcome.error();
    result.warnings = outcome.warnings;
    result.request = Some(request);
    result.response = Some(response);
    result.latency = started.elapsed().as_millis() as u64;
    Ok(result)
}
