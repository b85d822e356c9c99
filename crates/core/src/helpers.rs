//! Authoring helpers for test lists written in Rust

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;

use crate::error::Result;
use crate::hooks::{BeforeSend, PostTest, PostTestContext};
use crate::http::{HttpRequest, HttpResponse};
use crate::state::{RunState, SharedRunState};
use crate::types::TestCase;

/// `beforeSend` hooks applied in sequence, each seeing the previous output
pub struct ComposedBeforeSend {
    hooks: Vec<Arc<dyn BeforeSend>>,
}

#[async_trait]
impl BeforeSend for ComposedBeforeSend {
    async fn before_send(
        &self,
        request: HttpRequest,
        state: &RunState,
    ) -> Result<Option<HttpRequest>> {
        let mut current = request;
        for hook in &self.hooks {
            if let Some(next) = hook.before_send(current.clone(), state).await? {
                current = next;
            }
        }
        Ok(Some(current))
    }
}

pub fn compose_before_send(hooks: Vec<Arc<dyn BeforeSend>>) -> ComposedBeforeSend {
    ComposedBeforeSend { hooks }
}

/// `postTest` hooks run concurrently; the first error wins
pub struct ComposedPostTest {
    hooks: Vec<Arc<dyn PostTest>>,
}

#[async_trait]
impl PostTest for ComposedPostTest {
    async fn post_test(
        &self,
        response: &HttpResponse,
        state: &SharedRunState,
        ctx: &PostTestContext,
    ) -> Result<()> {
        let outcomes = join_all(
            self.hooks
                .iter()
                .map(|hook| hook.post_test(response, state, ctx)),
        )
        .await;
        outcomes.into_iter().collect()
    }
}

pub fn compose_post_test(hooks: Vec<Arc<dyn PostTest>>) -> ComposedPostTest {
    ComposedPostTest { hooks }
}

pub fn delay(mut tests: Vec<TestCase>, delay_ms: u64) -> Vec<TestCase> {
    tests.iter_mut().for_each(|t| t.delay = Some(delay_ms));
    tests
}

pub fn focus(mut tests: Vec<TestCase>) -> Vec<TestCase> {
    tests.iter_mut().for_each(|t| t.focus = true);
    tests
}

pub fn repeat(mut tests: Vec<TestCase>, count: u32) -> Vec<TestCase> {
    tests.iter_mut().for_each(|t| t.repeat = count);
    tests
}

pub fn bombard(mut tests: Vec<TestCase>, count: u32) -> Vec<TestCase> {
    tests.iter_mut().for_each(|t| t.bombard = count);
    tests
}

pub fn skip(mut tests: Vec<TestCase>) -> Vec<TestCase> {
    tests.iter_mut().for_each(|t| t.skip = true);
    tests
}

/// Assign strictly increasing `order` values, keeping predefined ones that
/// already continue the sequence.
pub fn seq(mut tests: Vec<TestCase>) -> Vec<TestCase> {
    let mut iter = tests.iter_mut();
    let Some(first) = iter.next() else {
        return tests;
    };
    let mut last = *first.order.get_or_insert(0);

    for test in iter {
        match test.order {
            Some(order) if order > last => last = order,
            _ => {
                last += 1;
                test.order = Some(last);
            }
        }
    }
    tests
}
