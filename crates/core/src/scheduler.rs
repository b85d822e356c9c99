//! Dependency-driven test scheduler
//!
//! Tests form a DAG through `depends_on` (operation ids). Every node whose
//! dependencies have all passed is launched as its own task the moment it
//! becomes ready; there is no fixed worker pool. All bookkeeping happens on
//! the driving task, so node state needs no locking.
//!
//! Repeat and bombard clones share their source's operation id; a dependent
//! of that id waits for every clone.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::executor::execute;
use crate::types::{SkipReason, SkippedTest, TestCase, TestResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Pending,
    Running,
    Passed,
    Failed,
    Skipped,
}

impl NodeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeState::Passed | NodeState::Failed | NodeState::Skipped)
    }
}

/// A test plus the scheduler's runtime bookkeeping
#[derive(Debug)]
pub struct SchedulerNode {
    pub test: Arc<TestCase>,
    /// Indices of nodes waiting on this one
    pub dependents: Vec<usize>,
    pub unresolved_dependencies: usize,
    pub runtime_skip: bool,
    pub state: NodeState,
}

/// What the scheduler produced
#[derive(Debug, Default)]
pub struct RunOutcome {
    /// Results in completion order
    pub results: Vec<TestResult>,
    /// Runtime skips in the order they were decided
    pub skipped: Vec<SkippedTest>,
}

pub struct Scheduler {
    nodes: Vec<SchedulerNode>,
    skipped: Vec<SkippedTest>,
}

impl Scheduler {
    /// Build the graph. Unresolved dependencies skip the referencing test
    /// and everything downstream of it.
    pub fn build(tests: Vec<TestCase>) -> Self {
        let mut by_operation: HashMap<String, Vec<usize>> = HashMap::new();
        for (index, test) in tests.iter().enumerate() {
            by_operation
                .entry(test.operation_id.clone())
                .or_default()
                .push(index);
        }

        let mut scheduler = Self {
            nodes: tests
                .into_iter()
                .map(|test| SchedulerNode {
                    test: Arc::new(test),
                    dependents: Vec::new(),
                    unresolved_dependencies: 0,
                    runtime_skip: false,
                    state: NodeState::Pending,
                })
                .collect(),
            skipped: Vec::new(),
        };

        let mut unresolved = Vec::new();
        for index in 0..scheduler.nodes.len() {
            let depends_on = scheduler.nodes[index].test.depends_on.clone();
            let mut seen = Vec::with_capacity(depends_on.len());
            for dependency in depends_on {
                if seen.contains(&dependency) {
                    continue;
                }
                match by_operation.get(&dependency) {
                    Some(providers) => {
                        for &provider in providers {
                            scheduler.nodes[provider].dependents.push(index);
                            scheduler.nodes[index].unresolved_dependencies += 1;
                        }
                    }
                    None => {
                        warn!(
                            "Invalid dependency '{}' of test '{}'",
                            dependency, scheduler.nodes[index].test.name
                        );
                        unresolved.push((index, dependency.clone()));
                    }
                }
                seen.push(dependency);
            }
        }

        for (index, dependency) in unresolved {
            if scheduler.nodes[index].state == NodeState::Pending {
                scheduler.skip(index, SkipReason::UnresolvedDependency(dependency));
                scheduler.skip_dependents(index);
            }
        }

        scheduler
    }

    pub fn nodes(&self) -> &[SchedulerNode] {
        &self.nodes
    }

    fn skip(&mut self, index: usize, reason: SkipReason) {
        let node = &mut self.nodes[index];
        node.runtime_skip = true;
        node.state = NodeState::Skipped;
        debug!("Skipping '{}': {}", node.test.name, reason);
        self.skipped.push(SkippedTest::new(&node.test, reason));
    }

    /// Force every pending descendant of `index` into `Skipped`.
    fn skip_dependents(&mut self, index: usize) {
        let mut stack = vec![index];
        while let Some(parent) = stack.pop() {
            let parent_op = self.nodes[parent].test.operation_id.clone();
            let reason = if self.nodes[parent].state == NodeState::Failed {
                SkipReason::DependencyFailed(parent_op)
            } else {
                SkipReason::DependencySkipped(parent_op)
            };
            for dependent in self.nodes[parent].dependents.clone() {
                if self.nodes[dependent].state == NodeState::Pending {
                    self.skip(dependent, reason.clone());
                    stack.push(dependent);
                }
            }
        }
    }

    /// Record a finished node and return the dependents it unblocked.
    fn complete(&mut self, index: usize, result: &TestResult, ctx: &RunContext) -> Vec<usize> {
        if !result.passed {
            self.nodes[index].state = NodeState::Failed;
            self.skip_dependents(index);
            return Vec::new();
        }

        self.nodes[index].state = NodeState::Passed;
        ctx.state
            .record_completed(&result.operation_id, result.response.clone());

        let mut ready = Vec::new();
        for dependent in self.nodes[index].dependents.clone() {
            let node = &mut self.nodes[dependent];
            node.unresolved_dependencies = node.unresolved_dependencies.saturating_sub(1);
            if node.unresolved_dependencies == 0 && node.state == NodeState::Pending {
                ready.push(dependent);
            }
        }
        ready
    }

    fn launch(
        &mut self,
        index: usize,
        tasks: &mut JoinSet<(usize, Result<TestResult>)>,
        ctx: &Arc<RunContext>,
    ) {
        let node = &mut self.nodes[index];
        if node.state != NodeState::Pending || node.runtime_skip {
            return;
        }
        node.state = NodeState::Running;

        let test = node.test.clone();
        let ctx = ctx.clone();
        tasks.spawn(async move { (index, run_node(&test, &ctx).await) });
    }

    /// Drive every reachable node to a terminal state.
    ///
    /// Once `cancel` fires no new node is launched; in-flight ones finish.
    /// A hook or plugin error cancels the run and is returned after the
    /// in-flight tasks have drained.
    pub async fn run(mut self, ctx: Arc<RunContext>, cancel: CancellationToken) -> Result<RunOutcome> {
        let mut tasks = JoinSet::new();
        let mut results = Vec::new();
        let mut failure: Option<Error> = None;

        let initial: Vec<usize> = (0..self.nodes.len())
            .filter(|&i| {
                let node = &self.nodes[i];
                node.state == NodeState::Pending && node.unresolved_dependencies == 0
            })
            .collect();
        if !cancel.is_cancelled() {
            for index in initial {
                self.launch(index, &mut tasks, &ctx);
            }
        }

        while let Some(joined) = tasks.join_next().await {
            let (index, outcome) = match joined {
                Ok(finished) => finished,
                Err(e) => {
                    cancel.cancel();
                    failure.get_or_insert(Error::Internal(format!("test task failed: {e}")));
                    continue;
                }
            };

            match outcome {
                Ok(result) => {
                    let ready = self.complete(index, &result, &ctx);
                    results.push(result);
                    if !cancel.is_cancelled() {
                        for dependent in ready {
                            self.launch(dependent, &mut tasks, &ctx);
                        }
                    }
                }
                Err(e) => {
                    self.nodes[index].state = NodeState::Failed;
                    cancel.cancel();
                    failure.get_or_insert(e);
                }
            }
        }

        if let Some(e) = failure {
            return Err(e);
        }

        let leftover_reason = if cancel.is_cancelled() {
            SkipReason::Aborted
        } else {
            SkipReason::Unreachable
        };
        for index in 0..self.nodes.len() {
            if self.nodes[index].state == NodeState::Pending {
                self.skip(index, leftover_reason.clone());
            }
        }
        if cancel.is_cancelled() {
            info!("Run aborted; {} tests were not started", self.pending_after_abort());
        }

        Ok(RunOutcome {
            results,
            skipped: self.skipped,
        })
    }

    fn pending_after_abort(&self) -> usize {
        self.skipped
            .iter()
            .filter(|s| s.reason == SkipReason::Aborted)
            .count()
    }
}

async fn run_node(test: &TestCase, ctx: &RunContext) -> Result<TestResult> {
    ctx.plugins.test_start(test).await?;
    let result = execute(test, ctx).await?;
    ctx.plugins.test_end(test, &result).await?;
    Ok(result)
}
