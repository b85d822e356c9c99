//! End-to-end run orchestration

use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::context::RunContext;
use crate::error::Result;
use crate::filter::{select, FilterOptions};
use crate::scheduler::Scheduler;
use crate::snapshot::merge_into;
use crate::types::{RunReport, Suite};
use crate::validate::validate_tests;

/// Drives one run: prepare, validate, start the target, select, schedule,
/// snapshot and tear down.
pub struct Runner {
    ctx: Arc<RunContext>,
    cancel: CancellationToken,
}

impl Runner {
    pub fn new(ctx: RunContext) -> Self {
        Self {
            ctx: Arc::new(ctx),
            cancel: CancellationToken::new(),
        }
    }

    /// Token that aborts the run when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn context(&self) -> &Arc<RunContext> {
        &self.ctx
    }

    /// Execute `suites`. Shared resources are released whatever the outcome.
    pub async fn run(&self, suites: Vec<Suite>) -> Result<RunReport> {
        let outcome = self.run_inner(suites).await;
        self.ctx.shutdown().await;
        if let Err(e) = &outcome {
            error!("Run failed: {}", e);
        }
        outcome
    }

    async fn run_inner(&self, suites: Vec<Suite>) -> Result<RunReport> {
        let ctx = &self.ctx;
        let suites = ctx.plugins.prepare_suites(suites).await?;
        let mut tests: Vec<_> = suites.iter().flat_map(Suite::flatten).collect();
        validate_tests(&mut tests)?;
        info!("Loaded {} tests from {} suites", tests.len(), suites.len());

        ctx.target.start().await?;

        let selection = select(tests, &FilterOptions::from(&ctx.config))?;
        ctx.plugins.run_start().await?;

        let started = Instant::now();
        let outcome = Scheduler::build(selection.tests)
            .run(ctx.clone(), self.cancel.clone())
            .await?;

        let mut skipped = selection.skipped;
        skipped.extend(outcome.skipped);
        let mut report = RunReport {
            results: outcome.results,
            skipped,
            duration_ms: started.elapsed().as_millis() as u64,
            snapshot_saved: None,
        };
        info!(
            "Run finished: {} passed, {} failed, {} skipped",
            report.passed(),
            report.failed(),
            report.skipped.len()
        );

        if let Some(path) = &ctx.config.snapshot_file {
            match merge_into(path, &report.results) {
                Ok(_) => report.snapshot_saved = Some(path.clone()),
                Err(e) => warn!("Failed to write snapshot {}: {}", path.display(), e),
            }
        }

        ctx.plugins.run_end(&report).await?;
        Ok(report)
    }
}
