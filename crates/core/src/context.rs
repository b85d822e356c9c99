//! Per-run bundle of shared collaborators

use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::config::RunConfig;
use crate::error::Result;
use crate::http::{ReqwestTransport, Transport};
use crate::plugin::PluginHost;
use crate::rate_limiter::RateLimiter;
use crate::schema::{JsonSchemaValidator, SchemaValidator};
use crate::state::SharedRunState;
use crate::target::{ExternalTarget, TargetProcess};

/// User agent sent when none is configured
pub const DEFAULT_USER_AGENT: &str = concat!("spectest/", env!("CARGO_PKG_VERSION"));

/// Everything the scheduler and executor share during one run.
///
/// Created at run start and torn down with [`RunContext::shutdown`].
pub struct RunContext {
    pub config: RunConfig,
    pub state: SharedRunState,
    pub limiter: RateLimiter,
    pub plugins: Arc<PluginHost>,
    pub transport: Arc<dyn Transport>,
    pub validator: Arc<dyn SchemaValidator>,
    pub target: Arc<dyn TargetProcess>,
}

impl RunContext {
    /// Context with a `reqwest` transport and JSON Schema validation.
    ///
    /// Spawns the rate limiter's refill task, so it needs a tokio runtime.
    pub fn new(config: RunConfig, plugins: PluginHost) -> Result<Self> {
        config.validate()?;
        let transport = ReqwestTransport::new(
            &config.base_url,
            config.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT),
            config.proxy.as_deref(),
        )?;
        Ok(Self::with_transport(config, plugins, Arc::new(transport)))
    }

    pub fn with_transport(
        config: RunConfig,
        plugins: PluginHost,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let limiter = RateLimiter::new(config.rps);
        Self {
            config,
            state: SharedRunState::new(),
            limiter,
            plugins: Arc::new(plugins),
            transport,
            validator: Arc::new(JsonSchemaValidator),
            target: Arc::new(ExternalTarget),
        }
    }

    pub fn with_target(mut self, target: Arc<dyn TargetProcess>) -> Self {
        self.target = target;
        self
    }

    /// Timeout for a test, falling back to the run default
    pub fn timeout_for(&self, test_timeout: Option<u64>) -> Duration {
        Duration::from_millis(test_timeout.unwrap_or(self.config.timeout_ms))
    }

    /// Stop the rate limiter and the target process.
    pub async fn shutdown(&self) {
        self.limiter.stop();
        if let Err(e) = self.target.stop().await {
            warn!("Failed to stop target process: {}", e);
        }
    }
}
