//! Engine-facing run settings

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Default request timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Settings consumed by the engine for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RunConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    /// Requests per second; `None` or 0 disables limiting
    pub rps: Option<f64>,
    pub tags: Vec<String>,
    /// `happy`, `failures`, or a case-insensitive name pattern
    pub filter: Option<String>,
    pub happy: bool,
    pub randomize: bool,
    pub seed: Option<u64>,
    pub snapshot_file: Option<PathBuf>,
    pub user_agent: Option<String>,
    pub proxy: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            rps: None,
            tags: Vec::new(),
            filter: None,
            happy: false,
            randomize: false,
            seed: None,
            snapshot_file: None,
            user_agent: None,
            proxy: None,
        }
    }
}

impl RunConfig {
    /// Reject settings that would make the run meaningless.
    pub fn validate(&self) -> Result<()> {
        if let Some(rps) = self.rps {
            if !rps.is_finite() || rps < 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "rps must be a finite number >= 0, got {rps}"
                )));
            }
        }
        if self.timeout_ms == 0 {
            return Err(Error::InvalidConfig("timeout must be greater than 0".into()));
        }
        if self.base_url.trim().is_empty() {
            return Err(Error::InvalidConfig("base URL must not be empty".into()));
        }
        Ok(())
    }
}
