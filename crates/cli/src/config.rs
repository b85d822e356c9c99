//! Layered CLI configuration
//!
//! Built-in defaults, then `spectest.toml` in the working directory, then the
//! file named by `--config`, then command-line flags. Each layer only
//! overrides the keys it sets.

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use spectest_core::config::DEFAULT_TIMEOUT_MS;
use spectest_core::RunConfig;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::{loader, user_agent};

/// Project config file picked up from the working directory
pub const PROJECT_CONFIG_FILE: &str = "spectest.toml";

/// What to do when something already answers on the base URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunningServer {
    #[default]
    Reuse,
    Fail,
    Kill,
}

/// Spectest - declarative HTTP API test runner
#[derive(Parser, Debug, Default)]
#[command(name = "spectest")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Run a single suite file instead of discovering suites
    pub suite_file: Option<PathBuf>,

    /// Config file (TOML, YAML or JSON)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Base URL of the API under test
    #[arg(long, env = "SPECTEST_BASE_URL")]
    pub base_url: Option<String>,

    /// Directory searched for suite files
    #[arg(long)]
    pub test_dir: Option<PathBuf>,

    /// Regex matched against suite file names
    #[arg(long)]
    pub file_pattern: Option<String>,

    /// Command that starts the server under test
    #[arg(long)]
    pub start_cmd: Option<String>,

    /// Command run once before the server is started
    #[arg(long)]
    pub build_cmd: Option<String>,

    /// Policy when a server is already running
    #[arg(long, value_enum)]
    pub running_server: Option<RunningServer>,

    /// Only run tests carrying one of these tags
    #[arg(long, value_delimiter = ',')]
    pub tags: Option<Vec<String>>,

    /// Requests per second (0 = unlimited)
    #[arg(long)]
    pub rps: Option<f64>,

    /// Request timeout in milliseconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Snapshot file to read failures from and merge results into
    #[arg(long)]
    pub snapshot: Option<PathBuf>,

    /// Shuffle the test order
    #[arg(long)]
    pub randomize: bool,

    /// Seed for --randomize
    #[arg(long)]
    pub seed: Option<u64>,

    /// Only run happy-path tests
    #[arg(long)]
    pub happy: bool,

    /// `happy`, `failures`, or a name pattern
    #[arg(long)]
    pub filter: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// User-agent preset name or literal string
    #[arg(long, visible_alias = "ua")]
    pub user_agent: Option<String>,

    /// HTTP proxy URL
    #[arg(long)]
    pub proxy: Option<String>,
}

/// Fully resolved CLI configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CliConfig {
    pub base_url: String,
    pub test_dir: PathBuf,
    pub file_pattern: String,
    pub start_cmd: Option<String>,
    pub build_cmd: Option<String>,
    pub running_server: RunningServer,
    pub startup_timeout_ms: u64,
    pub tags: Vec<String>,
    pub rps: Option<f64>,
    pub timeout: u64,
    pub snapshot_file: Option<PathBuf>,
    pub randomize: bool,
    pub seed: Option<u64>,
    pub happy: bool,
    pub filter: Option<String>,
    pub verbose: bool,
    pub user_agent: String,
    pub proxy: Option<String>,
    pub suite_file: Option<PathBuf>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            test_dir: PathBuf::from("./spec"),
            file_pattern: loader::SUITE_FILE_FILTER.to_string(),
            start_cmd: None,
            build_cmd: None,
            running_server: RunningServer::Reuse,
            startup_timeout_ms: 30_000,
            tags: Vec::new(),
            rps: None,
            timeout: DEFAULT_TIMEOUT_MS,
            snapshot_file: None,
            randomize: false,
            seed: None,
            happy: false,
            filter: None,
            verbose: false,
            user_agent: user_agent::DEFAULT_PRESET.to_string(),
            proxy: None,
            suite_file: None,
        }
    }
}

impl CliConfig {
    /// Resolve every layer for an invocation run from `cwd`.
    pub fn load(args: &Args, cwd: &Path) -> Result<Self> {
        let mut merged = serde_json::to_value(Self::default())?;

        let project = cwd.join(PROJECT_CONFIG_FILE);
        if project.exists() {
            debug!("Loading project config from {}", project.display());
            overlay(&mut merged, read_file(&project)?);
        }

        if let Some(path) = &args.config {
            let path = if path.is_absolute() {
                path.clone()
            } else {
                cwd.join(path)
            };
            debug!("Loading config from {}", path.display());
            overlay(&mut merged, read_file(&path)?);
        }

        let mut config: Self =
            serde_json::from_value(merged).context("Invalid configuration values")?;
        config.apply_args(args);
        Ok(config)
    }

    fn apply_args(&mut self, args: &Args) {
        if let Some(v) = &args.suite_file {
            self.suite_file = Some(v.clone());
        }
        if let Some(v) = &args.base_url {
            self.base_url = v.clone();
        }
        if let Some(v) = &args.test_dir {
            self.test_dir = v.clone();
        }
        if let Some(v) = &args.file_pattern {
            self.file_pattern = v.clone();
        }
        if let Some(v) = &args.start_cmd {
            self.start_cmd = Some(v.clone());
        }
        if let Some(v) = &args.build_cmd {
            self.build_cmd = Some(v.clone());
        }
        if let Some(v) = args.running_server {
            self.running_server = v;
        }
        if let Some(tags) = &args.tags {
            self.tags = tags
                .iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
        }
        if args.rps.is_some() {
            self.rps = args.rps;
        }
        if let Some(v) = args.timeout {
            self.timeout = v;
        }
        if let Some(v) = &args.snapshot {
            self.snapshot_file = Some(v.clone());
        }
        if args.seed.is_some() {
            self.seed = args.seed;
        }
        if let Some(v) = &args.filter {
            self.filter = Some(v.clone());
        }
        if let Some(v) = &args.user_agent {
            self.user_agent = v.clone();
        }
        if let Some(v) = &args.proxy {
            self.proxy = Some(v.clone());
        }
        self.randomize |= args.randomize;
        self.happy |= args.happy;
        self.verbose |= args.verbose;
    }

    /// Engine settings for this invocation
    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            base_url: self.base_url.clone(),
            timeout_ms: self.timeout,
            rps: self.rps,
            tags: self.tags.clone(),
            filter: self.filter.clone(),
            happy: self.happy,
            randomize: self.randomize,
            seed: self.seed,
            snapshot_file: self.snapshot_file.clone(),
            user_agent: Some(user_agent::resolve(Some(&self.user_agent))),
            proxy: self.proxy.clone(),
        }
    }
}

/// Parse a config file by extension into a JSON object.
fn read_file(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;

    let value: Value = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str(&content)
            .with_context(|| format!("Invalid TOML in {}", path.display()))?,
        Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid YAML in {}", path.display()))?,
        Some("json") => serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON in {}", path.display()))?,
        _ => bail!("Unsupported config file type: {}", path.display()),
    };

    if !value.is_object() {
        bail!("Config file {} must contain a table of settings", path.display());
    }
    Ok(value)
}

/// Copy every key of `layer` over `base`.
fn overlay(base: &mut Value, layer: Value) {
    if let (Value::Object(base), Value::Object(layer)) = (base, layer) {
        for (key, value) in layer {
            base.insert(key, value);
        }
    }
}
