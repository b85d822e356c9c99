//! Spectest Core Library
//!
//! Orchestration engine for declarative HTTP API tests: selection, dependency
//! scheduling, rate-limited execution, assertions, plugins and snapshots.

pub mod assert;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod filter;
pub mod helpers;
pub mod hooks;
pub mod http;
pub mod plugin;
pub mod rate_limiter;
pub mod runner;
pub mod scheduler;
pub mod schema;
pub mod snapshot;
pub mod state;
pub mod target;
pub mod types;
pub mod validate;

// Re-export commonly used types
pub use config::RunConfig;
pub use context::RunContext;
pub use error::{Error, Result};
pub use filter::{select, FilterOptions, Selection};
pub use hooks::{BeforeSend, PostTest, PostTestContext, TestHooks};
pub use http::{HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportError};
pub use plugin::{Plugin, PluginContext, PluginHost};
pub use rate_limiter::RateLimiter;
pub use runner::Runner;
pub use scheduler::{RunOutcome, Scheduler};
pub use schema::{JsonSchemaValidator, NoSchemaValidator, SchemaValidator, Validation};
pub use snapshot::{Snapshot, SnapshotCase};
pub use state::{RunState, SharedRunState};
pub use target::{ExternalTarget, LogEntry, LogStream, TargetProcess};
pub use types::*;
pub use validate::validate_tests;

/// Spectest version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
