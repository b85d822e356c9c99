//! Spectest CLI
//!
//! Configuration layering, suite discovery, target-server management and
//! console reporting around the `spectest-core` engine.

pub mod config;
pub mod loader;
pub mod reporter;
pub mod server;
pub mod user_agent;

pub use config::{Args, CliConfig, RunningServer};
pub use loader::{discover_suite_paths, load_suites, CoreLoader};
pub use reporter::ConsoleReporter;
pub use server::ServerManager;
