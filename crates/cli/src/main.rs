//! Spectest CLI - Main Entry Point
//!
//! Exit status is 0 when every executed test passed, 1 when any test
//! failed and 2 when the run could not complete.

use clap::Parser;
use spectest_cli::{
    discover_suite_paths, load_suites, Args, CliConfig, ConsoleReporter, CoreLoader,
    ServerManager,
};
use spectest_core::{Plugin, PluginHost, RunContext, Runner, TargetProcess};
use std::sync::Arc;
use tracing::{debug, error, warn};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    match run(args).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(2);
        }
    }
}

async fn run(args: Args) -> anyhow::Result<bool> {
    let cwd = std::env::current_dir()?;
    let config = CliConfig::load(&args, &cwd)?;

    let server: Arc<dyn TargetProcess> = Arc::new(ServerManager::new(&config)?);
    let reporter =
        ConsoleReporter::new(config.base_url.clone(), config.verbose).with_target(server.clone());

    // The core loader goes first so a later plugin's loader replaces it.
    let plugins: Vec<Arc<dyn Plugin>> = vec![Arc::new(CoreLoader), Arc::new(reporter)];
    let mut host = PluginHost::new(plugins);
    host.setup().await?;
    debug!("Plugins: {}", host.plugin_names().join(", "));

    let paths = discover_suite_paths(&config)?;
    let suites = load_suites(&host, &paths).await?;
    if suites.is_empty() {
        warn!("No suites found in {}", config.test_dir.display());
    }

    let ctx = RunContext::new(config.run_config(), host)?.with_target(server);
    let runner = Runner::new(ctx);

    let cancel = runner.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, aborting run");
            cancel.cancel();
        }
    });

    let report = runner.run(suites).await?;
    Ok(report.success())
}
