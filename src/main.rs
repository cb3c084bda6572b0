//! Keygate CLI entry point.
//!
//! Provides `start` for running the guarded store until interrupted and
//! `check` for validating configuration and loading the authorizer once.

#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use keygate::app::Services;
use keygate::authz::loader::AuthorizerRegistry;
use keygate::config::Config;
use keygate::logging;

/// Keygate: access-controlled secure credential store.
#[derive(Parser)]
#[command(name = "keygate", version, about)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Load the authorizer, create the default namespace, and serve until Ctrl-C.
    Start,
    /// Validate configuration, load the authorizer, and print the result.
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Start => handle_start(cli.config).await,
        Command::Check => handle_check(cli.config),
    }
}

async fn handle_start(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = Config::load(config_path.as_deref()).context("failed to load configuration")?;

    let logs_dir = config
        .logging
        .dir
        .clone()
        .or_else(logging::default_logs_dir)
        .context("cannot determine logs directory; set logging.dir")?;
    let _logging_guard = logging::init_production(&logs_dir, &config.logging.level)?;

    info!(version = env!("CARGO_PKG_VERSION"), "keygate starting");

    let registry = AuthorizerRegistry::with_builtins();
    let services = match Services::build(&config, &registry) {
        Ok(services) => services,
        Err(e) => {
            error!(error = %e, "authorizer unavailable, refusing to start");
            return Err(e).context("failed to load authorizer");
        }
    };
    info!(
        extension = services.extension(),
        authorization_enabled = services.enforcer().is_enabled(),
        master = %services.enforcer().master(),
        "services ready"
    );

    let bootstrap = services.spawn_bootstrap(Duration::ZERO);
    services
        .wait_for_default_namespace(&config.bootstrap)
        .await
        .context("default namespace was not created")?;
    match bootstrap.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "bootstrap task reported an error"),
        Err(e) => warn!(error = %e, "bootstrap task panicked"),
    }

    info!("keygate running, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    if let Some(stats) = services.cache_stats() {
        info!(
            entries = stats.entries,
            capacity = stats.capacity,
            hits = stats.hits,
            misses = stats.misses,
            "decision cache at shutdown"
        );
    }
    info!("keygate stopped");
    Ok(())
}

fn handle_check(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    logging::init_cli("warn");

    let config = Config::load(config_path.as_deref()).context("failed to load configuration")?;
    let registry = AuthorizerRegistry::with_builtins();
    let services = Services::build(&config, &registry).context("failed to load authorizer")?;

    let report = serde_json::json!({
        "extension": services.extension(),
        "authorization_enabled": services.enforcer().is_enabled(),
        "master_principal": services.enforcer().master().to_string(),
        "registered_extensions": registry.names(),
        "config": config,
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("failed to render report")?
    );
    Ok(())
}
