//! polis-admin - bootstrap a Polis core from config and seed, then report.
//!
//! Loads the configuration and seed, builds the hierarchy, audits every
//! stored count and prints the core status as JSON.

use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use polis::{Polis, PolisConfig, Seed};

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "polis-admin", version, about = "Bootstrap and inspect a Polis core")]
struct Args {
    /// Path to the YAML configuration
    #[arg(long, env = "POLIS_CONFIG")]
    config: Option<PathBuf>,

    /// Path to the YAML seed
    #[arg(long, env = "POLIS_SEED")]
    seed: Option<PathBuf>,

    /// Log level, overrides the configured one
    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,

    /// Also print this many recent domain events
    #[arg(long, default_value = "0")]
    events: usize,

    /// Pretty-print the JSON report
    #[arg(long, default_value = "false")]
    pretty: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => PolisConfig::from_file(path)?,
        None => PolisConfig::default(),
    };

    // Initialize tracing/logging
    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.general.log_level.clone());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("polis={log_level},hierarchy={log_level},warn").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!(
        config = ?args.config,
        seed = ?args.seed,
        lock_timeout_ms = config.hierarchy.lock_timeout_ms,
        "Starting polis-admin"
    );

    let polis = Polis::new(config);
    let audit = polis.spawn_audit();

    if let Some(path) = &args.seed {
        let seed = Seed::from_file(path)?;
        let index = seed.apply(&polis).await?;
        info!(
            territories = index.territories.len(),
            nodes = index.nodes.len(),
            persons = index.persons.len(),
            "Seed loaded"
        );
    }

    if let Err(e) = polis.audit_counts().await {
        error!("Count audit failed: {}", e);
        return Err(e.into());
    }

    // Let the audit sink drain before reporting
    tokio::task::yield_now().await;

    let status = polis.status().await?;
    let mut report = serde_json::json!({ "status": status });
    if args.events > 0 {
        report["recent_events"] = serde_json::to_value(polis.recent_events(args.events).await)?;
    }

    let output = if args.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{output}");

    audit.abort();
    Ok(())
}
