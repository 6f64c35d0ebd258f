//! # Eirenyx - operator entry point
//!
//! `eirenyx run` starts the Tool, Policy and PolicyReport controllers
//! against the cluster from the ambient kubeconfig or in-cluster service
//! account. `eirenyx crds` prints the object definitions to apply first.
//!
//! ## Shutdown
//!
//! SIGINT cancels a shared token: in-flight chart operations and readiness
//! polls abort, and each controller drains before the process exits.

#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context as _, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use eirenyx::cli::{Cli, Commands};
use eirenyx::config::OperatorConfig;
use eirenyx_cluster::Cluster;
use eirenyx_reconciler::Context;
use eirenyx_tools::HelmCli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            config,
            log_level,
            json_logs,
        } => {
            init_tracing(&log_level, json_logs);
            run(config).await
        }
        Commands::Crds => print_crds(),
    }
}

/// Initialize tracing with `RUST_LOG`, falling back to `default_filter`.
fn init_tracing(default_filter: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let fmt = if json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    tracing_subscriber::registry().with(filter).with(fmt).init();
}

async fn run(config_path: Option<PathBuf>) -> Result<()> {
    let start_time = Instant::now();
    let config = OperatorConfig::load(config_path.as_deref())?;
    info!(field_manager = %config.field_manager, "Eirenyx starting");

    let client = kube::Client::try_default()
        .await
        .context("failed to build a cluster client from kubeconfig or service account")?;

    let cancel = CancellationToken::new();
    let ctx = Arc::new(Context::new(
        Cluster::from_client(client.clone(), &config.field_manager),
        Arc::new(HelmCli::new(config.tools.clone())),
        config.tools,
        config.reconciler,
        cancel.clone(),
    ));

    tokio::spawn(wait_for_shutdown(cancel));
    info!(startup = ?start_time.elapsed(), "Eirenyx running. Press Ctrl+C to stop.");

    eirenyx_reconciler::run(client, ctx).await;
    info!("Eirenyx stopped gracefully");
    Ok(())
}

fn print_crds() -> Result<()> {
    let documents = eirenyx_api::crds()
        .iter()
        .map(serde_yaml::to_string)
        .collect::<Result<Vec<_>, _>>()
        .context("failed to render CRDs")?;
    println!("{}", documents.join("---\n"));
    Ok(())
}

/// Cancel `token` on Ctrl+C.
async fn wait_for_shutdown(token: CancellationToken) {
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C, initiating graceful shutdown");
            token.cancel();
        }
        Err(err) => error!("Failed to listen for shutdown signal: {}", err),
    }
}
