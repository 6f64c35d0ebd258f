//! CLI command definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Eirenyx - security and chaos-testing operator
#[derive(Parser, Debug)]
#[command(name = "eirenyx")]
#[command(version)]
#[command(about = "Declarative security and chaos-testing tooling for Kubernetes")]
#[command(
    long_about = "Eirenyx installs Falco, Trivy and Litmus from Tool objects, renders Policy objects into their native artifacts and keeps a PolicyReport per Policy."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the controllers against the current cluster
    Run {
        /// Operator config file (TOML); defaults apply when absent
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Log filter, e.g. `info` or `eirenyx_reconciler=debug`. RUST_LOG wins when set
        #[arg(long, default_value = "info")]
        log_level: String,

        /// Emit logs as JSON lines
        #[arg(long, default_value_t = false)]
        json_logs: bool,
    },

    /// Print the CustomResourceDefinitions as YAML
    Crds,
}
