// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Diagnostic subcommands that drive the runtime contract directly.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "kubeling")]
#[command(about = "Inspect k3s-in-container nodes through Docker or Podman")]
#[command(version)]
pub struct Cli {
    /// Engine to use: docker, podman, memory or auto (overrides config)
    #[arg(long, global = true)]
    pub runtime: Option<String>,

    /// Engine socket path or unix:// URL (overrides config)
    #[arg(long, global = true)]
    pub socket: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the active engine
    Info {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// List managed nodes
    Nodes {
        /// Only nodes carrying this label (key=value, repeatable)
        #[arg(long = "label", value_parser = parse_label)]
        labels: Vec<(String, String)>,
    },

    /// Print a node's logs
    Logs {
        node: String,

        /// Keep streaming until interrupted
        #[arg(short, long)]
        follow: bool,

        /// Only the last N lines
        #[arg(long)]
        tail: Option<u64>,

        /// Only lines since this RFC 3339 timestamp
        #[arg(long, value_parser = parse_since)]
        since: Option<DateTime<Utc>>,

        /// Prefix each line with its timestamp
        #[arg(short, long)]
        timestamps: bool,
    },

    /// Run a command inside a node
    Exec {
        node: String,

        #[arg(last = true, required = true)]
        cmd: Vec<String>,
    },

    /// Print the kubeconfig written by the server node
    Kubeconfig { node: String },

    /// List locally available images
    Images,
}

fn parse_label(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(format!("expected key=value, got `{s}`")),
    }
}

fn parse_since(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {e}"))
}
