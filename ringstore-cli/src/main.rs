//! Command-line client for a ringstore peer.
//!
//! Talks to one node and prints the decoded JSON response. When a value
//! is omitted on `insert`/`delete`, the client substitutes its own
//! `host:port` so the stored value doubles as an uploader tag.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use ringstore_sdk::client;
use ringstore_sdk::message::{PutValue, Request};

#[derive(Parser)]
#[command(name = "ringstore-cli", about = "Talk to a ringstore peer")]
struct Cli {
    /// Node host.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Node port.
    #[arg(long, default_value_t = 5000)]
    port: u16,

    /// Suppress response output (for benchmark runs).
    #[arg(long)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Insert a value under a key.
    Insert {
        key: String,
        /// Defaults to `<host>:<port>` (uploader tag).
        value: Option<String>,
    },
    /// Look a key up. `*` dumps every peer's store.
    Query { key: String },
    /// Remove a value from a key's set.
    Delete {
        key: String,
        /// Defaults to `<host>:<port>` (uploader tag).
        value: Option<String>,
    },
    /// Ask the node to gracefully leave the ring.
    Depart,
    /// Walk the ring and print every peer's summary.
    Overlay,
    /// Print the node's id, pointers, and store.
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let tag = format!("{}:{}", cli.host, cli.port);

    let request = match cli.command {
        Command::Insert { key, value } => Request::Put {
            key,
            value: PutValue::One(value.unwrap_or_else(|| tag.clone())),
            start_node_id: None,
            ttl: None,
        },
        Command::Query { key } => Request::Get { key, start_node_id: None, ttl: None },
        Command::Delete { key, value } => Request::Delete {
            key: Some(key),
            value: Some(value.unwrap_or_else(|| tag.clone())),
            start_node_id: None,
            ttl: None,
        },
        Command::Depart => Request::Depart,
        Command::Overlay => Request::GetOverlay { start_node_id: None },
        Command::Info => Request::GetNodeInfo,
    };

    let response: serde_json::Value = client::call(&cli.host, cli.port, &request)
        .await
        .with_context(|| format!("talking to {tag}"))?;

    if !cli.quiet {
        println!("{}", serde_json::to_string_pretty(&response)?);
    }
    Ok(())
}
