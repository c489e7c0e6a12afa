//! Node configuration, parsed from the command line.

use clap::{Parser, ValueEnum};

/// How cross-peer effects are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Consistency {
    /// Every hop waits for its successor's ack before acking its caller.
    Strong,
    /// Writes and membership updates are fire-and-forget; reads stay
    /// synchronous and may observe any applied prefix.
    Eventual,
}

impl std::fmt::Display for Consistency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Consistency::Strong => "strong",
            Consistency::Eventual => "eventual",
        })
    }
}

/// Command-line configuration for one peer.
#[derive(Debug, Clone, Parser)]
#[command(name = "ringstore-server", about = "Chord-style key-value store peer")]
pub struct NodeConfig {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on. 0 picks an ephemeral port.
    #[arg(long, default_value_t = 5000)]
    pub port: u16,

    /// Host of an existing peer to join through. Omit to start a new ring.
    #[arg(long)]
    pub bootstrap_host: Option<String>,

    /// Port of the bootstrap peer.
    #[arg(long)]
    pub bootstrap_port: Option<u16>,

    /// Number of copies of each value (primary included). 0 or 1 disables
    /// replication.
    #[arg(long, default_value_t = 3)]
    pub replication_factor: u32,

    /// Replication consistency mode.
    #[arg(long, value_enum, default_value_t = Consistency::Strong)]
    pub consistency: Consistency,

    /// Directory for per-node log files (`<dir>/<port>.log`). Logs go to
    /// stderr when unset.
    #[arg(long)]
    pub log_dir: Option<String>,
}

impl NodeConfig {
    pub fn bootstrap(&self) -> Option<(String, u16)> {
        match (&self.bootstrap_host, self.bootstrap_port) {
            (Some(host), Some(port)) => Some((host.clone(), port)),
            _ => None,
        }
    }
}
