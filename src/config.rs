//! Command-line and environment configuration for a ledger node.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "signed-ledger", version, about = "Signed, hash-chained ledger node")]
pub struct Cli {
    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    #[command(flatten)]
    pub node: NodeArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP node (default).
    Serve,
    /// Generate a node key file and print its public key.
    Keygen {
        /// Where to write the 32-byte seed.
        #[arg(long, default_value = "keys/key.bin")]
        out: PathBuf,
        /// Overwrite an existing key file.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Clone, Args)]
pub struct NodeArgs {
    /// Node identity; also names the chain file.
    #[arg(long, env = "NODE_NAME", default_value = "Node-1")]
    pub node_name: String,

    /// Directory holding the chain file.
    #[arg(long, env = "DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    #[arg(long, env = "HOST", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub host: IpAddr,

    #[arg(long, env = "PORT", default_value_t = 5001)]
    pub port: u16,

    /// Comma-separated peer base URLs, e.g. `http://127.0.0.1:5002`.
    #[arg(long, env = "PEER_NODES", value_delimiter = ',')]
    pub peers: Vec<String>,

    /// Ed25519 seed file; generated on first start when missing.
    /// Defaults to `<data-dir>/key.bin`.
    #[arg(long, env = "KEY_FILE")]
    pub key_file: Option<PathBuf>,

    /// Per-request timeout for pushing blocks to peers.
    #[arg(long, env = "PEER_TIMEOUT_MS", default_value_t = 3000)]
    pub peer_timeout_ms: u64,
}

impl NodeArgs {
    pub fn chain_file(&self) -> PathBuf {
        self.data_dir.join(format!("chain-{}.json", self.node_name))
    }

    pub fn key_path(&self) -> PathBuf {
        self.key_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("key.bin"))
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Configured peers with blank entries dropped.
    pub fn peer_urls(&self) -> Vec<String> {
        self.peers
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn peer_timeout(&self) -> Duration {
        Duration::from_millis(self.peer_timeout_ms)
    }
}
