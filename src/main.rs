//! Application entrypoint and state wiring.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use signed_ledger::config::{Cli, Command, NodeArgs};
use signed_ledger::crypto::{self, generate_keypair};
use signed_ledger::ledger::Ledger;
use signed_ledger::storage::ChainStore;
use signed_ledger::sync::PeerBroadcaster;
use signed_ledger::{router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Some(Command::Keygen { out, force }) => keygen(&out, force),
        Some(Command::Serve) | None => serve(cli.node).await,
    }
}

fn keygen(out: &std::path::Path, force: bool) -> Result<()> {
    if out.exists() && !force {
        bail!("{} already exists; pass --force to overwrite", out.display());
    }
    let kp = generate_keypair();
    crypto::save_key(out, &kp.signing).with_context(|| format!("write {}", out.display()))?;
    info!(path = %out.display(), "key generated");
    println!("{}", kp.public_hex());
    Ok(())
}

async fn serve(node: NodeArgs) -> Result<()> {
    // 0) dirs
    std::fs::create_dir_all(&node.data_dir)
        .with_context(|| format!("create data dir {}", node.data_dir.display()))?;

    // 1) key
    let key_path = node.key_path();
    let keypair = crypto::load_or_generate(&key_path)
        .with_context(|| format!("load key {}", key_path.display()))?;
    info!(node = %node.node_name, pubkey = %keypair.public_hex(), "node key ready");

    // 2) chain file: create genesis if missing, report tampering early
    let store = ChainStore::new(node.chain_file(), Arc::new(keypair));
    let ledger = Ledger::new(store);
    match ledger.chain().await {
        Ok(chain) => info!(
            blocks = chain.len(),
            file = %node.chain_file().display(),
            "chain loaded"
        ),
        Err(e) => error!(
            error = %e,
            file = %node.chain_file().display(),
            "chain file unusable; POST /reset archives it and starts over"
        ),
    }

    // 3) peers
    let peers = PeerBroadcaster::new(node.peer_urls(), node.peer_timeout())
        .context("build peer http client")?;
    info!(peers = ?peers.peers(), "peer set configured");

    // 4) router
    let state = AppState {
        ledger: Arc::new(ledger),
        peers: Arc::new(peers),
        node_name: Arc::from(node.node_name.as_str()),
    };
    let app = router(state);

    // 5) serve
    let addr = node.listen_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!(node = %node.node_name, "listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
