//! Best-effort push of new blocks to peer nodes.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::model::Block;

/// Sends each newly added block to every configured peer's `/sync-block`.
pub struct PeerBroadcaster {
    client: reqwest::Client,
    peers: Vec<String>,
}

impl PeerBroadcaster {
    /// `timeout` bounds each request so a dead peer cannot hold a task open.
    pub fn new(peers: Vec<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, peers })
    }

    pub fn peers(&self) -> &[String] {
        &self.peers
    }

    /// Spawn one independent request per peer and return immediately.
    ///
    /// Failures are logged and dropped; nothing is retried. The handles are
    /// only useful to callers that want to wait for delivery.
    pub fn broadcast(&self, block: &Block) -> Vec<JoinHandle<()>> {
        let block = Arc::new(block.clone());
        self.peers
            .iter()
            .map(|peer| {
                let client = self.client.clone();
                let block = block.clone();
                let peer = peer.clone();
                tokio::spawn(async move { push_block(&client, &peer, &block).await })
            })
            .collect()
    }
}

fn sync_url(peer: &str) -> String {
    format!("{}/sync-block", peer.trim_end_matches('/'))
}

async fn push_block(client: &reqwest::Client, peer: &str, block: &Block) {
    match client.post(sync_url(peer)).json(block).send().await {
        Ok(resp) if resp.status().is_success() => {
            debug!(peer, index = block.index, "peer accepted block");
        }
        Ok(resp) => {
            warn!(peer, index = block.index, status = %resp.status(), "peer rejected block");
        }
        Err(e) => {
            warn!(peer, index = block.index, error = %e, "failed to sync with peer");
        }
    }
}
