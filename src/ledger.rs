//! Reload-then-mutate operations over a node's chain file.
//!
//! No chain is cached between calls: each operation takes the file lock,
//! loads from disk, and the lock guard is dropped on every return path.

use std::path::PathBuf;

use serde_json::Value;
use tracing::info;

use crate::chain::{Chain, ChainFault};
use crate::error::LedgerError;
use crate::model::Block;
use crate::storage::ChainStore;

/// Outcome of [`Ledger::reset`].
#[derive(Debug, Clone)]
pub struct ResetOutcome {
    /// Chain file now holding a fresh genesis chain.
    pub file: PathBuf,
    /// Where the previous file was moved, if there was one.
    pub backup: Option<PathBuf>,
}

pub struct Ledger {
    store: ChainStore,
}

impl Ledger {
    pub fn new(store: ChainStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &ChainStore {
        &self.store
    }

    /// Current chain, read under the lock.
    pub async fn chain(&self) -> Result<Chain, LedgerError> {
        let lock = self.store.lock().await?;
        self.store.load(&lock).await
    }

    /// Sign and persist a new block carrying `data`.
    pub async fn append(&self, data: Value) -> Result<Block, LedgerError> {
        let lock = self.store.lock().await?;
        let mut chain = self.store.load(&lock).await?;
        let keys = self.store.keys();
        let block = chain.add_block(data, &keys.signing, &keys.verifying)?;
        self.store.save(&chain, &lock).await?;
        info!(index = block.index, hash = %block.hash, "block added");
        Ok(block)
    }

    /// Store a block pushed by a peer if it extends the local tip.
    pub async fn accept_peer_block(&self, block: Block) -> Result<(), LedgerError> {
        let lock = self.store.lock().await?;
        let mut chain = self.store.load(&lock).await?;
        let index = block.index;
        chain.extend_from_peer(block)?;
        self.store.save(&chain, &lock).await?;
        info!(index, length = chain.len(), "synced block from peer");
        Ok(())
    }

    /// Validate the stored chain; `Some(fault)` names the first failing block.
    pub async fn validate(&self) -> Result<Option<ChainFault>, LedgerError> {
        let chain = self.chain().await?;
        Ok(chain.validate(&self.store.keys().verifying).err())
    }

    /// Archive the current file and start over from a fresh genesis chain.
    pub async fn reset(&self) -> Result<ResetOutcome, LedgerError> {
        let lock = self.store.lock().await?;
        let backup = self.store.archive(&lock).await?;
        let chain = Chain::new_genesis(&self.store.keys().signing)?;
        self.store.save(&chain, &lock).await?;
        info!(file = %self.store.path().display(), "chain reset");
        Ok(ResetOutcome {
            file: self.store.path().to_path_buf(),
            backup,
        })
    }
}
