//! Chain container, validation and the append / peer-extension rules.

use std::fmt;

use ed25519_dalek::{SigningKey, VerifyingKey};
use serde::Serialize;
use serde_json::Value;

use crate::error::LedgerError;
use crate::model::{now_timestamp, Block};

/// Why a chain failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// Stored hash differs from the recomputed one.
    HashMismatch,
    /// `previousHash` does not point at the preceding block.
    BrokenLink,
    /// Signature missing or not valid for the node key.
    BadSignature,
}

/// First failing block found by [`validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChainFault {
    pub index: usize,
    pub kind: FaultKind,
}

impl fmt::Display for ChainFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            FaultKind::HashMismatch => "hash mismatch",
            FaultKind::BrokenLink => "previous hash mismatch",
            FaultKind::BadSignature => "signature invalid",
        };
        write!(f, "block {} {what}", self.index)
    }
}

/// Check hash, linkage and signature for every block after genesis.
///
/// Stops at the first failure. Only array position is used for linkage;
/// the stored `index` field is not checked for monotonicity.
pub fn validate(blocks: &[Block], verifying: &VerifyingKey) -> Result<(), ChainFault> {
    for (i, pair) in blocks.windows(2).enumerate() {
        let (prev, current) = (&pair[0], &pair[1]);
        let index = i + 1;

        if current.hash != current.recomputed_hash() {
            return Err(ChainFault {
                index,
                kind: FaultKind::HashMismatch,
            });
        }
        if current.previous_hash != prev.hash {
            return Err(ChainFault {
                index,
                kind: FaultKind::BrokenLink,
            });
        }
        if !current.verify(verifying) {
            return Err(ChainFault {
                index,
                kind: FaultKind::BadSignature,
            });
        }
    }
    Ok(())
}

pub fn is_valid(blocks: &[Block], verifying: &VerifyingKey) -> bool {
    validate(blocks, verifying).is_ok()
}

/// Ordered, never-empty sequence of blocks starting at genesis.
#[derive(Debug, Clone, PartialEq)]
pub struct Chain {
    blocks: Vec<Block>,
}

impl Chain {
    /// A one-block chain holding a freshly signed genesis block.
    pub fn new_genesis(signing: &SigningKey) -> Result<Self, LedgerError> {
        Ok(Self {
            blocks: vec![Block::genesis(now_timestamp()?, signing)],
        })
    }

    /// Wrap blocks read from storage or received from elsewhere.
    pub fn from_blocks(blocks: Vec<Block>) -> Result<Self, LedgerError> {
        if blocks.is_empty() {
            return Err(LedgerError::EmptyChain);
        }
        Ok(Self { blocks })
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn into_blocks(self) -> Vec<Block> {
        self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn genesis(&self) -> &Block {
        &self.blocks[0]
    }

    /// Most recent block.
    pub fn tip(&self) -> &Block {
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn validate(&self, verifying: &VerifyingKey) -> Result<(), ChainFault> {
        validate(&self.blocks, verifying)
    }

    pub fn is_valid(&self, verifying: &VerifyingKey) -> bool {
        is_valid(&self.blocks, verifying)
    }

    /// Sign a new block extending the tip and append it.
    ///
    /// The fresh signature is checked against `verifying` before the block
    /// is accepted; a mismatched key pair yields `SignatureInvalid` and
    /// leaves the chain as it was.
    pub fn add_block(
        &mut self,
        data: Value,
        signing: &SigningKey,
        verifying: &VerifyingKey,
    ) -> Result<Block, LedgerError> {
        let block = Block::create(
            self.blocks.len() as u64,
            now_timestamp()?,
            data,
            self.tip().hash.clone(),
        )
        .sign(signing);

        if !block.verify(verifying) {
            return Err(LedgerError::SignatureInvalid);
        }

        self.blocks.push(block.clone());
        Ok(block)
    }

    /// Append a block pushed by a peer if it extends the tip exactly.
    ///
    /// Linkage is the only check: the block is stored as received.
    pub fn extend_from_peer(&mut self, block: Block) -> Result<(), LedgerError> {
        let tip = &self.tip().hash;
        if block.previous_hash != *tip {
            return Err(LedgerError::InvalidSequence {
                expected: tip.clone(),
                got: block.previous_hash,
            });
        }
        self.blocks.push(block);
        Ok(())
    }
}
