//! Error types for the ledger core, key files and persistence.

use std::path::PathBuf;

/// Errors raised while building, validating, persisting or syncing a chain.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// A freshly signed block did not verify against the node's public key.
    #[error("Invalid signature")]
    SignatureInvalid,

    /// The stored file signature does not match the recomputed serialization.
    ///
    /// No chain content is returned when this is raised.
    #[error("chain file has been tampered with, refusing to load")]
    TamperDetected {
        /// File that failed verification.
        path: PathBuf,
    },

    /// The chain file could not be parsed at all.
    #[error("chain file is corrupt: {reason}")]
    Corrupt {
        /// File that failed to parse.
        path: PathBuf,
        /// Parser diagnostic.
        reason: String,
    },

    /// A signed chain must contain at least the genesis block.
    #[error("chain contains no blocks")]
    EmptyChain,

    /// Lock or permission errors persisted through every save attempt.
    ///
    /// The existing file has not been overwritten.
    #[error("chain file tampered or locked, refusing to modify; restore or reset it")]
    LockOrPermissionRefusal {
        /// Number of write attempts made.
        attempts: u32,
        /// Last error observed.
        #[source]
        source: std::io::Error,
    },

    /// Any other I/O failure persisted through every save attempt.
    #[error("unexpected save error, check file system permissions")]
    UnexpectedSaveError {
        /// Number of write attempts made.
        attempts: u32,
        /// Last error observed.
        #[source]
        source: std::io::Error,
    },

    /// A peer block does not extend the local tip.
    #[error("Invalid chain sequence")]
    InvalidSequence {
        /// Hash of the local tip.
        expected: String,
        /// `previousHash` carried by the inbound block.
        got: String,
    },

    /// The advisory chain lock could not be acquired in time.
    #[error("timed out waiting for chain lock {}", path.display())]
    LockTimeout {
        /// Lock file path.
        path: PathBuf,
    },

    /// Timestamp formatting failed.
    #[error("time format error: {0}")]
    Timestamp(#[from] time::error::Format),

    /// JSON encoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An I/O error outside the retried save path.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while reading or writing the node's key file.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    /// The key file is not a 32-byte Ed25519 seed.
    #[error("malformed key file {}: expected 32 bytes, found {len}", path.display())]
    Malformed {
        /// Key file path.
        path: PathBuf,
        /// Actual length on disk.
        len: usize,
    },

    /// An I/O error occurred.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
