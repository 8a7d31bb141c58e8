//! Disk persistence for the signed chain file.
//!
//! The file holds `{ chain, signature }`, where `signature` covers the
//! canonical serialization of `chain`. Loads verify that signature before any
//! block is trusted; saves are atomic, retried on failure, and never replace
//! the existing file when every attempt fails.

use std::fs::File;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::Signature;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::chain::Chain;
use crate::crypto::{sign_bytes, verify_bytes, Keypair};
use crate::error::LedgerError;
use crate::model::Block;

/// How often lock acquisition re-polls a contended lock.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Bounded retry with a fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_millis(300),
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds or the attempts are exhausted.
    ///
    /// `op` receives the 1-based attempt number. On exhaustion the last error
    /// is returned together with the number of attempts made.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, (u32, io::Error)>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = io::Result<T>>,
    {
        let max = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(v) => return Ok(v),
                Err(e) if attempt >= max => return Err((attempt, e)),
                Err(e) => {
                    warn!(
                        attempt,
                        max_attempts = max,
                        error = %e,
                        "chain write failed; retrying in {}ms",
                        self.delay.as_millis()
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// True for failures that indicate a held lock or a permission problem.
pub fn is_lock_or_permission(err: &io::Error) -> bool {
    if matches!(
        err.kind(),
        io::ErrorKind::PermissionDenied | io::ErrorKind::WouldBlock
    ) {
        return true;
    }
    let msg = err.to_string().to_lowercase();
    ["lock", "permission", "access"]
        .iter()
        .any(|needle| msg.contains(needle))
}

/// Raw storage operations used by [`ChainStore`].
///
/// All implementations must be `Send + Sync` so one store can serve
/// concurrent handlers.
#[async_trait::async_trait]
pub trait ChainBackend: Send + Sync {
    /// Read the whole file. Returns `None` if it does not exist.
    async fn read(&self, path: &Path) -> io::Result<Option<Vec<u8>>>;

    /// Replace the file contents atomically and leave it read-only.
    async fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    /// Move `from` to `to`. Returns `false` if `from` does not exist.
    async fn rename(&self, from: &Path, to: &Path) -> io::Result<bool>;
}

/// Filesystem backend: temp file + rename, then owner read-only.
pub struct FsBackend;

#[async_trait::async_trait]
impl ChainBackend for FsBackend {
    async fn read(&self, path: &Path) -> io::Result<Option<Vec<u8>>> {
        match tokio::fs::read(path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp_path = path.with_extension("tmp");
        let result: io::Result<()> = async {
            tokio::fs::write(&tmp_path, contents).await?;
            mark_read_only(&tmp_path).await?;
            make_replaceable(path).await?;
            tokio::fs::rename(&tmp_path, path).await
        }
        .await;

        if result.is_err() {
            let _ = tokio::fs::remove_file(&tmp_path).await;
        }
        result
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<bool> {
        match tokio::fs::rename(from, to).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Advisory deterrent against accidental edits; not a security boundary.
async fn mark_read_only(path: &Path) -> io::Result<()> {
    let mut perms = tokio::fs::metadata(path).await?.permissions();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        perms.set_mode(0o400);
    }
    #[cfg(not(unix))]
    perms.set_readonly(true);
    tokio::fs::set_permissions(path, perms).await
}

/// Rename cannot replace a read-only file on Windows; Unix only needs
/// directory write access.
#[cfg(not(unix))]
async fn make_replaceable(path: &Path) -> io::Result<()> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => {
            let mut perms = meta.permissions();
            #[allow(clippy::permissions_set_readonly_false)]
            perms.set_readonly(false);
            tokio::fs::set_permissions(path, perms).await
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
async fn make_replaceable(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Exclusive advisory lock on `<chain file>.lock`, released on drop.
#[derive(Debug)]
pub struct ChainLock {
    file: File,
    path: PathBuf,
}

impl Drop for ChainLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %e, "failed to release chain lock");
        } else {
            debug!(path = %self.path.display(), "released chain lock");
        }
    }
}

#[derive(Serialize)]
struct ChainFileRef<'a> {
    chain: &'a [Block],
    signature: &'a str,
}

#[derive(Deserialize)]
struct ChainFile {
    chain: Vec<Block>,
    signature: String,
}

/// Canonical byte form of a chain: 2-space pretty JSON of the block array.
pub fn canonical_chain(blocks: &[Block]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(blocks)
}

/// Signed chain file for one node.
pub struct ChainStore {
    path: PathBuf,
    lock_path: PathBuf,
    keys: Arc<Keypair>,
    backend: Arc<dyn ChainBackend>,
    retry: RetryPolicy,
    lock_timeout: Duration,
}

impl ChainStore {
    /// Store backed by the filesystem at `path`.
    pub fn new(path: impl Into<PathBuf>, keys: Arc<Keypair>) -> Self {
        let path = path.into();
        let mut lock_name = path.clone().into_os_string();
        lock_name.push(".lock");
        Self {
            path,
            lock_path: PathBuf::from(lock_name),
            keys,
            backend: Arc::new(FsBackend),
            retry: RetryPolicy::default(),
            lock_timeout: Duration::from_secs(10),
        }
    }

    /// Swap the storage backend.
    pub fn with_backend(mut self, backend: Arc<dyn ChainBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn keys(&self) -> &Keypair {
        &self.keys
    }

    /// Acquire the cross-process lock guarding load → mutate → save.
    pub async fn lock(&self) -> Result<ChainLock, LedgerError> {
        if let Some(parent) = self.lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .await?
            .into_std()
            .await;

        let started = tokio::time::Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    debug!(path = %self.lock_path.display(), "acquired chain lock");
                    return Ok(ChainLock {
                        file,
                        path: self.lock_path.clone(),
                    });
                }
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                    if started.elapsed() >= self.lock_timeout {
                        return Err(LedgerError::LockTimeout {
                            path: self.lock_path.clone(),
                        });
                    }
                    tokio::time::sleep(LOCK_POLL_INTERVAL).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Load and verify the chain, creating a signed genesis chain if no file exists.
    ///
    /// A file whose signature does not match its content yields
    /// `TamperDetected` and nothing else; there is no partial load.
    pub async fn load(&self, lock: &ChainLock) -> Result<Chain, LedgerError> {
        let Some(raw) = self.backend.read(&self.path).await? else {
            info!(path = %self.path.display(), "chain file not found, creating genesis chain");
            let chain = Chain::new_genesis(&self.keys.signing)?;
            self.save(&chain, lock).await?;
            return Ok(chain);
        };

        let file: ChainFile = serde_json::from_slice(&raw).map_err(|e| {
            error!(path = %self.path.display(), error = %e, "chain file is not valid JSON");
            LedgerError::Corrupt {
                path: self.path.clone(),
                reason: e.to_string(),
            }
        })?;

        let canonical = canonical_chain(&file.chain)?;
        if !self.verify_file_signature(canonical.as_bytes(), &file.signature) {
            error!(path = %self.path.display(), "chain file signature mismatch, refusing to load");
            return Err(LedgerError::TamperDetected {
                path: self.path.clone(),
            });
        }

        debug!(path = %self.path.display(), blocks = file.chain.len(), "loaded chain");
        Chain::from_blocks(file.chain)
    }

    /// Sign and write the chain, retrying per the store's policy.
    pub async fn save(&self, chain: &Chain, _lock: &ChainLock) -> Result<(), LedgerError> {
        let canonical = canonical_chain(chain.blocks())?;
        let signature = sign_bytes(&self.keys.signing, canonical.as_bytes());
        let signature = BASE64.encode(signature.to_bytes());
        let contents = serde_json::to_vec_pretty(&ChainFileRef {
            chain: chain.blocks(),
            signature: &signature,
        })?;

        let backend = &self.backend;
        let path = &self.path;
        let result = self
            .retry
            .run(|_attempt| backend.write(path, &contents))
            .await;

        match result {
            Ok(()) => {
                debug!(path = %self.path.display(), blocks = chain.len(), "saved chain");
                Ok(())
            }
            Err((attempts, source)) if is_lock_or_permission(&source) => {
                error!(
                    path = %self.path.display(),
                    attempts,
                    error = %source,
                    "chain file tampered or locked, refusing to modify"
                );
                Err(LedgerError::LockOrPermissionRefusal { attempts, source })
            }
            Err((attempts, source)) => {
                error!(
                    path = %self.path.display(),
                    attempts,
                    error = %source,
                    "failed to save chain after multiple retries"
                );
                Err(LedgerError::UnexpectedSaveError { attempts, source })
            }
        }
    }

    /// Move the current file aside as `<file>.backup_<unix-millis>.bak`.
    ///
    /// Returns the backup path, or `None` when there was no file to move.
    pub async fn archive(&self, _lock: &ChainLock) -> Result<Option<PathBuf>, LedgerError> {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let mut name = self.path.clone().into_os_string();
        name.push(format!(".backup_{millis}.bak"));
        let backup = PathBuf::from(name);

        if self.backend.rename(&self.path, &backup).await? {
            info!(from = %self.path.display(), to = %backup.display(), "archived chain file");
            Ok(Some(backup))
        } else {
            Ok(None)
        }
    }

    fn verify_file_signature(&self, canonical: &[u8], signature_b64: &str) -> bool {
        let Ok(raw) = BASE64.decode(signature_b64) else {
            return false;
        };
        let Ok(sig) = Signature::from_slice(&raw) else {
            return false;
        };
        verify_bytes(&self.keys.verifying, canonical, &sig)
    }
}
