//! Cryptographic helpers: Ed25519 key files, signing and verification.

use std::fs;
use std::path::Path;

use ed25519_dalek::{Signature, SigningKey, VerifyingKey};
use ed25519_dalek::{Signer, Verifier};
use rand::rngs::OsRng;
use tracing::info;

use crate::error::KeyError;

/// Signing and verifying halves of the node key, shared by the store and handlers.
pub struct Keypair {
    pub signing: SigningKey,
    pub verifying: VerifyingKey,
}

impl Keypair {
    pub fn from_signing(signing: SigningKey) -> Self {
        let verifying = signing.verifying_key();
        Self { signing, verifying }
    }

    /// Hex encoding of the verifying key.
    pub fn public_hex(&self) -> String {
        hex::encode(self.verifying.to_bytes())
    }
}

/// Generate a fresh Ed25519 keypair using the OS RNG.
pub fn generate_keypair() -> Keypair {
    let mut rng = OsRng;
    Keypair::from_signing(SigningKey::generate(&mut rng))
}

/// Sign arbitrary bytes with the provided signing key.
pub fn sign_bytes(signing: &SigningKey, msg: &[u8]) -> Signature {
    signing.sign(msg)
}

/// Verify a message/signature pair using the provided verifying key.
pub fn verify_bytes(verifying: &VerifyingKey, msg: &[u8], sig: &Signature) -> bool {
    verifying.verify(msg, sig).is_ok()
}

/// Save (overwrite) the private key seed (32 bytes) to disk, owner-only on Unix.
pub fn save_key(path: &Path, signing: &SigningKey) -> Result<(), KeyError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, signing.to_bytes())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}

/// Load the private key seed if present; `None` when the file does not exist.
pub fn load_key(path: &Path) -> Result<Option<SigningKey>, KeyError> {
    let buf = match fs::read(path) {
        Ok(buf) => buf,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let seed: [u8; 32] = buf.as_slice().try_into().map_err(|_| KeyError::Malformed {
        path: path.to_path_buf(),
        len: buf.len(),
    })?;
    Ok(Some(SigningKey::from_bytes(&seed)))
}

/// Load the node key from `path`, generating and persisting one if absent.
pub fn load_or_generate(path: &Path) -> Result<Keypair, KeyError> {
    let signing = match load_key(path)? {
        Some(k) => {
            info!(path = %path.display(), "loaded existing key from disk");
            k
        }
        None => {
            info!(path = %path.display(), "no key found on disk; generating a new one");
            let kp = generate_keypair();
            save_key(path, &kp.signing)?;
            kp.signing
        }
    };
    Ok(Keypair::from_signing(signing))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_roundtrip() {
        let kp = generate_keypair();
        let sig = sign_bytes(&kp.signing, b"payload");
        assert!(verify_bytes(&kp.verifying, b"payload", &sig));
        assert!(!verify_bytes(&kp.verifying, b"other", &sig));

        let stranger = generate_keypair();
        assert!(!verify_bytes(&stranger.verifying, b"payload", &sig));
    }

    #[test]
    fn key_file_persists_seed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join("key.bin");

        assert!(load_key(&path).unwrap().is_none());

        let first = load_or_generate(&path).unwrap();
        let second = load_or_generate(&path).unwrap();
        assert_eq!(first.public_hex(), second.public_hex());
    }

    #[test]
    fn malformed_key_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.bin");
        fs::write(&path, [7u8; 12]).unwrap();

        match load_key(&path) {
            Err(KeyError::Malformed { len, .. }) => assert_eq!(len, 12),
            other => panic!("expected malformed key error, got {other:?}"),
        }
    }
}
