// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Field encryption key lifecycle.
//!
//! The console uses exactly one symmetric key per data directory. It is
//! generated on first start and read back unchanged on every later start.
//!
//! ## Key File
//!
//! ```text
//! <DATA_DIR>/secret.key   # URL-safe base64 of 32 random bytes, mode 0600
//! ```
//!
//! Losing this file makes every encrypted field and audit entry permanently
//! unreadable. There is no escrow. A file that exists but does not decode to
//! a 32-byte key is reported as [`KeyCorruptError`] and is never replaced.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use base64ct::{Base64Url, Encoding};
use ring::rand::{SecureRandom, SystemRandom};

/// Length of the AES-256 key in bytes.
pub const KEY_LEN: usize = 32;

/// Opaque symmetric key material.
#[derive(Clone, PartialEq, Eq)]
pub struct Key([u8; KEY_LEN]);

impl Key {
    /// Generate fresh key material from the system CSPRNG.
    pub fn generate(rng: &dyn SecureRandom) -> Result<Self, KeyVaultError> {
        let mut bytes = [0u8; KEY_LEN];
        rng.fill(&mut bytes).map_err(|_| KeyVaultError::Random)?;
        Ok(Self(bytes))
    }

    /// Raw key bytes. Only the cipher needs these.
    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    fn encode(&self) -> String {
        let mut line = Base64Url::encode_string(&self.0);
        line.push('\n');
        line
    }

    fn decode(path: &Path, contents: &[u8]) -> Result<Self, KeyCorruptError> {
        let corrupt = |reason: &'static str| KeyCorruptError {
            path: path.to_path_buf(),
            reason,
        };

        let text = std::str::from_utf8(contents).map_err(|_| corrupt("not valid UTF-8"))?;
        let text = text.strip_suffix('\n').unwrap_or(text);
        let text = text.strip_suffix('\r').unwrap_or(text);

        let bytes = Base64Url::decode_vec(text).map_err(|_| corrupt("not valid base64"))?;
        let bytes: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| corrupt("wrong key length"))?;
        Ok(Self(bytes))
    }
}

impl std::fmt::Debug for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Key([REDACTED])")
    }
}

/// The key file exists but does not hold a usable key.
#[derive(Debug, thiserror::Error)]
#[error("key file {path} is corrupt: {reason}")]
pub struct KeyCorruptError {
    pub path: PathBuf,
    pub reason: &'static str,
}

/// Errors from loading or creating the key.
#[derive(Debug, thiserror::Error)]
pub enum KeyVaultError {
    #[error(transparent)]
    Corrupt(#[from] KeyCorruptError),

    #[error("key file I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("system random generator failed")]
    Random,
}

/// Loads the process-wide key from disk, creating it on first run.
#[derive(Debug, Clone)]
pub struct KeyVault {
    path: PathBuf,
}

impl KeyVault {
    /// Create a vault for the key file at `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Location of the key file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the stored key, generating and persisting one if none exists.
    ///
    /// Concurrent first runs (threads or processes) all return the same key:
    /// the new key is written to a private temporary file and published with
    /// a hard link, which fails if another writer got there first. The loser
    /// discards its candidate and reads the winner's file.
    pub fn load_or_create(&self) -> Result<Key, KeyVaultError> {
        if let Some(key) = self.load()? {
            tracing::debug!(path = %self.path.display(), "Loaded field encryption key");
            return Ok(key);
        }

        let candidate = Key::generate(&SystemRandom::new())?;
        if self.publish(&candidate)? {
            tracing::info!(path = %self.path.display(), "Generated new field encryption key");
            return Ok(candidate);
        }

        // Another initializer won the race.
        self.load()?.ok_or_else(|| {
            KeyVaultError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                "key file vanished after concurrent creation",
            ))
        })
    }

    /// Read the key file if it exists.
    pub fn load(&self) -> Result<Option<Key>, KeyVaultError> {
        match fs::read(&self.path) {
            Ok(contents) => match Key::decode(&self.path, &contents) {
                Ok(key) => Ok(Some(key)),
                Err(e) => {
                    tracing::error!(error = %e, "Refusing to start with a corrupt key file");
                    Err(e.into())
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Atomically create the key file. Returns `false` if it already existed.
    fn publish(&self, key: &Key) -> Result<bool, KeyVaultError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = self
            .path
            .with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));

        let result = write_private(&temp_path, key.encode().as_bytes())
            .and_then(|()| match fs::hard_link(&temp_path, &self.path) {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
                Err(e) => Err(e),
            });

        let _ = fs::remove_file(&temp_path);
        Ok(result?)
    }
}

/// Write `data` to a new file readable only by the owner.
fn write_private(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(data)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn vault_in(temp: &TempDir) -> KeyVault {
        KeyVault::new(temp.path().join("secret.key"))
    }

    #[test]
    fn first_run_creates_key_file() {
        let temp = TempDir::new().unwrap();
        let vault = vault_in(&temp);

        assert!(vault.load().unwrap().is_none());
        let key = vault.load_or_create().unwrap();

        assert!(vault.path().exists());
        assert_eq!(vault.load().unwrap(), Some(key));
    }

    #[test]
    fn later_runs_return_same_key() {
        let temp = TempDir::new().unwrap();

        let first = vault_in(&temp).load_or_create().unwrap();
        let second = vault_in(&temp).load_or_create().unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn corrupt_key_is_not_replaced() {
        let temp = TempDir::new().unwrap();
        let vault = vault_in(&temp);
        fs::write(vault.path(), b"too-short\n").unwrap();

        let result = vault.load_or_create();
        assert!(matches!(result, Err(KeyVaultError::Corrupt(_))));
        assert_eq!(fs::read(vault.path()).unwrap(), b"too-short\n");
    }

    #[test]
    fn wrong_length_key_is_corrupt() {
        let temp = TempDir::new().unwrap();
        let vault = vault_in(&temp);
        let sixteen = Base64Url::encode_string(&[7u8; 16]);
        fs::write(vault.path(), sixteen).unwrap();

        match vault.load_or_create() {
            Err(KeyVaultError::Corrupt(e)) => assert_eq!(e.reason, "wrong key length"),
            other => panic!("expected corrupt key, got {other:?}"),
        }
    }

    #[test]
    fn key_file_without_newline_loads() {
        let temp = TempDir::new().unwrap();
        let vault = vault_in(&temp);
        fs::write(vault.path(), Base64Url::encode_string(&[9u8; KEY_LEN])).unwrap();

        let key = vault.load_or_create().unwrap();
        assert_eq!(key.as_bytes(), &[9u8; KEY_LEN]);
    }

    #[cfg(unix)]
    #[test]
    fn key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let vault = vault_in(&temp);
        vault.load_or_create().unwrap();

        let mode = fs::metadata(vault.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn concurrent_first_runs_agree_on_one_key() {
        let temp = TempDir::new().unwrap();
        let vault = Arc::new(vault_in(&temp));

        let keys: Vec<Key> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let vault = Arc::clone(&vault);
                    scope.spawn(move || vault.load_or_create().unwrap())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(keys.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(vault.load().unwrap().as_ref(), keys.first());

        let leftovers = fs::read_dir(temp.path()).unwrap().count();
        assert_eq!(leftovers, 1, "temporary key files must be cleaned up");
    }

    #[test]
    fn debug_output_hides_key_material() {
        let key = Key([1u8; KEY_LEN]);
        assert_eq!(format!("{key:?}"), "Key([REDACTED])");
    }
}
