// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Path constants and utilities for the on-disk data layout.

use std::path::{Path, PathBuf};

/// Default base directory for all persistent data.
pub const DATA_ROOT: &str = "data";

/// On-disk layout under the data directory.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self::new(DATA_ROOT)
    }
}

impl StoragePaths {
    /// Create a new StoragePaths with a custom root (useful for testing).
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory for all data.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Field encryption key.
    pub fn key_file(&self) -> PathBuf {
        self.root.join("secret.key")
    }

    // ========== Audit Log Paths ==========

    /// Directory containing the audit log.
    pub fn audit_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Encrypted, append-only audit log.
    pub fn audit_log(&self) -> PathBuf {
        self.audit_dir().join("system.log")
    }

    // ========== Record Store Paths ==========

    /// Live record database.
    pub fn database(&self) -> PathBuf {
        self.root.join("urban_mobility.redb")
    }

    /// Directory containing database backups.
    pub fn backups_dir(&self) -> PathBuf {
        self.root.join("backups")
    }

    /// Path to a specific backup file.
    pub fn backup(&self, backup_id: &str) -> PathBuf {
        self.backups_dir().join(format!("{backup_id}.redb"))
    }

    /// Create every directory the layout needs.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.audit_dir())?;
        std::fs::create_dir_all(self.backups_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_rooted() {
        let paths = StoragePaths::new("/tmp/fleet");
        assert_eq!(paths.key_file(), PathBuf::from("/tmp/fleet/secret.key"));
        assert_eq!(paths.audit_log(), PathBuf::from("/tmp/fleet/logs/system.log"));
        assert_eq!(paths.database(), PathBuf::from("/tmp/fleet/urban_mobility.redb"));
        assert_eq!(
            paths.backup("backup_1"),
            PathBuf::from("/tmp/fleet/backups/backup_1.redb")
        );
    }

    #[test]
    fn ensure_dirs_creates_layout() {
        let temp = tempfile::TempDir::new().unwrap();
        let paths = StoragePaths::new(temp.path().join("nested"));
        paths.ensure_dirs().unwrap();
        assert!(paths.audit_dir().is_dir());
        assert!(paths.backups_dir().is_dir());
    }
}
