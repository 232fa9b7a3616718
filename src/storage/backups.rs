// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Point-in-time copies of the record database.
//!
//! Backups are whole-file copies named `backup_<YYYYmmdd_HHMMSS>_<suffix>.redb`.
//! The caller must hold the store quiescent (closed or write-locked) while a
//! backup is taken or restored.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;

use super::paths::StoragePaths;

const EXTENSION: &str = "redb";
const MAX_ID_LEN: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("backup id '{0}' is not valid")]
    InvalidId(String),

    #[error("backup '{0}' does not exist")]
    NotFound(String),

    #[error("backup I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// A backup on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupInfo {
    pub id: String,
    pub size_bytes: u64,
}

/// Backup directory paired with the live database file.
#[derive(Debug, Clone)]
pub struct BackupCatalog {
    paths: StoragePaths,
}

impl BackupCatalog {
    pub fn new(paths: StoragePaths) -> Self {
        Self { paths }
    }

    /// Only ids made of ASCII letters, digits and underscores name a backup.
    pub fn is_valid_id(id: &str) -> bool {
        !id.is_empty()
            && id.len() <= MAX_ID_LEN
            && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    }

    fn path(&self, id: &str) -> Result<PathBuf, BackupError> {
        if Self::is_valid_id(id) {
            Ok(self.paths.backup(id))
        } else {
            Err(BackupError::InvalidId(id.to_string()))
        }
    }

    /// Copy the live database into a new backup.
    pub fn create(&self) -> Result<BackupInfo, BackupError> {
        fs::create_dir_all(self.paths.backups_dir())?;
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let id = format!("backup_{}_{}", Utc::now().format("%Y%m%d_%H%M%S"), &suffix[..8]);
        let target = self.path(&id)?;

        let size_bytes = copy_then_rename(&self.paths.database(), &target)?;
        tracing::info!(backup_id = %id, size_bytes, "Backup created");
        Ok(BackupInfo { id, size_bytes })
    }

    /// Every backup, oldest first.
    pub fn list(&self) -> Result<Vec<BackupInfo>, BackupError> {
        let entries = match fs::read_dir(self.paths.backups_dir()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut backups = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !Self::is_valid_id(id) {
                continue;
            }
            backups.push(BackupInfo {
                id: id.to_string(),
                size_bytes: entry.metadata()?.len(),
            });
        }
        backups.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(backups)
    }

    pub fn exists(&self, id: &str) -> bool {
        self.path(id).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Replace the live database with backup `id`.
    pub fn restore(&self, id: &str) -> Result<(), BackupError> {
        let source = self.path(id)?;
        if !source.is_file() {
            return Err(BackupError::NotFound(id.to_string()));
        }
        copy_then_rename(&source, &self.paths.database())?;
        tracing::info!(backup_id = %id, "Database restored from backup");
        Ok(())
    }

    /// Remove backup `id`, used when a new backup could not be recorded.
    pub fn discard(&self, id: &str) -> Result<(), BackupError> {
        match fs::remove_file(self.path(id)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(BackupError::NotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}

/// Copy `from` beside `to` and rename it into place, so `to` is never half-written.
fn copy_then_rename(from: &Path, to: &Path) -> io::Result<u64> {
    let mut temp = to.as_os_str().to_owned();
    temp.push(".partial");
    let temp = PathBuf::from(temp);

    let size = match fs::copy(from, &temp) {
        Ok(size) => size,
        Err(e) => {
            let _ = fs::remove_file(&temp);
            return Err(e);
        }
    };
    fs::File::open(&temp)?.sync_all()?;
    fs::rename(&temp, to)?;
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, BackupCatalog) {
        let temp = TempDir::new().unwrap();
        let paths = StoragePaths::new(temp.path());
        fs::write(paths.database(), b"generation-1").unwrap();
        (temp, BackupCatalog::new(paths))
    }

    #[test]
    fn create_list_and_restore() {
        let (temp, catalog) = setup();
        let backup = catalog.create().unwrap();
        assert!(backup.id.starts_with("backup_"));
        assert!(catalog.exists(&backup.id));
        assert_eq!(catalog.list().unwrap(), vec![backup.clone()]);

        let database = StoragePaths::new(temp.path()).database();
        fs::write(&database, b"generation-2").unwrap();
        catalog.restore(&backup.id).unwrap();
        assert_eq!(fs::read(&database).unwrap(), b"generation-1");
    }

    #[test]
    fn traversal_ids_are_rejected() {
        let (_temp, catalog) = setup();
        for id in ["../live", "a/b", "", "x.redb"] {
            assert!(!catalog.exists(id));
            assert!(matches!(catalog.restore(id), Err(BackupError::InvalidId(_))));
        }
    }

    #[test]
    fn missing_backup_is_not_found() {
        let (_temp, catalog) = setup();
        assert!(matches!(
            catalog.restore("backup_19700101_000000_deadbeef"),
            Err(BackupError::NotFound(_))
        ));
    }

    #[test]
    fn discarded_backup_is_gone() {
        let (_temp, catalog) = setup();
        let backup = catalog.create().unwrap();
        catalog.discard(&backup.id).unwrap();
        assert!(!catalog.exists(&backup.id));
        assert!(matches!(catalog.discard(&backup.id), Err(BackupError::NotFound(_))));
    }

    #[test]
    fn empty_catalog_lists_nothing() {
        let (_temp, catalog) = setup();
        assert!(catalog.list().unwrap().is_empty());
    }
}
