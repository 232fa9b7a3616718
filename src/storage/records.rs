// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded record database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `scooters`, `travellers`, `users`: record id → serialized [`StoredRecord`]
//! - `usernames`: lowercase username → user id
//! - `sequences`: record kind → last id handed out
//!
//! Field values arrive already validated and, for PII fields, encrypted. The
//! store never sees plaintext PII and applies changes only from a
//! [`SealedUpdate`].
//!
//! Every mutation takes an audit hook. The hook runs once the change is staged
//! and before it commits; if it fails the transaction is aborted, so a change
//! without its audit entry never becomes visible.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{
    Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction,
};
use serde::{Deserialize, Serialize};

use super::audit::AuditError;
use crate::auth::{Role, SealedUpdate, RESERVED_ADMIN_ID};
use crate::models::RecordKind;

// =============================================================================
// Table Definitions
// =============================================================================

const SCOOTERS: TableDefinition<u64, &[u8]> = TableDefinition::new("scooters");
const TRAVELLERS: TableDefinition<u64, &[u8]> = TableDefinition::new("travellers");
const USERS: TableDefinition<u64, &[u8]> = TableDefinition::new("users");

/// Index: lowercase username → user id. Usernames are unique case-insensitively.
const USERNAMES: TableDefinition<&str, u64> = TableDefinition::new("usernames");

/// Last id handed out per record kind.
const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

fn table_for(kind: RecordKind) -> TableDefinition<'static, u64, &'static [u8]> {
    match kind {
        RecordKind::Scooter => SCOOTERS,
        RecordKind::Traveller => TRAVELLERS,
        RecordKind::User => USERS,
    }
}

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RecordStoreError {
    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("database directory: {0}")]
    Io(#[from] io::Error),

    #[error("change not committed, audit failed: {0}")]
    Audit(#[from] AuditError),

    #[error("{kind} {id} not found")]
    NotFound { kind: RecordKind, id: u64 },

    #[error("username '{0}' is already taken")]
    UsernameTaken(String),

    #[error("reserved administrator already exists")]
    ReservedExists,
}

pub type RecordResult<T> = Result<T, RecordStoreError>;

// =============================================================================
// Stored Record
// =============================================================================

/// One persisted record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: u64,
    pub kind: RecordKind,
    /// Catalog fields in stored form (PII fields hold cipher tokens).
    pub fields: BTreeMap<String, String>,
    /// Users only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    /// Registration date for users and travellers, in-service date for scooters.
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl StoredRecord {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn username(&self) -> Option<&str> {
        self.field("username")
    }

    /// Role of a user record. The reserved administrator is always superadmin.
    pub fn role(&self) -> Option<Role> {
        if self.kind != RecordKind::User {
            return None;
        }
        if self.id == RESERVED_ADMIN_ID {
            return Some(Role::SuperAdmin);
        }
        self.field("role").and_then(Role::parse)
    }
}

// =============================================================================
// RecordStore
// =============================================================================

/// Embedded ACID record database.
pub struct RecordStore {
    db: Database,
}

impl RecordStore {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> RecordResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(SCOOTERS)?;
            let _ = write_txn.open_table(TRAVELLERS)?;
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(USERNAMES)?;
            let _ = write_txn.open_table(SEQUENCES)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    // =========================================================================
    // Record CRUD
    // =========================================================================

    /// Insert a new record and return its id.
    pub fn insert<A>(
        &self,
        kind: RecordKind,
        fields: BTreeMap<String, String>,
        password_hash: Option<String>,
        audit: A,
    ) -> RecordResult<u64>
    where
        A: FnOnce(&StoredRecord) -> Result<(), AuditError>,
    {
        let write_txn = self.db.begin_write()?;
        let id = next_id(&write_txn, kind)?;
        let now = Utc::now();
        let record = StoredRecord {
            id,
            kind,
            fields,
            password_hash,
            created_at: now,
            last_updated: now,
        };
        put(&write_txn, &record, None)?;
        commit_audited(write_txn, &record, audit)?;
        Ok(id)
    }

    /// Create the reserved administrator account (id 1).
    pub fn insert_reserved_admin<A>(
        &self,
        fields: BTreeMap<String, String>,
        password_hash: String,
        audit: A,
    ) -> RecordResult<()>
    where
        A: FnOnce(&StoredRecord) -> Result<(), AuditError>,
    {
        let write_txn = self.db.begin_write()?;
        {
            let users = write_txn.open_table(USERS)?;
            if users.get(RESERVED_ADMIN_ID)?.is_some() {
                return Err(RecordStoreError::ReservedExists);
            }
        }
        let now = Utc::now();
        let record = StoredRecord {
            id: RESERVED_ADMIN_ID,
            kind: RecordKind::User,
            fields,
            password_hash: Some(password_hash),
            created_at: now,
            last_updated: now,
        };
        put(&write_txn, &record, None)?;
        commit_audited(write_txn, &record, audit)
    }

    /// Look up a single record.
    pub fn get(&self, kind: RecordKind, id: u64) -> RecordResult<Option<StoredRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table_for(kind))?;
        match table.get(id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Every record of `kind`, by ascending id.
    pub fn list(&self, kind: RecordKind) -> RecordResult<Vec<StoredRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table_for(kind))?;
        let mut records = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            records.push(serde_json::from_slice(value.value())?);
        }
        Ok(records)
    }

    /// Find a user by username (case-insensitive).
    pub fn find_user(&self, username: &str) -> RecordResult<Option<StoredRecord>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(USERNAMES)?;
        let Some(id) = index.get(username.to_lowercase().as_str())?.map(|v| v.value()) else {
            return Ok(None);
        };
        let users = read_txn.open_table(USERS)?;
        match users.get(id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Apply a sealed change set in one transaction and return the new record.
    pub fn apply<A>(&self, update: &SealedUpdate, audit: A) -> RecordResult<StoredRecord>
    where
        A: FnOnce(&StoredRecord) -> Result<(), AuditError>,
    {
        let kind = update.kind();
        let id = update.record_id();

        let write_txn = self.db.begin_write()?;
        let mut record = load(&write_txn, kind, id)?;
        let previous_username = record.username().map(str::to_string);

        for (field, value) in update.values() {
            record.fields.insert(field.to_string(), value.clone());
        }
        record.last_updated = Utc::now();

        put(&write_txn, &record, previous_username.as_deref())?;
        commit_audited(write_txn, &record, audit)?;
        Ok(record)
    }

    /// Replace a user's password hash.
    pub fn set_password_hash<A>(&self, user_id: u64, password_hash: String, audit: A) -> RecordResult<()>
    where
        A: FnOnce(&StoredRecord) -> Result<(), AuditError>,
    {
        let write_txn = self.db.begin_write()?;
        let mut record = load(&write_txn, RecordKind::User, user_id)?;
        let username = record.username().map(str::to_string);
        record.password_hash = Some(password_hash);
        record.last_updated = Utc::now();
        put(&write_txn, &record, username.as_deref())?;
        commit_audited(write_txn, &record, audit)
    }

    /// Remove a record and return what was stored.
    pub fn delete<A>(&self, kind: RecordKind, id: u64, audit: A) -> RecordResult<StoredRecord>
    where
        A: FnOnce(&StoredRecord) -> Result<(), AuditError>,
    {
        let write_txn = self.db.begin_write()?;
        let record = {
            let mut records = write_txn.open_table(table_for(kind))?;
            let removed = records.remove(id)?.map(|v| v.value().to_vec());
            match removed {
                Some(bytes) => serde_json::from_slice::<StoredRecord>(&bytes)?,
                None => return Err(RecordStoreError::NotFound { kind, id }),
            }
        };
        if let Some(username) = record.username() {
            let mut index = write_txn.open_table(USERNAMES)?;
            index.remove(username.to_lowercase().as_str())?;
        }
        commit_audited(write_txn, &record, audit)?;
        Ok(record)
    }
}

/// Commit `txn` only if `audit` records the staged change.
fn commit_audited<A>(txn: WriteTransaction, record: &StoredRecord, audit: A) -> RecordResult<()>
where
    A: FnOnce(&StoredRecord) -> Result<(), AuditError>,
{
    if let Err(e) = audit(record) {
        if let Err(abort) = txn.abort() {
            tracing::error!(error = %abort, "Failed to abort unaudited transaction");
        }
        return Err(e.into());
    }
    txn.commit()?;
    Ok(())
}

fn next_id(txn: &WriteTransaction, kind: RecordKind) -> RecordResult<u64> {
    let mut sequences = txn.open_table(SEQUENCES)?;
    let last = sequences.get(kind.as_str())?.map(|v| v.value()).unwrap_or(0);
    // User ids start after the reserved administrator.
    let floor = match kind {
        RecordKind::User => RESERVED_ADMIN_ID,
        RecordKind::Scooter | RecordKind::Traveller => 0,
    };
    let id = last.max(floor) + 1;
    sequences.insert(kind.as_str(), id)?;
    Ok(id)
}

fn load(txn: &WriteTransaction, kind: RecordKind, id: u64) -> RecordResult<StoredRecord> {
    let records = txn.open_table(table_for(kind))?;
    let bytes = records.get(id)?.map(|v| v.value().to_vec());
    match bytes {
        Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
        None => Err(RecordStoreError::NotFound { kind, id }),
    }
}

/// Write `record`, keeping the username index in step.
///
/// `previous_username` is the name the index currently holds for this record.
fn put(
    txn: &WriteTransaction,
    record: &StoredRecord,
    previous_username: Option<&str>,
) -> RecordResult<()> {
    if let Some(username) = record.username() {
        let key = username.to_lowercase();
        let mut index = txn.open_table(USERNAMES)?;
        let owner = index.get(key.as_str())?.map(|v| v.value());
        match owner {
            Some(owner) if owner != record.id => {
                return Err(RecordStoreError::UsernameTaken(username.to_string()));
            }
            _ => {}
        }
        if let Some(previous) = previous_username {
            let previous = previous.to_lowercase();
            if previous != key {
                index.remove(previous.as_str())?;
            }
        }
        index.insert(key.as_str(), record.id)?;
    }

    let json = serde_json::to_vec(record)?;
    let mut records = txn.open_table(table_for(record.kind))?;
    records.insert(record.id, json.as_slice())?;
    Ok(())
}
