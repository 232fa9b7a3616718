// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Everything the console persists lives under one data directory.
//!
//! ## Storage Layout
//!
//! ```text
//! data/
//!   secret.key              # Field encryption key (0600)
//!   logs/
//!     system.log            # Encrypted, append-only audit log
//!   urban_mobility.redb     # Record database
//!   backups/
//!     {backup_id}.redb      # Point-in-time database copies
//! ```
//!
//! ## Important Notes
//!
//! - PII fields are encrypted before they reach the record database
//! - The audit log is encrypted line by line with the same key
//! - Losing `secret.key` makes every encrypted field unrecoverable

pub mod audit;
pub mod backups;
pub mod paths;
pub mod records;

pub use audit::{AuditAction, AuditEntry, AuditError, AuditInspector, AuditLog, InspectedLine};
pub use backups::{BackupCatalog, BackupError, BackupInfo};
pub use paths::StoragePaths;
pub use records::{RecordResult, RecordStore, RecordStoreError, StoredRecord};
