// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Console
//!
//! The caller-facing facade. Every operation takes the caller's [`Session`],
//! re-reads the account behind it, checks the role, performs the change and
//! records it in the audit log.
//!
//! ## Update Path
//!
//! 1. [`AccessPolicy`] approves the whole field set or refuses it
//! 2. Values are validated and PII is encrypted ([`ApprovedUpdate::seal`])
//! 3. The record store stages the sealed update in one transaction
//! 4. The change is audited (field names only, never values) and only then
//!    committed; an audit failure aborts the transaction
//!
//! A database restore cannot be rolled back this way. Its redemption is
//! audited before the file is replaced, and a failed redemption entry stops
//! the restore.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::auth::{
    validate_password, validate_username, AccessPolicy, FailedLogins, Operation, ProtectedAction,
    Role, Session, ValidationError, RESERVED_ADMIN_ID,
};
use crate::config::{ConfigError, ConsoleConfig, SUPERADMIN_PASSWORD_ENV, SUPERADMIN_USERNAME};
use crate::crypto::{CredentialStore, FieldCipher, KeyVault};
use crate::error::{ConsoleError, ConsoleResult};
use crate::models::{normalize_value, RecordKind};
use crate::restore::{InvalidCodeError, RestoreAuthority};
use crate::storage::{
    AuditAction, AuditEntry, AuditLog, BackupCatalog, BackupInfo, RecordStore, StoragePaths,
    StoredRecord,
};

/// Failed logins for one username before attempts are flagged suspicious.
const SUSPICIOUS_LOGIN_THRESHOLD: u32 = 3;

/// A decrypted field as shown to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum FieldView {
    Plain(String),
    /// Stored ciphertext did not decrypt with the current key.
    Unreadable,
}

impl FieldView {
    pub fn as_plain(&self) -> Option<&str> {
        match self {
            FieldView::Plain(value) => Some(value),
            FieldView::Unreadable => None,
        }
    }
}

/// A record with PII decrypted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordView {
    pub id: u64,
    pub kind: RecordKind,
    pub fields: BTreeMap<String, FieldView>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl RecordView {
    pub fn plain(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(FieldView::as_plain)
    }
}

/// Details for a new staff account.
#[derive(Debug, Clone, Copy)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub role: Role,
    pub first_name: &'a str,
    pub last_name: &'a str,
}

/// Record console over one data directory.
pub struct Console {
    cipher: Arc<FieldCipher>,
    credentials: CredentialStore,
    audit: AuditLog,
    /// `None` only while a restore swaps the database file.
    records: RwLock<Option<RecordStore>>,
    paths: StoragePaths,
    backups: BackupCatalog,
    restore: Arc<RestoreAuthority>,
    failed_logins: FailedLogins,
}

impl Console {
    /// Open the data directory, creating the key and the reserved
    /// administrator on first start.
    pub fn open(config: &ConsoleConfig) -> ConsoleResult<Self> {
        let paths = StoragePaths::new(&config.data_dir);
        paths
            .ensure_dirs()
            .map_err(|e| ConsoleError::io("Cannot create data directory", e))?;

        let key = KeyVault::new(paths.key_file()).load_or_create()?;
        let cipher = Arc::new(FieldCipher::new(&key));
        let audit = AuditLog::open(paths.audit_log(), cipher.clone())?;
        let store = RecordStore::open(&paths.database())?;

        let console = Self {
            cipher,
            credentials: CredentialStore::new(config.password_iterations),
            audit,
            records: RwLock::new(Some(store)),
            backups: BackupCatalog::new(paths.clone()),
            paths,
            restore: Arc::new(RestoreAuthority::new(config.restore_code_ttl)),
            failed_logins: FailedLogins::default(),
        };
        console.bootstrap(config.superadmin_password.as_deref())?;

        tracing::info!(data_dir = %console.paths.root().display(), "Console opened");
        Ok(console)
    }

    /// Shared handle for the restore code sweeper.
    pub fn restore_authority(&self) -> Arc<RestoreAuthority> {
        self.restore.clone()
    }

    pub fn paths(&self) -> &StoragePaths {
        &self.paths
    }

    fn bootstrap(&self, password: Option<&str>) -> ConsoleResult<()> {
        if self.with_store(|s| Ok(s.get(RecordKind::User, RESERVED_ADMIN_ID)?))?.is_some() {
            return Ok(());
        }

        let password = password.ok_or(ConfigError::Missing(SUPERADMIN_PASSWORD_ENV))?;
        let hash = self.credentials.hash(&validate_password(password)?)?;
        let fields = BTreeMap::from([
            ("username".to_string(), SUPERADMIN_USERNAME.to_string()),
            ("role".to_string(), Role::SuperAdmin.as_str().to_string()),
            ("first_name".to_string(), "Super".to_string()),
            ("last_name".to_string(), "Administrator".to_string()),
        ]);
        self.with_store(|s| {
            Ok(s.insert_reserved_admin(fields, hash, |_| {
                self.audit.append(
                    AuditAction::UserRegistered,
                    "system",
                    "reserved administrator created",
                    false,
                )
            })?)
        })?;

        tracing::info!(username = SUPERADMIN_USERNAME, "Created reserved administrator");
        Ok(())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn with_store<T>(&self, f: impl FnOnce(&RecordStore) -> ConsoleResult<T>) -> ConsoleResult<T> {
        let guard = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let store = guard
            .as_ref()
            .ok_or_else(|| ConsoleError::IoFailure("record store is not open".to_string()))?;
        f(store)
    }

    /// Re-read the account behind `session`; its role may have changed.
    fn current(&self, session: &Session) -> ConsoleResult<Session> {
        let record = self.with_store(|s| Ok(s.get(RecordKind::User, session.user_id)?))?;
        match record {
            Some(record) if record.username() == Some(session.username.as_str()) => {
                let role = record.role().ok_or(ConsoleError::AuthFailure)?;
                let username = record.username().unwrap_or_default();
                Ok(Session::new(record.id, username, role))
            }
            _ => {
                tracing::warn!(user_id = session.user_id, "Session no longer matches an account");
                Err(ConsoleError::AuthFailure)
            }
        }
    }

    /// Check `operation` for `actor`, auditing a refusal.
    fn require(&self, actor: &Session, operation: Operation) -> ConsoleResult<()> {
        if let Err(denied) = operation.require(actor.role) {
            tracing::warn!(user = %actor.username, role = %actor.role, "{denied}");
            self.audit.log(
                &AuditEntry::new(AuditAction::OperationDenied, &actor.username)
                    .with_description(format!("tried to {}", operation.describe()))
                    .suspicious(),
            )?;
            return Err(denied.into());
        }
        Ok(())
    }

    fn guard_reserved(
        &self,
        actor: &Session,
        kind: RecordKind,
        id: u64,
        action: ProtectedAction,
    ) -> ConsoleResult<()> {
        if let Err(e) = AccessPolicy::guard_reserved(kind, id, action) {
            self.audit.log(
                &AuditEntry::new(AuditAction::OperationDenied, &actor.username)
                    .with_description(format!("reserved administrator: {e}"))
                    .suspicious(),
            )?;
            return Err(e.into());
        }
        Ok(())
    }

    /// Validate a value and encrypt it if the field is PII.
    fn store_form(&self, kind: RecordKind, field: &str, raw: &str) -> ConsoleResult<String> {
        let value = normalize_value(kind, field, raw)?;
        if kind.is_pii(field) {
            Ok(self.cipher.encrypt(&value)?)
        } else {
            Ok(value)
        }
    }

    fn view(&self, actor: &Session, record: StoredRecord) -> ConsoleResult<RecordView> {
        let mut fields = BTreeMap::new();
        let mut unreadable = Vec::new();

        for (name, stored) in record.fields {
            let view = if record.kind.is_pii(&name) {
                match self.cipher.decrypt(&stored) {
                    Ok(plain) => FieldView::Plain(plain),
                    Err(e) => {
                        tracing::error!(kind = %record.kind, id = record.id, field = %name, error = %e, "Stored field failed to decrypt");
                        unreadable.push(name.clone());
                        FieldView::Unreadable
                    }
                }
            } else {
                FieldView::Plain(stored)
            };
            fields.insert(name, view);
        }

        if !unreadable.is_empty() {
            self.audit.log(
                &AuditEntry::new(AuditAction::RecordUnreadable, &actor.username)
                    .with_description(format!(
                        "{} {}: {}",
                        record.kind,
                        record.id,
                        unreadable.join(", ")
                    ))
                    .suspicious(),
            )?;
        }

        Ok(RecordView {
            id: record.id,
            kind: record.kind,
            fields,
            created_at: record.created_at,
            last_updated: record.last_updated,
        })
    }

    // =========================================================================
    // Sessions and Accounts
    // =========================================================================

    /// Verify credentials and open a session.
    pub fn login(&self, username: &str, password: &str) -> ConsoleResult<Session> {
        let record = self.with_store(|s| Ok(s.find_user(username)?))?;

        let verified = match &record {
            Some(record) => {
                let hash = record.password_hash.as_deref().unwrap_or_default();
                self.credentials.verify(password, hash)
            }
            None => {
                self.credentials.burn(password);
                false
            }
        };

        let session = match (verified, record) {
            (true, Some(record)) => record
                .role()
                .map(|role| Session::new(record.id, record.username().unwrap_or(username), role)),
            _ => None,
        };

        let Some(session) = session else {
            let attempts = self.failed_logins.record_failure(username);
            let mut entry = AuditEntry::new(AuditAction::LoginFailed, username)
                .with_description(format!("failed login attempt {attempts}"));
            if attempts >= SUSPICIOUS_LOGIN_THRESHOLD {
                entry = entry.suspicious();
            }
            tracing::warn!(attempts, "Failed login");
            self.audit.log(&entry)?;
            return Err(ConsoleError::AuthFailure);
        };

        self.failed_logins.clear(username);
        self.audit.append(AuditAction::LoginSucceeded, &session.username, "", false)?;
        tracing::info!(user = %session.username, role = %session.role, "Login succeeded");
        Ok(session)
    }

    /// Create a staff account.
    pub fn register_user(&self, session: &Session, user: NewUser<'_>) -> ConsoleResult<u64> {
        let actor = self.current(session)?;
        self.require(&actor, Operation::AddUser)?;

        if !user.role.is_assignable() {
            return Err(ValidationError::invalid("role", "role cannot be assigned").into());
        }
        validate_username(user.username)?;
        let hash = self.credentials.hash(&validate_password(user.password)?)?;

        let mut fields = BTreeMap::new();
        for (field, raw) in [
            ("username", user.username),
            ("role", user.role.as_str()),
            ("first_name", user.first_name),
            ("last_name", user.last_name),
        ] {
            fields.insert(field.to_string(), self.store_form(RecordKind::User, field, raw)?);
        }

        self.with_store(|s| {
            Ok(s.insert(RecordKind::User, fields, Some(hash), |record| {
                self.audit.append(
                    AuditAction::UserRegistered,
                    &actor.username,
                    &format!("user {} ({}) as {}", record.id, user.username, user.role),
                    false,
                )
            })?)
        })
    }

    /// Change the caller's own password.
    pub fn change_password(&self, session: &Session, current: &str, new: &str) -> ConsoleResult<()> {
        let actor = self.current(session)?;
        let record = self
            .with_store(|s| Ok(s.get(RecordKind::User, actor.user_id)?))?
            .ok_or(ConsoleError::AuthFailure)?;

        if !self
            .credentials
            .verify(current, record.password_hash.as_deref().unwrap_or_default())
        {
            self.audit.log(
                &AuditEntry::new(AuditAction::LoginFailed, &actor.username)
                    .with_description("wrong current password on password change")
                    .suspicious(),
            )?;
            return Err(ConsoleError::AuthFailure);
        }

        let hash = self.credentials.hash(&validate_password(new)?)?;
        self.with_store(|s| {
            Ok(s.set_password_hash(actor.user_id, hash, |_| {
                self.audit
                    .append(AuditAction::PasswordChanged, &actor.username, "own password", false)
            })?)
        })
    }

    /// Give a staff account another role.
    pub fn change_user_role(&self, session: &Session, user_id: u64, role: Role) -> ConsoleResult<()> {
        let actor = self.current(session)?;
        self.guard_reserved(&actor, RecordKind::User, user_id, ProtectedAction::ChangeRole)?;
        let changes = BTreeMap::from([("role".to_string(), role.as_str().to_string())]);
        self.apply_changes(&actor, RecordKind::User, user_id, changes, AuditAction::RoleChanged)
    }

    // =========================================================================
    // Records
    // =========================================================================

    pub fn add_scooter(&self, session: &Session, fields: BTreeMap<String, String>) -> ConsoleResult<u64> {
        self.add_record(session, RecordKind::Scooter, fields)
    }

    pub fn add_traveller(&self, session: &Session, fields: BTreeMap<String, String>) -> ConsoleResult<u64> {
        self.add_record(session, RecordKind::Traveller, fields)
    }

    fn add_record(
        &self,
        session: &Session,
        kind: RecordKind,
        fields: BTreeMap<String, String>,
    ) -> ConsoleResult<u64> {
        let actor = self.current(session)?;
        self.require(&actor, Operation::add(kind))?;

        if let Some(missing) = kind
            .required_fields()
            .iter()
            .find(|f| fields.get(**f).is_none_or(|v| v.trim().is_empty()))
        {
            return Err(ValidationError::MissingField(missing).into());
        }

        let mut stored = BTreeMap::new();
        for (field, raw) in &fields {
            stored.insert(field.clone(), self.store_form(kind, field, raw)?);
        }

        self.with_store(|s| {
            Ok(s.insert(kind, stored, None, |record| {
                self.audit.append(
                    AuditAction::RecordCreated,
                    &actor.username,
                    &format!("{kind} {}", record.id),
                    false,
                )
            })?)
        })
    }

    /// Change one field.
    pub fn change_field(
        &self,
        session: &Session,
        kind: RecordKind,
        record_id: u64,
        field: &str,
        value: &str,
    ) -> ConsoleResult<()> {
        let changes = BTreeMap::from([(field.to_string(), value.to_string())]);
        self.update_record(session, kind, record_id, changes)
    }

    /// Change several fields at once; all are applied or none.
    pub fn update_record(
        &self,
        session: &Session,
        kind: RecordKind,
        record_id: u64,
        changes: BTreeMap<String, String>,
    ) -> ConsoleResult<()> {
        let actor = self.current(session)?;
        if changes.contains_key("role") {
            self.guard_reserved(&actor, kind, record_id, ProtectedAction::ChangeRole)?;
        }
        self.apply_changes(&actor, kind, record_id, changes, AuditAction::FieldChanged)
    }

    fn apply_changes(
        &self,
        actor: &Session,
        kind: RecordKind,
        record_id: u64,
        changes: BTreeMap<String, String>,
        action: AuditAction,
    ) -> ConsoleResult<()> {
        if changes.is_empty() {
            return Err(ValidationError::invalid("fields", "no changes given").into());
        }

        let approved = match AccessPolicy::authorize_update(actor.role, kind, record_id, changes) {
            Ok(approved) => approved,
            Err(forbidden) => {
                tracing::warn!(user = %actor.username, "{forbidden}");
                self.audit.log(
                    &AuditEntry::new(AuditAction::FieldChangeDenied, &actor.username)
                        .with_description(format!(
                            "{kind} {record_id}: {}",
                            forbidden.rejected.join(", ")
                        ))
                        .suspicious(),
                )?;
                return Err(forbidden.into());
            }
        };

        let fields: Vec<&str> = approved.fields().collect();
        let description = format!("{kind} {record_id}: {}", fields.join(", "));
        let sealed = approved.seal(|kind, field, raw| self.store_form(kind, field, raw))?;

        self.with_store(|s| {
            s.apply(&sealed, |_| {
                self.audit.append(action, &actor.username, &description, false)
            })?;
            Ok(())
        })
    }

    /// Read one record with PII decrypted.
    pub fn read_record(&self, session: &Session, kind: RecordKind, record_id: u64) -> ConsoleResult<RecordView> {
        let actor = self.current(session)?;
        self.require(&actor, Operation::view(kind))?;
        let record = self
            .with_store(|s| Ok(s.get(kind, record_id)?))?
            .ok_or(ConsoleError::NotFound { kind, id: record_id })?;
        self.view(&actor, record)
    }

    /// Every record of `kind` with PII decrypted.
    pub fn list_records(&self, session: &Session, kind: RecordKind) -> ConsoleResult<Vec<RecordView>> {
        let actor = self.current(session)?;
        self.require(&actor, Operation::view(kind))?;
        let records = self.with_store(|s| Ok(s.list(kind)?))?;
        records
            .into_iter()
            .map(|record| self.view(&actor, record))
            .collect()
    }

    pub fn delete_record(&self, session: &Session, kind: RecordKind, record_id: u64) -> ConsoleResult<()> {
        let actor = self.current(session)?;
        self.require(&actor, Operation::delete(kind))?;
        self.guard_reserved(&actor, kind, record_id, ProtectedAction::Delete)?;

        let action = match kind {
            RecordKind::User => AuditAction::UserDeleted,
            RecordKind::Scooter | RecordKind::Traveller => AuditAction::RecordDeleted,
        };
        self.with_store(|s| {
            s.delete(kind, record_id, |_| {
                self.audit
                    .append(action, &actor.username, &format!("{kind} {record_id}"), false)
            })?;
            Ok(())
        })
    }

    // =========================================================================
    // Backups and Restore
    // =========================================================================

    pub fn create_backup(&self, session: &Session) -> ConsoleResult<BackupInfo> {
        let actor = self.current(session)?;
        self.require(&actor, Operation::CreateBackup)?;

        let backup = {
            // Hold writers off while the file is copied.
            let _quiesce = self.records.write().unwrap_or_else(PoisonError::into_inner);
            self.backups.create()?
        };
        if let Err(e) = self
            .audit
            .append(AuditAction::BackupCreated, &actor.username, &backup.id, false)
        {
            if let Err(discard) = self.backups.discard(&backup.id) {
                tracing::error!(backup_id = %backup.id, error = %discard, "Failed to discard unrecorded backup");
            }
            return Err(e.into());
        }
        Ok(backup)
    }

    pub fn list_backups(&self, session: &Session) -> ConsoleResult<Vec<BackupInfo>> {
        let actor = self.current(session)?;
        self.require(&actor, Operation::ListBackups)?;
        Ok(self.backups.list()?)
    }

    /// Issue a single-use restore code for `backup_id` to a system administrator.
    pub fn issue_restore_code(
        &self,
        session: &Session,
        admin_username: &str,
        backup_id: &str,
    ) -> ConsoleResult<String> {
        let actor = self.current(session)?;
        self.require(&actor, Operation::IssueRestoreCode)?;

        if !self.backups.exists(backup_id) {
            return Err(ConsoleError::UnknownBackup(backup_id.to_string()));
        }
        let admin = self
            .with_store(|s| Ok(s.find_user(admin_username)?))?
            .filter(|record| record.role() == Some(Role::SysAdmin))
            .ok_or_else(|| ValidationError::invalid("admin_username", "not a system administrator"))?;

        let code = self.restore.issue_default(backup_id, admin.id)?;
        self.audit.append(
            AuditAction::RestoreCodeIssued,
            &actor.username,
            &format!("backup {backup_id} for user {}", admin.id),
            false,
        )?;
        Ok(code)
    }

    /// Redeem a restore code and return the backup it unlocks.
    pub fn redeem_restore_code(&self, session: &Session, code: &str) -> ConsoleResult<String> {
        let actor = self.current(session)?;
        self.redeem_as(&actor, code)
    }

    fn redeem_as(&self, actor: &Session, code: &str) -> ConsoleResult<String> {
        self.require(actor, Operation::RedeemRestoreCode)?;

        match self.restore.redeem_with_reason(code, actor.user_id) {
            Ok(backup_id) => {
                self.audit.append(
                    AuditAction::RestoreCodeRedeemed,
                    &actor.username,
                    &format!("backup {backup_id}"),
                    false,
                )?;
                Ok(backup_id)
            }
            Err(reason) => {
                tracing::warn!(user = %actor.username, "Restore code rejected");
                self.audit.append(
                    AuditAction::RestoreCodeRejected,
                    &actor.username,
                    reason.as_str(),
                    true,
                )?;
                Err(InvalidCodeError.into())
            }
        }
    }

    /// Redeem `code` and replace the live database with its backup.
    ///
    /// The code is spent even if the restore itself fails.
    pub fn restore_backup(&self, session: &Session, code: &str) -> ConsoleResult<String> {
        let actor = self.current(session)?;
        let backup_id = self.redeem_as(&actor, code)?;
        let username = actor.username.as_str();

        let mut guard = self.records.write().unwrap_or_else(PoisonError::into_inner);
        // Close the database so its file can be replaced.
        drop(guard.take());

        let restored = self.backups.restore(&backup_id).map_err(ConsoleError::from);
        // Outstanding codes name admins by user id, and the restored table
        // hands those ids out again.
        let revoked = match restored {
            Ok(()) => self.restore.revoke_all(),
            Err(_) => 0,
        };
        let outcome = match RecordStore::open(&self.paths.database()) {
            Ok(store) => {
                *guard = Some(store);
                restored
            }
            Err(e) => {
                let reopen = ConsoleError::io("Cannot reopen database after restore", e);
                Err(restored.err().unwrap_or(reopen))
            }
        };
        drop(guard);

        let description = format!("backup {backup_id}, {revoked} restore code(s) revoked");
        match outcome {
            Ok(()) => {
                self.audit
                    .append(AuditAction::RestorePerformed, username, &description, false)?;
                Ok(backup_id)
            }
            Err(e) => {
                self.audit
                    .append(AuditAction::RestoreFailed, username, &description, true)?;
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Console")
            .field("paths", &self.paths)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroU32;

    use crate::storage::{AuditInspector, InspectedLine};
    use tempfile::TempDir;

    const ADMIN_PASSWORD: &str = "Admin_123?xyz";
    const STAFF_PASSWORD: &str = "Staff_pass_42!";

    fn config(dir: &TempDir) -> ConsoleConfig {
        ConsoleConfig::new(dir.path())
            .with_superadmin_password(ADMIN_PASSWORD)
            .with_password_iterations(NonZeroU32::new(1_000).unwrap())
    }

    fn setup() -> (TempDir, Console, Session) {
        let temp = TempDir::new().unwrap();
        let console = Console::open(&config(&temp)).unwrap();
        let admin = console.login(SUPERADMIN_USERNAME, ADMIN_PASSWORD).unwrap();
        (temp, console, admin)
    }

    fn staff(console: &Console, admin: &Session, username: &str, role: Role) -> Session {
        console
            .register_user(
                admin,
                NewUser {
                    username,
                    password: STAFF_PASSWORD,
                    role,
                    first_name: "Sam",
                    last_name: "Staff",
                },
            )
            .unwrap();
        console.login(username, STAFF_PASSWORD).unwrap()
    }

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn scooter() -> BTreeMap<String, String> {
        map(&[
            ("brand", "Segway"),
            ("model", "Ninebot G30"),
            ("serial_number", "SN1234567890"),
            ("soc", "80"),
        ])
    }

    fn traveller() -> BTreeMap<String, String> {
        map(&[
            ("first_name", "Jan"),
            ("last_name", "Jansen"),
            ("birthday", "1990-05-17"),
            ("gender", "M"),
            ("street_name", "Coolsingel"),
            ("house_number", "40"),
            ("zip_code", "3011AD"),
            ("city", "Rotterdam"),
            ("email", "jan@example.nl"),
            ("phone_number", "12345678"),
            ("license_number", "AB12345678"),
        ])
    }

    fn audit_entries(console: &Console) -> Vec<AuditEntry> {
        AuditInspector::new(console.paths().audit_log(), console.cipher.clone())
            .entries()
            .unwrap()
    }

    #[test]
    fn first_start_requires_admin_password() {
        let temp = TempDir::new().unwrap();
        let err = Console::open(&ConsoleConfig::new(temp.path())).unwrap_err();
        assert!(matches!(err, ConsoleError::Config(ConfigError::Missing(_))));
    }

    #[test]
    fn reopen_keeps_accounts_and_key() {
        let temp = TempDir::new().unwrap();
        {
            let console = Console::open(&config(&temp)).unwrap();
            let admin = console.login(SUPERADMIN_USERNAME, ADMIN_PASSWORD).unwrap();
            console.add_traveller(&admin, traveller()).unwrap();
        }
        let config = ConsoleConfig::new(temp.path())
            .with_password_iterations(NonZeroU32::new(1_000).unwrap());
        let console = Console::open(&config).unwrap();
        let admin = console.login(SUPERADMIN_USERNAME, ADMIN_PASSWORD).unwrap();
        let view = console.read_record(&admin, RecordKind::Traveller, 1).unwrap();
        assert_eq!(view.plain("email"), Some("jan@example.nl"));
    }

    #[test]
    fn login_failures_are_uniform_and_escalate() {
        let (_temp, console, _) = setup();
        assert!(matches!(
            console.login(SUPERADMIN_USERNAME, "Wrong_pass_123"),
            Err(ConsoleError::AuthFailure)
        ));
        assert!(matches!(
            console.login("nobody_here", "Wrong_pass_123"),
            Err(ConsoleError::AuthFailure)
        ));
        for _ in 0..2 {
            let _ = console.login(SUPERADMIN_USERNAME, "Wrong_pass_123");
        }

        let failures: Vec<_> = audit_entries(&console)
            .into_iter()
            .filter(|e| e.action == AuditAction::LoginFailed)
            .collect();
        assert_eq!(failures.len(), 4);
        assert!(!failures[0].suspicious);
        assert!(failures[3].suspicious);
    }

    #[test]
    fn engineer_update_is_all_or_nothing() {
        let (_temp, console, admin) = setup();
        let id = console.add_scooter(&admin, scooter()).unwrap();
        let engineer = staff(&console, &admin, "engineer1", Role::Engineer);

        console
            .change_field(&engineer, RecordKind::Scooter, id, "soc", "55")
            .unwrap();

        let err = console
            .update_record(
                &engineer,
                RecordKind::Scooter,
                id,
                map(&[("soc", "10"), ("brand", "Other")]),
            )
            .unwrap_err();
        assert!(matches!(&err, ConsoleError::Forbidden(f) if f.rejected == vec!["brand"]));

        let view = console.read_record(&engineer, RecordKind::Scooter, id).unwrap();
        assert_eq!(view.plain("soc"), Some("55"));
        assert_eq!(view.plain("brand"), Some("Segway"));

        let denied = audit_entries(&console)
            .into_iter()
            .find(|e| e.action == AuditAction::FieldChangeDenied)
            .unwrap();
        assert!(denied.suspicious);
    }

    #[test]
    fn invalid_value_applies_nothing() {
        let (_temp, console, admin) = setup();
        let id = console.add_scooter(&admin, scooter()).unwrap();
        let err = console
            .update_record(&admin, RecordKind::Scooter, id, map(&[("soc", "20"), ("latitude", "10.0")]))
            .unwrap_err();
        assert_eq!(err.error_code(), "validation_error");
        let view = console.read_record(&admin, RecordKind::Scooter, id).unwrap();
        assert_eq!(view.plain("soc"), Some("80"));
    }

    #[test]
    fn pii_is_encrypted_at_rest_and_absent_from_audit() {
        let (_temp, console, admin) = setup();
        let id = console.add_traveller(&admin, traveller()).unwrap();

        let stored = console
            .with_store(|s| Ok(s.get(RecordKind::Traveller, id)?))
            .unwrap()
            .unwrap();
        assert_ne!(stored.field("email"), Some("jan@example.nl"));
        assert_eq!(stored.field("city"), Some("Rotterdam"));

        let view = console.read_record(&admin, RecordKind::Traveller, id).unwrap();
        assert_eq!(view.plain("phone_number"), Some("+31-6-12345678"));

        console
            .change_field(&admin, RecordKind::Traveller, id, "email", "new@example.nl")
            .unwrap();
        for entry in audit_entries(&console) {
            assert!(!entry.description.contains("example.nl"), "{entry:?}");
        }
    }

    #[test]
    fn tampered_field_reads_as_unreadable() {
        let (_temp, console, admin) = setup();
        let id = console.add_traveller(&admin, traveller()).unwrap();

        let forged = AccessPolicy::authorize_update(
            Role::SuperAdmin,
            RecordKind::Traveller,
            id,
            map(&[("email", "not-a-token")]),
        )
        .unwrap()
        .seal(|_, _, raw| Ok::<_, ()>(raw.to_string()))
        .unwrap();
        console
            .with_store(|s| Ok(s.apply(&forged, |_| Ok(()))?))
            .unwrap();

        let view = console.read_record(&admin, RecordKind::Traveller, id).unwrap();
        assert_eq!(view.fields["email"], FieldView::Unreadable);
        assert_eq!(view.plain("license_number"), Some("AB12345678"));
        assert!(audit_entries(&console)
            .iter()
            .any(|e| e.action == AuditAction::RecordUnreadable && e.suspicious));
    }

    #[test]
    fn reserved_admin_is_protected() {
        let (_temp, console, admin) = setup();
        assert!(matches!(
            console.delete_record(&admin, RecordKind::User, RESERVED_ADMIN_ID),
            Err(ConsoleError::Reserved(_))
        ));
        assert!(matches!(
            console.change_user_role(&admin, RESERVED_ADMIN_ID, Role::Engineer),
            Err(ConsoleError::Reserved(_))
        ));
        assert!(console.login(SUPERADMIN_USERNAME, ADMIN_PASSWORD).is_ok());
    }

    #[test]
    fn role_change_applies_to_open_sessions() {
        let (_temp, console, admin) = setup();
        let engineer = staff(&console, &admin, "engineer1", Role::Engineer);
        assert!(matches!(
            console.add_scooter(&engineer, scooter()),
            Err(ConsoleError::NotPermitted(_))
        ));

        console
            .change_user_role(&admin, engineer.user_id, Role::SysAdmin)
            .unwrap();
        assert!(console.add_scooter(&engineer, scooter()).is_ok());

        console
            .delete_record(&admin, RecordKind::User, engineer.user_id)
            .unwrap();
        assert!(matches!(
            console.list_records(&engineer, RecordKind::Scooter),
            Err(ConsoleError::AuthFailure)
        ));
    }

    #[test]
    fn superadmin_role_cannot_be_granted() {
        let (_temp, console, admin) = setup();
        let engineer = staff(&console, &admin, "engineer1", Role::Engineer);
        assert!(matches!(
            console.change_user_role(&admin, engineer.user_id, Role::SuperAdmin),
            Err(ConsoleError::Validation(_))
        ));
    }

    #[test]
    fn weak_password_is_rejected_generically() {
        let (_temp, console, admin) = setup();
        let err = console
            .register_user(
                &admin,
                NewUser {
                    username: "newstaff1",
                    password: "weak",
                    role: Role::Engineer,
                    first_name: "N",
                    last_name: "S",
                },
            )
            .unwrap_err();
        assert_eq!(err.user_message(), "Password does not meet the password policy.");
    }

    #[test]
    fn change_password_requires_current_password() {
        let (_temp, console, admin) = setup();
        let engineer = staff(&console, &admin, "engineer1", Role::Engineer);
        assert!(matches!(
            console.change_password(&engineer, "Wrong_pass_123", "Fresh_pass_99!"),
            Err(ConsoleError::AuthFailure)
        ));
        console
            .change_password(&engineer, STAFF_PASSWORD, "Fresh_pass_99!")
            .unwrap();
        assert!(console.login("engineer1", "Fresh_pass_99!").is_ok());
        assert!(console.login("engineer1", STAFF_PASSWORD).is_err());
    }

    #[test]
    fn restore_with_code_reverts_database_once() {
        let (_temp, console, admin) = setup();
        let sysadmin = staff(&console, &admin, "sysadmin1", Role::SysAdmin);
        let id = console.add_scooter(&admin, scooter()).unwrap();
        let backup = console.create_backup(&sysadmin).unwrap();

        console
            .change_field(&sysadmin, RecordKind::Scooter, id, "brand", "Changed")
            .unwrap();
        let code = console
            .issue_restore_code(&admin, "sysadmin1", &backup.id)
            .unwrap();

        assert_eq!(console.restore_backup(&sysadmin, &code).unwrap(), backup.id);
        let view = console.read_record(&sysadmin, RecordKind::Scooter, id).unwrap();
        assert_eq!(view.plain("brand"), Some("Segway"));

        assert!(matches!(
            console.restore_backup(&sysadmin, &code),
            Err(ConsoleError::InvalidCode(_))
        ));
        let actions: Vec<_> = audit_entries(&console).into_iter().map(|e| e.action).collect();
        assert!(actions.contains(&AuditAction::RestorePerformed));
        assert!(actions.contains(&AuditAction::RestoreCodeRejected));
    }

    #[test]
    fn restore_codes_are_bound_to_one_admin() {
        let (_temp, console, admin) = setup();
        let first = staff(&console, &admin, "sysadmin1", Role::SysAdmin);
        let second = staff(&console, &admin, "sysadmin2", Role::SysAdmin);
        let backup = console.create_backup(&admin).unwrap();
        let code = console
            .issue_restore_code(&admin, "sysadmin1", &backup.id)
            .unwrap();

        assert!(matches!(
            console.redeem_restore_code(&second, &code),
            Err(ConsoleError::InvalidCode(_))
        ));
        assert_eq!(console.redeem_restore_code(&first, &code).unwrap(), backup.id);
    }

    #[test]
    fn restore_revokes_codes_for_reused_user_ids() {
        let (_temp, console, admin) = setup();
        let first = staff(&console, &admin, "sysadmin1", Role::SysAdmin);
        let backup = console.create_backup(&first).unwrap();

        let second = staff(&console, &admin, "sysadmin2", Role::SysAdmin);
        let stale = console
            .issue_restore_code(&admin, "sysadmin2", &backup.id)
            .unwrap();
        let code = console
            .issue_restore_code(&admin, "sysadmin1", &backup.id)
            .unwrap();
        console.restore_backup(&first, &code).unwrap();

        let mallory = staff(&console, &admin, "mallory_1", Role::SysAdmin);
        assert_eq!(mallory.user_id, second.user_id);
        assert!(matches!(
            console.redeem_restore_code(&mallory, &stale),
            Err(ConsoleError::InvalidCode(_))
        ));
        assert_eq!(console.restore_authority().tracked_count(), 0);
    }

    #[test]
    fn restore_audits_the_stored_username() {
        let (_temp, console, admin) = setup();
        let sysadmin = staff(&console, &admin, "sysadmin1", Role::SysAdmin);
        let backup = console.create_backup(&sysadmin).unwrap();
        let code = console
            .issue_restore_code(&admin, "sysadmin1", &backup.id)
            .unwrap();

        let forged = Session {
            username: "someone_else".to_string(),
            ..sysadmin.clone()
        };
        assert!(matches!(
            console.restore_backup(&forged, &code),
            Err(ConsoleError::AuthFailure)
        ));
        console.restore_backup(&sysadmin, &code).unwrap();

        let performed = audit_entries(&console)
            .into_iter()
            .find(|e| e.action == AuditAction::RestorePerformed)
            .unwrap();
        assert_eq!(performed.actor, "sysadmin1");
        assert!(audit_entries(&console)
            .iter()
            .all(|e| e.actor != "someone_else"));
    }

    #[test]
    fn unwritable_audit_log_leaves_records_unchanged() {
        let (_temp, console, admin) = setup();
        let id = console.add_scooter(&admin, scooter()).unwrap();

        let log = console.paths().audit_log();
        std::fs::remove_file(&log).unwrap();
        std::fs::create_dir(&log).unwrap();

        let err = console
            .change_field(&admin, RecordKind::Scooter, id, "soc", "5")
            .unwrap_err();
        assert_eq!(err.error_code(), "io_failure");
        assert!(console.add_scooter(&admin, scooter()).is_err());
        assert!(console.delete_record(&admin, RecordKind::Scooter, id).is_err());
        assert!(console.create_backup(&admin).is_err());

        std::fs::remove_dir(&log).unwrap();
        let view = console.read_record(&admin, RecordKind::Scooter, id).unwrap();
        assert_eq!(view.plain("soc"), Some("80"));
        assert_eq!(console.list_records(&admin, RecordKind::Scooter).unwrap().len(), 1);
        assert!(console.list_backups(&admin).unwrap().is_empty());
    }

    #[test]
    fn restore_codes_need_the_right_roles() {
        let (_temp, console, admin) = setup();
        let sysadmin = staff(&console, &admin, "sysadmin1", Role::SysAdmin);
        let engineer = staff(&console, &admin, "engineer1", Role::Engineer);
        let backup = console.create_backup(&admin).unwrap();

        assert!(matches!(
            console.issue_restore_code(&sysadmin, "sysadmin1", &backup.id),
            Err(ConsoleError::NotPermitted(_))
        ));
        assert!(matches!(
            console.issue_restore_code(&admin, "engineer1", &backup.id),
            Err(ConsoleError::Validation(_))
        ));
        assert!(matches!(
            console.issue_restore_code(&admin, "sysadmin1", "backup_missing"),
            Err(ConsoleError::UnknownBackup(_))
        ));
        assert!(matches!(
            console.redeem_restore_code(&engineer, "ABCDEFGHJK"),
            Err(ConsoleError::NotPermitted(_))
        ));
    }

    #[test]
    fn missing_required_field_is_named() {
        let (_temp, console, admin) = setup();
        let mut fields = traveller();
        fields.remove("zip_code");
        assert!(matches!(
            console.add_traveller(&admin, fields),
            Err(ConsoleError::Validation(ValidationError::MissingField("zip_code")))
        ));
    }

    #[test]
    fn audit_lines_all_decrypt() {
        let (_temp, console, admin) = setup();
        console.add_scooter(&admin, scooter()).unwrap();
        let lines = AuditInspector::new(console.paths().audit_log(), console.cipher.clone())
            .inspect()
            .unwrap();
        assert!(lines.iter().all(|l| matches!(l, InspectedLine::Entry(_))));
    }
}
