// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit logging for security-sensitive operations.
//!
//! Logins, record changes, denials, backups and restores are appended to a
//! single encrypted log file.
//!
//! ## Format
//!
//! Each line is one [`FieldCipher`] token whose plaintext is:
//!
//! ```text
//! 17-10-2026 09:14:02 | super_admin | field_changed | scooter 4: soc | Normal
//! ```
//!
//! The file is only ever appended to. Writers are serialized by a mutex held
//! for the whole write, so entries land in the order their `log` calls
//! acquired it.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::{EncryptionError, FieldCipher};

/// Timestamp layout inside an entry.
pub const TIMESTAMP_FORMAT: &str = "%d-%m-%Y %H:%M:%S";

const SEPARATOR: &str = " | ";

/// Types of auditable events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    // Session events
    LoginSucceeded,
    LoginFailed,

    // Account events
    UserRegistered,
    UserDeleted,
    PasswordChanged,
    RoleChanged,

    // Record events
    RecordCreated,
    RecordDeleted,
    FieldChanged,
    FieldChangeDenied,
    OperationDenied,
    RecordUnreadable,

    // Backup events
    BackupCreated,
    RestoreCodeIssued,
    RestoreCodeRedeemed,
    RestoreCodeRejected,
    RestorePerformed,
    RestoreFailed,
}

impl AuditAction {
    pub const ALL: [AuditAction; 18] = [
        AuditAction::LoginSucceeded,
        AuditAction::LoginFailed,
        AuditAction::UserRegistered,
        AuditAction::UserDeleted,
        AuditAction::PasswordChanged,
        AuditAction::RoleChanged,
        AuditAction::RecordCreated,
        AuditAction::RecordDeleted,
        AuditAction::FieldChanged,
        AuditAction::FieldChangeDenied,
        AuditAction::OperationDenied,
        AuditAction::RecordUnreadable,
        AuditAction::BackupCreated,
        AuditAction::RestoreCodeIssued,
        AuditAction::RestoreCodeRedeemed,
        AuditAction::RestoreCodeRejected,
        AuditAction::RestorePerformed,
        AuditAction::RestoreFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::LoginSucceeded => "login_succeeded",
            AuditAction::LoginFailed => "login_failed",
            AuditAction::UserRegistered => "user_registered",
            AuditAction::UserDeleted => "user_deleted",
            AuditAction::PasswordChanged => "password_changed",
            AuditAction::RoleChanged => "role_changed",
            AuditAction::RecordCreated => "record_created",
            AuditAction::RecordDeleted => "record_deleted",
            AuditAction::FieldChanged => "field_changed",
            AuditAction::FieldChangeDenied => "field_change_denied",
            AuditAction::OperationDenied => "operation_denied",
            AuditAction::RecordUnreadable => "record_unreadable",
            AuditAction::BackupCreated => "backup_created",
            AuditAction::RestoreCodeIssued => "restore_code_issued",
            AuditAction::RestoreCodeRedeemed => "restore_code_redeemed",
            AuditAction::RestoreCodeRejected => "restore_code_rejected",
            AuditAction::RestorePerformed => "restore_performed",
            AuditAction::RestoreFailed => "restore_failed",
        }
    }

    pub fn parse(s: &str) -> Option<AuditAction> {
        Self::ALL.into_iter().find(|a| a.as_str() == s)
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An audit log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    /// When the event occurred (second precision).
    pub timestamp: DateTime<Utc>,
    /// Username of whoever triggered the event.
    pub actor: String,
    pub action: AuditAction,
    pub description: String,
    pub suspicious: bool,
}

impl AuditEntry {
    /// Create a new entry stamped with the current time.
    pub fn new(action: AuditAction, actor: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            actor: actor.into(),
            action,
            description: String::new(),
            suspicious: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Flag the entry for review.
    pub fn suspicious(mut self) -> Self {
        self.suspicious = true;
        self
    }

    /// Plaintext line, without the trailing newline.
    pub fn render(&self) -> String {
        [
            self.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            sanitize(&self.actor),
            self.action.as_str().to_string(),
            sanitize(&self.description),
            if self.suspicious { "SUSPICIOUS" } else { "Normal" }.to_string(),
        ]
        .join(SEPARATOR)
    }

    /// Parse a rendered line back into an entry.
    pub fn parse(line: &str) -> Option<AuditEntry> {
        let parts: Vec<&str> = line.split('|').map(str::trim).collect();
        let [timestamp, actor, action, description, flag] = parts.as_slice() else {
            return None;
        };
        let timestamp = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT)
            .ok()?
            .and_utc();
        let suspicious = match *flag {
            "SUSPICIOUS" => true,
            "Normal" => false,
            _ => return None,
        };
        Some(AuditEntry {
            timestamp,
            actor: actor.to_string(),
            action: AuditAction::parse(action)?,
            description: description.to_string(),
            suspicious,
        })
    }
}

/// Replace separators and control characters so a field cannot break the line layout.
fn sanitize(field: &str) -> String {
    field
        .chars()
        .map(|c| if c == '|' || c.is_control() { ' ' } else { c })
        .collect()
}

/// Audit write failure.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit log I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("audit entry could not be encrypted: {0}")]
    Encryption(#[from] EncryptionError),
}

/// Append-only, encrypted audit log.
pub struct AuditLog {
    path: PathBuf,
    cipher: Arc<FieldCipher>,
    writer: Mutex<()>,
}

impl AuditLog {
    /// Open (creating if needed) the log at `path`.
    pub fn open(path: impl AsRef<Path>, cipher: Arc<FieldCipher>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        open_append(&path)?;
        Ok(Self {
            path,
            cipher,
            writer: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry stamped with the current time.
    pub fn append(
        &self,
        action: AuditAction,
        actor: &str,
        description: &str,
        suspicious: bool,
    ) -> Result<(), AuditError> {
        let mut entry = AuditEntry::new(action, actor).with_description(description);
        entry.suspicious = suspicious;
        self.log(&entry)
    }

    /// Log an audit entry.
    pub fn log(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        let mut line = self.cipher.encrypt(&entry.render())?;
        line.push('\n');

        // A panic in another writer cannot leave a partial record behind this
        // guard; the tail repair below handles a torn write.
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let mut file = open_append(&self.path)?;
        terminate_torn_line(&mut file)?;
        file.write_all(line.as_bytes())?;
        file.sync_data()?;

        if entry.suspicious {
            tracing::warn!(action = %entry.action, actor = %entry.actor, "Suspicious activity recorded");
        } else {
            tracing::debug!(action = %entry.action, actor = %entry.actor, "Audit entry recorded");
        }
        Ok(())
    }
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog").field("path", &self.path).finish_non_exhaustive()
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.read(true).append(true).create(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

/// Close an unterminated last line so it cannot swallow the next entry.
fn terminate_torn_line(file: &mut File) -> io::Result<()> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(());
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    if last[0] != b'\n' {
        tracing::warn!("Audit log ended with a torn entry; terminating it");
        file.write_all(b"\n")?;
    }
    Ok(())
}

/// One line of the audit file as seen by [`AuditInspector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InspectedLine {
    Entry(AuditEntry),
    /// The line did not decrypt with the current key.
    Unreadable { line_no: usize },
    /// Decrypted, but not in entry layout.
    Malformed { line_no: usize },
    /// The file ends without a newline after this line.
    Truncated { line_no: usize },
}

/// Read-only, line-by-line decryption of the audit file.
pub struct AuditInspector {
    path: PathBuf,
    cipher: Arc<FieldCipher>,
}

impl AuditInspector {
    pub fn new(path: impl AsRef<Path>, cipher: Arc<FieldCipher>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            cipher,
        }
    }

    /// Decrypt every line. Bad lines are reported, not fatal.
    pub fn inspect(&self) -> Result<Vec<InspectedLine>, AuditError> {
        let content = match std::fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let complete = content.ends_with(b"\n");
        let lines: Vec<&[u8]> = content.split(|b| *b == b'\n').collect();
        let last = lines.len() - 1;

        let mut out = Vec::new();
        for (idx, line) in lines.iter().enumerate() {
            let line_no = idx + 1;
            if idx == last {
                if !complete && !line.is_empty() {
                    out.push(InspectedLine::Truncated { line_no });
                }
                break;
            }
            if line.is_empty() {
                continue;
            }
            let decrypted = std::str::from_utf8(line)
                .ok()
                .and_then(|token| self.cipher.decrypt(token).ok());
            out.push(match decrypted {
                Some(plain) => match AuditEntry::parse(&plain) {
                    Some(entry) => InspectedLine::Entry(entry),
                    None => InspectedLine::Malformed { line_no },
                },
                None => InspectedLine::Unreadable { line_no },
            });
        }
        Ok(out)
    }

    /// Only the entries that decrypted and parsed.
    pub fn entries(&self) -> Result<Vec<AuditEntry>, AuditError> {
        Ok(self
            .inspect()?
            .into_iter()
            .filter_map(|line| match line {
                InspectedLine::Entry(entry) => Some(entry),
                _ => None,
            })
            .collect())
    }
}
