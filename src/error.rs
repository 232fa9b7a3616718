// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Console-level error taxonomy.
//!
//! Module errors convert into [`ConsoleError`]. Integrity and I/O failures
//! are logged in full where they are converted; callers only ever see
//! [`ConsoleError::user_message`].

use crate::auth::{ForbiddenFieldError, OperationDenied, ReservedRecordError, ValidationError};
use crate::config::ConfigError;
use crate::crypto::{CredentialError, DecryptionError, EncryptionError, KeyCorruptError, KeyVaultError};
use crate::models::RecordKind;
use crate::restore::{InvalidCodeError, IssueError};
use crate::storage::{AuditError, BackupError, RecordStoreError};

#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Forbidden(#[from] ForbiddenFieldError),

    #[error(transparent)]
    Reserved(#[from] ReservedRecordError),

    #[error(transparent)]
    NotPermitted(#[from] OperationDenied),

    #[error("invalid username or password")]
    AuthFailure,

    #[error(transparent)]
    Decryption(#[from] DecryptionError),

    #[error(transparent)]
    KeyCorrupt(#[from] KeyCorruptError),

    #[error(transparent)]
    InvalidCode(#[from] InvalidCodeError),

    #[error("{kind} {id} not found")]
    NotFound { kind: RecordKind, id: u64 },

    #[error("unknown backup '{0}'")]
    UnknownBackup(String),

    #[error("I/O failure: {0}")]
    IoFailure(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type ConsoleResult<T> = Result<T, ConsoleError>;

impl ConsoleError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            ConsoleError::Validation(_) => "validation_error",
            ConsoleError::Forbidden(_) => "forbidden_field",
            ConsoleError::Reserved(_) => "reserved_record",
            ConsoleError::NotPermitted(_) => "operation_denied",
            ConsoleError::AuthFailure => "auth_failure",
            ConsoleError::Decryption(_) => "decryption_error",
            ConsoleError::KeyCorrupt(_) => "key_corrupt",
            ConsoleError::InvalidCode(_) => "invalid_code",
            ConsoleError::NotFound { .. } => "not_found",
            ConsoleError::UnknownBackup(_) => "unknown_backup",
            ConsoleError::IoFailure(_) => "io_failure",
            ConsoleError::Config(_) => "config_error",
        }
    }

    /// Reduced text safe to show the person at the console.
    pub fn user_message(&self) -> String {
        match self {
            ConsoleError::Validation(e) if e.is_password_rule() => {
                "Password does not meet the password policy.".to_string()
            }
            ConsoleError::Validation(e) => format!("Invalid input: {e}."),
            ConsoleError::Forbidden(e) => {
                format!("You are not allowed to change: {}.", e.rejected.join(", "))
            }
            ConsoleError::Reserved(e) => format!("Not allowed: {e}."),
            ConsoleError::NotPermitted(_) => {
                "You do not have permission to perform this action.".to_string()
            }
            ConsoleError::AuthFailure => "Invalid username or password.".to_string(),
            ConsoleError::Decryption(_) => "Stored data could not be decrypted.".to_string(),
            ConsoleError::KeyCorrupt(_) => {
                "The encryption key file is damaged. Contact the system owner.".to_string()
            }
            ConsoleError::InvalidCode(_) => "Invalid restore code.".to_string(),
            ConsoleError::NotFound { kind, id } => format!("No {kind} with id {id}."),
            ConsoleError::UnknownBackup(_) => "Unknown backup.".to_string(),
            ConsoleError::IoFailure(_) => {
                "A storage error occurred. The details were logged.".to_string()
            }
            ConsoleError::Config(e) => format!("Configuration error: {e}."),
        }
    }

    pub(crate) fn io(context: &'static str, detail: impl std::fmt::Display) -> Self {
        tracing::error!(error = %detail, "{context}");
        ConsoleError::IoFailure(format!("{context}: {detail}"))
    }
}

impl From<KeyVaultError> for ConsoleError {
    fn from(e: KeyVaultError) -> Self {
        match e {
            KeyVaultError::Corrupt(corrupt) => ConsoleError::KeyCorrupt(corrupt),
            other => ConsoleError::io("Key vault failure", other),
        }
    }
}

impl From<RecordStoreError> for ConsoleError {
    fn from(e: RecordStoreError) -> Self {
        match e {
            RecordStoreError::NotFound { kind, id } => ConsoleError::NotFound { kind, id },
            RecordStoreError::UsernameTaken(_) => {
                ConsoleError::Validation(ValidationError::invalid("username", "already taken"))
            }
            RecordStoreError::Audit(e) => e.into(),
            other => ConsoleError::io("Record store failure", other),
        }
    }
}

impl From<AuditError> for ConsoleError {
    fn from(e: AuditError) -> Self {
        ConsoleError::io("Audit log failure", e)
    }
}

impl From<BackupError> for ConsoleError {
    fn from(e: BackupError) -> Self {
        match e {
            BackupError::InvalidId(id) | BackupError::NotFound(id) => ConsoleError::UnknownBackup(id),
            BackupError::Io(io) => ConsoleError::io("Backup failure", io),
        }
    }
}

impl From<EncryptionError> for ConsoleError {
    fn from(e: EncryptionError) -> Self {
        ConsoleError::io("Field encryption failure", e)
    }
}

impl From<CredentialError> for ConsoleError {
    fn from(e: CredentialError) -> Self {
        ConsoleError::io("Password hashing failure", e)
    }
}

impl From<IssueError> for ConsoleError {
    fn from(e: IssueError) -> Self {
        ConsoleError::io("Restore code issue failure", e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;

    #[test]
    fn password_rules_are_reported_generically() {
        let err = ConsoleError::from(ValidationError::PasswordDigit);
        assert_eq!(err.error_code(), "validation_error");
        assert_eq!(err.user_message(), "Password does not meet the password policy.");
    }

    #[test]
    fn forbidden_names_fields() {
        let err = ConsoleError::from(ForbiddenFieldError {
            role: Role::Engineer,
            kind: RecordKind::Scooter,
            rejected: vec!["brand".into()],
        });
        assert_eq!(err.user_message(), "You are not allowed to change: brand.");
    }

    #[test]
    fn io_failures_hide_detail_from_user() {
        let err = ConsoleError::from(BackupError::Io(std::io::Error::other("disk on fire")));
        assert_eq!(err.error_code(), "io_failure");
        assert!(!err.user_message().contains("disk"));
        assert!(err.to_string().contains("disk on fire"));
    }

    #[test]
    fn store_errors_map_to_console_variants() {
        let err = ConsoleError::from(RecordStoreError::NotFound {
            kind: RecordKind::Traveller,
            id: 9,
        });
        assert!(matches!(err, ConsoleError::NotFound { id: 9, .. }));

        let err = ConsoleError::from(RecordStoreError::UsernameTaken("x".into()));
        assert_eq!(err.error_code(), "validation_error");

        let err = ConsoleError::from(RecordStoreError::Audit(AuditError::Io(
            std::io::Error::other("log gone"),
        )));
        assert_eq!(err.error_code(), "io_failure");
        assert!(err.to_string().contains("log gone"));

        let err = ConsoleError::from(BackupError::InvalidId("../x".into()));
        assert!(matches!(err, ConsoleError::UnknownBackup(_)));
    }

    #[test]
    fn invalid_code_is_uniform() {
        assert_eq!(
            ConsoleError::from(InvalidCodeError).user_message(),
            "Invalid restore code."
        );
    }
}
