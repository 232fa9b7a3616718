// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authorization errors.

use crate::auth::access::{Operation, ProtectedAction};
use crate::auth::Role;
use crate::models::RecordKind;

/// An update named at least one field the caller may not change.
///
/// Nothing from the update is applied when this is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{role} may not modify {kind} field(s): {}", .rejected.join(", "))]
pub struct ForbiddenFieldError {
    pub role: Role,
    pub kind: RecordKind,
    /// Every rejected field, in name order.
    pub rejected: Vec<String>,
}

/// Attempt to delete or demote the reserved administrator account.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("the reserved administrator account cannot be {}", .action.verb())]
pub struct ReservedRecordError {
    pub action: ProtectedAction,
}

/// The caller's role does not grant the requested operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{role} is not permitted to {}", .operation.describe())]
pub struct OperationDenied {
    pub role: Role,
    pub operation: Operation,
}

impl ForbiddenFieldError {
    pub fn error_code(&self) -> &'static str {
        "forbidden_field"
    }
}

impl ReservedRecordError {
    pub fn error_code(&self) -> &'static str {
        "reserved_record"
    }
}

impl OperationDenied {
    pub fn error_code(&self) -> &'static str {
        "operation_denied"
    }
}
