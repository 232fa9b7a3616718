// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Access Policy
//!
//! Role-scoped authorization for record changes and console operations.
//!
//! ## Field Grants
//!
//! | Role       | scooter                       | traveller | user |
//! |------------|-------------------------------|-----------|------|
//! | superadmin | all                           | all       | all  |
//! | sysadmin   | all                           | all       | none |
//! | engineer   | soc, mileage, out_of_service  | none      | none |
//!
//! The table is an exhaustive match over `Role × RecordKind`; adding a role or
//! a kind fails to compile until it is given a grant. Anything not granted is
//! denied, including field names the kind does not have.
//!
//! ## Flow
//!
//! 1. [`AccessPolicy::authorize_update`] turns a requested change set into an
//!    [`ApprovedUpdate`], or refuses the whole set.
//! 2. [`ApprovedUpdate::seal`] runs value validation and PII encryption.
//! 3. Only a [`SealedUpdate`] can be applied by the record store.

use std::collections::BTreeMap;

use super::error::{ForbiddenFieldError, OperationDenied, ReservedRecordError};
use super::roles::Role;
use crate::models::RecordKind;

/// Id of the built-in top-level administrator.
pub const RESERVED_ADMIN_ID: u64 = 1;

const ENGINEER_SCOOTER_FIELDS: &[&str] = &["soc", "mileage", "out_of_service"];

/// Which fields of one record kind a role may change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldGrant {
    All,
    Only(&'static [&'static str]),
    Nothing,
}

/// Non-field actions gated by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ViewScooters,
    AddScooter,
    DeleteScooter,
    ViewTravellers,
    AddTraveller,
    DeleteTraveller,
    ViewUsers,
    AddUser,
    DeleteUser,
    CreateBackup,
    ListBackups,
    IssueRestoreCode,
    RedeemRestoreCode,
}

impl Operation {
    pub fn view(kind: RecordKind) -> Operation {
        match kind {
            RecordKind::Scooter => Operation::ViewScooters,
            RecordKind::Traveller => Operation::ViewTravellers,
            RecordKind::User => Operation::ViewUsers,
        }
    }

    pub fn add(kind: RecordKind) -> Operation {
        match kind {
            RecordKind::Scooter => Operation::AddScooter,
            RecordKind::Traveller => Operation::AddTraveller,
            RecordKind::User => Operation::AddUser,
        }
    }

    pub fn delete(kind: RecordKind) -> Operation {
        match kind {
            RecordKind::Scooter => Operation::DeleteScooter,
            RecordKind::Traveller => Operation::DeleteTraveller,
            RecordKind::User => Operation::DeleteUser,
        }
    }

    /// Whether `role` may perform this operation.
    pub fn permits(&self, role: Role) -> bool {
        match role {
            Role::SuperAdmin => true,
            Role::SysAdmin => match self {
                Operation::ViewScooters
                | Operation::AddScooter
                | Operation::DeleteScooter
                | Operation::ViewTravellers
                | Operation::AddTraveller
                | Operation::DeleteTraveller
                | Operation::CreateBackup
                | Operation::ListBackups
                | Operation::RedeemRestoreCode => true,
                Operation::ViewUsers
                | Operation::AddUser
                | Operation::DeleteUser
                | Operation::IssueRestoreCode => false,
            },
            Role::Engineer => matches!(self, Operation::ViewScooters),
        }
    }

    /// Fail with [`OperationDenied`] unless `role` may perform this operation.
    pub fn require(self, role: Role) -> Result<(), OperationDenied> {
        if self.permits(role) {
            Ok(())
        } else {
            Err(OperationDenied {
                role,
                operation: self,
            })
        }
    }

    /// Short phrase for messages and audit descriptions.
    pub fn describe(&self) -> &'static str {
        match self {
            Operation::ViewScooters => "view scooters",
            Operation::AddScooter => "add scooters",
            Operation::DeleteScooter => "delete scooters",
            Operation::ViewTravellers => "view travellers",
            Operation::AddTraveller => "add travellers",
            Operation::DeleteTraveller => "delete travellers",
            Operation::ViewUsers => "view users",
            Operation::AddUser => "add users",
            Operation::DeleteUser => "delete users",
            Operation::CreateBackup => "create backups",
            Operation::ListBackups => "list backups",
            Operation::IssueRestoreCode => "issue restore codes",
            Operation::RedeemRestoreCode => "redeem restore codes",
        }
    }
}

/// Action that is never allowed on the reserved administrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectedAction {
    Delete,
    ChangeRole,
}

impl ProtectedAction {
    pub(crate) fn verb(&self) -> &'static str {
        match self {
            ProtectedAction::Delete => "deleted",
            ProtectedAction::ChangeRole => "given another role",
        }
    }
}

/// Split of a requested field set into what the role may and may not change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldDecision {
    pub accepted: Vec<String>,
    pub rejected: Vec<String>,
}

impl FieldDecision {
    pub fn is_fully_accepted(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Stateless field and operation authorization.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessPolicy;

impl AccessPolicy {
    fn grant(role: Role, kind: RecordKind) -> FieldGrant {
        match (role, kind) {
            (Role::SuperAdmin, RecordKind::Scooter) => FieldGrant::All,
            (Role::SuperAdmin, RecordKind::Traveller) => FieldGrant::All,
            (Role::SuperAdmin, RecordKind::User) => FieldGrant::All,
            (Role::SysAdmin, RecordKind::Scooter) => FieldGrant::All,
            (Role::SysAdmin, RecordKind::Traveller) => FieldGrant::All,
            (Role::SysAdmin, RecordKind::User) => FieldGrant::Nothing,
            (Role::Engineer, RecordKind::Scooter) => FieldGrant::Only(ENGINEER_SCOOTER_FIELDS),
            (Role::Engineer, RecordKind::Traveller) => FieldGrant::Nothing,
            (Role::Engineer, RecordKind::User) => FieldGrant::Nothing,
        }
    }

    /// Fields of `kind` that `role` may change, in catalog order.
    pub fn authorized_fields(role: Role, kind: RecordKind) -> Vec<&'static str> {
        match Self::grant(role, kind) {
            FieldGrant::All => kind.fields().to_vec(),
            FieldGrant::Only(fields) => kind
                .fields()
                .iter()
                .copied()
                .filter(|f| fields.contains(f))
                .collect(),
            FieldGrant::Nothing => Vec::new(),
        }
    }

    /// Whether `role` may change `field` on a record of `kind`.
    pub fn may_modify(role: Role, kind: RecordKind, field: &str) -> bool {
        if kind.field(field).is_none() {
            return false;
        }
        match Self::grant(role, kind) {
            FieldGrant::All => true,
            FieldGrant::Only(fields) => fields.contains(&field),
            FieldGrant::Nothing => false,
        }
    }

    /// Partition `requested` into accepted and rejected field names.
    ///
    /// Both lists are sorted and free of duplicates.
    pub fn filter_update<'a, I>(role: Role, kind: RecordKind, requested: I) -> FieldDecision
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut decision = FieldDecision::default();
        let mut names: Vec<&str> = requested.into_iter().collect();
        names.sort_unstable();
        names.dedup();

        for name in names {
            if Self::may_modify(role, kind, name) {
                decision.accepted.push(name.to_string());
            } else {
                decision.rejected.push(name.to_string());
            }
        }
        decision
    }

    /// Authorize a whole change set, or refuse it entirely.
    pub fn authorize_update(
        role: Role,
        kind: RecordKind,
        record_id: u64,
        changes: BTreeMap<String, String>,
    ) -> Result<ApprovedUpdate, ForbiddenFieldError> {
        let decision = Self::filter_update(role, kind, changes.keys().map(String::as_str));
        if !decision.is_fully_accepted() {
            return Err(ForbiddenFieldError {
                role,
                kind,
                rejected: decision.rejected,
            });
        }

        let mut approved = BTreeMap::new();
        for (name, value) in changes {
            // Every accepted name is in the catalog.
            if let Some(field) = kind.field(&name) {
                approved.insert(field, value);
            }
        }

        Ok(ApprovedUpdate {
            kind,
            record_id,
            changes: approved,
        })
    }

    /// Refuse `action` on the reserved administrator account.
    pub fn guard_reserved(
        kind: RecordKind,
        record_id: u64,
        action: ProtectedAction,
    ) -> Result<(), ReservedRecordError> {
        if kind == RecordKind::User && record_id == RESERVED_ADMIN_ID {
            Err(ReservedRecordError { action })
        } else {
            Ok(())
        }
    }
}

/// A change set the policy has accepted, not yet validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovedUpdate {
    kind: RecordKind,
    record_id: u64,
    changes: BTreeMap<&'static str, String>,
}

impl ApprovedUpdate {
    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    pub fn record_id(&self) -> u64 {
        self.record_id
    }

    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.changes.keys().copied()
    }

    /// Turn every value into its stored form.
    ///
    /// `transform` receives the field name and the raw value; the first error
    /// aborts the whole update.
    pub fn seal<E, F>(self, mut transform: F) -> Result<SealedUpdate, E>
    where
        F: FnMut(RecordKind, &'static str, &str) -> Result<String, E>,
    {
        let mut values = BTreeMap::new();
        for (field, raw) in &self.changes {
            values.insert(*field, transform(self.kind, *field, raw)?);
        }
        Ok(SealedUpdate {
            kind: self.kind,
            record_id: self.record_id,
            values,
        })
    }
}

/// An authorized, validated and encrypted change set ready to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedUpdate {
    kind: RecordKind,
    record_id: u64,
    values: BTreeMap<&'static str, String>,
}

impl SealedUpdate {
    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    pub fn record_id(&self) -> u64 {
        self.record_id
    }

    pub(crate) fn values(&self) -> &BTreeMap<&'static str, String> {
        &self.values
    }
}
