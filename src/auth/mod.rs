// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authorization Module
//!
//! Staff identity, credential policy and role-scoped permissions for the
//! fleet console.
//!
//! ## Flow
//!
//! 1. `validation` accepts or rejects usernames and passwords
//! 2. The console verifies the password and builds a [`Session`]
//! 3. Every call re-reads the session's role from the store
//! 4. [`AccessPolicy`] decides which fields and operations the role may use
//!
//! ## Security
//!
//! - Deny by default: a field or operation is allowed only if listed
//! - One forbidden field refuses the whole update
//! - The reserved administrator (id 1) can never be deleted or demoted

pub mod access;
pub mod attempts;
pub mod error;
pub mod roles;
pub mod session;
pub mod validation;

pub use access::{
    AccessPolicy, ApprovedUpdate, FieldDecision, Operation, ProtectedAction, SealedUpdate,
    RESERVED_ADMIN_ID,
};
pub use attempts::FailedLogins;
pub use error::{ForbiddenFieldError, OperationDenied, ReservedRecordError};
pub use roles::Role;
pub use session::Session;
pub use validation::{validate_password, validate_username, AcceptedPassword, ValidationError};
