// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Urban Fleet Console - trust and audit core of a scooter fleet record system
//!
//! Staff log in with a role and manage scooters, travellers and staff
//! accounts. Sensitive fields are encrypted at rest, every action lands in an
//! encrypted append-only audit log, and database restores require a
//! single-use code issued by the super administrator.
//!
//! ## Modules
//!
//! - `auth` - Roles, sessions, credential policy and field-level access policy
//! - `config` - Environment configuration
//! - `console` - Caller-facing facade tying the pieces together
//! - `crypto` - Key vault, field cipher and password hashing
//! - `models` - Record kinds, field catalog and value rules
//! - `restore` - Restore code authority and its background sweeper
//! - `storage` - Record database, audit log and backups

pub mod auth;
pub mod config;
pub mod console;
pub mod crypto;
pub mod error;
pub mod models;
pub mod restore;
pub mod storage;

pub use console::{Console, FieldView, NewUser, RecordView};
pub use error::{ConsoleError, ConsoleResult};
