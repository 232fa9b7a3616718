// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Restore Authorization
//!
//! - `authority` - issue and redeem single-use restore codes
//! - `sweeper` - background purge of used and expired codes

pub mod authority;
pub mod sweeper;

pub use authority::{
    InvalidCodeError, IssueError, Rejection, RestoreAuthority, CODE_LEN, DEFAULT_TTL, MAX_CODES,
};
pub use sweeper::{RestoreCodeSweeper, DEFAULT_SWEEP_INTERVAL};
