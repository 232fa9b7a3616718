// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Single-use, expiring authorization codes for database restores.
//!
//! A super administrator issues a code for one backup and one system
//! administrator. That administrator may redeem it once before it expires.
//!
//! ## Guarantees
//!
//! - Issue and redeem share one mutex, so of two racing redemptions exactly
//!   one succeeds
//! - Every failed redemption looks the same to the caller
//!   ([`InvalidCodeError`]); the reason is only available to the audit path
//! - Codes are never extended or reused

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use ring::rand::{SecureRandom, SystemRandom};

/// Characters a code is drawn from (no `0`/`O`, no `1`/`I`).
const ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Length of a restore code.
pub const CODE_LEN: usize = 10;

/// Default validity of a new code.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Upper bound on codes held at once.
pub const MAX_CODES: usize = 1024;

/// Redemption failed. Deliberately carries no reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("restore code is invalid")]
pub struct InvalidCodeError;

/// Why a redemption was refused, for the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Unknown,
    AlreadyUsed,
    Expired,
    WrongAdmin,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::Unknown => "unknown code",
            Rejection::AlreadyUsed => "code already used",
            Rejection::Expired => "code expired",
            Rejection::WrongAdmin => "code bound to another administrator",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IssueError {
    #[error("system random generator failed")]
    Random,

    #[error("too many outstanding restore codes")]
    CapacityExhausted,

    #[error("restore code lifetime is out of range")]
    TtlOutOfRange,
}

struct RestoreCode {
    backup_id: String,
    admin_id: u64,
    expires_at: DateTime<Utc>,
    used: bool,
}

impl RestoreCode {
    fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.used && now < self.expires_at
    }
}

/// Issues and redeems restore codes.
pub struct RestoreAuthority {
    codes: Mutex<HashMap<String, RestoreCode>>,
    rng: SystemRandom,
    default_ttl: Duration,
    capacity: usize,
}

impl Default for RestoreAuthority {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl RestoreAuthority {
    pub fn new(default_ttl: Duration) -> Self {
        Self::with_capacity(default_ttl, MAX_CODES)
    }

    pub fn with_capacity(default_ttl: Duration, capacity: usize) -> Self {
        Self {
            codes: Mutex::new(HashMap::new()),
            rng: SystemRandom::new(),
            default_ttl,
            capacity,
        }
    }

    /// Issue a code for `backup_id`, redeemable only by `admin_id` within `ttl`.
    pub fn issue(&self, backup_id: &str, admin_id: u64, ttl: Duration) -> Result<String, IssueError> {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).map_err(|_| IssueError::TtlOutOfRange)?;
        let expires_at = now.checked_add_signed(ttl).ok_or(IssueError::TtlOutOfRange)?;

        let mut codes = self.codes.lock().unwrap_or_else(PoisonError::into_inner);
        if codes.len() >= self.capacity {
            codes.retain(|_, code| code.is_active(now));
            if codes.len() >= self.capacity {
                tracing::warn!(capacity = self.capacity, "Restore code table is full");
                return Err(IssueError::CapacityExhausted);
            }
        }

        let code = loop {
            let candidate = self.generate()?;
            if !codes.contains_key(&candidate) {
                break candidate;
            }
        };

        codes.insert(
            code.clone(),
            RestoreCode {
                backup_id: backup_id.to_string(),
                admin_id,
                expires_at,
                used: false,
            },
        );
        tracing::info!(backup_id, admin_id, %expires_at, "Restore code issued");
        Ok(code)
    }

    /// Issue a code with the default lifetime.
    pub fn issue_default(&self, backup_id: &str, admin_id: u64) -> Result<String, IssueError> {
        self.issue(backup_id, admin_id, self.default_ttl)
    }

    /// Redeem `code` for `admin_id` and return the backup it unlocks.
    pub fn redeem(&self, code: &str, admin_id: u64) -> Result<String, InvalidCodeError> {
        self.redeem_with_reason(code, admin_id)
            .map_err(|_| InvalidCodeError)
    }

    /// Like [`redeem`](Self::redeem), but reports why a code was refused.
    ///
    /// The reason must not reach the presenting user.
    pub(crate) fn redeem_with_reason(&self, code: &str, admin_id: u64) -> Result<String, Rejection> {
        let code = code.trim().to_ascii_uppercase();
        let now = Utc::now();

        // A poisoned table is not trusted for redemption.
        let mut codes = self.codes.lock().map_err(|_| Rejection::Unknown)?;
        let entry = codes.get_mut(&code).ok_or(Rejection::Unknown)?;

        if entry.used {
            return Err(Rejection::AlreadyUsed);
        }
        if now >= entry.expires_at {
            return Err(Rejection::Expired);
        }
        if entry.admin_id != admin_id {
            return Err(Rejection::WrongAdmin);
        }

        entry.used = true;
        Ok(entry.backup_id.clone())
    }

    /// Drop used and expired codes. Returns how many were removed.
    pub fn purge_inactive(&self) -> usize {
        let now = Utc::now();
        let mut codes = self.codes.lock().unwrap_or_else(PoisonError::into_inner);
        let before = codes.len();
        codes.retain(|_, code| code.is_active(now));
        before - codes.len()
    }

    /// Drop every code, redeemable or not. Returns how many were held.
    ///
    /// Codes name an administrator by user id; once the user table is
    /// replaced those ids may belong to someone else.
    pub fn revoke_all(&self) -> usize {
        let mut codes = self.codes.lock().unwrap_or_else(PoisonError::into_inner);
        let revoked = codes.len();
        codes.clear();
        if revoked > 0 {
            tracing::info!(revoked, "Revoked all restore codes");
        }
        revoked
    }

    /// Codes that could still be redeemed.
    pub fn active_count(&self) -> usize {
        let now = Utc::now();
        let codes = self.codes.lock().unwrap_or_else(PoisonError::into_inner);
        codes.values().filter(|code| code.is_active(now)).count()
    }

    /// Codes held, including used and expired ones not yet purged.
    pub fn tracked_count(&self) -> usize {
        self.codes.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn generate(&self) -> Result<String, IssueError> {
        let mut bytes = [0u8; CODE_LEN];
        self.rng.fill(&mut bytes).map_err(|_| IssueError::Random)?;
        // 256 is a multiple of 32, so masking keeps every symbol equally likely.
        Ok(bytes
            .iter()
            .map(|b| ALPHABET[(b & 0x1f) as usize] as char)
            .collect())
    }
}

impl std::fmt::Debug for RestoreAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestoreAuthority")
            .field("default_ttl", &self.default_ttl)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}
