// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Salted password hashing for staff login.
//!
//! Hashes are PBKDF2-HMAC-SHA256 with a fresh 16-byte salt per call:
//!
//! ```text
//! $pbkdf2-sha256$i=600000$<salt base64>$<hash base64>
//! ```
//!
//! The iteration count travels with the hash, so raising the configured cost
//! does not invalidate existing credentials.

use std::num::NonZeroU32;

use base64ct::{Base64Unpadded, Encoding};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};

use crate::auth::validation::AcceptedPassword;

/// Default PBKDF2 iteration count.
pub const DEFAULT_ITERATIONS: u32 = 600_000;

const SCHEME: &str = "pbkdf2-sha256";
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;

/// Fixed salt used to burn time when a username does not exist.
const DUMMY_SALT: [u8; SALT_LEN] = [0x5a; SALT_LEN];

/// Hashing failed before producing a token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    #[error("system random generator failed")]
    Random,
}

/// Hashes and verifies staff passwords.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    iterations: NonZeroU32,
    rng: SystemRandom,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new(NonZeroU32::new(DEFAULT_ITERATIONS).unwrap_or(NonZeroU32::MIN))
    }
}

impl CredentialStore {
    /// Create a store that hashes with `iterations` PBKDF2 rounds.
    pub fn new(iterations: NonZeroU32) -> Self {
        Self {
            iterations,
            rng: SystemRandom::new(),
        }
    }

    /// Hash a password that already passed the password policy.
    pub fn hash(&self, password: &AcceptedPassword<'_>) -> Result<String, CredentialError> {
        let mut salt = [0u8; SALT_LEN];
        self.rng.fill(&mut salt).map_err(|_| CredentialError::Random)?;

        let mut derived = [0u8; HASH_LEN];
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            self.iterations,
            &salt,
            password.as_str().as_bytes(),
            &mut derived,
        );

        Ok(format!(
            "${SCHEME}$i={}${}${}",
            self.iterations,
            Base64Unpadded::encode_string(&salt),
            Base64Unpadded::encode_string(&derived),
        ))
    }

    /// Check `password` against a stored hash token.
    ///
    /// A malformed token never verifies.
    pub fn verify(&self, password: &str, token: &str) -> bool {
        let Some(parsed) = ParsedHash::parse(token) else {
            tracing::warn!("Stored password hash has an unrecognised format");
            return false;
        };

        pbkdf2::verify(
            pbkdf2::PBKDF2_HMAC_SHA256,
            parsed.iterations,
            &parsed.salt,
            password.as_bytes(),
            &parsed.hash,
        )
        .is_ok()
    }

    /// Spend the same work as a real verification without a stored hash.
    ///
    /// Used for unknown usernames so login timing does not reveal which
    /// accounts exist.
    pub fn burn(&self, password: &str) {
        let mut derived = [0u8; HASH_LEN];
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            self.iterations,
            &DUMMY_SALT,
            password.as_bytes(),
            &mut derived,
        );
    }
}

struct ParsedHash {
    iterations: NonZeroU32,
    salt: Vec<u8>,
    hash: Vec<u8>,
}

impl ParsedHash {
    fn parse(token: &str) -> Option<Self> {
        let mut parts = token.strip_prefix('$')?.split('$');
        if parts.next()? != SCHEME {
            return None;
        }
        let iterations = parts.next()?.strip_prefix("i=")?.parse::<NonZeroU32>().ok()?;
        let salt = Base64Unpadded::decode_vec(parts.next()?).ok()?;
        let hash = Base64Unpadded::decode_vec(parts.next()?).ok()?;
        if parts.next().is_some() || salt.len() != SALT_LEN || hash.len() != HASH_LEN {
            return None;
        }
        Some(Self {
            iterations,
            salt,
            hash,
        })
    }
}
