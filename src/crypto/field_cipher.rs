// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authenticated encryption of individual string fields.
//!
//! ## Token Layout
//!
//! ```text
//! base64url_unpadded( version(1) || nonce(12) || ciphertext || tag(16) )
//! ```
//!
//! AES-256-GCM with a fresh random nonce per call. The version byte is bound
//! as associated data. Tokens must be canonical base64: a token that decodes
//! but re-encodes to a different string is rejected, so changing any single
//! character of a token always makes decryption fail.

use base64ct::{Base64UrlUnpadded, Encoding};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};

use super::key_vault::Key;

/// Current token format version.
const TOKEN_VERSION: u8 = 1;

/// Authentication tag size for AES-GCM.
const TAG_LEN: usize = 16;

/// Smallest possible token: version, nonce and tag around an empty plaintext.
const MIN_TOKEN_LEN: usize = 1 + NONCE_LEN + TAG_LEN;

/// A token could not be turned back into plaintext.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecryptionError {
    #[error("ciphertext token is malformed")]
    Malformed,

    #[error("unsupported ciphertext version {0}")]
    UnsupportedVersion(u8),

    #[error("ciphertext failed authentication (wrong key or tampered)")]
    Authentication,

    #[error("decrypted field is not valid UTF-8")]
    InvalidUtf8,
}

/// Encryption could not be performed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncryptionError {
    #[error("system random generator failed")]
    Random,

    #[error("AEAD seal failed")]
    Seal,
}

/// Encrypts and decrypts PII fields with the process-wide key.
pub struct FieldCipher {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl FieldCipher {
    /// Build a cipher around the vault key.
    pub fn new(key: &Key) -> Self {
        // AES_256_GCM only rejects keys of the wrong length, and Key is
        // always KEY_LEN bytes.
        let unbound = match UnboundKey::new(&AES_256_GCM, key.as_bytes()) {
            Ok(unbound) => unbound,
            Err(_) => unreachable!("AES-256 key length is fixed at 32 bytes"),
        };
        Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        }
    }

    /// Encrypt `plaintext` into a self-contained token.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, EncryptionError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| EncryptionError::Random)?;

        let mut in_out = plaintext.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::from([TOKEN_VERSION]),
                &mut in_out,
            )
            .map_err(|_| EncryptionError::Seal)?;

        let mut token = Vec::with_capacity(1 + NONCE_LEN + in_out.len());
        token.push(TOKEN_VERSION);
        token.extend_from_slice(&nonce_bytes);
        token.extend_from_slice(&in_out);
        Ok(Base64UrlUnpadded::encode_string(&token))
    }

    /// Decrypt a token produced by [`FieldCipher::encrypt`].
    ///
    /// Never returns a best-effort value: malformed, foreign or tampered
    /// tokens are all errors.
    pub fn decrypt(&self, token: &str) -> Result<String, DecryptionError> {
        let raw = Base64UrlUnpadded::decode_vec(token).map_err(|_| DecryptionError::Malformed)?;
        if Base64UrlUnpadded::encode_string(&raw) != token {
            return Err(DecryptionError::Malformed);
        }
        if raw.len() < MIN_TOKEN_LEN {
            return Err(DecryptionError::Malformed);
        }

        let (version, rest) = raw.split_at(1);
        if version[0] != TOKEN_VERSION {
            return Err(DecryptionError::UnsupportedVersion(version[0]));
        }

        let (nonce_bytes, sealed) = rest.split_at(NONCE_LEN);
        let nonce =
            Nonce::try_assume_unique_for_key(nonce_bytes).map_err(|_| DecryptionError::Malformed)?;

        let mut in_out = sealed.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::from([TOKEN_VERSION]), &mut in_out)
            .map_err(|_| DecryptionError::Authentication)?;

        String::from_utf8(plaintext.to_vec()).map_err(|_| DecryptionError::InvalidUtf8)
    }
}

impl std::fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldCipher").finish_non_exhaustive()
    }
}
