// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Cryptography Module
//!
//! - `key_vault` - load-or-create of the single field encryption key
//! - `field_cipher` - AES-256-GCM encryption of PII fields and audit entries
//! - `password` - PBKDF2 password hashing and verification
//!
//! All primitives come from `ring`. Nothing in this module touches the
//! record store or the audit log directly.

pub mod field_cipher;
pub mod key_vault;
pub mod password;

pub use field_cipher::{DecryptionError, EncryptionError, FieldCipher};
pub use key_vault::{Key, KeyCorruptError, KeyVault, KeyVaultError, KEY_LEN};
pub use password::{CredentialError, CredentialStore, DEFAULT_ITERATIONS};
