// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Logged-in staff identity.

use serde::Serialize;

use super::roles::Role;

/// A staff member who passed login.
///
/// The console re-reads the account on every call, so the role here is
/// refreshed when an administrator changes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    /// Record id of the user account.
    pub user_id: u64,
    pub username: String,
    pub role: Role,
}

impl Session {
    pub fn new(user_id: u64, username: impl Into<String>, role: Role) -> Self {
        Self {
            user_id,
            username: username.into(),
            role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_serializes_without_secrets() {
        let session = Session::new(4, "engineer1", Role::Engineer);
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["user_id"], 4);
        assert_eq!(json["username"], "engineer1");
        assert_eq!(json["role"], "engineer");
        assert_eq!(json.as_object().unwrap().len(), 3);
    }
}
