// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Staff roles for authorization.

use serde::{Deserialize, Serialize};

/// Staff roles for authorization.
///
/// ## Role Hierarchy
///
/// - `SuperAdmin` - Built-in top-level administrator, full access
/// - `SysAdmin` - Manages scooters, travellers and backups
/// - `Engineer` - Field service: may update a scooter's charge, mileage and status
///
/// What each role may do is decided per operation and per field by
/// [`AccessPolicy`](super::AccessPolicy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Least privileged: field engineer
    Engineer,
    /// System administrator
    SysAdmin,
    /// Top-level administrator
    SuperAdmin,
}

impl Role {
    /// Every role, least privileged first.
    pub const ALL: [Role; 3] = [Role::Engineer, Role::SysAdmin, Role::SuperAdmin];

    /// Parse role from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Role> {
        match s.trim().to_lowercase().as_str() {
            "superadmin" => Some(Role::SuperAdmin),
            "sysadmin" => Some(Role::SysAdmin),
            "engineer" => Some(Role::Engineer),
            _ => None,
        }
    }

    /// Stored and displayed name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "superadmin",
            Role::SysAdmin => "sysadmin",
            Role::Engineer => "engineer",
        }
    }

    /// Whether the role can be handed out through a role change.
    ///
    /// There is exactly one super administrator, created at first start.
    pub fn is_assignable(&self) -> bool {
        match self {
            Role::SuperAdmin => false,
            Role::SysAdmin | Role::Engineer => true,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(Role::parse("superadmin"), Some(Role::SuperAdmin));
        assert_eq!(Role::parse("SysAdmin"), Some(Role::SysAdmin));
        assert_eq!(Role::parse(" ENGINEER "), Some(Role::Engineer));
        assert_eq!(Role::parse("admin"), None);
    }

    #[test]
    fn display_round_trips_through_parse() {
        for role in Role::ALL {
            assert_eq!(Role::parse(&role.to_string()), Some(role));
        }
    }

    #[test]
    fn only_staff_roles_are_assignable() {
        assert!(!Role::SuperAdmin.is_assignable());
        assert!(Role::SysAdmin.is_assignable());
        assert!(Role::Engineer.is_assignable());
    }
}
