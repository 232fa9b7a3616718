// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Record Models
//!
//! The three record kinds the console manages, their field catalogs and the
//! value rules every field must satisfy before it is persisted.
//!
//! ## Field Catalog
//!
//! Field names here are the only ones a caller may set. System columns such
//! as `password_hash`, `registration_date` and `last_updated` are written by
//! the console itself and never appear in a catalog.
//!
//! ## PII
//!
//! Fields flagged as PII are stored as [`FieldCipher`](crate::crypto::FieldCipher)
//! tokens, never as plaintext.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::auth::validation::{validate_username, ValidationError};
use crate::auth::Role;

// =============================================================================
// Record Kinds
// =============================================================================

/// Kind of record held in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Scooter,
    Traveller,
    User,
}

pub const SCOOTER_FIELDS: &[&str] = &[
    "brand",
    "model",
    "serial_number",
    "top_speed",
    "battery_capacity",
    "soc",
    "target_range_min",
    "target_range_max",
    "latitude",
    "longitude",
    "out_of_service",
    "mileage",
    "last_maintenance",
];

pub const TRAVELLER_FIELDS: &[&str] = &[
    "first_name",
    "last_name",
    "birthday",
    "gender",
    "street_name",
    "house_number",
    "zip_code",
    "city",
    "email",
    "phone_number",
    "license_number",
];

pub const USER_FIELDS: &[&str] = &[
    "username",
    "role",
    "first_name",
    "last_name",
    "email",
    "license_number",
];

const TRAVELLER_PII: &[&str] = &["email", "phone_number", "license_number"];
const USER_PII: &[&str] = &["email", "license_number"];

/// Cities a traveller may live in.
pub const CITIES: [&str; 10] = [
    "Rotterdam",
    "Schiedam",
    "Vlaardingen",
    "Maassluis",
    "Capelle aan den IJssel",
    "Spijkenisse",
    "Hoogvliet",
    "Pernis",
    "Rozenburg",
    "Hoek van Holland",
];

/// Bounding box for scooter GPS positions (Rotterdam region).
pub const LATITUDE_RANGE: (f64, f64) = (51.85, 52.00);
pub const LONGITUDE_RANGE: (f64, f64) = (4.30, 4.55);

impl RecordKind {
    /// Every record kind.
    pub const ALL: [RecordKind; 3] = [RecordKind::Scooter, RecordKind::Traveller, RecordKind::User];

    /// Parse a kind name (case-insensitive).
    pub fn parse(s: &str) -> Result<RecordKind, ValidationError> {
        match s.trim().to_lowercase().as_str() {
            "scooter" => Ok(RecordKind::Scooter),
            "traveller" => Ok(RecordKind::Traveller),
            "user" => Ok(RecordKind::User),
            _ => Err(ValidationError::UnknownRecordKind(s.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Scooter => "scooter",
            RecordKind::Traveller => "traveller",
            RecordKind::User => "user",
        }
    }

    /// Every caller-settable field of this kind.
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            RecordKind::Scooter => SCOOTER_FIELDS,
            RecordKind::Traveller => TRAVELLER_FIELDS,
            RecordKind::User => USER_FIELDS,
        }
    }

    /// Fields stored encrypted.
    pub fn pii_fields(&self) -> &'static [&'static str] {
        match self {
            RecordKind::Scooter => &[],
            RecordKind::Traveller => TRAVELLER_PII,
            RecordKind::User => USER_PII,
        }
    }

    /// Fields that must be present when a record is created.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            RecordKind::Scooter => &["brand", "model", "serial_number"],
            RecordKind::Traveller => TRAVELLER_FIELDS,
            RecordKind::User => &["username", "role", "first_name", "last_name"],
        }
    }

    /// Canonical static name for `field`, if it belongs to this kind.
    pub fn field(&self, field: &str) -> Option<&'static str> {
        self.fields().iter().copied().find(|f| *f == field)
    }

    pub fn is_pii(&self, field: &str) -> bool {
        self.pii_fields().contains(&field)
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Value Rules
// =============================================================================

/// Validate a field value and return the form it is stored in.
///
/// Values are trimmed; some are canonicalized (upper-case licence numbers,
/// the `+31-6-` phone prefix, the city's spelling).
pub fn normalize_value(kind: RecordKind, field: &str, value: &str) -> Result<String, ValidationError> {
    let field = kind
        .field(field)
        .ok_or_else(|| ValidationError::UnknownField(field.to_string()))?;
    let value = value.trim();

    match (kind, field) {
        (RecordKind::Scooter, "brand" | "model") => text(field, value, 50),
        (RecordKind::Scooter, "serial_number") => serial_number(field, value),
        (
            RecordKind::Scooter,
            "top_speed" | "battery_capacity" | "soc" | "target_range_min" | "target_range_max",
        ) => bounded_integer(field, value, 0, 100),
        (RecordKind::Scooter, "latitude") => coordinate(field, value, LATITUDE_RANGE),
        (RecordKind::Scooter, "longitude") => coordinate(field, value, LONGITUDE_RANGE),
        (RecordKind::Scooter, "out_of_service") => match value {
            "0" | "1" => Ok(value.to_string()),
            _ => Err(ValidationError::invalid(field, "must be 0 or 1")),
        },
        (RecordKind::Scooter, "mileage") => value
            .parse::<u64>()
            .map(|m| m.to_string())
            .map_err(|_| ValidationError::invalid(field, "must be a non-negative integer")),
        (RecordKind::Scooter, "last_maintenance") | (RecordKind::Traveller, "birthday") => {
            iso_date(field, value)
        }

        (RecordKind::Traveller | RecordKind::User, "first_name" | "last_name") => {
            text(field, value, 50)
        }
        (RecordKind::Traveller, "street_name") => text(field, value, 100),
        (RecordKind::Traveller, "house_number") => text(field, value, 10),
        (RecordKind::Traveller, "gender") => match value.to_uppercase().as_str() {
            g @ ("M" | "V" | "X") => Ok(g.to_string()),
            _ => Err(ValidationError::invalid(field, "must be M, V or X")),
        },
        (RecordKind::Traveller, "zip_code") => zip_code(field, value),
        (RecordKind::Traveller, "city") => CITIES
            .iter()
            .find(|city| city.eq_ignore_ascii_case(value))
            .map(|city| city.to_string())
            .ok_or_else(|| ValidationError::invalid(field, "not a supported city")),
        (RecordKind::Traveller, "phone_number") => phone_number(field, value),
        (RecordKind::Traveller | RecordKind::User, "email") => email(field, value),
        (RecordKind::Traveller | RecordKind::User, "license_number") => license_number(field, value),

        (RecordKind::User, "username") => {
            validate_username(value)?;
            Ok(value.to_string())
        }
        (RecordKind::User, "role") => {
            let role = Role::parse(value).ok_or_else(|| ValidationError::UnknownRole(value.to_string()))?;
            if role.is_assignable() {
                Ok(role.as_str().to_string())
            } else {
                Err(ValidationError::invalid(field, "role cannot be assigned"))
            }
        }

        _ => Err(ValidationError::UnknownField(field.to_string())),
    }
}

fn text(field: &str, value: &str, max: usize) -> Result<String, ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::invalid(field, "must not be empty"));
    }
    if value.chars().count() > max {
        return Err(ValidationError::invalid(field, "too long"));
    }
    if value.chars().any(char::is_control) {
        return Err(ValidationError::invalid(field, "contains control characters"));
    }
    Ok(value.to_string())
}

fn serial_number(field: &str, value: &str) -> Result<String, ValidationError> {
    if (10..=17).contains(&value.len()) && value.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(value.to_string())
    } else {
        Err(ValidationError::invalid(field, "must be 10-17 letters or digits"))
    }
}

fn bounded_integer(field: &str, value: &str, min: i64, max: i64) -> Result<String, ValidationError> {
    match value.parse::<i64>() {
        Ok(n) if (min..=max).contains(&n) => Ok(n.to_string()),
        _ => Err(ValidationError::invalid(field, "must be an integer from 0 to 100")),
    }
}

fn coordinate(field: &str, value: &str, (min, max): (f64, f64)) -> Result<String, ValidationError> {
    match value.parse::<f64>() {
        Ok(n) if n.is_finite() && (min..=max).contains(&n) => Ok(value.to_string()),
        _ => Err(ValidationError::invalid(field, "outside the service area")),
    }
}

fn iso_date(field: &str, value: &str) -> Result<String, ValidationError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .map_err(|_| ValidationError::invalid(field, "must be a YYYY-MM-DD date"))
}

fn zip_code(field: &str, value: &str) -> Result<String, ValidationError> {
    let value = value.to_uppercase();
    let bytes = value.as_bytes();
    let valid = bytes.len() == 6
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[4..].iter().all(u8::is_ascii_uppercase);
    if valid {
        Ok(value)
    } else {
        Err(ValidationError::invalid(field, "must be four digits and two letters"))
    }
}

fn phone_number(field: &str, value: &str) -> Result<String, ValidationError> {
    let digits = value.strip_prefix("+31-6-").unwrap_or(value);
    if digits.len() == 8 && digits.chars().all(|c| c.is_ascii_digit()) {
        Ok(format!("+31-6-{digits}"))
    } else {
        Err(ValidationError::invalid(field, "must be eight digits"))
    }
}

fn email(field: &str, value: &str) -> Result<String, ValidationError> {
    let valid = match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !domain.contains('@')
                && !value.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(value.to_string())
    } else {
        Err(ValidationError::invalid(field, "not an email address"))
    }
}

fn license_number(field: &str, value: &str) -> Result<String, ValidationError> {
    if value.len() == 10 && value.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(value.to_uppercase())
    } else {
        Err(ValidationError::invalid(field, "must be 10 letters or digits"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pii_fields_belong_to_their_kind() {
        for kind in RecordKind::ALL {
            for field in kind.pii_fields() {
                assert!(kind.field(field).is_some(), "{kind}.{field}");
            }
            for field in kind.required_fields() {
                assert!(kind.field(field).is_some(), "{kind}.{field}");
            }
        }
        assert!(RecordKind::Traveller.is_pii("email"));
        assert!(!RecordKind::Traveller.is_pii("city"));
        assert!(RecordKind::Scooter.pii_fields().is_empty());
    }

    #[test]
    fn kind_parse_round_trips() {
        for kind in RecordKind::ALL {
            assert_eq!(RecordKind::parse(kind.as_str()), Ok(kind));
        }
        assert!(matches!(
            RecordKind::parse("bike"),
            Err(ValidationError::UnknownRecordKind(_))
        ));
    }

    #[test]
    fn scooter_values() {
        let s = RecordKind::Scooter;
        assert_eq!(normalize_value(s, "soc", " 85 ").unwrap(), "85");
        assert!(normalize_value(s, "soc", "101").is_err());
        assert!(normalize_value(s, "top_speed", "-1").is_err());
        assert_eq!(normalize_value(s, "out_of_service", "1").unwrap(), "1");
        assert!(normalize_value(s, "out_of_service", "yes").is_err());
        assert_eq!(normalize_value(s, "mileage", "1200").unwrap(), "1200");
        assert!(normalize_value(s, "mileage", "-3").is_err());
        assert!(normalize_value(s, "latitude", "51.92250").is_ok());
        assert!(normalize_value(s, "latitude", "48.85").is_err());
        assert!(normalize_value(s, "longitude", "NaN").is_err());
        assert!(normalize_value(s, "serial_number", "SN12345678").is_ok());
        assert!(normalize_value(s, "serial_number", "SN-1").is_err());
        assert_eq!(
            normalize_value(s, "last_maintenance", "2026-03-01").unwrap(),
            "2026-03-01"
        );
        assert!(normalize_value(s, "last_maintenance", "01-03-2026").is_err());
    }

    #[test]
    fn traveller_values() {
        let t = RecordKind::Traveller;
        assert_eq!(normalize_value(t, "phone_number", "12345678").unwrap(), "+31-6-12345678");
        assert_eq!(
            normalize_value(t, "phone_number", "+31-6-12345678").unwrap(),
            "+31-6-12345678"
        );
        assert!(normalize_value(t, "phone_number", "0612345678").is_err());
        assert_eq!(normalize_value(t, "zip_code", "3011ab").unwrap(), "3011AB");
        assert!(normalize_value(t, "zip_code", "30114B").is_err());
        assert_eq!(normalize_value(t, "city", "rotterdam").unwrap(), "Rotterdam");
        assert!(normalize_value(t, "city", "Amsterdam").is_err());
        assert_eq!(normalize_value(t, "gender", "v").unwrap(), "V");
        assert!(normalize_value(t, "email", "jan@example.nl").is_ok());
        assert!(normalize_value(t, "email", "jan@localhost").is_err());
        assert!(normalize_value(t, "email", "@example.nl").is_err());
        assert_eq!(
            normalize_value(t, "license_number", "ab12345678").unwrap(),
            "AB12345678"
        );
        assert!(normalize_value(t, "first_name", "  ").is_err());
    }

    #[test]
    fn user_role_values() {
        let u = RecordKind::User;
        assert_eq!(normalize_value(u, "role", "Engineer").unwrap(), "engineer");
        assert_eq!(normalize_value(u, "role", "sysadmin").unwrap(), "sysadmin");
        assert!(matches!(
            normalize_value(u, "role", "superadmin"),
            Err(ValidationError::InvalidValue { .. })
        ));
        assert!(matches!(
            normalize_value(u, "role", "root"),
            Err(ValidationError::UnknownRole(_))
        ));
        assert_eq!(
            normalize_value(u, "username", "ab"),
            Err(ValidationError::UsernameLength)
        );
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert_eq!(
            normalize_value(RecordKind::Scooter, "password_hash", "x"),
            Err(ValidationError::UnknownField("password_hash".to_string()))
        );
        assert!(normalize_value(RecordKind::User, "phone_number", "12345678").is_err());
    }
}
