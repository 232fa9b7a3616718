// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Username and password acceptance policy.
//!
//! Checked before anything is hashed or stored. The error names the rule
//! that failed; the console reports it generically.

/// Symbols that satisfy the "one special character" password rule.
pub const PASSWORD_SYMBOLS: &str = "~!@#$%&_-+=`|\\(){}[]:;'<>,.?/\"";

/// Username length bounds (inclusive, in characters).
pub const USERNAME_MIN_LEN: usize = 8;
pub const USERNAME_MAX_LEN: usize = 10;

/// Password length bounds (inclusive, in characters).
pub const PASSWORD_MIN_LEN: usize = 12;
pub const PASSWORD_MAX_LEN: usize = 30;

/// Input rejected by a policy or value rule.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("username must be 8-10 characters")]
    UsernameLength,

    #[error("username must start with a letter or underscore")]
    UsernameStart,

    #[error("username may only contain letters, digits, underscores, apostrophes and periods")]
    UsernameCharacters,

    #[error("password must be 12-30 characters")]
    PasswordLength,

    #[error("password needs an uppercase letter")]
    PasswordUppercase,

    #[error("password needs a lowercase letter")]
    PasswordLowercase,

    #[error("password needs a digit")]
    PasswordDigit,

    #[error("password needs a special character")]
    PasswordSymbol,

    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: &'static str },

    #[error("unknown role '{0}'")]
    UnknownRole(String),

    #[error("unknown record kind '{0}'")]
    UnknownRecordKind(String),
}

impl ValidationError {
    /// Machine-readable name of the rule that failed.
    pub fn rule(&self) -> &'static str {
        match self {
            ValidationError::UsernameLength => "username_length",
            ValidationError::UsernameStart => "username_start",
            ValidationError::UsernameCharacters => "username_characters",
            ValidationError::PasswordLength => "password_length",
            ValidationError::PasswordUppercase => "password_uppercase",
            ValidationError::PasswordLowercase => "password_lowercase",
            ValidationError::PasswordDigit => "password_digit",
            ValidationError::PasswordSymbol => "password_symbol",
            ValidationError::UnknownField(_) => "unknown_field",
            ValidationError::MissingField(_) => "missing_field",
            ValidationError::InvalidValue { .. } => "invalid_value",
            ValidationError::UnknownRole(_) => "unknown_role",
            ValidationError::UnknownRecordKind(_) => "unknown_record_kind",
        }
    }

    /// True for password rule failures, which are reported without detail.
    pub fn is_password_rule(&self) -> bool {
        matches!(
            self,
            ValidationError::PasswordLength
                | ValidationError::PasswordUppercase
                | ValidationError::PasswordLowercase
                | ValidationError::PasswordDigit
                | ValidationError::PasswordSymbol
        )
    }

    pub(crate) fn invalid(field: &str, reason: &'static str) -> Self {
        ValidationError::InvalidValue {
            field: field.to_string(),
            reason,
        }
    }
}

/// A password that satisfied [`validate_password`].
///
/// The credential store only hashes this type, so an unchecked password can
/// never reach it.
#[derive(Clone, Copy)]
pub struct AcceptedPassword<'a>(&'a str);

impl<'a> AcceptedPassword<'a> {
    pub(crate) fn as_str(&self) -> &'a str {
        self.0
    }
}

impl std::fmt::Debug for AcceptedPassword<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AcceptedPassword([REDACTED])")
    }
}

/// Check a username against the naming policy.
///
/// Starts with a letter or underscore, 8-10 characters in total, the rest
/// letters, digits, underscores, apostrophes or periods.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let len = username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err(ValidationError::UsernameLength);
    }

    let mut chars = username.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return Err(ValidationError::UsernameStart),
    }

    if chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '\'' | '.')) {
        Ok(())
    } else {
        Err(ValidationError::UsernameCharacters)
    }
}

/// Check a password against the complexity policy.
pub fn validate_password(password: &str) -> Result<AcceptedPassword<'_>, ValidationError> {
    let len = password.chars().count();
    if !(PASSWORD_MIN_LEN..=PASSWORD_MAX_LEN).contains(&len) {
        return Err(ValidationError::PasswordLength);
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(ValidationError::PasswordUppercase);
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(ValidationError::PasswordLowercase);
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(ValidationError::PasswordDigit);
    }
    if !password.chars().any(|c| PASSWORD_SYMBOLS.contains(c)) {
        return Err(ValidationError::PasswordSymbol);
    }
    Ok(AcceptedPassword(password))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_length_bounds() {
        assert_eq!(validate_username("ab"), Err(ValidationError::UsernameLength));
        assert_eq!(
            validate_username("this_is_too_long_123"),
            Err(ValidationError::UsernameLength)
        );
        assert!(validate_username("abcdefgh").is_ok());
        assert!(validate_username("abcdefghij").is_ok());
        assert_eq!(validate_username("abcdefghijk"), Err(ValidationError::UsernameLength));
    }

    #[test]
    fn username_pattern() {
        assert!(validate_username("val.id_01").is_ok());
        assert!(validate_username("_o'brien1").is_ok());
        assert_eq!(validate_username("1abcdefg"), Err(ValidationError::UsernameStart));
        assert_eq!(validate_username(".abcdefg"), Err(ValidationError::UsernameStart));
        assert_eq!(
            validate_username("abc-defgh"),
            Err(ValidationError::UsernameCharacters)
        );
        assert_eq!(
            validate_username("abc defgh"),
            Err(ValidationError::UsernameCharacters)
        );
    }

    #[test]
    fn password_accepts_policy_compliant() {
        assert!(validate_password("Secure_Pass123").is_ok());
        assert!(validate_password("aB3~aaaaaaaa").is_ok());
    }

    #[test]
    fn password_rules_are_identified() {
        assert_eq!(validate_password("Sh0rt!").unwrap_err(), ValidationError::PasswordLength);
        assert_eq!(
            validate_password(&format!("Aa1!{}", "x".repeat(27))).unwrap_err(),
            ValidationError::PasswordLength
        );
        assert_eq!(
            validate_password("lowercase_only1").unwrap_err(),
            ValidationError::PasswordUppercase
        );
        assert_eq!(
            validate_password("UPPERCASE_ONLY1").unwrap_err(),
            ValidationError::PasswordLowercase
        );
        assert_eq!(
            validate_password("NoDigitsHere_!").unwrap_err(),
            ValidationError::PasswordDigit
        );
        assert_eq!(
            validate_password("NoSymbolsHere12").unwrap_err(),
            ValidationError::PasswordSymbol
        );
    }

    #[test]
    fn caret_and_star_are_not_policy_symbols() {
        assert_eq!(
            validate_password("Password1234^*").unwrap_err(),
            ValidationError::PasswordSymbol
        );
    }

    #[test]
    fn password_rules_report_generically() {
        assert!(ValidationError::PasswordDigit.is_password_rule());
        assert!(!ValidationError::UsernameLength.is_password_rule());
        assert_eq!(ValidationError::PasswordSymbol.rule(), "password_symbol");
    }
}
