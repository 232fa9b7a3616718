// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! throughout the console. Configuration is loaded from the environment at
//! startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Root directory for key, log, database and backups | `data` |
//! | `SUPERADMIN_PASSWORD` | Password for the reserved administrator on first start | Required on first start |
//! | `RESTORE_CODE_TTL_HOURS` | Lifetime of a restore code | `24` |
//! | `PASSWORD_HASH_ITERATIONS` | PBKDF2 rounds for new password hashes | `600000` |
//! | `RESTORE_SWEEP_INTERVAL_SECS` | Period of the restore code sweeper | `300` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Duration;

use crate::crypto::DEFAULT_ITERATIONS;
use crate::restore::DEFAULT_SWEEP_INTERVAL;
use crate::storage::paths::DATA_ROOT;

/// Environment variable name for the data directory path.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Environment variable holding the reserved administrator's first password.
///
/// Only read when the account does not exist yet.
pub const SUPERADMIN_PASSWORD_ENV: &str = "SUPERADMIN_PASSWORD";

pub const RESTORE_CODE_TTL_HOURS_ENV: &str = "RESTORE_CODE_TTL_HOURS";
pub const PASSWORD_HASH_ITERATIONS_ENV: &str = "PASSWORD_HASH_ITERATIONS";
pub const RESTORE_SWEEP_INTERVAL_SECS_ENV: &str = "RESTORE_SWEEP_INTERVAL_SECS";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Username of the reserved administrator (record id 1).
pub const SUPERADMIN_USERNAME: &str = "super_admin";

pub const DEFAULT_RESTORE_CODE_TTL_HOURS: u64 = 24;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var}={value} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Console settings.
#[derive(Clone)]
pub struct ConsoleConfig {
    pub data_dir: PathBuf,
    pub superadmin_password: Option<String>,
    pub restore_code_ttl: Duration,
    pub password_iterations: NonZeroU32,
    pub sweep_interval: Duration,
    pub log_format: LogFormat,
}

impl ConsoleConfig {
    /// Defaults rooted at `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            superadmin_password: None,
            restore_code_ttl: Duration::from_secs(DEFAULT_RESTORE_CODE_TTL_HOURS * 3600),
            password_iterations: NonZeroU32::new(DEFAULT_ITERATIONS).unwrap_or(NonZeroU32::MIN),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            log_format: LogFormat::default(),
        }
    }

    pub fn with_superadmin_password(mut self, password: impl Into<String>) -> Self {
        self.superadmin_password = Some(password.into());
        self
    }

    pub fn with_password_iterations(mut self, iterations: NonZeroU32) -> Self {
        self.password_iterations = iterations;
        self
    }

    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = lookup(DATA_DIR_ENV)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DATA_ROOT.to_string());
        let mut config = Self::new(data_dir);
        config.superadmin_password = lookup(SUPERADMIN_PASSWORD_ENV).filter(|v| !v.is_empty());

        if let Some(value) = lookup(RESTORE_CODE_TTL_HOURS_ENV) {
            let hours = parse_positive(RESTORE_CODE_TTL_HOURS_ENV, &value)?;
            config.restore_code_ttl = hours
                .checked_mul(3600)
                .map(Duration::from_secs)
                .ok_or_else(|| invalid(RESTORE_CODE_TTL_HOURS_ENV, &value, "too large"))?;
        }

        if let Some(value) = lookup(PASSWORD_HASH_ITERATIONS_ENV) {
            config.password_iterations = value
                .trim()
                .parse::<NonZeroU32>()
                .map_err(|_| invalid(PASSWORD_HASH_ITERATIONS_ENV, &value, "expected a positive integer"))?;
        }

        if let Some(value) = lookup(RESTORE_SWEEP_INTERVAL_SECS_ENV) {
            let secs = parse_positive(RESTORE_SWEEP_INTERVAL_SECS_ENV, &value)?;
            config.sweep_interval = Duration::from_secs(secs);
        }

        if let Some(value) = lookup(LOG_FORMAT_ENV) {
            config.log_format = match value.trim().to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" | "" => LogFormat::Pretty,
                _ => return Err(invalid(LOG_FORMAT_ENV, &value, "expected json or pretty")),
            };
        }

        Ok(config)
    }
}

impl std::fmt::Debug for ConsoleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleConfig")
            .field("data_dir", &self.data_dir)
            .field(
                "superadmin_password",
                &self.superadmin_password.as_ref().map(|_| "[REDACTED]"),
            )
            .field("restore_code_ttl", &self.restore_code_ttl)
            .field("password_iterations", &self.password_iterations)
            .field("sweep_interval", &self.sweep_interval)
            .field("log_format", &self.log_format)
            .finish()
    }
}

fn parse_positive(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(invalid(var, value, "expected a positive integer")),
    }
}

fn invalid(var: &'static str, value: &str, reason: &'static str) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<ConsoleConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ConsoleConfig::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = load(&[]).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.restore_code_ttl, Duration::from_secs(24 * 3600));
        assert_eq!(config.password_iterations.get(), DEFAULT_ITERATIONS);
        assert_eq!(config.sweep_interval, Duration::from_secs(300));
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.superadmin_password.is_none());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            (DATA_DIR_ENV, "/srv/fleet"),
            (RESTORE_CODE_TTL_HOURS_ENV, "2"),
            (PASSWORD_HASH_ITERATIONS_ENV, "1000"),
            (RESTORE_SWEEP_INTERVAL_SECS_ENV, "60"),
            (LOG_FORMAT_ENV, "JSON"),
            (SUPERADMIN_PASSWORD_ENV, "Admin_123?xyz"),
        ])
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/fleet"));
        assert_eq!(config.restore_code_ttl, Duration::from_secs(7200));
        assert_eq!(config.password_iterations.get(), 1000);
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.superadmin_password.as_deref(), Some("Admin_123?xyz"));
    }

    #[test]
    fn bad_values_name_the_variable() {
        for (var, value) in [
            (RESTORE_CODE_TTL_HOURS_ENV, "0"),
            (PASSWORD_HASH_ITERATIONS_ENV, "-5"),
            (RESTORE_SWEEP_INTERVAL_SECS_ENV, "soon"),
            (LOG_FORMAT_ENV, "xml"),
        ] {
            let err = load(&[(var, value)]).unwrap_err();
            assert!(err.to_string().starts_with(var), "{err}");
        }
    }

    #[test]
    fn debug_hides_password() {
        let config = ConsoleConfig::new("x").with_superadmin_password("Admin_123?xyz");
        assert!(!format!("{config:?}").contains("Admin_123"));
    }
}
