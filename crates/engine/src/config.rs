use std::str::FromStr;
use std::time::Duration;

use verso_core::retention::{RetentionPolicy, DEFAULT_KEEP_VERSIONS, DEFAULT_OLDER_THAN_DAYS};
use verso_db::DEFAULT_MAX_CONNECTIONS;

use crate::scheduler::{DEFAULT_RETENTION_INTERVAL, DEFAULT_SCHEDULER_INTERVAL};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Engine and worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// Period between scheduled publication scans.
    pub scheduler_interval: Duration,
    /// Period between retention sweeps.
    pub retention_interval: Duration,
    pub retention: RetentionPolicy,
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default    |
    /// |-----------------------------|------------|
    /// | `DATABASE_URL`              | (required) |
    /// | `DATABASE_MAX_CONNECTIONS`  | `20`       |
    /// | `SCHEDULER_INTERVAL_SECS`   | `60`       |
    /// | `RETENTION_INTERVAL_SECS`   | `86400`    |
    /// | `RETENTION_KEEP_VERSIONS`   | `20`       |
    /// | `RETENTION_OLDER_THAN_DAYS` | `90`       |
    /// | `RETENTION_KEEP_PUBLISHED`  | `true`     |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`Self::from_env`] but reading through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?;
        let scheduler_secs = parse_or(
            &lookup,
            "SCHEDULER_INTERVAL_SECS",
            DEFAULT_SCHEDULER_INTERVAL.as_secs(),
        )?;
        let retention_secs = parse_or(
            &lookup,
            "RETENTION_INTERVAL_SECS",
            DEFAULT_RETENTION_INTERVAL.as_secs(),
        )?;
        for (var, secs) in [
            ("SCHEDULER_INTERVAL_SECS", scheduler_secs),
            ("RETENTION_INTERVAL_SECS", retention_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::Invalid {
                    var,
                    value: secs.to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        let retention = RetentionPolicy {
            keep_versions: parse_or(&lookup, "RETENTION_KEEP_VERSIONS", DEFAULT_KEEP_VERSIONS)?,
            older_than_days: parse_or(
                &lookup,
                "RETENTION_OLDER_THAN_DAYS",
                DEFAULT_OLDER_THAN_DAYS,
            )?,
            keep_published: parse_or(&lookup, "RETENTION_KEEP_PUBLISHED", true)?,
        };
        retention.validate().map_err(|e| ConfigError::Invalid {
            var: "RETENTION_OLDER_THAN_DAYS",
            value: retention.older_than_days.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            database_url,
            max_connections,
            scheduler_interval: Duration::from_secs(scheduler_secs),
            retention_interval: Duration::from_secs(retention_secs),
            retention,
        })
    }
}

fn parse_or<T, F>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}
