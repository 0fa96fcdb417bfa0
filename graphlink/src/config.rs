// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Client configuration and retry policy

use crate::address::Auth;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Client configuration shared by every connection of a [`crate::Graph`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum number of pooled connections
    pub max_connections: usize,

    /// How long to wait for a pooled connection
    pub acquire_timeout: Duration,

    /// Upper bound for every individual transport call
    pub operation_timeout: Duration,

    /// Retry policy for idempotent autocommit queries
    pub retry: RetryPolicy,

    /// Target database name, when the service hosts several
    pub database: Option<String>,

    pub user: Option<String>,

    pub password: Option<String>,

    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_connections: 16,
            acquire_timeout: Duration::from_secs(60),
            operation_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            database: None,
            user: None,
            password: None,
            user_agent: format!("graphlink/{}", crate::VERSION),
        }
    }
}

impl Config {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }

    /// Defaults overridden by `GRAPHLINK_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(user) = std::env::var("GRAPHLINK_USER") {
            config.user = Some(user);
        }
        if let Ok(password) = std::env::var("GRAPHLINK_PASSWORD") {
            config.password = Some(password);
        }
        if let Ok(database) = std::env::var("GRAPHLINK_DATABASE") {
            config.database = Some(database);
        }
        if let Some(n) = env_number("GRAPHLINK_MAX_CONNECTIONS")? {
            config.max_connections = usize::try_from(n).map_err(|_| {
                Error::Config(format!("GRAPHLINK_MAX_CONNECTIONS out of range: {}", n))
            })?;
        }
        if let Some(ms) = env_number("GRAPHLINK_TIMEOUT_MS")? {
            config.operation_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = env_number("GRAPHLINK_MAX_RETRIES")? {
            config.retry.max_retries = u32::try_from(n).map_err(|_| {
                Error::Config(format!("GRAPHLINK_MAX_RETRIES out of range: {}", n))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(Error::Config("max_connections must be at least 1".into()));
        }
        if self.max_connections > Semaphore::MAX_PERMITS {
            return Err(Error::Config(format!(
                "max_connections must be at most {}",
                Semaphore::MAX_PERMITS
            )));
        }
        if self.operation_timeout.is_zero() {
            return Err(Error::Config("operation_timeout must be non-zero".into()));
        }
        if self.password.is_some() && self.user.is_none() {
            return Err(Error::Config("password given without user".into()));
        }
        self.retry.validate()
    }

    /// Credentials from configuration, if a user is set
    pub fn auth(&self) -> Option<Auth> {
        self.user
            .as_ref()
            .map(|user| Auth::new(user.clone(), self.password.clone().unwrap_or_default()))
    }

    pub fn with_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

fn env_number(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} must be a number, got '{}'", name, raw))),
        Err(_) => Ok(None),
    }
}

/// Exponential backoff with jitter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    /// Fraction of each delay randomly added or removed (0.0 to 1.0)
    pub jitter: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            multiplier: 2.0,
            jitter: 0.2,
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(Error::Config("retry.jitter must be within 0.0..=1.0".into()));
        }
        if self.multiplier < 1.0 {
            return Err(Error::Config("retry.multiplier must be at least 1.0".into()));
        }
        Ok(())
    }

    /// Delay before retry number `attempt` (starting at 0)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());
        let spread = capped * self.jitter;
        let jittered = capped - spread + fastrand::f64() * 2.0 * spread;
        Duration::from_secs_f64(jittered.max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry.max_retries, 3);
        assert!(config.auth().is_none());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = Config::from_json_str(r#"{"max_connections": 4, "database": "movies"}"#)
            .unwrap();
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.database.as_deref(), Some("movies"));
        assert_eq!(config.operation_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            Config::from_json_str(r#"{"max_connections": 0}"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::default()
                .with_max_connections(usize::MAX)
                .validate(),
            Err(Error::Config(_))
        ));
        let config = Config::default().with_retry(RetryPolicy {
            jitter: 2.0,
            ..RetryPolicy::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_delay_grows_and_is_capped() {
        let policy = RetryPolicy {
            jitter: 0.0,
            ..RetryPolicy::default()
        };
        let close = |a: Duration, b: Duration| {
            let diff = if a > b { a - b } else { b - a };
            diff < Duration::from_micros(1)
        };
        assert!(close(policy.delay_for(0), Duration::from_millis(100)));
        assert!(close(policy.delay_for(1), Duration::from_millis(200)));
        assert!(close(policy.delay_for(20), Duration::from_secs(5)));

        let jittered = RetryPolicy::default().delay_for(0);
        assert!(jittered >= Duration::from_millis(79) && jittered <= Duration::from_millis(121));
    }
}
