//! Session and nonce configuration.
//!
//! Loaded once at startup and immutable afterwards. Invalid values are
//! fatal: the process refuses to start rather than run with TTLs that
//! would break the expiry invariants.

use std::env;
use std::time::Duration;

use chrono::TimeDelta;
use keystone_core::error::KeystoneError;
use thiserror::Error;

pub const ENV_SESSION_TTL: &str = "KEYSTONE_SESSION_TTL_SECS";
pub const ENV_REFRESH_TTL: &str = "KEYSTONE_REFRESH_TTL_SECS";
pub const ENV_MAX_SESSIONS: &str = "KEYSTONE_MAX_SESSIONS";
pub const ENV_NONCE_TTL: &str = "KEYSTONE_NONCE_TTL_SECS";
pub const ENV_NONCE_CLEANUP_INTERVAL: &str = "KEYSTONE_NONCE_CLEANUP_INTERVAL_SECS";
pub const ENV_SESSION_CLEANUP_INTERVAL: &str = "KEYSTONE_SESSION_CLEANUP_INTERVAL_SECS";
pub const ENV_CLEANUP_GRACE: &str = "KEYSTONE_CLEANUP_GRACE_SECS";

const HOUR: u64 = 60 * 60;

/// Upper bound for any configured duration (100 years).
const MAX_DURATION: Duration = Duration::from_secs(100 * 365 * 24 * HOUR);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be a non-negative whole number, got {value:?}")]
    Unparseable { key: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("{0} exceeds the supported maximum")]
    OutOfRange(&'static str),

    #[error("refresh TTL ({refresh:?}) is shorter than session TTL ({session:?})")]
    RefreshShorterThanSession { session: Duration, refresh: Duration },
}

impl From<ConfigError> for KeystoneError {
    fn from(err: ConfigError) -> Self {
        KeystoneError::Configuration(err.to_string())
    }
}

/// Configuration for session lifecycle and nonce handling.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Access lifetime, from creation or last refresh (default: 24h).
    pub session_ttl: Duration,
    /// Refresh lifetime, from creation or last refresh (default: 168h).
    /// Must not be shorter than `session_ttl`.
    pub refresh_ttl: Duration,
    /// Active sessions allowed per subject before the oldest is evicted
    /// (default: 5). `0` disables the cap.
    pub max_sessions_per_subject: usize,
    /// Nonce lifetime (default: 300 = 5 minutes).
    pub nonce_ttl: Duration,
    /// How often expired nonces are swept (default: half the nonce TTL).
    pub nonce_cleanup_interval: Duration,
    /// How often expired sessions are swept (default: 1h).
    pub session_cleanup_interval: Duration,
    /// How long an expired, inactive session is kept for audit before it
    /// may be deleted (default: 24h). Zero is allowed.
    pub cleanup_grace_period: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let nonce_ttl = Duration::from_secs(300);
        Self {
            session_ttl: Duration::from_secs(24 * HOUR),
            refresh_ttl: Duration::from_secs(168 * HOUR),
            max_sessions_per_subject: 5,
            nonce_ttl,
            nonce_cleanup_interval: nonce_ttl / 2,
            session_cleanup_interval: Duration::from_secs(HOUR),
            cleanup_grace_period: Duration::from_secs(24 * HOUR),
        }
    }
}

impl SessionConfig {
    /// Load from the process environment, after reading `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup. Unset keys keep
    /// their defaults; the result is validated.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let number = |key: &'static str| -> Result<Option<u64>, ConfigError> {
            match lookup(key) {
                None => Ok(None),
                Some(raw) => match raw.trim().parse::<u64>() {
                    Ok(n) => Ok(Some(n)),
                    Err(_) => Err(ConfigError::Unparseable { key, value: raw }),
                },
            }
        };
        let seconds = |key: &'static str| number(key).map(|n| n.map(Duration::from_secs));

        let defaults = Self::default();
        let nonce_ttl = seconds(ENV_NONCE_TTL)?.unwrap_or(defaults.nonce_ttl);
        let max_sessions = match number(ENV_MAX_SESSIONS)? {
            Some(n) => usize::try_from(n).map_err(|_| ConfigError::OutOfRange(ENV_MAX_SESSIONS))?,
            None => defaults.max_sessions_per_subject,
        };

        let config = Self {
            session_ttl: seconds(ENV_SESSION_TTL)?.unwrap_or(defaults.session_ttl),
            refresh_ttl: seconds(ENV_REFRESH_TTL)?.unwrap_or(defaults.refresh_ttl),
            max_sessions_per_subject: max_sessions,
            nonce_ttl,
            nonce_cleanup_interval: seconds(ENV_NONCE_CLEANUP_INTERVAL)?
                .unwrap_or(nonce_ttl / 2),
            session_cleanup_interval: seconds(ENV_SESSION_CLEANUP_INTERVAL)?
                .unwrap_or(defaults.session_cleanup_interval),
            cleanup_grace_period: seconds(ENV_CLEANUP_GRACE)?
                .unwrap_or(defaults.cleanup_grace_period),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants every consumer relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("session_ttl", self.session_ttl),
            ("refresh_ttl", self.refresh_ttl),
            ("nonce_ttl", self.nonce_ttl),
            ("nonce_cleanup_interval", self.nonce_cleanup_interval),
            ("session_cleanup_interval", self.session_cleanup_interval),
        ];
        for (name, value) in positive {
            if value.is_zero() {
                return Err(ConfigError::Zero(name));
            }
        }

        for (name, value) in positive
            .into_iter()
            .chain([("cleanup_grace_period", self.cleanup_grace_period)])
        {
            time_delta(value, name)?;
        }

        if self.refresh_ttl < self.session_ttl {
            return Err(ConfigError::RefreshShorterThanSession {
                session: self.session_ttl,
                refresh: self.refresh_ttl,
            });
        }

        Ok(())
    }
}

/// Convert a configured duration for timestamp arithmetic.
pub(crate) fn time_delta(value: Duration, name: &'static str) -> Result<TimeDelta, ConfigError> {
    if value > MAX_DURATION {
        return Err(ConfigError::OutOfRange(name));
    }
    TimeDelta::from_std(value).map_err(|_| ConfigError::OutOfRange(name))
}
