//! One-time nonces for replay protection.
//!
//! A nonce is issued with an absolute expiry and is removed the first time
//! anyone presents it, whether or not it is still within its lifetime.
//! Check and removal happen under a single lock, so two callers racing on
//! the same value get exactly one success.
//!
//! One coarse lock over the whole map: outstanding nonces are bounded by
//! login rate times TTL, and every critical section is a single hash map
//! operation.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use keystone_core::error::KeystoneResult;
use parking_lot::Mutex;
use tracing::debug;

use crate::config::SessionConfig;
use crate::error::AuthError;
use crate::token;

pub struct NonceRegistry {
    /// nonce value → expiry.
    entries: Mutex<HashMap<String, Instant>>,
    ttl: Duration,
}

impl NonceRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.nonce_ttl)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a new nonce valid for the configured TTL.
    pub fn generate(&self) -> String {
        let value = token::generate_nonce();
        let expires_at = Instant::now() + self.ttl;
        self.entries.lock().insert(value.clone(), expires_at);
        value
    }

    /// Consume a nonce.
    ///
    /// Fails with `Invalid` when the value was never issued or has already
    /// been consumed, and with `Expired` when its TTL has elapsed. Either
    /// way the value can never succeed afterwards.
    pub fn validate(&self, value: &str) -> KeystoneResult<()> {
        let expires_at = self.entries.lock().remove(value);

        match expires_at {
            None => {
                debug!(nonce = %token::redact(value), "Rejected unknown or reused nonce");
                Err(AuthError::NonceInvalid.into())
            }
            Some(expires_at) if Instant::now() > expires_at => {
                debug!(nonce = %token::redact(value), "Rejected expired nonce");
                Err(AuthError::NonceExpired.into())
            }
            Some(_) => Ok(()),
        }
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, expires_at| *expires_at >= now);
        before - entries.len()
    }

    /// Whether `value` is still held (issued, not yet consumed or swept).
    pub fn contains(&self, value: &str) -> bool {
        self.entries.lock().contains_key(value)
    }

    /// Number of outstanding nonces.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
