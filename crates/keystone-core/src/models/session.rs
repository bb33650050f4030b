//! Session domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{KeystoneError, KeystoneResult};

/// A server-side session record.
///
/// `access_expires_at <= refresh_expires_at` always holds, and once
/// `is_active` is false it never becomes true again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub subject_id: String,
    /// SHA-256 (hex) of the current refresh secret. The raw secret is
    /// only ever handed to the client.
    pub refresh_secret_hash: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub device_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
    pub is_active: bool,
    /// When the session left the active state (invalidation, eviction or
    /// lazily discovered expiry).
    pub deactivated_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_access_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.access_expires_at
    }

    pub fn is_refresh_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.refresh_expires_at
    }
}

/// Advisory client metadata. Logged, never used for security decisions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub device_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSession {
    pub subject_id: String,
    pub refresh_secret_hash: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub device_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Refresh-secret rotation, applied as a compare-and-swap on
/// `expected_refresh_secret_hash`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSession {
    pub expected_refresh_secret_hash: String,
    pub refresh_secret_hash: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

/// A session together with the raw refresh secret that was just minted
/// for it. Returned only by creation and refresh.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub session: Session,
    pub refresh_secret: String,
}

impl IssuedSession {
    pub fn id(&self) -> Uuid {
        self.session.id
    }

    pub fn refresh_secret(&self) -> &str {
        &self.refresh_secret
    }

    pub fn access_expires_at(&self) -> DateTime<Utc> {
        self.session.access_expires_at
    }

    pub fn refresh_expires_at(&self) -> DateTime<Utc> {
        self.session.refresh_expires_at
    }
}

/// Parse an opaque session id received from a client.
///
/// A value that is not a well-formed id can never have been issued, so
/// it is reported as not found rather than as a validation failure.
pub fn parse_session_id(raw: &str) -> KeystoneResult<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| KeystoneError::NotFound {
        entity: "session".into(),
        id: raw.chars().take(8).collect(),
    })
}
