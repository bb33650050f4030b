//! Error types for the Keystone session core.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeystoneError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Session is inactive")]
    Inactive,

    #[error("Expired")]
    Expired,

    #[error("Invalid or already consumed value")]
    Invalid,

    #[error("Concurrent modification: record changed since it was read")]
    Conflict,

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl KeystoneError {
    /// Whether the caller should be told to re-authenticate.
    ///
    /// Not-found, inactive, expired, invalid and conflict all collapse
    /// into the same outward response so that session ids and nonces
    /// cannot be enumerated. Use [`KeystoneError::kind`] to log the
    /// precise cause.
    pub fn requires_reauthentication(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::Inactive | Self::Expired | Self::Invalid | Self::Conflict
        )
    }

    /// Stable short label for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Inactive => "inactive",
            Self::Expired => "expired",
            Self::Invalid => "invalid",
            Self::Conflict => "conflict",
            Self::Persistence(_) => "persistence",
            Self::Configuration(_) => "configuration",
            Self::Internal(_) => "internal",
        }
    }
}

pub type KeystoneResult<T> = Result<T, KeystoneError>;
