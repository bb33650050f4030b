//! Database-specific error types and conversions.

use keystone_core::error::KeystoneError;

/// Engine messages that mean "another writer got there first": an
/// optimistic transaction conflict, or a unique index rejecting a value
/// that is already taken.
const CONFLICT_MARKERS: &[&str] = &[
    "Transaction conflict",
    "retry the transaction",
    "already contains",
];

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[source] surrealdb::Error),

    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Malformed record: {0}")]
    Decode(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },
}

impl DbError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, DbError::Conflict(_))
    }
}

fn is_conflict_message(message: &str) -> bool {
    CONFLICT_MARKERS.iter().any(|marker| message.contains(marker))
}

impl From<surrealdb::Error> for DbError {
    fn from(err: surrealdb::Error) -> Self {
        let message = err.to_string();
        if is_conflict_message(&message) {
            DbError::Conflict(message)
        } else {
            DbError::Surreal(err)
        }
    }
}

impl From<DbError> for KeystoneError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => KeystoneError::NotFound { entity, id },
            DbError::Conflict(_) => KeystoneError::Conflict,
            other => KeystoneError::Persistence(other.to_string()),
        }
    }
}
