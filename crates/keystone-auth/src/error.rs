//! Authentication error types.

use keystone_core::error::KeystoneError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("session is inactive")]
    SessionInactive,

    #[error("session has expired")]
    SessionExpired,

    #[error("refresh window has expired")]
    RefreshExpired,

    #[error("session was refreshed concurrently")]
    RefreshConflict,

    #[error("nonce is unknown or already used")]
    NonceInvalid,

    #[error("nonce has expired")]
    NonceExpired,
}

impl From<AuthError> for KeystoneError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::SessionInactive => KeystoneError::Inactive,
            AuthError::SessionExpired | AuthError::RefreshExpired | AuthError::NonceExpired => {
                KeystoneError::Expired
            }
            AuthError::RefreshConflict => KeystoneError::Conflict,
            AuthError::NonceInvalid => KeystoneError::Invalid,
        }
    }
}
