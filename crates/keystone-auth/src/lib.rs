//! Keystone Auth — session lifecycle (create, validate, refresh,
//! invalidate, evict, sweep) and one-time nonces for replay protection.

pub mod cleanup;
pub mod config;
pub mod error;
pub mod nonce;
pub mod session;
pub mod token;

pub use cleanup::CleanupScheduler;
pub use config::{ConfigError, SessionConfig};
pub use error::AuthError;
pub use nonce::NonceRegistry;
pub use session::SessionManager;
