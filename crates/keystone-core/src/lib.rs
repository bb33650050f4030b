//! Keystone Core — session domain models, the error taxonomy shared by
//! every crate, and the persistence contract the session manager is
//! written against.

pub mod error;
pub mod models;
pub mod repository;

pub use error::{KeystoneError, KeystoneResult};
