//! Domain models for Keystone.

pub mod context;
pub mod session;
