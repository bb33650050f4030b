//! Repository trait definitions for session persistence.
//!
//! All repository operations are async. Implementations must make
//! [`SessionRepository::update`] a conditional write: two refreshes racing
//! on the same record may not both succeed.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::KeystoneResult;
use crate::models::session::{CreateSession, Session, UpdateSession};

pub trait SessionRepository: Send + Sync {
    fn create(&self, input: CreateSession) -> impl Future<Output = KeystoneResult<Session>> + Send;

    fn get_by_id(&self, id: Uuid) -> impl Future<Output = KeystoneResult<Session>> + Send;

    fn get_by_refresh_secret_hash(
        &self,
        refresh_secret_hash: &str,
    ) -> impl Future<Output = KeystoneResult<Session>> + Send;

    /// Rotate the refresh secret and move both expiries.
    ///
    /// Applies only while the record is active and its stored hash equals
    /// `input.expected_refresh_secret_hash`; otherwise fails with
    /// `Conflict` (or `NotFound` when the record no longer exists).
    fn update(
        &self,
        id: Uuid,
        input: UpdateSession,
    ) -> impl Future<Output = KeystoneResult<Session>> + Send;

    /// Mark a session inactive. No-op when it already is.
    fn deactivate(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> impl Future<Output = KeystoneResult<()>> + Send;

    fn delete(&self, id: Uuid) -> impl Future<Output = KeystoneResult<()>> + Send;

    /// Physically remove sessions whose access expiry is before `now` and
    /// which left service before `grace_cutoff`. Returns the number removed.
    ///
    /// A session left service at `deactivated_at` when inactive, or at
    /// `refresh_expires_at` when it was never demoted.
    fn delete_expired(
        &self,
        now: DateTime<Utc>,
        grace_cutoff: DateTime<Utc>,
    ) -> impl Future<Output = KeystoneResult<u64>> + Send;

    /// Active sessions of one subject, oldest first.
    fn list_active_by_subject(
        &self,
        subject_id: &str,
    ) -> impl Future<Output = KeystoneResult<Vec<Session>>> + Send;
}
