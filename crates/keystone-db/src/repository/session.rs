//! SurrealDB implementation of [`SessionRepository`].
//!
//! Conditional writes are expressed as `UPDATE ... WHERE` on the record:
//! the statement runs in a single transaction, so two refreshes that read
//! the same refresh secret cannot both match. When the engine aborts the
//! losing transaction instead, the error surfaces as `Conflict` too.

use chrono::{DateTime, Utc};
use keystone_core::error::{KeystoneError, KeystoneResult};
use keystone_core::models::session::{CreateSession, Session, UpdateSession};
use keystone_core::repository::SessionRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::debug;
use uuid::Uuid;

use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct SessionRow {
    subject_id: String,
    refresh_secret_hash: String,
    ip_address: Option<String>,
    user_agent: Option<String>,
    device_id: Option<String>,
    created_at: DateTime<Utc>,
    access_expires_at: DateTime<Utc>,
    refresh_expires_at: DateTime<Utc>,
    is_active: bool,
    deactivated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, SurrealValue)]
struct SessionRowWithId {
    record_id: String,
    subject_id: String,
    refresh_secret_hash: String,
    ip_address: Option<String>,
    user_agent: Option<String>,
    device_id: Option<String>,
    created_at: DateTime<Utc>,
    access_expires_at: DateTime<Utc>,
    refresh_expires_at: DateTime<Utc>,
    is_active: bool,
    deactivated_at: Option<DateTime<Utc>>,
}

impl SessionRow {
    fn into_session(self, id: Uuid) -> Session {
        Session {
            id,
            subject_id: self.subject_id,
            refresh_secret_hash: self.refresh_secret_hash,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            device_id: self.device_id,
            created_at: self.created_at,
            access_expires_at: self.access_expires_at,
            refresh_expires_at: self.refresh_expires_at,
            is_active: self.is_active,
            deactivated_at: self.deactivated_at,
        }
    }
}

impl SessionRowWithId {
    fn try_into_session(self) -> Result<Session, DbError> {
        let id = Uuid::parse_str(&self.record_id)
            .map_err(|e| DbError::Decode(format!("invalid session UUID: {e}")))?;
        Ok(Session {
            id,
            subject_id: self.subject_id,
            refresh_secret_hash: self.refresh_secret_hash,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            device_id: self.device_id,
            created_at: self.created_at,
            access_expires_at: self.access_expires_at,
            refresh_expires_at: self.refresh_expires_at,
            is_active: self.is_active,
            deactivated_at: self.deactivated_at,
        })
    }
}

/// A deactivation that loses a write race is retried; losing to another
/// deactivation means the next attempt finds the record already inactive.
const DEACTIVATE_ATTEMPTS: u32 = 5;

const EXPIRED_PREDICATE: &str = "access_expires_at < $now AND (\
     (is_active = false AND deactivated_at < $cutoff) \
     OR (is_active = true AND refresh_expires_at < $cutoff))";

fn not_found(id: impl Into<String>) -> DbError {
    DbError::NotFound {
        entity: "session".into(),
        id: id.into(),
    }
}

/// SurrealDB implementation of the Session repository.
#[derive(Clone)]
pub struct SurrealSessionRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealSessionRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    /// Flip an active record to inactive. Returns whether a row changed.
    async fn mark_inactive(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, DbError> {
        let mut result = self
            .db
            .query(
                "UPDATE type::record('session', $id) SET \
                 is_active = false, \
                 deactivated_at = $at, \
                 updated_at = time::now() \
                 WHERE is_active = true",
            )
            .bind(("id", id.to_string()))
            .bind(("at", at))
            .await?;

        let rows: Vec<SessionRow> = result.take(0)?;
        Ok(!rows.is_empty())
    }
}

impl<C: Connection> SessionRepository for SurrealSessionRepository<C> {
    async fn create(&self, input: CreateSession) -> KeystoneResult<Session> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('session', $id) SET \
                 subject_id = $subject_id, \
                 refresh_secret_hash = $refresh_secret_hash, \
                 ip_address = $ip_address, \
                 user_agent = $user_agent, \
                 device_id = $device_id, \
                 created_at = $created_at, \
                 access_expires_at = $access_expires_at, \
                 refresh_expires_at = $refresh_expires_at",
            )
            .bind(("id", id_str.clone()))
            .bind(("subject_id", input.subject_id))
            .bind(("refresh_secret_hash", input.refresh_secret_hash))
            .bind(("ip_address", input.ip_address))
            .bind(("user_agent", input.user_agent))
            .bind(("device_id", input.device_id))
            .bind(("created_at", input.created_at))
            .bind(("access_expires_at", input.access_expires_at))
            .bind(("refresh_expires_at", input.refresh_expires_at))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(DbError::from)?;

        let rows: Vec<SessionRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| not_found(id_str))?;

        Ok(row.into_session(id))
    }

    async fn get_by_id(&self, id: Uuid) -> KeystoneResult<Session> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('session', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<SessionRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| not_found(id_str))?;

        Ok(row.into_session(id))
    }

    async fn get_by_refresh_secret_hash(&self, refresh_secret_hash: &str) -> KeystoneResult<Session> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM session \
                 WHERE refresh_secret_hash = $refresh_secret_hash",
            )
            .bind(("refresh_secret_hash", refresh_secret_hash.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<SessionRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| not_found("refresh_secret_hash"))?;

        row.try_into_session().map_err(Into::into)
    }

    async fn update(&self, id: Uuid, input: UpdateSession) -> KeystoneResult<Session> {
        let result = self
            .db
            .query(
                "UPDATE type::record('session', $id) SET \
                 refresh_secret_hash = $refresh_secret_hash, \
                 access_expires_at = $access_expires_at, \
                 refresh_expires_at = $refresh_expires_at, \
                 updated_at = time::now() \
                 WHERE is_active = true \
                 AND refresh_secret_hash = $expected_refresh_secret_hash",
            )
            .bind(("id", id.to_string()))
            .bind(("refresh_secret_hash", input.refresh_secret_hash))
            .bind(("access_expires_at", input.access_expires_at))
            .bind(("refresh_expires_at", input.refresh_expires_at))
            .bind((
                "expected_refresh_secret_hash",
                input.expected_refresh_secret_hash,
            ))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(DbError::from)?;

        let rows: Vec<SessionRow> = result.take(0).map_err(DbError::from)?;
        match rows.into_iter().next() {
            Some(row) => Ok(row.into_session(id)),
            None => {
                // Nothing matched: either the record is gone (NotFound
                // propagates) or it changed underneath the caller.
                self.get_by_id(id).await?;
                Err(KeystoneError::Conflict)
            }
        }
    }

    async fn deactivate(&self, id: Uuid, at: DateTime<Utc>) -> KeystoneResult<()> {
        let mut attempt = 1;
        loop {
            match self.mark_inactive(id, at).await {
                Ok(true) => return Ok(()),
                // Already inactive is fine; a missing record is not.
                Ok(false) => return self.get_by_id(id).await.map(|_| ()),
                Err(e) if e.is_conflict() && attempt < DEACTIVATE_ATTEMPTS => {
                    debug!(attempt, "Session deactivation hit a write conflict; retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn delete(&self, id: Uuid) -> KeystoneResult<()> {
        self.db
            .query("DELETE type::record('session', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        Ok(())
    }

    async fn delete_expired(
        &self,
        now: DateTime<Utc>,
        grace_cutoff: DateTime<Utc>,
    ) -> KeystoneResult<u64> {
        let delete_query = format!("DELETE session WHERE {EXPIRED_PREDICATE} RETURN BEFORE");

        let mut result = self
            .db
            .query(&delete_query)
            .bind(("now", now))
            .bind(("cutoff", grace_cutoff))
            .await
            .map_err(DbError::from)?;

        let deleted: Vec<SessionRow> = result.take(0).map_err(DbError::from)?;
        Ok(deleted.len() as u64)
    }

    async fn list_active_by_subject(&self, subject_id: &str) -> KeystoneResult<Vec<Session>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM session \
                 WHERE subject_id = $subject_id AND is_active = true \
                 ORDER BY created_at ASC",
            )
            .bind(("subject_id", subject_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<SessionRowWithId> = result.take(0).map_err(DbError::from)?;

        let sessions = rows
            .into_iter()
            .map(|row| row.try_into_session())
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(sessions)
    }
}
