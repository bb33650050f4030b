//! Process-local implementation of [`SessionRepository`].
//!
//! Every operation runs under one lock, which makes the conditional
//! refresh update trivially atomic. Useful for embedding and tests; state
//! does not survive a restart and is not shared between processes.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use keystone_core::error::{KeystoneError, KeystoneResult};
use keystone_core::models::session::{CreateSession, Session, UpdateSession};
use keystone_core::repository::SessionRepository;
use uuid::Uuid;

type SessionMap = HashMap<Uuid, Session>;

fn not_found(id: impl Into<String>) -> KeystoneError {
    KeystoneError::NotFound {
        entity: "session".into(),
        id: id.into(),
    }
}

fn poisoned() -> KeystoneError {
    KeystoneError::Persistence("session map lock poisoned".into())
}

/// In-memory session repository. Clones share the same map.
#[derive(Clone, Default)]
pub struct MemorySessionRepository {
    sessions: Arc<RwLock<SessionMap>>,
}

impl MemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, active or not.
    pub fn len(&self) -> KeystoneResult<usize> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> KeystoneResult<bool> {
        Ok(self.read()?.is_empty())
    }

    fn read(&self) -> KeystoneResult<RwLockReadGuard<'_, SessionMap>> {
        self.sessions.read().map_err(|_| poisoned())
    }

    fn write(&self) -> KeystoneResult<RwLockWriteGuard<'_, SessionMap>> {
        self.sessions.write().map_err(|_| poisoned())
    }
}

fn hash_in_use(sessions: &SessionMap, hash: &str, except: Option<Uuid>) -> bool {
    sessions
        .values()
        .any(|s| s.refresh_secret_hash == hash && Some(s.id) != except)
}

impl SessionRepository for MemorySessionRepository {
    async fn create(&self, input: CreateSession) -> KeystoneResult<Session> {
        let mut sessions = self.write()?;
        if hash_in_use(&sessions, &input.refresh_secret_hash, None) {
            return Err(KeystoneError::Conflict);
        }

        let session = Session {
            id: Uuid::new_v4(),
            subject_id: input.subject_id,
            refresh_secret_hash: input.refresh_secret_hash,
            ip_address: input.ip_address,
            user_agent: input.user_agent,
            device_id: input.device_id,
            created_at: input.created_at,
            access_expires_at: input.access_expires_at,
            refresh_expires_at: input.refresh_expires_at,
            is_active: true,
            deactivated_at: None,
        };
        sessions.insert(session.id, session.clone());

        Ok(session)
    }

    async fn get_by_id(&self, id: Uuid) -> KeystoneResult<Session> {
        self.read()?
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found(id.to_string()))
    }

    async fn get_by_refresh_secret_hash(&self, refresh_secret_hash: &str) -> KeystoneResult<Session> {
        self.read()?
            .values()
            .find(|s| s.refresh_secret_hash == refresh_secret_hash)
            .cloned()
            .ok_or_else(|| not_found("refresh_secret_hash"))
    }

    async fn update(&self, id: Uuid, input: UpdateSession) -> KeystoneResult<Session> {
        let mut sessions = self.write()?;
        if hash_in_use(&sessions, &input.refresh_secret_hash, Some(id)) {
            return Err(KeystoneError::Conflict);
        }

        let session = sessions
            .get_mut(&id)
            .ok_or_else(|| not_found(id.to_string()))?;
        if !session.is_active || session.refresh_secret_hash != input.expected_refresh_secret_hash
        {
            return Err(KeystoneError::Conflict);
        }

        session.refresh_secret_hash = input.refresh_secret_hash;
        session.access_expires_at = input.access_expires_at;
        session.refresh_expires_at = input.refresh_expires_at;

        Ok(session.clone())
    }

    async fn deactivate(&self, id: Uuid, at: DateTime<Utc>) -> KeystoneResult<()> {
        let mut sessions = self.write()?;
        let session = sessions
            .get_mut(&id)
            .ok_or_else(|| not_found(id.to_string()))?;
        if session.is_active {
            session.is_active = false;
            session.deactivated_at = Some(at);
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> KeystoneResult<()> {
        self.write()?.remove(&id);
        Ok(())
    }

    async fn delete_expired(
        &self,
        now: DateTime<Utc>,
        grace_cutoff: DateTime<Utc>,
    ) -> KeystoneResult<u64> {
        let mut sessions = self.write()?;
        let before = sessions.len();
        sessions.retain(|_, s| {
            let left_service = if s.is_active {
                Some(s.refresh_expires_at)
            } else {
                s.deactivated_at
            };
            let past_grace = left_service.is_some_and(|at| at < grace_cutoff);
            !(s.access_expires_at < now && past_grace)
        });
        Ok((before - sessions.len()) as u64)
    }

    async fn list_active_by_subject(&self, subject_id: &str) -> KeystoneResult<Vec<Session>> {
        let mut active: Vec<Session> = self
            .read()?
            .values()
            .filter(|s| s.is_active && s.subject_id == subject_id)
            .cloned()
            .collect();
        active.sort_by_key(|s| s.created_at);
        Ok(active)
    }
}
