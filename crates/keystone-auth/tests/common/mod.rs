//! Shared helpers for the keystone-auth integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use keystone_auth::SessionConfig;
use keystone_core::error::{KeystoneError, KeystoneResult};
use keystone_core::models::session::{CreateSession, Session, UpdateSession};
use keystone_core::repository::SessionRepository;
use keystone_db::repository::SurrealSessionRepository;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use tokio::sync::Barrier;
use uuid::Uuid;

/// In-memory SurrealDB with the schema applied.
pub async fn surreal_repo() -> SurrealSessionRepository<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    keystone_db::run_migrations(&db).await.unwrap();
    SurrealSessionRepository::new(db)
}

/// Defaults with the background intervals pushed far out so tests drive
/// sweeps explicitly.
pub fn test_config() -> SessionConfig {
    SessionConfig {
        nonce_cleanup_interval: Duration::from_secs(3600),
        session_cleanup_interval: Duration::from_secs(3600),
        ..SessionConfig::default()
    }
}

/// Repository wrapper that can hold reads at a barrier, slow down sweeps
/// or make them fail. Everything else goes straight to `inner`.
pub struct GatedRepository<R> {
    inner: R,
    read_gate: Option<Arc<Barrier>>,
    sweep_delay: Option<Duration>,
    fail_sweeps: bool,
    vanishing_oldest: bool,
    sweeps: Arc<AtomicUsize>,
}

impl<R: SessionRepository> GatedRepository<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            read_gate: None,
            sweep_delay: None,
            fail_sweeps: false,
            vanishing_oldest: false,
            sweeps: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Every `get_by_id` waits at `gate` after reading.
    pub fn with_read_gate(mut self, gate: Arc<Barrier>) -> Self {
        self.read_gate = Some(gate);
        self
    }

    pub fn with_sweep_delay(mut self, delay: Duration) -> Self {
        self.sweep_delay = Some(delay);
        self
    }

    pub fn failing_sweeps(mut self) -> Self {
        self.fail_sweeps = true;
        self
    }

    /// `list_active_by_subject` deletes the oldest listed record right
    /// after reading it, as if a sweep ran in between.
    pub fn vanishing_oldest(mut self) -> Self {
        self.vanishing_oldest = true;
        self
    }

    /// Counter of `delete_expired` calls that have started.
    pub fn sweep_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.sweeps)
    }
}

impl<R: SessionRepository> SessionRepository for GatedRepository<R> {
    async fn create(&self, input: CreateSession) -> KeystoneResult<Session> {
        self.inner.create(input).await
    }

    async fn get_by_id(&self, id: Uuid) -> KeystoneResult<Session> {
        let session = self.inner.get_by_id(id).await;
        if let Some(gate) = &self.read_gate {
            gate.wait().await;
        }
        session
    }

    async fn get_by_refresh_secret_hash(&self, refresh_secret_hash: &str) -> KeystoneResult<Session> {
        self.inner.get_by_refresh_secret_hash(refresh_secret_hash).await
    }

    async fn update(&self, id: Uuid, input: UpdateSession) -> KeystoneResult<Session> {
        self.inner.update(id, input).await
    }

    async fn deactivate(&self, id: Uuid, at: DateTime<Utc>) -> KeystoneResult<()> {
        self.inner.deactivate(id, at).await
    }

    async fn delete(&self, id: Uuid) -> KeystoneResult<()> {
        self.inner.delete(id).await
    }

    async fn delete_expired(
        &self,
        now: DateTime<Utc>,
        grace_cutoff: DateTime<Utc>,
    ) -> KeystoneResult<u64> {
        self.sweeps.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.sweep_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_sweeps {
            return Err(KeystoneError::Persistence("store unavailable".into()));
        }
        self.inner.delete_expired(now, grace_cutoff).await
    }

    async fn list_active_by_subject(&self, subject_id: &str) -> KeystoneResult<Vec<Session>> {
        let active = self.inner.list_active_by_subject(subject_id).await?;
        if self.vanishing_oldest
            && let Some(oldest) = active.first()
        {
            self.inner.delete(oldest.id).await?;
        }
        Ok(active)
    }
}
