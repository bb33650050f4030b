//! Session lifecycle: creation, validation, refresh, invalidation and
//! expiry sweeps.
//!
//! The manager keeps no state of its own between calls; every read goes
//! to the repository, so several service instances can share one store.
//! Concurrent refreshes of one session are serialised by the repository's
//! conditional update, not by a lock here.

use chrono::{TimeDelta, Utc};
use keystone_core::error::{KeystoneError, KeystoneResult};
use keystone_core::models::context::RequestContext;
use keystone_core::models::session::{
    ClientInfo, CreateSession, IssuedSession, Session, UpdateSession,
};
use keystone_core::repository::SessionRepository;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{SessionConfig, time_delta};
use crate::error::AuthError;
use crate::token;

/// Session manager.
///
/// Generic over the repository implementation so that the session
/// layer has no dependency on the database crate.
pub struct SessionManager<S: SessionRepository> {
    repo: S,
    config: SessionConfig,
    session_ttl: TimeDelta,
    refresh_ttl: TimeDelta,
    grace_period: TimeDelta,
}

fn short(id: Uuid) -> String {
    token::redact(&id.to_string())
}

impl<S: SessionRepository> SessionManager<S> {
    /// Fails with `Configuration` if `config` does not validate.
    pub fn new(repo: S, config: SessionConfig) -> KeystoneResult<Self> {
        config.validate()?;
        Ok(Self {
            session_ttl: time_delta(config.session_ttl, "session_ttl")?,
            refresh_ttl: time_delta(config.refresh_ttl, "refresh_ttl")?,
            grace_period: time_delta(config.cleanup_grace_period, "cleanup_grace_period")?,
            repo,
            config,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Start a new session for `subject_id`.
    ///
    /// When the subject already holds `max_sessions_per_subject` active
    /// sessions, the one created earliest is deactivated first. Eviction
    /// is by creation time, not by last use.
    pub async fn create_session(
        &self,
        subject_id: &str,
        client: ClientInfo,
    ) -> KeystoneResult<IssuedSession> {
        // 1. Enforce the per-subject cap.
        let cap = self.config.max_sessions_per_subject;
        if cap > 0 {
            let active = self.repo.list_active_by_subject(subject_id).await?;
            if active.len() >= cap
                && let Some(oldest) = active.iter().min_by_key(|s| s.created_at)
            {
                match self.repo.deactivate(oldest.id, Utc::now()).await {
                    Ok(()) => info!(
                        subject_id,
                        evicted = %short(oldest.id),
                        active = active.len(),
                        cap,
                        "Evicted oldest session to enforce per-subject cap"
                    ),
                    // Swept between the listing and now: nothing to evict.
                    Err(KeystoneError::NotFound { .. }) => debug!(
                        subject_id,
                        evicted = %short(oldest.id),
                        "Eviction candidate already gone"
                    ),
                    Err(e) => return Err(e),
                }
            }
        }

        // 2. Mint the refresh secret and persist the record.
        let now = Utc::now();
        let refresh_secret = token::generate_refresh_secret();
        let session = self
            .repo
            .create(CreateSession {
                subject_id: subject_id.to_string(),
                refresh_secret_hash: token::hash_refresh_secret(&refresh_secret),
                ip_address: client.ip_address,
                user_agent: client.user_agent,
                device_id: client.device_id,
                created_at: now,
                access_expires_at: now + self.session_ttl,
                refresh_expires_at: now + self.refresh_ttl,
            })
            .await?;

        info!(
            session_id = %short(session.id),
            subject_id,
            ip_address = session.ip_address.as_deref().unwrap_or("-"),
            "Session created"
        );

        Ok(IssuedSession {
            session,
            refresh_secret,
        })
    }

    /// Fetch a session as stored, whatever its state.
    pub async fn get_session(&self, id: Uuid) -> KeystoneResult<Session> {
        self.repo.get_by_id(id).await
    }

    /// Return the session if it may be used right now.
    ///
    /// An active session found past its access expiry is deactivated on
    /// the spot, so expiry does not depend on the background sweep.
    pub async fn validate_session(&self, id: Uuid) -> KeystoneResult<Session> {
        let session = self.repo.get_by_id(id).await?;

        if !session.is_active {
            debug!(session_id = %short(id), "Rejected inactive session");
            return Err(AuthError::SessionInactive.into());
        }

        let now = Utc::now();
        if session.is_access_expired(now) {
            self.repo.deactivate(id, now).await?;
            debug!(
                session_id = %short(id),
                expired_at = %session.access_expires_at,
                "Session expired; marked inactive"
            );
            return Err(AuthError::SessionExpired.into());
        }

        Ok(session)
    }

    /// Validate a session and turn it into the request-scoped identity
    /// that handlers pass down explicitly.
    pub async fn authenticate(&self, id: Uuid) -> KeystoneResult<RequestContext> {
        self.validate_session(id).await.map(RequestContext::from)
    }

    /// Rotate the refresh secret and extend both expiries from now.
    ///
    /// Only the refresh expiry is checked; an access-expired session that
    /// has not yet been demoted can still be refreshed. Of several
    /// concurrent refreshes, one wins and the rest get `Conflict`.
    pub async fn refresh_session(&self, id: Uuid) -> KeystoneResult<IssuedSession> {
        let session = self.repo.get_by_id(id).await?;
        self.rotate(session).await
    }

    /// Refresh the session that owns `refresh_secret`.
    ///
    /// A secret that has already been rotated away matches nothing and is
    /// reported as `NotFound`.
    pub async fn refresh_with_secret(&self, refresh_secret: &str) -> KeystoneResult<IssuedSession> {
        let hash = token::hash_refresh_secret(refresh_secret);
        let session = self.repo.get_by_refresh_secret_hash(&hash).await?;
        self.rotate(session).await
    }

    async fn rotate(&self, session: Session) -> KeystoneResult<IssuedSession> {
        if !session.is_active {
            debug!(session_id = %short(session.id), "Refresh rejected: session inactive");
            return Err(AuthError::SessionInactive.into());
        }

        let now = Utc::now();
        if session.is_refresh_expired(now) {
            debug!(session_id = %short(session.id), "Refresh rejected: refresh window closed");
            return Err(AuthError::RefreshExpired.into());
        }

        let refresh_secret = token::generate_refresh_secret();
        let update = UpdateSession {
            expected_refresh_secret_hash: session.refresh_secret_hash,
            refresh_secret_hash: token::hash_refresh_secret(&refresh_secret),
            access_expires_at: now + self.session_ttl,
            refresh_expires_at: now + self.refresh_ttl,
        };

        let refreshed = match self.repo.update(session.id, update).await {
            Ok(refreshed) => refreshed,
            Err(KeystoneError::Conflict) => {
                warn!(
                    session_id = %short(session.id),
                    "Refresh lost a race with a concurrent update"
                );
                return Err(AuthError::RefreshConflict.into());
            }
            Err(e) => return Err(e),
        };

        debug!(session_id = %short(refreshed.id), "Session refreshed");

        Ok(IssuedSession {
            session: refreshed,
            refresh_secret,
        })
    }

    /// End a session now. Invalidating an inactive session is a no-op;
    /// an unknown id is `NotFound`.
    pub async fn invalidate_session(&self, id: Uuid) -> KeystoneResult<()> {
        self.repo.deactivate(id, Utc::now()).await?;
        info!(session_id = %short(id), "Session invalidated");
        Ok(())
    }

    /// End every active session of a subject. Returns how many were ended.
    pub async fn invalidate_subject_sessions(&self, subject_id: &str) -> KeystoneResult<u64> {
        let now = Utc::now();
        let mut ended = 0;
        for session in self.repo.list_active_by_subject(subject_id).await? {
            match self.repo.deactivate(session.id, now).await {
                Ok(()) => ended += 1,
                Err(KeystoneError::NotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        info!(subject_id, ended, "Invalidated all sessions for subject");
        Ok(ended)
    }

    /// Active sessions of a subject, oldest first.
    pub async fn list_active_sessions(&self, subject_id: &str) -> KeystoneResult<Vec<Session>> {
        self.repo.list_active_by_subject(subject_id).await
    }

    /// Physically delete sessions that are past access expiry and have
    /// been out of service for longer than the grace period.
    pub async fn cleanup_expired_sessions(&self) -> KeystoneResult<u64> {
        let now = Utc::now();
        let deleted = self
            .repo
            .delete_expired(now, now - self.grace_period)
            .await?;
        debug!(deleted, "Expired session sweep finished");
        Ok(deleted)
    }
}
