//! Background cleanup of expired nonces and sessions.
//!
//! One task drives both sweeps on their own intervals. A failed sweep is
//! logged and the task carries on; only cancellation stops it.

use std::sync::Arc;
use std::time::Duration;

use keystone_core::repository::SessionRepository;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::nonce::NonceRegistry;
use crate::session::SessionManager;

/// Handle to the running cleanup task.
pub struct CleanupScheduler {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl CleanupScheduler {
    /// Spawn the cleanup task on the current tokio runtime, using the
    /// intervals from the manager's configuration.
    pub fn spawn<S>(nonces: Arc<NonceRegistry>, sessions: Arc<SessionManager<S>>) -> Self
    where
        S: SessionRepository + 'static,
    {
        let nonce_every = sessions.config().nonce_cleanup_interval;
        let session_every = sessions.config().session_cleanup_interval;
        Self::spawn_with_intervals(nonces, sessions, nonce_every, session_every)
    }

    /// Like [`spawn`](Self::spawn) with explicit intervals.
    ///
    /// # Panics
    ///
    /// Panics if either interval is zero.
    pub fn spawn_with_intervals<S>(
        nonces: Arc<NonceRegistry>,
        sessions: Arc<SessionManager<S>>,
        nonce_every: Duration,
        session_every: Duration,
    ) -> Self
    where
        S: SessionRepository + 'static,
    {
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();

        info!(
            nonce_interval_secs = nonce_every.as_secs_f64(),
            session_interval_secs = session_every.as_secs_f64(),
            "Cleanup scheduler started"
        );

        let handle = tokio::spawn(async move {
            run(nonces, sessions, nonce_every, session_every, token).await;
            info!("Cleanup scheduler stopped");
        });

        Self { shutdown, handle }
    }

    /// Token that stops the task when cancelled. Cancelling it directly
    /// has the same effect as [`shutdown`](Self::shutdown) without waiting.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the task and wait for it to exit. A sweep in flight is
    /// abandoned rather than awaited.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Cleanup task did not exit cleanly");
        }
    }
}

async fn run<S: SessionRepository>(
    nonces: Arc<NonceRegistry>,
    sessions: Arc<SessionManager<S>>,
    nonce_every: Duration,
    session_every: Duration,
    shutdown: CancellationToken,
) {
    // The two sweeps tick independently, so a slow store never holds up
    // nonce expiry. Cancellation drops both, including a sweep in flight.
    tokio::select! {
        biased;

        () = shutdown.cancelled() => {}
        () = sweep_nonces(&nonces, ticker(nonce_every)) => {}
        () = sweep_sessions(&sessions, ticker(session_every)) => {}
    }
}

fn ticker(period: Duration) -> Interval {
    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tick
}

async fn sweep_nonces(nonces: &NonceRegistry, mut tick: Interval) {
    // Skip the immediate first tick
    tick.tick().await;
    loop {
        tick.tick().await;
        let removed = nonces.cleanup();
        if removed > 0 {
            info!(removed, remaining = nonces.len(), "Nonce cleanup completed");
        } else {
            debug!("Nonce cleanup: nothing expired");
        }
    }
}

async fn sweep_sessions<S: SessionRepository>(sessions: &SessionManager<S>, mut tick: Interval) {
    tick.tick().await;
    loop {
        tick.tick().await;
        match sessions.cleanup_expired_sessions().await {
            Ok(0) => debug!("Session cleanup: nothing expired"),
            Ok(deleted) => info!(deleted, "Session cleanup completed"),
            Err(e) => warn!(error = %e, "Session cleanup failed"),
        }
    }
}
