//! Integration tests for the SurrealDB session repository.

use chrono::{DateTime, Duration, Utc};
use keystone_core::error::KeystoneError;
use keystone_core::models::session::{CreateSession, UpdateSession};
use keystone_core::repository::SessionRepository;
use keystone_db::repository::SurrealSessionRepository;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

/// Helper: spin up in-memory DB and run migrations.
async fn setup() -> SurrealSessionRepository<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    keystone_db::run_migrations(&db).await.unwrap();
    SurrealSessionRepository::new(db)
}

fn new_session(subject: &str, hash: &str, created_at: DateTime<Utc>) -> CreateSession {
    CreateSession {
        subject_id: subject.into(),
        refresh_secret_hash: hash.into(),
        ip_address: Some("127.0.0.1".into()),
        user_agent: Some("test".into()),
        device_id: None,
        created_at,
        access_expires_at: created_at + Duration::hours(24),
        refresh_expires_at: created_at + Duration::hours(168),
    }
}

fn rotation(expected: &str, next: &str, now: DateTime<Utc>) -> UpdateSession {
    UpdateSession {
        expected_refresh_secret_hash: expected.into(),
        refresh_secret_hash: next.into(),
        access_expires_at: now + Duration::hours(24),
        refresh_expires_at: now + Duration::hours(168),
    }
}

#[tokio::test]
async fn create_and_get_session() {
    let repo = setup().await;
    let now = Utc::now();

    let session = repo
        .create(new_session("user-1", "hash-a", now))
        .await
        .unwrap();
    assert_eq!(session.subject_id, "user-1");
    assert!(session.is_active);
    assert!(session.deactivated_at.is_none());
    assert_eq!(session.ip_address.as_deref(), Some("127.0.0.1"));

    let fetched = repo.get_by_id(session.id).await.unwrap();
    assert_eq!(fetched.id, session.id);
    assert_eq!(fetched.refresh_secret_hash, "hash-a");
    assert_eq!(fetched.user_agent.as_deref(), Some("test"));
}

#[tokio::test]
async fn get_missing_session_is_not_found() {
    let repo = setup().await;
    let err = repo.get_by_id(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, KeystoneError::NotFound { .. }));
}

#[tokio::test]
async fn get_by_refresh_secret_hash() {
    let repo = setup().await;
    let session = repo
        .create(new_session("user-1", "hash-lookup", Utc::now()))
        .await
        .unwrap();

    let fetched = repo.get_by_refresh_secret_hash("hash-lookup").await.unwrap();
    assert_eq!(fetched.id, session.id);

    let err = repo
        .get_by_refresh_secret_hash("no-such-hash")
        .await
        .unwrap_err();
    assert!(matches!(err, KeystoneError::NotFound { .. }));
}

#[tokio::test]
async fn duplicate_refresh_hash_is_rejected() {
    let repo = setup().await;
    let now = Utc::now();
    repo.create(new_session("user-1", "dup", now)).await.unwrap();

    let err = repo
        .create(new_session("user-2", "dup", now))
        .await
        .unwrap_err();
    assert!(matches!(err, KeystoneError::Conflict));
}

#[tokio::test]
async fn conditional_update_rotates_secret() {
    let repo = setup().await;
    let now = Utc::now();
    let session = repo
        .create(new_session("user-1", "hash-1", now))
        .await
        .unwrap();

    let later = now + Duration::minutes(10);
    let updated = repo
        .update(session.id, rotation("hash-1", "hash-2", later))
        .await
        .unwrap();
    assert_eq!(updated.id, session.id);
    assert_eq!(updated.refresh_secret_hash, "hash-2");
    assert_eq!(updated.access_expires_at, later + Duration::hours(24));

    // The old secret no longer matches.
    let err = repo
        .update(session.id, rotation("hash-1", "hash-3", later))
        .await
        .unwrap_err();
    assert!(matches!(err, KeystoneError::Conflict));

    let stored = repo.get_by_id(session.id).await.unwrap();
    assert_eq!(stored.refresh_secret_hash, "hash-2");
}

#[tokio::test]
async fn update_of_inactive_session_conflicts() {
    let repo = setup().await;
    let now = Utc::now();
    let session = repo
        .create(new_session("user-1", "hash-1", now))
        .await
        .unwrap();
    repo.deactivate(session.id, now).await.unwrap();

    let err = repo
        .update(session.id, rotation("hash-1", "hash-2", now))
        .await
        .unwrap_err();
    assert!(matches!(err, KeystoneError::Conflict));

    let stored = repo.get_by_id(session.id).await.unwrap();
    assert!(!stored.is_active, "update must never reactivate");
}

#[tokio::test]
async fn update_of_missing_session_is_not_found() {
    let repo = setup().await;
    let err = repo
        .update(Uuid::new_v4(), rotation("x", "y", Utc::now()))
        .await
        .unwrap_err();
    assert!(matches!(err, KeystoneError::NotFound { .. }));
}

#[tokio::test]
async fn deactivate_is_idempotent() {
    let repo = setup().await;
    let now = Utc::now();
    let session = repo
        .create(new_session("user-1", "hash-1", now))
        .await
        .unwrap();

    repo.deactivate(session.id, now).await.unwrap();
    repo.deactivate(session.id, now + Duration::minutes(1))
        .await
        .unwrap();

    let stored = repo.get_by_id(session.id).await.unwrap();
    assert!(!stored.is_active);
    assert_eq!(stored.deactivated_at, Some(now));

    let err = repo.deactivate(Uuid::new_v4(), now).await.unwrap_err();
    assert!(matches!(err, KeystoneError::NotFound { .. }));
}

#[tokio::test]
async fn delete_session() {
    let repo = setup().await;
    let session = repo
        .create(new_session("user-1", "hash-1", Utc::now()))
        .await
        .unwrap();

    repo.delete(session.id).await.unwrap();
    let err = repo.get_by_id(session.id).await.unwrap_err();
    assert!(matches!(err, KeystoneError::NotFound { .. }));
}

#[tokio::test]
async fn list_active_by_subject_oldest_first() {
    let repo = setup().await;
    let now = Utc::now();

    let second = repo
        .create(new_session("user-1", "h2", now - Duration::minutes(1)))
        .await
        .unwrap();
    let first = repo
        .create(new_session("user-1", "h1", now - Duration::minutes(2)))
        .await
        .unwrap();
    let inactive = repo
        .create(new_session("user-1", "h3", now))
        .await
        .unwrap();
    repo.create(new_session("user-2", "h4", now)).await.unwrap();
    repo.deactivate(inactive.id, now).await.unwrap();

    let sessions = repo.list_active_by_subject("user-1").await.unwrap();
    let ids: Vec<Uuid> = sessions.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![first.id, second.id]);
}

#[tokio::test]
async fn delete_expired_respects_grace_period() {
    let repo = setup().await;
    let now = Utc::now();
    let grace = Duration::hours(24);

    // Expired and deactivated two days ago: past the grace window.
    let mut old = new_session("user-1", "old", now - Duration::days(3));
    old.access_expires_at = now - Duration::days(2);
    let old = repo.create(old).await.unwrap();
    repo.deactivate(old.id, now - Duration::days(2)).await.unwrap();

    // Expired and deactivated an hour ago: still inside the grace window.
    let mut recent = new_session("user-1", "recent", now - Duration::days(1));
    recent.access_expires_at = now - Duration::hours(1);
    let recent = repo.create(recent).await.unwrap();
    repo.deactivate(recent.id, now - Duration::hours(1))
        .await
        .unwrap();

    // Invalidated but access expiry still ahead.
    let live = repo.create(new_session("user-1", "live", now)).await.unwrap();
    repo.deactivate(live.id, now - Duration::days(2)).await.unwrap();

    let deleted = repo.delete_expired(now, now - grace).await.unwrap();
    assert_eq!(deleted, 1);

    assert!(matches!(
        repo.get_by_id(old.id).await.unwrap_err(),
        KeystoneError::NotFound { .. }
    ));
    assert!(repo.get_by_id(recent.id).await.is_ok());
    assert!(repo.get_by_id(live.id).await.is_ok());
}

#[tokio::test]
async fn delete_expired_removes_abandoned_active_sessions() {
    let repo = setup().await;
    let now = Utc::now();

    // Never demoted, and its refresh window closed two days ago.
    let mut abandoned = new_session("user-1", "abandoned", now - Duration::days(10));
    abandoned.access_expires_at = now - Duration::days(9);
    abandoned.refresh_expires_at = now - Duration::days(2);
    let abandoned = repo.create(abandoned).await.unwrap();

    // Access expired but still refreshable: must stay.
    let mut refreshable = new_session("user-1", "refreshable", now - Duration::days(2));
    refreshable.access_expires_at = now - Duration::days(1);
    let refreshable = repo.create(refreshable).await.unwrap();

    let deleted = repo
        .delete_expired(now, now - Duration::hours(24))
        .await
        .unwrap();
    assert_eq!(deleted, 1);
    assert!(repo.get_by_id(abandoned.id).await.is_err());
    assert!(repo.get_by_id(refreshable.id).await.is_ok());
}

#[tokio::test]
async fn delete_expired_reports_only_what_it_removed() {
    let repo = setup().await;
    let now = Utc::now();

    let mut stale = new_session("user-1", "hash-stale", now - Duration::days(10));
    stale.access_expires_at = now - Duration::days(9);
    stale.refresh_expires_at = now - Duration::days(3);
    repo.create(stale).await.unwrap();
    repo.create(new_session("user-1", "hash-live", now))
        .await
        .unwrap();

    let cutoff = now - Duration::hours(24);
    assert_eq!(repo.delete_expired(now, cutoff).await.unwrap(), 1);
    // Nothing left to remove: a repeated sweep reports zero.
    assert_eq!(repo.delete_expired(now, cutoff).await.unwrap(), 0);
    assert_eq!(repo.list_active_by_subject("user-1").await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_deactivations_all_succeed() {
    let repo = setup().await;
    let now = Utc::now();
    let session = repo
        .create(new_session("user-1", "hash-1", now))
        .await
        .unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let repo = repo.clone();
            tokio::spawn(async move { repo.deactivate(session.id, Utc::now()).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let stored = repo.get_by_id(session.id).await.unwrap();
    assert!(!stored.is_active);
    assert!(stored.deactivated_at.is_some());
}
