//! Two-tier session store (spec.md §4.2): an in-process `DashMap` is
//! authoritative for the local connection; a `redis`-backed write-through
//! TTL cache (default 3600s) backs cross-instance lookup. `get` consults
//! the local map first, then the cache, rehydrating the local map on a
//! cache hit. `create` writes both tiers; `delete` removes both.
//!
//! Grace-deletion (spec.md §4.2, §4.4 "Close"): scheduled at connection
//! close with a configurable delay (default 300s); a session accessed
//! during the grace period cancels the pending removal via a per-session
//! `tokio::sync::Notify`.

use dashmap::DashMap;
use domain::Session;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

const KEY_PREFIX: &str = "session:";

pub struct SessionStore {
    local: DashMap<Uuid, Session>,
    redis: Option<redis::Client>,
    ttl_seconds: u64,
    grace_cancellations: DashMap<Uuid, Arc<Notify>>,
}

impl SessionStore {
    /// `redis_url = None` runs the store local-only (used by tests and any
    /// single-instance deployment that doesn't need cross-instance lookup).
    pub fn new(redis_url: Option<&str>, ttl_seconds: u64) -> Result<Arc<Self>, redis::RedisError> {
        let redis = redis_url.map(redis::Client::open).transpose()?;
        Ok(Arc::new(Self {
            local: DashMap::new(),
            redis,
            ttl_seconds,
            grace_cancellations: DashMap::new(),
        }))
    }

    fn redis_key(id: Uuid) -> String {
        format!("{KEY_PREFIX}{id}")
    }

    async fn redis_write_through(&self, session: &Session) {
        let Some(client) = &self.redis else { return };
        let key = Self::redis_key(session.id);
        let Ok(payload) = serde_json::to_string(session) else { return };
        let result: Result<(), redis::RedisError> = async {
            let mut conn = client.get_multiplexed_async_connection().await?;
            conn.set_ex(&key, payload, self.ttl_seconds).await
        }
        .await;
        if let Err(e) = result {
            tracing::warn!(error = %e, session_id = %session.id, "session cache write failed, degrading silently");
        }
    }

    async fn redis_read(&self, id: Uuid) -> Option<Session> {
        let client = self.redis.as_ref()?;
        let key = Self::redis_key(id);
        let result: Result<Option<String>, redis::RedisError> = async {
            let mut conn = client.get_multiplexed_async_connection().await?;
            conn.get(&key).await
        }
        .await;
        match result {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(session) => Some(session),
                Err(e) => {
                    tracing::warn!(error = %e, session_id = %id, "session cache decode failed");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, session_id = %id, "session cache read failed, degrading to miss");
                None
            }
        }
    }

    /// Write a new session to both tiers.
    pub async fn create(&self, session: Session) {
        self.redis_write_through(&session).await;
        self.local.insert(session.id, session);
    }

    /// Consult the local map first, then the cross-instance cache;
    /// rehydrate the local map on a cache hit.
    pub async fn get(&self, id: Uuid) -> Option<Session> {
        if let Some(entry) = self.local.get(&id) {
            return Some(entry.clone());
        }
        let cached = self.redis_read(id).await?;
        self.local.insert(id, cached.clone());
        Some(cached)
    }

    /// Persist a mutated session back to both tiers.
    pub async fn save(&self, session: Session) {
        self.redis_write_through(&session).await;
        self.local.insert(session.id, session);
    }

    /// Remove a session from both tiers.
    pub async fn delete(&self, id: Uuid) {
        self.local.remove(&id);
        if let Some(client) = &self.redis {
            let key = Self::redis_key(id);
            let result: Result<(), redis::RedisError> = async {
                let mut conn = client.get_multiplexed_async_connection().await?;
                conn.del(&key).await
            }
            .await;
            if let Err(e) = result {
                tracing::warn!(error = %e, session_id = %id, "session cache delete failed");
            }
        }
    }

    /// Whether the cross-instance cache tier is reachable, for `GET /ready`.
    /// A store with no configured redis is always ready -- it runs
    /// local-only by design.
    pub async fn ping(&self) -> bool {
        let Some(client) = &self.redis else { return true };
        let result: Result<(), redis::RedisError> = async {
            let mut conn = client.get_multiplexed_async_connection().await?;
            redis::cmd("PING").query_async(&mut conn).await
        }
        .await;
        result.is_ok()
    }

    pub fn len(&self) -> usize {
        self.local.len()
    }

    pub fn is_empty(&self) -> bool {
        self.local.is_empty()
    }

    /// Schedule removal of `id` after `delay` unless cancelled first via
    /// [`SessionStore::cancel_grace_deletion`].
    pub fn schedule_grace_deletion(self: &Arc<Self>, id: Uuid, delay: Duration) {
        let notify = Arc::new(Notify::new());
        self.grace_cancellations.insert(id, notify.clone());

        let store = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    store.delete(id).await;
                    store.grace_cancellations.remove(&id);
                }
                _ = notify.notified() => {
                    tracing::debug!(session_id = %id, "grace deletion cancelled");
                }
            }
        });
    }

    /// Cancel a pending grace deletion for `id`, if one is scheduled.
    pub fn cancel_grace_deletion(&self, id: Uuid) {
        if let Some((_, notify)) = self.grace_cancellations.remove(&id) {
            notify.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_get_round_trips_locally_without_redis() {
        let store = SessionStore::new(None, 3600).unwrap();
        let session = Session::new("en-US", 10);
        let id = session.id;
        store.create(session).await;
        let fetched = store.get(id).await.unwrap();
        assert_eq!(fetched.id, id);
        assert_eq!(fetched.language, "en-US");
    }

    #[tokio::test]
    async fn get_on_unknown_id_returns_none() {
        let store = SessionStore::new(None, 3600).unwrap();
        assert!(store.get(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn delete_removes_from_local_map() {
        let store = SessionStore::new(None, 3600).unwrap();
        let session = Session::new("en-US", 10);
        let id = session.id;
        store.create(session).await;
        store.delete(id).await;
        assert!(store.get(id).await.is_none());
    }

    #[tokio::test]
    async fn session_ids_are_unique_across_many_creations() {
        let store = SessionStore::new(None, 3600).unwrap();
        let mut ids = std::collections::HashSet::new();
        for _ in 0..100 {
            let session = Session::new("en-US", 10);
            ids.insert(session.id);
            store.create(session).await;
        }
        assert_eq!(ids.len(), 100);
        assert_eq!(store.len(), 100);
    }

    #[tokio::test]
    async fn grace_deletion_removes_after_delay() {
        let store = SessionStore::new(None, 3600).unwrap();
        let session = Session::new("en-US", 10);
        let id = session.id;
        store.create(session).await;

        store.schedule_grace_deletion(id, Duration::from_millis(20));
        assert!(store.get(id).await.is_some());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(store.get(id).await.is_none());
    }

    #[tokio::test]
    async fn accessing_during_grace_period_cancels_removal() {
        let store = SessionStore::new(None, 3600).unwrap();
        let session = Session::new("en-US", 10);
        let id = session.id;
        store.create(session).await;

        store.schedule_grace_deletion(id, Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(10)).await;
        store.cancel_grace_deletion(id);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(store.get(id).await.is_some());
    }
}
