//! In-memory store for no-signup study sessions.
//!
//! Sessions live only as long as the process and their TTL allow. The
//! store is bounded: expired entries are pruned on every access and the
//! oldest session is evicted once capacity is reached. Creation is
//! throttled per client IP over a rolling 24 hour window; the allowance
//! is consumed when a request arrives, before any model call is made.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::AppError;

/// Body returned when an IP exhausts its free creations for the day.
pub const FREE_LIMIT_MESSAGE: &str =
    "Free limit reached: create an account to keep studying.";

const RATE_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone)]
pub struct EphemeralSession {
    pub id: Uuid,
    pub name: String,
    pub cards: serde_json::Value,
    pub transcript: String,
    pub created_at: DateTime<Utc>,
}

pub struct EphemeralStore {
    ttl: Duration,
    capacity: usize,
    daily_limit: u32,
    inner: Mutex<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    sessions: HashMap<Uuid, EphemeralSession>,
    creations: HashMap<IpAddr, Vec<DateTime<Utc>>>,
}

impl EphemeralStore {
    pub fn new(ttl: Duration, capacity: usize, daily_limit: u32) -> Self {
        Self {
            ttl,
            capacity,
            daily_limit,
            inner: Mutex::new(StoreInner::default()),
        }
    }

    /// Consumes one creation allowance for `ip`, rejecting once the
    /// rolling window is full. Called before the generation work starts,
    /// so a failed generation still counts against the caller.
    pub fn register_creation(&self, ip: IpAddr) -> Result<(), AppError> {
        self.register_creation_at(Utc::now(), ip)
    }

    fn register_creation_at(&self, now: DateTime<Utc>, ip: IpAddr) -> Result<(), AppError> {
        let mut inner = self.lock();
        Self::prune(&mut inner, now, self.ttl);
        let stamps = inner.creations.entry(ip).or_default();
        if stamps.len() as u32 >= self.daily_limit {
            return Err(AppError::rate_limited(FREE_LIMIT_MESSAGE));
        }
        stamps.push(now);
        Ok(())
    }

    pub fn insert(
        &self,
        name: String,
        cards: serde_json::Value,
        transcript: String,
    ) -> EphemeralSession {
        self.insert_at(Utc::now(), name, cards, transcript)
    }

    fn insert_at(
        &self,
        now: DateTime<Utc>,
        name: String,
        cards: serde_json::Value,
        transcript: String,
    ) -> EphemeralSession {
        let mut inner = self.lock();
        Self::prune(&mut inner, now, self.ttl);

        if inner.sessions.len() >= self.capacity {
            if let Some(oldest) = inner
                .sessions
                .values()
                .min_by_key(|session| session.created_at)
                .map(|session| session.id)
            {
                inner.sessions.remove(&oldest);
            }
        }

        let session = EphemeralSession {
            id: Uuid::new_v4(),
            name,
            cards,
            transcript,
            created_at: now,
        };
        inner.sessions.insert(session.id, session.clone());
        session
    }

    pub fn get(&self, id: Uuid) -> Option<EphemeralSession> {
        self.get_at(Utc::now(), id)
    }

    fn get_at(&self, now: DateTime<Utc>, id: Uuid) -> Option<EphemeralSession> {
        let mut inner = self.lock();
        Self::prune(&mut inner, now, self.ttl);
        inner.sessions.get(&id).cloned()
    }

    pub fn delete(&self, id: Uuid) -> bool {
        self.lock().sessions.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn prune(inner: &mut StoreInner, now: DateTime<Utc>, ttl: Duration) {
        inner
            .sessions
            .retain(|_, session| now - session.created_at < ttl);
        let window = Duration::hours(RATE_WINDOW_HOURS);
        inner.creations.retain(|_, stamps| {
            stamps.retain(|stamp| now - *stamp < window);
            !stamps.is_empty()
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use serde_json::json;

    fn store() -> EphemeralStore {
        EphemeralStore::new(Duration::hours(24), 1000, 2)
    }

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([127, 0, 0, last])
    }

    fn cards() -> serde_json::Value {
        json!([{"question": "q", "answer": "a"}])
    }

    #[test]
    fn insert_get_delete_lifecycle() {
        let store = store();
        let id = store.insert("Biology".into(), cards(), "mitochondria".into()).id;
        let session = store.get(id).unwrap();
        assert_eq!(session.name, "Biology");
        assert_eq!(session.transcript, "mitochondria");
        assert!(store.delete(id));
        assert!(store.get(id).is_none());
        assert!(!store.delete(id));
    }

    #[test]
    fn third_creation_from_same_ip_is_rejected() {
        let store = store();
        store.register_creation(ip(1)).unwrap();
        store.register_creation(ip(1)).unwrap();
        let err = store.register_creation(ip(1)).unwrap_err();
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.message(), FREE_LIMIT_MESSAGE);
    }

    #[test]
    fn limit_is_tracked_per_ip() {
        let store = store();
        store.register_creation(ip(1)).unwrap();
        store.register_creation(ip(1)).unwrap();
        assert!(store.register_creation(ip(2)).is_ok());
    }

    #[test]
    fn window_slides_instead_of_resetting() {
        let store = store();
        let start = Utc::now();
        store.register_creation_at(start, ip(1)).unwrap();
        store
            .register_creation_at(start + Duration::hours(12), ip(1))
            .unwrap();
        // 25h after the first stamp only the second one still counts.
        let later = start + Duration::hours(25);
        assert!(store.register_creation_at(later, ip(1)).is_ok());
        assert!(store.register_creation_at(later, ip(1)).is_err());
    }

    #[test]
    fn sessions_expire_after_ttl() {
        let store = EphemeralStore::new(Duration::hours(1), 1000, 10);
        let start = Utc::now();
        let id = store.insert_at(start, "a".into(), cards(), "t".into()).id;
        assert!(store.get_at(start + Duration::minutes(59), id).is_some());
        assert!(store.get_at(start + Duration::minutes(61), id).is_none());
    }

    #[test]
    fn capacity_evicts_the_oldest_session() {
        let store = EphemeralStore::new(Duration::hours(24), 2, 10);
        let start = Utc::now();
        let first = store.insert_at(start, "a".into(), cards(), "t".into()).id;
        let second = store
            .insert_at(start + Duration::seconds(1), "b".into(), cards(), "t".into())
            .id;
        let third = store
            .insert_at(start + Duration::seconds(2), "c".into(), cards(), "t".into())
            .id;
        assert!(store.get_at(start + Duration::seconds(3), first).is_none());
        assert!(store.get_at(start + Duration::seconds(3), second).is_some());
        assert!(store.get_at(start + Duration::seconds(3), third).is_some());
    }
}
