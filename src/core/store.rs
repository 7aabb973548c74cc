/// Session store: in-process map of per-session state with sliding expiry.
///
/// The map lock is held only long enough to find a session's slot; every
/// read or mutation of one session then runs under that session's own
/// mutex, so requests for one session are serialized while different
/// sessions never contend.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::core::variant;
use crate::schema::session::{SessionId, SessionProfile, SessionState};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no session tracked for id '{0}'")]
    InvalidSession(SessionId),
}

#[derive(Debug)]
struct Slot {
    state: SessionState,
    last_active: DateTime<Utc>,
}

type SharedSlot = Arc<Mutex<Slot>>;

fn lock(slot: &SharedSlot) -> MutexGuard<'_, Slot> {
    // Mutations commit in a single call after validation, so a panic
    // elsewhere cannot leave a half-applied transition behind.
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

fn idle_longer_than(last_active: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> bool {
    let idle = now
        .signed_duration_since(last_active)
        .to_std()
        .unwrap_or_default();
    idle > ttl
}

#[derive(Debug)]
pub struct SessionStore {
    sessions: RwLock<FxHashMap<SessionId, SharedSlot>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(FxHashMap::default()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    /// Start a fresh session at `start` with a newly drawn profile,
    /// replacing any existing state under `id`.
    pub fn create(&self, id: SessionId, start: &str, now: DateTime<Utc>) -> SessionState {
        let profile = variant::draw_profile(&mut rand::thread_rng());
        self.create_with_profile(id, start, profile, now)
    }

    /// As `create`, with a caller-chosen profile.
    pub fn create_with_profile(
        &self,
        id: SessionId,
        start: &str,
        profile: SessionProfile,
        now: DateTime<Utc>,
    ) -> SessionState {
        let state = SessionState::new(id.clone(), start, profile, now);
        let slot = Arc::new(Mutex::new(Slot {
            state: state.clone(),
            last_active: now,
        }));
        let replaced = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), slot)
            .is_some();
        info!(session = %id, replaced, "Created session");
        state
    }

    fn slot(&self, id: &SessionId) -> Option<SharedSlot> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    // Lookup and insert happen under one write lock, so two first contacts
    // with the same id end up sharing a single slot.
    fn slot_or_insert(&self, id: &SessionId, start: &str, now: DateTime<Utc>) -> SharedSlot {
        if let Some(slot) = self.slot(id) {
            return slot;
        }
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(sessions.entry(id.clone()).or_insert_with(|| {
            info!(session = %id, "Created session");
            let profile = variant::draw_profile(&mut rand::thread_rng());
            Arc::new(Mutex::new(Slot {
                state: SessionState::new(id.clone(), start, profile, now),
                last_active: now,
            }))
        }))
    }

    /// Run `f` against the session's state, creating the session at
    /// `start` if `id` is unknown or expired. Never replaces a live session.
    pub fn get_or_create<R>(
        &self,
        id: &SessionId,
        start: &str,
        now: DateTime<Utc>,
        f: impl FnOnce(&mut SessionState) -> R,
    ) -> R {
        loop {
            let slot = self.slot_or_insert(id, start, now);
            let mut guard = lock(&slot);

            if idle_longer_than(guard.last_active, now, self.ttl) {
                drop(guard);
                self.remove_slot(id, &slot);
                debug!(session = %id, "Session expired");
                continue;
            }

            guard.last_active = now;
            return f(&mut guard.state);
        }
    }

    /// Run `f` against the session's state while holding its lock.
    ///
    /// Concurrent calls for the same session queue behind each other.
    /// A session idle past the TTL is dropped and reported as invalid.
    pub fn with_session<R>(
        &self,
        id: &SessionId,
        now: DateTime<Utc>,
        f: impl FnOnce(&mut SessionState) -> R,
    ) -> Result<R, StoreError> {
        let slot = self
            .slot(id)
            .ok_or_else(|| StoreError::InvalidSession(id.clone()))?;
        let mut guard = lock(&slot);

        if idle_longer_than(guard.last_active, now, self.ttl) {
            drop(guard);
            self.remove_slot(id, &slot);
            debug!(session = %id, "Session expired");
            return Err(StoreError::InvalidSession(id.clone()));
        }

        guard.last_active = now;
        Ok(f(&mut guard.state))
    }

    /// A copy of the session's current state.
    pub fn snapshot(&self, id: &SessionId, now: DateTime<Utc>) -> Result<SessionState, StoreError> {
        self.with_session(id, now, |state| state.clone())
    }

    pub fn remove(&self, id: &SessionId) -> bool {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some()
    }

    // Only remove if the map still holds this exact slot; a reset may have
    // replaced it in the meantime.
    fn remove_slot(&self, id: &SessionId, slot: &SharedSlot) {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if sessions.get(id).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            sessions.remove(id);
        }
    }

    /// Drop every session idle longer than the TTL. Sessions with a request
    /// in flight are active by definition and are kept.
    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let before = sessions.len();
        sessions.retain(|_, slot| match slot.try_lock() {
            Ok(guard) => !idle_longer_than(guard.last_active, now, self.ttl),
            Err(std::sync::TryLockError::Poisoned(poisoned)) => {
                !idle_longer_than(poisoned.into_inner().last_active, now, self.ttl)
            }
            Err(std::sync::TryLockError::WouldBlock) => true,
        });
        let evicted = before - sessions.len();
        if evicted > 0 {
            info!(evicted, remaining = sessions.len(), "Evicted expired sessions");
        }
        evicted
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(86_400))
    }
}
