//! Per-user session state and the in-memory session store.
//!
//! A [`Session`] is plain data owned by the store; the flow receives a copy,
//! returns the next version, and the router writes it back. Sessions expire
//! wholesale after an inactivity timeout: either lazily on the next event or
//! through the periodic sweep.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use partsbot_core::types::{CatalogItem, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ChatError;
use crate::flow::state::FlowState;
use crate::nlu::MotorPosition;
use crate::payload::{ResultRef, TaggedValue};

// =============================================================================
// Session data
// =============================================================================

/// Values collected while narrowing a query.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slots {
    pub size_width: Option<u16>,
    pub size_aspect: Option<u16>,
    pub ring_size: Option<u16>,
    /// Canonical `width/aspect-ring`.
    pub full_size: Option<String>,
    pub motor_type: Option<String>,
    pub motor_position: Option<MotorPosition>,
    pub brand_filter: Option<String>,
    pub color_query: Option<String>,
}

impl Slots {
    pub fn is_empty(&self) -> bool {
        *self == Slots::default()
    }
}

/// Position within the cached result set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: usize,
    pub page_size: usize,
    pub total_items: usize,
    pub cached_result_set_id: Option<Uuid>,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 10,
            total_items: 0,
            cached_result_set_id: None,
        }
    }
}

/// The last query's results, kept so page and detail buttons resolve
/// without another catalog round trip.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CachedResults {
    pub id: Uuid,
    pub query: TaggedValue,
    pub brand: Option<String>,
    pub items: Vec<CatalogItem>,
}

impl CachedResults {
    /// The reference results buttons carry back.
    pub fn reference(&self) -> ResultRef {
        ResultRef {
            id: self.id,
            query: self.query.clone(),
            brand: self.brand.clone(),
        }
    }

    /// Position and item for a catalog id.
    pub fn find(&self, item_id: &str) -> Option<(usize, &CatalogItem)> {
        self.items.iter().enumerate().find(|(_, item)| item.id == item_id)
    }
}

/// Conversation state for one user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: UserId,
    pub state: FlowState,
    pub slots: Slots,
    /// Items the customer ordered, in order. Only checkout clears it.
    pub selection: Vec<CatalogItem>,
    pub pagination: Pagination,
    pub results: Option<CachedResults>,
    pub last_activity: Timestamp,
}

impl Session {
    pub fn new(user_id: UserId, now: Timestamp) -> Self {
        Self {
            user_id,
            state: FlowState::Idle,
            slots: Slots::default(),
            selection: Vec::new(),
            pagination: Pagination::default(),
            results: None,
            last_activity: now,
        }
    }

    /// Whether the session has been idle longer than `timeout_secs`.
    pub fn is_expired(&self, now: Timestamp, timeout_secs: i64) -> bool {
        self.last_activity.seconds_until(now) > timeout_secs
    }

    /// Verify that the populated slots fit the current state.
    pub fn check_invariants(&self) -> Result<(), ChatError> {
        let s = &self.slots;
        let fail = |msg: &str| -> Result<(), ChatError> {
            Err(ChatError::SessionCorruption(format!(
                "{} in state {}",
                msg, self.state
            )))
        };
        match self.state {
            FlowState::Idle if !s.is_empty() => fail("slots populated"),
            FlowState::AwaitingRing if s.size_width.is_none() || s.size_aspect.is_none() => {
                fail("width/aspect missing")
            }
            FlowState::AwaitingMotorPosition if s.motor_type.is_none() => {
                fail("motor type missing")
            }
            FlowState::ShowingMotorRecommendations
                if s.motor_type.is_none() || s.motor_position.is_none() =>
            {
                fail("motor type or position missing")
            }
            FlowState::ConfirmingInferredSize if s.full_size.is_none() => {
                fail("inferred size missing")
            }
            FlowState::AwaitingBrandFilteredSize if s.brand_filter.is_none() => {
                fail("brand filter missing")
            }
            FlowState::ShowingResults => match &self.results {
                Some(r) if Some(r.id) == self.pagination.cached_result_set_id => Ok(()),
                _ => fail("result set missing"),
            },
            _ => Ok(()),
        }
    }
}

// =============================================================================
// SessionStore
// =============================================================================

/// Thread-safe store of sessions keyed by user.
///
/// Besides the session map it keeps one async gate per user so that a
/// user's events are handled one at a time while other users proceed
/// concurrently.
pub struct SessionStore {
    sessions: Mutex<HashMap<UserId, Session>>,
    gates: Mutex<HashMap<UserId, Arc<tokio::sync::Mutex<()>>>>,
    timeout_secs: i64,
}

impl SessionStore {
    pub fn new(timeout_minutes: u32) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
            timeout_secs: i64::from(timeout_minutes) * 60,
        }
    }

    fn poisoned(what: &str) -> ChatError {
        ChatError::Storage(format!("{what} lock poisoned"))
    }

    /// Wait for exclusive access to one user's session.
    ///
    /// Hold the returned guard for the whole get/step/put cycle.
    pub async fn lock_user(&self, user: &UserId) -> Result<OwnedMutexGuard<()>, ChatError> {
        let gate = {
            let mut gates = self.gates.lock().map_err(|_| Self::poisoned("gate"))?;
            gates
                .entry(user.clone())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        Ok(gate.lock_owned().await)
    }

    pub fn get(&self, user: &UserId) -> Result<Option<Session>, ChatError> {
        let sessions = self.sessions.lock().map_err(|_| Self::poisoned("session"))?;
        Ok(sessions.get(user).cloned())
    }

    /// Current session for `user`, or a fresh `Idle` one.
    ///
    /// An expired session is evicted first, so the caller never sees state
    /// older than the timeout.
    pub fn get_or_create(&self, user: &UserId, now: Timestamp) -> Result<Session, ChatError> {
        let mut sessions = self.sessions.lock().map_err(|_| Self::poisoned("session"))?;
        if let Some(existing) = sessions.get(user) {
            if !existing.is_expired(now, self.timeout_secs) {
                return Ok(existing.clone());
            }
            sessions.remove(user);
            info!(user_id = %user, "Expired session evicted on access");
        }
        let session = Session::new(user.clone(), now);
        sessions.insert(user.clone(), session.clone());
        debug!(user_id = %user, "Session created");
        Ok(session)
    }

    pub fn put(&self, session: Session) -> Result<(), ChatError> {
        let mut sessions = self.sessions.lock().map_err(|_| Self::poisoned("session"))?;
        sessions.insert(session.user_id.clone(), session);
        Ok(())
    }

    /// Remove a session entirely. Returns whether one existed.
    pub fn evict(&self, user: &UserId) -> Result<bool, ChatError> {
        let mut sessions = self.sessions.lock().map_err(|_| Self::poisoned("session"))?;
        let existed = sessions.remove(user).is_some();
        if existed {
            info!(user_id = %user, "Session evicted");
        }
        Ok(existed)
    }

    /// Delete every session idle longer than the timeout. Returns the count.
    pub fn sweep(&self, now: Timestamp) -> Result<usize, ChatError> {
        let removed = {
            let mut sessions = self.sessions.lock().map_err(|_| Self::poisoned("session"))?;
            let before = sessions.len();
            sessions.retain(|_, s| !s.is_expired(now, self.timeout_secs));
            before - sessions.len()
        };

        // Drop gates nobody holds for users without a session
        let sessions = self.sessions.lock().map_err(|_| Self::poisoned("session"))?;
        let mut gates = self.gates.lock().map_err(|_| Self::poisoned("gate"))?;
        gates.retain(|user, gate| sessions.contains_key(user) || Arc::strong_count(gate) > 1);

        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run [`SessionStore::sweep`] every `interval` until the task is aborted.
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match self.sweep(Timestamp::now()) {
                    Ok(0) => {}
                    Ok(n) => info!(evicted = n, "Session sweep complete"),
                    Err(e) => warn!(error = %e, "Session sweep failed"),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> UserId {
        UserId::new(id)
    }

    fn results(id: Uuid) -> CachedResults {
        CachedResults {
            id,
            query: TaggedValue::size("80/90-14"),
            brand: None,
            items: Vec::new(),
        }
    }

    #[test]
    fn test_new_session_is_idle_and_consistent() {
        let s = Session::new(user("u1"), Timestamp(1000));
        assert_eq!(s.state, FlowState::Idle);
        assert!(s.slots.is_empty());
        assert!(s.check_invariants().is_ok());
    }

    #[test]
    fn test_session_expiry_boundary() {
        let s = Session::new(user("u1"), Timestamp(1000));
        assert!(!s.is_expired(Timestamp(1060), 60));
        assert!(s.is_expired(Timestamp(1061), 60));
    }

    #[test]
    fn test_invariant_idle_with_slots() {
        let mut s = Session::new(user("u1"), Timestamp(0));
        s.slots.size_width = Some(80);
        assert!(matches!(
            s.check_invariants(),
            Err(ChatError::SessionCorruption(_))
        ));
    }

    #[test]
    fn test_invariant_awaiting_ring() {
        let mut s = Session::new(user("u1"), Timestamp(0));
        s.state = FlowState::AwaitingRing;
        s.slots.size_width = Some(80);
        assert!(s.check_invariants().is_err());
        s.slots.size_aspect = Some(90);
        assert!(s.check_invariants().is_ok());
    }

    #[test]
    fn test_invariant_motor_states() {
        let mut s = Session::new(user("u1"), Timestamp(0));
        s.state = FlowState::AwaitingMotorPosition;
        assert!(s.check_invariants().is_err());
        s.slots.motor_type = Some("Honda Beat".to_string());
        assert!(s.check_invariants().is_ok());

        s.state = FlowState::ShowingMotorRecommendations;
        assert!(s.check_invariants().is_err());
        s.slots.motor_position = Some(MotorPosition::Front);
        assert!(s.check_invariants().is_ok());
    }

    #[test]
    fn test_invariant_showing_results_needs_matching_cache() {
        let mut s = Session::new(user("u1"), Timestamp(0));
        s.state = FlowState::ShowingResults;
        assert!(s.check_invariants().is_err());

        let id = Uuid::new_v4();
        s.results = Some(results(id));
        s.pagination.cached_result_set_id = Some(Uuid::new_v4());
        assert!(s.check_invariants().is_err());

        s.pagination.cached_result_set_id = Some(id);
        assert!(s.check_invariants().is_ok());
    }

    #[test]
    fn test_store_get_or_create_and_put() {
        let store = SessionStore::new(30);
        let u = user("u1");
        assert!(store.get(&u).unwrap().is_none());

        let mut s = store.get_or_create(&u, Timestamp(0)).unwrap();
        assert_eq!(store.len(), 1);
        s.state = FlowState::AwaitingMotorType;
        store.put(s).unwrap();

        let again = store.get_or_create(&u, Timestamp(10)).unwrap();
        assert_eq!(again.state, FlowState::AwaitingMotorType);
    }

    #[test]
    fn test_store_expired_session_replaced() {
        let store = SessionStore::new(1);
        let u = user("u1");
        let mut s = store.get_or_create(&u, Timestamp(0)).unwrap();
        s.state = FlowState::AwaitingMotorType;
        store.put(s).unwrap();

        let fresh = store.get_or_create(&u, Timestamp(61)).unwrap();
        assert_eq!(fresh.state, FlowState::Idle);
        assert_eq!(fresh.last_activity, Timestamp(61));
    }

    #[test]
    fn test_store_evict() {
        let store = SessionStore::new(30);
        let u = user("u1");
        store.get_or_create(&u, Timestamp(0)).unwrap();
        assert!(store.evict(&u).unwrap());
        assert!(!store.evict(&u).unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_sweep_removes_only_expired() {
        let store = SessionStore::new(1);
        store.get_or_create(&user("old"), Timestamp(0)).unwrap();
        store.get_or_create(&user("new"), Timestamp(100)).unwrap();

        let removed = store.sweep(Timestamp(120)).unwrap();
        assert_eq!(removed, 1);
        assert!(store.get(&user("old")).unwrap().is_none());
        assert!(store.get(&user("new")).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_user_gate_serializes_same_user() {
        let store = Arc::new(SessionStore::new(30));
        let u = user("u1");
        let guard = store.lock_user(&u).await.unwrap();

        let store2 = store.clone();
        let u2 = u.clone();
        let waiter = tokio::spawn(async move {
            let _g = store2.lock_user(&u2).await.unwrap();
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_user_gate_independent_users() {
        let store = SessionStore::new(30);
        let _a = store.lock_user(&user("a")).await.unwrap();
        // Would deadlock if gates were shared across users
        let _b = store.lock_user(&user("b")).await.unwrap();
    }

    #[tokio::test]
    async fn test_sweeper_task_runs() {
        let store = Arc::new(SessionStore::new(0));
        store
            .get_or_create(&user("u1"), Timestamp(Timestamp::now().0 - 10))
            .unwrap();
        let handle = store.clone().spawn_sweeper(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();
        assert!(store.is_empty());
    }
}
