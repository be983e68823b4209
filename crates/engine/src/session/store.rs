//! Session store (§5 `StateManager`): one mutex per session serializes
//! state mutation; readers may snapshot without blocking a writer for long.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use runtime_domain::SessionId;
use serde_json::Value;
use tokio::sync::Mutex;

use super::state::{GameState, StateDelta};

struct SessionRecord {
    state: GameState,
    deltas: Vec<StateDelta>,
}

#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<SessionId, Arc<Mutex<SessionRecord>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_session(&self, state: GameState) {
        let session_id = state.session_id;
        self.sessions.insert(
            session_id,
            Arc::new(Mutex::new(SessionRecord {
                state,
                deltas: Vec::new(),
            })),
        );
    }

    pub fn has_session(&self, session_id: SessionId) -> bool {
        self.sessions.contains_key(&session_id)
    }

    /// Snapshot the current state without holding a mutation-shaped lock
    /// any longer than the clone itself.
    pub async fn snapshot(&self, session_id: SessionId) -> Option<GameState> {
        let record = self.sessions.get(&session_id)?.clone();
        let guard = record.lock().await;
        Some(guard.state.clone())
    }

    pub async fn deltas(&self, session_id: SessionId) -> Option<Vec<StateDelta>> {
        let record = self.sessions.get(&session_id)?.clone();
        let guard = record.lock().await;
        Some(guard.deltas.clone())
    }

    /// Apply one state delta under the session's lock (§5): `mutate` sees
    /// the current `GameState` and the delta's `changes` payload, and is
    /// expected to update the fields the delta's `operation` names. The
    /// delta itself is always appended to the log, even if `mutate` is a
    /// no-op, preserving the append-only invariant (§8: `apply_delta` is
    /// deliberately not idempotent).
    pub async fn apply_delta<F>(
        &self,
        session_id: SessionId,
        operation: impl Into<String>,
        changes: Value,
        now: DateTime<Utc>,
        mutate: F,
    ) -> Option<StateDelta>
    where
        F: FnOnce(&mut GameState, &Value),
    {
        let record = self.sessions.get(&session_id)?.clone();
        let mut guard = record.lock().await;
        let delta = StateDelta::new(operation, changes, now);
        mutate(&mut guard.state, &delta.changes);
        guard.deltas.push(delta.clone());
        Some(delta)
    }

    /// Run an arbitrary read/write closure against the live state under the
    /// session's lock, without recording a delta (used for engine-internal
    /// bookkeeping like combat start/end that has its own log).
    pub async fn with_state<F, R>(&self, session_id: SessionId, f: F) -> Option<R>
    where
        F: FnOnce(&mut GameState) -> R,
    {
        let record = self.sessions.get(&session_id)?.clone();
        let mut guard = record.lock().await;
        Some(f(&mut guard.state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runtime_domain::{AreaId, ChapterId, WorldId};
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc)
    }

    fn fresh_state() -> GameState {
        GameState::start(
            WorldId::new(),
            SessionId::new(),
            ChapterId::new(),
            AreaId::new(),
            "Town Square",
            None,
        )
    }

    #[tokio::test]
    async fn apply_delta_mutates_state_and_appends_log() {
        let store = SessionStore::new();
        let state = fresh_state();
        let session_id = state.session_id;
        store.start_session(state);

        let new_area = AreaId::new();
        store
            .apply_delta(
                session_id,
                "navigate",
                json!({ "area_id": new_area.to_string() }),
                now(),
                |state, _changes| {
                    state.area_id = new_area;
                    state.sub_location = None;
                },
            )
            .await
            .unwrap();

        let snapshot = store.snapshot(session_id).await.unwrap();
        assert_eq!(snapshot.area_id, new_area);
        assert_eq!(store.deltas(session_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn repeated_delta_application_is_not_idempotent() {
        let store = SessionStore::new();
        let state = fresh_state();
        let session_id = state.session_id;
        store.start_session(state);

        for _ in 0..3 {
            store
                .apply_delta(session_id, "wait", json!({}), now(), |_state, _| {})
                .await
                .unwrap();
        }

        assert_eq!(store.deltas(session_id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn unknown_session_returns_none() {
        let store = SessionStore::new();
        assert!(store.snapshot(SessionId::new()).await.is_none());
    }
}
