//! Per-session conversational context.
//!
//! Each session keeps a rolling window of the last few answer digests. The
//! store is a trait so the pipeline never depends on where sessions live;
//! `InMemorySessionStore` is the process-local implementation.
//!
//! Requests for one session are expected to arrive one at a time. The store
//! makes each individual read/write atomic but does not order concurrent
//! turns of the same session.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Digests kept per session.
pub const CONTEXT_WINDOW: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        SessionId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        SessionId(value)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        SessionId(value.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bounded, oldest-first sequence of context digests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextWindow {
    entries: VecDeque<String>,
}

impl ContextWindow {
    pub fn push(&mut self, summary: String) {
        self.entries.push_back(summary);
        while self.entries.len() > CONTEXT_WINDOW {
            self.entries.pop_front();
        }
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

pub trait SessionStore: Send + Sync {
    /// Current window, oldest first. Unknown sessions have an empty window.
    fn context(&self, id: &SessionId) -> Vec<String>;

    /// Append a digest, creating the session on first use.
    fn push_context(&self, id: &SessionId, summary: String);

    fn clear(&self, id: &SessionId);
}

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<SessionId, ContextWindow>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SessionId, ContextWindow>> {
        // a poisoned map still holds complete windows
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SessionStore for InMemorySessionStore {
    fn context(&self, id: &SessionId) -> Vec<String> {
        self.lock().get(id).map(ContextWindow::entries).unwrap_or_default()
    }

    fn push_context(&self, id: &SessionId, summary: String) {
        self.lock().entry(id.clone()).or_default().push(summary);
    }

    fn clear(&self, id: &SessionId) {
        if let Some(window) = self.lock().get_mut(id) {
            window.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_keeps_most_recent_four_in_order() {
        let mut w = ContextWindow::default();
        for i in 1..=7 {
            w.push(format!("turn {i}"));
        }
        assert_eq!(w.len(), CONTEXT_WINDOW);
        assert_eq!(w.entries(), vec!["turn 4", "turn 5", "turn 6", "turn 7"]);
    }

    #[test]
    fn store_isolates_sessions() {
        let store = InMemorySessionStore::new();
        let a = SessionId::from("a");
        let b = SessionId::from("b");

        store.push_context(&a, "alpha".into());
        store.push_context(&b, "beta".into());

        assert_eq!(store.context(&a), vec!["alpha"]);
        assert_eq!(store.context(&b), vec!["beta"]);
        assert_eq!(store.session_count(), 2);
    }

    #[test]
    fn clear_empties_window_but_keeps_session() {
        let store = InMemorySessionStore::new();
        let id = SessionId::new();
        store.push_context(&id, "x".into());
        store.clear(&id);
        assert!(store.context(&id).is_empty());
        assert_eq!(store.session_count(), 1);

        // clearing an unknown session is a no-op
        store.clear(&SessionId::from("missing"));
        assert_eq!(store.session_count(), 1);
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }
}
