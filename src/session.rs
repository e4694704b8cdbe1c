// Copyright 2026 The Toolmux Project
// SPDX-License-Identifier: Apache-2.0

// Session state management
//
// A session groups a conversation's tool activity: an append-only message
// history, a tool allow-list and free-form metadata. Sessions are shared as
// `Arc<Session>`; all mutable state sits behind one mutex per session so a
// reader never sees a half-applied update.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct SessionInner {
    last_active: DateTime<Utc>,
    allowed_tools: HashSet<String>,
    metadata: serde_json::Map<String, serde_json::Value>,
    messages: Vec<serde_json::Value>,
}

/// A single conversation's state.
#[derive(Debug)]
pub struct Session {
    id: String,
    user_id: Option<String>,
    created_at: DateTime<Utc>,
    inner: Mutex<SessionInner>,
}

/// Serializable view of a session, without the message bodies.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub allowed_tools: Vec<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub messages_count: usize,
}

impl Session {
    /// Create a session. Without an id one is generated as `session-<uuid hex>`.
    pub fn new(id: Option<String>, user_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.unwrap_or_else(generate_session_id),
            user_id,
            created_at: now,
            inner: Mutex::new(SessionInner {
                last_active: now,
                allowed_tools: HashSet::new(),
                metadata: serde_json::Map::new(),
                messages: Vec::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        self.state().last_active
    }

    /// Refresh the last-active timestamp.
    pub fn touch(&self) {
        self.state().last_active = Utc::now();
    }

    // -- tool permissions --------------------------------------------------

    /// An empty allow-list permits every tool.
    pub fn is_tool_allowed(&self, tool: &str) -> bool {
        let state = self.state();
        state.allowed_tools.is_empty() || state.allowed_tools.contains(tool)
    }

    pub fn allow_tool(&self, tool: impl Into<String>) {
        self.state().allowed_tools.insert(tool.into());
    }

    pub fn allow_tools<I, S>(&self, tools: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.state();
        state.allowed_tools.extend(tools.into_iter().map(Into::into));
    }

    /// Remove a tool from the allow-list. Removing the last entry leaves the
    /// list empty, which permits every tool again.
    pub fn disallow_tool(&self, tool: &str) {
        self.state().allowed_tools.remove(tool);
    }

    pub fn reset_tool_permissions(&self) {
        self.state().allowed_tools.clear();
    }

    /// Allow-list entries in sorted order.
    pub fn allowed_tools(&self) -> Vec<String> {
        let mut tools: Vec<String> = self.state().allowed_tools.iter().cloned().collect();
        tools.sort();
        tools
    }

    // -- history -----------------------------------------------------------

    pub fn add_message(&self, message: serde_json::Value) {
        let mut state = self.state();
        state.messages.push(message);
        state.last_active = Utc::now();
    }

    pub fn messages(&self) -> Vec<serde_json::Value> {
        self.state().messages.clone()
    }

    pub fn message_count(&self) -> usize {
        self.state().messages.len()
    }

    pub fn clear_messages(&self) {
        let mut state = self.state();
        state.messages.clear();
        state.last_active = Utc::now();
    }

    // -- metadata ----------------------------------------------------------

    pub fn set_metadata(&self, key: impl Into<String>, value: serde_json::Value) {
        self.state().metadata.insert(key.into(), value);
    }

    pub fn metadata(&self, key: &str) -> Option<serde_json::Value> {
        self.state().metadata.get(key).cloned()
    }

    pub fn summary(&self) -> SessionSummary {
        let state = self.state();
        let mut allowed_tools: Vec<String> = state.allowed_tools.iter().cloned().collect();
        allowed_tools.sort();
        SessionSummary {
            session_id: self.id.clone(),
            user_id: self.user_id.clone(),
            created_at: self.created_at,
            last_active: state.last_active,
            allowed_tools,
            metadata: state.metadata.clone(),
            messages_count: state.messages.len(),
        }
    }

    fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.state().last_active)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    #[cfg(test)]
    fn backdate(&self, by: chrono::Duration) {
        self.state().last_active = Utc::now() - by;
    }
}

fn generate_session_id() -> String {
    format!("session-{}", uuid::Uuid::new_v4().simple())
}

// ---------------------------------------------------------------------------
// SessionStore
// ---------------------------------------------------------------------------

/// Snapshot returned by `SessionStore::stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub total_sessions: usize,
    pub session_ttl_secs: u64,
}

/// In-memory session store backed by `DashMap`.
///
/// Reads never check the TTL; expired sessions disappear only when
/// `sweep_expired` runs.
pub struct SessionStore {
    sessions: DashMap<String, Arc<Session>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    /// Create and register a session with a generated id.
    pub fn create_session(&self, user_id: Option<String>) -> Arc<Session> {
        let session = Arc::new(Session::new(None, user_id));
        self.sessions
            .insert(session.id().to_string(), Arc::clone(&session));
        tracing::debug!(session_id = %session.id(), "session created");
        session
    }

    /// Look up a session, refreshing its last-active time.
    pub fn get_session(&self, id: &str) -> Option<Arc<Session>> {
        let session = self.sessions.get(id).map(|entry| Arc::clone(entry.value()))?;
        session.touch();
        Some(session)
    }

    /// Return the session for `id`, creating it if unknown. Without an id a
    /// fresh session is created. Concurrent callers with the same unknown id
    /// all receive the same session.
    pub fn get_or_create(&self, id: Option<&str>, user_id: Option<String>) -> Arc<Session> {
        let Some(id) = id.filter(|id| !id.is_empty()) else {
            return self.create_session(user_id);
        };

        let entry = self.sessions.entry(id.to_string()).or_insert_with(|| {
            tracing::debug!(session_id = %id, "session created");
            Arc::new(Session::new(Some(id.to_string()), user_id))
        });
        let session = Arc::clone(entry.value());
        drop(entry);
        session.touch();
        session
    }

    pub fn delete_session(&self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }

    /// Remove sessions idle for longer than the TTL. Returns how many were
    /// removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| session.idle_for(now) <= self.ttl);
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            tracing::info!(removed, remaining = self.sessions.len(), "expired sessions swept");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            total_sessions: self.sessions.len(),
            session_ttl_secs: self.ttl.as_secs(),
        }
    }
}
