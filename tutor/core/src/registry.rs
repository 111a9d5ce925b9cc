//! Session Registry - Active Stream Bookkeeping
//!
//! This module tracks every stream session that is currently open so that
//! operators can inspect them and the server can cancel them all on
//! shutdown.
//!
//! # Architecture
//!
//! ```text
//!                      SessionRegistry
//!                     ┌───────────────────────────────────────┐
//!                     │ HashMap<SessionId, SessionEntry>      │
//!                     │   - wrapped in Arc<RwLock<>>          │
//!                     └───────────────┬───────────────────────┘
//!                                     │
//!              ┌──────────────────────┼──────────────────────┐
//!              │                      │                      │
//!       ┌──────▼──────┐       ┌───────▼──────┐       ┌───────▼──────┐
//!       │  session A  │       │  session B   │       │  session C   │
//!       │  Streaming  │       │  Created     │       │  Streaming   │
//!       └─────────────┘       └──────────────┘       └──────────────┘
//! ```
//!
//! # Thread Safety
//!
//! The map is only ever touched by single-key inserts (when a session is
//! created) and removes (when it reaches a terminal state). Live state and
//! fragment counts are shared atomics owned jointly by the entry and its
//! session, so progress never takes the write lock.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::request::StreamContext;
use crate::session::{SessionId, SessionState};

/// Live status shared between a session and its registry entry
#[derive(Debug)]
pub struct SessionStatus {
    state: AtomicU8,
    fragments: AtomicU64,
}

impl SessionStatus {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(SessionState::Created.as_u8()),
            fragments: AtomicU64::new(0),
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Fragments written so far
    #[must_use]
    pub fn fragments(&self) -> u64 {
        self.fragments.load(Ordering::Acquire)
    }

    fn store_state(&self, state: SessionState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }
}

/// Snapshot of one active session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Session identifier
    pub id: SessionId,
    /// State at snapshot time
    pub state: SessionState,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// Name of the bound producer
    pub producer: String,
    /// Request scope
    #[serde(flatten)]
    pub context: StreamContext,
    /// Fragments written at snapshot time
    pub fragments_written: u64,
}

/// Registry record for one session
#[derive(Debug, Clone)]
pub struct SessionEntry {
    id: SessionId,
    created_at: DateTime<Utc>,
    producer: String,
    context: StreamContext,
    status: Arc<SessionStatus>,
    cancel: CancellationToken,
}

impl SessionEntry {
    /// Create an entry for a new session
    #[must_use]
    pub fn new(id: SessionId, producer: impl Into<String>, context: StreamContext) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            producer: producer.into(),
            context,
            status: Arc::new(SessionStatus::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Session identifier
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// When the session was created
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Token that requests cancellation of this session
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Shared live status
    #[must_use]
    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    /// Take a snapshot
    #[must_use]
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            state: self.status.state(),
            created_at: self.created_at,
            producer: self.producer.clone(),
            context: self.context.clone(),
            fragments_written: self.status.fragments(),
        }
    }
}

/// Summary of active sessions
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistrySummary {
    /// Total number of active sessions
    pub total_sessions: usize,
    /// Count by state name
    pub by_state: HashMap<String, usize>,
}

/// Registry for managing active stream sessions
///
/// Cheap to clone; clones share the same map. Construct one per server and
/// inject it where sessions are created.
#[derive(Clone)]
pub struct SessionRegistry {
    /// Inner map of session ID to entry
    inner: Arc<RwLock<HashMap<SessionId, SessionEntry>>>,
    /// Publishes the active count for shutdown waits
    active: Arc<watch::Sender<usize>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    /// Create a new empty registry
    #[must_use]
    pub fn new() -> Self {
        let (active, _) = watch::channel(0);
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            active: Arc::new(active),
        }
    }

    /// Register a session
    ///
    /// Returns false (and leaves the existing entry untouched) if the ID is
    /// already registered.
    pub fn register(&self, entry: SessionEntry) -> bool {
        let id = entry.id;
        let mut inner = self.inner.write();
        if inner.contains_key(&id) {
            tracing::warn!(session_id = %id, "Session already registered");
            return false;
        }
        inner.insert(id, entry);
        self.active.send_replace(inner.len());
        tracing::debug!(session_id = %id, active = inner.len(), "Session registered");
        true
    }

    /// Deregister a session
    ///
    /// Returns the final snapshot if the session was registered.
    pub fn deregister(&self, id: &SessionId) -> Option<SessionInfo> {
        let mut inner = self.inner.write();
        let entry = inner.remove(id)?;
        self.active.send_replace(inner.len());
        tracing::debug!(session_id = %id, active = inner.len(), "Session deregistered");
        Some(entry.info())
    }

    /// Register a session and return the guard that deregisters it
    #[must_use]
    pub fn admit(&self, entry: SessionEntry) -> Registration {
        let registered = self.register(entry.clone());
        Registration {
            registry: self.clone(),
            entry,
            released: !registered,
        }
    }

    /// Record a session's new state
    ///
    /// Returns false if the session is not registered, or if `state` is
    /// terminal. A session leaves the registry on reaching a terminal state,
    /// so that step belongs to [`SessionRegistry::deregister`].
    pub fn update_state(&self, id: &SessionId, state: SessionState) -> bool {
        if state.is_terminal() {
            return false;
        }
        match self.inner.read().get(id) {
            Some(entry) => {
                entry.status.store_state(state);
                true
            }
            None => false,
        }
    }

    /// Get the number of active sessions
    #[must_use]
    pub fn count(&self) -> usize {
        self.inner.read().len()
    }

    /// Check if a session is registered
    #[must_use]
    pub fn contains(&self, id: &SessionId) -> bool {
        self.inner.read().contains_key(id)
    }

    /// Snapshot of every active session, oldest first
    #[must_use]
    pub fn list_active(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> =
            self.inner.read().values().map(SessionEntry::info).collect();
        sessions.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        sessions
    }

    /// Request cancellation of one session
    ///
    /// Returns true if the session was found.
    pub fn cancel(&self, id: &SessionId) -> bool {
        let token = self.inner.read().get(id).map(SessionEntry::cancel_token);
        match token {
            Some(token) => {
                token.cancel();
                tracing::info!(session_id = %id, "Session cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Request cancellation of every active session
    ///
    /// Does not wait for the sessions to finish; pair with
    /// [`SessionRegistry::wait_idle`] under a deadline.
    pub fn cancel_all(&self) -> usize {
        // Collect tokens to avoid holding the lock while sessions react
        let tokens: Vec<CancellationToken> = self
            .inner
            .read()
            .values()
            .map(SessionEntry::cancel_token)
            .collect();

        for token in &tokens {
            token.cancel();
        }

        if !tokens.is_empty() {
            tracing::info!(sessions = tokens.len(), "Cancellation requested for all sessions");
        }
        tokens.len()
    }

    /// Wait until no session is active
    ///
    /// Returns false if `timeout` elapsed first.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let mut rx = self.active.subscribe();
        let drained = tokio::time::timeout(timeout, rx.wait_for(|active| *active == 0)).await;
        matches!(drained, Ok(Ok(_)))
    }

    /// Get a summary of all active sessions
    #[must_use]
    pub fn summary(&self) -> RegistrySummary {
        let inner = self.inner.read();
        let mut by_state: HashMap<String, usize> = HashMap::new();

        for entry in inner.values() {
            let name = entry.status.state().name().to_string();
            *by_state.entry(name).or_insert(0) += 1;
        }

        RegistrySummary {
            total_sessions: inner.len(),
            by_state,
        }
    }
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("SessionRegistry")
            .field("session_count", &inner.len())
            .field("sessions", &inner.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Registration held by a running session
///
/// Deregisters exactly once: explicitly through
/// [`Registration::release`], or on drop if the session never got there.
#[derive(Debug)]
pub struct Registration {
    registry: SessionRegistry,
    entry: SessionEntry,
    released: bool,
}

impl Registration {
    /// Session identifier
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.entry.id
    }

    /// The registry entry
    #[must_use]
    pub fn entry(&self) -> &SessionEntry {
        &self.entry
    }

    /// Publish a non-terminal state change
    ///
    /// Terminal states are never published; [`Registration::release`]
    /// removes the entry instead.
    pub fn set_state(&self, state: SessionState) {
        if !state.is_terminal() {
            self.entry.status.store_state(state);
        }
    }

    /// Count one written fragment
    pub fn record_fragment(&self) {
        self.entry.status.fragments.fetch_add(1, Ordering::AcqRel);
    }

    /// Deregister now
    ///
    /// Subsequent calls, and the drop, are no-ops.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.registry.deregister(&self.entry.id);
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.release();
    }
}
