//! Correlation of in-flight request ids to their handlers.
//!
//! Responses arrive asynchronously and out of order; each dispatched request
//! registers its id here so the reader task can route the response. Entries
//! are one-shot: resolving an id consumes it. Unknown ids are stale (the
//! session was reset, or a duplicate delivery) and are ignored by callers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;

/// Kind of a fire-and-forget request, used to route its async response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// `version` query.
    Version,
    /// `dynmap stats` render-job query.
    RenderStats,
}

/// What to do with a response once its id is resolved.
#[derive(Debug)]
pub enum Pending {
    /// Route to the tagged-response channel under this kind.
    Tagged(RequestKind),
    /// Wake a synchronous `execute` caller with the response body.
    Responder(oneshot::Sender<String>),
    /// Wake the login sequence; `true` on accepted password.
    Auth(oneshot::Sender<bool>),
}

/// Table of currently pending request ids.
///
/// Shared between the session (which registers) and its reader task (which
/// resolves). Clearing the table invalidates every pending request; dropped
/// responders surface as closed oneshot channels on the waiting side.
#[derive(Debug, Clone, Default)]
pub struct CorrelationTable {
    inner: Arc<Mutex<HashMap<i32, Pending>>>,
}

impl CorrelationTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<i32, Pending>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a fire-and-forget request of the given kind.
    pub fn register(&self, id: i32, kind: RequestKind) {
        self.lock().insert(id, Pending::Tagged(kind));
    }

    /// Register a synchronous request; the returned receiver yields the body.
    #[must_use]
    pub fn register_responder(&self, id: i32) -> oneshot::Receiver<String> {
        let (tx, rx) = oneshot::channel();
        self.lock().insert(id, Pending::Responder(tx));
        rx
    }

    /// Register a pending login; the returned receiver yields acceptance.
    #[must_use]
    pub fn register_auth(&self, id: i32) -> oneshot::Receiver<bool> {
        let (tx, rx) = oneshot::channel();
        self.lock().insert(id, Pending::Auth(tx));
        rx
    }

    /// Consume and return the entry for an id, if still pending.
    #[must_use]
    pub fn resolve(&self, id: i32) -> Option<Pending> {
        self.lock().remove(&id)
    }

    /// Consume the entry for a command response, leaving login entries alone.
    ///
    /// Servers may send an empty response value ahead of the auth ack; the
    /// login entry must survive that packet and be resolved by the ack.
    #[must_use]
    pub fn resolve_response(&self, id: i32) -> Option<Pending> {
        let mut map = self.lock();
        match map.get(&id) {
            Some(Pending::Auth(_)) | None => None,
            Some(_) => map.remove(&id),
        }
    }

    /// Consume the pending login entry regardless of id.
    ///
    /// A rejected password is acknowledged with id `-1`, so the login entry
    /// cannot be found by its request id on failure.
    #[must_use]
    pub fn take_auth(&self) -> Option<oneshot::Sender<bool>> {
        let mut map = self.lock();
        let id = map
            .iter()
            .find(|(_, pending)| matches!(pending, Pending::Auth(_)))
            .map(|(id, _)| *id)?;
        match map.remove(&id) {
            Some(Pending::Auth(tx)) => Some(tx),
            _ => None,
        }
    }

    /// Drop every pending entry, invalidating all outstanding requests.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of currently pending requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no requests are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
