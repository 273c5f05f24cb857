//! Queries currently executing on a service.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Identifier of a running query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryId(Uuid);

impl QueryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for QueryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for QueryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A registered query.
#[derive(Debug, Clone)]
pub struct RunningQuery {
    pub id: QueryId,
    pub kind: &'static str,
    pub view: String,
    pub started_at: DateTime<Utc>,
    cancel: CancellationToken,
}

impl RunningQuery {
    pub fn new(id: QueryId, kind: &'static str, view: &str, cancel: CancellationToken) -> Self {
        Self {
            id,
            kind,
            view: view.into(),
            started_at: Utc::now(),
            cancel,
        }
    }
}

/// Result of a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The backend was asked to abort the statement.
    Cancelled,
    /// The caller stopped waiting but the backend statement runs to completion.
    NotCancellable,
    NotFound,
}

/// Registry of running queries, owned by one service.
#[derive(Debug, Default)]
pub struct QueryRegistry {
    running: Mutex<HashMap<QueryId, RunningQuery>>,
}

impl QueryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<QueryId, RunningQuery>> {
        // Entries stay valid even if a holder panicked.
        match self.running.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Register a query. It stays registered until the guard drops.
    ///
    /// Returns `None` when a query with the same id is already running.
    pub fn register(&self, query: RunningQuery) -> Option<RegistrationGuard<'_>> {
        let id = query.id;
        match self.lock().entry(id) {
            Entry::Occupied(_) => return None,
            Entry::Vacant(slot) => {
                slot.insert(query);
            }
        }
        Some(RegistrationGuard { registry: self, id })
    }

    pub fn unregister(&self, id: &QueryId) -> Option<RunningQuery> {
        self.lock().remove(id)
    }

    /// Cancel a query. The token fires after the lock is released.
    pub fn cancel(&self, id: &QueryId, backend_cancellable: bool) -> CancelOutcome {
        let token = self.lock().get(id).map(|q| q.cancel.clone());
        match token {
            Some(token) => {
                token.cancel();
                if backend_cancellable {
                    CancelOutcome::Cancelled
                } else {
                    CancelOutcome::NotCancellable
                }
            }
            None => CancelOutcome::NotFound,
        }
    }

    /// Snapshot of running queries, oldest first.
    pub fn list(&self) -> Vec<RunningQuery> {
        let mut queries: Vec<RunningQuery> = self.lock().values().cloned().collect();
        queries.sort_by_key(|q| q.started_at);
        queries
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Unregisters its query on drop, whatever way execution ends.
#[derive(Debug)]
pub struct RegistrationGuard<'a> {
    registry: &'a QueryRegistry,
    id: QueryId,
}

impl RegistrationGuard<'_> {
    pub fn id(&self) -> QueryId {
        self.id
    }
}

impl Drop for RegistrationGuard<'_> {
    fn drop(&mut self) {
        self.registry.unregister(&self.id);
    }
}
