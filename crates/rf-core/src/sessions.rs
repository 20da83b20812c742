//! Per-user registry of live-update sessions and the event broker on top of it.
//!
//! Every open SSE connection owns one [`SessionSubscription`]. The registry
//! maps `user -> session -> queue` behind a single coarse lock; publishing an
//! event does a non-blocking send into each of the user's queues. A full
//! queue means the consumer has stalled, so the event is dropped for that
//! session and the publisher moves on.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::events::StatusEvent;
use crate::ids::{SessionId, UserId};

/// Default capacity of each session's queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

#[derive(Debug)]
struct SessionEntry {
    originating_page: String,
    sender: mpsc::Sender<StatusEvent>,
}

/// Process-wide table of open sessions, keyed by user then session.
#[derive(Debug)]
pub struct SessionRegistry {
    users: RwLock<HashMap<UserId, HashMap<SessionId, SessionEntry>>>,
    queue_capacity: usize,
}

impl SessionRegistry {
    /// Create an empty registry whose session queues hold `queue_capacity`
    /// events each (at least one).
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Register a new session for `user` and return its subscription.
    ///
    /// Dropping the subscription closes the session.
    pub fn open(self: &Arc<Self>, user: &UserId, originating_page: &str) -> SessionSubscription {
        let id = SessionId::new();
        let (sender, receiver) = mpsc::channel(self.queue_capacity);

        self.users.write().entry(user.clone()).or_default().insert(
            id,
            SessionEntry {
                originating_page: originating_page.to_string(),
                sender,
            },
        );

        tracing::info!(
            user_id = %user,
            session_id = %id,
            page = originating_page,
            "Opened live-update session"
        );

        SessionSubscription {
            id,
            receiver,
            guard: SessionGuard {
                registry: Arc::clone(self),
                user: user.clone(),
                id,
            },
        }
    }

    /// Remove a session. Removing the user's last session removes the user.
    ///
    /// Returns `false` when the session was not registered.
    pub fn close(&self, user: &UserId, id: SessionId) -> bool {
        let mut users = self.users.write();
        let Some(sessions) = users.get_mut(user) else {
            return false;
        };
        let removed = sessions.remove(&id);
        if sessions.is_empty() {
            users.remove(user);
        }
        drop(users);

        match removed {
            Some(entry) => {
                tracing::info!(
                    user_id = %user,
                    session_id = %id,
                    page = %entry.originating_page,
                    "Closed live-update session"
                );
                true
            }
            None => false,
        }
    }

    /// Deliver `event` to every open session of `user`.
    ///
    /// Never blocks and never fails. Returns how many sessions accepted the
    /// event.
    pub fn publish(&self, user: &UserId, event: &StatusEvent) -> usize {
        let users = self.users.read();
        let Some(sessions) = users.get(user) else {
            tracing::debug!(user_id = %user, event = %event.name, "No open sessions; event dropped");
            return 0;
        };

        let mut delivered = 0;
        for (id, entry) in sessions {
            match entry.sender.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        user_id = %user,
                        session_id = %id,
                        event = %event.name,
                        "Session queue full; event dropped"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(
                        user_id = %user,
                        session_id = %id,
                        "Session queue closed; event dropped"
                    );
                }
            }
        }
        delivered
    }

    /// Number of users with at least one open session.
    pub fn user_count(&self) -> usize {
        self.users.read().len()
    }

    /// Number of open sessions for `user`.
    pub fn session_count(&self, user: &UserId) -> usize {
        self.users.read().get(user).map_or(0, |sessions| sessions.len())
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

/// Closes its session when dropped.
#[derive(Debug)]
struct SessionGuard {
    registry: Arc<SessionRegistry>,
    user: UserId,
    id: SessionId,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.close(&self.user, self.id);
    }
}

/// Receiving side of one session.
#[derive(Debug)]
pub struct SessionSubscription {
    id: SessionId,
    receiver: mpsc::Receiver<StatusEvent>,
    guard: SessionGuard,
}

impl SessionSubscription {
    /// The session identifier.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The owning user.
    pub fn user(&self) -> &UserId {
        &self.guard.user
    }

    /// Wait for the next event. Returns `None` once the session was closed
    /// and its queue drained.
    pub async fn recv(&mut self) -> Option<StatusEvent> {
        self.receiver.recv().await
    }

    /// Take an already queued event without waiting.
    pub fn try_recv(&mut self) -> Option<StatusEvent> {
        self.receiver.try_recv().ok()
    }
}
