//! Session registry
//!
//! Maps live session ids to the sending half of their outbound queue. A
//! session exists in the registry exactly as long as its event stream is
//! open; producers look a session up, push onto its queue, and never touch
//! the stream itself.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

use crate::error::RelayError;

/// Opaque, unguessable session identifier (UUID v4).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh random id
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for SessionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Whether a session id currently refers to an open stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Closed,
}

/// Producer handle for one session's outbound queue.
///
/// Cheap to clone; any number of producers may push concurrently.
#[derive(Debug, Clone)]
pub struct SessionQueue {
    id: SessionId,
    sender: UnboundedSender<String>,
}

impl SessionQueue {
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Append a serialized message to the end of the queue.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::SessionClosed`] if the stream consuming the
    /// queue has already gone away.
    pub fn push(&self, message: String) -> Result<(), RelayError> {
        self.sender
            .send(message)
            .map_err(|_| RelayError::SessionClosed(self.id.to_string()))
    }

    /// Whether the consuming stream has already gone away.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Consumer half of a session's queue, owned by exactly one stream.
#[derive(Debug)]
pub struct SessionReceiver {
    receiver: UnboundedReceiver<String>,
}

impl SessionReceiver {
    /// Wait for the next message; `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }

    /// Take the next message if one is already queued.
    pub fn try_recv(&mut self) -> Option<String> {
        match self.receiver.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}

/// Concurrent table of live sessions.
///
/// Constructed once at startup and shared through `Arc`; there is no global
/// instance.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionQueue>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session and hand back the receiving end of its queue.
    pub fn create(&self) -> (SessionId, SessionReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = SessionId::generate();
        self.sessions.insert(
            id.clone(),
            SessionQueue {
                id: id.clone(),
                sender,
            },
        );
        tracing::debug!(session_id = %id, "session registered");
        (id, SessionReceiver { receiver })
    }

    /// Register a new session whose removal is tied to the returned guard.
    pub fn open(self: &Arc<Self>) -> (SessionGuard, SessionReceiver) {
        let (id, receiver) = self.create();
        (
            SessionGuard {
                id,
                registry: Arc::clone(self),
            },
            receiver,
        )
    }

    pub fn lookup(&self, id: &str) -> Option<SessionQueue> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    /// Remove a session. Removing an absent id is a no-op.
    pub fn delete(&self, id: &str) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            tracing::debug!(session_id = %id, "session removed");
        }
        removed
    }

    pub fn state(&self, id: &str) -> SessionState {
        if self.sessions.contains_key(id) {
            SessionState::Open
        } else {
            SessionState::Closed
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Removes its session from the registry when dropped.
#[derive(Debug)]
pub struct SessionGuard {
    id: SessionId,
    registry: Arc<SessionRegistry>,
}

impl SessionGuard {
    pub fn id(&self) -> &SessionId {
        &self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.registry.delete(self.id.as_str()) {
            tracing::info!(session_id = %self.id, "session closed");
        }
    }
}
