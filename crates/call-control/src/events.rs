//! Event system for the call-control registry
//!
//! Two kinds of notifications leave this crate:
//!
//! - [`CallControlEvent`] - registry-level: a session became observable, a
//!   session was evicted, bootstrap finished.
//! - [`SessionStatusChange`] - per-session: the observable leg appeared,
//!   disappeared or changed status. Published by each [`Session`].
//!
//! Both ride on `tokio::sync::broadcast`, so slow subscribers lag instead of
//! blocking reconciliation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::party::{Party, PartyStatus};
use crate::session::Session;

/// Events emitted by the registry
#[derive(Debug, Clone)]
pub enum CallControlEvent {
    /// A session gained a leg owned by this extension
    NewSession {
        /// The session object
        session: Arc<Session>,
    },

    /// A session was removed after its observable leg disconnected
    SessionEvicted {
        /// Platform session id
        session_id: String,
        /// Disconnect reason reported by the platform
        reason: Option<String>,
    },

    /// Bootstrap completed; fires once per registry
    Ready,
}

/// Change of a session's observable leg
#[derive(Debug, Clone)]
pub struct SessionStatusChange {
    /// Platform session id
    pub session_id: String,
    /// Status before the update, `None` if there was no observable leg
    pub previous: Option<PartyStatus>,
    /// Status after the update, `None` if the observable leg is gone
    pub current: Option<PartyStatus>,
    /// The observable leg after the update
    pub party: Option<Party>,
    /// When the change was applied
    pub timestamp: DateTime<Utc>,
}

impl SessionStatusChange {
    pub fn became_observable(&self) -> bool {
        self.previous.is_none() && self.current.is_some()
    }
}

/// Stream of registry events
pub type EventStream = BroadcastStream<CallControlEvent>;

/// Event emitter for the registry
#[derive(Debug, Clone)]
pub struct EventEmitter {
    sender: broadcast::Sender<CallControlEvent>,
}

impl EventEmitter {
    /// Create a new event emitter with the specified capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Emit an event
    pub fn emit(&self, event: CallControlEvent) {
        // Ignore send errors (no receivers)
        let _ = self.sender.send(event);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<CallControlEvent> {
        self.sender.subscribe()
    }

    /// Subscribe to events as a stream
    pub fn stream(&self) -> EventStream {
        BroadcastStream::new(self.sender.subscribe())
    }

    /// Get the number of active receivers
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}
