//! Session registry
//!
//! [`CallControl`] owns the map from platform session id to [`Session`] and is
//! the only thing that mutates it. Three paths feed it:
//!
//! - [`ingest`](CallControl::ingest) - notification events from the feed
//! - [`create_call`](CallControl::create_call) /
//!   [`create_conference`](CallControl::create_conference) - sessions this
//!   application originates
//! - [`restore`](CallControl::restore) and the bootstrap preload
//!
//! # Concurrency
//!
//! The map sits behind a `parking_lot::RwLock` for readers. Every
//! reconciliation section (lookup, merge, eviction, insert) additionally runs
//! under the `reconcile` mutex, so two updates can never interleave halfway
//! through a decision. No lock is held across an `.await`: REST calls finish
//! before the reconcile lock is taken. Application status listeners run after
//! the lock is released, so they may ingest or restore from inside a callback.
//!
//! # Eviction
//!
//! Each tracked session carries one status listener bound to the registry.
//! When the observable leg turns `Disconnected` for any reason other than
//! [`HANDOFF_REASON`], the session is removed and the listener detached.
//! An update that empties the party list, or drops the observable leg without
//! a `Disconnected` status, leaves the session tracked.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use tracing::{debug, info, trace, warn};

use crate::bootstrap::InitState;
use crate::config::CallControlConfig;
use crate::error::{CallControlError, CallControlResult};
use crate::events::{CallControlEvent, EventEmitter, EventStream, SessionStatusChange};
use crate::party::PartyStatusCode;
use crate::session::{ListenerId, Session, SessionData, SessionUpdate};
use crate::transport::PlatformTransport;
use crate::types::{id_from_value, CallTarget, Device, Extension, NotificationMessage};

/// Disconnect reason meaning the call is moving to another leg, not ending
pub const HANDOFF_REASON: &str = "Pickup";

const CALL_OUT_PATH: &str = "/account/~/telephony/call-out";
const CONFERENCE_PATH: &str = "/account/~/telephony/conference";

/// What [`CallControl::ingest`] did with a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Not a session event, or no session id
    Ignored,
    /// Unseen session whose parties were all disconnected
    Discarded,
    /// A new session was registered
    Created {
        /// Whether it was announced as a new session
        observable: bool,
    },
    /// An existing session was updated
    Updated {
        /// Whether the update made it observable (and announced it)
        became_observable: bool,
        /// Whether the update evicted it
        evicted: bool,
    },
}

#[derive(Debug, Clone)]
struct TrackedSession {
    session: Arc<Session>,
    eviction: ListenerId,
}

pub(crate) struct RegistryInner {
    pub(crate) config: CallControlConfig,
    pub(crate) transport: Arc<dyn PlatformTransport>,
    pub(crate) events: EventEmitter,
    pub(crate) identity: RwLock<Option<Extension>>,
    pub(crate) devices: RwLock<Vec<Device>>,
    pub(crate) init: Mutex<InitState>,
    sessions: RwLock<HashMap<String, TrackedSession>>,
    reconcile: Mutex<()>,
}

impl RegistryInner {
    fn on_session_status(&self, session: &Session, change: &SessionStatusChange) {
        let Some(status) = &change.current else {
            return;
        };
        if status.code != PartyStatusCode::Disconnected {
            return;
        }
        if status.reason.as_deref() == Some(HANDOFF_REASON) {
            debug!("Session {} disconnected with {}, keeping it", session.id(), HANDOFF_REASON);
            return;
        }

        let removed = {
            let mut sessions = self.sessions.write();
            match sessions.get(session.id()) {
                Some(tracked) if std::ptr::eq(Arc::as_ptr(&tracked.session), session) => sessions.remove(session.id()),
                _ => None,
            }
        };

        if let Some(tracked) = removed {
            session.remove_status_listener(tracked.eviction);
            info!("Evicted session {} ({:?})", session.id(), status.reason);
            self.events.emit(CallControlEvent::SessionEvicted {
                session_id: session.id().to_string(),
                reason: status.reason.clone(),
            });
        }
    }
}

/// Live registry of the telephony sessions visible to one extension or account
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct CallControl {
    pub(crate) inner: Arc<RegistryInner>,
}

impl std::fmt::Debug for CallControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallControl")
            .field("sessions", &self.len())
            .field("account_level", &self.inner.config.account_level)
            .field("ready", &self.is_ready())
            .finish()
    }
}

impl CallControl {
    /// Create a registry; call [`initialize`](Self::initialize) to bootstrap it
    pub fn new(config: CallControlConfig, transport: Arc<dyn PlatformTransport>) -> CallControlResult<Self> {
        config.validate()?;
        let identity = config.extension_info.clone();
        let events = EventEmitter::new(config.event_channel_capacity);

        Ok(Self {
            inner: Arc::new(RegistryInner {
                config,
                transport,
                events,
                identity: RwLock::new(identity),
                devices: RwLock::new(Vec::new()),
                init: Mutex::new(InitState::Uninitialized),
                sessions: RwLock::new(HashMap::new()),
                reconcile: Mutex::new(()),
            }),
        })
    }

    // ===== READ ACCESSORS =====

    pub fn config(&self) -> &CallControlConfig {
        &self.inner.config
    }

    pub fn extension_id(&self) -> Option<String> {
        self.inner.identity.read().as_ref().map(|ext| ext.id.clone())
    }

    pub fn account_id(&self) -> Option<String> {
        self.inner.identity.read().as_ref().map(|ext| ext.account_id().to_string())
    }

    /// The resolved identity, if any
    pub fn extension(&self) -> Option<Extension> {
        self.inner.identity.read().clone()
    }

    pub fn devices(&self) -> Vec<Device> {
        self.inner.devices.read().clone()
    }

    pub fn session(&self, session_id: &str) -> Option<Arc<Session>> {
        self.inner.sessions.read().get(session_id).map(|t| t.session.clone())
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.inner.sessions.read().contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.inner.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.sessions.read().is_empty()
    }

    /// Sessions keyed by id
    pub fn sessions_map(&self) -> HashMap<String, Arc<Session>> {
        self.inner
            .sessions
            .read()
            .iter()
            .map(|(id, tracked)| (id.clone(), tracked.session.clone()))
            .collect()
    }

    /// Sessions ordered by creation time
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        let mut sessions: Vec<Arc<Session>> = self
            .inner
            .sessions
            .read()
            .values()
            .map(|tracked| tracked.session.clone())
            .collect();
        sessions.sort_by(|a, b| a.created_at().cmp(&b.created_at()).then_with(|| a.id().cmp(b.id())));
        sessions
    }

    /// Export the registry for a later [`restore`](Self::restore)
    pub fn snapshot(&self) -> Vec<SessionData> {
        self.sessions().iter().map(|session| session.data()).collect()
    }

    /// Subscribe to registry events
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<CallControlEvent> {
        self.inner.events.subscribe()
    }

    /// Subscribe to registry events as a stream
    pub fn event_stream(&self) -> EventStream {
        self.inner.events.stream()
    }

    fn identity_ids(&self) -> (Option<String>, Option<String>) {
        let identity = self.inner.identity.read();
        match identity.as_ref() {
            Some(ext) => (Some(ext.id.clone()), Some(ext.account_id().to_string())),
            None => (None, None),
        }
    }

    fn new_session(&self, data: SessionData) -> Arc<Session> {
        Session::new(data, self.inner.transport.clone(), self.inner.config.account_level)
    }

    /// Bind the eviction policy to a session's status signal
    fn bind_eviction(&self, session: &Arc<Session>) -> TrackedSession {
        let registry: Weak<RegistryInner> = Arc::downgrade(&self.inner);
        let eviction = session.add_registry_listener(move |session, change| {
            if let Some(inner) = registry.upgrade() {
                inner.on_session_status(session, change);
            }
        });
        TrackedSession {
            session: session.clone(),
            eviction,
        }
    }

    /// Insert under the reconcile lock, replacing (and unbinding) any previous entry
    fn track(&self, session: &Arc<Session>) {
        let tracked = self.bind_eviction(session);
        let previous = self.inner.sessions.write().insert(session.id().to_string(), tracked);
        if let Some(previous) = previous {
            if !Arc::ptr_eq(&previous.session, session) {
                previous.session.remove_status_listener(previous.eviction);
            }
        }
    }

    // ===== INGESTION =====

    /// Reconcile one notification from the feed
    ///
    /// Events for the same session must be ingested in delivery order.
    pub fn ingest(&self, message: &NotificationMessage) -> IngestOutcome {
        if !message.event.contains(self.inner.config.notification_topic.as_str()) {
            trace!("Ignoring notification on {}", message.event);
            return IngestOutcome::Ignored;
        }
        let Some(session_id) = message.body.get("telephonySessionId").and_then(id_from_value) else {
            trace!("Ignoring session notification without telephonySessionId");
            return IngestOutcome::Ignored;
        };

        let (extension_id, account_id) = self.identity_ids();
        let update = SessionUpdate::from_event_body(&message.body).with_identity(extension_id, account_id);

        let (session, change, outcome) = {
            let _reconcile = self.inner.reconcile.lock();
            let existing = self.session(&session_id);

            let Some(session) = existing else {
                if update.all_parties_disconnected() {
                    debug!("Discarding already-finished session {}", session_id);
                    return IngestOutcome::Discarded;
                }

                let session = self.new_session(update.into_data(session_id.as_str()));
                self.track(&session);
                let observable = session.is_observable();
                debug!("Tracking new session {} (observable: {})", session_id, observable);
                if observable {
                    self.inner.events.emit(CallControlEvent::NewSession { session });
                }
                return IngestOutcome::Created { observable };
            };

            let was_observable = session.is_observable();
            let change = session.apply_update(update);
            let evicted = !self.contains(&session_id);
            let became_observable = !was_observable && session.is_observable() && !evicted;
            if became_observable {
                debug!("Session {} became observable", session_id);
                self.inner.events.emit(CallControlEvent::NewSession {
                    session: session.clone(),
                });
            }
            let outcome = IngestOutcome::Updated {
                became_observable,
                evicted,
            };
            (session, change, outcome)
        };

        // listeners may re-enter the registry
        if let Some(change) = change {
            session.publish(&change);
        }
        outcome
    }

    // ===== EXPLICIT CREATION =====

    /// Place a call from one of the extension's devices
    pub async fn create_call(&self, device_id: &str, to: &CallTarget) -> CallControlResult<Arc<Session>> {
        if device_id.is_empty() {
            return Err(CallControlError::invalid_argument("device_id is empty"));
        }
        if to.is_empty() {
            return Err(CallControlError::invalid_argument("call-out target is empty"));
        }

        let body = json!({
            "from": { "deviceId": device_id },
            "to": serde_json::to_value(to)?,
        });
        let response = self.inner.transport.post(CALL_OUT_PATH, body).await?;
        let session = self.adopt_created_session(&response)?;
        info!("Call-out created session {}", session.id());
        Ok(session)
    }

    /// Create an empty conference session
    ///
    /// Join it with a softphone using [`Session::voice_call_token`], then
    /// bring other sessions in with [`Session::bring_in`].
    pub async fn create_conference(&self) -> CallControlResult<Arc<Session>> {
        let response = self.inner.transport.post(CONFERENCE_PATH, json!({})).await?;
        let session = self.adopt_created_session(&response)?;
        info!("Created conference session {}", session.id());
        Ok(session)
    }

    /// Register a session returned by an origination request
    ///
    /// Skips the already-disconnected filter and the new-session event. If the
    /// feed delivered the session first, the existing object is updated instead.
    fn adopt_created_session(&self, response: &Value) -> CallControlResult<Arc<Session>> {
        let resource = response
            .get("session")
            .ok_or_else(|| CallControlError::invalid_response("response has no session"))?;
        let session_id = resource
            .get("id")
            .and_then(id_from_value)
            .ok_or_else(|| CallControlError::invalid_response("session has no id"))?;

        let (extension_id, account_id) = self.identity_ids();
        let mut update = SessionUpdate::from_resource(resource).with_identity(extension_id, account_id);
        if update.parties.is_none() {
            update.parties = Some(Vec::new());
        }

        let (existing, change) = {
            let _reconcile = self.inner.reconcile.lock();
            let Some(existing) = self.session(&session_id) else {
                let session = self.new_session(update.into_data(session_id));
                self.track(&session);
                return Ok(session);
            };
            debug!("Session {} already tracked, merging creation response", session_id);
            let change = existing.apply_update(update);
            (existing, change)
        };

        if let Some(change) = change {
            existing.publish(&change);
        }
        Ok(existing)
    }

    // ===== PRELOAD =====

    /// Register a session fetched during bootstrap
    ///
    /// A session the feed already delivered is newer than the REST copy, so it
    /// is kept as is.
    pub(crate) fn insert_preloaded(&self, session_id: &str, resource: &Value) -> bool {
        let (extension_id, account_id) = self.identity_ids();
        let update = SessionUpdate::from_resource(resource).with_identity(extension_id, account_id);

        let _reconcile = self.inner.reconcile.lock();
        if self.contains(session_id) {
            debug!("Session {} arrived through the feed during preload, keeping it", session_id);
            return false;
        }
        let session = self.new_session(update.into_data(session_id));
        self.track(&session);
        true
    }

    // ===== SNAPSHOT / RESTORE =====

    /// Replace the registry contents with a snapshot
    ///
    /// Sessions that already exist are updated in place, keeping their
    /// subscribers. Unknown ones are created and bound to the eviction policy.
    /// Anything not in the snapshot is dropped.
    pub fn restore(&self, snapshots: Vec<SessionData>) {
        let _reconcile = self.inner.reconcile.lock();
        let current = self.inner.sessions.read().clone();
        let mut restored: HashMap<String, TrackedSession> = HashMap::with_capacity(snapshots.len());

        for data in snapshots {
            if data.id.is_empty() {
                warn!("Skipping snapshot entry without a session id");
                continue;
            }
            let id = data.id.clone();
            if let Some(tracked) = restored.get(&id).or_else(|| current.get(&id)) {
                tracked.session.restore(data);
                let tracked = tracked.clone();
                restored.insert(id, tracked);
                continue;
            }
            let session = self.new_session(data);
            restored.insert(id, self.bind_eviction(&session));
        }

        let previous = std::mem::replace(&mut *self.inner.sessions.write(), restored);
        let sessions = self.inner.sessions.read();
        let mut dropped = 0;
        for (id, tracked) in previous {
            let kept = sessions
                .get(&id)
                .map_or(false, |t| Arc::ptr_eq(&t.session, &tracked.session));
            if !kept {
                tracked.session.remove_status_listener(tracked.eviction);
                dropped += 1;
            }
        }
        info!("Restored {} sessions ({} dropped)", sessions.len(), dropped);
    }
}
