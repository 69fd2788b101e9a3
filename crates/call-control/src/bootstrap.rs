//! Bootstrap sequence and single-flight initialization
//!
//! [`CallControl::initialize`] runs the bootstrap exactly once per registry:
//!
//! 1. resolve the current extension, unless the config supplied one
//! 2. preload the active sessions and the device inventory, concurrently
//!
//! Every step is best-effort. A failed fetch is logged and leaves the affected
//! state empty; it never aborts the sequence or reaches the caller.
//!
//! Concurrent callers are coalesced: the first one drives the bootstrap, the
//! others park on the `Initializing` state and are released together when it
//! turns `Ready`. If the driving call is cancelled, the parked callers wake up
//! and one of them takes over.

use std::collections::HashSet;

use futures::future::join_all;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::events::CallControlEvent;
use crate::registry::{CallControl, RegistryInner};
use crate::types::{ActiveCall, Device, Extension, PresenceList, PresenceRecord};

const EXTENSION_PATH: &str = "/account/~/extension/~";
const EXTENSION_PRESENCE_PATH: &str = "/account/~/extension/~/presence?detailedTelephonyState=true&sipData=true";
const ACCOUNT_PRESENCE_PATH: &str = "/account/~/presence?detailedTelephonyState=true&sipData=true";
const DEVICES_PATH: &str = "/account/~/extension/~/device";

/// Lifecycle of the one-time bootstrap
#[derive(Debug)]
pub(crate) enum InitState {
    Uninitialized,
    /// Bootstrap running; parked callers wait on these
    Initializing(Vec<oneshot::Sender<()>>),
    Ready,
}

/// Held by the caller driving the bootstrap
///
/// Dropped without `complete`, it rolls the state back so a parked caller can
/// take over.
struct Leader<'a> {
    inner: &'a RegistryInner,
    completed: bool,
}

impl Leader<'_> {
    fn complete(mut self) {
        let waiters = {
            let mut state = self.inner.init.lock();
            match std::mem::replace(&mut *state, InitState::Ready) {
                InitState::Initializing(waiters) => waiters,
                _ => Vec::new(),
            }
        };
        self.completed = true;

        self.inner.events.emit(CallControlEvent::Ready);
        for waiter in waiters {
            let _ = waiter.send(());
        }
    }
}

impl Drop for Leader<'_> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        let mut state = self.inner.init.lock();
        if matches!(*state, InitState::Initializing(_)) {
            warn!("Bootstrap cancelled before completion");
            // dropping the senders wakes every parked caller
            *state = InitState::Uninitialized;
        }
    }
}

impl CallControl {
    /// Whether bootstrap has completed
    pub fn is_ready(&self) -> bool {
        matches!(*self.inner.init.lock(), InitState::Ready)
    }

    /// Run the bootstrap once; concurrent and later calls share its outcome
    ///
    /// Resolves only after the registry is ready. Calling it again afterwards
    /// is a no-op.
    pub async fn initialize(&self) {
        loop {
            let parked = {
                let mut state = self.inner.init.lock();
                match &mut *state {
                    InitState::Ready => return,
                    InitState::Initializing(waiters) => {
                        let (tx, rx) = oneshot::channel();
                        waiters.push(tx);
                        Some(rx)
                    }
                    InitState::Uninitialized => {
                        *state = InitState::Initializing(Vec::new());
                        None
                    }
                }
            };

            match parked {
                Some(rx) => {
                    if rx.await.is_ok() {
                        return;
                    }
                    debug!("Bootstrap leader went away, retrying");
                }
                None => {
                    let leader = Leader {
                        inner: &self.inner,
                        completed: false,
                    };
                    self.bootstrap().await;
                    leader.complete();
                    info!("Call control ready with {} sessions", self.len());
                    return;
                }
            }
        }
    }

    async fn bootstrap(&self) {
        if self.inner.identity.read().is_none() {
            self.load_current_extension().await;
        }

        let preload_sessions = async {
            if self.inner.config.preload_sessions {
                self.preload_sessions().await;
            }
        };
        let preload_devices = async {
            if self.inner.config.preload_devices {
                self.load_devices().await;
            }
        };
        futures::join!(preload_sessions, preload_devices);
    }

    async fn load_current_extension(&self) {
        let extension = match self.inner.transport.get(EXTENSION_PATH).await {
            Ok(body) => serde_json::from_value::<Extension>(body),
            Err(e) => {
                error!("Fetch current extension error: {}", e);
                return;
            }
        };
        match extension {
            Ok(extension) => {
                info!("Acting as extension {} of account {}", extension.id, extension.account_id());
                *self.inner.identity.write() = Some(extension);
            }
            Err(e) => error!("Unreadable extension record: {}", e),
        }
    }

    async fn preload_sessions(&self) {
        let active_calls = self.load_active_calls().await;
        self.load_sessions(&active_calls).await;
    }

    /// List active calls from presence; empty on any failure
    async fn load_active_calls(&self) -> Vec<ActiveCall> {
        let account_level = self.inner.config.account_level;
        let path = if account_level {
            ACCOUNT_PRESENCE_PATH
        } else {
            EXTENSION_PRESENCE_PATH
        };

        let body = match self.inner.transport.get(path).await {
            Ok(body) => body,
            Err(e) => {
                error!("Fetch presence error: {}", e);
                return Vec::new();
            }
        };

        let parsed = if account_level {
            serde_json::from_value::<PresenceList>(body).map(|list| {
                list.records
                    .into_iter()
                    .flat_map(|record| record.active_calls.unwrap_or_default())
                    .collect::<Vec<_>>()
            })
        } else {
            serde_json::from_value::<PresenceRecord>(body).map(|record| record.active_calls.unwrap_or_default())
        };

        match parsed {
            Ok(calls) => {
                debug!("Presence lists {} active calls", calls.len());
                calls
            }
            Err(e) => {
                error!("Unreadable presence response: {}", e);
                Vec::new()
            }
        }
    }

    /// Fetch and register the full session for each active call
    ///
    /// Fetches run concurrently and fail independently; returns how many
    /// sessions were added.
    pub async fn load_sessions(&self, active_calls: &[ActiveCall]) -> usize {
        let mut seen = HashSet::new();
        let session_ids: Vec<&str> = active_calls
            .iter()
            .filter_map(|call| call.telephony_session_id.as_deref())
            .filter(|id| seen.insert(*id))
            .collect();
        if session_ids.is_empty() {
            return 0;
        }

        let results = join_all(session_ids.iter().map(|session_id| async move {
            let path = format!("/account/~/telephony/sessions/{}", session_id);
            match self.inner.transport.get(&path).await {
                Ok(resource) => self.register_loaded_session(session_id, &resource),
                Err(e) => {
                    warn!("Load session {} error: {}", session_id, e);
                    false
                }
            }
        }))
        .await;

        let loaded = results.into_iter().filter(|added| *added).count();
        info!("Preloaded {} of {} active sessions", loaded, session_ids.len());
        loaded
    }

    fn register_loaded_session(&self, session_id: &str, resource: &Value) -> bool {
        let has_parties = resource
            .get("parties")
            .and_then(Value::as_array)
            .map_or(false, |parties| !parties.is_empty());
        if !has_parties {
            warn!("Session {} came back without parties, skipping", session_id);
            return false;
        }
        self.insert_preloaded(session_id, resource)
    }

    /// Reload the device inventory
    pub async fn refresh_devices(&self) -> Vec<Device> {
        self.load_devices().await;
        self.devices()
    }

    async fn load_devices(&self) {
        let body = match self.inner.transport.get(DEVICES_PATH).await {
            Ok(body) => body,
            Err(e) => {
                error!("Fetch devices error: {}", e);
                return;
            }
        };

        let records = body.get("records").and_then(Value::as_array).cloned().unwrap_or_default();
        let devices: Vec<Device> = records
            .into_iter()
            .filter_map(|record| match serde_json::from_value::<Device>(record) {
                Ok(device) => Some(device),
                Err(e) => {
                    warn!("Skipping unreadable device record: {}", e);
                    None
                }
            })
            .collect();

        debug!("Loaded {} devices", devices.len());
        *self.inner.devices.write() = devices;
    }
}
