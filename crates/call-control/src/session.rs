//! Telephony session state
//!
//! A [`Session`] owns the current view of one platform session: its party list
//! and the top-level fields the platform last sent. The registry feeds it
//! updates; everything else only reads it, subscribes to its status changes,
//! or asks it to issue call-control requests against the platform.
//!
//! # Status signal
//!
//! After every merge the session recomputes "my party", the leg owned by the
//! extension the registry acts for. When that leg appears, disappears, or
//! changes status code or reason, the session raises exactly one
//! [`SessionStatusChange`]:
//!
//! - first to the registry's eviction binding, inside the reconciliation step;
//! - then, once the registry has released its reconcile lock, to the
//!   callbacks from [`Session::add_status_listener`] and every broadcast
//!   subscriber from [`Session::subscribe`].
//!
//! Callbacks may therefore call back into the registry (`ingest`, `restore`).

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::error::{CallControlError, CallControlResult};
use crate::events::SessionStatusChange;
use crate::party::{normalize_party, normalize_parties, Party, PartyStatus, PartyStatusCode};
use crate::transport::PlatformTransport;
use crate::types::CallTarget;

/// Capacity of each session's status broadcast channel
const STATUS_CHANNEL_CAPACITY: usize = 32;

/// Full state of one session, as exported by snapshots
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    /// Platform-assigned session id
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default)]
    pub parties: Vec<Party>,
    /// Every other top-level field the platform sent, verbatim
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl SessionData {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn server_id(&self) -> Option<&str> {
        self.fields.get("serverId").and_then(Value::as_str)
    }

    pub fn voice_call_token(&self) -> Option<&str> {
        self.fields.get("voiceCallToken").and_then(Value::as_str)
    }

    pub fn creation_time(&self) -> Option<&str> {
        self.fields.get("creationTime").and_then(Value::as_str)
    }

    pub fn origin(&self) -> Option<&Value> {
        self.fields.get("origin")
    }

    /// Apply an update: top-level fields replace wholesale, the party list is
    /// replaced as a whole when present
    fn merge(&mut self, update: SessionUpdate) {
        if let Some(extension_id) = update.extension_id {
            self.extension_id = Some(extension_id);
        }
        if let Some(account_id) = update.account_id {
            self.account_id = Some(account_id);
        }
        if let Some(parties) = update.parties {
            self.parties = parties;
        }
        for (key, value) in update.fields {
            self.fields.insert(key, value);
        }
    }
}

/// Partial session data carried by one notification or REST payload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionUpdate {
    pub extension_id: Option<String>,
    pub account_id: Option<String>,
    /// Complete, normalized party list; `None` leaves the current one alone
    pub parties: Option<Vec<Party>>,
    pub fields: Map<String, Value>,
}

impl SessionUpdate {
    /// Build from a notification body
    ///
    /// Transport-only fields (`eventTime`, `telephonySessionId`, `sessionId`)
    /// are dropped; the session id is carried separately.
    pub fn from_event_body(body: &Value) -> Self {
        Self::from_payload(body, &["id", "eventTime", "telephonySessionId", "sessionId"])
    }

    /// Build from a session resource returned by the REST API
    pub fn from_resource(resource: &Value) -> Self {
        Self::from_payload(resource, &["id"])
    }

    fn from_payload(payload: &Value, strip: &[&str]) -> Self {
        let mut fields = payload.as_object().cloned().unwrap_or_default();
        for key in strip {
            fields.remove(*key);
        }
        let parties = normalize_parties(fields.remove("parties").as_ref());
        // identity is stamped by the registry, never taken from the payload
        fields.remove("extensionId");
        fields.remove("accountId");

        Self {
            extension_id: None,
            account_id: None,
            parties,
            fields,
        }
    }

    /// Stamp the owning identity
    pub fn with_identity(mut self, extension_id: Option<String>, account_id: Option<String>) -> Self {
        self.extension_id = extension_id;
        self.account_id = account_id;
        self
    }

    /// Whether every party in the update is already disconnected
    ///
    /// An update without a party list counts as fully disconnected.
    pub fn all_parties_disconnected(&self) -> bool {
        self.parties
            .as_deref()
            .map_or(true, |parties| parties.iter().all(Party::is_disconnected))
    }

    pub fn into_data(self, id: impl Into<String>) -> SessionData {
        let mut data = SessionData::new(id);
        data.merge(self);
        data
    }
}

impl From<SessionData> for SessionUpdate {
    fn from(data: SessionData) -> Self {
        Self {
            extension_id: data.extension_id,
            account_id: data.account_id,
            parties: Some(data.parties),
            fields: data.fields,
        }
    }
}

/// Handle returned by [`Session::add_status_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

/// Synchronous status-change callback
pub type StatusListener = Arc<dyn Fn(&Session, &SessionStatusChange) + Send + Sync>;

/// Who a listener belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListenerKind {
    /// Registry eviction binding; runs during reconciliation
    Registry,
    /// Application callback; runs after reconciliation
    External,
}

struct ListenerEntry {
    id: ListenerId,
    kind: ListenerKind,
    callback: StatusListener,
}

#[derive(Debug)]
struct SessionState {
    data: SessionData,
    updated_at: DateTime<Utc>,
}

/// Pick the leg owned by the session's extension
fn find_my_party(data: &SessionData, account_level: bool) -> Option<&Party> {
    let account_id = data.account_id.as_deref();
    if let Some(extension_id) = data.extension_id.as_deref() {
        if let Some(party) = data.parties.iter().find(|p| p.is_owned_by(extension_id, account_id)) {
            return Some(party);
        }
    }
    if account_level {
        if let Some(account_id) = account_id {
            return data.parties.iter().find(|p| p.is_owned_by_account(account_id));
        }
    }
    None
}

fn status_key(status: &PartyStatus) -> (&PartyStatusCode, Option<&str>) {
    (&status.code, status.reason.as_deref())
}

/// One telephony session tracked by the registry
pub struct Session {
    id: String,
    account_level: bool,
    state: RwLock<SessionState>,
    listeners: Mutex<Vec<ListenerEntry>>,
    status_tx: broadcast::Sender<SessionStatusChange>,
    transport: Arc<dyn PlatformTransport>,
    created_at: DateTime<Utc>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("parties", &state.data.parties.len())
            .field("status", &find_my_party(&state.data, self.account_level).map(|p| p.status.code.clone()))
            .finish()
    }
}

impl Session {
    pub(crate) fn new(data: SessionData, transport: Arc<dyn PlatformTransport>, account_level: bool) -> Arc<Self> {
        let (status_tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        let now = Utc::now();
        Arc::new(Self {
            id: data.id.clone(),
            account_level,
            state: RwLock::new(SessionState { data, updated_at: now }),
            listeners: Mutex::new(Vec::new()),
            status_tx,
            transport,
            created_at: now,
        })
    }

    // ===== READ ACCESSORS =====

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Full party list, in platform order
    pub fn parties(&self) -> Vec<Party> {
        self.state.read().data.parties.clone()
    }

    /// The leg owned by this extension, if any
    pub fn party(&self) -> Option<Party> {
        let state = self.state.read();
        find_my_party(&state.data, self.account_level).cloned()
    }

    /// Whether the session has a leg owned by this extension
    pub fn is_observable(&self) -> bool {
        let state = self.state.read();
        find_my_party(&state.data, self.account_level).is_some()
    }

    /// Status code of my party; `None` while the session is not observable
    pub fn status(&self) -> Option<PartyStatusCode> {
        let state = self.state.read();
        find_my_party(&state.data, self.account_level).map(|p| p.status.code.clone())
    }

    pub fn extension_id(&self) -> Option<String> {
        self.state.read().data.extension_id.clone()
    }

    pub fn account_id(&self) -> Option<String> {
        self.state.read().data.account_id.clone()
    }

    pub fn server_id(&self) -> Option<String> {
        self.state.read().data.server_id().map(str::to_string)
    }

    /// Token a softphone uses to join a conference session
    pub fn voice_call_token(&self) -> Option<String> {
        self.state.read().data.voice_call_token().map(str::to_string)
    }

    /// Copy of the full state, suitable for [`restore`](crate::CallControl::restore)
    pub fn data(&self) -> SessionData {
        self.state.read().data.clone()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.state.read().updated_at
    }

    // ===== SUBSCRIPTIONS =====

    /// Subscribe to status changes of this session
    pub fn subscribe(&self) -> broadcast::Receiver<SessionStatusChange> {
        self.status_tx.subscribe()
    }

    /// Register a status-change callback
    ///
    /// Called on the thread that ingested the update, after the registry has
    /// finished reconciling it.
    pub fn add_status_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Session, &SessionStatusChange) + Send + Sync + 'static,
    {
        self.push_listener(ListenerKind::External, Arc::new(listener))
    }

    /// Register the callback the registry evicts through
    pub(crate) fn add_registry_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Session, &SessionStatusChange) + Send + Sync + 'static,
    {
        self.push_listener(ListenerKind::Registry, Arc::new(listener))
    }

    fn push_listener(&self, kind: ListenerKind, callback: StatusListener) -> ListenerId {
        let id = ListenerId(Uuid::new_v4());
        self.listeners.lock().push(ListenerEntry { id, kind, callback });
        id
    }

    /// Remove a callback; returns whether it was registered
    pub fn remove_status_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|entry| entry.id != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    // ===== STATE UPDATES =====

    /// Merge an update and run the registry binding if my party changed
    ///
    /// Returns the change, which the caller hands to [`publish`](Self::publish)
    /// once it holds no registry lock.
    pub(crate) fn apply_update(&self, update: SessionUpdate) -> Option<SessionStatusChange> {
        let change = {
            let mut state = self.state.write();
            let previous = find_my_party(&state.data, self.account_level).map(|p| p.status.clone());

            state.data.merge(update);
            state.updated_at = Utc::now();

            let party = find_my_party(&state.data, self.account_level).cloned();
            let current = party.as_ref().map(|p| p.status.clone());

            let changed = match (&previous, &current) {
                (Some(before), Some(after)) => status_key(before) != status_key(after),
                (None, None) => false,
                _ => true,
            };

            changed.then(|| SessionStatusChange {
                session_id: self.id.clone(),
                previous,
                current,
                party,
                timestamp: state.updated_at,
            })
        };

        if let Some(change) = &change {
            debug!(
                "Session {} status {:?} -> {:?}",
                self.id,
                change.previous.as_ref().map(|s| &s.code),
                change.current.as_ref().map(|s| &s.code)
            );
            self.notify(ListenerKind::Registry, change);
        }
        change
    }

    /// Deliver a change to application callbacks and broadcast subscribers
    pub(crate) fn publish(&self, change: &SessionStatusChange) {
        self.notify(ListenerKind::External, change);
        let _ = self.status_tx.send(change.clone());
    }

    /// Bulk state transfer: same merge as an update, without the status signal
    pub(crate) fn restore(&self, data: SessionData) {
        let mut state = self.state.write();
        state.data.merge(SessionUpdate::from(data));
        state.updated_at = Utc::now();
    }

    fn notify(&self, kind: ListenerKind, change: &SessionStatusChange) {
        let listeners: Vec<StatusListener> = self
            .listeners
            .lock()
            .iter()
            .filter(|entry| entry.kind == kind)
            .map(|entry| Arc::clone(&entry.callback))
            .collect();
        for listener in listeners {
            listener(self, change);
        }
    }

    // ===== CALL CONTROL =====
    //
    // These only issue requests. Resulting state arrives through the
    // notification feed like any other change.

    fn session_path(&self) -> String {
        format!("/account/~/telephony/sessions/{}", self.id)
    }

    fn my_party_path(&self) -> CallControlResult<String> {
        let party_id = self
            .party()
            .and_then(|p| p.id)
            .ok_or_else(|| CallControlError::no_observable_party(self.id.clone()))?;
        Ok(format!("{}/parties/{}", self.session_path(), party_id))
    }

    async fn post_party_action(&self, action: &str, body: Value) -> CallControlResult<Party> {
        let path = format!("{}/{}", self.my_party_path()?, action);
        let response = self.transport.post(&path, body).await?;
        Ok(normalize_party(&response))
    }

    async fn patch_party(&self, body: Value) -> CallControlResult<Party> {
        let path = self.my_party_path()?;
        let response = self.transport.patch(&path, body).await?;
        Ok(normalize_party(&response))
    }

    /// Terminate the whole session for every party
    pub async fn drop_session(&self) -> CallControlResult<()> {
        self.transport.delete(&self.session_path()).await?;
        Ok(())
    }

    pub async fn hold(&self) -> CallControlResult<Party> {
        self.post_party_action("hold", json!({})).await
    }

    pub async fn unhold(&self) -> CallControlResult<Party> {
        self.post_party_action("unhold", json!({})).await
    }

    pub async fn mute(&self) -> CallControlResult<Party> {
        self.patch_party(json!({ "muted": true })).await
    }

    pub async fn unmute(&self) -> CallControlResult<Party> {
        self.patch_party(json!({ "muted": false })).await
    }

    /// Blind-transfer my leg
    pub async fn transfer(&self, target: &CallTarget) -> CallControlResult<Party> {
        if target.is_empty() {
            return Err(CallControlError::invalid_argument("transfer target is empty"));
        }
        self.post_party_action("transfer", serde_json::to_value(target)?).await
    }

    /// Forward a ringing inbound leg
    pub async fn forward(&self, target: &CallTarget) -> CallControlResult<Party> {
        if target.is_empty() {
            return Err(CallControlError::invalid_argument("forward target is empty"));
        }
        self.post_party_action("forward", serde_json::to_value(target)?).await
    }

    pub async fn park(&self) -> CallControlResult<Party> {
        self.post_party_action("park", json!({})).await
    }

    /// Flip the call to one of the extension's call-flip numbers
    pub async fn flip(&self, call_flip_id: &str) -> CallControlResult<Party> {
        self.post_party_action("flip", json!({ "callFlipId": call_flip_id })).await
    }

    /// Send a ringing leg to voicemail
    pub async fn to_voicemail(&self) -> CallControlResult<Party> {
        self.post_party_action("reject", json!({})).await
    }

    /// Stop ringing on one device without rejecting the call
    pub async fn ignore(&self, device_id: &str) -> CallControlResult<Party> {
        self.post_party_action("ignore", json!({ "deviceId": device_id })).await
    }

    /// Answer a ringing leg on the given device
    pub async fn answer(&self, device_id: &str) -> CallControlResult<Party> {
        self.post_party_action("answer", json!({ "deviceId": device_id })).await
    }

    /// Reply to the caller with a text message
    pub async fn reply(&self, text: &str) -> CallControlResult<Party> {
        self.post_party_action("reply", json!({ "replyWithText": text })).await
    }

    /// Pull a party of another session into this one (conference)
    pub async fn bring_in(&self, party_id: &str, telephony_session_id: &str) -> CallControlResult<Party> {
        let path = format!("{}/parties/bring-in", self.session_path());
        let response = self
            .transport
            .post(
                &path,
                json!({ "partyId": party_id, "telephonySessionId": telephony_session_id }),
            )
            .await?;
        Ok(normalize_party(&response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingTransport {
        requests: Mutex<Vec<(String, String, Value)>>,
    }

    #[async_trait]
    impl PlatformTransport for RecordingTransport {
        async fn get(&self, path: &str) -> CallControlResult<Value> {
            self.requests.lock().push(("GET".into(), path.into(), Value::Null));
            Ok(json!({}))
        }
        async fn post(&self, path: &str, body: Value) -> CallControlResult<Value> {
            self.requests.lock().push(("POST".into(), path.into(), body));
            Ok(json!({ "id": "p1", "status": { "code": "Hold" } }))
        }
        async fn patch(&self, path: &str, body: Value) -> CallControlResult<Value> {
            self.requests.lock().push(("PATCH".into(), path.into(), body));
            Ok(json!({ "id": "p1", "status": { "code": "Answered" }, "muted": true }))
        }
        async fn delete(&self, path: &str) -> CallControlResult<Value> {
            self.requests.lock().push(("DELETE".into(), path.into(), Value::Null));
            Ok(Value::Null)
        }
    }

    fn party(id: &str, ext: &str, code: &str) -> Value {
        json!({ "id": id, "status": { "code": code }, "owner": { "extensionId": ext, "accountId": "a1" } })
    }

    fn session_with(parties: Vec<Value>) -> (Arc<Session>, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::default());
        let data = SessionUpdate::from_resource(&json!({ "id": "s1", "parties": parties }))
            .with_identity(Some("101".into()), Some("a1".into()))
            .into_data("s1");
        (Session::new(data, transport.clone(), false), transport)
    }

    fn update(parties: Vec<Value>) -> SessionUpdate {
        SessionUpdate::from_event_body(&json!({ "telephonySessionId": "s1", "parties": parties }))
            .with_identity(Some("101".into()), Some("a1".into()))
    }

    /// Merge and deliver, as the registry does once its lock is released
    fn apply(session: &Session, update: SessionUpdate) -> Option<SessionStatusChange> {
        let change = session.apply_update(update);
        if let Some(change) = &change {
            session.publish(change);
        }
        change
    }

    #[test]
    fn test_my_party_detection() {
        let (session, _) = session_with(vec![party("p0", "999", "Answered"), party("p1", "101", "Proceeding")]);
        assert!(session.is_observable());
        assert_eq!(session.party().and_then(|p| p.id).as_deref(), Some("p1"));
        assert_eq!(session.status(), Some(PartyStatusCode::Proceeding));
    }

    #[test]
    fn test_no_my_party_without_match() {
        let (session, _) = session_with(vec![party("p0", "999", "Answered")]);
        assert!(!session.is_observable());
        assert!(session.status().is_none());
    }

    #[test]
    fn test_account_level_falls_back_to_account_party() {
        let transport = Arc::new(RecordingTransport::default());
        let data = SessionUpdate::from_resource(&json!({ "parties": [party("p0", "202", "Answered")] }))
            .with_identity(Some("101".into()), Some("a1".into()))
            .into_data("s1");

        let account_session = Session::new(data.clone(), transport.clone(), true);
        assert_eq!(account_session.party().and_then(|p| p.id).as_deref(), Some("p0"));

        let extension_session = Session::new(data, transport, false);
        assert!(extension_session.party().is_none());
    }

    #[test]
    fn test_party_list_is_replaced_not_patched() {
        let (session, _) = session_with(vec![party("p0", "999", "Answered"), party("p1", "101", "Proceeding")]);
        session.apply_update(update(vec![party("p1", "101", "Answered")]));

        let parties = session.parties();
        assert_eq!(parties.len(), 1);
        assert_eq!(parties[0].id.as_deref(), Some("p1"));
    }

    #[test]
    fn test_update_without_parties_keeps_list() {
        let (session, _) = session_with(vec![party("p1", "101", "Answered")]);
        let change = session.apply_update(
            SessionUpdate::from_event_body(&json!({ "telephonySessionId": "s1", "serverId": "srv-2" })),
        );

        assert!(change.is_none());
        assert_eq!(session.parties().len(), 1);
        assert_eq!(session.server_id().as_deref(), Some("srv-2"));
        assert_eq!(session.extension_id().as_deref(), Some("101"));
    }

    #[test]
    fn test_transport_fields_are_stripped() {
        let (session, _) = session_with(vec![party("p1", "101", "Answered")]);
        session.apply_update(
            SessionUpdate::from_event_body(&json!({
                "telephonySessionId": "s1",
                "sessionId": "legacy",
                "eventTime": "2026-10-18T10:00:00Z",
                "sequence": 7
            })),
        );

        let data = session.data();
        assert!(!data.fields.contains_key("eventTime"));
        assert!(!data.fields.contains_key("sessionId"));
        assert!(!data.fields.contains_key("telephonySessionId"));
        assert_eq!(data.fields.get("sequence"), Some(&json!(7)));
    }

    #[test]
    fn test_status_signal_fires_once_per_change() {
        let (session, _) = session_with(vec![party("p1", "101", "Proceeding")]);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        session.add_status_listener(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        // same status: no signal
        assert!(apply(&session, update(vec![party("p1", "101", "Proceeding")])).is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        // status and other fields change together: one signal
        let change = apply(&session, update(vec![party("p1", "101", "Answered"), party("p2", "999", "Answered")]))
            .expect("status change");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(change.previous.map(|s| s.code), Some(PartyStatusCode::Proceeding));
        assert_eq!(change.current.map(|s| s.code), Some(PartyStatusCode::Answered));
    }

    #[test]
    fn test_status_signal_on_presence_change() {
        let (session, _) = session_with(vec![party("p0", "999", "Answered")]);
        let change = apply(&session, update(vec![party("p0", "999", "Answered"), party("p1", "101", "Setup")]))
            .expect("my party appeared");
        assert!(change.became_observable());

        let change = apply(&session, update(vec![party("p0", "999", "Answered")])).expect("my party left");
        assert!(change.current.is_none());
    }

    #[test]
    fn test_reason_change_is_a_status_change() {
        let (session, _) = session_with(vec![party("p1", "101", "Disconnected")]);
        let change = apply(&session, update(vec![json!({
            "id": "p1",
            "status": { "code": "Disconnected", "reason": "Pickup" },
            "owner": { "extensionId": "101", "accountId": "a1" }
        })]));
        assert!(change.is_some());
    }

    #[test]
    fn test_removed_listener_is_not_called() {
        let (session, _) = session_with(vec![party("p1", "101", "Proceeding")]);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let id = session.add_status_listener(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(session.remove_status_listener(id));
        assert!(!session.remove_status_listener(id));
        apply(&session, update(vec![party("p1", "101", "Answered")]));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(session.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_broadcast_subscribers_see_changes() {
        let (session, _) = session_with(vec![party("p1", "101", "Proceeding")]);
        let mut rx = session.subscribe();
        apply(&session, update(vec![party("p1", "101", "Hold")]));

        let change = rx.recv().await.unwrap();
        assert_eq!(change.session_id, "s1");
        assert_eq!(change.current.map(|s| s.code), Some(PartyStatusCode::Hold));
    }

    #[test]
    fn test_application_listeners_wait_for_publish() {
        let (session, _) = session_with(vec![party("p1", "101", "Proceeding")]);
        let registry_calls = Arc::new(AtomicUsize::new(0));
        let app_calls = Arc::new(AtomicUsize::new(0));
        let counter = registry_calls.clone();
        session.add_registry_listener(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = app_calls.clone();
        session.add_status_listener(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let mut rx = session.subscribe();

        let change = session
            .apply_update(update(vec![party("p1", "101", "Answered")]))
            .expect("status change");
        assert_eq!(registry_calls.load(Ordering::SeqCst), 1);
        assert_eq!(app_calls.load(Ordering::SeqCst), 0);
        assert!(rx.try_recv().is_err());

        session.publish(&change);
        assert_eq!(registry_calls.load(Ordering::SeqCst), 1);
        assert_eq!(app_calls.load(Ordering::SeqCst), 1);
        let received = rx.try_recv().unwrap();
        assert_eq!(received.session_id, change.session_id);
        assert_eq!(received.current.map(|s| s.code), Some(PartyStatusCode::Answered));
        assert_eq!(session.listener_count(), 2);
    }

    #[test]
    fn test_restore_does_not_signal() {
        let (session, _) = session_with(vec![party("p1", "101", "Proceeding")]);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        session.add_status_listener(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let mut data = session.data();
        data.parties[0].status.code = PartyStatusCode::Disconnected;
        session.restore(data);

        assert_eq!(session.status(), Some(PartyStatusCode::Disconnected));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_call_control_targets_my_party() {
        let (session, transport) = session_with(vec![party("p0", "999", "Answered"), party("p1", "101", "Answered")]);

        let held = session.hold().await.unwrap();
        assert_eq!(held.status.code, PartyStatusCode::Hold);

        let muted = session.mute().await.unwrap();
        assert!(muted.muted);

        session.transfer(&CallTarget::extension_number("102")).await.unwrap();
        session.drop_session().await.unwrap();

        let requests = transport.requests.lock();
        assert_eq!(requests[0].0, "POST");
        assert_eq!(requests[0].1, "/account/~/telephony/sessions/s1/parties/p1/hold");
        assert_eq!(requests[1].0, "PATCH");
        assert_eq!(requests[1].1, "/account/~/telephony/sessions/s1/parties/p1");
        assert_eq!(requests[1].2, json!({ "muted": true }));
        assert_eq!(requests[2].1, "/account/~/telephony/sessions/s1/parties/p1/transfer");
        assert_eq!(requests[2].2, json!({ "extensionNumber": "102" }));
        assert_eq!(requests[3].0, "DELETE");
        assert_eq!(requests[3].1, "/account/~/telephony/sessions/s1");
    }

    #[tokio::test]
    async fn test_call_control_requires_my_party() {
        let (session, transport) = session_with(vec![party("p0", "999", "Answered")]);
        let err = session.hold().await.unwrap_err();
        assert!(matches!(err, CallControlError::NoObservableParty { .. }));
        assert!(transport.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn test_transfer_rejects_empty_target() {
        let (session, _) = session_with(vec![party("p1", "101", "Answered")]);
        let err = session.transfer(&CallTarget::default()).await.unwrap_err();
        assert!(matches!(err, CallControlError::InvalidArgument { .. }));
    }
}
