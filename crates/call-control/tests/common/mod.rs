// Shared fixtures for the call-control integration tests
//
// MockTransport answers from a route table keyed by "METHOD path". Unrouted
// requests fail with HTTP 404 so a missing fixture shows up as a fetch error.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{json, Value};

use rvoip_call_control::{
    CallControl, CallControlBuilder, CallControlError, CallControlResult, Extension, NotificationMessage,
    PlatformTransport,
};

pub const EXTENSION_ID: &str = "101";
pub const ACCOUNT_ID: &str = "9001";
pub const SESSION_TOPIC: &str = "/restapi/v1.0/account/~/extension/~/telephony/sessions";

pub const EXTENSION_PATH: &str = "/account/~/extension/~";
pub const EXTENSION_PRESENCE_PATH: &str = "/account/~/extension/~/presence?detailedTelephonyState=true&sipData=true";
pub const ACCOUNT_PRESENCE_PATH: &str = "/account/~/presence?detailedTelephonyState=true&sipData=true";
pub const DEVICES_PATH: &str = "/account/~/extension/~/device";

/// One recorded request
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub path: String,
    pub body: Option<Value>,
}

#[derive(Default)]
pub struct MockTransport {
    routes: DashMap<String, Result<Value, u16>>,
    hits: DashMap<String, usize>,
    requests: Mutex<Vec<RecordedRequest>>,
    delay: Mutex<Option<Duration>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on_get(&self, path: &str, response: Value) {
        self.routes.insert(format!("GET {}", path), Ok(response));
    }

    pub fn on_post(&self, path: &str, response: Value) {
        self.routes.insert(format!("POST {}", path), Ok(response));
    }

    pub fn fail_get(&self, path: &str, status: u16) {
        self.routes.insert(format!("GET {}", path), Err(status));
    }

    pub fn fail_post(&self, path: &str, status: u16) {
        self.routes.insert(format!("POST {}", path), Err(status));
    }

    /// Delay every response, to keep a bootstrap in flight
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn hits(&self, method: &str, path: &str) -> usize {
        self.hits.get(&format!("{} {}", method, path)).map(|n| *n).unwrap_or(0)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    async fn respond(&self, method: &'static str, path: &str, body: Option<Value>) -> CallControlResult<Value> {
        let key = format!("{} {}", method, path);
        *self.hits.entry(key.clone()).or_insert(0) += 1;
        self.requests.lock().push(RecordedRequest {
            method,
            path: path.to_string(),
            body,
        });

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let route = self.routes.get(&key).map(|r| r.value().clone());
        match route {
            Some(Ok(value)) => Ok(value),
            Some(Err(status)) => Err(CallControlError::HttpStatus {
                status,
                body: "mock failure".to_string(),
            }),
            None => Err(CallControlError::HttpStatus {
                status: 404,
                body: format!("no route for {}", key),
            }),
        }
    }
}

#[async_trait]
impl PlatformTransport for MockTransport {
    async fn get(&self, path: &str) -> CallControlResult<Value> {
        self.respond("GET", path, None).await
    }

    async fn post(&self, path: &str, body: Value) -> CallControlResult<Value> {
        self.respond("POST", path, Some(body)).await
    }

    async fn patch(&self, path: &str, body: Value) -> CallControlResult<Value> {
        self.respond("PATCH", path, Some(body)).await
    }

    async fn delete(&self, path: &str) -> CallControlResult<Value> {
        self.respond("DELETE", path, None).await
    }
}

// ===== FIXTURES =====

pub fn extension() -> Extension {
    Extension::new(EXTENSION_ID, ACCOUNT_ID)
}

pub fn extension_json() -> Value {
    json!({
        "id": 101,
        "extensionNumber": "101",
        "name": "Front Desk",
        "account": { "id": "9001" },
    })
}

/// Registry acting for extension 101 with nothing preloaded
pub fn registry(transport: Arc<MockTransport>) -> CallControl {
    CallControlBuilder::new()
        .transport(transport)
        .extension_info(extension())
        .preload_sessions(false)
        .preload_devices(false)
        .build()
        .expect("registry")
}

/// A leg owned by the test extension
pub fn my_party(party_id: &str, code: &str) -> Value {
    json!({
        "id": party_id,
        "status": { "code": code },
        "direction": "Inbound",
        "owner": { "extensionId": EXTENSION_ID, "accountId": ACCOUNT_ID },
    })
}

pub fn my_party_with_reason(party_id: &str, code: &str, reason: &str) -> Value {
    json!({
        "id": party_id,
        "status": { "code": code, "reason": reason },
        "direction": "Inbound",
        "owner": { "extensionId": EXTENSION_ID, "accountId": ACCOUNT_ID },
    })
}

/// A leg owned by some other extension
pub fn other_party(party_id: &str, code: &str) -> Value {
    json!({
        "id": party_id,
        "status": { "code": code },
        "direction": "Outbound",
        "owner": { "extensionId": "202", "accountId": ACCOUNT_ID },
    })
}

/// An outside party with no owner at all
pub fn external_party(party_id: &str, code: &str) -> Value {
    json!({
        "id": party_id,
        "status": { "code": code },
        "from": { "phoneNumber": "+15551230000" },
    })
}

pub fn session_event(session_id: &str, parties: Vec<Value>) -> NotificationMessage {
    NotificationMessage::new(
        SESSION_TOPIC,
        json!({
            "telephonySessionId": session_id,
            "sessionId": format!("legacy-{}", session_id),
            "eventTime": "2026-10-18T10:00:00.000Z",
            "serverId": "10.13.22.253.TAM",
            "parties": parties,
        }),
    )
}

pub fn session_resource(session_id: &str, parties: Vec<Value>) -> Value {
    json!({
        "id": session_id,
        "serverId": "10.13.22.253.TAM",
        "creationTime": "2026-10-18T09:59:58.000Z",
        "origin": { "type": "Call" },
        "parties": parties,
    })
}

pub fn presence(session_ids: &[&str]) -> Value {
    let calls: Vec<Value> = session_ids
        .iter()
        .map(|id| json!({ "id": format!("call-{}", id), "telephonySessionId": id, "direction": "Inbound" }))
        .collect();
    json!({ "activeCalls": calls })
}
