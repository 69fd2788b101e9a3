//! Platform data shapes consumed by the registry
//!
//! These mirror the camelCase JSON the telephony platform returns. Only the
//! fields the registry actually reads are typed; everything else rides along
//! in the flattened `extra` maps so nothing is lost on a snapshot round trip.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Read an identifier that the platform may send as a JSON string or number
pub(crate) fn id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    id_from_value(&value).ok_or_else(|| serde::de::Error::custom("expected a string or numeric id"))
}

pub(crate) fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(id_from_value))
}

// ===== IDENTITY =====

/// Account reference embedded in an extension record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRef {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The extension the registry acts on behalf of
///
/// Resolved once at bootstrap (or supplied through the config) and stamped on
/// every session the registry produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Extension {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub account: AccountRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub extension_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Extension {
    /// Minimal identity, handy when the caller already knows both ids
    pub fn new(extension_id: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            id: extension_id.into(),
            account: AccountRef {
                id: account_id.into(),
                extra: Map::new(),
            },
            extension_number: None,
            name: None,
            status: None,
            extension_type: None,
            extra: Map::new(),
        }
    }

    pub fn account_id(&self) -> &str {
        &self.account.id
    }
}

// ===== DEVICES =====

/// Kind of device registered to the extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceType {
    SoftPhone,
    OtherPhone,
    HardPhone,
    #[serde(other)]
    Unknown,
}

/// Registration status of a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceStatus {
    Initial,
    Offline,
    Online,
    #[serde(other)]
    Unknown,
}

/// One entry of the extension's device inventory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub device_type: Option<DeviceType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DeviceStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_pooling: Option<String>,
    #[serde(default)]
    pub use_as_common_phone: bool,
    #[serde(default)]
    pub in_company_net: bool,
    #[serde(default)]
    pub phone_lines: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Device {
    pub fn is_online(&self) -> bool {
        self.status == Some(DeviceStatus::Online)
    }
}

// ===== PRESENCE =====

/// An active call as listed in a presence record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveCall {
    #[serde(default, deserialize_with = "opt_string_or_number", skip_serializing_if = "Option::is_none")]
    pub telephony_session_id: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telephony_status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Presence record for a single extension
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PresenceRecord {
    #[serde(default)]
    pub active_calls: Option<Vec<ActiveCall>>,
}

/// Account-wide presence listing
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct PresenceList {
    #[serde(default)]
    pub records: Vec<PresenceRecord>,
}

// ===== NOTIFICATIONS =====

/// One already-parsed message from the notification feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
    /// Topic the message was published on
    pub event: String,
    /// Raw event body
    #[serde(default)]
    pub body: Value,
}

impl NotificationMessage {
    pub fn new(event: impl Into<String>, body: Value) -> Self {
        Self {
            event: event.into(),
            body,
        }
    }
}

// ===== CALL TARGETS =====

/// Destination of a call-out, transfer or forward
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voicemail: Option<String>,
}

impl CallTarget {
    pub fn phone_number(number: impl Into<String>) -> Self {
        Self {
            phone_number: Some(number.into()),
            ..Default::default()
        }
    }

    pub fn extension_number(number: impl Into<String>) -> Self {
        Self {
            extension_number: Some(number.into()),
            ..Default::default()
        }
    }

    /// Target an extension's voicemail box
    pub fn voicemail(extension_id: impl Into<String>) -> Self {
        Self {
            voicemail: Some(extension_id.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.phone_number.is_none() && self.extension_number.is_none() && self.voicemail.is_none()
    }
}
