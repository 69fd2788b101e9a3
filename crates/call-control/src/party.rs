//! Party model and normalization
//!
//! A party is one leg of a telephony session. The platform is loose about the
//! shape of party records (ids arrive as strings or numbers, the status block
//! may be missing on early events, ownership sits either on the party or under
//! `owner`). [`normalize_party`] turns any raw record into the canonical
//! [`Party`] used by the rest of the crate. It never fails.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{id_from_value, opt_string_or_number};

/// Status code of a party, as enumerated by the platform
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PartyStatusCode {
    Setup,
    Proceeding,
    Answered,
    Disconnected,
    Gone,
    Parked,
    Hold,
    VoiceMail,
    FaxReceive,
    VoiceMailScreening,
    /// A code this crate does not know about, kept verbatim
    Other(String),
}

impl PartyStatusCode {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Setup => "Setup",
            Self::Proceeding => "Proceeding",
            Self::Answered => "Answered",
            Self::Disconnected => "Disconnected",
            Self::Gone => "Gone",
            Self::Parked => "Parked",
            Self::Hold => "Hold",
            Self::VoiceMail => "VoiceMail",
            Self::FaxReceive => "FaxReceive",
            Self::VoiceMailScreening => "VoiceMailScreening",
            Self::Other(code) => code,
        }
    }
}

impl From<String> for PartyStatusCode {
    fn from(code: String) -> Self {
        match code.as_str() {
            "Setup" => Self::Setup,
            "Proceeding" => Self::Proceeding,
            "Answered" => Self::Answered,
            "Disconnected" => Self::Disconnected,
            "Gone" => Self::Gone,
            "Parked" => Self::Parked,
            "Hold" => Self::Hold,
            "VoiceMail" => Self::VoiceMail,
            "FaxReceive" => Self::FaxReceive,
            "VoiceMailScreening" => Self::VoiceMailScreening,
            _ => Self::Other(code),
        }
    }
}

impl From<&str> for PartyStatusCode {
    fn from(code: &str) -> Self {
        Self::from(code.to_string())
    }
}

impl From<PartyStatusCode> for String {
    fn from(code: PartyStatusCode) -> Self {
        code.as_str().to_string()
    }
}

impl Default for PartyStatusCode {
    fn default() -> Self {
        Self::Setup
    }
}

impl fmt::Display for PartyStatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status block of a party
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyStatus {
    #[serde(default)]
    pub code: PartyStatusCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PartyStatus {
    pub fn new(code: PartyStatusCode) -> Self {
        Self {
            code,
            ..Default::default()
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Call direction relative to the party's owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartyDirection {
    Inbound,
    Outbound,
}

/// One end of a leg (caller or callee)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number", skip_serializing_if = "Option::is_none")]
    pub extension_id: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number", skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Who owns a leg on the platform side
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyOwner {
    #[serde(default, deserialize_with = "opt_string_or_number", skip_serializing_if = "Option::is_none")]
    pub extension_id: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number", skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

/// Park orbit the leg was parked on
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParkInfo {
    #[serde(default, deserialize_with = "opt_string_or_number", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Which call-control actions the leg currently supports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyCapabilities {
    pub can_answer: bool,
    pub can_hold: bool,
    pub can_unhold: bool,
    pub can_mute: bool,
    pub can_transfer: bool,
    pub can_forward: bool,
    pub can_park: bool,
    pub can_flip: bool,
    pub can_to_voicemail: bool,
    pub can_ignore: bool,
    pub can_reply: bool,
}

impl PartyCapabilities {
    /// Derive the available actions from a leg's status and direction
    pub fn derive(code: &PartyStatusCode, direction: Option<PartyDirection>) -> Self {
        let connected = matches!(code, PartyStatusCode::Answered | PartyStatusCode::Hold);
        let ringing_inbound = matches!(code, PartyStatusCode::Setup | PartyStatusCode::Proceeding)
            && direction == Some(PartyDirection::Inbound);

        Self {
            can_answer: ringing_inbound,
            can_hold: *code == PartyStatusCode::Answered,
            can_unhold: *code == PartyStatusCode::Hold,
            can_mute: connected,
            can_transfer: connected,
            can_forward: ringing_inbound,
            can_park: connected,
            can_flip: *code == PartyStatusCode::Answered,
            can_to_voicemail: ringing_inbound,
            can_ignore: ringing_inbound,
            can_reply: ringing_inbound,
        }
    }
}

/// Canonical party record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub status: PartyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<PartyDirection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Participant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Participant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<PartyOwner>,
    /// Owning extension, lifted from `owner` when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension_id: Option<String>,
    /// Owning account, lifted from `owner` when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub stand_alone: bool,
    #[serde(default)]
    pub missed_call: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub park: Option<ParkInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conference_role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ring_out_role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ring_me_role: Option<String>,
    #[serde(default)]
    pub capabilities: PartyCapabilities,
    /// Fields this crate does not model, preserved verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Party {
    pub fn status_code(&self) -> &PartyStatusCode {
        &self.status.code
    }

    pub fn is_disconnected(&self) -> bool {
        self.status.code == PartyStatusCode::Disconnected
    }

    /// Whether this leg belongs to the given extension
    pub fn is_owned_by(&self, extension_id: &str, account_id: Option<&str>) -> bool {
        if self.extension_id.as_deref() != Some(extension_id) {
            return false;
        }
        match (account_id, self.account_id.as_deref()) {
            (Some(expected), Some(actual)) => expected == actual,
            _ => true,
        }
    }

    pub fn is_owned_by_account(&self, account_id: &str) -> bool {
        self.account_id.as_deref() == Some(account_id)
    }
}

fn take<T: serde::de::DeserializeOwned>(map: &mut Map<String, Value>, key: &str) -> Option<T> {
    map.remove(key)
        .filter(|v| !v.is_null())
        .and_then(|v| serde_json::from_value(v).ok())
}

fn take_id(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    map.remove(key).as_ref().and_then(id_from_value)
}

fn take_flag(map: &mut Map<String, Value>, key: &str) -> bool {
    map.remove(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

fn normalize_status(raw: Option<Value>) -> PartyStatus {
    let mut fields = match raw {
        Some(Value::Object(map)) => map,
        Some(Value::String(code)) => {
            return PartyStatus::new(PartyStatusCode::from(code));
        }
        _ => Map::new(),
    };

    let code = fields
        .remove("code")
        .and_then(|v| v.as_str().map(PartyStatusCode::from))
        .unwrap_or_default();

    PartyStatus {
        code,
        reason: take(&mut fields, "reason"),
        description: take(&mut fields, "description"),
        peer_id: fields.remove("peerId").filter(|v| !v.is_null()),
        extra: fields,
    }
}

/// Normalize a raw party record into a [`Party`]
///
/// Total: anything that is not an object becomes an empty party in `Setup`.
/// Known fields with an unusable shape are dropped, unknown fields land in
/// `extra` untouched.
pub fn normalize_party(raw: &Value) -> Party {
    let mut fields = raw.as_object().cloned().unwrap_or_default();

    let id = take_id(&mut fields, "id");
    let status = normalize_status(fields.remove("status"));
    let direction: Option<PartyDirection> = take(&mut fields, "direction");
    let owner: Option<PartyOwner> = take(&mut fields, "owner");
    let top_extension_id = take_id(&mut fields, "extensionId");
    let top_account_id = take_id(&mut fields, "accountId");

    let extension_id = owner
        .as_ref()
        .and_then(|o| o.extension_id.clone())
        .or(top_extension_id);
    let account_id = owner
        .as_ref()
        .and_then(|o| o.account_id.clone())
        .or(top_account_id);

    let capabilities = PartyCapabilities::derive(&status.code, direction);
    // derived on every pass, never trusted from the wire
    fields.remove("capabilities");

    Party {
        id,
        direction,
        from: take(&mut fields, "from"),
        to: take(&mut fields, "to"),
        owner,
        extension_id,
        account_id,
        muted: take_flag(&mut fields, "muted"),
        stand_alone: take_flag(&mut fields, "standAlone"),
        missed_call: take_flag(&mut fields, "missedCall"),
        park: take(&mut fields, "park"),
        conference_role: take(&mut fields, "conferenceRole"),
        ring_out_role: take(&mut fields, "ringOutRole"),
        ring_me_role: take(&mut fields, "ringMeRole"),
        capabilities,
        status,
        extra: fields,
    }
}

/// Normalize the `parties` array of a session payload
///
/// Returns `None` when the payload carries no `parties` field at all.
pub fn normalize_parties(raw: Option<&Value>) -> Option<Vec<Party>> {
    match raw {
        Some(Value::Array(items)) => Some(items.iter().map(normalize_party).collect()),
        Some(Value::Null) | None => None,
        Some(_) => Some(Vec::new()),
    }
}
