//! WebSocket message envelope.
//!
//! Every frame in either direction is one JSON object with an `action`.
//! Requests and their responses also carry `requestId`; server pushes carry
//! `deviceGuid` and the pushed record instead.

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use shared_types::{decode_record, Device};

use crate::domain::error::{ClientError, ClientResult, RemoteError};

/// Status value of a successful response.
pub const STATUS_SUCCESS: &str = "success";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(default)]
    pub action: String,
    #[serde(
        default,
        deserialize_with = "lenient_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub request_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_guid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_code", skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Everything else: request arguments or response records
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl Envelope {
    pub fn request(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..Self::default()
        }
    }

    /// Adds a body field.
    pub fn with(mut self, key: &str, value: impl Serialize) -> ClientResult<Self> {
        let value = serde_json::to_value(value)
            .map_err(|e| ClientError::TransmitFailed(format!("failed to encode {key}: {e}")))?;
        self.body.insert(key.to_string(), value);
        Ok(self)
    }

    pub fn with_device_guid(mut self, device_id: &str) -> Self {
        self.device_guid = Some(device_id.to_string());
        self
    }

    /// Adds per-message device credentials when the device has them.
    pub fn with_device_auth(mut self, device: &Device) -> Self {
        if !device.id.is_empty() {
            self.body
                .insert("deviceId".into(), Value::String(device.id.clone()));
        }
        if !device.key.is_empty() {
            self.body
                .insert("deviceKey".into(), Value::String(device.key.clone()));
        }
        self
    }

    pub fn encode(&self) -> ClientResult<String> {
        serde_json::to_string(self).map_err(|e| ClientError::TransmitFailed(e.to_string()))
    }

    pub fn decode(frame: &str) -> ClientResult<Self> {
        serde_json::from_str(frame).map_err(|e| ClientError::MalformedResponse(e.to_string()))
    }

    /// Turns a non-success response into [`ClientError::Transport`].
    pub fn into_result(self) -> ClientResult<Self> {
        let ok = self
            .status
            .as_deref()
            .is_some_and(|status| status.eq_ignore_ascii_case(STATUS_SUCCESS));
        if ok {
            return Ok(self);
        }
        let status = self.status.unwrap_or_default();
        let detail = self.error.unwrap_or_default();
        Err(ClientError::Transport(RemoteError {
            status: None,
            code: self.code,
            message: if detail.is_empty() {
                format!("unexpected status {status:?}")
            } else {
                detail
            },
        }))
    }

    /// Removes and decodes the record stored under `field`.
    pub fn take_record<T: DeserializeOwned>(&mut self, kind: &'static str, field: &str) -> ClientResult<T> {
        Ok(decode_record(kind, self.body.remove(field))?)
    }
}

/// Unsolicited frame kinds the server pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushEvent {
    CommandInsert,
    CommandUpdate,
    NotificationInsert,
    Unknown,
}

impl PushEvent {
    pub fn from_action(action: &str) -> Self {
        match action {
            "command/insert" => Self::CommandInsert,
            "command/update" => Self::CommandUpdate,
            "notification/insert" => Self::NotificationInsert,
            _ => Self::Unknown,
        }
    }
}

fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("bad requestId {n}"))),
        Some(Value::String(s)) => s
            .parse()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("bad requestId {s:?}"))),
        Some(other) => Err(de::Error::custom(format!("bad requestId {other}"))),
    }
}

fn lenient_code<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    })
}
