//! # Messages
//!
//! Short-lived records flowing between devices and clients. Both carry a
//! server-assigned timestamp that subscriptions use as their cursor.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::serde_util::{is_zero, nullable};

/// Records that carry a server timestamp.
pub trait Timestamped {
    /// The server timestamp, empty when the record has not been stored yet.
    fn timestamp(&self) -> &str;
}

/// A set of data sent from DeviceHive to a device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    /// Server-assigned identifier.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "is_zero")]
    pub id: u64,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "String::is_empty")]
    pub timestamp: String,
    /// Originating user.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "is_zero")]
    pub user_id: u64,
    #[serde(
        rename = "command",
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "String::is_empty"
    )]
    pub name: String,
    /// Seconds until the command expires. Zero means no expiry.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "is_zero")]
    pub lifetime: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    /// Status reported by the device.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "String::is_empty")]
    pub status: String,
    /// Execution result reported by the device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl Command {
    /// Creates a command without lifetime.
    pub fn new(name: impl Into<String>, parameters: Option<Value>) -> Self {
        Self {
            name: name.into(),
            parameters,
            ..Self::default()
        }
    }

    /// Creates the device's answer to command `id`.
    pub fn result(id: u64, status: impl Into<String>, result: Option<Value>) -> Self {
        Self {
            id,
            status: status.into(),
            result,
            ..Self::default()
        }
    }

    /// Fields a client may set when inserting a command.
    pub fn insert_body(&self) -> Self {
        Self {
            name: self.name.clone(),
            parameters: self.parameters.clone(),
            lifetime: self.lifetime,
            ..Self::default()
        }
    }

    /// Fields a device may set when reporting back on a command.
    pub fn update_body(&self) -> Self {
        Self {
            status: self.status.clone(),
            result: self.result.clone(),
            ..Self::default()
        }
    }

    /// Copy without the identifier.
    pub fn without_id(&self) -> Self {
        Self {
            id: 0,
            ..self.clone()
        }
    }

    /// Overlays the fields `other` actually carries, as when the server
    /// answers an insert with only the fields it assigned.
    pub fn merge(&mut self, other: Command) {
        if other.id != 0 {
            self.id = other.id;
        }
        if !other.timestamp.is_empty() {
            self.timestamp = other.timestamp;
        }
        if other.user_id != 0 {
            self.user_id = other.user_id;
        }
        if !other.name.is_empty() {
            self.name = other.name;
        }
        if other.lifetime != 0 {
            self.lifetime = other.lifetime;
        }
        if other.parameters.is_some() {
            self.parameters = other.parameters;
        }
        if !other.status.is_empty() {
            self.status = other.status;
        }
        if other.result.is_some() {
            self.result = other.result;
        }
    }
}

impl Timestamped for Command {
    fn timestamp(&self) -> &str {
        &self.timestamp
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Command{")?;
        if self.id != 0 {
            write!(f, "Id:{}, ", self.id)?;
        }
        write!(f, "Name:{:?}", self.name)?;
        if !self.timestamp.is_empty() {
            write!(f, ", Timestamp:{:?}", self.timestamp)?;
        }
        if self.user_id != 0 {
            write!(f, ", UserId:{}", self.user_id)?;
        }
        if self.lifetime != 0 {
            write!(f, ", Lifetime:{}", self.lifetime)?;
        }
        if let Some(params) = &self.parameters {
            write!(f, ", Parameters:{params}")?;
        }
        if !self.status.is_empty() {
            write!(f, ", Status:{:?}", self.status)?;
        }
        if let Some(result) = &self.result {
            write!(f, ", Result:{result}")?;
        }
        f.write_str("}")
    }
}

/// A set of data sent from a device to DeviceHive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "is_zero")]
    pub id: u64,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "String::is_empty")]
    pub timestamp: String,
    #[serde(
        rename = "notification",
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "String::is_empty"
    )]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

impl Notification {
    pub fn new(name: impl Into<String>, parameters: Option<Value>) -> Self {
        Self {
            name: name.into(),
            parameters,
            ..Self::default()
        }
    }

    /// Fields a device may set when inserting a notification.
    pub fn insert_body(&self) -> Self {
        Self::new(self.name.clone(), self.parameters.clone())
    }

    /// Overlays the fields `other` actually carries.
    pub fn merge(&mut self, other: Notification) {
        if other.id != 0 {
            self.id = other.id;
        }
        if !other.timestamp.is_empty() {
            self.timestamp = other.timestamp;
        }
        if !other.name.is_empty() {
            self.name = other.name;
        }
        if other.parameters.is_some() {
            self.parameters = other.parameters;
        }
    }
}

impl Timestamped for Notification {
    fn timestamp(&self) -> &str {
        &self.timestamp
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Notification{")?;
        if self.id != 0 {
            write!(f, "Id:{}, ", self.id)?;
        }
        write!(f, "Name:{:?}", self.name)?;
        if !self.timestamp.is_empty() {
            write!(f, ", Timestamp:{:?}", self.timestamp)?;
        }
        if let Some(params) = &self.parameters {
            write!(f, ", Parameters:{params}")?;
        }
        f.write_str("}")
    }
}
