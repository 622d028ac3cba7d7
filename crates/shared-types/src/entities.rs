//! # Core Domain Entities
//!
//! Long-lived records managed by the server.
//!
//! ## Clusters
//!
//! - **Devices**: `Device`, `DeviceClass`, `Equipment`
//! - **Grouping**: `Network`
//! - **Server**: `ServerInfo`

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::serde_util::{is_false, is_zero, nullable};

// =============================================================================
// CLUSTER A: DEVICES
// =============================================================================

/// A unit that communicates with DeviceHive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Unique identifier, chosen by the device.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Display name.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Authentication key, required on every device-initiated call once set.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "String::is_empty")]
    pub key: String,
    /// Operation status. The server may flip it to "Offline" on inactivity.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "String::is_empty")]
    pub status: String,
    /// Arbitrary user data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<Network>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_class: Option<DeviceClass>,
}

impl Device {
    /// Creates an online device without a network.
    pub fn new(id: impl Into<String>, name: impl Into<String>, class: Option<DeviceClass>) -> Self {
        Self::with_network(id, name, class, None)
    }

    pub fn with_network(
        id: impl Into<String>,
        name: impl Into<String>,
        class: Option<DeviceClass>,
        network: Option<Network>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: "Online".to_string(),
            device_class: class,
            network,
            ..Self::default()
        }
    }

    /// Copy of this device without its identifier, as sent on registration.
    pub fn without_id(&self) -> Self {
        Self {
            id: String::new(),
            ..self.clone()
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Device{")?;
        if !self.id.is_empty() {
            write!(f, "ID:{:?}, ", self.id)?;
        }
        write!(f, "Name:{:?}", self.name)?;
        if !self.key.is_empty() {
            write!(f, ", Key:{:?}", self.key)?;
        }
        if !self.status.is_empty() {
            write!(f, ", Status:{:?}", self.status)?;
        }
        if let Some(data) = &self.data {
            write!(f, ", Data:{data}")?;
        }
        if let Some(network) = &self.network {
            write!(f, ", {network}")?;
        }
        if let Some(class) = &self.device_class {
            write!(f, ", {class}")?;
        }
        f.write_str("}")
    }
}

/// Meta-information shared by devices of one kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceClass {
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "is_zero")]
    pub id: u64,
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub version: String,
    /// Permanent classes are not modified by device registration.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "is_false")]
    pub is_permanent: bool,
    /// Inactivity timeout in seconds before the device goes "Offline".
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "is_zero")]
    pub offline_timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub equipment: Vec<Equipment>,
}

impl DeviceClass {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Self::default()
        }
    }

    pub fn add_equipment(&mut self, equipment: impl IntoIterator<Item = Equipment>) {
        self.equipment.extend(equipment);
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DeviceClass{")?;
        if self.id != 0 {
            write!(f, "ID:{}, ", self.id)?;
        }
        write!(f, "Name:{:?}", self.name)?;
        if !self.version.is_empty() {
            write!(f, ", Version:{:?}", self.version)?;
        }
        if self.is_permanent {
            f.write_str(", Permanent:true")?;
        }
        if self.offline_timeout != 0 {
            write!(f, ", OfflineTimeout:{}", self.offline_timeout)?;
        }
        if let Some(data) = &self.data {
            write!(f, ", Data:{data}")?;
        }
        if !self.equipment.is_empty() {
            f.write_str(", Equipment:[")?;
            for (i, eq) in self.equipment.iter().enumerate() {
                if i > 0 {
                    f.write_str(" ")?;
                }
                write!(f, "{eq}")?;
            }
            f.write_str("]")?;
        }
        f.write_str("}")
    }
}

/// A peripheral or sensor hosted on a device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Equipment {
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "is_zero")]
    pub id: u64,
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    /// Unique within a device class.
    #[serde(default, deserialize_with = "nullable")]
    pub code: String,
    /// Free-form capability description.
    #[serde(rename = "type", default, deserialize_with = "nullable")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Equipment {
    pub fn new(name: impl Into<String>, code: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
            kind: kind.into(),
            ..Self::default()
        }
    }
}

impl fmt::Display for Equipment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Equipment{")?;
        if self.id != 0 {
            write!(f, "ID:{}, ", self.id)?;
        }
        write!(
            f,
            "Name:{:?}, Code:{:?}, Type:{:?}",
            self.name, self.code, self.kind
        )?;
        if let Some(data) = &self.data {
            write!(f, ", Data:{data}")?;
        }
        f.write_str("}")
    }
}

// =============================================================================
// CLUSTER B: GROUPING
// =============================================================================

/// A custom set of devices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Network {
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "is_zero")]
    pub id: u64,
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    /// When set, devices must present it to register into the network.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "String::is_empty")]
    pub key: String,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl Network {
    pub fn new(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            ..Self::default()
        }
    }

    /// Copy of this network without its identifier, as sent on insert/update.
    pub fn without_id(&self) -> Self {
        Self {
            id: 0,
            ..self.clone()
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Network{")?;
        if self.id != 0 {
            write!(f, "ID:{}, ", self.id)?;
        }
        write!(f, "Name:{:?}", self.name)?;
        if !self.key.is_empty() {
            write!(f, ", Key:{:?}", self.key)?;
        }
        if !self.description.is_empty() {
            write!(f, ", Description:{:?}", self.description)?;
        }
        f.write_str("}")
    }
}

// =============================================================================
// CLUSTER C: SERVER
// =============================================================================

/// Server information returned by `server/info` and `GET /info`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    #[serde(rename = "apiVersion", default, deserialize_with = "nullable")]
    pub version: String,
    /// Current server time, UTC.
    #[serde(rename = "serverTimestamp", default, deserialize_with = "nullable")]
    pub timestamp: String,
    /// Alternative WebSocket URL, empty when talking WebSocket already.
    #[serde(
        rename = "webSocketServerUrl",
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "String::is_empty"
    )]
    pub websocket_url: String,
    /// Alternative REST URL, empty when talking REST already.
    #[serde(
        rename = "restServerUrl",
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "String::is_empty"
    )]
    pub rest_url: String,
}

impl fmt::Display for ServerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ServerInfo{{Version:{:?}, Timestamp:{:?}",
            self.version, self.timestamp
        )?;
        if !self.websocket_url.is_empty() {
            write!(f, ", WS:{:?}", self.websocket_url)?;
        }
        if !self.rest_url.is_empty() {
            write!(f, ", REST:{:?}", self.rest_url)?;
        }
        f.write_str("}")
    }
}
