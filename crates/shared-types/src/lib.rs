//! # Shared Types Crate
//!
//! DeviceHive records exchanged with the server over both transports.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: JSON field names live here and nowhere else.
//! - **Sparse Encoding**: Empty optional fields are omitted on the wire, so a
//!   partially filled record (a command result, a device update) only carries
//!   what the caller set.
//! - **Lenient Decoding**: Servers send `null` for unset scalars; those decode
//!   to the field's default instead of failing the whole record.

pub mod entities;
pub mod errors;
pub mod messages;
pub mod timestamp;

pub use entities::*;
pub use errors::*;
pub use messages::*;
pub use timestamp::{format_timestamp, parse_timestamp, TIMESTAMP_FORMAT};

/// Serde helpers shared by the record definitions.
pub(crate) mod serde_util {
    use serde::{Deserialize, Deserializer};

    /// Decodes an explicit `null` as `T::default()`.
    pub fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: Default + Deserialize<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
    }

    pub fn is_zero(value: &u64) -> bool {
        *value == 0
    }

    pub fn is_false(value: &bool) -> bool {
        !*value
    }
}
