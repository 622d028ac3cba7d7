//! # Error Types
//!
//! Errors raised while turning raw JSON into records.

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// A JSON value could not be read as the expected record.
#[derive(Debug, Error)]
pub enum RecordError {
    /// The field that should carry the record is absent.
    #[error("{kind}: no data")]
    Missing { kind: &'static str },

    /// The value has the wrong shape for the record.
    #[error("{kind}: {source}")]
    Malformed {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Decodes `value` as a record, naming the record kind in the error.
///
/// A JSON `null` counts as missing data.
pub fn decode_record<T: DeserializeOwned>(
    kind: &'static str,
    value: Option<Value>,
) -> Result<T, RecordError> {
    match value {
        None | Some(Value::Null) => Err(RecordError::Missing { kind }),
        Some(value) => {
            serde_json::from_value(value).map_err(|source| RecordError::Malformed { kind, source })
        }
    }
}
