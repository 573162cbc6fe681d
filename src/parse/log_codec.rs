//! Canonical JSON encoding for the persisted collections.
//!
//! Both processes read and write these payloads, so decoding is tolerant:
//! missing optional fields take their defaults, and a payload that does not
//! parse decodes to an empty collection instead of failing the reader.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::model::log::LogEntry;

/// Why a payload could not be decoded.
#[derive(Debug, thiserror::Error)]
#[error("malformed payload: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

/// Encode a collection as a compact JSON array.
pub fn encode<T: Serialize>(items: &[T]) -> Result<String, serde_json::Error> {
    serde_json::to_string(items)
}

/// Decode a JSON array, reporting malformed payloads.
///
/// Empty and whitespace-only payloads, and a bare `null`, are an empty
/// collection rather than an error.
pub fn try_decode<T: DeserializeOwned>(payload: &str) -> Result<Vec<T>, DecodeError> {
    if payload.trim().is_empty() {
        return Ok(Vec::new());
    }
    let items: Option<Vec<T>> = serde_json::from_str(payload)?;
    Ok(items.unwrap_or_default())
}

/// Decode a JSON array, substituting an empty collection for anything malformed.
pub fn decode<T: DeserializeOwned>(payload: &str) -> Vec<T> {
    match try_decode(payload) {
        Ok(items) => items,
        Err(e) => {
            tracing::warn!(error = %e, "discarding undecodable payload");
            Vec::new()
        }
    }
}

pub fn encode_logs(logs: &[LogEntry]) -> Result<String, serde_json::Error> {
    encode(logs)
}

pub fn decode_logs(payload: &str) -> Vec<LogEntry> {
    decode(payload)
}
