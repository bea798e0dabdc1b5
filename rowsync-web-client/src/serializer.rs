//! Pluggable body serializers and request integrity hashing.
//!
//! Serializers work on `serde_json::Value` so they stay object safe and can
//! be swapped at runtime. The same serializer decodes the response that
//! encoded the request; servers echo the format they were told about.

use crate::error::{SyncError, SyncResult};
use rowsync_types::sha256_base64;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;

/// Encodes and decodes protocol bodies.
pub trait Serializer: Send + Sync {
    /// Key announced to the server in the serialization-format header.
    fn key(&self) -> &str;

    /// Content type for request bodies, if the format has one.
    fn content_type(&self) -> Option<&str> {
        None
    }

    /// Encodes a value into body bytes.
    fn to_bytes(&self, value: &Value) -> SyncResult<Vec<u8>>;

    /// Decodes body bytes into a value.
    fn from_bytes(&self, bytes: &[u8]) -> SyncResult<Value>;
}

impl fmt::Debug for dyn Serializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Serializer").field("key", &self.key()).finish()
    }
}

/// Default JSON serializer.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl JsonSerializer {
    pub const KEY: &'static str = "json";
}

impl Serializer for JsonSerializer {
    fn key(&self) -> &str {
        Self::KEY
    }

    fn content_type(&self) -> Option<&str> {
        Some("application/json")
    }

    fn to_bytes(&self, value: &Value) -> SyncResult<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn from_bytes(&self, bytes: &[u8]) -> SyncResult<Value> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Converts a typed message into the serializer's interchange value.
pub fn to_value<T: Serialize + ?Sized>(message: &T) -> SyncResult<Value> {
    Ok(serde_json::to_value(message)?)
}

/// Decodes typed message bytes with `serializer`.
pub fn decode<T: DeserializeOwned>(serializer: &dyn Serializer, bytes: &[u8]) -> SyncResult<T> {
    serializer
        .from_bytes(bytes)
        .and_then(|value| Ok(serde_json::from_value(value)?))
        .map_err(|e| SyncError::Transport(format!("failed to decode response: {e}")))
}

/// Integrity hash sent in `dotmim-sync-hash`: base64(SHA-256(body)).
/// An empty body still hashes, so the header is always present.
#[must_use]
pub fn content_hash(body: &[u8]) -> String {
    sha256_base64(body)
}
