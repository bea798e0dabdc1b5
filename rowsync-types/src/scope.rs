//! Scope and schema descriptors exchanged during negotiation.

use crate::parameter::default_scope_hash;
use crate::{ClientId, ParameterSet};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A column in a synced table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncColumn {
    #[serde(rename = "n")]
    pub name: String,
    #[serde(rename = "dt", default)]
    pub data_type: String,
    #[serde(rename = "an", default)]
    pub allow_null: bool,
}

/// A synced table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTable {
    #[serde(rename = "n")]
    pub name: String,
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
    #[serde(rename = "c", default)]
    pub columns: Vec<SyncColumn>,
    #[serde(rename = "pk", default)]
    pub primary_keys: Vec<String>,
}

/// Schema descriptor of a scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSet {
    #[serde(rename = "t", default)]
    pub tables: Vec<SyncTable>,
}

impl SyncSet {
    /// Looks up a table by name.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&SyncTable> {
        self.tables.iter().find(|t| t.name == name)
    }

    #[must_use]
    pub fn has_tables(&self) -> bool {
        !self.tables.is_empty()
    }
}

/// Server-side description of a scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeInfo {
    #[serde(rename = "n")]
    pub name: String,
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<SyncSet>,
    #[serde(rename = "v", default)]
    pub version: String,
    #[serde(rename = "lct", default, skip_serializing_if = "Option::is_none")]
    pub last_cleanup_timestamp: Option<i64>,
}

/// Client-side record of a (possibly filtered) scope subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeInfoClient {
    #[serde(rename = "id")]
    pub id: ClientId,
    #[serde(rename = "n")]
    pub name: String,
    /// Filter identity: the parameter hash, or the default scope hash.
    #[serde(rename = "h")]
    pub hash: String,
    #[serde(rename = "p", default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<ParameterSet>,
    #[serde(rename = "in", default)]
    pub is_new_scope: bool,
    #[serde(rename = "lsd", default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
    #[serde(rename = "lsst", default, skip_serializing_if = "Option::is_none")]
    pub last_server_sync_timestamp: Option<i64>,
    #[serde(rename = "lst", default, skip_serializing_if = "Option::is_none")]
    pub last_sync_timestamp: Option<i64>,
    #[serde(rename = "lsdur", default)]
    pub last_sync_duration_ms: u64,
}

impl ScopeInfoClient {
    /// Creates a fresh subscription record. The hash is derived from
    /// `parameters` when present and non-empty.
    pub fn new(id: ClientId, name: impl Into<String>, parameters: Option<ParameterSet>) -> Self {
        let hash = match &parameters {
            Some(p) if !p.is_empty() => p.hash(),
            _ => default_scope_hash().to_string(),
        };
        Self {
            id,
            name: name.into(),
            hash,
            parameters,
            is_new_scope: true,
            last_sync: None,
            last_server_sync_timestamp: None,
            last_sync_timestamp: None,
            last_sync_duration_ms: 0,
        }
    }
}

/// Scope shape used by servers predating the split between `ScopeInfo` and
/// `ScopeInfoClient`. Still sent on upload so those servers keep working.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OldScopeInfo {
    #[serde(rename = "id")]
    pub id: ClientId,
    #[serde(rename = "n")]
    pub name: String,
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<SyncSet>,
    #[serde(rename = "v", default)]
    pub version: String,
    #[serde(rename = "lsd", default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
    #[serde(rename = "lsst", default, skip_serializing_if = "Option::is_none")]
    pub last_server_sync_timestamp: Option<i64>,
    #[serde(rename = "lst", default, skip_serializing_if = "Option::is_none")]
    pub last_sync_timestamp: Option<i64>,
    #[serde(rename = "in", default)]
    pub is_new_scope: bool,
}

impl OldScopeInfo {
    /// Projects the current scope pair onto the legacy shape.
    #[must_use]
    pub fn from_scopes(scope: &ScopeInfo, client: &ScopeInfoClient) -> Self {
        Self {
            id: client.id,
            name: client.name.clone(),
            schema: scope.schema.clone(),
            version: scope.version.clone(),
            last_sync: client.last_sync,
            last_server_sync_timestamp: client.last_server_sync_timestamp,
            last_sync_timestamp: client.last_sync_timestamp,
            is_new_scope: client.is_new_scope,
        }
    }
}
