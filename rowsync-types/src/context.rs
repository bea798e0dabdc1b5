//! Session context round-tripped on every protocol step.

use crate::{ClientId, ParameterSet, SessionId, SyncStage, SyncType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// State shared between client and server for the lifetime of one session.
///
/// The client treats this as opaque: it sends what it last received and
/// replaces it wholesale with whatever the server returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    #[serde(rename = "id")]
    pub session_id: SessionId,
    #[serde(rename = "ci")]
    pub client_id: ClientId,
    #[serde(rename = "sn")]
    pub scope_name: String,
    #[serde(rename = "typ", default)]
    pub sync_type: SyncType,
    #[serde(rename = "stage", default)]
    pub stage: SyncStage,
    #[serde(rename = "ps", default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<ParameterSet>,
    #[serde(rename = "ap", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional_properties: BTreeMap<String, String>,
    #[serde(rename = "pp", default)]
    pub progress_percentage: f64,
}

impl SessionContext {
    /// Starts a new session for `client_id` on `scope_name`.
    pub fn new(client_id: ClientId, scope_name: impl Into<String>) -> Self {
        Self {
            session_id: SessionId::new(),
            client_id,
            scope_name: scope_name.into(),
            sync_type: SyncType::Normal,
            stage: SyncStage::None,
            parameters: None,
            additional_properties: BTreeMap::new(),
            progress_percentage: 0.0,
        }
    }

    /// Attaches scope filter parameters.
    pub fn with_parameters(mut self, parameters: ParameterSet) -> Self {
        self.parameters = Some(parameters);
        self
    }

    /// Sets the sync type.
    pub fn with_sync_type(mut self, sync_type: SyncType) -> Self {
        self.sync_type = sync_type;
        self
    }
}
