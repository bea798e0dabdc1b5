//! Protocol envelopes and wire constants.
//!
//! Each step sends one request envelope and receives one response envelope.
//! Every envelope carries the [`SessionContext`] under `sc`. Field names and
//! their declaration order are the wire contract: positional serializers rely
//! on the order, so fields must never be renamed or reordered.

use crate::step::HttpStep;
use chrono::{DateTime, Utc};
use rowsync_types::{
    BatchInfo, ConflictResolutionPolicy, ContainerSet, DatabaseChangesApplied,
    DatabaseChangesSelected, OldScopeInfo, ScopeInfo, ScopeInfoClient, SessionContext,
    SyncOperation, SyncSet,
};
use serde::{Deserialize, Serialize};

/// Protocol version announced on every request.
pub const PROTOCOL_VERSION: &str = "1.3.0";

/// Header names used by the protocol.
pub mod headers {
    pub const SESSION_ID: &str = "dotmim-sync-session-id";
    pub const SCOPE_ID: &str = "dotmim-sync-scope-id";
    pub const SCOPE_NAME: &str = "dotmim-sync-scope-name";
    pub const STEP: &str = "dotmim-sync-step";
    pub const SERIALIZATION_FORMAT: &str = "dotmim-sync-serialization-format";
    pub const VERSION: &str = "dotmim-sync-version";
    pub const IDENTIFIER: &str = "dotmim-sync-identifier";
    pub const CONVERTER: &str = "dotmim-sync-converter";
    pub const HASH: &str = "dotmim-sync-hash";
    /// Marks a response body as a structured JSON error.
    pub const ERROR: &str = "dotmim-sync-error";
}

/// Serializer description sent in `dotmim-sync-serialization-format`.
/// Always JSON-encoded so the server can read it before decoding the body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializerInfo {
    pub serializer_key: String,
    pub batch_size: usize,
}

/// Anything that carries a session context.
pub trait ScopeMessage {
    /// Returns the session context.
    fn context(&self) -> &SessionContext;

    /// Consumes the message, returning its session context.
    fn into_context(self) -> SessionContext
    where
        Self: Sized;
}

/// Wire field names of an envelope, in ordinal order.
pub trait WireFields {
    const FIELDS: &'static [&'static str];
}

macro_rules! envelope {
    ($ty:ident, [$($field:literal),+ $(,)?]) => {
        impl ScopeMessage for $ty {
            fn context(&self) -> &SessionContext {
                &self.sync_context
            }

            fn into_context(self) -> SessionContext {
                self.sync_context
            }
        }

        impl WireFields for $ty {
            const FIELDS: &'static [&'static str] = &[$($field),+];
        }
    };
}

/// Request for `EnsureScopes` and `EnsureSchema`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsureScopesRequest {
    #[serde(rename = "sc")]
    pub sync_context: SessionContext,
}

impl EnsureScopesRequest {
    pub fn new(sync_context: SessionContext) -> Self {
        Self { sync_context }
    }
}

envelope!(EnsureScopesRequest, ["sc"]);

/// Server scope returned by `EnsureScopes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsureScopesResponse {
    #[serde(rename = "sc")]
    pub sync_context: SessionContext,
    #[serde(rename = "serverscope")]
    pub server_scope_info: ScopeInfo,
}

envelope!(EnsureScopesResponse, ["sc", "serverscope"]);

/// Server scope and schema returned by `EnsureSchema`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsureSchemaResponse {
    #[serde(rename = "sc")]
    pub sync_context: SessionContext,
    #[serde(rename = "schema")]
    pub schema: SyncSet,
    #[serde(rename = "ssi")]
    pub server_scope_info: ScopeInfo,
}

envelope!(EnsureSchemaResponse, ["sc", "schema", "ssi"]);

/// Asks the server which operation the client should perform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRequest {
    #[serde(rename = "sc")]
    pub sync_context: SessionContext,
    #[serde(rename = "scope")]
    pub scope_info_from_client: Option<ScopeInfo>,
    #[serde(rename = "scopeclient")]
    pub scope_info_client: Option<ScopeInfoClient>,
}

envelope!(OperationRequest, ["sc", "scope", "scopeclient"]);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResponse {
    #[serde(rename = "sc")]
    pub sync_context: SessionContext,
    #[serde(rename = "so")]
    pub sync_operation: SyncOperation,
}

envelope!(OperationResponse, ["sc", "so"]);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteTimestampRequest {
    #[serde(rename = "sc")]
    pub sync_context: SessionContext,
}

impl RemoteTimestampRequest {
    pub fn new(sync_context: SessionContext) -> Self {
        Self { sync_context }
    }
}

envelope!(RemoteTimestampRequest, ["sc"]);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteTimestampResponse {
    #[serde(rename = "sc")]
    pub sync_context: SessionContext,
    #[serde(rename = "rct")]
    pub remote_client_timestamp: i64,
}

envelope!(RemoteTimestampResponse, ["sc", "rct"]);

/// One upload batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendChangesRequest {
    #[serde(rename = "sc")]
    pub sync_context: SessionContext,
    #[serde(rename = "scopeclient", default)]
    pub scope_info_client: Option<ScopeInfoClient>,
    #[serde(rename = "bi")]
    pub batch_index: u32,
    #[serde(rename = "bc", default)]
    pub batch_count: u32,
    #[serde(rename = "islb")]
    pub is_last_batch: bool,
    #[serde(rename = "changes")]
    pub changes: ContainerSet,
    #[serde(rename = "clst", default)]
    pub client_last_sync_timestamp: Option<i64>,
    /// Legacy scope shape for servers that predate `scopeclient`.
    #[serde(rename = "scope", default)]
    pub old_scope_info: Option<OldScopeInfo>,
}

impl SendChangesRequest {
    /// An empty, final batch: what is sent when there is nothing to upload.
    pub fn new(sync_context: SessionContext, scope_info_client: Option<ScopeInfoClient>) -> Self {
        Self {
            sync_context,
            scope_info_client,
            batch_index: 0,
            batch_count: 0,
            is_last_batch: true,
            changes: ContainerSet::new(),
            client_last_sync_timestamp: None,
            old_scope_info: None,
        }
    }
}

envelope!(
    SendChangesRequest,
    ["sc", "scopeclient", "bi", "bc", "islb", "changes", "clst", "scope"]
);

/// One download batch, also the reply to each upload batch.
///
/// `ss` precedes `sc` here; the order is kept as deployed servers emit it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendChangesResponse {
    #[serde(rename = "ss")]
    pub server_step: HttpStep,
    #[serde(rename = "sc")]
    pub sync_context: SessionContext,
    #[serde(rename = "bi")]
    pub batch_index: u32,
    #[serde(rename = "bc", default)]
    pub batch_count: u32,
    #[serde(rename = "islb")]
    pub is_last_batch: bool,
    #[serde(rename = "rct")]
    pub remote_client_timestamp: i64,
    #[serde(rename = "changes", default)]
    pub changes: ContainerSet,
    #[serde(rename = "scs", default)]
    pub server_changes_selected: DatabaseChangesSelected,
    #[serde(rename = "cca", default)]
    pub client_changes_applied: DatabaseChangesApplied,
    #[serde(rename = "policy", default)]
    pub conflict_resolution_policy: ConflictResolutionPolicy,
}

envelope!(
    SendChangesResponse,
    ["ss", "sc", "bi", "bc", "islb", "rct", "changes", "scs", "cca", "policy"]
);

/// Requests one download batch by index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetMoreChangesRequest {
    #[serde(rename = "sc")]
    pub sync_context: SessionContext,
    #[serde(rename = "bireq")]
    pub batch_index_requested: u32,
}

impl GetMoreChangesRequest {
    pub fn new(sync_context: SessionContext, batch_index_requested: u32) -> Self {
        Self {
            sync_context,
            batch_index_requested,
        }
    }
}

envelope!(GetMoreChangesRequest, ["sc", "bireq"]);

/// Summary of what the server prepared for this session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryResponse {
    #[serde(rename = "sc")]
    pub sync_context: SessionContext,
    #[serde(rename = "bi", default, skip_serializing_if = "Option::is_none")]
    pub batch_info: Option<BatchInfo>,
    #[serde(rename = "rct", default)]
    pub remote_client_timestamp: i64,
    #[serde(rename = "step")]
    pub step: HttpStep,
    #[serde(rename = "changes", default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<ContainerSet>,
    #[serde(rename = "scs", default, skip_serializing_if = "Option::is_none")]
    pub server_changes_selected: Option<DatabaseChangesSelected>,
    #[serde(rename = "cca", default, skip_serializing_if = "Option::is_none")]
    pub client_changes_applied: Option<DatabaseChangesApplied>,
    #[serde(rename = "crp", default, skip_serializing_if = "Option::is_none")]
    pub conflict_resolution_policy: Option<ConflictResolutionPolicy>,
}

envelope!(
    SummaryResponse,
    ["sc", "bi", "rct", "step", "changes", "scs", "cca", "crp"]
);

/// Final report sent when the session completes (or fails).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndSessionRequest {
    #[serde(rename = "sc")]
    pub sync_context: SessionContext,
    #[serde(rename = "st")]
    pub start_time: DateTime<Utc>,
    #[serde(rename = "ct")]
    pub complete_time: DateTime<Utc>,
    #[serde(rename = "cas", default, skip_serializing_if = "Option::is_none")]
    pub changes_applied_on_server: Option<DatabaseChangesApplied>,
    #[serde(rename = "cac", default, skip_serializing_if = "Option::is_none")]
    pub changes_applied_on_client: Option<DatabaseChangesApplied>,
    #[serde(rename = "scac", default, skip_serializing_if = "Option::is_none")]
    pub snapshot_changes_applied_on_client: Option<DatabaseChangesApplied>,
    #[serde(rename = "ccs", default, skip_serializing_if = "Option::is_none")]
    pub client_changes_selected: Option<DatabaseChangesSelected>,
    #[serde(rename = "scs", default, skip_serializing_if = "Option::is_none")]
    pub server_changes_selected: Option<DatabaseChangesSelected>,
    #[serde(rename = "exc", default, skip_serializing_if = "Option::is_none")]
    pub sync_exception_message: Option<String>,
}

impl EndSessionRequest {
    pub fn new(sync_context: SessionContext, start_time: DateTime<Utc>) -> Self {
        Self {
            sync_context,
            start_time,
            complete_time: Utc::now(),
            changes_applied_on_server: None,
            changes_applied_on_client: None,
            snapshot_changes_applied_on_client: None,
            client_changes_selected: None,
            server_changes_selected: None,
            sync_exception_message: None,
        }
    }
}

envelope!(
    EndSessionRequest,
    ["sc", "st", "ct", "cas", "cac", "scac", "ccs", "scs", "exc"]
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndSessionResponse {
    #[serde(rename = "sc")]
    pub sync_context: SessionContext,
}

envelope!(EndSessionResponse, ["sc"]);

/// Any request envelope the client can send.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Envelope {
    EnsureScopes(EnsureScopesRequest),
    Operation(OperationRequest),
    RemoteTimestamp(RemoteTimestampRequest),
    SendChanges(SendChangesRequest),
    GetMoreChanges(GetMoreChangesRequest),
    EndSession(EndSessionRequest),
}

impl Envelope {
    /// The step this envelope is normally sent with.
    ///
    /// `EnsureScopes` envelopes are also valid for `EnsureSchema` and
    /// `GetSummary`; callers pass the step explicitly in that case.
    pub fn default_step(&self) -> HttpStep {
        match self {
            Envelope::EnsureScopes(_) => HttpStep::EnsureScopes,
            Envelope::Operation(_) => HttpStep::GetOperation,
            Envelope::RemoteTimestamp(_) => HttpStep::GetRemoteClientTimestamp,
            Envelope::SendChanges(_) => HttpStep::SendChangesInProgress,
            Envelope::GetMoreChanges(_) => HttpStep::GetMoreChanges,
            Envelope::EndSession(_) => HttpStep::EndSession,
        }
    }
}

impl ScopeMessage for Envelope {
    fn context(&self) -> &SessionContext {
        match self {
            Envelope::EnsureScopes(m) => m.context(),
            Envelope::Operation(m) => m.context(),
            Envelope::RemoteTimestamp(m) => m.context(),
            Envelope::SendChanges(m) => m.context(),
            Envelope::GetMoreChanges(m) => m.context(),
            Envelope::EndSession(m) => m.context(),
        }
    }

    fn into_context(self) -> SessionContext {
        match self {
            Envelope::EnsureScopes(m) => m.into_context(),
            Envelope::Operation(m) => m.into_context(),
            Envelope::RemoteTimestamp(m) => m.into_context(),
            Envelope::SendChanges(m) => m.into_context(),
            Envelope::GetMoreChanges(m) => m.into_context(),
            Envelope::EndSession(m) => m.into_context(),
        }
    }
}

macro_rules! envelope_from {
    ($($variant:ident($ty:ty)),+ $(,)?) => {
        $(
            impl From<$ty> for Envelope {
                fn from(m: $ty) -> Self {
                    Envelope::$variant(m)
                }
            }
        )+
    };
}

envelope_from!(
    EnsureScopes(EnsureScopesRequest),
    Operation(OperationRequest),
    RemoteTimestamp(RemoteTimestampRequest),
    SendChanges(SendChangesRequest),
    GetMoreChanges(GetMoreChangesRequest),
    EndSession(EndSessionRequest),
);

/// Only the session context of an otherwise opaque envelope.
///
/// Used to pull the context out of bodies the caller does not want to decode
/// in full, such as batch files written by the downloader.
#[derive(Debug, Clone, Deserialize)]
pub struct ContextOnly {
    #[serde(rename = "sc")]
    pub sync_context: SessionContext,
}
