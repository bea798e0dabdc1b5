//! Core type definitions for rowsync.
//!
//! This crate defines the protocol-level types shared by every rowsync
//! component:
//! - Session and client identifiers
//! - The session context round-tripped on each step
//! - Named scope parameters and their stable content hash
//! - Scope/schema descriptors, change containers and counters
//! - Enumerations with fixed numeric wire codes
//!
//! Row contents and conflict resolution belong to the change-tracking
//! engine, not here.

mod changes;
mod context;
mod ids;
pub mod parameter;
mod scope;
mod wire_enum;

pub use changes::{
    BatchInfo, BatchPartInfo, ContainerSet, ContainerTable, DatabaseChangesApplied,
    DatabaseChangesSelected, TableChangesApplied, TableChangesSelected,
};
pub use context::SessionContext;
pub use ids::{ClientId, SessionId};
pub use parameter::{
    DEFAULT_SCOPE_NAME, NameComparison, Parameter, ParameterSet, default_scope_hash,
    sha256_base64,
};
pub use scope::{OldScopeInfo, ScopeInfo, ScopeInfoClient, SyncColumn, SyncSet, SyncTable};
pub use wire_enum::{ConflictResolutionPolicy, SyncOperation, SyncStage, SyncType};

#[doc(hidden)]
pub use serde as __serde;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("parameter {0:?} already exists")]
    DuplicateParameter(String),

    #[error("parameter name must not be empty")]
    EmptyParameterName,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),
}
