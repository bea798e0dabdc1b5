//! Error types for the web sync client.
//!
//! Every failure on the network path is folded into [`SyncError`] before it
//! leaves the client. Raw `reqwest` errors never cross the public boundary.

use reqwest::StatusCode;
use rowsync_types::SyncStage;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Type discriminator the server sends when it no longer holds the session.
pub const SESSION_LOST_TYPE_NAME: &str = "HttpSessionLostException";

/// Result type for web sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while driving a sync session over HTTP.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Client is missing a service address or is otherwise misconfigured.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Network failure, empty response or undecodable response body.
    #[error("transport error: {0}")]
    Transport(String),

    /// Server answered with a non-success status.
    #[error(transparent)]
    Protocol(Box<ProtocolError>),

    /// Local parameter validation failed.
    #[error("parameter error: {0}")]
    Parameter(#[from] rowsync_types::Error),

    /// Caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Batch file I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Returns true if the server reported the session as lost.
    pub fn is_session_lost(&self) -> bool {
        matches!(self, SyncError::Protocol(p) if p.is_session_lost())
    }

    /// Returns the translated protocol error, if this is one.
    pub fn as_protocol(&self) -> Option<&ProtocolError> {
        match self {
            SyncError::Protocol(p) => Some(p),
            _ => None,
        }
    }

    /// Returns the HTTP status for protocol errors.
    pub fn status(&self) -> Option<StatusCode> {
        self.as_protocol().map(|p| p.status)
    }

    /// Returns true for errors that can never succeed on retry.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Configuration(_)
                | SyncError::Parameter(_)
                | SyncError::Serialization(_)
                | SyncError::Cancelled
        ) || self.is_session_lost()
    }
}

impl From<ProtocolError> for SyncError {
    fn from(err: ProtocolError) -> Self {
        SyncError::Protocol(Box::new(err))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Transport(err.to_string())
    }
}

/// A non-success response, with whatever diagnostics the server provided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolError {
    pub status: StatusCode,
    pub reason_phrase: Option<String>,
    pub message: String,
    pub data_source: Option<String>,
    pub initial_catalog: Option<String>,
    pub number: Option<i32>,
    pub sync_stage: Option<SyncStage>,
    pub type_name: Option<String>,
}

impl ProtocolError {
    /// Creates an error carrying only status and message.
    pub fn generic(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            reason_phrase: status.canonical_reason().map(str::to_string),
            message: message.into(),
            data_source: None,
            initial_catalog: None,
            number: None,
            sync_stage: None,
            type_name: None,
        }
    }

    /// Returns true if the server no longer holds this session.
    pub fn is_session_lost(&self) -> bool {
        self.type_name.as_deref() == Some(SESSION_LOST_TYPE_NAME)
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "server returned {}", self.status.as_u16())?;
        if let Some(reason) = &self.reason_phrase {
            write!(f, " {reason}")?;
        }
        write!(f, ": {}", self.message)?;
        if let Some(stage) = self.sync_stage {
            write!(f, " (stage {stage})")?;
        }
        if let Some(source) = &self.data_source {
            write!(f, " [data source {source}")?;
            if let Some(catalog) = &self.initial_catalog {
                write!(f, ", catalog {catalog}")?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}

impl std::error::Error for ProtocolError {}

/// Structured error body sent alongside the error marker header.
/// Always JSON, whatever serializer the session negotiated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSyncErrorDescriptor {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data_source: Option<String>,
    #[serde(default)]
    pub initial_catalog: Option<String>,
    #[serde(default)]
    pub number: Option<i32>,
    #[serde(default, deserialize_with = "lenient_stage")]
    pub sync_stage: Option<SyncStage>,
    #[serde(default)]
    pub type_name: Option<String>,
}

/// Stage codes from newer servers decode as `None` instead of failing the
/// whole descriptor.
fn lenient_stage<'de, D>(deserializer: D) -> Result<Option<SyncStage>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|v| SyncStage::deserialize(v).ok()))
}

/// Turns a non-success response into a [`ProtocolError`].
///
/// `error_marker` is the value of the error marker header, if present. When
/// it is absent, or the body is not a valid descriptor, a generic error is
/// built. This function never fails.
pub fn translate_failure(
    status: StatusCode,
    reason_phrase: Option<&str>,
    body: Option<&str>,
    error_marker: Option<&str>,
) -> ProtocolError {
    let reason = reason_phrase
        .map(str::to_string)
        .or_else(|| status.canonical_reason().map(str::to_string));
    let body = body.filter(|b| !b.trim().is_empty());

    let mut err = match error_marker {
        None => {
            let message = body
                .map(str::to_string)
                .or_else(|| reason.clone())
                .unwrap_or_default();
            ProtocolError::generic(status, message)
        }
        Some(_) => match body.and_then(|b| serde_json::from_str::<WebSyncErrorDescriptor>(b).ok()) {
            Some(descriptor) => ProtocolError {
                status,
                reason_phrase: None,
                message: descriptor
                    .message
                    .filter(|m| !m.is_empty())
                    .or_else(|| reason.clone())
                    .unwrap_or_default(),
                data_source: descriptor.data_source,
                initial_catalog: descriptor.initial_catalog,
                number: descriptor.number,
                sync_stage: descriptor.sync_stage,
                type_name: descriptor.type_name,
            },
            None => ProtocolError::generic(status, reason.clone().unwrap_or_default()),
        },
    };

    err.reason_phrase = reason;
    err
}
