//! HTTP client driver for the rowsync protocol.
//!
//! A sync session is a sequence of steps, each one POST to the server
//! carrying a request envelope and returning a response envelope. This crate
//! provides:
//!
//! - **Protocol**: envelopes, step codes and header names
//! - **Client**: request construction, integrity hashing, affinity cookie,
//!   retry and error translation ([`WebSyncClient`])
//! - **Session**: the step sequence over one session context ([`SyncSession`])
//! - **Download**: bounded parallel batch download to disk
//!
//! The change-tracking engine that produces and applies row batches is not
//! part of this crate.
//!
//! # Example
//!
//! ```no_run
//! use rowsync_types::{ClientId, SessionContext};
//! use rowsync_web_client::{ClientConfig, SyncSession, WebSyncClient};
//!
//! # async fn run() -> rowsync_web_client::SyncResult<()> {
//! let client = WebSyncClient::new(ClientConfig::new("https://sync.example.com/api/sync"))?;
//! let context = SessionContext::new(ClientId::new(), "DefaultScope");
//!
//! let mut session = SyncSession::new(&client, context, 1000);
//! let scope = session.ensure_scopes().await?;
//! let operation = session.get_operation(Some(scope), None).await?;
//! # let _ = operation;
//! let report = session.end_session_request();
//! session.end_session(report).await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod cookie;
pub mod download;
mod error;
pub mod interceptor;
pub mod protocol;
pub mod retry;
pub mod serializer;
mod session;
mod step;

pub use client::WebSyncClient;
pub use config::{ClientConfig, DEFAULT_SYNC_TIMEOUT, DownloadParallelism, MIN_SYNC_TIMEOUT};
pub use cookie::SessionCookie;
pub use download::{BatchDownloader, DownloadedBatch};
pub use error::{
    ProtocolError, SESSION_LOST_TYPE_NAME, SyncError, SyncResult, WebSyncErrorDescriptor,
    translate_failure,
};
pub use interceptor::{Interceptor, Interceptors};
pub use protocol::{Envelope, ScopeMessage};
pub use retry::{RetryPolicy, RetryObserver};
pub use serializer::{JsonSerializer, Serializer};
pub use session::SyncSession;
pub use step::HttpStep;
