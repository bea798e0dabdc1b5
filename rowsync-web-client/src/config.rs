//! Client configuration.

use crate::error::{SyncError, SyncResult};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::time::Duration;

/// Default transport timeout.
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// Lower bound on the transport timeout. Shorter values are raised to this.
pub const MIN_SYNC_TIMEOUT: Duration = Duration::from_secs(5 * 60);

const DEFAULT_DOWNLOAD_PARALLELISM: usize = 4;

/// How many batch downloads may be in flight at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloadParallelism {
    Bounded(NonZeroUsize),
    Unbounded,
}

impl DownloadParallelism {
    /// Maps a signed degree of parallelism; zero or negative is unbounded.
    pub fn from_degree(degree: i32) -> Self {
        usize::try_from(degree)
            .ok()
            .and_then(NonZeroUsize::new)
            .map_or(Self::Unbounded, Self::Bounded)
    }

    /// Concurrency limit for `pending` outstanding downloads. Never zero.
    pub fn limit(self, pending: usize) -> usize {
        match self {
            Self::Bounded(n) => n.get().min(pending).max(1),
            Self::Unbounded => pending.max(1),
        }
    }
}

impl Default for DownloadParallelism {
    fn default() -> Self {
        Self::Bounded(NonZeroUsize::new(DEFAULT_DOWNLOAD_PARALLELISM).unwrap_or(NonZeroUsize::MIN))
    }
}

/// Settings for a [`WebSyncClient`](crate::WebSyncClient).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base address of the sync endpoint.
    pub service_uri: String,
    /// Optional value of the `dotmim-sync-identifier` header.
    #[serde(default)]
    pub identifier: Option<String>,
    /// Optional value converter key sent in `dotmim-sync-converter`.
    #[serde(default)]
    pub converter_key: Option<String>,
    /// Requested transport timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub download_parallelism: DownloadParallelism,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_SYNC_TIMEOUT.as_secs()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            service_uri: String::new(),
            identifier: None,
            converter_key: None,
            timeout_secs: default_timeout_secs(),
            download_parallelism: DownloadParallelism::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(service_uri: impl Into<String>) -> Self {
        Self {
            service_uri: service_uri.into(),
            ..Self::default()
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_converter(mut self, converter_key: impl Into<String>) -> Self {
        self.converter_key = Some(converter_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_download_parallelism(mut self, parallelism: DownloadParallelism) -> Self {
        self.download_parallelism = parallelism;
        self
    }

    /// Timeout actually applied to each request: never below [`MIN_SYNC_TIMEOUT`].
    pub fn effective_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs).max(MIN_SYNC_TIMEOUT)
    }

    /// Parses the service address.
    pub fn parsed_service_uri(&self) -> SyncResult<Url> {
        let raw = self.service_uri.trim();
        if raw.is_empty() {
            return Err(SyncError::Configuration(
                "service uri is not configured".into(),
            ));
        }
        Url::parse(raw)
            .map_err(|e| SyncError::Configuration(format!("invalid service uri {raw:?}: {e}")))
    }
}
