//! Extension points around the request/response cycle.
//!
//! Interceptors observe (and may rewrite) outgoing requests, failed
//! responses, decoded responses and retries. Logging and telemetry live
//! behind this seam; the client itself only calls the hooks.

use crate::retry::{RetryNotice, RetryObserver};
use crate::step::HttpStep;
use async_trait::async_trait;
use reqwest::Url;
use reqwest::header::HeaderMap;
use rowsync_types::SessionContext;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A request about to be finalized.
///
/// The integrity hash is computed after interceptors run, from whatever
/// `payload` holds then. `None` sends an empty body.
#[derive(Debug)]
pub struct OutgoingRequest<'a> {
    pub step: HttpStep,
    pub uri: Url,
    pub headers: HeaderMap,
    pub payload: Option<Value>,
    pub context: &'a SessionContext,
}

/// A non-success response, before it is translated into an error.
#[derive(Debug, Clone)]
pub struct ResponseFailure {
    pub status: u16,
    pub reason_phrase: Option<String>,
    pub body: Option<String>,
    /// Response headers, multiple values joined with `,`.
    pub headers: BTreeMap<String, String>,
    pub request_uri: String,
}

/// A response that decoded successfully.
#[derive(Debug)]
pub struct ResponseReceived<'a> {
    pub step: HttpStep,
    pub host: &'a str,
    pub context: &'a SessionContext,
}

/// Hooks into the client's request/response cycle. All methods default to
/// doing nothing.
#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn on_sending_request(&self, _request: &mut OutgoingRequest<'_>) {}

    async fn on_response_failure(&self, _failure: &ResponseFailure) {}

    async fn on_response_received(&self, _response: &ResponseReceived<'_>) {}

    async fn on_retry(&self, _notice: &RetryNotice<'_>) {}
}

/// Registered interceptors, called in registration order.
#[derive(Clone, Default)]
pub struct Interceptors {
    inner: Vec<Arc<dyn Interceptor>>,
}

impl Interceptors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.inner.push(interceptor);
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub(crate) async fn sending_request(&self, request: &mut OutgoingRequest<'_>) {
        for i in &self.inner {
            i.on_sending_request(request).await;
        }
    }

    pub(crate) async fn response_failure(&self, failure: &ResponseFailure) {
        for i in &self.inner {
            i.on_response_failure(failure).await;
        }
    }

    pub(crate) async fn response_received(&self, response: &ResponseReceived<'_>) {
        for i in &self.inner {
            i.on_response_received(response).await;
        }
    }
}

#[async_trait]
impl RetryObserver for Interceptors {
    async fn on_retry(&self, notice: &RetryNotice<'_>) {
        for i in &self.inner {
            i.on_retry(notice).await;
        }
    }
}

impl std::fmt::Debug for Interceptors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interceptors")
            .field("len", &self.inner.len())
            .finish()
    }
}

/// Flattens a header map for [`ResponseFailure`].
pub(crate) fn flatten_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        out.entry(name.as_str().to_string())
            .and_modify(|v| {
                v.push(',');
                v.push_str(&value);
            })
            .or_insert(value);
    }
    out
}
