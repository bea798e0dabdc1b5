//! The HTTP protocol driver.
//!
//! [`WebSyncClient`] turns one protocol step into one POST: it builds the URI
//! and headers, lets interceptors rewrite the request, hashes and sends the
//! body under the retry policy, keeps the affinity cookie and translates
//! failures. It does not know what order steps come in; see
//! [`SyncSession`](crate::SyncSession) for that.

use crate::config::{ClientConfig, DownloadParallelism};
use crate::cookie::SessionCookie;
use crate::error::{SyncError, SyncResult, translate_failure};
use crate::interceptor::{
    Interceptor, Interceptors, OutgoingRequest, ResponseFailure, ResponseReceived,
    flatten_headers,
};
use crate::protocol::{PROTOCOL_VERSION, ScopeMessage, SerializerInfo, headers};
use crate::retry::{RetryObserver, RetryPolicy};
use crate::serializer::{self, JsonSerializer, Serializer, content_hash};
use crate::step::HttpStep;
use reqwest::header::{CONTENT_TYPE, COOKIE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response, Url};
use rowsync_types::SessionContext;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Drives the sync protocol against one remote endpoint.
///
/// The affinity cookie is not keyed by session, so concurrent sessions
/// should each use their own client.
pub struct WebSyncClient {
    http: Client,
    config: ClientConfig,
    serializer: Arc<dyn Serializer>,
    retry: RetryPolicy,
    interceptors: Interceptors,
    scope_parameters: BTreeMap<String, String>,
    custom_headers: BTreeMap<String, String>,
    cookie: Arc<RwLock<Option<SessionCookie>>>,
}

impl WebSyncClient {
    /// Creates a client with its own HTTP connection pool.
    pub fn new(config: ClientConfig) -> SyncResult<Self> {
        let http = Client::builder()
            .gzip(true)
            .deflate(true)
            .build()
            .map_err(|e| SyncError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_http_client(config, http))
    }

    /// Creates a client on a caller-supplied `reqwest::Client`.
    pub fn with_http_client(config: ClientConfig, http: Client) -> Self {
        Self {
            http,
            config,
            serializer: Arc::new(JsonSerializer),
            retry: RetryPolicy::default(),
            interceptors: Interceptors::new(),
            scope_parameters: BTreeMap::new(),
            custom_headers: BTreeMap::new(),
            cookie: Arc::new(RwLock::new(None)),
        }
    }

    pub fn with_serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn add_interceptor(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.push(interceptor);
    }

    /// Adds a query string parameter sent with every request. Last write wins.
    pub fn add_scope_parameter(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.scope_parameters.insert(key.into(), value.into());
    }

    /// Adds a header sent with every request. Last write wins; protocol
    /// headers of the same name take precedence.
    pub fn add_custom_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.custom_headers.insert(key.into(), value.into());
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn serializer(&self) -> &dyn Serializer {
        self.serializer.as_ref()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn download_parallelism(&self) -> DownloadParallelism {
        self.config.download_parallelism
    }

    /// The affinity cookie currently held, if any.
    pub async fn cookie(&self) -> Option<SessionCookie> {
        self.cookie.read().await.clone()
    }

    /// Host of the service address, or `"Undefined"` when not configured.
    pub fn service_host(&self) -> String {
        self.config
            .parsed_service_uri()
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "Undefined".to_string())
    }

    /// Full request URI: service address with a trailing `/`, followed by
    /// the escaped scope parameters.
    pub fn request_uri(&self) -> SyncResult<Url> {
        let mut uri = self.config.parsed_service_uri()?;
        if !uri.path().ends_with('/') {
            let path = format!("{}/", uri.path());
            uri.set_path(&path);
        }
        if !self.scope_parameters.is_empty() {
            let extra = self
                .scope_parameters
                .iter()
                .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
                .collect::<Vec<_>>()
                .join("&");
            let query = match uri.query() {
                Some(q) if !q.is_empty() => format!("{q}&{extra}"),
                _ => extra,
            };
            uri.set_query(Some(&query));
        }
        Ok(uri)
    }

    /// Sends `message` for `step` and returns the raw successful response,
    /// with the body not yet read.
    pub async fn process_request_raw<M>(
        &self,
        step: HttpStep,
        message: &M,
        batch_size: usize,
        cancel: &CancellationToken,
    ) -> SyncResult<Response>
    where
        M: Serialize + ScopeMessage + ?Sized,
    {
        let uri = self.request_uri()?;
        let payload = serializer::to_value(message)?;
        let context = message.context();
        let observer: &dyn RetryObserver = &self.interceptors;

        self.retry
            .execute(cancel, Some(observer), |attempt| {
                debug!(%step, attempt, "sending request");
                self.send_once(step, Some(payload.clone()), context, batch_size, uri.clone())
            })
            .await
    }

    /// Sends `message` for `step` and decodes the response envelope.
    pub async fn process_request<R, M>(
        &self,
        step: HttpStep,
        message: &M,
        batch_size: usize,
        cancel: &CancellationToken,
    ) -> SyncResult<R>
    where
        R: DeserializeOwned + ScopeMessage,
        M: Serialize + ScopeMessage + ?Sized,
    {
        let response = self
            .process_request_raw(step, message, batch_size, cancel)
            .await?;

        let bytes = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            b = response.bytes() => b?,
        };
        if bytes.is_empty() {
            return Err(SyncError::Transport(format!(
                "server returned an empty response for step {step}"
            )));
        }

        let decoded: R = serializer::decode(self.serializer.as_ref(), &bytes)?;

        let host = self.service_host();
        self.interceptors
            .response_received(&ResponseReceived {
                step,
                host: &host,
                context: decoded.context(),
            })
            .await;

        Ok(decoded)
    }

    async fn send_once(
        &self,
        step: HttpStep,
        payload: Option<Value>,
        context: &SessionContext,
        batch_size: usize,
        uri: Url,
    ) -> SyncResult<Response> {
        let mut request = OutgoingRequest {
            step,
            uri,
            headers: self.build_headers(step, context, batch_size).await?,
            payload,
            context,
        };
        self.interceptors.sending_request(&mut request).await;

        let body = match &request.payload {
            Some(value) => self.serializer.to_bytes(value)?,
            None => Vec::new(),
        };
        request
            .headers
            .insert(headers::HASH, header_value(&content_hash(&body))?);
        if let Some(content_type) = self.serializer.content_type() {
            request
                .headers
                .insert(CONTENT_TYPE, header_value(content_type)?);
        }

        let response = self
            .http
            .post(request.uri.clone())
            .headers(request.headers)
            .body(body)
            .timeout(self.config.effective_timeout())
            .send()
            .await?;

        if let Some(cookie) = SessionCookie::from_response_headers(response.headers()) {
            debug!(name = cookie.name(), "affinity cookie updated");
            *self.cookie.write().await = Some(cookie);
        }

        if !response.status().is_success() {
            return Err(self.translate_error(response, &request.uri).await);
        }
        Ok(response)
    }

    async fn build_headers(
        &self,
        step: HttpStep,
        context: &SessionContext,
        batch_size: usize,
    ) -> SyncResult<HeaderMap> {
        let mut map = HeaderMap::new();
        map.insert(
            headers::SESSION_ID,
            header_value(&context.session_id.to_string())?,
        );
        map.insert(
            headers::SCOPE_ID,
            header_value(&context.client_id.to_string())?,
        );
        map.insert(headers::SCOPE_NAME, header_value(&context.scope_name)?);
        map.insert(headers::STEP, header_value(&step.code().to_string())?);

        let info = SerializerInfo {
            serializer_key: self.serializer.key().to_string(),
            batch_size,
        };
        map.insert(
            headers::SERIALIZATION_FORMAT,
            header_value(&serde_json::to_string(&info)?)?,
        );
        map.insert(headers::VERSION, HeaderValue::from_static(PROTOCOL_VERSION));

        if let Some(identifier) = &self.config.identifier {
            map.insert(headers::IDENTIFIER, header_value(identifier)?);
        }
        if let Some(converter) = &self.config.converter_key {
            map.insert(headers::CONVERTER, header_value(converter)?);
        }
        if let Some(cookie) = self.cookie.read().await.as_ref() {
            map.insert(COOKIE, header_value(&cookie.header_value())?);
        }

        for (name, value) in &self.custom_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| SyncError::Configuration(format!("invalid header name {name:?}: {e}")))?;
            if map.contains_key(&name) {
                continue;
            }
            map.insert(name, header_value(value)?);
        }

        Ok(map)
    }

    async fn translate_error(&self, response: Response, uri: &Url) -> SyncError {
        let status = response.status();
        let marker = response
            .headers()
            .get(headers::ERROR)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let failure_headers = (!self.interceptors.is_empty())
            .then(|| flatten_headers(response.headers()));
        let body = response.text().await.ok();

        if let Some(headers) = failure_headers {
            self.interceptors
                .response_failure(&ResponseFailure {
                    status: status.as_u16(),
                    reason_phrase: status.canonical_reason().map(str::to_string),
                    body: body.clone(),
                    headers,
                    request_uri: uri.to_string(),
                })
                .await;
        }

        let err = translate_failure(status, None, body.as_deref(), marker.as_deref());
        warn!(
            status = status.as_u16(),
            type_name = err.type_name.as_deref().unwrap_or(""),
            "request failed: {}",
            err.message
        );
        err.into()
    }
}

impl fmt::Display for WebSyncClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.service_host())
    }
}

impl fmt::Debug for WebSyncClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSyncClient")
            .field("service_uri", &self.config.service_uri)
            .field("serializer", &self.serializer.key())
            .field("retry", &self.retry)
            .field("interceptors", &self.interceptors)
            .finish()
    }
}

fn header_value(value: &str) -> SyncResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| SyncError::Configuration(format!("invalid header value {value:?}: {e}")))
}
