mod common;

use async_trait::async_trait;
use common::{context, json_response, mock_client, mock_config, server_context};
use rowsync_types::{SessionContext, SyncStage, sha256_base64};
use rowsync_web_client::interceptor::{OutgoingRequest, ResponseFailure, ResponseReceived};
use rowsync_web_client::protocol::{
    EnsureScopesRequest, EnsureScopesResponse, OperationResponse, RemoteTimestampRequest, headers,
};
use rowsync_web_client::retry::RetryNotice;
use rowsync_web_client::{
    ClientConfig, HttpStep, Interceptor, Serializer, SyncError, SyncResult, WebSyncClient,
};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn header_of(req: &Request, name: &str) -> Option<String> {
    req.headers
        .get(name)
        .map(|v| v.to_str().unwrap().to_string())
}

fn ensure_scopes_body(ctx: &SessionContext) -> Value {
    json!({
        "sc": server_context(ctx, SyncStage::ScopeLoading),
        "serverscope": {"n": "DefaultScope", "v": "1.0"},
    })
}

async fn ensure_scopes(
    client: &WebSyncClient,
    ctx: &SessionContext,
) -> SyncResult<EnsureScopesResponse> {
    client
        .process_request(
            HttpStep::EnsureScopes,
            &EnsureScopesRequest::new(ctx.clone()),
            100,
            &CancellationToken::new(),
        )
        .await
}

async fn send_raw(client: &WebSyncClient, ctx: &SessionContext) -> SyncResult<reqwest::Response> {
    client
        .process_request_raw(
            HttpStep::GetRemoteClientTimestamp,
            &RemoteTimestampRequest::new(ctx.clone()),
            100,
            &CancellationToken::new(),
        )
        .await
}

#[derive(Default)]
struct Recorder {
    retries: AtomicUsize,
    failures: Mutex<Vec<ResponseFailure>>,
    received: Mutex<Vec<(HttpStep, String, SyncStage)>>,
}

#[async_trait]
impl Interceptor for Recorder {
    async fn on_response_failure(&self, failure: &ResponseFailure) {
        self.failures.lock().unwrap().push(failure.clone());
    }

    async fn on_response_received(&self, response: &ResponseReceived<'_>) {
        self.received.lock().unwrap().push((
            response.step,
            response.host.to_string(),
            response.context.stage,
        ));
    }

    async fn on_retry(&self, _notice: &RetryNotice<'_>) {
        self.retries.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Request construction ────────────────────────────────────────

#[tokio::test]
async fn sends_protocol_headers_and_body_hash() {
    let server = MockServer::start().await;
    let ctx = context();

    Mock::given(method("POST"))
        .and(path("/api/sync/"))
        .and(header(headers::STEP, "2"))
        .respond_with(json_response(ensure_scopes_body(&ctx)))
        .expect(1)
        .mount(&server)
        .await;

    let client = mock_client(&server);
    let resp = ensure_scopes(&client, &ctx).await.unwrap();
    assert_eq!(resp.server_scope_info.name, "DefaultScope");
    assert_eq!(resp.sync_context.stage, SyncStage::ScopeLoading);

    let requests = server.received_requests().await.unwrap();
    let req = &requests[0];
    assert_eq!(
        header_of(req, headers::SESSION_ID),
        Some(ctx.session_id.to_string())
    );
    assert_eq!(
        header_of(req, headers::SCOPE_ID),
        Some(ctx.client_id.to_string())
    );
    assert_eq!(
        header_of(req, headers::SCOPE_NAME).as_deref(),
        Some("DefaultScope")
    );
    assert_eq!(header_of(req, headers::VERSION).as_deref(), Some("1.3.0"));
    assert_eq!(
        header_of(req, "content-type").as_deref(),
        Some("application/json")
    );
    assert!(header_of(req, headers::IDENTIFIER).is_none());
    assert!(header_of(req, headers::CONVERTER).is_none());
    assert!(header_of(req, "cookie").is_none());

    let format: Value =
        serde_json::from_str(&header_of(req, headers::SERIALIZATION_FORMAT).unwrap()).unwrap();
    assert_eq!(format, json!({"serializerKey": "json", "batchSize": 100}));

    assert_eq!(
        header_of(req, headers::HASH),
        Some(sha256_base64(&req.body))
    );
    let sent: Value = serde_json::from_slice(&req.body).unwrap();
    assert_eq!(sent["sc"]["id"], json!(ctx.session_id.to_string()));
}

#[tokio::test]
async fn identifier_and_converter_headers_are_optional() {
    let server = MockServer::start().await;
    let ctx = context();

    Mock::given(method("POST"))
        .and(header(headers::IDENTIFIER, "device-7"))
        .and(header(headers::CONVERTER, "utc-dates"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let config = mock_config(&server)
        .with_identifier("device-7")
        .with_converter("utc-dates");
    let client = WebSyncClient::new(config).unwrap();
    send_raw(&client, &ctx).await.unwrap();
}

/// JSON on the wire under a different key and without a content type.
struct TaggedJson;

impl Serializer for TaggedJson {
    fn key(&self) -> &str {
        "tagged"
    }

    fn to_bytes(&self, value: &Value) -> SyncResult<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn from_bytes(&self, bytes: &[u8]) -> SyncResult<Value> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[tokio::test]
async fn serialization_format_header_stays_json_for_custom_serializer() {
    let server = MockServer::start().await;
    let ctx = context();

    Mock::given(method("POST"))
        .respond_with(json_response(ensure_scopes_body(&ctx)))
        .mount(&server)
        .await;

    let client = mock_client(&server).with_serializer(Arc::new(TaggedJson));
    assert_eq!(client.serializer().key(), "tagged");
    ensure_scopes(&client, &ctx).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let format: Value =
        serde_json::from_str(&header_of(&requests[0], headers::SERIALIZATION_FORMAT).unwrap())
            .unwrap();
    assert_eq!(format["serializerKey"], "tagged");
    assert_eq!(format["batchSize"], 100);
    assert!(header_of(&requests[0], "content-type").is_none());
}

struct DropPayload;

#[async_trait]
impl Interceptor for DropPayload {
    async fn on_sending_request(&self, request: &mut OutgoingRequest<'_>) {
        request.payload = None;
        request
            .headers
            .insert("x-intercepted", "yes".parse().unwrap());
    }
}

#[tokio::test]
async fn empty_payload_is_still_hashed() {
    let server = MockServer::start().await;
    let ctx = context();

    Mock::given(method("POST"))
        .and(header("x-intercepted", "yes"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = mock_client(&server);
    client.add_interceptor(Arc::new(DropPayload));
    send_raw(&client, &ctx).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].body.is_empty());
    assert_eq!(
        header_of(&requests[0], headers::HASH).as_deref(),
        Some("47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU=")
    );
}

#[tokio::test]
async fn custom_headers_never_override_protocol_headers() {
    let server = MockServer::start().await;
    let ctx = context();

    Mock::given(method("POST"))
        .and(header(headers::STEP, "12"))
        .and(header("x-tenant", "acme"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = mock_client(&server);
    client.add_custom_header("Dotmim-Sync-Step", "99");
    client.add_custom_header("x-tenant", "other");
    client.add_custom_header("x-tenant", "acme");
    send_raw(&client, &ctx).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let steps: Vec<_> = requests[0].headers.get_all(headers::STEP).iter().collect();
    assert_eq!(steps.len(), 1);
}

#[tokio::test]
async fn scope_parameters_are_escaped_into_query() {
    let server = MockServer::start().await;
    let ctx = context();

    Mock::given(method("POST"))
        .and(path("/api/sync/"))
        .and(query_param("Region", "EU West"))
        .and(query_param("id", "a&b"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = mock_client(&server);
    client.add_scope_parameter("Region", "EU West");
    client.add_scope_parameter("id", "a&b");
    assert!(
        client
            .request_uri()
            .unwrap()
            .as_str()
            .ends_with("/api/sync/?Region=EU%20West&id=a%26b")
    );
    send_raw(&client, &ctx).await.unwrap();
}

#[test]
fn request_uri_keeps_existing_query_and_slash() {
    let mut client =
        WebSyncClient::new(ClientConfig::new("https://sync.example.com/api/?tenant=1")).unwrap();
    assert_eq!(
        client.request_uri().unwrap().as_str(),
        "https://sync.example.com/api/?tenant=1"
    );
    client.add_scope_parameter("k", "v");
    assert_eq!(
        client.request_uri().unwrap().as_str(),
        "https://sync.example.com/api/?tenant=1&k=v"
    );
    assert_eq!(client.service_host(), "sync.example.com");
    assert_eq!(client.to_string(), "sync.example.com");
}

// ── Session affinity ────────────────────────────────────────────

#[tokio::test]
async fn affinity_cookie_is_kept_and_replayed() {
    let server = MockServer::start().await;
    let ctx = context();

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("set-cookie", "ARRAffinity=abc123; Path=/"),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = mock_client(&server);
    assert!(client.cookie().await.is_none());

    send_raw(&client, &ctx).await.unwrap();
    assert_eq!(
        client.cookie().await.map(|c| c.header_value()).as_deref(),
        Some("ARRAffinity=abc123")
    );

    // No Set-Cookie on the next responses: the stored cookie stays.
    send_raw(&client, &ctx).await.unwrap();
    send_raw(&client, &ctx).await.unwrap();
    assert!(client.cookie().await.is_some());

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
    assert!(header_of(&requests[0], "cookie").is_none());
    assert_eq!(
        header_of(&requests[1], "cookie").as_deref(),
        Some("ARRAffinity=abc123")
    );
    assert_eq!(
        header_of(&requests[2], "cookie").as_deref(),
        Some("ARRAffinity=abc123")
    );
}

#[tokio::test]
async fn cookie_is_captured_from_failed_responses_too() {
    let server = MockServer::start().await;
    let ctx = context();

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).insert_header("set-cookie", "node=b"))
        .mount(&server)
        .await;

    let client = mock_client(&server);
    let err = send_raw(&client, &ctx).await.unwrap_err();
    assert_eq!(err.status().map(|s| s.as_u16()), Some(503));
    assert_eq!(client.cookie().await.unwrap().value(), "b");
}

// ── Retry ───────────────────────────────────────────────────────

#[tokio::test]
async fn server_errors_are_retried_once_by_default() {
    let server = MockServer::start().await;
    let ctx = context();

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("database offline"))
        .expect(2)
        .mount(&server)
        .await;

    let recorder = Arc::new(Recorder::default());
    let mut client = mock_client(&server);
    client.add_interceptor(recorder.clone());

    let err = send_raw(&client, &ctx).await.unwrap_err();
    let protocol = err.as_protocol().unwrap();
    assert_eq!(protocol.status.as_u16(), 500);
    assert_eq!(protocol.message, "database offline");
    assert_eq!(recorder.retries.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.failures.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn transient_failure_recovers_on_retry() {
    let server = MockServer::start().await;
    let ctx = context();

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(json_response(json!({
            "sc": server_context(&ctx, SyncStage::BeginSession),
            "so": 0,
        })))
        .mount(&server)
        .await;

    let client = mock_client(&server);
    let resp: OperationResponse = client
        .process_request(
            HttpStep::GetOperation,
            &EnsureScopesRequest::new(ctx.clone()),
            100,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(resp.sync_context.stage, SyncStage::BeginSession);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn session_lost_is_never_retried() {
    let server = MockServer::start().await;
    let ctx = context();

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(400)
                .insert_header(headers::ERROR, "true")
                .set_body_json(json!({
                    "message": "Session lost",
                    "typeName": "HttpSessionLostException",
                    "syncStage": 10,
                })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let recorder = Arc::new(Recorder::default());
    let mut client = mock_client(&server);
    client.add_interceptor(recorder.clone());

    let err = send_raw(&client, &ctx).await.unwrap_err();
    assert!(err.is_session_lost());
    let protocol = err.as_protocol().unwrap();
    assert_eq!(protocol.message, "Session lost");
    assert_eq!(protocol.sync_stage, Some(SyncStage::ChangesSelecting));
    assert_eq!(recorder.retries.load(Ordering::SeqCst), 0);

    let failures = recorder.failures.lock().unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].status, 400);
    assert_eq!(
        failures[0].headers.get(headers::ERROR).map(String::as_str),
        Some("true")
    );
    assert!(failures[0].request_uri.ends_with("/api/sync/"));
    assert!(failures[0].body.as_deref().unwrap().contains("Session lost"));
}

#[tokio::test]
async fn session_lost_with_unknown_stage_is_not_retried() {
    let server = MockServer::start().await;
    let ctx = context();

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(400)
                .insert_header(headers::ERROR, "true")
                .set_body_json(json!({
                    "message": "session gone",
                    "typeName": "HttpSessionLostException",
                    "syncStage": 99,
                })),
        )
        .expect(1)
        .mount(&server)
        .await;

    // No interceptor registered: the failure is still fully translated.
    let client = mock_client(&server);
    let err = ensure_scopes(&client, &ctx).await.unwrap_err();
    assert!(err.is_session_lost());
    let protocol = err.as_protocol().unwrap();
    assert_eq!(protocol.message, "session gone");
    assert_eq!(protocol.sync_stage, None);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn cancelled_token_prevents_any_request() {
    let server = MockServer::start().await;
    let ctx = context();

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = mock_client(&server);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = client
        .process_request_raw(
            HttpStep::EnsureScopes,
            &EnsureScopesRequest::new(ctx),
            100,
            &cancel,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Cancelled));
}

// ── Failure modes ───────────────────────────────────────────────

#[tokio::test]
async fn missing_service_uri_is_a_configuration_error() {
    let client = WebSyncClient::new(ClientConfig::default()).unwrap();
    let err = ensure_scopes(&client, &context()).await.unwrap_err();
    assert!(matches!(err, SyncError::Configuration(_)));
    assert_eq!(client.service_host(), "Undefined");
}

#[tokio::test]
async fn undecodable_body_is_a_transport_error() {
    let server = MockServer::start().await;
    let ctx = context();

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let client = mock_client(&server);
    let err = ensure_scopes(&client, &ctx).await.unwrap_err();
    assert!(matches!(err, SyncError::Transport(_)));
}

#[tokio::test]
async fn empty_body_is_a_transport_error() {
    let server = MockServer::start().await;
    let ctx = context();

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = mock_client(&server);
    let err = ensure_scopes(&client, &ctx).await.unwrap_err();
    match err {
        SyncError::Transport(msg) => assert!(msg.contains("empty")),
        other => panic!("expected transport error, got {other:?}"),
    }
}

#[tokio::test]
async fn structured_error_is_translated() {
    let server = MockServer::start().await;
    let ctx = context();

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(400)
                .insert_header(headers::ERROR, "true")
                .set_body_json(json!({
                    "message": "Cannot insert duplicate key",
                    "dataSource": "sql01",
                    "initialCatalog": "Sales",
                    "number": 2627,
                    "typeName": "SyncException",
                })),
        )
        .mount(&server)
        .await;

    let client = mock_client(&server);
    let err = ensure_scopes(&client, &ctx).await.unwrap_err();
    let protocol = err.as_protocol().unwrap();
    assert_eq!(protocol.reason_phrase.as_deref(), Some("Bad Request"));
    assert_eq!(protocol.number, Some(2627));
    assert_eq!(protocol.data_source.as_deref(), Some("sql01"));
    assert_eq!(protocol.initial_catalog.as_deref(), Some("Sales"));
    assert_eq!(protocol.type_name.as_deref(), Some("SyncException"));
}

// ── Interceptors ────────────────────────────────────────────────

#[tokio::test]
async fn response_received_reports_step_host_and_new_context() {
    let server = MockServer::start().await;
    let ctx = context();

    Mock::given(method("POST"))
        .respond_with(json_response(ensure_scopes_body(&ctx)))
        .mount(&server)
        .await;

    let recorder = Arc::new(Recorder::default());
    let mut client = mock_client(&server);
    client.add_interceptor(recorder.clone());
    ensure_scopes(&client, &ctx).await.unwrap();

    let received = recorder.received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].0, HttpStep::EnsureScopes);
    assert_eq!(received[0].1, "127.0.0.1");
    assert_eq!(received[0].2, SyncStage::ScopeLoading);
}
