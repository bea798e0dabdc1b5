//! Shared test helpers for web client tests.

#![allow(dead_code)]

use rowsync_types::{ClientId, ContainerSet, SessionContext, SyncStage};
use rowsync_web_client::{ClientConfig, RetryPolicy, SyncError, WebSyncClient};
use serde_json::{Value, json};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use wiremock::{MockServer, ResponseTemplate};

/// Installs a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Two attempts with no backoff, so retry tests stay fast.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::wait_and_retry(
        2,
        |_| Duration::ZERO,
        |e: &SyncError, _| !e.is_session_lost(),
    )
}

pub fn mock_config(server: &MockServer) -> ClientConfig {
    ClientConfig::new(format!("{}/api/sync", server.uri()))
}

pub fn mock_client(server: &MockServer) -> WebSyncClient {
    init_tracing();
    WebSyncClient::new(mock_config(server))
        .unwrap()
        .with_retry_policy(fast_retry())
}

pub fn context() -> SessionContext {
    SessionContext::new(ClientId::new(), "DefaultScope")
}

/// The context a server would send back: same ids, advanced stage.
pub fn server_context(ctx: &SessionContext, stage: SyncStage) -> Value {
    let mut returned = ctx.clone();
    returned.stage = stage;
    serde_json::to_value(returned).unwrap()
}

pub fn json_response(body: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(body)
}

/// A `SendChangesResponse` body for batch `index` of `count`.
pub fn changes_body(ctx: &SessionContext, index: u32, count: u32, last: bool) -> Value {
    let mut changes = ContainerSet::new();
    changes
        .table_mut("Customer")
        .push_row(vec![json!(index), json!(format!("row-{index}"))]);
    json!({
        "ss": 7,
        "sc": server_context(ctx, SyncStage::ChangesSelecting),
        "bi": index,
        "bc": count,
        "islb": last,
        "rct": 1000 + i64::from(index),
        "changes": changes,
        "policy": 0,
    })
}
