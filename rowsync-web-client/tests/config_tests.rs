use rowsync_web_client::{
    ClientConfig, DEFAULT_SYNC_TIMEOUT, DownloadParallelism, MIN_SYNC_TIMEOUT, SyncError,
    WebSyncClient,
};
use std::num::NonZeroUsize;
use std::time::Duration;

// ── Defaults ────────────────────────────────────────────────────

#[test]
fn client_config_default() {
    let cfg = ClientConfig::default();
    assert!(cfg.service_uri.is_empty());
    assert!(cfg.identifier.is_none());
    assert!(cfg.converter_key.is_none());
    assert_eq!(cfg.effective_timeout(), DEFAULT_SYNC_TIMEOUT);
    assert_eq!(
        cfg.download_parallelism,
        DownloadParallelism::Bounded(NonZeroUsize::new(4).unwrap())
    );
}

#[test]
fn client_config_serde_fills_defaults() {
    let cfg: ClientConfig =
        serde_json::from_str(r#"{"service_uri":"https://sync.example.com/api"}"#).unwrap();
    assert_eq!(cfg.service_uri, "https://sync.example.com/api");
    assert_eq!(cfg.timeout_secs, 20 * 60);
    assert_eq!(cfg.download_parallelism, DownloadParallelism::default());

    let json = serde_json::to_string(&cfg.clone().with_identifier("dev-1")).unwrap();
    let back: ClientConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back.identifier.as_deref(), Some("dev-1"));
}

// ── Timeout floor ───────────────────────────────────────────────

#[test]
fn timeout_below_floor_is_raised() {
    let cfg = ClientConfig::new("http://x").with_timeout(Duration::from_secs(30));
    assert_eq!(cfg.effective_timeout(), MIN_SYNC_TIMEOUT);

    let cfg = ClientConfig::new("http://x").with_timeout(Duration::ZERO);
    assert_eq!(cfg.effective_timeout(), MIN_SYNC_TIMEOUT);
}

#[test]
fn timeout_above_floor_is_kept() {
    let cfg = ClientConfig::new("http://x").with_timeout(Duration::from_secs(3600));
    assert_eq!(cfg.effective_timeout(), Duration::from_secs(3600));

    let cfg = ClientConfig::new("http://x").with_timeout(MIN_SYNC_TIMEOUT);
    assert_eq!(cfg.effective_timeout(), MIN_SYNC_TIMEOUT);
}

// ── Service address ─────────────────────────────────────────────

#[test]
fn service_uri_must_be_present_and_valid() {
    assert!(matches!(
        ClientConfig::default().parsed_service_uri(),
        Err(SyncError::Configuration(_))
    ));
    assert!(matches!(
        ClientConfig::new("   ").parsed_service_uri(),
        Err(SyncError::Configuration(_))
    ));
    assert!(matches!(
        ClientConfig::new("not a uri").parsed_service_uri(),
        Err(SyncError::Configuration(_))
    ));
    let uri = ClientConfig::new("https://sync.example.com/api")
        .parsed_service_uri()
        .unwrap();
    assert_eq!(uri.host_str(), Some("sync.example.com"));
}

// ── Download parallelism ────────────────────────────────────────

#[test]
fn non_positive_degree_is_unbounded() {
    assert_eq!(DownloadParallelism::from_degree(0), DownloadParallelism::Unbounded);
    assert_eq!(DownloadParallelism::from_degree(-1), DownloadParallelism::Unbounded);
    assert_eq!(
        DownloadParallelism::from_degree(8),
        DownloadParallelism::Bounded(NonZeroUsize::new(8).unwrap())
    );
}

#[test]
fn limit_is_bounded_by_pending_work() {
    let four = DownloadParallelism::Bounded(NonZeroUsize::new(4).unwrap());
    assert_eq!(four.limit(10), 4);
    assert_eq!(four.limit(2), 2);
    assert_eq!(four.limit(0), 1);

    assert_eq!(DownloadParallelism::Unbounded.limit(10), 10);
    assert_eq!(DownloadParallelism::Unbounded.limit(0), 1);
}

#[test]
fn client_exposes_configured_parallelism() {
    let cfg = ClientConfig::new("http://localhost/sync")
        .with_download_parallelism(DownloadParallelism::Unbounded);
    let client = WebSyncClient::new(cfg).unwrap();
    assert_eq!(client.download_parallelism(), DownloadParallelism::Unbounded);
}
