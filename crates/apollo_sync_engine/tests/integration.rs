//! Integration tests for sync engine and server.

use apollo_sync_engine::{
    ApolloClient, CycleOutcome, HttpTransport, LifecycleState, LoopbackClient, LoopbackServer,
    SyncConfig, SyncEngine, SyncError,
};
use apollo_sync_protocol::{Configurations, HttpRequest, HttpResponse};
use apollo_sync_server::{ConfigServer, ReleaseStore, ServerConfig};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Routes loopback requests into an in-memory config service.
struct InMemoryService {
    server: Arc<ConfigServer>,
}

impl LoopbackServer for InMemoryService {
    fn handle_get(&self, request: &HttpRequest) -> HttpResponse {
        self.server.handle(request)
    }
}

type Transport = HttpTransport<LoopbackClient<InMemoryService>>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn make_server(store: ReleaseStore) -> Arc<ConfigServer> {
    Arc::new(ConfigServer::with_store(
        ServerConfig::default().with_hold_timeout(Duration::from_millis(50)),
        Arc::new(store),
    ))
}

fn make_config(timeout: Duration) -> SyncConfig {
    SyncConfig::new("demo", "http://config-service:8080/")
        .with_ip("10.0.0.8")
        .with_timeout(timeout)
        .with_startup_deadline(Some(Duration::from_secs(5)))
}

fn transport(config: &SyncConfig, server: &Arc<ConfigServer>) -> Transport {
    HttpTransport::new(
        config,
        LoopbackClient::new(InMemoryService {
            server: Arc::clone(server),
        }),
    )
}

fn make_engine(server: &Arc<ConfigServer>) -> SyncEngine<Transport> {
    let config = make_config(Duration::from_secs(1));
    let transport = transport(&config, server);
    SyncEngine::new(config, transport).unwrap()
}

fn make_client(server: &Arc<ConfigServer>, timeout: Duration) -> ApolloClient<Transport> {
    let config = make_config(timeout);
    let transport = transport(&config, server);
    ApolloClient::new(config, transport).unwrap()
}

fn mapping(pairs: &[(&str, &str)]) -> Configurations {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), json!(v)))
        .collect()
}

#[test]
fn published_release_reaches_cache_and_tracker() {
    init_tracing();
    let server = make_server(ReleaseStore::with_last_id(4));
    server.publish("demo", "default", "application", mapping(&[("timeout", "30")]));

    let engine = make_engine(&server);
    let result = engine.poll_once();

    assert_eq!(result.outcome, CycleOutcome::Changed);
    assert_eq!(engine.get("application", "timeout"), Some(json!("30")));
    assert_eq!(engine.tracker().version("application"), 5);
    assert_eq!(engine.globals().get("timeout"), Some(json!("30")));
}

#[test]
fn unchanged_poll_leaves_state_alone() {
    init_tracing();
    let server = make_server(ReleaseStore::new());
    server.publish("demo", "default", "application", mapping(&[("timeout", "30")]));

    let engine = make_engine(&server);
    assert_eq!(engine.poll_once().outcome, CycleOutcome::Changed);
    let before = engine.cache().snapshot("application").unwrap();

    let result = engine.poll_once();
    assert_eq!(result.outcome, CycleOutcome::NoChange);
    assert!(result.refreshed.is_empty());

    let after = engine.cache().snapshot("application").unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(engine.tracker().version("application"), 1);
}

#[test]
fn callbacks_run_in_registration_order() {
    init_tracing();
    let server = make_server(ReleaseStore::new());
    server.publish("demo", "default", "application", mapping(&[("mode", "fast")]));

    let engine = make_engine(&server);
    let seen: Arc<Mutex<Vec<(&'static str, Option<Value>)>>> = Arc::default();
    for name in ["A", "B"] {
        let seen = Arc::clone(&seen);
        engine.add_callback(move |configurations| {
            seen.lock().push((name, configurations.get("mode").cloned()));
            Ok(())
        });
    }

    engine.poll_once();

    assert_eq!(
        *seen.lock(),
        vec![("A", Some(json!("fast"))), ("B", Some(json!("fast")))]
    );
}

#[test]
fn deleted_keys_disappear() {
    init_tracing();
    let server = make_server(ReleaseStore::new());
    server.publish(
        "demo",
        "default",
        "application",
        mapping(&[("timeout", "30"), ("legacy", "on")]),
    );

    let engine = make_engine(&server);
    engine.poll_once();
    assert_eq!(engine.get("application", "legacy"), Some(json!("on")));

    server.delete_key("demo", "default", "application", "legacy");
    assert_eq!(engine.poll_once().outcome, CycleOutcome::Changed);

    assert_eq!(engine.get("application", "legacy"), None);
    assert_eq!(engine.get("application", "timeout"), Some(json!("30")));
}

#[test]
fn unpublished_namespace_reads_as_empty() {
    init_tracing();
    let server = make_server(ReleaseStore::new());
    let engine = make_engine(&server);

    assert_eq!(engine.try_get("application", "timeout").unwrap(), None);
    assert!(engine.cache().contains("application"));
    assert_eq!(engine.get_or("application", "timeout", "10"), json!("10"));
}

#[test]
fn cached_endpoint_fills_missing_keys() {
    init_tracing();
    let server = make_server(ReleaseStore::new());
    server.publish("demo", "default", "application", mapping(&[("timeout", "30")]));

    let dump = tempfile::tempdir().unwrap();
    let config = make_config(Duration::from_secs(1)).with_dump_dir(dump.path());
    let engine = SyncEngine::new(config.clone(), transport(&config, &server)).unwrap();
    engine.poll_once();

    // Published but not yet seen by the poller.
    server.set("demo", "default", "application", "late", json!("yes"));

    assert_eq!(
        engine.get_or_fetch("application", "late", "no"),
        json!("yes")
    );
    assert_eq!(engine.get("application", "late"), Some(json!("yes")));
    assert_eq!(
        engine.get_or_fetch("application", "absent", "fallback"),
        json!("fallback")
    );

    let written = std::fs::read_to_string(dump.path().join("cached_config")).unwrap();
    let snapshot: Value = serde_json::from_str(&written).unwrap();
    assert_eq!(snapshot["application"]["late"], json!("yes"));
}

#[test]
fn client_start_blocks_for_first_sync() {
    init_tracing();
    let server = make_server(ReleaseStore::new());
    server.publish("demo", "default", "application", mapping(&[("timeout", "30")]));

    let client = make_client(&server, Duration::from_secs(1));
    client.start(false).unwrap();

    assert_eq!(client.state(), LifecycleState::Running);
    assert_eq!(client.get_value("timeout", "10"), json!("30"));

    client.stop();
    assert!(client.join(Duration::from_secs(2)));
    assert!(client.is_stopped());
}

#[test]
fn listener_picks_up_new_release() {
    init_tracing();
    let server = make_server(ReleaseStore::new());
    server.publish("demo", "default", "application", mapping(&[("timeout", "30")]));

    let client = make_client(&server, Duration::from_secs(1));
    client.start(false).unwrap();

    server.set("demo", "default", "application", "timeout", json!("45"));

    let deadline = Instant::now() + Duration::from_secs(5);
    while client.get_value("timeout", "10") != json!("45") {
        assert!(Instant::now() < deadline, "release never arrived");
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(client.globals().get("timeout"), Some(json!("45")));

    client.stop();
    assert!(client.join(Duration::from_secs(2)));
}

#[test]
fn first_access_of_new_namespace_syncs_it() {
    init_tracing();
    let server = make_server(ReleaseStore::new());
    server.publish("demo", "default", "application", mapping(&[("timeout", "30")]));
    server.publish("demo", "default", "db", mapping(&[("pool", "8")]));

    let client = make_client(&server, Duration::from_secs(1));
    client.start(false).unwrap();

    assert!(!client.engine().tracker().contains("db"));
    assert_eq!(client.get("db", "pool", "1"), json!("8"));
    assert!(client.engine().tracker().contains("db"));

    client.stop();
    assert!(client.join(Duration::from_secs(2)));
}

#[test]
fn stop_interrupts_backoff() {
    init_tracing();
    let server = make_server(ReleaseStore::new());
    server.publish("demo", "default", "application", mapping(&[("timeout", "30")]));

    // Backoff (the poll timeout) is far longer than the join below allows.
    let client = make_client(&server, Duration::from_secs(30));
    client.start(false).unwrap();

    server.set_unavailable(true);
    let deadline = Instant::now() + Duration::from_secs(5);
    while client.engine().stats().errors == 0 {
        assert!(Instant::now() < deadline, "listener never saw the outage");
        thread::sleep(Duration::from_millis(10));
    }

    let requests = server.request_count();
    client.stop();
    assert!(client.join(Duration::from_secs(2)));
    assert!(client.is_stopped());
    assert_eq!(server.request_count(), requests);
    // Cached values survive the outage.
    assert_eq!(client.get_value("timeout", "10"), json!("30"));
}

#[test]
fn start_fails_when_service_is_down() {
    init_tracing();
    let server = make_server(ReleaseStore::new());
    server.set_unavailable(true);

    let config = make_config(Duration::from_millis(50))
        .with_startup_deadline(Some(Duration::from_millis(200)));
    let client = ApolloClient::new(config.clone(), transport(&config, &server)).unwrap();

    let err = client.start(false).unwrap_err();
    assert!(matches!(err, SyncError::StartupDeadlineExceeded { .. }));
    assert_eq!(client.state(), LifecycleState::Stopped);
}
