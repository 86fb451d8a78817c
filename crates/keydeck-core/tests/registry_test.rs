// Integration tests for `ConnectionRegistry` against the mock store
// client, driving the full issue -> completion -> apply pipeline.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use pretty_assertions::assert_eq;
use tokio::sync::{broadcast, mpsc};

use keydeck_api::mock::MockStoreClient;
use keydeck_api::{ApiError, DatabaseSummary, KeyDescriptor, KeyType};
use keydeck_config::{ConnectionConfig, ConnectionStore};
use keydeck_core::{
    Completion, ConnectionRegistry, CoreError, LoadOutcome, NodePath, NodeState, TreeEvent,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn open_store(dir: &tempfile::TempDir) -> ConnectionStore {
    ConnectionStore::open(dir.path().join("connections.toml")).unwrap()
}

fn two_databases() -> Vec<DatabaseSummary> {
    vec![
        DatabaseSummary {
            index: 0,
            key_count: Some(10),
        },
        DatabaseSummary {
            index: 15,
            key_count: None,
        },
    ]
}

fn sample_keys() -> Vec<KeyDescriptor> {
    vec![
        KeyDescriptor::new("user:1", KeyType::Hash),
        KeyDescriptor::new("user:2", KeyType::String),
        KeyDescriptor::new("session:9", KeyType::List),
    ]
}

fn registry_with(
    dir: &tempfile::TempDir,
    client: Arc<MockStoreClient>,
) -> (ConnectionRegistry, mpsc::Receiver<Completion>) {
    let (mut registry, rx) =
        ConnectionRegistry::new(open_store(dir), client).unwrap();
    registry
        .add(ConnectionConfig::new("local", "127.0.0.1"))
        .unwrap();
    (registry, rx)
}

async fn apply_next(registry: &mut ConnectionRegistry, rx: &mut mpsc::Receiver<Completion>) {
    let completion = rx.recv().await.expect("completion should arrive");
    registry.apply(completion);
}

fn drain(rx: &mut broadcast::Receiver<TreeEvent>) -> Vec<TreeEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ── Database-list loading ───────────────────────────────────────────

#[tokio::test]
async fn add_then_load_database_list_populates_children() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(MockStoreClient::new().with_databases(two_databases()));
    let (mut registry, mut rx) = registry_with(&dir, Arc::clone(&client));

    let outcome = registry.load_database_list("local").unwrap();
    assert_eq!(outcome, LoadOutcome::Started);
    assert!(registry.server("local").unwrap().state().is_loading());

    apply_next(&mut registry, &mut rx).await;

    let server = registry.server("local").unwrap();
    assert!(server.state().is_loaded());
    let indices: Vec<u16> = server.databases().iter().map(|db| db.index()).collect();
    assert_eq!(indices, vec![0, 15]);
}

#[tokio::test]
async fn reentrant_database_load_is_coalesced() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(MockStoreClient::new().with_databases(two_databases()));
    let (mut registry, mut rx) = registry_with(&dir, Arc::clone(&client));

    assert_eq!(
        registry.load_database_list("local").unwrap(),
        LoadOutcome::Started
    );
    assert_eq!(
        registry.load_database_list("local").unwrap(),
        LoadOutcome::InFlight
    );

    apply_next(&mut registry, &mut rx).await;
    assert_eq!(client.list_calls(), 1);
    assert_eq!(
        registry.load_database_list("local").unwrap(),
        LoadOutcome::AlreadyLoaded
    );
}

#[tokio::test]
async fn late_completion_after_unload_is_discarded() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(MockStoreClient::new().with_databases(two_databases()));
    let (mut registry, mut rx) = registry_with(&dir, Arc::clone(&client));

    registry.load_database_list("local").unwrap();
    registry.unload("local").unwrap(); // before the completion arrives

    apply_next(&mut registry, &mut rx).await; // stale: must be discarded

    let server = registry.server("local").unwrap();
    assert_eq!(*server.state(), NodeState::Unloaded);
    assert!(server.databases().is_empty());
}

#[tokio::test]
async fn stale_key_completion_after_parent_unload_is_discarded() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(
        MockStoreClient::new()
            .with_databases(two_databases())
            .with_keys(0, sample_keys()),
    );
    let (mut registry, mut rx) = registry_with(&dir, Arc::clone(&client));
    registry.load_database_list("local").unwrap();
    apply_next(&mut registry, &mut rx).await;

    let mut events = registry.subscribe();
    assert_eq!(registry.load_keys("local", 0).unwrap(), LoadOutcome::Started);
    registry.unload("local").unwrap(); // parent unloaded before the keys arrive

    apply_next(&mut registry, &mut rx).await; // stale: must be discarded

    let server = registry.server("local").unwrap();
    assert_eq!(*server.state(), NodeState::Unloaded);
    assert!(server.databases().is_empty());

    // The bulk region opened at issue still flushes on the discard path.
    let flushed = drain(&mut events);
    assert_eq!(flushed.len(), 1);
    assert!(matches!(flushed[0], TreeEvent::BulkUpdateComplete { .. }));
}

#[tokio::test]
async fn unload_then_reload_reproduces_database_identities() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(MockStoreClient::new().with_databases(two_databases()));
    let (mut registry, mut rx) = registry_with(&dir, Arc::clone(&client));

    registry.load_database_list("local").unwrap();
    apply_next(&mut registry, &mut rx).await;
    let first: Vec<u16> = registry.server("local").unwrap().databases().iter().map(|db| db.index()).collect();

    registry.unload("local").unwrap();
    registry.load_database_list("local").unwrap();
    apply_next(&mut registry, &mut rx).await;
    let second: Vec<u16> = registry.server("local").unwrap().databases().iter().map(|db| db.index()).collect();

    assert_eq!(first, second);
}

// ── Locking ─────────────────────────────────────────────────────────

#[tokio::test]
async fn edit_on_locked_server_returns_busy_and_leaves_registry_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(MockStoreClient::new().with_databases(two_databases()));
    let (mut registry, mut rx) = registry_with(&dir, client);

    registry.reload("local").unwrap();
    assert!(registry.server("local").unwrap().is_locked());

    let edited = ConnectionConfig::new("local", "10.0.0.9");
    let err = registry.edit("local", edited).unwrap_err();
    assert!(matches!(err, CoreError::Busy { .. }));
    assert_eq!(registry.server("local").unwrap().config().host, "127.0.0.1");

    let err = registry.remove("local").unwrap_err();
    assert!(matches!(err, CoreError::Busy { .. }));
    let err = registry.unload("local").unwrap_err();
    assert!(matches!(err, CoreError::Busy { .. }));

    apply_next(&mut registry, &mut rx).await;
    assert!(!registry.server("local").unwrap().is_locked());
}

#[tokio::test]
async fn reload_releases_lock_even_when_the_load_fails() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(MockStoreClient::new().fail_databases(ApiError::Disconnected));
    let (mut registry, mut rx) = registry_with(&dir, client);

    registry.reload("local").unwrap();
    assert!(registry.coordinator().is_ui_locked());

    apply_next(&mut registry, &mut rx).await;

    let server = registry.server("local").unwrap();
    assert!(!server.is_locked());
    assert!(!registry.coordinator().is_ui_locked());
    assert!(matches!(server.state(), NodeState::Error(_)));
}

#[tokio::test]
async fn expand_is_refused_while_the_ui_is_locked() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(MockStoreClient::new().with_databases(two_databases()));
    let (mut registry, _rx) = registry_with(&dir, client);

    registry.reload("local").unwrap();

    let err = registry.expand(&NodePath::server("local")).unwrap_err();
    assert!(matches!(err, CoreError::Busy { .. }));
}

// ── Import / export ─────────────────────────────────────────────────

#[tokio::test]
async fn import_with_duplicate_name_is_all_or_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(MockStoreClient::new());
    let (mut registry, _rx) = registry_with(&dir, client);

    // "local" collides with the existing connection.
    let import_path = dir.path().join("import.toml");
    keydeck_config::write_connections_file(
        &import_path,
        &[
            ConnectionConfig::new("other", "10.0.0.1"),
            ConnectionConfig::new("local", "10.0.0.2"),
        ],
    )
    .unwrap();

    let err = registry.import_connections(&import_path).unwrap_err();
    assert!(matches!(err, CoreError::Validation { .. }));
    assert_eq!(registry.len(), 1); // nothing merged
    assert!(registry.server("other").is_none());
}

#[tokio::test]
async fn malformed_import_file_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(MockStoreClient::new());
    let (mut registry, _rx) = registry_with(&dir, client);

    let import_path = dir.path().join("broken.toml");
    std::fs::write(&import_path, "[[connection]\nname=").unwrap();

    let err = registry.import_connections(&import_path).unwrap_err();
    assert!(matches!(err, CoreError::Parse { .. }));
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn export_then_import_round_trips_the_configuration_set() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(MockStoreClient::new());
    let (mut registry, _rx) = registry_with(&dir, Arc::clone(&client));
    registry
        .add(ConnectionConfig::new("staging", "10.1.1.1"))
        .unwrap();

    let export_path = dir.path().join("export.toml");
    registry.export_connections(&export_path).unwrap();

    let other_dir = tempfile::tempdir().unwrap();
    let (mut fresh, _rx2) =
        ConnectionRegistry::new(open_store(&other_dir), client).unwrap();
    let imported = fresh.import_connections(&export_path).unwrap();

    assert_eq!(imported, 2);
    let original: Vec<ConnectionConfig> =
        registry.servers().iter().map(|s| s.config().clone()).collect();
    let round: Vec<ConnectionConfig> =
        fresh.servers().iter().map(|s| s.config().clone()).collect();
    assert_eq!(original, round);
}

#[tokio::test]
async fn edit_persists_across_a_registry_restart() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(MockStoreClient::new());
    let (mut registry, _rx) = registry_with(&dir, Arc::clone(&client));

    let mut edited = ConnectionConfig::new("local", "10.9.9.9");
    edited.port = 6380;
    registry.edit("local", edited.clone()).unwrap();
    drop(registry);

    let (restored, _rx2) =
        ConnectionRegistry::new(open_store(&dir), client).unwrap();
    assert_eq!(restored.server("local").unwrap().config(), &edited);
}

// ── Key loading and filtering ───────────────────────────────────────

async fn loaded_db0(
    client: &Arc<MockStoreClient>,
    dir: &tempfile::TempDir,
) -> (ConnectionRegistry, mpsc::Receiver<Completion>) {
    let (mut registry, mut rx) = registry_with(dir, Arc::clone(client));
    registry.load_database_list("local").unwrap();
    apply_next(&mut registry, &mut rx).await;
    registry.load_keys("local", 0).unwrap();
    apply_next(&mut registry, &mut rx).await;
    (registry, rx)
}

#[tokio::test]
async fn filter_apply_and_reset_restore_the_visible_key_set() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(
        MockStoreClient::new()
            .with_databases(two_databases())
            .with_keys(0, sample_keys()),
    );
    let (mut registry, _rx) = loaded_db0(&client, &dir).await;

    let before: Vec<String> = registry
        .server("local")
        .unwrap()
        .database(0)
        .unwrap()
        .visible_keys()
        .iter()
        .map(|k| k.name().to_owned())
        .collect();
    assert_eq!(before.len(), 3);

    registry.apply_filter("^user:").unwrap();
    let visible = registry
        .server("local")
        .unwrap()
        .database(0)
        .unwrap()
        .visible_keys()
        .len();
    assert_eq!(visible, 2);
    // Presentation-layer only: no second enumeration happened.
    assert_eq!(client.enumerate_calls(), 1);

    registry.reset_filter();
    let after: Vec<String> = registry
        .server("local")
        .unwrap()
        .database(0)
        .unwrap()
        .visible_keys()
        .iter()
        .map(|k| k.name().to_owned())
        .collect();
    assert_eq!(before, after);
}

#[tokio::test]
async fn invalid_filter_patterns_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(MockStoreClient::new());
    let (mut registry, _rx) = registry_with(&dir, client);

    assert!(matches!(
        registry.apply_filter(""),
        Err(CoreError::InvalidFilter { .. })
    ));
    assert!(matches!(
        registry.apply_filter("user:[oops"),
        Err(CoreError::InvalidFilter { .. })
    ));
    assert!(registry.active_filter().is_none());
}

#[tokio::test]
async fn active_filter_is_carried_into_the_next_key_load() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(
        MockStoreClient::new()
            .with_databases(two_databases())
            .with_keys(0, sample_keys()),
    );
    let (mut registry, mut rx) = registry_with(&dir, Arc::clone(&client));

    registry.load_database_list("local").unwrap();
    apply_next(&mut registry, &mut rx).await;

    // Filter set while db0 is still Unloaded: carried into the load.
    registry.apply_filter("^user:").unwrap();
    assert_eq!(registry.load_keys("local", 0).unwrap(), LoadOutcome::Started);
    apply_next(&mut registry, &mut rx).await;

    assert_eq!(client.last_pattern().as_deref(), Some("^user:"));
    let db = registry.server("local").unwrap().database(0).unwrap();
    assert!(db.applied_filter().is_some());
}

#[tokio::test]
async fn filter_reset_during_an_inflight_load_beats_the_sampled_filter() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(
        MockStoreClient::new()
            .with_databases(two_databases())
            .with_keys(0, sample_keys()),
    );
    let (mut registry, mut rx) = registry_with(&dir, Arc::clone(&client));
    registry.load_database_list("local").unwrap();
    apply_next(&mut registry, &mut rx).await;

    registry.apply_filter("^user:").unwrap();
    assert_eq!(registry.load_keys("local", 0).unwrap(), LoadOutcome::Started);

    // Cleared while the enumeration is still in flight: the clear wins.
    registry.reset_filter();
    apply_next(&mut registry, &mut rx).await;

    let db = registry.server("local").unwrap().database(0).unwrap();
    assert!(db.applied_filter().is_none());
    assert_eq!(db.visible_keys().len(), 3);
}

#[tokio::test]
async fn reentrant_key_load_is_coalesced() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(
        MockStoreClient::new()
            .with_databases(two_databases())
            .with_keys(0, sample_keys()),
    );
    let (mut registry, mut rx) = registry_with(&dir, Arc::clone(&client));

    registry.load_database_list("local").unwrap();
    apply_next(&mut registry, &mut rx).await;

    assert_eq!(registry.load_keys("local", 0).unwrap(), LoadOutcome::Started);
    assert_eq!(
        registry.load_keys("local", 0).unwrap(),
        LoadOutcome::InFlight
    );

    apply_next(&mut registry, &mut rx).await;
    assert_eq!(client.enumerate_calls(), 1);
}

#[tokio::test]
async fn key_load_flushes_one_bulk_update_with_timing() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(
        MockStoreClient::new()
            .with_databases(two_databases())
            .with_keys(0, sample_keys()),
    );
    let (mut registry, mut rx) = registry_with(&dir, Arc::clone(&client));
    registry.load_database_list("local").unwrap();
    apply_next(&mut registry, &mut rx).await;

    let mut events = registry.subscribe();
    registry.load_keys("local", 0).unwrap();
    apply_next(&mut registry, &mut rx).await;

    let flushed = drain(&mut events);
    assert_eq!(flushed.len(), 1); // intermediate churn coalesced
    assert!(matches!(
        flushed[0],
        TreeEvent::BulkUpdateComplete { elapsed: Some(_) }
    ));
}

#[tokio::test]
async fn failed_key_load_reports_one_error_and_still_flushes() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(
        MockStoreClient::new()
            .with_databases(two_databases())
            .fail_keys(ApiError::Timeout { timeout_secs: 30 }),
    );
    let (mut registry, mut rx) = registry_with(&dir, Arc::clone(&client));
    registry.load_database_list("local").unwrap();
    apply_next(&mut registry, &mut rx).await;

    let mut events = registry.subscribe();
    registry.load_keys("local", 0).unwrap();
    apply_next(&mut registry, &mut rx).await;

    let db = registry.server("local").unwrap().database(0).unwrap();
    assert!(matches!(db.state(), NodeState::Error(_)));

    let flushed = drain(&mut events);
    // A timeout is retryable, so the error event carries the hint.
    let errors = flushed
        .iter()
        .filter(|e| matches!(e, TreeEvent::LoadError { transient: true, .. }))
        .count();
    let flushes = flushed
        .iter()
        .filter(|e| matches!(e, TreeEvent::BulkUpdateComplete { .. }))
        .count();
    assert_eq!(errors, 1);
    assert_eq!(flushes, 1);
}

// ── Key opening ─────────────────────────────────────────────────────

#[tokio::test]
async fn open_key_emits_a_request_and_refuses_disabled_keys() {
    let dir = tempfile::tempdir().unwrap();
    let mut keys = sample_keys();
    keys.push(KeyDescriptor::new(
        "bf:events",
        "bloomfilter".parse::<KeyType>().unwrap(),
    ));
    let client = Arc::new(
        MockStoreClient::new()
            .with_databases(two_databases())
            .with_keys(0, keys),
    );
    let (registry, _rx) = loaded_db0(&client, &dir).await;

    let mut events = registry.subscribe();
    registry.open_key("local", 0, "user:1", true).unwrap();

    let emitted = drain(&mut events);
    assert!(matches!(
        &emitted[..],
        [TreeEvent::OpenKey { new_tab: true, .. }]
    ));

    let err = registry.open_key("local", 0, "bf:events", false).unwrap_err();
    assert!(matches!(err, CoreError::Disabled { .. }));
    assert!(drain(&mut events).is_empty()); // no event on refusal
}

// ── Server info ─────────────────────────────────────────────────────

#[tokio::test]
async fn info_fetch_failure_caches_an_empty_snapshot_silently() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(MockStoreClient::new().fail_info(ApiError::Disconnected));
    let (mut registry, mut rx) = registry_with(&dir, client);

    registry.fetch_info("local").unwrap();
    apply_next(&mut registry, &mut rx).await;

    assert_eq!(registry.server_info("local"), Some(&[][..]));
}

#[tokio::test]
async fn info_fetch_caches_the_snapshot_independent_of_load_state() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(
        MockStoreClient::new().with_info(vec!["redis_version:7.2".into(), "uptime:42".into()]),
    );
    let (mut registry, mut rx) = registry_with(&dir, client);

    // Server is still Unloaded; info is a side channel.
    registry.fetch_info("local").unwrap();
    apply_next(&mut registry, &mut rx).await;

    let info = registry.server_info("local").unwrap();
    assert_eq!(info.len(), 2);
    assert_eq!(
        *registry.server("local").unwrap().state(),
        NodeState::Unloaded
    );
}

// ── Persistence failure rollback ────────────────────────────────────

#[tokio::test]
async fn add_rolls_back_when_the_save_fails() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(MockStoreClient::new());
    let (mut registry, _rx) = registry_with(&dir, client);

    // Yank the settings directory out from under the store.
    std::fs::remove_dir_all(dir.path()).unwrap();

    let err = registry.add(ConnectionConfig::new("doomed", "10.0.0.3")).unwrap_err();
    assert!(matches!(err, CoreError::Io { .. }));
    assert_eq!(registry.len(), 1);
    assert!(registry.server("doomed").is_none());
}
