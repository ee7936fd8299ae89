// Copyright (c) 2025 - Cowboy AI, Inc.
//! Tests against a live JetStream server
//!
//! Run with: cargo test --test nats_tests -- --ignored
//!
//! Prerequisites: NATS with JetStream on localhost:4222 (or NATS_URL).

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;

use sync_infrastructure::config::RouterConfig;
use sync_infrastructure::credentials::{
    CredentialStore, InsertOutcome, KvCredentialStore, NewCredential, UpdateOutcome,
};
use sync_infrastructure::events::{fields, DeviceTelemetryRecord, EventKind};
use sync_infrastructure::jetstream::{
    ensure_pull_consumer, ensure_stream, open_bucket, ConsumerConfig, JetStreamConfig,
    StorageType,
};
use sync_infrastructure::listener::spawn_listener;
use sync_infrastructure::projection::{
    IdentityProjectionConsumer, IdentitySnapshot, KvReplicaStore, ProjectionProfile,
    ReplicaStore, SyncEventHandler,
};
use sync_infrastructure::SyncError;
use sync_infrastructure::router::PartitionRouter;
use sync_infrastructure::subjects::{Domain, SubjectBuilder};
use sync_infrastructure::{DomainEvent, EventPublisher, NatsClient, NatsConfig};

async fn connect(name: &str) -> NatsClient {
    let config = NatsConfig::from_env(name).expect("NATS configuration");
    NatsClient::new(config).await.expect("NATS server running")
}

/// Unique suffix so runs do not see each other's streams
fn run_id() -> String {
    format!("{}", chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default())
}

#[tokio::test]
#[ignore = "requires NATS server"]
async fn test_published_event_reaches_kv_replica() {
    // Given a sync stream, a replica bucket and a running listener
    let client = connect("sync-test").await;
    let run = run_id();
    let mut stream_config = JetStreamConfig::sync_events(&format!("SYNC_TEST_{run}"));
    stream_config.subjects = vec![format!("test{run}.user.sync")];
    stream_config.storage = StorageType::Memory;
    let stream = ensure_stream(client.jetstream(), stream_config).await.unwrap();

    let bucket = open_bucket(client.jetstream(), &format!("test_replica_{run}"))
        .await
        .unwrap();
    let store = Arc::new(KvReplicaStore::new(bucket));
    let projection = Arc::new(IdentityProjectionConsumer::new(
        ProjectionProfile::AUTHORIZATION_USERS,
        store.clone(),
    ));
    let consumer = ensure_pull_consumer(
        &stream,
        ConsumerConfig::new(format!("test-{run}"), format!("test{run}.user.sync")),
    )
    .await
    .unwrap();
    let listener = spawn_listener(
        consumer,
        Arc::new(SyncEventHandler::new(projection, Duration::from_millis(100))),
    );

    // When the owning service publishes a promotion
    let event = DomainEvent::user_updated(42, Some("ana"), None, Some("admin"));
    client
        .jetstream()
        .publish(format!("test{run}.user.sync"), event.to_bytes().unwrap())
        .await
        .unwrap()
        .await
        .unwrap();

    // Then the replica row appears
    let mut row = None;
    for _ in 0..50 {
        if let Some(found) = store.load(42).await.unwrap() {
            row = Some(found.value);
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    let row = row.expect("row replicated");
    assert_eq!(row.field_str(fields::ROLE), Some("ADMIN"));

    listener.abort();
}

#[tokio::test]
#[ignore = "requires NATS server"]
async fn test_publisher_targets_domain_subject() {
    let client = connect("sync-test").await;
    let url = std::env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string());
    let observer = async_nats::connect(url).await.unwrap();
    let mut subscription = observer
        .subscribe(SubjectBuilder::new().domain(Domain::Device).build())
        .await
        .unwrap();
    ensure_stream(client.jetstream(), JetStreamConfig::sync_events("SYNC_EVENTS"))
        .await
        .unwrap();

    let publisher = EventPublisher::new(Arc::new(client.clone()));
    publisher
        .publish(&DomainEvent::device_deleted(7))
        .await
        .unwrap();

    let message = tokio::time::timeout(Duration::from_secs(5), subscription.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.subject.as_str(), "device.sync");
}

#[tokio::test]
#[ignore = "requires NATS server"]
async fn test_router_publishes_to_shard_stream() {
    let client = connect("router-test").await;
    let run = run_id();
    let prefix = format!("test{run}.queue.");
    let mut stream_config = JetStreamConfig::ingest(&prefix);
    stream_config.stream_name = format!("INGEST_TEST_{run}");
    stream_config.storage = StorageType::Memory;
    let stream = ensure_stream(client.jetstream(), stream_config).await.unwrap();

    let config = RouterConfig {
        ingest_prefix: prefix.clone(),
        ..RouterConfig::default()
    };
    let router = PartitionRouter::from_config(&config, Arc::new(client.clone()));
    let record = DeviceTelemetryRecord::decode(
        br#"{"timestamp":"2025-11-03T10:00:00","device_id":7,"measured_value":0.42}"#,
    )
    .unwrap();
    let shard = router.route(&record).await.unwrap();

    let consumer = ensure_pull_consumer(&stream, ConsumerConfig::ingest_queue(&prefix, shard))
        .await
        .unwrap();
    let mut messages = consumer.fetch().max_messages(1).messages().await.unwrap();
    let message = messages.next().await.unwrap().unwrap();
    assert_eq!(DeviceTelemetryRecord::decode(&message.payload).unwrap(), record);
    message.ack().await.unwrap();
}

async fn credential_store(client: &NatsClient, run: &str) -> KvCredentialStore {
    let rows = open_bucket(client.jetstream(), &format!("test_credentials_{run}"))
        .await
        .unwrap();
    let usernames = open_bucket(client.jetstream(), &format!("test_usernames_{run}"))
        .await
        .unwrap();
    KvCredentialStore::new(rows, usernames)
}

fn new_credential(user_id: i64, username: &str) -> NewCredential {
    NewCredential {
        user_id,
        username: username.to_string(),
        password_hash: "plain:pw".to_string(),
        role: "CLIENT".to_string(),
    }
}

#[tokio::test]
#[ignore = "requires NATS server"]
async fn test_kv_replica_create_and_conflict() {
    let client = connect("sync-test").await;
    let bucket = open_bucket(client.jetstream(), &format!("test_rows_{}", run_id()))
        .await
        .unwrap();
    let store = KvReplicaStore::new(bucket);
    let mut row = IdentitySnapshot::new(42, EventKind::Created);
    row.display_fields
        .insert(fields::USERNAME.to_string(), serde_json::json!("ana"));

    // First write creates the key
    let first = store.save(&row, None).await.unwrap();

    // A second blind create loses to the existing row
    assert!(matches!(
        store.save(&row, None).await,
        Err(SyncError::RevisionConflict { .. })
    ));
    // A stale revision loses too
    let second = store.save(&row, Some(first)).await.unwrap();
    assert!(matches!(
        store.save(&row, Some(first)).await,
        Err(SyncError::RevisionConflict { .. })
    ));

    // A removed row can be created again
    assert!(store.remove(42).await.unwrap());
    assert!(store.save(&row, None).await.unwrap() > second);
}

#[tokio::test]
#[ignore = "requires NATS server"]
async fn test_kv_credentials_enforce_uniqueness() {
    let client = connect("sync-test").await;
    let store = credential_store(&client, &run_id()).await;

    assert!(matches!(
        store.insert(new_credential(1, "ana")).await.unwrap(),
        InsertOutcome::Inserted(_)
    ));
    assert_eq!(
        store.insert(new_credential(1, "other")).await.unwrap(),
        InsertOutcome::UserExists
    );
    assert_eq!(
        store.insert(new_credential(2, "ana")).await.unwrap(),
        InsertOutcome::UsernameTaken
    );
    // The rejected "other" claim was never taken
    assert!(store.find_by_username("other").await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires NATS server"]
async fn test_kv_credentials_rename_moves_index() {
    let client = connect("sync-test").await;
    let store = credential_store(&client, &run_id()).await;
    store.insert(new_credential(1, "ana")).await.unwrap();
    store.insert(new_credential(2, "bo")).await.unwrap();

    let mut ana = store.find_by_user_id(1).await.unwrap().unwrap();
    ana.username = "bo".to_string();
    assert_eq!(store.update(&ana).await.unwrap(), UpdateOutcome::UsernameTaken);

    ana.username = "anna".to_string();
    assert_eq!(store.update(&ana).await.unwrap(), UpdateOutcome::Updated);
    assert!(store.find_by_username("ana").await.unwrap().is_none());
    assert_eq!(store.find_by_username("anna").await.unwrap().unwrap().user_id, 1);

    // The freed name is available to someone else
    assert!(matches!(
        store.insert(new_credential(3, "ana")).await.unwrap(),
        InsertOutcome::Inserted(_)
    ));
}

#[tokio::test]
#[ignore = "requires NATS server"]
async fn test_kv_credentials_delete_frees_username() {
    let client = connect("sync-test").await;
    let store = credential_store(&client, &run_id()).await;
    store.insert(new_credential(1, "ana")).await.unwrap();

    assert!(store.delete_by_user_id(1).await.unwrap());
    assert!(!store.delete_by_user_id(1).await.unwrap());
    assert!(matches!(
        store.insert(new_credential(2, "ana")).await.unwrap(),
        InsertOutcome::Inserted(_)
    ));
    // The deleted user can come back under a new name
    assert!(matches!(
        store.insert(new_credential(1, "ana2")).await.unwrap(),
        InsertOutcome::Inserted(_)
    ));
}
