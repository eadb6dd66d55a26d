//! Integration tests for the remote simulator's conflict resolution.
//!
//! Drives the simulator through the public `ApiClient` surface, the same
//! way the sync manager does.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use tasksync::api::{
    ApiClient, ApiError, DirectLink, FlakyLink, NetworkConditions, RemoteSimulator,
    configure_client,
};
use tasksync::storage::{KvStore, MemoryStore, clear_local_data, keys, set_json};
use tasksync_proto::outbox::{Operation, OutboxItem};
use tasksync_proto::settings::Settings;
use tasksync_proto::task::{Task, TaskId, TaskPatch, TaskPriority, TaskStatus};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn task(id: &str, title: &str, created: i64, updated: i64) -> Task {
    Task {
        id: TaskId::from(id),
        title: title.to_string(),
        description: String::new(),
        status: TaskStatus::Pending,
        priority: TaskPriority::Medium,
        due_date: None,
        created_at: at(created),
        updated_at: at(updated),
    }
}

fn create(task: &Task) -> OutboxItem {
    OutboxItem::new(
        Operation::Create,
        task.id.clone(),
        Some(task.to_patch()),
        task.updated_at,
    )
}

fn update(id: &str, title: &str, updated: i64) -> OutboxItem {
    let patch = TaskPatch {
        title: Some(title.to_string()),
        ..TaskPatch::default()
    }
    .stamped(at(updated));
    OutboxItem::new(Operation::Update, TaskId::from(id), Some(patch), at(updated))
}

fn delete(id: &str) -> OutboxItem {
    OutboxItem::new(Operation::Delete, TaskId::from(id), None, Utc::now())
}

fn direct() -> (Arc<MemoryStore>, RemoteSimulator<MemoryStore, DirectLink>) {
    let store = Arc::new(MemoryStore::new());
    let sim = RemoteSimulator::new(Arc::clone(&store), DirectLink);
    (store, sim)
}

async fn seeded(tasks: &[Task]) -> (Arc<MemoryStore>, RemoteSimulator<MemoryStore, DirectLink>) {
    let (store, sim) = direct();
    sim.push_all_tasks(tasks).await.unwrap();
    (store, sim)
}

async fn remote_task(sim: &impl ApiClient, id: &str) -> Option<Task> {
    sim.fetch_all_tasks()
        .await
        .unwrap()
        .into_iter()
        .find(|t| t.id.as_str() == id)
}

// ===========================================================================
// Last-writer-wins
// ===========================================================================

#[tokio::test]
async fn newer_update_wins() {
    let (_, sim) = seeded(&[task("t1", "original", 0, 10)]).await;

    let result = sim.apply_change(&update("t1", "edited", 20)).await.unwrap();

    let result = result.expect("update returns the record");
    assert_eq!(result.title, "edited");
    assert_eq!(result.updated_at, at(20));
    assert_eq!(remote_task(&sim, "t1").await.unwrap().title, "edited");
}

#[tokio::test]
async fn stale_update_returns_remote_version() {
    let (_, sim) = seeded(&[task("t1", "remote", 0, 30)]).await;

    let result = sim
        .apply_change(&update("t1", "stale", 20))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(result.title, "remote");
    assert_eq!(result.updated_at, at(30));
}

#[tokio::test]
async fn equal_timestamps_keep_remote_version() {
    let (_, sim) = seeded(&[task("t1", "remote", 0, 30)]).await;

    let result = sim
        .apply_change(&update("t1", "tied", 30))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(result.title, "remote");
}

#[tokio::test]
async fn arrival_order_does_not_decide_the_winner() {
    let base = task("t1", "base", 0, 0);

    let (_, forward) = seeded(std::slice::from_ref(&base)).await;
    forward.apply_change(&update("t1", "older", 10)).await.unwrap();
    forward.apply_change(&update("t1", "newer", 20)).await.unwrap();

    let (_, reverse) = seeded(&[base]).await;
    reverse.apply_change(&update("t1", "newer", 20)).await.unwrap();
    reverse.apply_change(&update("t1", "older", 10)).await.unwrap();

    let a = remote_task(&forward, "t1").await.unwrap();
    let b = remote_task(&reverse, "t1").await.unwrap();
    assert_eq!(a, b);
    assert_eq!(a.title, "newer");
}

#[tokio::test]
async fn update_of_absent_task_returns_none() {
    let (_, sim) = direct();

    let result = sim.apply_change(&update("ghost", "edited", 10)).await.unwrap();

    assert!(result.is_none());
    assert!(sim.fetch_all_tasks().await.unwrap().is_empty());
}

// ===========================================================================
// Create and delete
// ===========================================================================

#[tokio::test]
async fn create_inserts_full_record() {
    let (_, sim) = direct();
    let local = task("t1", "fresh", 5, 5);

    let result = sim.apply_change(&create(&local)).await.unwrap();

    assert_eq!(result.as_ref(), Some(&local));
    assert_eq!(sim.fetch_all_tasks().await.unwrap(), vec![local]);
}

#[tokio::test]
async fn create_against_newer_remote_keeps_remote() {
    let remote = task("t1", "remote", 0, 50);
    let (_, sim) = seeded(std::slice::from_ref(&remote)).await;

    let result = sim
        .apply_change(&create(&task("t1", "local", 0, 40)))
        .await
        .unwrap();

    assert_eq!(result, Some(remote));
    assert_eq!(sim.fetch_all_tasks().await.unwrap().len(), 1);
}

#[tokio::test]
async fn create_against_older_remote_replaces_whole_record() {
    let (_, sim) = seeded(&[task("t1", "remote", 0, 10)]).await;
    let local = task("t1", "local", 3, 40);

    let result = sim.apply_change(&create(&local)).await.unwrap();

    assert_eq!(result.as_ref(), Some(&local));
    assert_eq!(result.unwrap().created_at, at(3));
    assert_eq!(sim.fetch_all_tasks().await.unwrap(), vec![local]);
}

#[tokio::test]
async fn delete_is_idempotent() {
    let (_, sim) = seeded(&[task("t1", "doomed", 0, 0), task("t2", "kept", 0, 0)]).await;

    assert!(sim.apply_change(&delete("t1")).await.unwrap().is_none());
    assert!(sim.apply_change(&delete("t1")).await.unwrap().is_none());
    assert!(sim.apply_change(&delete("never-existed")).await.unwrap().is_none());

    let remaining = sim.fetch_all_tasks().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id.as_str(), "t2");
}

#[tokio::test]
async fn push_overwrites_remote_collection() {
    let (_, sim) = seeded(&[task("old", "gone", 0, 0)]).await;
    let replacement = vec![task("a", "one", 0, 0), task("b", "two", 0, 0)];

    sim.push_all_tasks(&replacement).await.unwrap();

    assert_eq!(sim.fetch_all_tasks().await.unwrap(), replacement);
}

// ===========================================================================
// Link failures and storage layout
// ===========================================================================

#[tokio::test]
async fn link_failure_leaves_remote_untouched() {
    let store = Arc::new(MemoryStore::new());
    let original = vec![task("t1", "original", 0, 0)];
    set_json(store.as_ref(), &keys::remote(keys::TASKS), &original)
        .await
        .unwrap();
    let link = FlakyLink::with_seed(
        NetworkConditions {
            latency: Duration::ZERO,
            failure_rate: 1.0,
        },
        7,
    );
    let sim = RemoteSimulator::new(Arc::clone(&store), link);

    let err = sim.apply_change(&update("t1", "lost", 10)).await.unwrap_err();
    assert!(matches!(err, ApiError::NetworkFailure(_)));
    assert!(err.is_transient());
    assert!(sim.apply_change(&delete("t1")).await.is_err());
    assert!(sim.push_all_tasks(&[]).await.is_err());
    assert!(sim.fetch_all_tasks().await.is_err());

    let fallback = RemoteSimulator::new(store, DirectLink);
    assert_eq!(fallback.fetch_all_tasks().await.unwrap(), original);
}

#[tokio::test]
async fn remote_collection_lives_in_its_own_namespace() {
    let (store, sim) = direct();
    set_json(store.as_ref(), keys::TASKS, &vec![task("local", "mine", 0, 0)])
        .await
        .unwrap();

    sim.apply_change(&create(&task("t1", "remote", 0, 0)))
        .await
        .unwrap();

    assert!(store.raw("server_tasks").is_some());
    assert_eq!(store.get(keys::TASKS).await.unwrap().map(|s| s.contains("local")), Some(true));

    // Clearing local data must not touch the remote collection.
    clear_local_data(store.as_ref()).await.unwrap();
    assert!(store.raw(keys::TASKS).is_none());
    assert_eq!(sim.fetch_all_tasks().await.unwrap().len(), 1);

    sim.clear().await.unwrap();
    assert!(store.raw("server_tasks").is_none());
}

#[tokio::test]
async fn configured_client_round_trips_changes() {
    let store = Arc::new(MemoryStore::new());
    let settings = Settings {
        simulate_network: true,
        simulated_latency_ms: 0,
        simulated_failure_rate: 0.0,
        ..Settings::default()
    };
    let client = configure_client(&settings, store, Some(1)).unwrap();
    let local = task("t1", "draft", 0, 0);

    client.apply_change(&create(&local)).await.unwrap();
    client.apply_change(&update("t1", "final", 5)).await.unwrap();

    let remote = client.fetch_all_tasks().await.unwrap();
    assert_eq!(remote.len(), 1);
    assert_eq!(remote[0].title, "final");
}
