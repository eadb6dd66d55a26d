//! Integration tests for the outbox drain.
//!
//! A scripted mock client records every `apply_change` call and fails on
//! demand, so ordering, retry accounting, and status transitions can be
//! checked without a remote simulator in the way.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use parking_lot::Mutex;

use tasksync::api::{ApiClient, ApiError};
use tasksync::app::AppState;
use tasksync::outbox::OutboxQueue;
use tasksync::storage::{MemoryStore, PersistWriter, keys, read_json};
use tasksync::sync::{DrainOutcome, DrainReport, MAX_RETRIES, SyncManager};
use tasksync_proto::outbox::{Operation, OutboxItem};
use tasksync_proto::settings::SettingsUpdate;
use tasksync_proto::sync::SyncStatus;
use tasksync_proto::task::{NewTask, Task, TaskId, TaskPatch, TaskStatus};

// ---------------------------------------------------------------------------
// Mock client
// ---------------------------------------------------------------------------

/// Records calls; fails the next `fail_next` calls and any call for a task
/// in `failing_tasks`. Every call first waits on `gate`.
#[derive(Default)]
struct MockClient {
    calls: Mutex<Vec<OutboxItem>>,
    fail_next: AtomicUsize,
    failing_tasks: Mutex<HashSet<TaskId>>,
    gate: tokio::sync::Mutex<()>,
}

impl MockClient {
    fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    fn fail_task(&self, id: &str) {
        self.failing_tasks.lock().insert(TaskId::from(id));
    }

    fn calls(&self) -> Vec<OutboxItem> {
        self.calls.lock().clone()
    }
}

impl ApiClient for MockClient {
    async fn fetch_all_tasks(&self) -> Result<Vec<Task>, ApiError> {
        Ok(Vec::new())
    }

    async fn apply_change(&self, item: &OutboxItem) -> Result<Option<Task>, ApiError> {
        let _gate = self.gate.lock().await;
        self.calls.lock().push(item.clone());
        let scripted = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scripted || self.failing_tasks.lock().contains(&item.task_id) {
            return Err(ApiError::NetworkFailure("mock failure".to_string()));
        }
        Ok(None)
    }

    async fn push_all_tasks(&self, _tasks: &[Task]) -> Result<(), ApiError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

type Manager = SyncManager<MemoryStore, Arc<MockClient>>;

fn setup(online: bool) -> (Arc<AppState<MemoryStore>>, Arc<MockClient>, Manager) {
    let store = Arc::new(MemoryStore::new());
    let state = Arc::new(AppState::new(store));
    state.settings.update(&SettingsUpdate {
        simulate_network: Some(online),
        ..SettingsUpdate::default()
    });
    let client = Arc::new(MockClient::default());
    let sync = SyncManager::new(Arc::clone(&state), Arc::clone(&client));
    (state, client, sync)
}

fn completed_patch() -> Option<TaskPatch> {
    Some(TaskPatch {
        status: Some(TaskStatus::Completed),
        ..TaskPatch::default()
    })
}

fn outbox(state: &AppState<MemoryStore>) -> &OutboxQueue<MemoryStore> {
    &state.outbox
}

async fn drain_report(sync: &Manager) -> DrainReport {
    match sync.drain().await {
        DrainOutcome::Completed(report) => report,
        DrainOutcome::AlreadyRunning => panic!("no other pass should be running"),
    }
}

// ===========================================================================
// Ordering
// ===========================================================================

#[tokio::test]
async fn drain_applies_entries_in_fifo_order() {
    let (state, client, sync) = setup(true);
    let task = Task::from_new(NewTask::titled("write report"), Utc::now());
    let a = outbox(&state).enqueue(Operation::Create, task.id.clone(), Some(task.to_patch()));
    let b = outbox(&state).enqueue(Operation::Update, task.id.clone(), completed_patch());

    let report = drain_report(&sync).await;

    let order: Vec<_> = client.calls().into_iter().map(|i| i.id).collect();
    assert_eq!(order, vec![a.id, b.id]);
    assert_eq!(report.applied, 2);
    assert_eq!(report.status, SyncStatus::Synced);
    assert!(outbox(&state).is_empty());
}

#[tokio::test]
async fn retried_entry_keeps_its_position() {
    let (state, client, sync) = setup(true);
    let a = outbox(&state).enqueue(Operation::Update, TaskId::from("t1"), completed_patch());
    let b = outbox(&state).enqueue(Operation::Update, TaskId::from("t1"), completed_patch());

    client.fail_next(1);
    drain_report(&sync).await;
    assert_eq!(outbox(&state).snapshot()[0].id, a.id);
    assert_eq!(outbox(&state).len(), 1);

    drain_report(&sync).await;
    let order: Vec<_> = client.calls().into_iter().map(|i| i.id).collect();
    assert_eq!(order, vec![a.id.clone(), b.id, a.id]);
    assert!(outbox(&state).is_empty());
}

// ===========================================================================
// Short-circuits
// ===========================================================================

#[tokio::test]
async fn offline_drain_touches_nothing() {
    let (state, client, sync) = setup(false);
    outbox(&state).enqueue(Operation::Delete, TaskId::from("t1"), None);

    let report = drain_report(&sync).await;

    assert_eq!(report.status, SyncStatus::Offline);
    assert!(client.calls().is_empty());
    let items = outbox(&state).snapshot();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].retry_count, 0);
}

#[tokio::test]
async fn empty_queue_marks_synced_without_calling_client() {
    let (state, client, sync) = setup(true);
    let before = Utc::now();

    let report = drain_report(&sync).await;

    assert_eq!(report.status, SyncStatus::Synced);
    assert!(client.calls().is_empty());
    let last = sync.state().last_sync_time.expect("last sync time stamped");
    assert!(last >= before);

    state.flush().await;
    let stored: Option<chrono::DateTime<Utc>> =
        read_json(state.store.as_ref(), keys::LAST_SYNC).await.unwrap();
    assert_eq!(stored, Some(last));
}

// ===========================================================================
// Retry policy
// ===========================================================================

#[tokio::test]
async fn entry_at_retry_ceiling_is_never_sent() {
    let (state, client, sync) = setup(true);
    let item = outbox(&state).enqueue(Operation::Delete, TaskId::from("t1"), None);
    for _ in 0..MAX_RETRIES {
        outbox(&state).increment_retry(&item.id);
    }

    let report = drain_report(&sync).await;

    assert!(client.calls().is_empty());
    assert_eq!(report.skipped, 1);
    assert_eq!(outbox(&state).len(), 1);
    assert_eq!(report.status, SyncStatus::Synced);
}

#[tokio::test]
async fn single_failure_bumps_retry_without_error_message() {
    let (state, client, sync) = setup(true);
    outbox(&state).enqueue(Operation::Update, TaskId::from("t1"), completed_patch());
    client.fail_next(1);

    drain_report(&sync).await;

    let snapshot = sync.state();
    assert_eq!(snapshot.outbox.len(), 1);
    assert_eq!(snapshot.outbox[0].retry_count, 1);
    // The message is reserved for the pass that reaches the ceiling.
    assert!(snapshot.error.is_none());
    // A pending entry below the ceiling after a failed attempt.
    assert_eq!(snapshot.status, SyncStatus::Error);
}

#[tokio::test]
async fn error_message_is_set_on_the_crossing_pass_only() {
    let (state, client, sync) = setup(true);
    outbox(&state).enqueue(
        Operation::Update,
        TaskId::from("0123456789abcdef"),
        completed_patch(),
    );
    client.fail_task("0123456789abcdef");

    drain_report(&sync).await;
    drain_report(&sync).await;
    assert!(sync.state().error.is_none());

    let crossing = drain_report(&sync).await;
    assert_eq!(crossing.exhausted, 1);
    let snapshot = sync.state();
    assert_eq!(
        snapshot.error.as_deref(),
        Some("Failed to sync: update 01234567...")
    );
    assert_eq!(snapshot.outbox[0].retry_count, MAX_RETRIES);

    // Already at the ceiling: skipped, the error is cleared at pass start
    // and not set again.
    let after = drain_report(&sync).await;
    assert_eq!(after.skipped, 1);
    assert_eq!(client.calls().len(), 3);
    assert!(sync.state().error.is_none());
    assert_eq!(after.status, SyncStatus::Synced);
}

#[tokio::test]
async fn crossing_pass_with_nothing_left_is_synced_but_keeps_message() {
    let (state, client, sync) = setup(true);
    let item = outbox(&state).enqueue(Operation::Delete, TaskId::from("t1"), None);
    outbox(&state).increment_retry(&item.id);
    outbox(&state).increment_retry(&item.id);
    client.fail_next(1);

    let report = drain_report(&sync).await;

    assert_eq!(report.exhausted, 1);
    assert_eq!(report.status, SyncStatus::Synced);
    assert!(sync.state().error.is_some());
}

#[tokio::test]
async fn failure_does_not_stop_the_pass() {
    let (state, client, sync) = setup(true);
    outbox(&state).enqueue(Operation::Update, TaskId::from("t1"), completed_patch());
    let ok = outbox(&state).enqueue(Operation::Delete, TaskId::from("t2"), None);
    client.fail_task("t1");

    let report = drain_report(&sync).await;

    assert_eq!(client.calls().len(), 2);
    assert_eq!(report.applied, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.status, SyncStatus::Error);
    assert!(outbox(&state).get(&ok.id).is_none());
}

#[tokio::test]
async fn retry_counts_are_persisted() {
    let (state, client, sync) = setup(true);
    outbox(&state).enqueue(Operation::Update, TaskId::from("t1"), completed_patch());
    client.fail_next(1);
    drain_report(&sync).await;
    state.flush().await;

    let writer = Arc::new(PersistWriter::new(Arc::clone(&state.store)));
    let reloaded = OutboxQueue::new(writer);
    reloaded.load().await;
    assert_eq!(reloaded.snapshot()[0].retry_count, 1);
}

// ===========================================================================
// Concurrency
// ===========================================================================

#[tokio::test]
async fn concurrent_trigger_is_ignored() {
    let (state, client, sync) = setup(true);
    outbox(&state).enqueue(Operation::Delete, TaskId::from("t1"), None);

    let gate = client.gate.lock().await;
    let (first, second) = tokio::join!(sync.drain(), async {
        let outcome = sync.drain().await;
        drop(gate);
        outcome
    });

    assert_eq!(second, DrainOutcome::AlreadyRunning);
    assert_eq!(first.status(), Some(SyncStatus::Synced));
    assert_eq!(client.calls().len(), 1);
}

#[tokio::test]
async fn entry_enqueued_mid_pass_is_sent_in_the_same_pass() {
    let (state, client, sync) = setup(true);
    client.fail_task("t2");
    outbox(&state).enqueue(Operation::Delete, TaskId::from("t1"), None);
    outbox(&state).enqueue(Operation::Delete, TaskId::from("t2"), None);

    let gate = client.gate.lock().await;
    let (outcome, late) = tokio::join!(sync.drain(), async {
        let late = outbox(&state).enqueue(Operation::Delete, TaskId::from("t3"), None);
        drop(gate);
        late
    });

    let sent: Vec<String> = client.calls().iter().map(|i| i.task_id.to_string()).collect();
    assert_eq!(sent, ["t1", "t2", "t3"]);
    assert!(matches!(outcome, DrainOutcome::Completed(r) if r.applied == 2 && r.failed == 1));
    assert!(outbox(&state).get(&late.id).is_none());
    assert_eq!(outbox(&state).len(), 1);
}

#[tokio::test]
async fn interleaved_failures_keep_the_survivors_in_order() {
    let (state, client, sync) = setup(true);
    for id in ["t0", "t1", "t2", "t3", "t4", "t5"] {
        outbox(&state).enqueue(Operation::Delete, TaskId::from(id), None);
    }
    client.fail_task("t1");
    client.fail_task("t4");

    let report = drain_report(&sync).await;

    assert_eq!(client.calls().len(), 6);
    assert_eq!(report.applied, 4);
    assert_eq!(report.failed, 2);
    let left: Vec<String> = outbox(&state)
        .snapshot()
        .iter()
        .map(|i| i.task_id.to_string())
        .collect();
    assert_eq!(left, ["t1", "t4"]);
}
