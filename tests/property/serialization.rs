//! Property-based tests for the stored JSON shapes.
//!
//! Uses proptest to verify:
//! 1. Any task collection survives encode → decode.
//! 2. Any outbox entry, including tri-state due-date patches, survives
//!    encode → decode.
//! 3. Random bytes never cause a panic in `decode_bytes`.
//! 4. A patch built from a task converts back into the same task.

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use tasksync_proto::codec;
use tasksync_proto::outbox::{Operation, OutboxItem};
use tasksync_proto::settings::Settings;
use tasksync_proto::task::{Task, TaskId, TaskPatch, TaskPriority, TaskStatus};
use uuid::Uuid;

// --- Strategies for the data model ---

/// Strategy for timestamps between 2001 and 2033 with nanosecond precision.
fn arb_timestamp() -> impl Strategy<Value = DateTime<Utc>> {
    (1_000_000_000i64..2_000_000_000, 0u32..1_000_000_000).prop_map(|(secs, nanos)| {
        Utc.timestamp_opt(secs, nanos)
            .single()
            .unwrap_or_else(Utc::now)
    })
}

fn arb_task_id() -> impl Strategy<Value = TaskId> {
    any::<u128>().prop_map(|n| TaskId::from(Uuid::from_u128(n).to_string()))
}

fn arb_status() -> impl Strategy<Value = TaskStatus> {
    prop::sample::select(TaskStatus::ALL.to_vec())
}

fn arb_priority() -> impl Strategy<Value = TaskPriority> {
    prop::sample::select(TaskPriority::ALL.to_vec())
}

/// Strategy for valid tasks (`updated_at >= created_at`).
fn arb_task() -> impl Strategy<Value = Task> {
    (
        arb_task_id(),
        "[^\x00]{1,64}",
        ".{0,128}",
        arb_status(),
        arb_priority(),
        prop::option::of(arb_timestamp()),
        arb_timestamp(),
        0i64..1_000_000,
    )
        .prop_map(
            |(id, title, description, status, priority, due_date, created_at, delta)| Task {
                id,
                title,
                description,
                status,
                priority,
                due_date,
                created_at,
                updated_at: created_at + chrono::Duration::seconds(delta),
            },
        )
}

/// Strategy for sparse patches, covering absent / null / set due dates.
fn arb_patch() -> impl Strategy<Value = TaskPatch> {
    (
        prop::option::of(".{0,64}"),
        prop::option::of(arb_status()),
        prop::option::of(arb_priority()),
        prop::option::of(prop::option::of(arb_timestamp())),
        prop::option::of(arb_timestamp()),
    )
        .prop_map(|(title, status, priority, due_date, updated_at)| TaskPatch {
            title,
            status,
            priority,
            due_date,
            updated_at,
            ..TaskPatch::default()
        })
}

fn arb_outbox_item() -> impl Strategy<Value = OutboxItem> {
    (
        prop::sample::select(vec![Operation::Create, Operation::Update, Operation::Delete]),
        arb_task_id(),
        prop::option::of(arb_patch()),
        arb_timestamp(),
        0u32..10,
    )
        .prop_map(|(operation, task_id, payload, timestamp, retries)| {
            let mut item = OutboxItem::new(operation, task_id, payload, timestamp);
            item.retry_count = retries;
            item
        })
}

// --- Properties ---

proptest! {
    #[test]
    fn task_collection_roundtrip(tasks in prop::collection::vec(arb_task(), 0..8)) {
        let text = codec::encode(&tasks).unwrap();
        let decoded: Vec<Task> = codec::decode(&text).unwrap();
        prop_assert_eq!(decoded, tasks);
    }

    #[test]
    fn outbox_roundtrip(items in prop::collection::vec(arb_outbox_item(), 0..8)) {
        let text = codec::encode(&items).unwrap();
        let decoded: Vec<OutboxItem> = codec::decode(&text).unwrap();
        prop_assert_eq!(decoded, items);
    }

    #[test]
    fn random_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = codec::decode_bytes::<Vec<Task>>(&bytes);
        let _ = codec::decode_bytes::<Vec<OutboxItem>>(&bytes);
        let _ = codec::decode_bytes::<Settings>(&bytes);
    }

    #[test]
    fn full_patch_rebuilds_the_task(task in arb_task()) {
        let rebuilt = task.to_patch().to_task(&task.id);
        prop_assert_eq!(rebuilt, Some(task));
    }
}

#[test]
fn settings_missing_keys_fall_back_to_defaults() {
    let settings: Settings = codec::decode(r#"{"simulateNetwork":true}"#).unwrap();
    assert!(settings.simulate_network);
    assert_eq!(settings.simulated_latency_ms, Settings::default().simulated_latency_ms);
}
