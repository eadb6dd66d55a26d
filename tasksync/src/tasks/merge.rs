//! Last-writer-wins merge rules for task records.
//!
//! The remote simulator is the conflict authority and uses these rules for
//! every incoming change; the local side uses [`merge_task_list`] when it
//! folds a remote snapshot back in.
//!
//! Rules:
//! 1. A strictly newer `updated_at` wins.
//! 2. Equal timestamps: the existing record wins.
//! 3. `id` and `created_at` of an existing record never change.

use std::collections::HashSet;
use std::hash::BuildHasher;

use tasksync_proto::task::{Task, TaskId, TaskPatch};

/// Replaces `existing` with `incoming` if `incoming` is strictly newer.
///
/// Returns `true` if the incoming record won.
pub fn merge_record(existing: &mut Task, incoming: &Task) -> bool {
    if incoming.is_newer_than(existing) {
        let id = existing.id.clone();
        let created_at = existing.created_at;
        *existing = incoming.clone();
        existing.id = id;
        existing.created_at = created_at;
        existing.updated_at = existing.updated_at.max(created_at);
        true
    } else {
        false
    }
}

/// Merges the present fields of `patch` into `existing` if the patch is
/// strictly newer.
///
/// A patch without `updated_at` always loses. Returns `true` if applied.
pub fn merge_patch(existing: &mut Task, patch: &TaskPatch) -> bool {
    match patch.updated_at {
        Some(at) if at > existing.updated_at => {
            patch.apply_to(existing);
            true
        }
        _ => false,
    }
}

/// Folds a remote snapshot into a local collection.
///
/// For each remote task:
/// - ids in `pinned` are left alone (local changes not yet confirmed);
/// - unknown ids are appended (add-wins);
/// - known ids are merged with [`merge_record`].
///
/// Local tasks missing from the snapshot are kept. Returns the number of
/// local records inserted or replaced.
pub fn merge_task_list<S: BuildHasher>(
    local: &mut Vec<Task>,
    remote: &[Task],
    pinned: &HashSet<TaskId, S>,
) -> usize {
    let mut changed = 0;
    for remote_task in remote {
        if pinned.contains(&remote_task.id) {
            continue;
        }
        if let Some(local_task) = local.iter_mut().find(|t| t.id == remote_task.id) {
            if merge_record(local_task, remote_task) {
                changed += 1;
            }
        } else {
            local.push(remote_task.clone());
            changed += 1;
        }
    }
    changed
}
