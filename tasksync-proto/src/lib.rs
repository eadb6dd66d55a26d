//! Shared data model for `TaskSync`: tasks, outbox entries, sync state,
//! settings, and their JSON codec.

pub mod codec;
pub mod outbox;
pub mod settings;
pub mod sync;
pub mod task;
