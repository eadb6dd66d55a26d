//! Key/value persistence for `TaskSync`.
//!
//! Defines the [`KvStore`] trait that storage backends satisfy, the key
//! layout shared by the local app state and the remote simulator, and JSON
//! helpers on top of raw string values. Concrete stores:
//! - [`memory::MemoryStore`]: in-process map, used by tests and demos
//! - [`file::FileStore`]: one JSON file per key under a data directory
//!
//! Local writes go through [`writer::PersistWriter`], which keeps one
//! ordered write lane per key so callers never wait on disk.

pub mod file;
pub mod memory;
pub mod writer;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tasksync_proto::codec::{self, CodecError};

pub use file::FileStore;
pub use memory::MemoryStore;
pub use writer::PersistWriter;

/// Storage keys.
///
/// The remote simulator keeps its collection under [`REMOTE_PREFIX`], so the
/// local and remote task collections never share a key.
pub mod keys {
    /// Local task collection.
    pub const TASKS: &str = "tasks";
    /// Pending outbox entries.
    pub const OUTBOX: &str = "outbox";
    /// User settings.
    pub const SETTINGS: &str = "settings";
    /// Time of the last full drain.
    pub const LAST_SYNC: &str = "lastSync";
    /// Prefix for every key owned by the remote simulator.
    pub const REMOTE_PREFIX: &str = "server_";

    /// Returns the remote-namespace form of `key`.
    #[must_use]
    pub fn remote(key: &str) -> String {
        format!("{REMOTE_PREFIX}{key}")
    }

    /// Returns `true` if `key` belongs to the remote namespace.
    #[must_use]
    pub fn is_remote(key: &str) -> bool {
        key.starts_with(REMOTE_PREFIX)
    }
}

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying storage is unavailable.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The key cannot be mapped onto the backend.
    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),

    /// A stored value could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// An underlying I/O error occurred.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Async key/value storage of UTF-8 values.
///
/// Implementations include:
/// - `MemoryStore`: in-memory map
/// - `FileStore`: JSON files in a directory
pub trait KvStore: Send + Sync {
    /// Read the value stored under `key`, if any.
    fn get(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<String>, StoreError>> + Send;

    /// Store `value` under `key`, replacing any previous value.
    fn set(
        &self,
        key: &str,
        value: String,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Remove `key`. Removing a missing key is not an error.
    fn delete(&self, key: &str)
    -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// List every key currently stored.
    fn keys(&self) -> impl std::future::Future<Output = Result<Vec<String>, StoreError>> + Send;
}

/// Reads and decodes the JSON value under `key`.
///
/// Returns `Ok(None)` if the key is missing.
///
/// # Errors
///
/// Returns [`StoreError`] if the read fails or the value is malformed.
pub async fn read_json<S, T>(store: &S, key: &str) -> Result<Option<T>, StoreError>
where
    S: KvStore + ?Sized,
    T: DeserializeOwned,
{
    match store.get(key).await? {
        Some(text) if !text.is_empty() => Ok(Some(codec::decode(&text)?)),
        _ => Ok(None),
    }
}

/// Reads the JSON value under `key`, falling back to `default`.
///
/// Missing keys, read failures, and malformed values all yield the default;
/// the latter two are logged.
pub async fn get_json<S, T>(store: &S, key: &str, default: T) -> T
where
    S: KvStore + ?Sized,
    T: DeserializeOwned,
{
    match read_json(store, key).await {
        Ok(Some(value)) => value,
        Ok(None) => default,
        Err(err) => {
            tracing::warn!(key, error = %err, "stored value unreadable, using default");
            default
        }
    }
}

/// Encodes `value` as JSON and stores it under `key`.
///
/// # Errors
///
/// Returns [`StoreError`] if encoding or the write fails.
pub async fn set_json<S, T>(store: &S, key: &str, value: &T) -> Result<(), StoreError>
where
    S: KvStore + ?Sized,
    T: Serialize + ?Sized,
{
    let text = codec::encode(value)?;
    store.set(key, text).await
}

/// Removes every key for which `predicate` returns `true`.
///
/// Returns the number of keys removed.
///
/// # Errors
///
/// Returns [`StoreError`] if listing or deleting fails.
pub async fn clear_matching<S, F>(store: &S, predicate: F) -> Result<usize, StoreError>
where
    S: KvStore + ?Sized,
    F: Fn(&str) -> bool,
{
    let mut removed = 0;
    for key in store.keys().await? {
        if predicate(&key) {
            store.delete(&key).await?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Removes every local (non-remote) key.
///
/// # Errors
///
/// Returns [`StoreError`] if listing or deleting fails.
pub async fn clear_local_data<S: KvStore + ?Sized>(store: &S) -> Result<usize, StoreError> {
    clear_matching(store, |k| !keys::is_remote(k)).await
}

/// Removes every remote-namespace key.
///
/// # Errors
///
/// Returns [`StoreError`] if listing or deleting fails.
pub async fn clear_remote_data<S: KvStore + ?Sized>(store: &S) -> Result<usize, StoreError> {
    clear_matching(store, keys::is_remote).await
}
