//! Persisted user settings.

use std::sync::Arc;

use parking_lot::RwLock;
use tasksync_proto::settings::{Settings, SettingsUpdate};

use crate::storage::{KvStore, PersistWriter, get_json, keys};

/// Owns the current [`Settings`] and persists every change.
pub struct SettingsStore<S: KvStore + 'static> {
    current: RwLock<Settings>,
    writer: Arc<PersistWriter<S>>,
}

impl<S: KvStore + 'static> SettingsStore<S> {
    /// Creates a store holding the defaults.
    #[must_use]
    pub fn new(writer: Arc<PersistWriter<S>>) -> Self {
        Self {
            current: RwLock::new(Settings::default()),
            writer,
        }
    }

    /// Loads stored settings over the defaults.
    ///
    /// Missing keys keep their default values; an out-of-range failure rate
    /// is clamped.
    pub async fn load(&self) -> Settings {
        let stored: Settings =
            get_json(self.writer.store().as_ref(), keys::SETTINGS, Settings::default()).await;
        let loaded = stored.merged(&SettingsUpdate {
            simulated_failure_rate: Some(stored.simulated_failure_rate),
            ..SettingsUpdate::default()
        });
        *self.current.write() = loaded.clone();
        loaded
    }

    /// Returns a copy of the current settings.
    #[must_use]
    pub fn get(&self) -> Settings {
        self.current.read().clone()
    }

    /// Returns `true` if network simulation is on.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.current.read().simulate_network
    }

    /// Applies `update` and returns the resulting settings.
    pub fn update(&self, update: &SettingsUpdate) -> Settings {
        let mut current = self.current.write();
        *current = current.merged(update);
        self.writer.persist(keys::SETTINGS, &*current);
        current.clone()
    }

    /// Flips the network toggle and returns the resulting settings.
    pub fn toggle_network(&self) -> Settings {
        let mut current = self.current.write();
        current.simulate_network = !current.simulate_network;
        self.writer.persist(keys::SETTINGS, &*current);
        current.clone()
    }

    /// Restores the defaults.
    pub fn reset(&self) -> Settings {
        let mut current = self.current.write();
        *current = Settings::default();
        self.writer.persist(keys::SETTINGS, &*current);
        current.clone()
    }
}
