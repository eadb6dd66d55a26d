//! `TaskSync`: offline-first task store with an outbox sync core.

pub mod api;
pub mod app;
pub mod cli;
pub mod config;
pub mod outbox;
pub mod settings;
pub mod storage;
pub mod sync;
pub mod tasks;
