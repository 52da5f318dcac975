// src/watch/mod.rs

//! Directory watching and change normalization.
//!
//! This module is responsible for:
//! - Scanning a directory's initial file listing.
//! - Wiring up a cross-platform filesystem watcher (`notify`).
//! - Debouncing raw watcher events and normalizing them into
//!   [`WatchEvent`]s (`init` / `create` / `update` / `delete`).
//!
//! It does **not** know about compilation or the build graph; it only
//! turns filesystem changes into normalized events for the engine.

pub mod watcher;

pub use watcher::{WatchEvent, WatchKind, WatcherHandle, scan_dir, spawn_dir_watcher};
