// src/watch/watcher.rs

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use notify::event::RemoveKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::fs::{FileSystem, walk_files};

/// Kind of a normalized change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchKind {
    /// Emitted for every file found by the initial scan. Compilation
    /// triggered by `init` events is deferred by the engine until all
    /// initial files are loaded.
    Init,
    Create,
    Update,
    Delete,
}

/// A normalized change event for one path inside a watched directory.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub kind: WatchKind,
    /// Absolute path of the changed file or directory.
    pub path: PathBuf,
    pub is_dir: bool,
}

/// Handle for one directory's filesystem watcher.
///
/// This exists mainly so the underlying `RecommendedWatcher` is kept alive
/// for as long as needed. Dropping this handle stops file watching.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").finish()
    }
}

/// Produce `init` events for every file currently under `root`.
pub fn scan_dir(fs: &dyn FileSystem, root: &Path) -> Result<Vec<WatchEvent>> {
    let files = walk_files(fs, root)?;
    Ok(files
        .into_iter()
        .map(|path| WatchEvent {
            kind: WatchKind::Init,
            path,
            is_dir: false,
        })
        .collect())
}

/// Spawn a filesystem watcher observing `root` recursively.
///
/// Raw notify events are bridged into the async world over an unbounded
/// channel, debounced (trailing edge, per path), normalized into
/// [`WatchEvent`]s and forwarded to `tx` tagged with `dir_index` so the
/// engine knows which watched directory they belong to.
pub fn spawn_dir_watcher(
    root: impl Into<PathBuf>,
    dir_index: usize,
    debounce: Duration,
    tx: mpsc::Sender<(usize, WatchEvent)>,
) -> Result<WatcherHandle> {
    let root = root.into();

    // Channel from the blocking notify callback into the async world.
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    if let Err(err) = event_tx.send(event) {
                        // tracing isn't reliable inside the notify callback,
                        // so fall back to stderr.
                        eprintln!("kiln: failed to forward notify event: {err}");
                    }
                }
                Err(err) => {
                    eprintln!("kiln: file watch error: {err}");
                }
            }
        },
        Config::default(),
    )?;

    watcher.watch(&root, RecursiveMode::Recursive)?;

    info!(dir = ?root, "file watcher started");

    // Debounce loop: collect the latest event per path and flush once the
    // stream goes quiet for `debounce`.
    tokio::spawn(async move {
        let mut pending: HashMap<PathBuf, WatchEvent> = HashMap::new();
        loop {
            tokio::select! {
                raw = event_rx.recv() => {
                    match raw {
                        Some(event) => {
                            for normalized in normalize(&event) {
                                debug!(?normalized, "watch event");
                                pending.insert(normalized.path.clone(), normalized);
                            }
                        }
                        None => {
                            flush(&mut pending, dir_index, &tx).await;
                            break;
                        }
                    }
                }
                _ = tokio::time::sleep(debounce), if !pending.is_empty() => {
                    if !flush(&mut pending, dir_index, &tx).await {
                        break;
                    }
                }
            }
        }
        debug!(dir_index, "watcher event loop finished");
    });

    Ok(WatcherHandle { _inner: watcher })
}

async fn flush(
    pending: &mut HashMap<PathBuf, WatchEvent>,
    dir_index: usize,
    tx: &mpsc::Sender<(usize, WatchEvent)>,
) -> bool {
    // Sort for deterministic ordering; deletes of parents arrive before
    // their children this way.
    let mut events: Vec<WatchEvent> = pending.drain().map(|(_, e)| e).collect();
    events.sort_by(|a, b| a.path.cmp(&b.path));
    for event in events {
        if tx.send((dir_index, event)).await.is_err() {
            // Engine gone; no point keeping the watcher loop alive.
            return false;
        }
    }
    true
}

/// Map one raw notify event into zero or more normalized events.
fn normalize(event: &Event) -> Vec<WatchEvent> {
    let mut out = Vec::new();
    for path in event.paths.iter() {
        let normalized = match event.kind {
            EventKind::Create(_) => WatchEvent {
                kind: WatchKind::Create,
                path: path.clone(),
                is_dir: path.is_dir(),
            },
            EventKind::Modify(_) => {
                // Renames surface as modify events for both ends; treat a
                // vanished path as a delete.
                if path.exists() {
                    WatchEvent {
                        kind: WatchKind::Update,
                        path: path.clone(),
                        is_dir: path.is_dir(),
                    }
                } else {
                    WatchEvent {
                        kind: WatchKind::Delete,
                        path: path.clone(),
                        is_dir: false,
                    }
                }
            }
            EventKind::Remove(remove_kind) => WatchEvent {
                kind: WatchKind::Delete,
                path: path.clone(),
                is_dir: matches!(remove_kind, RemoveKind::Folder),
            },
            EventKind::Access(_) => continue,
            _ => {
                if path.exists() {
                    WatchEvent {
                        kind: WatchKind::Update,
                        path: path.clone(),
                        is_dir: path.is_dir(),
                    }
                } else {
                    WatchEvent {
                        kind: WatchKind::Delete,
                        path: path.clone(),
                        is_dir: false,
                    }
                }
            }
        };
        out.push(normalized);
    }
    out
}
