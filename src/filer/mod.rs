// src/filer/mod.rs

//! The incremental build graph engine.
//!
//! The [`Filer`] owns the source-file cache, the build-file cache, the
//! per-build-config dependency graph, and the persisted metadata store. It
//! reacts to normalized watcher events, recompiles no more than necessary,
//! and keeps three views consistent at all times: the in-memory caches,
//! the on-disk output tree, and the persisted metadata records.
//!
//! Module layout:
//! - [`source_file`] / [`build_file`] — the cached data model
//! - [`dirs`] — watched directory descriptors
//! - [`meta`] — persisted metadata records and warm-start hydration
//! - [`build`] (private) — compilation, race protection, dependency
//!   propagation
//! - [`sync`] (private) — memory/disk synchronization of build files

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, trace, warn};

mod build;
pub mod build_file;
pub mod dirs;
pub mod meta;
pub mod source_file;
mod sync;

pub use build_file::{BuildFile, DepDiff, diff_dependencies};
pub use dirs::FilerDir;
pub use meta::{BuildRecord, MetaStore, SourceMeta};
pub use source_file::{BuildName, CompilableState, SourceFile, SourceState};

use crate::compile::{BuildContext, CompilerRegistry};
use crate::config::{BuildConfig, ProjectConfig};
use crate::errors::{FilerError, Result};
use crate::fs::FileSystem;
use crate::paths::{extension_of, infer_encoding, relative_str, to_build_out_dir,
    to_build_out_path};
use crate::types::{Encoding, FileContent, Platform};
use crate::watch::{WatchEvent, WatchKind, WatcherHandle, scan_dir, spawn_dir_watcher};

use meta::reconstruct_build_files;

/// A cached file: either a watched source file or a compiled build file.
#[derive(Debug)]
pub enum FilerFile {
    Source(SourceFile),
    Build(Arc<BuildFile>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Source,
    Build,
}

/// A point-in-time copy of one cached file, as returned by the query
/// surface.
#[derive(Debug, Clone)]
pub struct FileSnapshot {
    pub id: PathBuf,
    pub kind: FileKind,
    pub encoding: Encoding,
    pub content: FileContent,
}

/// A point-in-time view of one source file's build bookkeeping, for hosts
/// and tests. All lists are sorted.
#[derive(Debug, Clone, Default)]
pub struct SourceSnapshot {
    pub id: PathBuf,
    pub compilable: bool,
    pub dirty: bool,
    pub builds: Vec<BuildName>,
    pub input_to: Vec<BuildName>,
    pub build_files: HashMap<BuildName, Vec<PathBuf>>,
    pub dependencies: HashMap<BuildName, Vec<PathBuf>>,
    pub dependents: HashMap<BuildName, Vec<PathBuf>>,
}

/// Options for constructing a [`Filer`].
#[derive(Debug)]
pub struct FilerOptions {
    pub fs: Arc<dyn FileSystem>,
    pub registry: CompilerRegistry,
    /// Watched directories. Must not duplicate or nest.
    pub dirs: Vec<FilerDir>,
    /// Build configurations; required iff any directory is compiled.
    pub builds: Vec<BuildConfig>,
    /// Directories searched by `find_by_path`, in order. When empty,
    /// defaults to the output directory of the first browser build (or
    /// the first build).
    pub serve: Vec<PathBuf>,
    /// Project root; config-relative paths resolve against this.
    pub root: PathBuf,
    /// Root of the output and metadata trees.
    pub build_root: PathBuf,
    /// Whether to watch for changes after the initial scan.
    pub watch: bool,
    /// Watcher debounce interval.
    pub debounce: Duration,
}

pub(crate) type BuildKey = (BuildName, PathBuf);

#[derive(Debug, Default)]
pub(crate) struct FilerState {
    pub(crate) files: HashMap<PathBuf, FilerFile>,
    pub(crate) meta: HashMap<PathBuf, SourceMeta>,
}

pub(crate) struct FilerInner {
    pub(crate) fs: Arc<dyn FileSystem>,
    pub(crate) registry: CompilerRegistry,
    pub(crate) dirs: Vec<FilerDir>,
    pub(crate) builds: Vec<BuildConfig>,
    pub(crate) serve: Vec<PathBuf>,
    pub(crate) root: PathBuf,
    pub(crate) build_root: PathBuf,
    pub(crate) watch: bool,
    pub(crate) debounce: Duration,
    pub(crate) ctx: BuildContext,
    pub(crate) meta_store: MetaStore,
    pub(crate) state: Mutex<FilerState>,
    /// Keys with a compilation currently in flight.
    pub(crate) pending: Mutex<HashSet<BuildKey>>,
    /// Keys that were requested again while in flight; at most one
    /// enqueued recompile is retained per key.
    pub(crate) enqueued: Mutex<HashSet<BuildKey>>,
    /// Content hash most recently compiled (or hydrated) per key, used by
    /// the post-compile re-check to detect content that changed mid-build.
    pub(crate) last_built: Mutex<HashMap<BuildKey, String>>,
    init_cell: tokio::sync::OnceCell<()>,
    watchers: Mutex<Vec<WatcherHandle>>,
    dispatch: Mutex<Option<JoinHandle<()>>>,
    /// Set when an invariant violation stops the engine.
    pub(crate) stopped: AtomicBool,
    /// Back-reference for handing `'static` clones to spawned tasks.
    weak: Weak<FilerInner>,
}

impl std::fmt::Debug for FilerInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilerInner")
            .field("dirs", &self.dirs)
            .field("build_root", &self.build_root)
            .field("watch", &self.watch)
            .finish_non_exhaustive()
    }
}

/// The incremental build engine. Cheap to clone handles are not provided;
/// share it behind whatever the host prefers.
#[derive(Debug)]
pub struct Filer {
    inner: Arc<FilerInner>,
}

impl Filer {
    pub fn new(options: FilerOptions) -> Result<Self> {
        validate_options(&options)?;
        let FilerOptions {
            fs,
            registry,
            dirs,
            builds,
            serve,
            root,
            build_root,
            watch,
            debounce,
        } = options;

        // Canonicalize what exists so watcher event paths compare equal to
        // configured paths.
        let root = fs.canonicalize(&root).unwrap_or(root);
        let dirs: Vec<FilerDir> = dirs
            .into_iter()
            .map(|d| {
                let path = fs.canonicalize(&d.path).unwrap_or(d.path);
                FilerDir::new(path, d.compiled)
            })
            .collect();

        let serve = if serve.is_empty() {
            default_served_dirs(&builds, &build_root)
        } else {
            serve
        };

        let ctx = BuildContext {
            fs: Arc::clone(&fs),
            root: root.clone(),
            build_root: build_root.clone(),
        };
        let meta_store = MetaStore::new(Arc::clone(&fs), build_root.clone());

        Ok(Self {
            inner: Arc::new_cyclic(|weak| FilerInner {
                fs,
                registry,
                dirs,
                builds,
                serve,
                root,
                build_root,
                watch,
                debounce,
                ctx,
                meta_store,
                state: Mutex::new(FilerState::default()),
                pending: Mutex::new(HashSet::new()),
                enqueued: Mutex::new(HashSet::new()),
                last_built: Mutex::new(HashMap::new()),
                init_cell: tokio::sync::OnceCell::new(),
                watchers: Mutex::new(Vec::new()),
                dispatch: Mutex::new(None),
                stopped: AtomicBool::new(false),
                weak: weak.clone(),
            }),
        })
    }

    /// Wire a [`Filer`] from a validated project configuration.
    pub fn from_config(
        root: &Path,
        config: &ProjectConfig,
        fs: Arc<dyn FileSystem>,
        registry: CompilerRegistry,
    ) -> Result<Self> {
        let root = fs.canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
        let dirs = config
            .dirs
            .iter()
            .map(|d| FilerDir::new(root.join(&d.path), d.compiled))
            .collect();
        let builds = config.build_configs(&root)?;
        let build_root = root.join(&config.engine.build_root);
        let serve = config.engine.serve.iter().map(|s| root.join(s)).collect();
        Self::new(FilerOptions {
            fs,
            registry,
            dirs,
            builds,
            serve,
            root,
            build_root,
            watch: true,
            debounce: Duration::from_millis(config.engine.watcher_debounce_ms),
        })
    }

    /// Initialize the engine: load persisted metadata, scan every watched
    /// directory, seed the build graph from the configured inputs, then
    /// (if watching) begin reacting to changes.
    ///
    /// Memoized: concurrent and repeated callers share one initialization.
    pub async fn init(&self) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        self.inner
            .init_cell
            .get_or_try_init(|| async move { inner.run_init().await })
            .await?;
        Ok(())
    }

    /// Stop watching and processing events. Idempotent.
    pub fn close(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        self.inner.lock_watchers().clear();
        if let Some(handle) = self.inner.lock_dispatch().take() {
            handle.abort();
        }
        info!("filer closed");
    }

    /// Search the served directories in order and return the first cached
    /// file (source or build) matching `path`, or `None`. Never compiles.
    pub fn find_by_path(&self, path: &str) -> Option<FileSnapshot> {
        let state = self.inner.lock_state();
        for served in self.inner.serve.iter() {
            let id = served.join(path);
            if let Some(file) = state.files.get(&id) {
                return Some(snapshot_of(file));
            }
        }
        None
    }

    /// Feed one normalized change event into the engine, as the watcher
    /// would. Public so embedding task runners (and tests) can drive the
    /// engine without a live watcher.
    pub async fn handle_event(&self, dir: &Path, event: WatchEvent) -> Result<()> {
        let Some(dir_index) = self.inner.dir_index_of(dir) else {
            return Err(FilerError::Config(format!(
                "{dir:?} is not a watched directory"
            )));
        };
        let result = self.inner.on_dir_change(dir_index, event).await;
        if let Err(err) = &result {
            if err.is_fatal() {
                self.inner.stopped.store(true, Ordering::SeqCst);
            }
        }
        result
    }

    /// Snapshot of one cached file by absolute id.
    pub fn find_by_id(&self, id: &Path) -> Option<FileSnapshot> {
        let state = self.inner.lock_state();
        state.files.get(id).map(snapshot_of)
    }

    /// Snapshot of one source file's build bookkeeping.
    pub fn source_snapshot(&self, id: &Path) -> Option<SourceSnapshot> {
        let state = self.inner.lock_state();
        let Some(FilerFile::Source(sf)) = state.files.get(id) else {
            return None;
        };
        let mut snapshot = SourceSnapshot {
            id: sf.id.clone(),
            compilable: sf.compilable().is_some(),
            dirty: sf.dirty,
            ..SourceSnapshot::default()
        };
        if let Some(cs) = sf.compilable() {
            snapshot.builds = sorted(cs.builds.iter().cloned());
            snapshot.input_to = sorted(cs.input_to.iter().cloned());
            for (name, files) in cs.build_files.iter() {
                snapshot
                    .build_files
                    .insert(name.clone(), sorted(files.iter().map(|f| f.id.clone())));
            }
            for (name, deps) in cs.dependencies.iter() {
                snapshot
                    .dependencies
                    .insert(name.clone(), sorted(deps.iter().cloned()));
            }
            for (name, deps) in cs.dependents.iter() {
                snapshot
                    .dependents
                    .insert(name.clone(), sorted(deps.iter().cloned()));
            }
        }
        Some(snapshot)
    }

    /// Ids of every cached build file, sorted.
    pub fn build_ids(&self) -> Vec<PathBuf> {
        let state = self.inner.lock_state();
        sorted(state.files.iter().filter_map(|(id, file)| match file {
            FilerFile::Build(_) => Some(id.clone()),
            FilerFile::Source(_) => None,
        }))
    }

    /// Ids of every cached source file, sorted.
    pub fn source_ids(&self) -> Vec<PathBuf> {
        let state = self.inner.lock_state();
        sorted(state.files.iter().filter_map(|(id, file)| match file {
            FilerFile::Source(_) => Some(id.clone()),
            FilerFile::Build(_) => None,
        }))
    }
}

fn sorted<T: Ord>(iter: impl Iterator<Item = T>) -> Vec<T> {
    let mut v: Vec<T> = iter.collect();
    v.sort();
    v
}

fn snapshot_of(file: &FilerFile) -> FileSnapshot {
    match file {
        FilerFile::Source(sf) => FileSnapshot {
            id: sf.id.clone(),
            kind: FileKind::Source,
            encoding: sf.encoding,
            content: sf.content.clone(),
        },
        FilerFile::Build(bf) => FileSnapshot {
            id: bf.id.clone(),
            kind: FileKind::Build,
            encoding: bf.encoding(),
            content: bf.content.clone(),
        },
    }
}

fn default_served_dirs(builds: &[BuildConfig], build_root: &Path) -> Vec<PathBuf> {
    let config = builds
        .iter()
        .find(|c| c.platform == Platform::Browser)
        .or_else(|| builds.first());
    match config {
        Some(config) => vec![to_build_out_dir(build_root, &config.name)],
        None => Vec::new(),
    }
}

fn validate_options(options: &FilerOptions) -> Result<()> {
    if options.dirs.is_empty() {
        return Err(FilerError::Config(
            "filer created with no directories to compile or serve".to_string(),
        ));
    }
    for a in options.dirs.iter() {
        let duplicates = options.dirs.iter().filter(|b| b.path == a.path).count();
        if duplicates > 1 {
            return Err(FilerError::Config(format!(
                "duplicate watched directory {:?}",
                a.path
            )));
        }
        for b in options.dirs.iter() {
            if a.path != b.path && a.path.starts_with(&b.path) {
                return Err(FilerError::Config(format!(
                    "watched directory {:?} is inside watched directory {:?}",
                    a.path, b.path
                )));
            }
        }
    }
    let compiled_count = options.dirs.iter().filter(|d| d.compiled).count();
    if compiled_count > 0 && options.registry.is_empty() {
        return Err(FilerError::Config(
            "compiled directories require at least one registered compiler".to_string(),
        ));
    }
    if compiled_count == 0 && !options.registry.is_empty() {
        return Err(FilerError::Config(
            "compilers are registered but no directory is marked compiled".to_string(),
        ));
    }
    if compiled_count > 0 && options.builds.is_empty() {
        return Err(FilerError::Config(
            "compiled directories require at least one build configuration".to_string(),
        ));
    }
    if compiled_count == 0 && !options.builds.is_empty() {
        return Err(FilerError::Config(
            "build configurations require at least one compiled directory".to_string(),
        ));
    }
    let mut names = HashSet::new();
    let mut primaries: HashMap<Platform, &str> = HashMap::new();
    for config in options.builds.iter() {
        if config.name.is_empty() {
            return Err(FilerError::Config(
                "build configuration has an empty name".to_string(),
            ));
        }
        if !names.insert(config.name.as_str()) {
            return Err(FilerError::Config(format!(
                "duplicate build name '{}'",
                config.name
            )));
        }
        if config.input.is_empty() {
            return Err(FilerError::Config(format!(
                "build '{}' declares no inputs",
                config.name
            )));
        }
        if config.primary {
            if let Some(previous) = primaries.insert(config.platform, &config.name) {
                return Err(FilerError::Config(format!(
                    "platform {:?} has more than one primary build: '{}' and '{}'",
                    config.platform, previous, config.name
                )));
            }
        }
    }
    Ok(())
}

impl FilerInner {
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, FilerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn lock_pending(&self) -> MutexGuard<'_, HashSet<BuildKey>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn lock_enqueued(&self) -> MutexGuard<'_, HashSet<BuildKey>> {
        self.enqueued.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn lock_last_built(&self) -> MutexGuard<'_, HashMap<BuildKey, String>> {
        self.last_built.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_watchers(&self) -> MutexGuard<'_, Vec<WatcherHandle>> {
        self.watchers.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_dispatch(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.dispatch.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn dir_index_of(&self, dir: &Path) -> Option<usize> {
        if let Some(index) = self.dirs.iter().position(|d| d.path == dir) {
            return Some(index);
        }
        let canonical = self.fs.canonicalize(dir).ok()?;
        self.dirs.iter().position(|d| d.path == canonical)
    }

    pub(crate) fn config(&self, name: &str) -> Result<&BuildConfig> {
        self.builds
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| FilerError::Invariant(format!("unknown build configuration '{name}'")))
    }

    /// Upgrade the back-reference for spawning `'static` tasks. Succeeds
    /// for as long as the owning [`Filer`] is alive.
    fn strong(&self) -> Result<Arc<FilerInner>> {
        self.weak
            .upgrade()
            .ok_or_else(|| FilerError::Invariant("filer engine already dropped".to_string()))
    }

    /// Two-phase startup; see `Filer::init`.
    async fn run_init(&self) -> Result<()> {
        info!(dirs = self.dirs.len(), builds = self.builds.len(), "initializing filer");

        for dir in self.dirs.iter() {
            if !self.fs.is_dir(&dir.path) {
                return Err(FilerError::Config(format!(
                    "watched directory does not exist: {:?}",
                    dir.path
                )));
            }
        }

        // Plugin init hooks run once, before any compilation.
        for compiler in self.registry.unique_compilers() {
            compiler.init(&self.ctx, &self.builds)?;
        }

        // Metadata must be loaded before directories are scanned, because
        // newly discovered source files consult it to skip compilation.
        let records = self.meta_store.load_all()?;
        self.lock_state().meta = records;

        // Start watchers first so changes racing the scan are buffered,
        // not lost; their events are dispatched only after seeding.
        let event_rx = if self.watch {
            Some(self.start_watchers()?)
        } else {
            None
        };

        // Scan every watched directory concurrently. Compilation for
        // `init` events is deferred so that cross-file dependency
        // discovery happens in dependency order during seeding.
        let mut scans: JoinSet<Result<()>> = JoinSet::new();
        for (dir_index, dir) in self.dirs.iter().enumerate() {
            let inner = self.strong()?;
            let dir_path = dir.path.clone();
            scans.spawn(async move {
                let events = scan_dir(inner.fs.as_ref(), &dir_path)?;
                debug!(dir = ?dir_path, files = events.len(), "scanned watched directory");
                for event in events {
                    inner.on_dir_change(dir_index, event).await?;
                }
                Ok(())
            });
        }
        while let Some(joined) = scans.join_next().await {
            joined.map_err(|e| FilerError::Invariant(format!("directory scan panicked: {e}")))??;
        }

        // Seed the build graph from the configured inputs.
        self.init_builds().await?;

        if let Some(event_rx) = event_rx {
            self.spawn_dispatch(event_rx);
        }

        info!("filer initialized");
        Ok(())
    }

    fn start_watchers(&self) -> Result<mpsc::Receiver<(usize, WatchEvent)>> {
        let (tx, rx) = mpsc::channel(256);
        let mut handles = Vec::with_capacity(self.dirs.len());
        for (dir_index, dir) in self.dirs.iter().enumerate() {
            handles.push(spawn_dir_watcher(
                dir.path.clone(),
                dir_index,
                self.debounce,
                tx.clone(),
            )?);
        }
        *self.lock_watchers() = handles;
        Ok(rx)
    }

    fn spawn_dispatch(&self, mut event_rx: mpsc::Receiver<(usize, WatchEvent)>) {
        let Ok(inner) = self.strong() else {
            return;
        };
        let handle = tokio::spawn(async move {
            while let Some((dir_index, event)) = event_rx.recv().await {
                if inner.stopped.load(Ordering::SeqCst) {
                    break;
                }
                let inner = Arc::clone(&inner);
                tokio::spawn(async move {
                    if let Err(err) = inner.on_dir_change(dir_index, event).await {
                        if err.is_fatal() {
                            error!("stopping filer: {err}");
                            inner.stopped.store(true, Ordering::SeqCst);
                        } else {
                            warn!("failed to handle change: {err:#}");
                        }
                    }
                });
            }
            debug!("filer dispatch loop finished");
        });
        *self.lock_dispatch() = Some(handle);
    }

    /// Change handling: create/update flows through `update_source_file`
    /// and recompiles for every build configuration the file is attached
    /// to; deletes cascade.
    pub(crate) async fn on_dir_change(&self, dir_index: usize, event: WatchEvent) -> Result<()> {
        let dir = &self.dirs[dir_index];
        let id = event.path.clone();
        match event.kind {
            WatchKind::Init | WatchKind::Create | WatchKind::Update => {
                if event.is_dir {
                    // Output directories are created lazily on write.
                    return Ok(());
                }
                let should_compile = self.update_source_file(&id, dir_index)?;
                if should_compile && event.kind != WatchKind::Init && dir.compiled {
                    let builds: Vec<BuildName> = {
                        let state = self.lock_state();
                        match state.files.get(&id) {
                            Some(FilerFile::Source(sf)) => sf
                                .compilable()
                                .map(|cs| sorted(cs.builds.iter().cloned()))
                                .unwrap_or_default(),
                            _ => Vec::new(),
                        }
                    };
                    for name in builds {
                        self.build_source_file(&id, &name).await?;
                    }
                }
            }
            WatchKind::Delete => {
                if event.is_dir {
                    if dir.compiled {
                        let Some(rel) = relative_str(&dir.path, &id) else {
                            return Ok(());
                        };
                        // Blindly remove the output directory for every
                        // build config; best-effort by design.
                        for config in self.builds.iter() {
                            let out = to_build_out_path(&self.build_root, &config.name, &rel);
                            if let Err(err) = self.fs.remove_dir_all(&out) {
                                warn!(?out, "failed to remove output directory: {err:#}");
                            }
                        }
                    }
                } else {
                    self.destroy_source(&id).await?;
                }
            }
        }
        Ok(())
    }

    /// Update or create the in-memory record for a source file, returning
    /// whether it should be (re)compiled.
    ///
    /// - Cold cache: a new record is created; if its build files hydrate
    ///   from the persisted store it is already up to date.
    /// - Warm cache, identical content: no-op.
    /// - Warm cache, changed content: contents and hash are replaced in
    ///   place; recompilation is needed if the directory is compiled.
    pub(crate) fn update_source_file(&self, id: &Path, dir_index: usize) -> Result<bool> {
        let compiled = self.dirs[dir_index].compiled;

        // Inspect the cache before touching the filesystem.
        let (known, encoding, meta_record) = {
            let state = self.lock_state();
            match state.files.get(id) {
                Some(FilerFile::Build(_)) => {
                    return Err(FilerError::Invariant(format!(
                        "expected a source file at {id:?}, found a build file"
                    )));
                }
                Some(FilerFile::Source(sf)) => {
                    if sf.dir_index != dir_index {
                        return Err(FilerError::Invariant(format!(
                            "source file {id:?} is claimed by two watched directories"
                        )));
                    }
                    (true, sf.encoding, None)
                }
                None => {
                    let encoding = infer_encoding(&extension_of(id));
                    (false, encoding, state.meta.get(id).cloned())
                }
            }
        };

        let content = match encoding {
            Encoding::Utf8 => FileContent::Text(self.fs.read_to_string(id)?),
            Encoding::Binary => FileContent::Binary(self.fs.read(id)?),
        };

        // Cold path: decide between hydration and (deferred) compilation
        // before re-taking the lock, since hydration reads from disk.
        let mut dirty = false;
        let mut hydrated = None;
        if !known && compiled {
            if let Some(record) = &meta_record {
                if record.content_hash == content.hash() {
                    match reconstruct_build_files(record, self.fs.as_ref()) {
                        Ok(files) if !files.is_empty() => hydrated = Some(files),
                        Ok(_) => {}
                        Err(err) => {
                            warn!(?id, "failed to hydrate build files: {err:#}");
                        }
                    }
                } else {
                    dirty = true;
                }
            }
        }

        let mut state = self.lock_state();
        match state.files.get_mut(id) {
            Some(FilerFile::Source(sf)) => {
                if sf.content == content {
                    // Memory cache is warm and content hasn't changed.
                    return Ok(false);
                }
                sf.replace_content(content);
                Ok(compiled)
            }
            Some(FilerFile::Build(_)) => Err(FilerError::Invariant(format!(
                "expected a source file at {id:?}, found a build file"
            ))),
            None => {
                let mut sf = SourceFile::new(
                    id.to_path_buf(),
                    dir_index,
                    &self.dirs[dir_index].path,
                    content,
                    compiled,
                );
                sf.dirty = dirty;
                let has_hydrated = hydrated.is_some();
                if let (Some(files), Some(cs)) = (hydrated, sf.compilable_mut()) {
                    cs.build_files = files;
                }
                trace!(?id, hydrated = has_hydrated, "created source file");
                state.files.insert(id.to_path_buf(), FilerFile::Source(sf));
                // Hydrated files are up to date; nothing to compile.
                Ok(!has_hydrated && compiled)
            }
        }
    }

    /// Remove a source file and cascade-delete its build files for every
    /// build configuration, in memory and on disk.
    pub(crate) async fn destroy_source(&self, id: &Path) -> Result<()> {
        let mut sf = {
            let mut state = self.lock_state();
            match state.files.remove(id) {
                Some(FilerFile::Source(sf)) => sf,
                Some(other) => {
                    // Deleting a compiled artifact directly is not a
                    // source event; put it back and ignore.
                    state.files.insert(id.to_path_buf(), other);
                    return Ok(());
                }
                None => return Ok(()),
            }
        };
        trace!(?id, "destroying source file");

        let base_path = sf.base_path();
        let names: Vec<BuildName> = sf
            .compilable()
            .map(|cs| sorted(cs.builds.iter().cloned()))
            .unwrap_or_default();
        let compilable = sf.compilable().is_some();

        for name in names {
            let old = sf
                .compilable_mut()
                .and_then(|cs| cs.build_files.remove(&name))
                .unwrap_or_default();
            {
                let mut state = self.lock_state();
                sync::sync_build_files_to_memory(&mut state.files, &[], Some(&old))?;
            }
            let diff = diff_dependencies(&[], Some(&old));
            self.apply_dependency_diff(id, &name, &diff, false).await?;
            sync::sync_build_files_to_disk(&self.fs, &[], Some(&old))?;
            self.run_on_remove(&sf.extension, id, &name);
        }

        if compilable {
            self.lock_state().meta.remove(id);
            self.meta_store.delete(&base_path)?;
            self.lock_last_built().retain(|(_, key_id), _| key_id != id);
        }
        Ok(())
    }

    pub(crate) fn run_on_remove(&self, extension: &str, id: &Path, build_name: &str) {
        let Some(compiler) = self.registry.get(extension) else {
            return;
        };
        let Ok(config) = self.config(build_name) else {
            return;
        };
        if let Err(err) = compiler.on_remove(id, config, &self.ctx) {
            warn!(?id, build = %build_name, "on_remove hook failed: {err:#}");
        }
    }

    /// Map a build id back to a known source id by trying each compiled
    /// directory. Returns `None` when no source file matches; imports may
    /// point at files that don't exist yet.
    pub(crate) fn map_build_id_to_source_id(
        &self,
        state: &FilerState,
        build_name: &str,
        build_id: &Path,
    ) -> Option<PathBuf> {
        let base = crate::paths::build_id_to_base_path(build_id, &self.build_root, build_name)?;
        let source_base = crate::paths::map_to_source_extension(&base);
        for dir in self.dirs.iter().filter(|d| d.compiled) {
            let candidate = dir.path.join(&source_base);
            if state.files.contains_key(&candidate) {
                return Some(candidate);
            }
        }
        None
    }
}
