// src/filer/build.rs

//! Compilation with race protection, dependency diff propagation, and
//! metadata rewriting.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, error, info, trace};

use crate::compile::CompileSource;
use crate::config::BuildInput;
use crate::deps::process_output;
use crate::errors::{FilerError, Result};
use crate::paths::relative_str;
use crate::types::{ExternalsPolicy, FileContent};

use super::build_file::{BuildFile, DepDiff, diff_dependencies};
use super::meta::{BuildRecord, SourceMeta};
use super::source_file::BuildName;
use super::{FilerFile, FilerInner, sync};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

enum MetaAction {
    Write(String, SourceMeta),
    Delete(String),
}

impl FilerInner {
    /// Race-protected compile entry point for one (build config, source
    /// file) key.
    ///
    /// If a compilation for this key is already in flight, the request
    /// collapses into a single enqueued recompile and returns immediately.
    /// When the in-flight compile finishes, the key is re-checked against
    /// the file's current content and recompiled if it changed mid-build,
    /// so the last writer always wins and awaiting callers never observe a
    /// stale result as final.
    ///
    /// A compile failure is caught and logged here: it neither poisons the
    /// key nor propagates to other files. Invariant violations do
    /// propagate; they stop the engine.
    pub(crate) fn build_source_file<'a>(
        &'a self,
        id: &'a Path,
        build_name: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let key = (build_name.to_string(), id.to_path_buf());
            {
                let mut pending = self.lock_pending();
                if pending.contains(&key) {
                    self.lock_enqueued().insert(key);
                    return Ok(());
                }
                pending.insert(key.clone());
            }

            match self._build_source_file(id, build_name).await {
                Ok(()) => {}
                Err(err) if err.is_fatal() => {
                    self.lock_pending().remove(&key);
                    return Err(err);
                }
                Err(err) => {
                    error!(?id, build = %build_name, "failed to compile: {err:#}");
                }
            }
            self.lock_pending().remove(&key);

            if self.lock_enqueued().remove(&key) {
                // Something changed during the compilation for this key;
                // re-check and recurse so the final state reflects the
                // latest content.
                let dir_index = {
                    let state = self.lock_state();
                    match state.files.get(id) {
                        Some(FilerFile::Source(sf)) => sf.dir_index,
                        _ => return Ok(()),
                    }
                };
                let mut should_compile = self.update_source_file(id, dir_index)?;
                if !should_compile {
                    // The memory cache may already hold newer content than
                    // the compile that just finished used.
                    let current = {
                        let state = self.lock_state();
                        match state.files.get(id) {
                            Some(FilerFile::Source(sf)) => Some(sf.content_hash().to_string()),
                            _ => None,
                        }
                    };
                    let built = self.lock_last_built().get(&key).cloned();
                    should_compile = match (current, built) {
                        (Some(current), Some(built)) => current != built,
                        (Some(_), None) => true,
                        (None, _) => false,
                    };
                }
                if should_compile {
                    self.build_source_file(id, build_name).await?;
                }
            }
            Ok(())
        })
    }

    async fn _build_source_file(&self, id: &Path, build_name: &str) -> Result<()> {
        // Snapshot what the compiler needs while holding the lock.
        let (filename, dir, dir_base_path, extension, encoding, content, content_hash) = {
            let state = self.lock_state();
            match state.files.get(id) {
                None => {
                    debug!(?id, "source file disappeared before compile");
                    return Ok(());
                }
                Some(FilerFile::Build(_)) => {
                    return Err(FilerError::Invariant(format!(
                        "expected a source file at {id:?}, found a build file"
                    )));
                }
                Some(FilerFile::Source(sf)) => (
                    sf.filename.clone(),
                    sf.dir.clone(),
                    sf.dir_base_path.clone(),
                    sf.extension.clone(),
                    sf.encoding,
                    sf.content.clone(),
                    sf.content_hash().to_string(),
                ),
            }
        };
        info!(?id, build = %build_name, "build source file");

        let config = self.config(build_name)?.clone();
        let Some(compiler) = self.registry.get(&extension) else {
            return Err(FilerError::Other(anyhow::anyhow!(
                "no compiler registered for extension '{extension}'"
            )));
        };
        let source = CompileSource {
            id,
            filename: &filename,
            dir: &dir,
            dir_base_path: &dir_base_path,
            extension: &extension,
            encoding,
            content: &content,
        };
        let outputs = compiler
            .compile(source, &config, &self.ctx)
            .await
            .map_err(FilerError::Other)?;

        let mut new_files = Vec::with_capacity(outputs.len());
        for output in outputs {
            let mut local_dependencies: Vec<PathBuf> = Vec::new();
            let mut external_dependencies: Vec<String> = Vec::new();
            let content = match output.content {
                FileContent::Text(text) => {
                    // Extract declared dependencies and rewrite internal
                    // specifiers to their build extensions.
                    let processed = process_output(&text, &output.dir);
                    for dep in processed.dependencies {
                        if dep.external {
                            external_dependencies.push(dep.specifier);
                        } else {
                            local_dependencies.push(dep.build_id);
                        }
                    }
                    FileContent::Text(processed.content)
                }
                binary => binary,
            };
            new_files.push(Arc::new(BuildFile {
                id: output.id,
                filename: output.filename,
                dir: output.dir,
                extension: output.extension,
                content,
                build_name: build_name.to_string(),
                source_id: id.to_path_buf(),
                local_dependencies,
                external_dependencies,
            }));
        }

        self.lock_last_built()
            .insert((build_name.to_string(), id.to_path_buf()), content_hash);
        self.update_build_files(id, new_files, build_name).await?;
        self.update_meta_for(id)?;
        Ok(())
    }

    /// Replace the build files for one (source, build-config) pair:
    /// memory cache sync, dependency propagation, then disk sync.
    pub(crate) async fn update_build_files(
        &self,
        id: &Path,
        new_files: Vec<Arc<BuildFile>>,
        build_name: &str,
    ) -> Result<()> {
        let (old, diff) = {
            let mut state = self.lock_state();
            let old = match state.files.get_mut(id) {
                None => {
                    debug!(?id, "source file disappeared before sync");
                    return Ok(());
                }
                Some(FilerFile::Build(_)) => {
                    return Err(FilerError::Invariant(format!(
                        "expected a source file at {id:?}, found a build file"
                    )));
                }
                Some(FilerFile::Source(sf)) => {
                    let Some(cs) = sf.compilable_mut() else {
                        return Err(FilerError::Invariant(format!(
                            "expected a compilable source file at {id:?}"
                        )));
                    };
                    cs.build_files
                        .insert(build_name.to_string(), new_files.clone())
                }
            };
            sync::sync_build_files_to_memory(&mut state.files, &new_files, old.as_deref())?;
            let diff = diff_dependencies(&new_files, old.as_deref());
            (old, diff)
        };
        self.apply_dependency_diff(id, build_name, &diff, true).await?;
        sync::sync_build_files_to_disk(&self.fs, &new_files, old.as_deref())?;
        Ok(())
    }

    /// Register build files hydrated from the persisted store without
    /// compiling. The normal build pipeline is short-circuited for
    /// efficiency, but the memory cache sync and dependency registration
    /// are still needed; disk and metadata are already current.
    pub(crate) async fn hydrate_source_file(&self, id: &Path, build_name: &str) -> Result<()> {
        let (files, content_hash) = {
            let state = self.lock_state();
            match state.files.get(id) {
                Some(FilerFile::Source(sf)) => {
                    let files = sf
                        .compilable()
                        .and_then(|cs| cs.build_files.get(build_name))
                        .cloned()
                        .ok_or_else(|| {
                            FilerError::Invariant(format!(
                                "expected build files when hydrating {id:?} for '{build_name}'"
                            ))
                        })?;
                    (files, sf.content_hash().to_string())
                }
                _ => {
                    return Err(FilerError::Invariant(format!(
                        "expected a source file at {id:?}"
                    )));
                }
            }
        };
        debug!(?id, build = %build_name, "hydrating build files from cache");
        {
            let mut state = self.lock_state();
            sync::sync_build_files_to_memory(&mut state.files, &files, None)?;
        }
        self.lock_last_built()
            .insert((build_name.to_string(), id.to_path_buf()), content_hash);
        let diff = diff_dependencies(&files, None);
        self.apply_dependency_diff(id, build_name, &diff, true).await
    }

    /// Propagate a dependency diff for one (source, build-config) pair to
    /// the rest of the graph.
    ///
    /// Added internal dependencies register the dependent on the
    /// dependency's `dependents` set and attach the dependency to the
    /// build configuration if it isn't already (as an input only when it
    /// independently matches the configuration's own inputs). Removed
    /// internal dependencies deregister the dependent and detach the
    /// dependency once it has no dependents left and is not a root input.
    /// Specifiers that resolve to no known source file are ignored.
    ///
    /// `update_own` also maintains the diffing file's own `dependencies`
    /// sets; it is false only when the file is being destroyed.
    pub(super) async fn apply_dependency_diff(
        &self,
        source_id: &Path,
        build_name: &str,
        diff: &DepDiff,
        update_own: bool,
    ) -> Result<()> {
        if diff.is_empty() {
            return Ok(());
        }
        let externals_policy = self.config(build_name)?.externals;

        for build_id in diff.added_local.iter() {
            let (dep_id, attached) = {
                let mut state = self.lock_state();
                let Some(dep_id) = self.map_build_id_to_source_id(&state, build_name, build_id)
                else {
                    trace!(?build_id, "added dependency does not resolve to a source file");
                    continue;
                };
                let attached = {
                    let Some(FilerFile::Source(dep)) = state.files.get_mut(&dep_id) else {
                        return Err(FilerError::Invariant(format!(
                            "expected a source file at {dep_id:?}"
                        )));
                    };
                    let Some(cs) = dep.compilable_mut() else {
                        return Err(FilerError::Invariant(format!(
                            "expected dependency to be compilable: {dep_id:?}"
                        )));
                    };
                    cs.dependents
                        .entry(build_name.to_string())
                        .or_default()
                        .insert(source_id.to_path_buf());
                    cs.builds.contains(build_name)
                };
                if update_own {
                    if let Some(FilerFile::Source(sf)) = state.files.get_mut(source_id) {
                        if let Some(cs) = sf.compilable_mut() {
                            cs.dependencies
                                .entry(build_name.to_string())
                                .or_default()
                                .insert(dep_id.clone());
                        }
                    }
                }
                (dep_id, attached)
            };
            if !attached {
                let rel = relative_str(&self.root, &dep_id).unwrap_or_default();
                let is_input = self.config(build_name)?.is_input(&dep_id, &rel);
                self.add_source_file_to_build(&dep_id, build_name, is_input)
                    .await?;
            }
        }

        if !diff.added_external.is_empty() {
            match externals_policy {
                ExternalsPolicy::Ignore => {
                    trace!(
                        build = %build_name,
                        externals = ?diff.added_external,
                        "recorded external dependencies"
                    );
                }
                ExternalsPolicy::Error => {
                    return Err(FilerError::Other(anyhow::anyhow!(
                        "external dependencies are not allowed for build '{}': {:?}",
                        build_name,
                        diff.added_external
                    )));
                }
            }
        }

        for build_id in diff.removed_local.iter() {
            let (dep_id, should_detach) = {
                let mut state = self.lock_state();
                let Some(dep_id) = self.map_build_id_to_source_id(&state, build_name, build_id)
                else {
                    continue;
                };
                let should_detach = {
                    let Some(FilerFile::Source(dep)) = state.files.get_mut(&dep_id) else {
                        continue;
                    };
                    let Some(cs) = dep.compilable_mut() else {
                        return Err(FilerError::Invariant(format!(
                            "expected dependency to be compilable: {dep_id:?}"
                        )));
                    };
                    if !cs.builds.contains(build_name) {
                        return Err(FilerError::Invariant(format!(
                            "expected build '{build_name}' on dependency {dep_id:?}"
                        )));
                    }
                    if let Some(dependents) = cs.dependents.get_mut(build_name) {
                        dependents.remove(source_id);
                    }
                    let orphaned = cs
                        .dependents
                        .get(build_name)
                        .is_none_or(|dependents| dependents.is_empty());
                    orphaned && !cs.input_to.contains(build_name)
                };
                if update_own {
                    if let Some(FilerFile::Source(sf)) = state.files.get_mut(source_id) {
                        if let Some(cs) = sf.compilable_mut() {
                            if let Some(deps) = cs.dependencies.get_mut(build_name) {
                                deps.remove(&dep_id);
                            }
                        }
                    }
                }
                (dep_id, should_detach)
            };
            if should_detach {
                self.remove_source_file_from_build(&dep_id, build_name)
                    .await?;
            }
        }
        Ok(())
    }

    /// Attach a build configuration to a source file, hydrating or
    /// compiling its build files. `is_input` marks the file as a declared
    /// root input, which pins it against orphan detachment. Re-entrant
    /// attachment (dependency cycles) is a no-op.
    pub(crate) fn add_source_file_to_build<'a>(
        &'a self,
        id: &'a Path,
        build_name: &'a str,
        is_input: bool,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let has_files = {
                let mut state = self.lock_state();
                let Some(FilerFile::Source(sf)) = state.files.get_mut(id) else {
                    return Err(FilerError::Invariant(format!(
                        "expected a source file at {id:?}"
                    )));
                };
                let Some(cs) = sf.compilable_mut() else {
                    return Err(FilerError::Invariant(format!(
                        "expected a compilable source file at {id:?}"
                    )));
                };
                if cs.builds.contains(build_name) {
                    return Ok(());
                }
                cs.builds.insert(build_name.to_string());
                if is_input {
                    cs.input_to.insert(build_name.to_string());
                }
                cs.build_files.contains_key(build_name)
            };
            debug!(?id, build = %build_name, is_input, "attaching source file to build");
            // Build only if needed; build files may have been hydrated
            // from the persisted store.
            if has_files {
                self.hydrate_source_file(id, build_name).await
            } else {
                self.build_source_file(id, build_name).await
            }
        })
    }

    /// Detach a build configuration from a source file: delete its build
    /// files in memory and on disk, release its dependency edges, run the
    /// compiler's `on_remove` hook, and rewrite (or delete) its persisted
    /// record. Root inputs refuse detachment; re-entrant detachment is a
    /// no-op.
    pub(crate) fn remove_source_file_from_build<'a>(
        &'a self,
        id: &'a Path,
        build_name: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            {
                let state = self.lock_state();
                let Some(FilerFile::Source(sf)) = state.files.get(id) else {
                    return Ok(());
                };
                let Some(cs) = sf.compilable() else {
                    return Err(FilerError::Invariant(format!(
                        "expected a compilable source file at {id:?}"
                    )));
                };
                if !cs.builds.contains(build_name) {
                    return Ok(());
                }
                if cs.input_to.contains(build_name) {
                    return Err(FilerError::Invariant(format!(
                        "removing root input {id:?} from build '{build_name}' is not allowed"
                    )));
                }
            }
            debug!(?id, build = %build_name, "detaching source file from build");
            self.update_build_files(id, Vec::new(), build_name).await?;
            let extension = {
                let mut state = self.lock_state();
                let Some(FilerFile::Source(sf)) = state.files.get_mut(id) else {
                    return Ok(());
                };
                let extension = sf.extension.clone();
                if let Some(cs) = sf.compilable_mut() {
                    cs.builds.remove(build_name);
                    cs.build_files.remove(build_name);
                    cs.dependencies.remove(build_name);
                    cs.dependents.remove(build_name);
                }
                extension
            };
            self.lock_last_built()
                .remove(&(build_name.to_string(), id.to_path_buf()));
            self.run_on_remove(&extension, id, build_name);
            self.update_meta_for(id)?;
            Ok(())
        })
    }

    /// Rewrite (or delete) the persisted metadata record for a source
    /// file, mirroring its current build files and content hash.
    pub(crate) fn update_meta_for(&self, id: &Path) -> Result<()> {
        let action = {
            let state = self.lock_state();
            let Some(FilerFile::Source(sf)) = state.files.get(id) else {
                return Ok(());
            };
            let Some(cs) = sf.compilable() else {
                return Ok(());
            };
            if cs.builds.is_empty() {
                MetaAction::Delete(sf.base_path())
            } else {
                let mut names: Vec<&BuildName> = cs.build_files.keys().collect();
                names.sort();
                let mut builds = Vec::new();
                for name in names {
                    for build_file in cs.build_files.get(name).into_iter().flatten() {
                        builds.push(BuildRecord {
                            id: build_file.id.clone(),
                            build_name: build_file.build_name.clone(),
                            local_dependencies: build_file.local_dependencies.clone(),
                            external_dependencies: build_file.external_dependencies.clone(),
                            encoding: build_file.encoding(),
                        });
                    }
                }
                let meta = SourceMeta {
                    source_id: sf.id.clone(),
                    content_hash: sf.content_hash().to_string(),
                    builds,
                };
                MetaAction::Write(sf.base_path(), meta)
            }
        };
        match action {
            MetaAction::Write(base_path, meta) => {
                self.lock_state().meta.insert(id.to_path_buf(), meta.clone());
                self.meta_store.write(&base_path, &meta)?;
            }
            MetaAction::Delete(base_path) => {
                self.lock_state().meta.remove(id);
                self.meta_store.delete(&base_path)?;
            }
        }
        Ok(())
    }

    /// The build-graph seeding pass: resolve every configuration's
    /// declared inputs against the scanned files and attach each match as
    /// a root input, compiling or hydrating as needed. Dependency
    /// discovery recurses from here, so attachment order follows the
    /// dependency graph rather than file-discovery order.
    pub(crate) async fn init_builds(&self) -> Result<()> {
        let mut to_add: Vec<(PathBuf, BuildName)> = Vec::new();
        {
            let state = self.lock_state();
            for config in self.builds.iter() {
                for input in config.input.iter() {
                    let BuildInput::Path(path) = input else {
                        continue;
                    };
                    match state.files.get(path) {
                        None => {
                            return Err(FilerError::Config(format!(
                                "build '{}' has unknown input {:?}",
                                config.name, path
                            )));
                        }
                        Some(FilerFile::Build(_)) => {
                            return Err(FilerError::Config(format!(
                                "build '{}' has non-source input {:?}",
                                config.name, path
                            )));
                        }
                        Some(FilerFile::Source(sf)) => {
                            let Some(cs) = sf.compilable() else {
                                return Err(FilerError::Config(format!(
                                    "build '{}' has non-compilable input {:?}",
                                    config.name, path
                                )));
                            };
                            if !cs.builds.contains(&config.name) {
                                to_add.push((path.clone(), config.name.clone()));
                            }
                        }
                    }
                }
            }

            // Apply the filter inputs to every known source file.
            let mut ids: Vec<&PathBuf> = state.files.keys().collect();
            ids.sort();
            for id in ids {
                let Some(FilerFile::Source(sf)) = state.files.get(id) else {
                    continue;
                };
                let Some(rel) = relative_str(&self.root, &sf.id) else {
                    continue;
                };
                for config in self.builds.iter() {
                    let matched = config.input.iter().any(|input| {
                        matches!(input, BuildInput::Filter(_)) && input.matches(&sf.id, &rel)
                    });
                    if !matched {
                        continue;
                    }
                    let Some(cs) = sf.compilable() else {
                        return Err(FilerError::Config(format!(
                            "build '{}' input filter matched non-compilable file {:?}",
                            config.name, sf.id
                        )));
                    };
                    let entry = (sf.id.clone(), config.name.clone());
                    if !cs.builds.contains(&config.name) && !to_add.contains(&entry) {
                        to_add.push(entry);
                    }
                }
            }
        }
        debug!(count = to_add.len(), "seeding build graph from inputs");
        for (id, name) in to_add {
            self.add_source_file_to_build(&id, &name, true).await?;
        }
        Ok(())
    }
}
