// src/filer/source_file.rs

//! The authoritative in-memory record of one watched source file.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use crate::paths::{extension_of, relative_str};
use crate::types::{Encoding, FileContent};

use super::build_file::BuildFile;

/// Build configurations are referenced by name everywhere in the cache;
/// the descriptors themselves live on the engine.
pub type BuildName = String;

/// Per-build-config bookkeeping of a compilable source file.
///
/// All cross-references are id-keyed: `dependencies` and `dependents` hold
/// source ids, `build_files` holds shared snapshots that are also present
/// in the engine's file table.
#[derive(Debug, Default)]
pub struct CompilableState {
    /// Build configurations this file currently participates in.
    pub builds: HashSet<BuildName>,
    /// The subset of `builds` for which this file is a declared root
    /// input. Root inputs are never detached.
    pub input_to: HashSet<BuildName>,
    /// Compiled output per build configuration.
    pub build_files: HashMap<BuildName, Vec<Arc<BuildFile>>>,
    /// Source ids this file's compiled output depends on, per build
    /// configuration. Entries may point at files that do not exist.
    pub dependencies: HashMap<BuildName, HashSet<PathBuf>>,
    /// Source ids whose compiled output depends on this file, per build
    /// configuration.
    pub dependents: HashMap<BuildName, HashSet<PathBuf>>,
}

/// Whether a source file participates in compilation at all.
///
/// Files from non-compiled directories carry no build bookkeeping, so
/// states like "has dependencies but no build" are unrepresentable.
#[derive(Debug)]
pub enum SourceState {
    NonCompilable,
    Compilable(CompilableState),
}

/// One watched source file. Identity is the absolute path.
#[derive(Debug)]
pub struct SourceFile {
    pub id: PathBuf,
    pub filename: String,
    /// Absolute directory containing the file.
    pub dir: PathBuf,
    /// Path of `dir` relative to the watched directory root, forward
    /// slashes, empty for the root itself.
    pub dir_base_path: String,
    /// Extension without the leading dot.
    pub extension: String,
    pub encoding: Encoding,
    pub content: FileContent,
    /// Index of the owning watched directory.
    pub dir_index: usize,
    /// Set when a warm-started file's content hash differs from its
    /// persisted record; such files skip hydration and recompile.
    pub dirty: bool,
    hash: OnceLock<String>,
    pub state: SourceState,
}

impl SourceFile {
    pub fn new(
        id: PathBuf,
        dir_index: usize,
        dir_root: &Path,
        content: FileContent,
        compiled: bool,
    ) -> Self {
        let filename = id
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let dir = id.parent().map(|p| p.to_path_buf()).unwrap_or_default();
        let dir_base_path = relative_str(dir_root, &dir).unwrap_or_default();
        let extension = extension_of(&id);
        let encoding = content.encoding();
        let state = if compiled {
            SourceState::Compilable(CompilableState::default())
        } else {
            SourceState::NonCompilable
        };
        Self {
            id,
            filename,
            dir,
            dir_base_path,
            extension,
            encoding,
            content,
            dir_index,
            dirty: false,
            hash: OnceLock::new(),
            state,
        }
    }

    /// Path relative to the watched directory root, forward slashes.
    pub fn base_path(&self) -> String {
        if self.dir_base_path.is_empty() {
            self.filename.clone()
        } else {
            format!("{}/{}", self.dir_base_path, self.filename)
        }
    }

    /// Hex blake3 digest of the current contents, computed lazily and
    /// cached until the content changes.
    pub fn content_hash(&self) -> &str {
        self.hash.get_or_init(|| self.content.hash())
    }

    /// Replace the contents in place, invalidating the cached hash.
    pub fn replace_content(&mut self, content: FileContent) {
        self.content = content;
        self.hash = OnceLock::new();
    }

    pub fn compilable(&self) -> Option<&CompilableState> {
        match &self.state {
            SourceState::Compilable(cs) => Some(cs),
            SourceState::NonCompilable => None,
        }
    }

    pub fn compilable_mut(&mut self) -> Option<&mut CompilableState> {
        match &mut self.state {
            SourceState::Compilable(cs) => Some(cs),
            SourceState::NonCompilable => None,
        }
    }

    pub fn is_attached_to(&self, build: &str) -> bool {
        self.compilable().is_some_and(|cs| cs.builds.contains(build))
    }

    pub fn is_input_to(&self, build: &str) -> bool {
        self.compilable()
            .is_some_and(|cs| cs.input_to.contains(build))
    }
}
