// src/config/model.rs

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;

use crate::errors::{FilerError, Result};
use crate::types::{ExternalsPolicy, Platform};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [engine]
/// build_root = ".kiln"
/// watcher_debounce_ms = 40
/// serve = [".kiln/out/client"]
///
/// [[dir]]
/// path = "src"
/// compiled = true
///
/// [[dir]]
/// path = "static"
///
/// [[build]]
/// name = "server"
/// platform = "node"
/// input = ["src/main.ts"]
/// primary = true
///
/// [[build]]
/// name = "client"
/// platform = "browser"
/// input = ["src/index.ts", "**/*.page.ts"]
/// dist = true
/// ```
///
/// All sections are optional except that at least one `[[dir]]` must be
/// present; see [`validate`](crate::config::validate) for the rules.
#[derive(Debug, Clone, Deserialize)]
pub struct RawProjectConfig {
    /// Engine behaviour from `[engine]`.
    #[serde(default)]
    pub engine: EngineSection,

    /// Watched directories from `[[dir]]`.
    #[serde(default, rename = "dir")]
    pub dirs: Vec<DirSection>,

    /// Build configurations from `[[build]]`.
    #[serde(default, rename = "build")]
    pub builds: Vec<BuildSection>,
}

/// `[engine]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    /// Root directory for compiled output and persisted metadata,
    /// relative to the project root.
    #[serde(default = "default_build_root")]
    pub build_root: String,

    /// Debounce interval for watcher events, in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub watcher_debounce_ms: u64,

    /// Directories searched (in order) by `find_by_path`, relative to the
    /// project root. When empty, defaults to the output directory of the
    /// first browser build (or the first build).
    #[serde(default)]
    pub serve: Vec<String>,
}

fn default_build_root() -> String {
    ".kiln".to_string()
}

fn default_debounce_ms() -> u64 {
    40
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            build_root: default_build_root(),
            watcher_debounce_ms: default_debounce_ms(),
            serve: Vec::new(),
        }
    }
}

/// `[[dir]]` section: one watched directory.
#[derive(Debug, Clone, Deserialize)]
pub struct DirSection {
    /// Directory path, relative to the project root.
    pub path: String,

    /// Whether files in this directory are compiled. Non-compiled
    /// directories are watched and cached for serving only; nothing is
    /// ever written to disk for them.
    #[serde(default)]
    pub compiled: bool,
}

/// `[[build]]` section: one build configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildSection {
    pub name: String,

    pub platform: Platform,

    /// Entry inputs: literal paths (relative to the project root) and/or
    /// glob filters. An entry containing any of `*?[{` is treated as a
    /// filter over project-relative source paths.
    #[serde(default)]
    pub input: Vec<String>,

    /// Whether this is the primary build for its platform.
    #[serde(default)]
    pub primary: bool,

    /// Whether this build participates in the distributable output.
    #[serde(default)]
    pub dist: bool,

    /// External (package) dependency policy; see [`ExternalsPolicy`].
    #[serde(default)]
    pub externals: ExternalsPolicy,
}

/// Validated project configuration.
///
/// Constructed via `TryFrom<RawProjectConfig>`; the fields are the raw
/// sections, known to satisfy the invariants checked in
/// [`validate`](crate::config::validate).
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    pub engine: EngineSection,
    pub dirs: Vec<DirSection>,
    pub builds: Vec<BuildSection>,
}

impl ProjectConfig {
    /// Construct without validation. Prefer `TryFrom<RawProjectConfig>`.
    pub fn new_unchecked(
        engine: EngineSection,
        dirs: Vec<DirSection>,
        builds: Vec<BuildSection>,
    ) -> Self {
        Self {
            engine,
            dirs,
            builds,
        }
    }

    /// Compile the `[[build]]` sections into runtime [`BuildConfig`]
    /// descriptors, resolving literal input paths against `root`.
    pub fn build_configs(&self, root: &Path) -> Result<Vec<BuildConfig>> {
        self.builds
            .iter()
            .map(|section| BuildConfig::from_section(section, root))
            .collect()
    }
}

/// One declared entry input of a build configuration.
#[derive(Debug, Clone)]
pub enum BuildInput {
    /// A literal source file path (absolute after resolution).
    Path(PathBuf),
    /// A glob filter evaluated against project-relative source paths.
    Filter(GlobSet),
}

/// Whether an input entry string is a glob filter rather than a literal path.
pub fn is_input_filter(entry: &str) -> bool {
    entry.contains(['*', '?', '[', '{'])
}

impl BuildInput {
    fn from_entry(entry: &str, root: &Path) -> Result<Self> {
        if is_input_filter(entry) {
            let glob = Glob::new(entry).map_err(|e| {
                FilerError::Config(format!("invalid input filter '{entry}': {e}"))
            })?;
            let mut builder = GlobSetBuilder::new();
            builder.add(glob);
            let set = builder
                .build()
                .map_err(|e| FilerError::Config(format!("invalid input filter '{entry}': {e}")))?;
            Ok(BuildInput::Filter(set))
        } else {
            Ok(BuildInput::Path(root.join(entry)))
        }
    }

    /// Whether a source file matches this input. `id` is the absolute
    /// source id; `rel` is its project-relative path with forward slashes.
    pub fn matches(&self, id: &Path, rel: &str) -> bool {
        match self {
            BuildInput::Path(path) => id == path,
            BuildInput::Filter(set) => set.is_match(rel),
        }
    }
}

/// A named, immutable build configuration: platform target, declared
/// inputs, and flags. Supplied at construction time and never mutated by
/// the engine.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub name: String,
    pub platform: Platform,
    pub input: Vec<BuildInput>,
    pub primary: bool,
    pub dist: bool,
    pub externals: ExternalsPolicy,
}

impl BuildConfig {
    pub fn from_section(section: &BuildSection, root: &Path) -> Result<Self> {
        let input = section
            .input
            .iter()
            .map(|entry| BuildInput::from_entry(entry, root))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            name: section.name.clone(),
            platform: section.platform,
            input,
            primary: section.primary,
            dist: section.dist,
            externals: section.externals,
        })
    }

    /// Whether a source file is one of this configuration's declared
    /// inputs (and would therefore be attached as a root input).
    pub fn is_input(&self, id: &Path, rel: &str) -> bool {
        self.input.iter().any(|input| input.matches(id, rel))
    }
}
