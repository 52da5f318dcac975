#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use kiln::compile::{Compiler, CompilerRegistry};
use kiln::config::{BuildConfig, BuildSection};
use kiln::filer::{FilerDir, FilerOptions};
use kiln::fs::RealFileSystem;
use kiln::types::{ExternalsPolicy, Platform};

/// A temporary project tree on disk.
///
/// The root is canonicalized up front so that paths derived here compare
/// equal to the ids the engine uses (it canonicalizes watched dirs too).
pub struct TestProject {
    dir: TempDir,
    root: PathBuf,
}

impl TestProject {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp project dir");
        let root = dir
            .path()
            .canonicalize()
            .unwrap_or_else(|_| dir.path().to_path_buf());
        Self { dir, root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    /// The id of a project file, as the engine keys it.
    pub fn id(&self, rel: &str) -> PathBuf {
        self.path(rel)
    }

    pub fn write(&self, rel: &str, contents: &str) {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("failed to create parent dirs");
        }
        std::fs::write(&path, contents).expect("failed to write project file");
    }

    pub fn mkdir(&self, rel: &str) {
        std::fs::create_dir_all(self.path(rel)).expect("failed to create dir");
    }

    pub fn delete(&self, rel: &str) {
        let path = self.path(rel);
        if path.is_dir() {
            std::fs::remove_dir_all(&path).expect("failed to remove dir");
        } else {
            std::fs::remove_file(&path).expect("failed to remove file");
        }
    }

    pub fn read(&self, rel: &str) -> Option<String> {
        std::fs::read_to_string(self.path(rel)).ok()
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.path(rel).exists()
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`BuildConfig`] to simplify test setup.
pub struct BuildConfigBuilder {
    section: BuildSection,
}

impl BuildConfigBuilder {
    pub fn new(name: &str, platform: Platform) -> Self {
        Self {
            section: BuildSection {
                name: name.to_string(),
                platform,
                input: Vec::new(),
                primary: false,
                dist: false,
                externals: ExternalsPolicy::default(),
            },
        }
    }

    /// Add a literal input path, relative to the project root.
    pub fn input(mut self, entry: &str) -> Self {
        self.section.input.push(entry.to_string());
        self
    }

    pub fn primary(mut self) -> Self {
        self.section.primary = true;
        self
    }

    pub fn dist(mut self) -> Self {
        self.section.dist = true;
        self
    }

    pub fn externals(mut self, policy: ExternalsPolicy) -> Self {
        self.section.externals = policy;
        self
    }

    pub fn build(self, root: &Path) -> BuildConfig {
        BuildConfig::from_section(&self.section, root).expect("failed to build valid BuildConfig")
    }
}

/// Builder for [`FilerOptions`] rooted at a [`TestProject`].
pub struct FilerOptionsBuilder {
    root: PathBuf,
    dirs: Vec<FilerDir>,
    builds: Vec<BuildConfig>,
    serve: Vec<PathBuf>,
    registry: CompilerRegistry,
    watch: bool,
    debounce: Duration,
}

impl FilerOptionsBuilder {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            dirs: Vec::new(),
            builds: Vec::new(),
            serve: Vec::new(),
            registry: CompilerRegistry::new(),
            watch: false,
            debounce: Duration::from_millis(25),
        }
    }

    pub fn compiled_dir(mut self, rel: &str) -> Self {
        self.dirs.push(FilerDir::new(self.root.join(rel), true));
        self
    }

    pub fn files_dir(mut self, rel: &str) -> Self {
        self.dirs.push(FilerDir::new(self.root.join(rel), false));
        self
    }

    pub fn build(mut self, config: BuildConfig) -> Self {
        self.builds.push(config);
        self
    }

    pub fn serve(mut self, rel: &str) -> Self {
        self.serve.push(self.root.join(rel));
        self
    }

    pub fn compiler(mut self, extension: &str, compiler: Arc<dyn Compiler>) -> Self {
        self.registry = self.registry.register(extension, compiler);
        self
    }

    pub fn watch(mut self, watch: bool) -> Self {
        self.watch = watch;
        self
    }

    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn build_root(&self) -> PathBuf {
        self.root.join(".kiln")
    }

    pub fn finish(self) -> FilerOptions {
        let build_root = self.build_root();
        FilerOptions {
            fs: Arc::new(RealFileSystem),
            registry: self.registry,
            dirs: self.dirs,
            builds: self.builds,
            serve: self.serve,
            root: self.root,
            build_root,
            watch: self.watch,
            debounce: self.debounce,
        }
    }
}
