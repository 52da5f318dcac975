// src/compile/mod.rs

//! The pluggable compilation contract.
//!
//! The engine never knows how to transform source text itself; it looks up
//! a [`Compiler`] in the [`CompilerRegistry`] by file extension (or by the
//! reserved externals id) and hands it one source file at a time. A
//! compiler returns zero or more [`Build`] descriptors; the engine owns
//! everything that happens after that (dependency extraction, cache sync,
//! persistence).

use std::fmt::Debug;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;

use crate::config::BuildConfig;
use crate::fs::FileSystem;
use crate::types::{Encoding, FileContent};

pub mod passthrough;
pub mod registry;

pub use passthrough::PassthroughCompiler;
pub use registry::CompilerRegistry;

/// Reserved source id selecting the externals compiler instead of an
/// extension-keyed one.
pub const EXTERNALS_SOURCE_ID: &str = "externals";

/// Borrowed view of a source file handed to a compiler.
#[derive(Debug, Clone, Copy)]
pub struct CompileSource<'a> {
    /// Absolute source id.
    pub id: &'a Path,
    pub filename: &'a str,
    /// Absolute directory containing the file.
    pub dir: &'a Path,
    /// Path of `dir` relative to the watched directory root, forward
    /// slashes, empty for the root itself.
    pub dir_base_path: &'a str,
    /// Extension without the leading dot.
    pub extension: &'a str,
    pub encoding: Encoding,
    pub content: &'a FileContent,
}

/// One output artifact produced by a compiler.
#[derive(Debug, Clone)]
pub struct Build {
    /// Absolute output path.
    pub id: PathBuf,
    pub filename: String,
    pub dir: PathBuf,
    pub extension: String,
    pub content: FileContent,
}

/// Shared context handed to compilers.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub fs: Arc<dyn FileSystem>,
    /// Project root; literal config inputs are resolved against this.
    pub root: PathBuf,
    /// Root of the output and metadata trees.
    pub build_root: PathBuf,
}

/// A compiler plugin.
///
/// `compile` is the narrow contract the engine depends on. The optional
/// hooks mirror the plugin lifecycle: `init` runs once at startup before
/// the build graph is seeded; `on_remove` runs whenever a source file is
/// detached from a build configuration, letting stateful compilers release
/// per-file resources.
pub trait Compiler: Send + Sync {
    fn compile<'a>(
        &'a self,
        source: CompileSource<'a>,
        config: &'a BuildConfig,
        ctx: &'a BuildContext,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Build>>> + Send + 'a>>;

    fn init(&self, _ctx: &BuildContext, _configs: &[BuildConfig]) -> Result<()> {
        Ok(())
    }

    fn on_remove(
        &self,
        _source_id: &Path,
        _config: &BuildConfig,
        _ctx: &BuildContext,
    ) -> Result<()> {
        Ok(())
    }
}

impl Debug for dyn Compiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compiler").finish_non_exhaustive()
    }
}
