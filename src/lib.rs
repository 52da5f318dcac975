// src/lib.rs

//! kiln — an incremental build graph engine for project task runners.
//!
//! Given a set of watched source directories and one or more named build
//! configurations (a target platform plus a set of entry inputs), the
//! engine keeps an in-memory and on-disk mirror of compiled output
//! synchronized with source files as they are created, edited, or deleted,
//! without ever recompiling more than necessary and without two concurrent
//! compilations racing on the same file.
//!
//! The heart of the crate is the [`Filer`]: directory watching → source
//! file caching → pluggable compilation → dependency-graph maintenance →
//! disk synchronization → persisted build metadata for warm restarts.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use kiln::compile::{CompilerRegistry, PassthroughCompiler};
//! use kiln::config::load_and_validate;
//! use kiln::fs::RealFileSystem;
//! use kiln::Filer;
//!
//! # async fn run() -> kiln::Result<()> {
//! let config = load_and_validate("Kiln.toml")?;
//! let registry = CompilerRegistry::new()
//!     .register("ts", Arc::new(PassthroughCompiler::new()))
//!     .register("js", Arc::new(PassthroughCompiler::new()));
//! let filer = Filer::from_config(
//!     std::path::Path::new("."),
//!     &config,
//!     Arc::new(RealFileSystem),
//!     registry,
//! )?;
//! filer.init().await?;
//! // ... serve `filer.find_by_path(...)`, let the watcher drive rebuilds
//! # Ok(())
//! # }
//! ```

pub mod compile;
pub mod config;
pub mod deps;
pub mod errors;
pub mod filer;
pub mod fs;
pub mod logging;
pub mod paths;
pub mod types;
pub mod watch;

pub use compile::{Build, BuildContext, Compiler, CompilerRegistry};
pub use config::{BuildConfig, BuildInput, ProjectConfig};
pub use errors::{FilerError, Result};
pub use filer::{
    BuildFile, FileKind, FileSnapshot, Filer, FilerDir, FilerOptions, SourceFile, SourceSnapshot,
};
pub use types::{Encoding, ExternalsPolicy, FileContent, Platform};
pub use watch::{WatchEvent, WatchKind};
