// src/filer/meta.rs

//! Persisted per-source metadata for warm restarts.
//!
//! One JSON record per source file lives under `<build_root>/meta/`,
//! mirroring the source file's dir-relative path. A record captures the
//! content hash and the compiled outputs (ids, build names, dependency id
//! lists, encodings) at the time of the last successful compile. On a
//! fresh start, a source file whose content hash matches its record has
//! its build files reconstructed from disk instead of recompiled; the
//! record is discarded and rewritten after every compile.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::Result;
use crate::fs::{FileSystem, walk_files};
use crate::paths::{META_DIR, extension_of, to_meta_path};
use crate::types::{Encoding, FileContent};

use super::build_file::BuildFile;
use super::source_file::BuildName;

/// Persisted record for one source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMeta {
    pub source_id: PathBuf,
    pub content_hash: String,
    pub builds: Vec<BuildRecord>,
}

/// One compiled output in a [`SourceMeta`] record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRecord {
    pub id: PathBuf,
    pub build_name: BuildName,
    pub local_dependencies: Vec<PathBuf>,
    pub external_dependencies: Vec<String>,
    pub encoding: Encoding,
}

/// Reads and writes [`SourceMeta`] records under `<build_root>/meta/`.
#[derive(Debug, Clone)]
pub struct MetaStore {
    fs: Arc<dyn FileSystem>,
    build_root: PathBuf,
}

impl MetaStore {
    pub fn new(fs: Arc<dyn FileSystem>, build_root: PathBuf) -> Self {
        Self { fs, build_root }
    }

    fn meta_dir(&self) -> PathBuf {
        self.build_root.join(META_DIR)
    }

    /// Path of the record for a source file's dir-relative base path.
    pub fn record_path(&self, base_path: &str) -> PathBuf {
        to_meta_path(&self.build_root, base_path)
    }

    /// Load every record under the metadata directory. Unparseable records
    /// are skipped with a warning; the affected files simply recompile.
    pub fn load_all(&self) -> Result<HashMap<PathBuf, SourceMeta>> {
        let mut records = HashMap::new();
        let dir = self.meta_dir();
        if !self.fs.is_dir(&dir) {
            return Ok(records);
        }
        for path in walk_files(self.fs.as_ref(), &dir)? {
            let contents = self.fs.read(&path)?;
            match serde_json::from_slice::<SourceMeta>(&contents) {
                Ok(meta) => {
                    records.insert(meta.source_id.clone(), meta);
                }
                Err(err) => {
                    warn!(?path, %err, "skipping unparseable metadata record");
                }
            }
        }
        debug!(count = records.len(), "loaded persisted source metadata");
        Ok(records)
    }

    pub fn write(&self, base_path: &str, meta: &SourceMeta) -> Result<()> {
        let path = self.record_path(base_path);
        let contents = serde_json::to_vec_pretty(meta)?;
        self.fs.write(&path, &contents)?;
        Ok(())
    }

    pub fn delete(&self, base_path: &str) -> Result<()> {
        self.fs.remove_file(&self.record_path(base_path))?;
        Ok(())
    }
}

/// Reconstruct a source file's build files from its persisted record,
/// reading each output's contents back from disk. Fails if any output is
/// missing or unreadable, in which case the caller falls back to
/// compiling.
pub fn reconstruct_build_files(
    meta: &SourceMeta,
    fs: &dyn FileSystem,
) -> anyhow::Result<HashMap<BuildName, Vec<Arc<BuildFile>>>> {
    let mut by_build: HashMap<BuildName, Vec<Arc<BuildFile>>> = HashMap::new();
    for record in meta.builds.iter() {
        let content = match record.encoding {
            Encoding::Utf8 => FileContent::Text(fs.read_to_string(&record.id)?),
            Encoding::Binary => FileContent::Binary(fs.read(&record.id)?),
        };
        let filename = record
            .id
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let dir = record
            .id
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let build_file = BuildFile {
            id: record.id.clone(),
            filename,
            dir,
            extension: extension_of(&record.id),
            content,
            build_name: record.build_name.clone(),
            source_id: meta.source_id.clone(),
            local_dependencies: record.local_dependencies.clone(),
            external_dependencies: record.external_dependencies.clone(),
        };
        by_build
            .entry(record.build_name.clone())
            .or_default()
            .push(Arc::new(build_file));
    }
    Ok(by_build)
}
