// src/filer/sync.rs

//! Synchronization of build-file sets to the memory cache and to disk.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::errors::{FilerError, Result};
use crate::fs::FileSystem;

use super::FilerFile;
use super::build_file::BuildFile;

/// Given `new` and (possibly absent) `old` build files for one
/// (source, build-config) pair, update the engine's file table: entries
/// present in `old` but absent from `new` are removed, and every file in
/// `new` is inserted, replacing any previous version.
///
/// Two different source files mapping to the same output path is an
/// unrecoverable invariant violation and is detected here.
pub(super) fn sync_build_files_to_memory(
    files: &mut HashMap<PathBuf, FilerFile>,
    new: &[Arc<BuildFile>],
    old: Option<&[Arc<BuildFile>]>,
) -> Result<()> {
    if let Some(old) = old {
        for old_file in old {
            if !new.iter().any(|f| f.id == old_file.id) {
                trace!(id = ?old_file.id, "deleting build file from memory");
                files.remove(&old_file.id);
            }
        }
    }
    for new_file in new {
        match files.get(&new_file.id) {
            Some(FilerFile::Build(existing)) if existing.source_id != new_file.source_id => {
                return Err(FilerError::OutputCollision {
                    output: new_file.id.clone(),
                    first: existing.source_id.clone(),
                    second: new_file.source_id.clone(),
                });
            }
            Some(FilerFile::Source(source)) => {
                return Err(FilerError::Invariant(format!(
                    "build output path {:?} collides with source file {:?}",
                    new_file.id, source.id
                )));
            }
            _ => {}
        }
        files.insert(new_file.id.clone(), FilerFile::Build(Arc::clone(new_file)));
    }
    Ok(())
}

/// Mirror one (source, build-config) pair's build files to disk: delete
/// files present in `old` but absent from `new`, and write files from
/// `new` whose on-disk bytes differ.
///
/// For paths not present in `old`, the file actually on disk is read back
/// and compared first; this avoids both redundant writes and misleadingly
/// updated file timestamps when a source change did not change a
/// particular output.
pub(super) fn sync_build_files_to_disk(
    fs: &Arc<dyn FileSystem>,
    new: &[Arc<BuildFile>],
    old: Option<&[Arc<BuildFile>]>,
) -> Result<()> {
    if let Some(old) = old {
        for old_file in old {
            if !new.iter().any(|f| f.id == old_file.id) {
                trace!(id = ?old_file.id, "deleting build file on disk");
                fs.remove_file(&old_file.id)?;
            }
        }
    }
    for new_file in new {
        let old_file = old.and_then(|old| old.iter().find(|f| f.id == new_file.id));
        let should_write = match old_file {
            Some(old_file) => {
                if old_file.content == new_file.content {
                    false
                } else {
                    trace!(id = ?new_file.id, "updating build file on disk");
                    true
                }
            }
            None => {
                if !fs.exists(&new_file.id) {
                    trace!(id = ?new_file.id, "creating build file on disk");
                    true
                } else {
                    match fs.read(&new_file.id) {
                        Ok(existing) if existing == new_file.content.as_bytes() => false,
                        _ => {
                            trace!(id = ?new_file.id, "updating stale build file on disk");
                            true
                        }
                    }
                }
            }
        };
        if should_write {
            fs.write(&new_file.id, new_file.content.as_bytes())?;
        } else {
            debug!(id = ?new_file.id, "build file unchanged on disk; skipping write");
        }
    }
    Ok(())
}
