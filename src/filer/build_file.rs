// src/filer/build_file.rs

//! Compiled output artifacts and their dependency diffing.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use crate::types::{Encoding, FileContent};

use super::source_file::BuildName;

/// One compiled output artifact, produced from one source file for one
/// build configuration. Identity is the absolute output path.
///
/// Build files are immutable snapshots: every (re)compile replaces the
/// whole set for its (source, build-config) pair. They are shared as
/// `Arc<BuildFile>` between the engine's file table and the owning source
/// file.
#[derive(Debug)]
pub struct BuildFile {
    pub id: PathBuf,
    pub filename: String,
    pub dir: PathBuf,
    pub extension: String,
    pub content: FileContent,
    pub build_name: BuildName,
    /// The source file this artifact was compiled from.
    pub source_id: PathBuf,
    /// Build ids of internal dependencies declared by this artifact.
    pub local_dependencies: Vec<PathBuf>,
    /// Package specifiers of external dependencies.
    pub external_dependencies: Vec<String>,
}

impl BuildFile {
    pub fn encoding(&self) -> Encoding {
        self.content.encoding()
    }
}

/// Symmetric difference of the declared dependencies between two sets of
/// build files for the same (source, build-config) pair.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DepDiff {
    pub added_local: Vec<PathBuf>,
    pub removed_local: Vec<PathBuf>,
    pub added_external: Vec<String>,
    pub removed_external: Vec<String>,
}

impl DepDiff {
    pub fn is_empty(&self) -> bool {
        self.added_local.is_empty()
            && self.removed_local.is_empty()
            && self.added_external.is_empty()
            && self.removed_external.is_empty()
    }
}

/// Diff the dependencies declared by `new` against those declared by
/// `old` (`None` means "first compile"). Results are sorted for
/// deterministic propagation order.
pub fn diff_dependencies(new: &[Arc<BuildFile>], old: Option<&[Arc<BuildFile>]>) -> DepDiff {
    let new_local: BTreeSet<&PathBuf> =
        new.iter().flat_map(|f| f.local_dependencies.iter()).collect();
    let old_local: BTreeSet<&PathBuf> = old
        .unwrap_or_default()
        .iter()
        .flat_map(|f| f.local_dependencies.iter())
        .collect();
    let new_external: BTreeSet<&String> = new
        .iter()
        .flat_map(|f| f.external_dependencies.iter())
        .collect();
    let old_external: BTreeSet<&String> = old
        .unwrap_or_default()
        .iter()
        .flat_map(|f| f.external_dependencies.iter())
        .collect();

    DepDiff {
        added_local: new_local
            .difference(&old_local)
            .map(|p| (*p).clone())
            .collect(),
        removed_local: old_local
            .difference(&new_local)
            .map(|p| (*p).clone())
            .collect(),
        added_external: new_external
            .difference(&old_external)
            .map(|s| (*s).clone())
            .collect(),
        removed_external: old_external
            .difference(&new_external)
            .map(|s| (*s).clone())
            .collect(),
    }
}
