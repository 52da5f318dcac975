// src/deps/resolve.rs

use std::path::{Path, PathBuf};

use crate::paths::normalize;

/// Whether a specifier refers to an external package rather than a local
/// file. Anything that is not explicitly relative or absolute is external.
pub fn is_external_specifier(specifier: &str) -> bool {
    !(specifier.starts_with("./") || specifier.starts_with("../") || specifier.starts_with('/'))
}

/// Resolve an internal specifier against the directory of the build file
/// that declared it, yielding an absolute build id. Purely lexical; the
/// target may not exist.
pub fn resolve_specifier(specifier: &str, build_dir: &Path) -> PathBuf {
    if specifier.starts_with('/') {
        return normalize(Path::new(specifier));
    }
    normalize(&build_dir.join(specifier))
}
