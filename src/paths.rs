// src/paths.rs

//! Path derivation shared by the whole engine.
//!
//! The build root holds two trees:
//!
//! - `<build_root>/out/<build>/<base>` — compiled output per build config
//! - `<build_root>/meta/<base>.json` — persisted per-source metadata
//!
//! where `<base>` is the source file's path relative to its watched
//! directory, with forward slashes. Watched directories may not nest, so
//! base paths are stable identifiers within a project.

use std::path::{Component, Path, PathBuf};

use crate::types::Encoding;

/// Subdirectory of the build root holding compiled output, one tree per
/// build configuration.
pub const OUT_DIR: &str = "out";

/// Subdirectory of the build root holding persisted source metadata.
pub const META_DIR: &str = "meta";

pub const META_EXTENSION: &str = "json";

const TS_EXTENSION: &str = "ts";
const JS_EXTENSION: &str = "js";

/// Output directory for one build configuration.
pub fn to_build_out_dir(build_root: &Path, build_name: &str) -> PathBuf {
    build_root.join(OUT_DIR).join(build_name)
}

/// Output path for a base path (dir-relative source path) in one build
/// configuration. The caller is responsible for extension mapping.
pub fn to_build_out_path(build_root: &Path, build_name: &str, base_path: &str) -> PathBuf {
    to_build_out_dir(build_root, build_name).join(base_path)
}

/// Metadata record path for a base path.
pub fn to_meta_path(build_root: &Path, base_path: &str) -> PathBuf {
    build_root
        .join(META_DIR)
        .join(format!("{base_path}.{META_EXTENSION}"))
}

/// Strip `<build_root>/out/<build_name>/` from a build id, returning the
/// base path with forward slashes, or `None` if the id is not inside that
/// output tree.
pub fn build_id_to_base_path(
    build_id: &Path,
    build_root: &Path,
    build_name: &str,
) -> Option<String> {
    let out_dir = to_build_out_dir(build_root, build_name);
    let rel = build_id.strip_prefix(&out_dir).ok()?;
    Some(rel.to_string_lossy().replace('\\', "/"))
}

/// Map a source extension to its build extension. Script sources compile
/// to plain JS; everything else keeps its extension.
pub fn to_build_extension(extension: &str) -> &str {
    if extension == TS_EXTENSION {
        JS_EXTENSION
    } else {
        extension
    }
}

/// Inverse of [`to_build_extension`].
pub fn to_source_extension(extension: &str) -> &str {
    if extension == JS_EXTENSION {
        TS_EXTENSION
    } else {
        extension
    }
}

/// Rewrite the trailing extension of a path-like string (a base path or an
/// import specifier) through [`to_build_extension`].
pub fn map_to_build_extension(path: &str) -> String {
    match path.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            format!("{stem}.{}", to_build_extension(ext))
        }
        _ => path.to_string(),
    }
}

/// Rewrite the trailing extension of a path-like string through
/// [`to_source_extension`].
pub fn map_to_source_extension(path: &str) -> String {
    match path.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            format!("{stem}.{}", to_source_extension(ext))
        }
        _ => path.to_string(),
    }
}

const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "ico", "woff", "woff2", "ttf", "otf", "eot", "mp3",
    "mp4", "ogg", "wasm", "pdf", "zip", "gz",
];

/// Infer a file's encoding from its extension.
pub fn infer_encoding(extension: &str) -> Encoding {
    if BINARY_EXTENSIONS.contains(&extension) {
        Encoding::Binary
    } else {
        Encoding::Utf8
    }
}

/// Extension of a path without the leading dot, lowercased; empty string
/// when the path has none.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Convert a path into a string relative to `root`, with forward slashes.
///
/// Returns `None` if `path` is not inside `root`.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    Some(rel.to_string_lossy().replace('\\', "/"))
}

/// Lexically normalize a path, resolving `.` and `..` components without
/// touching the filesystem. Used to resolve relative import specifiers
/// against a build file's directory.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
