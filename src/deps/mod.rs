// src/deps/mod.rs

//! Dependency extraction from compiled output.
//!
//! Compiled text is scanned for import/export specifier occurrences
//! ([`extract`]), each specifier is classified as internal (maps to
//! another source file's build output) or external (a package reference),
//! and internal specifiers are rewritten to their build extensions so the
//! emitted output resolves against the output tree ([`resolve`] +
//! [`process_output`]).

use std::path::{Path, PathBuf};

pub mod extract;
pub mod resolve;

pub use extract::{SpecifierMatch, extract_specifiers};
pub use resolve::{is_external_specifier, resolve_specifier};

use crate::paths::map_to_build_extension;

/// One declared dependency of a build file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildDependency {
    /// The specifier as written in the compiled output.
    pub specifier: String,
    /// The specifier after extension mapping; what actually ends up in the
    /// emitted text for internal dependencies.
    pub mapped_specifier: String,
    /// Resolved build id for internal dependencies; the bare specifier for
    /// external ones.
    pub build_id: PathBuf,
    pub external: bool,
}

/// Result of postprocessing one build file's text output.
#[derive(Debug, Clone)]
pub struct ProcessedOutput {
    pub content: String,
    /// Declared dependencies in first-occurrence order, deduplicated by
    /// build id.
    pub dependencies: Vec<BuildDependency>,
}

/// Scan `text` for import specifiers, classify and resolve each against
/// `build_dir`, and rewrite internal specifiers to their build extensions.
pub fn process_output(text: &str, build_dir: &Path) -> ProcessedOutput {
    let matches = extract_specifiers(text);

    let mut dependencies: Vec<BuildDependency> = Vec::new();
    let mut content = String::with_capacity(text.len());
    let mut cursor = 0;

    for m in matches {
        let dependency = if is_external_specifier(&m.specifier) {
            BuildDependency {
                specifier: m.specifier.clone(),
                mapped_specifier: m.specifier.clone(),
                build_id: PathBuf::from(&m.specifier),
                external: true,
            }
        } else {
            let mapped = map_to_build_extension(&m.specifier);
            let build_id = resolve_specifier(&mapped, build_dir);
            BuildDependency {
                specifier: m.specifier.clone(),
                mapped_specifier: mapped,
                build_id,
                external: false,
            }
        };

        if dependency.mapped_specifier != m.specifier {
            content.push_str(&text[cursor..m.start]);
            content.push_str(&dependency.mapped_specifier);
            cursor = m.end;
        }

        if !dependencies.iter().any(|d| d.build_id == dependency.build_id) {
            dependencies.push(dependency);
        }
    }
    content.push_str(&text[cursor..]);

    ProcessedOutput {
        content,
        dependencies,
    }
}
