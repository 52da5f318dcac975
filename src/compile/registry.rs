// src/compile/registry.rs

use std::collections::HashMap;
use std::sync::Arc;

use super::Compiler;

/// Lookup table from file extension (or the reserved externals slot) to a
/// compiler.
///
/// The set of supported source kinds is fixed per project configuration,
/// so this is populated once at startup and never mutated afterwards.
#[derive(Default, Clone)]
pub struct CompilerRegistry {
    by_extension: HashMap<String, Arc<dyn Compiler>>,
    externals: Option<Arc<dyn Compiler>>,
}

impl std::fmt::Debug for CompilerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut extensions: Vec<&str> = self.by_extension.keys().map(|s| s.as_str()).collect();
        extensions.sort();
        f.debug_struct("CompilerRegistry")
            .field("extensions", &extensions)
            .field("externals", &self.externals.is_some())
            .finish()
    }
}

impl CompilerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a compiler for an extension (without the leading dot).
    /// The last registration for an extension wins.
    pub fn register(mut self, extension: impl Into<String>, compiler: Arc<dyn Compiler>) -> Self {
        self.by_extension.insert(extension.into(), compiler);
        self
    }

    /// Register the compiler selected by the reserved externals source id.
    pub fn register_externals(mut self, compiler: Arc<dyn Compiler>) -> Self {
        self.externals = Some(compiler);
        self
    }

    pub fn get(&self, extension: &str) -> Option<Arc<dyn Compiler>> {
        self.by_extension.get(extension).cloned()
    }

    pub fn get_externals(&self) -> Option<Arc<dyn Compiler>> {
        self.externals.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.by_extension.is_empty() && self.externals.is_none()
    }

    /// Every distinct registered compiler, deduplicated by identity. Used
    /// to run `init` hooks exactly once per plugin.
    pub fn unique_compilers(&self) -> Vec<Arc<dyn Compiler>> {
        let mut out: Vec<Arc<dyn Compiler>> = Vec::new();
        for compiler in self
            .by_extension
            .values()
            .chain(self.externals.iter())
        {
            if !out.iter().any(|c| Arc::ptr_eq(c, compiler)) {
                out.push(compiler.clone());
            }
        }
        out
    }
}
