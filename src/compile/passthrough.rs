// src/compile/passthrough.rs

use std::future::Future;
use std::pin::Pin;

use anyhow::Result;

use crate::config::BuildConfig;
use crate::paths::{map_to_build_extension, to_build_extension, to_build_out_path};

use super::{Build, BuildContext, Compiler, CompileSource};

/// Compiler that copies a source file to its output location unchanged,
/// mapping only the extension. Useful for assets and for already-plain
/// sources, and as the baseline compiler in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCompiler;

impl PassthroughCompiler {
    pub fn new() -> Self {
        Self
    }
}

impl Compiler for PassthroughCompiler {
    fn compile<'a>(
        &'a self,
        source: CompileSource<'a>,
        config: &'a BuildConfig,
        ctx: &'a BuildContext,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Build>>> + Send + 'a>> {
        let filename = map_to_build_extension(source.filename);
        let extension = to_build_extension(source.extension).to_string();
        let base_path = if source.dir_base_path.is_empty() {
            filename.clone()
        } else {
            format!("{}/{}", source.dir_base_path, filename)
        };
        let id = to_build_out_path(&ctx.build_root, &config.name, &base_path);
        let dir = id.parent().map(|p| p.to_path_buf()).unwrap_or_default();
        let content = source.content.clone();

        Box::pin(async move {
            Ok(vec![Build {
                id,
                filename,
                dir,
                extension,
                content,
            }])
        })
    }
}
