#![allow(dead_code)]

//! Fake compilers for exercising the engine without real plugins.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};

use kiln::compile::{Build, BuildContext, CompileSource, Compiler};
use kiln::config::BuildConfig;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Wraps another compiler and counts invocations, recording compiled
/// source ids in order.
pub struct CountingCompiler {
    inner: Arc<dyn Compiler>,
    count: Arc<AtomicUsize>,
    compiled: Arc<Mutex<Vec<PathBuf>>>,
}

impl CountingCompiler {
    pub fn new(inner: Arc<dyn Compiler>) -> Self {
        Self {
            inner,
            count: Arc::new(AtomicUsize::new(0)),
            compiled: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared invocation counter; clone before handing the compiler to the
    /// engine.
    pub fn count_handle(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.count)
    }

    pub fn compiled_handle(&self) -> Arc<Mutex<Vec<PathBuf>>> {
        Arc::clone(&self.compiled)
    }
}

impl Compiler for CountingCompiler {
    fn compile<'a>(
        &'a self,
        source: CompileSource<'a>,
        config: &'a BuildConfig,
        ctx: &'a BuildContext,
    ) -> BoxFuture<'a, Result<Vec<Build>>> {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.compiled
            .lock()
            .expect("compiled list poisoned")
            .push(source.id.to_path_buf());
        self.inner.compile(source, config, ctx)
    }

    fn on_remove(&self, source_id: &Path, config: &BuildConfig, ctx: &BuildContext) -> Result<()> {
        self.inner.on_remove(source_id, config, ctx)
    }
}

/// Wraps another compiler, sleeping before delegating, and tracks the
/// maximum number of concurrently running invocations. Used to verify the
/// per-key compile serialization.
pub struct SlowCompiler {
    inner: Arc<dyn Compiler>,
    delay: Duration,
    count: Arc<AtomicUsize>,
    running: Arc<AtomicUsize>,
    max_running: Arc<AtomicUsize>,
}

impl SlowCompiler {
    pub fn new(inner: Arc<dyn Compiler>, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            count: Arc::new(AtomicUsize::new(0)),
            running: Arc::new(AtomicUsize::new(0)),
            max_running: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn count_handle(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.count)
    }

    pub fn max_running_handle(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.max_running)
    }
}

impl Compiler for SlowCompiler {
    fn compile<'a>(
        &'a self,
        source: CompileSource<'a>,
        config: &'a BuildConfig,
        ctx: &'a BuildContext,
    ) -> BoxFuture<'a, Result<Vec<Build>>> {
        Box::pin(async move {
            self.count.fetch_add(1, Ordering::SeqCst);
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            let result = self.inner.compile(source, config, ctx).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            result
        })
    }
}

/// Always fails. Used to verify that compile failures are caught per-file
/// and do not poison the engine.
#[derive(Debug, Default)]
pub struct FailingCompiler;

impl Compiler for FailingCompiler {
    fn compile<'a>(
        &'a self,
        source: CompileSource<'a>,
        _config: &'a BuildConfig,
        _ctx: &'a BuildContext,
    ) -> BoxFuture<'a, Result<Vec<Build>>> {
        let id = source.id.to_path_buf();
        Box::pin(async move { Err(anyhow!("refusing to compile {id:?}")) })
    }
}

/// Records `on_remove` invocations.
pub struct RemovalRecorder {
    inner: Arc<dyn Compiler>,
    removed: Arc<Mutex<Vec<(PathBuf, String)>>>,
}

impl RemovalRecorder {
    pub fn new(inner: Arc<dyn Compiler>) -> Self {
        Self {
            inner,
            removed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn removed_handle(&self) -> Arc<Mutex<Vec<(PathBuf, String)>>> {
        Arc::clone(&self.removed)
    }
}

impl Compiler for RemovalRecorder {
    fn compile<'a>(
        &'a self,
        source: CompileSource<'a>,
        config: &'a BuildConfig,
        ctx: &'a BuildContext,
    ) -> BoxFuture<'a, Result<Vec<Build>>> {
        self.inner.compile(source, config, ctx)
    }

    fn on_remove(&self, source_id: &Path, config: &BuildConfig, _ctx: &BuildContext) -> Result<()> {
        self.removed
            .lock()
            .expect("removed list poisoned")
            .push((source_id.to_path_buf(), config.name.clone()));
        Ok(())
    }
}
