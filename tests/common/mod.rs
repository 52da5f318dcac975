#![allow(dead_code)]

pub use kiln_test_utils::{init_tracing, poll_until, with_timeout};

use std::sync::Arc;

use kiln::compile::{CompilerRegistry, PassthroughCompiler};

/// Registry with passthrough compilers for the script extensions used
/// throughout these tests.
pub fn passthrough_registry() -> CompilerRegistry {
    let passthrough: Arc<PassthroughCompiler> = Arc::new(PassthroughCompiler::new());
    CompilerRegistry::new()
        .register("ts", passthrough.clone())
        .register("js", passthrough)
}
