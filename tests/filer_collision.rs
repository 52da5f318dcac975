// tests/filer_collision.rs

//! Two source files resolving to the same build output is an
//! unrecoverable invariant violation.

mod common;

use std::error::Error;
use std::sync::Arc;

use kiln::compile::PassthroughCompiler;
use kiln::errors::FilerError;
use kiln::filer::Filer;
use kiln::types::Platform;
use kiln_test_utils::builders::{BuildConfigBuilder, FilerOptionsBuilder, TestProject};

use crate::common::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn colliding_outputs_abort_initialization() -> TestResult {
    init_tracing();

    // Two watched directories both holding `x.ts`: their outputs map to
    // the same `out/server/x.js`.
    let project = TestProject::new();
    project.write("srca/x.ts", "export const x = 1;\n");
    project.write("srcb/x.ts", "export const x = 2;\n");

    let options = FilerOptionsBuilder::new(project.root())
        .compiled_dir("srca")
        .compiled_dir("srcb")
        .compiler("ts", Arc::new(PassthroughCompiler::new()))
        .build(
            BuildConfigBuilder::new("server", Platform::Node)
                .input("**/x.ts")
                .build(project.root()),
        )
        .finish();
    let filer = Filer::new(options)?;

    let err = filer.init().await.unwrap_err();
    assert!(
        matches!(err, FilerError::OutputCollision { .. }),
        "got: {err}"
    );
    Ok(())
}
