// tests/filer_watch.rs

//! End-to-end with a live filesystem watcher: edits on disk propagate to
//! rebuilt output without manual event injection.

mod common;

use std::error::Error;
use std::time::Duration;

use kiln::filer::Filer;
use kiln::types::Platform;
use kiln_test_utils::builders::{BuildConfigBuilder, FilerOptionsBuilder, TestProject};
use kiln_test_utils::poll_until;

use crate::common::{init_tracing, passthrough_registry};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn watcher_drives_rebuilds_and_deletes() -> TestResult {
    init_tracing();

    let project = TestProject::new();
    project.write("src/a.ts", "import {x} from \"./b.ts\";\nexport const a = x;\n");
    project.write("src/b.ts", "export const x = 1;\n");

    let mut options = FilerOptionsBuilder::new(project.root())
        .compiled_dir("src")
        .build(
            BuildConfigBuilder::new("server", Platform::Node)
                .input("src/a.ts")
                .build(project.root()),
        )
        .watch(true)
        .debounce(Duration::from_millis(25))
        .finish();
    // Both script extensions go through the shared passthrough registry.
    options.registry = passthrough_registry();
    let filer = Filer::new(options)?;
    filer.init().await?;
    assert!(project.exists(".kiln/out/server/b.js"));

    // An edit on disk is picked up, debounced, and rebuilt.
    project.write("src/b.ts", "export const x = 42;\n");
    let rebuilt = poll_until(Duration::from_secs(5), || {
        project
            .read(".kiln/out/server/b.js")
            .is_some_and(|out| out.contains("x = 42"))
    })
    .await;
    assert!(rebuilt, "watcher did not rebuild b.js");

    // Dropping the import detaches `b` and deletes its output.
    project.write("src/a.ts", "export const a = 7;\n");
    let detached = poll_until(Duration::from_secs(5), || {
        !project.exists(".kiln/out/server/b.js")
    })
    .await;
    assert!(detached, "watcher did not delete the orphaned output");

    filer.close();
    Ok(())
}
