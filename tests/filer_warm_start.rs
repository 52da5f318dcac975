// tests/filer_warm_start.rs

//! Warm restarts: hydrating build files from the persisted metadata store
//! instead of recompiling.

mod common;

use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use kiln::compile::PassthroughCompiler;
use kiln::filer::Filer;
use kiln::types::Platform;
use kiln_test_utils::builders::{BuildConfigBuilder, FilerOptionsBuilder, TestProject};
use kiln_test_utils::fake_compilers::CountingCompiler;

use crate::common::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

fn make_filer(project: &TestProject) -> Result<(Filer, Arc<AtomicUsize>), Box<dyn Error>> {
    let counting = CountingCompiler::new(Arc::new(PassthroughCompiler::new()));
    let count = counting.count_handle();
    let options = FilerOptionsBuilder::new(project.root())
        .compiled_dir("src")
        .compiler("ts", Arc::new(counting))
        .build(
            BuildConfigBuilder::new("server", Platform::Node)
                .input("src/a.ts")
                .build(project.root()),
        )
        .finish();
    Ok((Filer::new(options)?, count))
}

#[tokio::test]
async fn unchanged_tree_warm_starts_with_zero_compiles() -> TestResult {
    init_tracing();

    let project = TestProject::new();
    project.write("src/a.ts", "import {x} from \"./b.ts\";\nexport const a = x;\n");
    project.write("src/b.ts", "export const x = 1;\n");

    let (first, first_count) = make_filer(&project)?;
    first.init().await?;
    assert_eq!(first_count.load(Ordering::SeqCst), 2);
    first.close();
    drop(first);

    let (second, second_count) = make_filer(&project)?;
    second.init().await?;
    assert_eq!(
        second_count.load(Ordering::SeqCst),
        0,
        "warm start must not invoke the compiler"
    );

    // The hydrated graph is fully wired: caches, outputs and edges agree.
    let a = second.source_snapshot(&project.id("src/a.ts")).unwrap();
    assert_eq!(a.builds, vec!["server".to_string()]);
    assert_eq!(a.dependencies["server"], vec![project.id("src/b.ts")]);
    let b = second.source_snapshot(&project.id("src/b.ts")).unwrap();
    assert_eq!(b.dependents["server"], vec![project.id("src/a.ts")]);
    assert_eq!(second.build_ids().len(), 2);
    Ok(())
}

#[tokio::test]
async fn changed_file_recompiles_on_warm_start() -> TestResult {
    init_tracing();

    let project = TestProject::new();
    project.write("src/a.ts", "import {x} from \"./b.ts\";\nexport const a = x;\n");
    project.write("src/b.ts", "export const x = 1;\n");

    let (first, _) = make_filer(&project)?;
    first.init().await?;
    first.close();
    drop(first);

    // Edit `b` while the engine is down.
    project.write("src/b.ts", "export const x = 2;\n");

    let (second, second_count) = make_filer(&project)?;
    second.init().await?;
    assert_eq!(
        second_count.load(Ordering::SeqCst),
        1,
        "only the changed file recompiles"
    );
    let out = project.read(".kiln/out/server/b.js").unwrap();
    assert!(out.contains("x = 2"));

    // The stale-content marker was set when the mismatch was detected.
    let b = second.source_snapshot(&project.id("src/b.ts")).unwrap();
    assert!(b.dirty);
    let a = second.source_snapshot(&project.id("src/a.ts")).unwrap();
    assert!(!a.dirty);
    Ok(())
}

#[tokio::test]
async fn unparseable_metadata_record_falls_back_to_compiling() -> TestResult {
    init_tracing();

    let project = TestProject::new();
    project.write("src/a.ts", "export const a = 1;\n");

    let (first, _) = make_filer(&project)?;
    first.init().await?;
    first.close();
    drop(first);

    project.write(".kiln/meta/a.ts.json", "{ not json");

    let (second, second_count) = make_filer(&project)?;
    second.init().await?;
    assert_eq!(second_count.load(Ordering::SeqCst), 1);
    assert!(project.exists(".kiln/out/server/a.js"));
    Ok(())
}

#[tokio::test]
async fn missing_output_falls_back_to_compiling() -> TestResult {
    init_tracing();

    let project = TestProject::new();
    project.write("src/a.ts", "export const a = 1;\n");

    let (first, _) = make_filer(&project)?;
    first.init().await?;
    first.close();
    drop(first);

    // The metadata record survives but the output it describes is gone.
    project.delete(".kiln/out/server/a.js");

    let (second, second_count) = make_filer(&project)?;
    second.init().await?;
    assert_eq!(second_count.load(Ordering::SeqCst), 1);
    assert!(project.exists(".kiln/out/server/a.js"));
    Ok(())
}
