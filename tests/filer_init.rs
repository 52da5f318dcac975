// tests/filer_init.rs

//! Cold startup: seeding the build graph from configured inputs, and the
//! configuration errors that abort it.

mod common;

use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use kiln::compile::PassthroughCompiler;
use kiln::errors::FilerError;
use kiln::filer::{FileKind, Filer};
use kiln::types::Platform;
use kiln_test_utils::builders::{BuildConfigBuilder, FilerOptionsBuilder, TestProject};
use kiln_test_utils::fake_compilers::CountingCompiler;

use crate::common::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

fn simple_project() -> TestProject {
    let project = TestProject::new();
    project.write("src/a.ts", "import {x} from \"./b.ts\";\nexport const a = x;\n");
    project.write("src/b.ts", "export const x = 1;\n");
    project
}

#[tokio::test]
async fn cold_init_compiles_inputs_and_dependencies() -> TestResult {
    init_tracing();

    let project = simple_project();
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
    let filer = Filer::new(options)?;
    filer.init().await?;

    // Both the root input and its discovered dependency compiled once.
    assert_eq!(count.load(Ordering::SeqCst), 2);
    assert!(project.exists(".kiln/out/server/a.js"));
    assert!(project.exists(".kiln/out/server/b.js"));

    // The import specifier was rewritten to the build extension.
    let out = project.read(".kiln/out/server/a.js").unwrap();
    assert!(out.contains("\"./b.js\""), "unexpected output: {out}");

    let a = filer.source_snapshot(&project.id("src/a.ts")).unwrap();
    assert_eq!(a.builds, vec!["server".to_string()]);
    assert_eq!(a.input_to, vec!["server".to_string()]);

    let b = filer.source_snapshot(&project.id("src/b.ts")).unwrap();
    assert_eq!(b.builds, vec!["server".to_string()]);
    assert!(b.input_to.is_empty(), "b was attached via a dependency edge");
    assert_eq!(b.dependents["server"], vec![project.id("src/a.ts")]);
    assert_eq!(a.dependencies["server"], vec![project.id("src/b.ts")]);

    Ok(())
}

#[tokio::test]
async fn init_is_memoized() -> TestResult {
    init_tracing();

    let project = simple_project();
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
    let filer = Filer::new(options)?;
    filer.init().await?;
    filer.init().await?;

    assert_eq!(count.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn filter_inputs_attach_every_match_as_root() -> TestResult {
    init_tracing();

    let project = TestProject::new();
    project.write("src/one.task.ts", "export const one = 1;\n");
    project.write("src/two.task.ts", "export const two = 2;\n");
    project.write("src/other.ts", "export const other = 0;\n");

    let options = FilerOptionsBuilder::new(project.root())
        .compiled_dir("src")
        .compiler("ts", Arc::new(PassthroughCompiler::new()))
        .build(
            BuildConfigBuilder::new("tasks", Platform::Node)
                .input("**/*.task.ts")
                .build(project.root()),
        )
        .finish();
    let filer = Filer::new(options)?;
    filer.init().await?;

    for rel in ["src/one.task.ts", "src/two.task.ts"] {
        let snapshot = filer.source_snapshot(&project.id(rel)).unwrap();
        assert_eq!(snapshot.input_to, vec!["tasks".to_string()], "{rel}");
    }
    // Files not matched by any input stay unattached.
    let other = filer.source_snapshot(&project.id("src/other.ts")).unwrap();
    assert!(other.builds.is_empty());
    assert!(!project.exists(".kiln/out/tasks/other.js"));

    Ok(())
}

#[tokio::test]
async fn find_by_path_searches_served_dirs_in_order() -> TestResult {
    init_tracing();

    let project = simple_project();
    let options = FilerOptionsBuilder::new(project.root())
        .compiled_dir("src")
        .compiler("ts", Arc::new(PassthroughCompiler::new()))
        .build(
            BuildConfigBuilder::new("server", Platform::Node)
                .input("src/a.ts")
                .build(project.root()),
        )
        .serve(".kiln/out/server")
        .serve("src")
        .finish();
    let filer = Filer::new(options)?;
    filer.init().await?;

    let build = filer.find_by_path("a.js").unwrap();
    assert_eq!(build.kind, FileKind::Build);

    let source = filer.find_by_path("a.ts").unwrap();
    assert_eq!(source.kind, FileKind::Source);

    assert!(filer.find_by_path("nope.js").is_none());
    Ok(())
}

#[tokio::test]
async fn unknown_input_is_a_config_error() -> TestResult {
    init_tracing();

    let project = simple_project();
    let options = FilerOptionsBuilder::new(project.root())
        .compiled_dir("src")
        .compiler("ts", Arc::new(PassthroughCompiler::new()))
        .build(
            BuildConfigBuilder::new("server", Platform::Node)
                .input("src/missing.ts")
                .build(project.root()),
        )
        .finish();
    let filer = Filer::new(options)?;
    let err = filer.init().await.unwrap_err();
    assert!(matches!(err, FilerError::Config(_)), "got: {err}");
    Ok(())
}

#[tokio::test]
async fn non_compilable_input_is_a_config_error() -> TestResult {
    init_tracing();

    let project = simple_project();
    project.write("static/page.ts", "export const page = 1;\n");

    let options = FilerOptionsBuilder::new(project.root())
        .compiled_dir("src")
        .files_dir("static")
        .compiler("ts", Arc::new(PassthroughCompiler::new()))
        .build(
            BuildConfigBuilder::new("server", Platform::Node)
                .input("static/page.ts")
                .build(project.root()),
        )
        .finish();
    let filer = Filer::new(options)?;
    let err = filer.init().await.unwrap_err();
    assert!(matches!(err, FilerError::Config(_)), "got: {err}");
    Ok(())
}

#[test]
fn construction_rejects_bad_option_combinations() {
    init_tracing();

    let project = simple_project();

    // Compiled dir without any build configuration.
    let options = FilerOptionsBuilder::new(project.root())
        .compiled_dir("src")
        .compiler("ts", Arc::new(PassthroughCompiler::new()))
        .finish();
    assert!(matches!(Filer::new(options), Err(FilerError::Config(_))));

    // Compiled dir without any compiler.
    let options = FilerOptionsBuilder::new(project.root())
        .compiled_dir("src")
        .build(
            BuildConfigBuilder::new("server", Platform::Node)
                .input("src/a.ts")
                .build(project.root()),
        )
        .finish();
    assert!(matches!(Filer::new(options), Err(FilerError::Config(_))));

    // Nested watched directories.
    let options = FilerOptionsBuilder::new(project.root())
        .compiled_dir("src")
        .files_dir("src/nested")
        .compiler("ts", Arc::new(PassthroughCompiler::new()))
        .build(
            BuildConfigBuilder::new("server", Platform::Node)
                .input("src/a.ts")
                .build(project.root()),
        )
        .finish();
    assert!(matches!(Filer::new(options), Err(FilerError::Config(_))));

    // Duplicate build names.
    let options = FilerOptionsBuilder::new(project.root())
        .compiled_dir("src")
        .compiler("ts", Arc::new(PassthroughCompiler::new()))
        .build(
            BuildConfigBuilder::new("server", Platform::Node)
                .input("src/a.ts")
                .build(project.root()),
        )
        .build(
            BuildConfigBuilder::new("server", Platform::Browser)
                .input("src/a.ts")
                .build(project.root()),
        )
        .finish();
    assert!(matches!(Filer::new(options), Err(FilerError::Config(_))));
}

#[tokio::test]
async fn missing_watched_directory_is_a_config_error() -> TestResult {
    init_tracing();

    let project = TestProject::new();
    project.write("src/a.ts", "export const a = 1;\n");
    let options = FilerOptionsBuilder::new(project.root())
        .compiled_dir("src")
        .files_dir("does-not-exist")
        .compiler("ts", Arc::new(PassthroughCompiler::new()))
        .build(
            BuildConfigBuilder::new("server", Platform::Node)
                .input("src/a.ts")
                .build(project.root()),
        )
        .finish();
    let filer = Filer::new(options)?;
    let err = filer.init().await.unwrap_err();
    assert!(matches!(err, FilerError::Config(_)), "got: {err}");
    Ok(())
}
