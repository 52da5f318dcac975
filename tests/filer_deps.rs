// tests/filer_deps.rs

//! Dependency diffing and propagation: attachment via imports, orphan
//! detachment, root-input pinning, dependency symmetry, external policy.

mod common;

use std::error::Error;
use std::sync::Arc;

use kiln::compile::PassthroughCompiler;
use kiln::filer::{Filer, SourceMeta};
use kiln::types::{ExternalsPolicy, Platform};
use kiln::watch::{WatchEvent, WatchKind};
use kiln_test_utils::builders::{BuildConfigBuilder, FilerOptionsBuilder, TestProject};
use kiln_test_utils::fake_compilers::RemovalRecorder;

use crate::common::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

fn update_event(project: &TestProject, rel: &str) -> WatchEvent {
    WatchEvent {
        kind: WatchKind::Update,
        path: project.id(rel),
        is_dir: false,
    }
}

fn delete_event(project: &TestProject, rel: &str) -> WatchEvent {
    WatchEvent {
        kind: WatchKind::Delete,
        path: project.id(rel),
        is_dir: false,
    }
}

/// `A.dependents[config].has(B)` iff `B.dependencies[config].has(A)`.
fn assert_symmetry(filer: &Filer, build: &str) {
    for id in filer.source_ids() {
        let Some(snapshot) = filer.source_snapshot(&id) else {
            continue;
        };
        for dep in snapshot
            .dependencies
            .get(build)
            .into_iter()
            .flatten()
        {
            let dep_snapshot = filer
                .source_snapshot(dep)
                .unwrap_or_else(|| panic!("dependency {dep:?} of {id:?} is not cached"));
            let dependents = dep_snapshot.dependents.get(build).cloned().unwrap_or_default();
            assert!(
                dependents.contains(&id),
                "{dep:?} is missing dependent {id:?}"
            );
        }
        for dependent in snapshot.dependents.get(build).into_iter().flatten() {
            let dependent_snapshot = filer
                .source_snapshot(dependent)
                .unwrap_or_else(|| panic!("dependent {dependent:?} of {id:?} is not cached"));
            let dependencies = dependent_snapshot
                .dependencies
                .get(build)
                .cloned()
                .unwrap_or_default();
            assert!(
                dependencies.contains(&id),
                "{dependent:?} is missing dependency {id:?}"
            );
        }
    }
}

#[tokio::test]
async fn removing_an_import_detaches_the_orphan() -> TestResult {
    init_tracing();

    let project = TestProject::new();
    project.write("src/a.ts", "import {x} from \"./b.ts\";\nexport const a = x;\n");
    project.write("src/b.ts", "export const x = 1;\n");

    let recorder = RemovalRecorder::new(Arc::new(PassthroughCompiler::new()));
    let removed = recorder.removed_handle();
    let options = FilerOptionsBuilder::new(project.root())
        .compiled_dir("src")
        .compiler("ts", Arc::new(recorder))
        .build(
            BuildConfigBuilder::new("server", Platform::Node)
                .input("src/a.ts")
                .build(project.root()),
        )
        .finish();
    let filer = Filer::new(options)?;
    filer.init().await?;
    assert!(project.exists(".kiln/out/server/b.js"));
    assert!(project.exists(".kiln/meta/a.ts.json"));
    assert!(project.exists(".kiln/meta/b.ts.json"));
    assert_symmetry(&filer, "server");

    // Drop the import: `b` has no dependents left and is not an input,
    // so it is detached and its output deleted.
    project.write("src/a.ts", "export const a = 1;\n");
    filer
        .handle_event(&project.id("src"), update_event(&project, "src/a.ts"))
        .await?;

    let b = filer.source_snapshot(&project.id("src/b.ts")).unwrap();
    assert!(b.builds.is_empty(), "b should be detached: {b:?}");
    assert!(!project.exists(".kiln/out/server/b.js"));
    assert!(!project.exists(".kiln/meta/b.ts.json"));
    assert_symmetry(&filer, "server");

    // The plugin was told about the detachment.
    let removed = removed.lock().unwrap();
    assert_eq!(
        removed.as_slice(),
        &[(project.id("src/b.ts"), "server".to_string())]
    );
    Ok(())
}

#[tokio::test]
async fn a_root_input_is_never_detached() -> TestResult {
    init_tracing();

    let project = TestProject::new();
    project.write("src/a.ts", "import {x} from \"./b.ts\";\nexport const a = x;\n");
    project.write("src/b.ts", "export const x = 1;\n");

    let options = FilerOptionsBuilder::new(project.root())
        .compiled_dir("src")
        .compiler("ts", Arc::new(PassthroughCompiler::new()))
        .build(
            BuildConfigBuilder::new("server", Platform::Node)
                .input("src/a.ts")
                .input("src/b.ts")
                .build(project.root()),
        )
        .finish();
    let filer = Filer::new(options)?;
    filer.init().await?;

    project.write("src/a.ts", "export const a = 1;\n");
    filer
        .handle_event(&project.id("src"), update_event(&project, "src/a.ts"))
        .await?;

    // `b` lost its only dependent but is itself an input.
    let b = filer.source_snapshot(&project.id("src/b.ts")).unwrap();
    assert_eq!(b.builds, vec!["server".to_string()]);
    assert!(project.exists(".kiln/out/server/b.js"));
    Ok(())
}

#[tokio::test]
async fn transitive_dependencies_attach_and_detach() -> TestResult {
    init_tracing();

    let project = TestProject::new();
    project.write("src/a.ts", "import {b} from \"./b.ts\";\nexport const a = b;\n");
    project.write("src/b.ts", "import {c} from \"./c.ts\";\nexport const b = c;\n");
    project.write("src/c.ts", "export const c = 1;\n");

    let options = FilerOptionsBuilder::new(project.root())
        .compiled_dir("src")
        .compiler("ts", Arc::new(PassthroughCompiler::new()))
        .build(
            BuildConfigBuilder::new("server", Platform::Node)
                .input("src/a.ts")
                .build(project.root()),
        )
        .finish();
    let filer = Filer::new(options)?;
    filer.init().await?;

    for rel in ["src/a.ts", "src/b.ts", "src/c.ts"] {
        let snapshot = filer.source_snapshot(&project.id(rel)).unwrap();
        assert_eq!(snapshot.builds, vec!["server".to_string()], "{rel}");
    }
    assert_symmetry(&filer, "server");

    // Cutting b -> c cascades: only c is detached.
    project.write("src/b.ts", "export const b = 2;\n");
    filer
        .handle_event(&project.id("src"), update_event(&project, "src/b.ts"))
        .await?;

    let b = filer.source_snapshot(&project.id("src/b.ts")).unwrap();
    assert_eq!(b.builds, vec!["server".to_string()]);
    let c = filer.source_snapshot(&project.id("src/c.ts")).unwrap();
    assert!(c.builds.is_empty());
    assert!(!project.exists(".kiln/out/server/c.js"));
    assert_symmetry(&filer, "server");
    Ok(())
}

#[tokio::test]
async fn mutual_imports_are_tolerated() -> TestResult {
    init_tracing();

    let project = TestProject::new();
    project.write("src/a.ts", "import {b} from \"./b.ts\";\nexport const a = 1;\n");
    project.write("src/b.ts", "import {a} from \"./a.ts\";\nexport const b = 2;\n");

    let options = FilerOptionsBuilder::new(project.root())
        .compiled_dir("src")
        .compiler("ts", Arc::new(PassthroughCompiler::new()))
        .build(
            BuildConfigBuilder::new("server", Platform::Node)
                .input("src/a.ts")
                .build(project.root()),
        )
        .finish();
    let filer = Filer::new(options)?;
    filer.init().await?;

    for rel in ["src/a.ts", "src/b.ts"] {
        let snapshot = filer.source_snapshot(&project.id(rel)).unwrap();
        assert_eq!(snapshot.builds, vec!["server".to_string()], "{rel}");
    }
    assert_symmetry(&filer, "server");
    Ok(())
}

#[tokio::test]
async fn unresolvable_specifiers_are_ignored() -> TestResult {
    init_tracing();

    let project = TestProject::new();
    project.write(
        "src/a.ts",
        "import {ghost} from \"./missing.ts\";\nexport const a = 1;\n",
    );

    let options = FilerOptionsBuilder::new(project.root())
        .compiled_dir("src")
        .compiler("ts", Arc::new(PassthroughCompiler::new()))
        .build(
            BuildConfigBuilder::new("server", Platform::Node)
                .input("src/a.ts")
                .build(project.root()),
        )
        .finish();
    let filer = Filer::new(options)?;
    filer.init().await?;

    let a = filer.source_snapshot(&project.id("src/a.ts")).unwrap();
    assert!(a.dependencies.get("server").map(Vec::is_empty).unwrap_or(true));
    assert!(project.exists(".kiln/out/server/a.js"));
    Ok(())
}

#[tokio::test]
async fn external_dependencies_are_recorded_but_never_attach() -> TestResult {
    init_tracing();

    let project = TestProject::new();
    project.write(
        "src/a.ts",
        "import {merge} from \"lodash\";\nexport const a = merge({}, {});\n",
    );

    let options = FilerOptionsBuilder::new(project.root())
        .compiled_dir("src")
        .compiler("ts", Arc::new(PassthroughCompiler::new()))
        .build(
            BuildConfigBuilder::new("server", Platform::Node)
                .input("src/a.ts")
                .externals(ExternalsPolicy::Ignore)
                .build(project.root()),
        )
        .finish();
    let filer = Filer::new(options)?;
    filer.init().await?;

    // The specifier survives untouched in the output and lands in the
    // persisted record's external list.
    let out = project.read(".kiln/out/server/a.js").unwrap();
    assert!(out.contains("\"lodash\""));
    let meta: SourceMeta =
        serde_json::from_str(&project.read(".kiln/meta/a.ts.json").unwrap())?;
    assert_eq!(meta.builds.len(), 1);
    assert_eq!(meta.builds[0].external_dependencies, vec!["lodash".to_string()]);
    assert!(meta.builds[0].local_dependencies.is_empty());
    Ok(())
}

#[tokio::test]
async fn external_error_policy_fails_the_file_only() -> TestResult {
    init_tracing();

    let project = TestProject::new();
    project.write("src/a.ts", "import {merge} from \"lodash\";\nexport const a = 1;\n");
    project.write("src/b.ts", "export const b = 2;\n");

    let options = FilerOptionsBuilder::new(project.root())
        .compiled_dir("src")
        .compiler("ts", Arc::new(PassthroughCompiler::new()))
        .build(
            BuildConfigBuilder::new("server", Platform::Node)
                .input("src/a.ts")
                .input("src/b.ts")
                .externals(ExternalsPolicy::Error)
                .build(project.root()),
        )
        .finish();
    let filer = Filer::new(options)?;

    // The failure is per-file: init succeeds and `b` still compiles.
    filer.init().await?;
    assert!(project.exists(".kiln/out/server/b.js"));
    assert!(
        !project.exists(".kiln/meta/a.ts.json"),
        "no metadata is persisted for the failed file"
    );
    Ok(())
}

#[tokio::test]
async fn deleting_a_source_cascades_to_its_orphans() -> TestResult {
    init_tracing();

    let project = TestProject::new();
    project.write("src/a.ts", "import {x} from \"./b.ts\";\nexport const a = x;\n");
    project.write("src/b.ts", "export const x = 1;\n");

    let options = FilerOptionsBuilder::new(project.root())
        .compiled_dir("src")
        .compiler("ts", Arc::new(PassthroughCompiler::new()))
        .build(
            BuildConfigBuilder::new("server", Platform::Node)
                .input("src/a.ts")
                .build(project.root()),
        )
        .finish();
    let filer = Filer::new(options)?;
    filer.init().await?;

    project.delete("src/a.ts");
    filer
        .handle_event(&project.id("src"), delete_event(&project, "src/a.ts"))
        .await?;

    assert!(filer.source_snapshot(&project.id("src/a.ts")).is_none());
    assert!(!project.exists(".kiln/out/server/a.js"));
    assert!(!project.exists(".kiln/meta/a.ts.json"));

    // `b` was only reachable through `a`.
    let b = filer.source_snapshot(&project.id("src/b.ts")).unwrap();
    assert!(b.builds.is_empty());
    assert!(!project.exists(".kiln/out/server/b.js"));
    Ok(())
}
