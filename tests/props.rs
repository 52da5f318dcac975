// tests/props.rs

//! Property tests for specifier extraction/rewriting and content hashing.

mod common;

use std::path::Path;

use proptest::prelude::*;

use kiln::deps::{extract_specifiers, process_output};
use kiln::types::FileContent;

use crate::common::init_tracing;

#[test]
fn extraction_covers_import_forms() {
    init_tracing();

    let text = concat!(
        "import {a} from \"./a.ts\";\n",
        "import \"./side-effect.ts\";\n",
        "export {b} from './b.ts';\n",
        "export * from \"./c.ts\";\n",
        "const d = await import(\"./d.ts\");\n",
        "const e = require(\"pkg\");\n",
    );
    let matches = extract_specifiers(text);
    let specifiers: Vec<&str> = matches.iter().map(|m| m.specifier.as_str()).collect();
    assert_eq!(
        specifiers,
        vec![
            "./a.ts",
            "./side-effect.ts",
            "./b.ts",
            "./c.ts",
            "./d.ts",
            "pkg"
        ]
    );
    for m in matches.iter() {
        assert_eq!(&text[m.start..m.end], m.specifier);
    }
}

#[test]
fn rewriting_maps_internal_specifiers_only() {
    init_tracing();

    let text = "import {a} from \"./a.ts\";\nimport {b} from \"lodash\";\n";
    let processed = process_output(text, Path::new("/out/server"));
    assert!(processed.content.contains("\"./a.js\""));
    assert!(processed.content.contains("\"lodash\""));
    assert_eq!(processed.dependencies.len(), 2);
    assert!(!processed.dependencies[0].external);
    assert_eq!(
        processed.dependencies[0].build_id,
        Path::new("/out/server/a.js")
    );
    assert!(processed.dependencies[1].external);
}

proptest! {
    /// Every rendered import is found, in order, with exact byte offsets.
    #[test]
    fn extraction_finds_all_specifiers_in_order(
        names in proptest::collection::vec("[a-z]{1,8}", 1..8)
    ) {
        let mut text = String::new();
        for (i, name) in names.iter().enumerate() {
            text.push_str(&format!("import {{v{i}}} from \"./{name}.ts\";\n"));
        }
        let matches = extract_specifiers(&text);
        prop_assert_eq!(matches.len(), names.len());
        for (m, name) in matches.iter().zip(names.iter()) {
            prop_assert_eq!(&m.specifier, &format!("./{name}.ts"));
            prop_assert_eq!(&text[m.start..m.end], m.specifier.as_str());
        }
    }

    /// Rewriting is stable: processing already-rewritten output changes
    /// nothing further.
    #[test]
    fn rewrite_is_idempotent(
        names in proptest::collection::vec("[a-z]{1,8}", 1..8)
    ) {
        let mut text = String::new();
        for (i, name) in names.iter().enumerate() {
            text.push_str(&format!("import {{v{i}}} from \"./{name}.ts\";\n"));
        }
        let once = process_output(&text, Path::new("/out/b"));
        let twice = process_output(&once.content, Path::new("/out/b"));
        prop_assert_eq!(&once.content, &twice.content);
        // The resolved targets are stable even though the raw specifiers
        // already carry their build extensions on the second pass.
        let first: Vec<_> = once.dependencies.iter().map(|d| &d.build_id).collect();
        let second: Vec<_> = twice.dependencies.iter().map(|d| &d.build_id).collect();
        prop_assert_eq!(first, second);
    }

    /// Content hashing is deterministic and encoding-independent.
    #[test]
    fn content_hash_is_stable(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
        let a = FileContent::Binary(bytes.clone());
        let b = FileContent::Binary(bytes);
        prop_assert_eq!(a.hash(), b.hash());
    }
}
