// src/deps/extract.rs

//! Specifier scanning over compiled text output.
//!
//! This is a lexical scan, not a parse: it finds string-literal specifiers
//! in static `import`/`export ... from` statements, dynamic `import(...)`
//! calls, and `require(...)` calls, reporting byte offsets so callers can
//! rewrite specifiers in place. Template strings and computed specifiers
//! are ignored.

use std::sync::LazyLock;

use regex::Regex;

/// One specifier occurrence. `start`/`end` are byte offsets of the
/// specifier itself, excluding the surrounding quotes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecifierMatch {
    pub specifier: String,
    pub start: usize,
    pub end: usize,
}

static SPECIFIER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?x)
        (?: \b(?:import|export) \s+ (?: [\w$*\s{},]*? \s+ from \s+ )? ["']([^"'\n]+)["'] )
      | (?: \b(?:import|require) \s* \( \s* ["']([^"'\n]+)["'] \s* \) )
        "#,
    )
    .expect("specifier regex must compile")
});

/// Extract every specifier occurrence from `text`, in source order.
pub fn extract_specifiers(text: &str) -> Vec<SpecifierMatch> {
    let mut out = Vec::new();
    for captures in SPECIFIER_RE.captures_iter(text) {
        let group = captures.get(1).or_else(|| captures.get(2));
        if let Some(m) = group {
            out.push(SpecifierMatch {
                specifier: m.as_str().to_string(),
                start: m.start(),
                end: m.end(),
            });
        }
    }
    out
}
