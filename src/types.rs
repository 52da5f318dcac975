// src/types.rs

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Target platform of a build configuration.
///
/// The set of platforms is closed: every build configuration compiles its
/// sources either for a server-side `node` runtime or for the `browser`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Node,
    Browser,
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "node" => Ok(Platform::Node),
            "browser" => Ok(Platform::Browser),
            other => Err(format!(
                "invalid platform: {other} (expected \"node\" or \"browser\")"
            )),
        }
    }
}

/// How a build configuration treats external (package) dependencies found
/// in compiled output.
///
/// - `Ignore`: record the specifier in dependency metadata but never attach
///   or compile local files for it (default).
/// - `Error`: treat an external specifier as a compile failure for the
///   importing file. The failure is caught and logged like any other
///   compile failure; a later edit retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExternalsPolicy {
    Ignore,
    Error,
}

impl Default for ExternalsPolicy {
    fn default() -> Self {
        ExternalsPolicy::Ignore
    }
}

impl FromStr for ExternalsPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ignore" => Ok(ExternalsPolicy::Ignore),
            "error" => Ok(ExternalsPolicy::Error),
            other => Err(format!(
                "invalid externals policy: {other} (expected \"ignore\" or \"error\")"
            )),
        }
    }
}

/// Encoding of a source or build file, inferred from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    Utf8,
    Binary,
}

/// File contents, text or raw bytes depending on the file's [`Encoding`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    Text(String),
    Binary(Vec<u8>),
}

impl FileContent {
    pub fn encoding(&self) -> Encoding {
        match self {
            FileContent::Text(_) => Encoding::Utf8,
            FileContent::Binary(_) => Encoding::Binary,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            FileContent::Text(s) => s.as_bytes(),
            FileContent::Binary(b) => b,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FileContent::Text(s) => Some(s),
            FileContent::Binary(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    /// Hex blake3 digest of the contents.
    pub fn hash(&self) -> String {
        blake3::hash(self.as_bytes()).to_hex().to_string()
    }
}
