// src/errors.rs

//! Crate-wide error taxonomy and helpers.
//!
//! Configuration problems are fatal and synchronous (construction or init
//! time). Compile failures are *not* represented here: they are caught
//! per-file inside the engine and logged, never propagated. The remaining
//! variants cover IO, persisted-metadata parsing, and the two invariant
//! violations that are unrecoverable by design.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FilerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error(
        "two source files compile to the same output path {output:?}: {first:?} and {second:?}"
    )]
    OutputCollision {
        output: PathBuf,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Bookkeeping invariant violated: {0}")]
    Invariant(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FilerError {
    /// Whether this error indicates a logic bug that should stop the engine,
    /// as opposed to a transient per-file condition.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FilerError::OutputCollision { .. } | FilerError::Invariant(_)
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, FilerError>;
