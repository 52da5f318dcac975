// src/config/mod.rs

//! Project configuration.
//!
//! - [`model`] holds the raw serde structs mapping `Kiln.toml` plus the
//!   validated [`model::ProjectConfig`] and the runtime
//!   [`model::BuildConfig`] descriptors.
//! - [`loader`] reads and parses the file.
//! - [`validate`] performs the semantic checks that make configuration
//!   errors fatal at startup rather than latent at runtime.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    BuildConfig, BuildInput, BuildSection, DirSection, EngineSection, ProjectConfig,
    RawProjectConfig,
};
