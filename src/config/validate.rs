// src/config/validate.rs

use std::collections::{HashMap, HashSet};

use crate::config::model::{ProjectConfig, RawProjectConfig};
use crate::errors::{FilerError, Result};
use crate::types::Platform;

impl TryFrom<RawProjectConfig> for ProjectConfig {
    type Error = FilerError;

    fn try_from(raw: RawProjectConfig) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ProjectConfig::new_unchecked(raw.engine, raw.dirs, raw.builds))
    }
}

fn validate_raw_config(cfg: &RawProjectConfig) -> Result<()> {
    ensure_has_dirs(cfg)?;
    validate_dirs(cfg)?;
    validate_builds(cfg)?;
    Ok(())
}

fn ensure_has_dirs(cfg: &RawProjectConfig) -> Result<()> {
    if cfg.dirs.is_empty() {
        return Err(FilerError::Config(
            "config must contain at least one [[dir]] section".to_string(),
        ));
    }
    Ok(())
}

/// Watched directories must not duplicate or nest: a file picked up by two
/// watchers would corrupt the cache bookkeeping, so this is rejected up
/// front.
fn validate_dirs(cfg: &RawProjectConfig) -> Result<()> {
    let mut seen: HashSet<&str> = HashSet::new();
    for dir in cfg.dirs.iter() {
        if dir.path.is_empty() {
            return Err(FilerError::Config(
                "[[dir]] has an empty `path`".to_string(),
            ));
        }
        if !seen.insert(dir.path.as_str()) {
            return Err(FilerError::Config(format!(
                "duplicate watched directory '{}'",
                dir.path
            )));
        }
    }
    for a in cfg.dirs.iter() {
        for b in cfg.dirs.iter() {
            if a.path != b.path && is_nested(&a.path, &b.path) {
                return Err(FilerError::Config(format!(
                    "watched directory '{}' is inside watched directory '{}'",
                    a.path, b.path
                )));
            }
        }
    }
    if cfg.dirs.iter().any(|d| is_nested(&cfg.engine.build_root, &d.path)) {
        return Err(FilerError::Config(format!(
            "the build root '{}' cannot be inside a watched directory",
            cfg.engine.build_root
        )));
    }
    Ok(())
}

fn is_nested(child: &str, parent: &str) -> bool {
    child
        .strip_prefix(parent)
        .is_some_and(|rest| rest.starts_with('/'))
}

fn validate_builds(cfg: &RawProjectConfig) -> Result<()> {
    let has_compiled_dirs = cfg.dirs.iter().any(|d| d.compiled);
    if has_compiled_dirs && cfg.builds.is_empty() {
        return Err(FilerError::Config(
            "compiled directories are configured but there are no [[build]] sections".to_string(),
        ));
    }
    if !has_compiled_dirs && !cfg.builds.is_empty() {
        return Err(FilerError::Config(
            "[[build]] sections are configured but no [[dir]] is marked `compiled`".to_string(),
        ));
    }

    let mut names: HashSet<&str> = HashSet::new();
    let mut primaries: HashMap<Platform, &str> = HashMap::new();
    for build in cfg.builds.iter() {
        if build.name.is_empty() {
            return Err(FilerError::Config(
                "[[build]] has an empty `name`".to_string(),
            ));
        }
        if !names.insert(build.name.as_str()) {
            return Err(FilerError::Config(format!(
                "duplicate build name '{}'",
                build.name
            )));
        }
        if build.input.is_empty() {
            return Err(FilerError::Config(format!(
                "build '{}' declares no inputs",
                build.name
            )));
        }
        for entry in build.input.iter() {
            if entry.is_empty() {
                return Err(FilerError::Config(format!(
                    "build '{}' has an empty input entry",
                    build.name
                )));
            }
        }
        if build.primary {
            if let Some(previous) = primaries.insert(build.platform, &build.name) {
                return Err(FilerError::Config(format!(
                    "platform {:?} has more than one primary build: '{}' and '{}'",
                    build.platform, previous, build.name
                )));
            }
        }
    }
    Ok(())
}
