//! CLI command implementations.

pub mod build;
pub mod dev;
pub mod routes;

use hotpage_core::watch::canonical_root;
use hotpage_core::{BuildMode, HotpageConfig};
use miette::{IntoDiagnostic, Result};
use std::path::{Path, PathBuf};

/// A resolved project: canonical root plus effective configuration.
#[derive(Debug, Clone)]
pub struct Project {
    pub root: PathBuf,
    pub config: HotpageConfig,
}

/// Canonicalize `cwd`, load its config and apply a mode override.
pub fn load_project(cwd: &Path, config: Option<&Path>, mode: Option<BuildMode>) -> Result<Project> {
    let root = canonical_root(cwd).into_diagnostic()?;
    let mut config = HotpageConfig::load(&root, config).into_diagnostic()?;
    if let Some(mode) = mode {
        config = config.with_mode(mode);
    }
    Ok(Project { root, config })
}
