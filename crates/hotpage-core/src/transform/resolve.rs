//! Specifier resolution for project-local modules.
//!
//! Relative (`./x`, `../x`) and root-absolute (`/src/x`) specifiers are
//! looked up on disk with extension and `index.*` fallbacks. Bare specifiers
//! never reach this module; they are left to the browser's import map.

use std::path::{Component, Path, PathBuf};

use hotpage_util::fs::relative_slash_path;

/// Extensions tried, in order, when a specifier omits one.
pub const RESOLVE_EXTENSIONS: &[&str] = &["tsx", "ts", "jsx", "js", "mjs", "json"];

/// Outcome of a resolution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(PathBuf),
    NotFound { tried: Vec<PathBuf> },
    OutsideRoot(PathBuf),
}

/// Resolves project-local specifiers relative to a fixed root.
#[derive(Debug, Clone)]
pub struct Resolver {
    root: PathBuf,
}

impl Resolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `specifier` as imported from `importer`.
    #[must_use]
    pub fn resolve(&self, importer: &Path, specifier: &str) -> Resolution {
        let spec = specifier.split(['?', '#']).next().unwrap_or(specifier);
        let base = if let Some(rooted) = spec.strip_prefix('/') {
            self.root.join(rooted)
        } else {
            let dir = importer.parent().unwrap_or(&self.root);
            dir.join(spec)
        };
        let base = normalize(&base);

        if !base.starts_with(&self.root) {
            return Resolution::OutsideRoot(base);
        }

        let mut tried = Vec::new();
        if base.is_file() {
            return Resolution::Found(base);
        }
        tried.push(base.clone());

        let file_name = base
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        for ext in RESOLVE_EXTENSIONS {
            let candidate = base.with_file_name(format!("{file_name}.{ext}"));
            if candidate.is_file() {
                return Resolution::Found(candidate);
            }
            tried.push(candidate);
        }

        for ext in RESOLVE_EXTENSIONS {
            let candidate = base.join(format!("index.{ext}"));
            if candidate.is_file() {
                return Resolution::Found(candidate);
            }
            tried.push(candidate);
        }

        Resolution::NotFound { tried }
    }

    /// Stable module id for a file under the root: `/` + slash path.
    #[must_use]
    pub fn module_id(&self, path: &Path) -> Option<String> {
        module_id_for(&self.root, path)
    }
}

#[must_use]
pub fn module_id_for(root: &Path, path: &Path) -> Option<String> {
    let rel = relative_slash_path(root, path)?;
    if rel.is_empty() {
        return None;
    }
    Some(format!("/{rel}"))
}

/// Lexically remove `.` and `..` components.
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
