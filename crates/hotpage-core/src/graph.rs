//! Dependency graph tracker.
//!
//! Rebuilt from scratch after every successful build from the session's
//! reported module graph; never patched incrementally.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Stable module identifier: `/` + project-relative path, or a virtual id
/// such as `/@hotpage/entry.js`.
pub type ModuleId = String;

/// One module as reported by a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleMeta {
    /// Backing file; `None` for generated modules.
    pub file: Option<PathBuf>,
    /// Module ids this module imports.
    pub imports: Vec<ModuleId>,
    /// Accepts its own hot updates.
    pub self_accepting: bool,
}

/// Input/import graph of one successful build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyMetadata {
    pub modules: BTreeMap<ModuleId, ModuleMeta>,
    /// The application's bootstrap module.
    pub root_module: ModuleId,
}

/// File → module map plus forward and reverse adjacency.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    files: HashMap<PathBuf, ModuleId>,
    imports: HashMap<ModuleId, BTreeSet<ModuleId>>,
    importers: HashMap<ModuleId, BTreeSet<ModuleId>>,
    self_accepting: HashSet<ModuleId>,
    root: Option<ModuleId>,
}

impl DependencyGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole graph with the one described by `metadata`.
    pub fn update(&mut self, metadata: &DependencyMetadata) {
        let mut next = Self {
            root: Some(metadata.root_module.clone()),
            ..Self::default()
        };

        for (id, meta) in &metadata.modules {
            if let Some(file) = &meta.file {
                next.files.insert(file.clone(), id.clone());
            }
            if meta.self_accepting {
                next.self_accepting.insert(id.clone());
            }
            let forward = next.imports.entry(id.clone()).or_default();
            for dep in &meta.imports {
                forward.insert(dep.clone());
            }
            for dep in &meta.imports {
                next.importers
                    .entry(dep.clone())
                    .or_default()
                    .insert(id.clone());
            }
        }

        *self = next;
    }

    /// The changed file's module plus, unless it accepts its own updates,
    /// every module that transitively imports it.
    ///
    /// Empty when the file belongs to no module.
    #[must_use]
    pub fn impacted_modules(&self, path: &Path) -> BTreeSet<ModuleId> {
        let Some(id) = self.files.get(path) else {
            return BTreeSet::new();
        };

        let mut impacted = BTreeSet::new();
        impacted.insert(id.clone());
        if self.self_accepting.contains(id) {
            return impacted;
        }

        let mut queue = VecDeque::from([id.clone()]);
        while let Some(current) = queue.pop_front() {
            if let Some(parents) = self.importers.get(&current) {
                for parent in parents {
                    if impacted.insert(parent.clone()) {
                        queue.push_back(parent.clone());
                    }
                }
            }
        }
        impacted
    }

    #[must_use]
    pub fn module_for(&self, path: &Path) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    #[must_use]
    pub fn is_root(&self, id: &str) -> bool {
        self.root.as_deref() == Some(id)
    }

    #[must_use]
    pub fn is_self_accepting(&self, id: &str) -> bool {
        self.self_accepting.contains(id)
    }

    /// Direct importers of `id`.
    #[must_use]
    pub fn dependents(&self, id: &str) -> Vec<&str> {
        self.importers
            .get(id)
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Direct imports of `id`.
    #[must_use]
    pub fn dependencies(&self, id: &str) -> Vec<&str> {
        self.imports
            .get(id)
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Number of modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.imports.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.imports.is_empty()
    }
}
