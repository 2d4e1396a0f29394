//! Change classification.

use std::path::{Path, PathBuf};

use crate::graph::DependencyGraph;

/// What happened to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
    Renamed,
}

impl ChangeKind {
    /// Adds, removes or renames a file.
    #[must_use]
    pub fn alters_layout(self) -> bool {
        !matches!(self, Self::Modified)
    }
}

/// One filesystem change.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileChange {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl FileChange {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self::new(path, ChangeKind::Modified)
    }
}

/// How a batch of changes must be handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Regenerate the entry set, rebuild, reload.
    Structural { file: PathBuf, reason: StructuralReason },
    /// Rebuild only.
    InPlace,
}

impl Classification {
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Structural { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuralReason {
    /// A page was added, removed or renamed.
    PageLayout,
    /// The changed file is not part of the current build.
    UnknownModule,
}

impl StructuralReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PageLayout => "page added, removed or renamed",
            Self::UnknownModule => "file is not part of the current build",
        }
    }
}

/// Classify `changes` against the page directory and the last good graph.
///
/// Any layout change under `pages_dir` is structural. A creation of a file
/// the graph already knows is an editor's atomic save and counts as an edit.
/// An in-place change to a file that maps to no module escalates to
/// structural, so the entry set is regenerated before the rebuild.
#[must_use]
pub fn classify<'a>(
    changes: impl IntoIterator<Item = &'a FileChange>,
    pages_dir: &Path,
    graph: &DependencyGraph,
) -> Classification {
    let mut unknown = None;
    for change in changes {
        let known = graph.module_for(&change.path).is_some();
        let replaced = change.kind == ChangeKind::Created && known;
        if change.kind.alters_layout() && !replaced && change.path.starts_with(pages_dir) {
            return Classification::Structural {
                file: change.path.clone(),
                reason: StructuralReason::PageLayout,
            };
        }
        if unknown.is_none() && !known {
            unknown = Some(change.path.clone());
        }
    }
    match unknown {
        Some(file) => Classification::Structural {
            file,
            reason: StructuralReason::UnknownModule,
        },
        None => Classification::InPlace,
    }
}
