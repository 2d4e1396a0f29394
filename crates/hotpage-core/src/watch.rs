//! Project file watcher.
//!
//! Forwards source file changes to the scheduler queue. Coalescing is the
//! scheduler's job; every notify event becomes one `Changes` event.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use notify::{
    event::{CreateKind, ModifyKind, RemoveKind, RenameMode},
    Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher,
};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

use crate::scheduler::{ChangeKind, FileChange, SchedulerEvent};

/// Extensions that can take part in a build.
pub const WATCHED_EXTENSIONS: &[&str] = &["tsx", "ts", "jsx", "js", "mjs", "css", "json"];

/// Directory names never watched.
const IGNORED_DIRS: &[&str] = &["node_modules", "target"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WatchError {
    #[error("Invalid watch root: {}", .0.display())]
    InvalidRoot(PathBuf),

    #[error("Watcher failed: {0}")]
    WatcherFailed(String),
}

/// Which changes are forwarded to the scheduler.
#[derive(Debug, Clone)]
pub struct WatchFilter {
    root: PathBuf,
    pages_dir: PathBuf,
    out_dir: Option<PathBuf>,
}

impl WatchFilter {
    pub fn new(
        root: impl Into<PathBuf>,
        pages_dir: impl Into<PathBuf>,
        out_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            root: root.into(),
            pages_dir: pages_dir.into(),
            out_dir,
        }
    }

    /// Source files inside the root, outside build output and hidden or
    /// vendored directories. Directories under the page directory pass
    /// when they appear or disappear, since that changes the page set.
    #[must_use]
    pub fn accepts(&self, change: &FileChange) -> bool {
        let path = change.path.as_path();
        let Ok(rel) = path.strip_prefix(&self.root) else {
            return false;
        };
        if let Some(out) = &self.out_dir {
            if path.starts_with(out) {
                return false;
            }
        }
        let hidden = rel.components().any(|c| match c {
            Component::Normal(name) => {
                let name = name.to_string_lossy();
                name.starts_with('.') || IGNORED_DIRS.contains(&name.as_ref())
            }
            _ => false,
        });
        if hidden {
            return false;
        }
        match path.extension() {
            Some(ext) => ext
                .to_str()
                .is_some_and(|ext| WATCHED_EXTENSIONS.contains(&ext)),
            None => change.kind.alters_layout() && path.starts_with(&self.pages_dir),
        }
    }
}

/// Translate a notify event into file changes.
///
/// Renames become a removal of the old path and a creation of the new one.
/// Metadata events are dropped.
#[must_use]
pub fn changes_for_event(event: &Event) -> Vec<FileChange> {
    let each = |kind: ChangeKind| {
        event
            .paths
            .iter()
            .map(|p| FileChange::new(p.clone(), kind))
            .collect()
    };
    match &event.kind {
        EventKind::Create(CreateKind::File | CreateKind::Folder | CreateKind::Any) => {
            each(ChangeKind::Created)
        }
        EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any) => each(ChangeKind::Modified),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => each(ChangeKind::Removed),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => each(ChangeKind::Created),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut changes = Vec::with_capacity(2);
            if let [from, to, ..] = event.paths.as_slice() {
                changes.push(FileChange::new(from.clone(), ChangeKind::Removed));
                changes.push(FileChange::new(to.clone(), ChangeKind::Created));
            }
            changes
        }
        // Backends that cannot tell the direction report `Any`.
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .map(|p| {
                let kind = if p.exists() {
                    ChangeKind::Created
                } else {
                    ChangeKind::Removed
                };
                FileChange::new(p.clone(), kind)
            })
            .collect(),
        EventKind::Remove(RemoveKind::File | RemoveKind::Folder | RemoveKind::Any) => {
            each(ChangeKind::Removed)
        }
        _ => Vec::new(),
    }
}

/// Recursive watcher over the project root. Stops when dropped.
pub struct ProjectWatcher {
    root: PathBuf,
    _watcher: RecommendedWatcher,
}

impl ProjectWatcher {
    /// Watch `root` and forward accepted changes to `tx`.
    pub fn start(
        root: &Path,
        pages_dir: &Path,
        out_dir: Option<PathBuf>,
        tx: UnboundedSender<SchedulerEvent>,
    ) -> Result<Self, WatchError> {
        if !root.is_dir() {
            return Err(WatchError::InvalidRoot(root.to_path_buf()));
        }
        let filter = WatchFilter::new(root, pages_dir, out_dir);

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    let changes: Vec<FileChange> = changes_for_event(&event)
                        .into_iter()
                        .filter(|c| filter.accepts(c))
                        .collect();
                    if changes.is_empty() {
                        return;
                    }
                    debug!(changes = changes.len(), "file change");
                    if let Err(e) = tx.send(SchedulerEvent::Changes(changes)) {
                        warn!(error = %e, "scheduler queue closed, dropping change");
                    }
                }
                Err(e) => error!(error = %e, "watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )
        .map_err(|e| WatchError::WatcherFailed(e.to_string()))?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| WatchError::WatcherFailed(e.to_string()))?;
        info!(root = %root.display(), "watching project");

        Ok(Self {
            root: root.to_path_buf(),
            _watcher: watcher,
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Canonical form of a project root, matching the paths the watcher reports.
pub fn canonical_root(path: &Path) -> Result<PathBuf, WatchError> {
    dunce::canonicalize(path).map_err(|_| WatchError::InvalidRoot(path.to_path_buf()))
}
