//! Change scheduler.
//!
//! A single consumer of the change queue drives the cycle
//! `Idle → Classifying → (RegeneratingEntries)? → Rebuilding → Broadcasting → Idle`.
//! Only one rebuild is ever in flight. Events that arrive while a cycle
//! runs stay in the queue and are drained together into exactly one
//! follow-up cycle.

pub mod classify;

pub use classify::{classify, ChangeKind, Classification, FileChange, StructuralReason};

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;

use crate::entries::{EntryOptions, EntrySet};
use crate::graph::DependencyGraph;
use crate::hmr::{HmrMessage, LiveChannel};
use crate::session::{ArtifactSet, BuildResult, BundlerSession, ServedArtifacts};

/// Where the scheduler is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Classifying,
    RegeneratingEntries,
    Rebuilding,
    Broadcasting,
}

/// Input to the scheduler queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    Changes(Vec<FileChange>),
    Shutdown,
}

/// The rebuild side of a bundler session.
pub trait Rebuild {
    fn rebuild(&mut self) -> BuildResult;

    fn restart(&mut self, entries: EntrySet);
}

impl Rebuild for BundlerSession {
    fn rebuild(&mut self) -> BuildResult {
        BundlerSession::rebuild(self)
    }

    fn restart(&mut self, entries: EntrySet) {
        BundlerSession::restart(self, entries);
    }
}

/// What one cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Targeted updates for these modules.
    Updated { modules: Vec<String>, generation: u64 },
    Reloaded { reason: String, generation: u64 },
    Failed { message: String },
}

/// Changes not yet delivered by a successful cycle.
#[derive(Debug, Default)]
struct Pending {
    files: BTreeMap<PathBuf, ChangeKind>,
    // Set once any pending change was structural; survives failed cycles.
    structural: Option<(PathBuf, StructuralReason)>,
}

impl Pending {
    fn absorb(&mut self, changes: Vec<FileChange>) {
        for change in changes {
            let kind = match self.files.get(&change.path) {
                Some(previous) if previous.alters_layout() => *previous,
                _ => change.kind,
            };
            self.files.insert(change.path, kind);
        }
    }

    fn changes(&self) -> Vec<FileChange> {
        self.files
            .iter()
            .map(|(path, kind)| FileChange::new(path.clone(), *kind))
            .collect()
    }

    fn clear(&mut self) {
        self.files.clear();
        self.structural = None;
    }
}

/// Consumes change batches and drives rebuild and broadcast.
pub struct Scheduler<R: Rebuild = BundlerSession> {
    project_root: PathBuf,
    entry_options: EntryOptions,
    session: R,
    graph: DependencyGraph,
    served: Arc<ServedArtifacts>,
    channel: Arc<LiveChannel>,
    debounce: Duration,
    state: SchedulerState,
    pending: Pending,
    cycles: u64,
}

impl<R: Rebuild> Scheduler<R> {
    pub fn new(
        project_root: impl Into<PathBuf>,
        entry_options: EntryOptions,
        session: R,
        served: Arc<ServedArtifacts>,
        channel: Arc<LiveChannel>,
    ) -> Self {
        Self {
            project_root: project_root.into(),
            entry_options,
            session,
            graph: DependencyGraph::new(),
            served,
            channel,
            debounce: Duration::from_millis(50),
            state: SchedulerState::Idle,
            pending: Pending::default(),
            cycles: 0,
        }
    }

    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    #[must_use]
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    #[must_use]
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    #[must_use]
    pub fn session(&self) -> &R {
        &self.session
    }

    /// Completed cycles, successful or not.
    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Changes waiting for a successful cycle.
    #[must_use]
    pub fn pending_changes(&self) -> usize {
        self.pending.files.len()
    }

    /// First build, before any client is connected.
    ///
    /// On failure nothing is served yet; the error is kept for clients that
    /// connect before the next successful cycle.
    pub fn initial_build(&mut self) -> CycleOutcome {
        self.state = SchedulerState::Rebuilding;
        let outcome = match self.session.rebuild() {
            BuildResult::Success {
                artifacts,
                metadata,
            } => {
                let generation = artifacts.generation;
                self.served.store(artifacts);
                self.graph.update(&metadata);
                self.channel.set_generation(generation);
                CycleOutcome::Reloaded {
                    reason: "initial".to_string(),
                    generation,
                }
            }
            BuildResult::Failure { error } => {
                let message = error.to_string();
                self.channel.broadcast(&HmrMessage::error(message.clone()));
                CycleOutcome::Failed { message }
            }
        };
        self.state = SchedulerState::Idle;
        outcome
    }

    /// Consume events until `Shutdown` or until every sender is gone.
    ///
    /// Blocks the calling thread; run it on a dedicated or blocking thread.
    pub fn run(&mut self, mut rx: UnboundedReceiver<SchedulerEvent>) {
        tracing::debug!("scheduler started");
        loop {
            let Some(first) = rx.blocking_recv() else {
                break;
            };

            let mut batch = Vec::new();
            let mut shutdown = false;
            collect(first, &mut batch, &mut shutdown);

            if !shutdown && !self.debounce.is_zero() {
                std::thread::sleep(self.debounce);
            }
            while let Ok(event) = rx.try_recv() {
                collect(event, &mut batch, &mut shutdown);
            }

            if !batch.is_empty() {
                self.process_batch(batch);
            }
            if shutdown {
                break;
            }
        }
        tracing::debug!(cycles = self.cycles, "scheduler stopped");
    }

    /// Run one full cycle for `changes` plus anything still pending.
    pub fn process_batch(&mut self, changes: Vec<FileChange>) -> CycleOutcome {
        self.state = SchedulerState::Classifying;
        self.pending.absorb(changes);
        let changes = self.pending.changes();
        tracing::debug!(changes = changes.len(), "classifying changes");

        if self.pending.structural.is_none() {
            if let Classification::Structural { file, reason } =
                classify(&changes, &self.entry_options.pages_dir, &self.graph)
            {
                tracing::debug!(
                    file = %file.display(),
                    reason = reason.as_str(),
                    "structural change"
                );
                self.pending.structural = Some((file, reason));
            }
        }

        if self.pending.structural.is_some() {
            self.state = SchedulerState::RegeneratingEntries;
            match EntrySet::generate(&self.project_root, &self.entry_options) {
                Ok(entries) => {
                    tracing::debug!(routes = entries.routes.len(), "entry set regenerated");
                    self.session.restart(entries);
                }
                Err(err) => return self.fail(err.to_string()),
            }
        }

        self.state = SchedulerState::Rebuilding;
        match self.session.rebuild() {
            BuildResult::Success {
                artifacts,
                metadata,
            } => {
                let generation = artifacts.generation;
                self.served.store(Arc::clone(&artifacts));
                self.graph.update(&metadata);
                self.channel.set_generation(generation);

                self.state = SchedulerState::Broadcasting;
                let outcome = match self.pending.structural.take() {
                    Some((file, reason)) => {
                        self.reload(Some(file.as_path()), reason.as_str(), generation)
                    }
                    None => self.hot_update(&changes, &artifacts, generation),
                };
                self.pending.clear();
                self.finish();
                outcome
            }
            BuildResult::Failure { error } => self.fail(error.to_string()),
        }
    }

    fn hot_update(
        &self,
        changes: &[FileChange],
        artifacts: &ArtifactSet,
        generation: u64,
    ) -> CycleOutcome {
        let mut impacted = BTreeSet::new();
        for change in changes {
            let modules = self.graph.impacted_modules(&change.path);
            if modules.is_empty() {
                let file = Some(change.path.as_path());
                return self.reload(file, "changed file left the build", generation);
            }
            impacted.extend(modules);
        }

        if let Some(root) = impacted.iter().find(|id| self.graph.is_root(id)) {
            tracing::debug!(root = %root, "update reaches the root module");
            let file = changes.first().map(|c| c.path.as_path());
            return self.reload(file, "no hot update boundary", generation);
        }

        let mut updates = Vec::with_capacity(impacted.len());
        for id in &impacted {
            match artifacts.text(id) {
                Some(code) => updates.push(HmrMessage::update(id.clone(), code, generation)),
                None => return self.reload(None, "module missing from build output", generation),
            }
        }
        for message in &updates {
            self.channel.broadcast(message);
        }
        tracing::info!(modules = impacted.len(), generation, "hot update");
        CycleOutcome::Updated {
            modules: impacted.into_iter().collect(),
            generation,
        }
    }

    fn reload(&self, file: Option<&Path>, reason: &str, generation: u64) -> CycleOutcome {
        let file = file.map(|path| {
            hotpage_util::fs::relative_slash_path(&self.project_root, path)
                .unwrap_or_else(|| path.display().to_string())
        });
        self.channel
            .broadcast(&HmrMessage::reload(file, reason, generation));
        tracing::info!(reason, generation, "full reload");
        CycleOutcome::Reloaded {
            reason: reason.to_string(),
            generation,
        }
    }

    // Pending changes stay queued for the next cycle.
    fn fail(&mut self, message: String) -> CycleOutcome {
        self.state = SchedulerState::Broadcasting;
        self.channel.broadcast(&HmrMessage::error(message.clone()));
        self.finish();
        CycleOutcome::Failed { message }
    }

    fn finish(&mut self) {
        self.cycles += 1;
        self.state = SchedulerState::Idle;
    }
}

fn collect(event: SchedulerEvent, batch: &mut Vec<FileChange>, shutdown: &mut bool) {
    match event {
        SchedulerEvent::Changes(changes) => batch.extend(changes),
        SchedulerEvent::Shutdown => *shutdown = true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{DependencyMetadata, ModuleMeta};
    use crate::session::BuildError;
    use crate::error::TransformError;
    use std::fs;
    use tempfile::tempdir;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

    const ENTRY: &str = "/@hotpage/entry.js";

    /// Scripted session: fixed graph, optional failures, counts rebuilds.
    struct FakeSession {
        root: PathBuf,
        generation: u64,
        rebuilds: usize,
        restarts: usize,
        fail_next: bool,
        // Events injected into the queue while the first rebuild runs.
        inject: Option<(UnboundedSender<SchedulerEvent>, Vec<SchedulerEvent>)>,
    }

    impl FakeSession {
        fn new(root: &Path) -> Self {
            Self {
                root: root.to_path_buf(),
                generation: 0,
                rebuilds: 0,
                restarts: 0,
                fail_next: false,
                inject: None,
            }
        }

        fn metadata(&self) -> DependencyMetadata {
            let module = |rel: &str, imports: &[&str], accepts: bool| ModuleMeta {
                file: Some(self.root.join(rel)),
                imports: imports.iter().map(|s| (*s).to_string()).collect(),
                self_accepting: accepts,
            };
            let mut modules = BTreeMap::new();
            modules.insert(
                ENTRY.to_string(),
                ModuleMeta {
                    file: None,
                    imports: vec!["/pages/index.tsx".to_string()],
                    self_accepting: false,
                },
            );
            modules.insert(
                "/pages/index.tsx".to_string(),
                module("pages/index.tsx", &["/components/Button.module.css"], false),
            );
            modules.insert(
                "/components/Button.module.css".to_string(),
                module("components/Button.module.css", &[], true),
            );
            modules.insert("/lib/leaf.ts".to_string(), module("lib/leaf.ts", &[], false));
            DependencyMetadata {
                modules,
                root_module: ENTRY.to_string(),
            }
        }
    }

    impl Rebuild for FakeSession {
        fn rebuild(&mut self) -> BuildResult {
            self.rebuilds += 1;
            if let Some((tx, events)) = self.inject.take() {
                for event in events {
                    tx.send(event).unwrap();
                }
            }
            if self.fail_next {
                self.fail_next = false;
                return BuildResult::Failure {
                    error: BuildError::Transform(
                        TransformError::new("pages/index.tsx", "unclosed '{'").at_line(3),
                    ),
                };
            }
            self.generation += 1;
            let mut artifacts = ArtifactSet::new(self.generation);
            for id in self.metadata().modules.keys() {
                artifacts.insert(id.clone(), format!("// {id} v{}", self.generation));
            }
            BuildResult::Success {
                artifacts: Arc::new(artifacts),
                metadata: self.metadata(),
            }
        }

        fn restart(&mut self, _entries: EntrySet) {
            self.restarts += 1;
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        root: PathBuf,
        channel: Arc<LiveChannel>,
        served: Arc<ServedArtifacts>,
        scheduler: Scheduler<FakeSession>,
    }

    fn harness() -> Harness {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();
        fs::create_dir_all(root.join("pages")).unwrap();
        fs::write(root.join("pages/index.tsx"), "export default () => null;\n").unwrap();

        let channel = Arc::new(LiveChannel::new(0));
        let served = Arc::new(ServedArtifacts::default());
        let mut scheduler = Scheduler::new(
            &root,
            EntryOptions {
                pages_dir: root.join("pages"),
                reserved_prefix: "_".to_string(),
            },
            FakeSession::new(&root),
            Arc::clone(&served),
            Arc::clone(&channel),
        )
        .with_debounce(Duration::ZERO);
        assert!(matches!(scheduler.initial_build(), CycleOutcome::Reloaded { .. }));
        Harness {
            _dir: dir,
            root,
            channel,
            served,
            scheduler,
        }
    }

    fn drain(rx: &mut UnboundedReceiver<HmrMessage>) -> Vec<HmrMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn listen(h: &Harness) -> UnboundedReceiver<HmrMessage> {
        let (_, mut rx) = h.channel.connect(None);
        drain(&mut rx);
        rx
    }

    #[test]
    fn test_self_accepting_edit_is_single_update() {
        let mut h = harness();
        let mut rx = listen(&h);
        let path = h.root.join("components/Button.module.css");

        let outcome = h.scheduler.process_batch(vec![FileChange::modified(&path)]);
        assert_eq!(
            outcome,
            CycleOutcome::Updated {
                modules: vec!["/components/Button.module.css".to_string()],
                generation: 2
            }
        );
        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1);
        match &frames[0] {
            HmrMessage::Update {
                module_id, update, ..
            } => {
                assert_eq!(module_id, "/components/Button.module.css");
                assert_eq!(update, "// /components/Button.module.css v2");
            }
            other => panic!("expected update, got {other:?}"),
        }
        assert_eq!(h.scheduler.state(), SchedulerState::Idle);
    }

    #[test]
    fn test_leaf_edit_is_update() {
        let mut h = harness();
        let mut rx = listen(&h);
        let outcome = h
            .scheduler
            .process_batch(vec![FileChange::modified(h.root.join("lib/leaf.ts"))]);
        assert!(matches!(outcome, CycleOutcome::Updated { ref modules, .. } if modules == &["/lib/leaf.ts"]));
        assert!(drain(&mut rx).iter().all(|m| m.kind() == "update"));
    }

    #[test]
    fn test_edit_reaching_root_reloads() {
        let mut h = harness();
        let mut rx = listen(&h);
        let outcome = h
            .scheduler
            .process_batch(vec![FileChange::modified(h.root.join("pages/index.tsx"))]);
        assert!(matches!(outcome, CycleOutcome::Reloaded { .. }));
        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind(), "reload");
    }

    #[test]
    fn test_structural_change_regenerates_then_reloads() {
        let mut h = harness();
        let mut rx = listen(&h);
        fs::write(h.root.join("pages/team.tsx"), "export default () => null;\n").unwrap();

        let outcome = h.scheduler.process_batch(vec![FileChange::new(
            h.root.join("pages/team.tsx"),
            ChangeKind::Created,
        )]);
        assert!(matches!(outcome, CycleOutcome::Reloaded { .. }));
        assert_eq!(h.scheduler.session().restarts, 1);
        let frames = drain(&mut rx);
        assert_eq!(
            frames,
            vec![HmrMessage::reload(
                Some("pages/team.tsx".to_string()),
                StructuralReason::PageLayout.as_str(),
                2
            )]
        );
    }

    #[test]
    fn test_failure_keeps_served_set_and_sends_one_error() {
        let mut h = harness();
        let mut rx = listen(&h);
        let before = h.served.load();

        h.scheduler.session.fail_next = true;
        let path = h.root.join("components/Button.module.css");
        let outcome = h.scheduler.process_batch(vec![FileChange::modified(&path)]);
        assert_eq!(
            outcome,
            CycleOutcome::Failed {
                message: "pages/index.tsx:3: unclosed '{'".to_string()
            }
        );
        assert_eq!(*h.served.load(), *before);
        assert_eq!(h.channel.generation(), 1);
        assert_eq!(drain(&mut rx), vec![HmrMessage::error("pages/index.tsx:3: unclosed '{'")]);
        assert_eq!(h.scheduler.pending_changes(), 1);
        assert_eq!(h.scheduler.state(), SchedulerState::Idle);

        // The fix delivers the change that was pending.
        let outcome = h
            .scheduler
            .process_batch(vec![FileChange::modified(h.root.join("lib/leaf.ts"))]);
        assert_eq!(
            outcome,
            CycleOutcome::Updated {
                modules: vec![
                    "/components/Button.module.css".to_string(),
                    "/lib/leaf.ts".to_string()
                ],
                generation: 2
            }
        );
        assert_eq!(h.scheduler.pending_changes(), 0);
    }

    #[test]
    fn test_regeneration_failure_is_error_event() {
        let mut h = harness();
        let mut rx = listen(&h);
        // `about.tsx` and `about/index.tsx` both claim `/about`.
        fs::write(h.root.join("pages/about.tsx"), "export default () => null;\n").unwrap();
        fs::create_dir_all(h.root.join("pages/about")).unwrap();
        fs::write(h.root.join("pages/about/index.tsx"), "export default () => null;\n").unwrap();

        let outcome = h.scheduler.process_batch(vec![FileChange::new(
            h.root.join("pages/about/index.tsx"),
            ChangeKind::Created,
        )]);
        assert!(matches!(outcome, CycleOutcome::Failed { .. }));
        assert_eq!(h.scheduler.session().rebuilds, 1);
        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind(), "error");
    }

    #[test]
    fn test_events_during_rebuild_coalesce_into_one_cycle() {
        let mut h = harness();
        let mut rx = listen(&h);
        let (tx, queue) = unbounded_channel();

        let leaf = h.root.join("lib/leaf.ts");
        let mut injected: Vec<SchedulerEvent> = (0..5)
            .map(|_| SchedulerEvent::Changes(vec![FileChange::modified(&leaf)]))
            .collect();
        injected.push(SchedulerEvent::Shutdown);
        h.scheduler.session.inject = Some((tx.clone(), injected));

        tx.send(SchedulerEvent::Changes(vec![FileChange::modified(&leaf)]))
            .unwrap();
        h.scheduler.run(queue);

        // One rebuild for the initial build, one for the first event, one
        // for the five that arrived during it.
        assert_eq!(h.scheduler.session().rebuilds, 3);
        assert_eq!(h.scheduler.cycles(), 2);
        let updates = drain(&mut rx);
        assert_eq!(updates.len(), 2);
        assert!(updates.iter().all(|m| m.kind() == "update"));
    }
}
