//! Bundler session.
//!
//! Owns every cache that survives between rebuilds of one dev server: the
//! per-file transform cache and the CSS module cache. Rebuilds are
//! sequential; the scheduler is the only caller.
//!
//! A build walks the import graph breadth-first from the generated entry
//! module and every page, emitting one ES module per source file under its
//! module id. Nothing is served from here: a successful result hands a new
//! [`ArtifactSet`] to the caller, who swaps it into [`ServedArtifacts`].

pub mod artifacts;
pub mod shell;

pub use artifacts::{
    content_type_for, Artifact, ArtifactSet, ServedArtifacts, INDEX_URL, ROUTES_URL, STYLESHEET_URL,
};
pub use shell::{render_index_html, ShellOptions, ROUTER_MODULE_ID, ROUTER_RUNTIME};

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use hotpage_util::fs::read_to_string_lossy;
use hotpage_util::hash::blake3_bytes;
use thiserror::Error;

use crate::config::{BuildMode, HotpageConfig};
use crate::css::{CssModuleCache, ExtractedStyles};
use crate::entries::{EntrySet, ENTRY_MODULE_ID};
use crate::error::TransformError;
use crate::graph::{DependencyMetadata, ModuleMeta};
use crate::hmr::client_runtime;
use crate::transform::{
    ModuleTransformer, Resolver, SwcTranspiler, TransformedModule, Transpile, CLIENT_MODULE_ID,
};

/// Session-wide build settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    pub mode: BuildMode,
    /// Write every successful build here before it is served.
    pub out_dir: Option<PathBuf>,
    pub hmr_port: u16,
    pub title: String,
    pub import_map: BTreeMap<String, String>,
}

impl BuildOptions {
    #[must_use]
    pub fn from_config(config: &HotpageConfig) -> Self {
        Self {
            mode: config.mode,
            out_dir: None,
            hmr_port: config.hmr_port,
            title: config.title.clone(),
            import_map: config.import_map.clone(),
        }
    }

    #[must_use]
    pub fn with_out_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.out_dir = Some(dir.into());
        self
    }
}

/// Why a rebuild produced nothing.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write build output to {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Outcome of [`BundlerSession::rebuild`].
#[derive(Debug)]
pub enum BuildResult {
    Success {
        artifacts: Arc<ArtifactSet>,
        metadata: DependencyMetadata,
    },
    Failure {
        error: BuildError,
    },
}

impl BuildResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Counters for the most recent rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub modules: usize,
    pub transformed: usize,
    pub cache_hits: usize,
    pub duration_ms: u64,
}

struct CachedModule {
    content_hash: String,
    module: Arc<TransformedModule>,
}

/// Incremental build state for one project.
pub struct BundlerSession {
    root: PathBuf,
    entries: EntrySet,
    options: BuildOptions,
    resolver: Resolver,
    transpiler: Box<dyn Transpile>,
    modules: HashMap<PathBuf, CachedModule>,
    css_cache: CssModuleCache,
    generation: u64,
    last_stats: BuildStats,
}

impl BundlerSession {
    /// Create a session. No build runs until [`rebuild`](Self::rebuild).
    pub fn start(project_root: impl Into<PathBuf>, entries: EntrySet, options: BuildOptions) -> Self {
        let root = project_root.into();
        tracing::debug!(
            root = %root.display(),
            entry_points = entries.entry_points.len(),
            mode = options.mode.as_str(),
            "bundler session started"
        );
        Self {
            resolver: Resolver::new(&root),
            css_cache: CssModuleCache::new(options.mode),
            root,
            entries,
            options,
            transpiler: Box::new(SwcTranspiler),
            modules: HashMap::new(),
            generation: 0,
            last_stats: BuildStats::default(),
        }
    }

    /// Replace the script compiler.
    #[must_use]
    pub fn with_transpiler(mut self, transpiler: Box<dyn Transpile>) -> Self {
        self.transpiler = transpiler;
        self.modules.clear();
        self
    }

    /// Switch to a new entry set after a structural change.
    ///
    /// Cached script output is dropped because resolution may differ with
    /// the new file layout; CSS module records stay valid by content hash.
    pub fn restart(&mut self, entries: EntrySet) {
        tracing::debug!(
            routes = entries.routes.len(),
            "bundler session restarted with new entry set"
        );
        self.entries = entries;
        self.modules.clear();
    }

    /// Consume the session.
    pub fn dispose(self) {
        tracing::debug!(generation = self.generation, "bundler session disposed");
    }

    #[must_use]
    pub fn entries(&self) -> &EntrySet {
        &self.entries
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Generation of the last successful build; 0 before the first.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn last_stats(&self) -> BuildStats {
        self.last_stats
    }

    /// Build the current entry set.
    ///
    /// A failure leaves the generation and every previously returned
    /// artifact set untouched.
    pub fn rebuild(&mut self) -> BuildResult {
        let started = Instant::now();
        match self.build(started) {
            Ok((artifacts, metadata)) => {
                tracing::info!(
                    generation = artifacts.generation,
                    modules = self.last_stats.modules,
                    transformed = self.last_stats.transformed,
                    cache_hits = self.last_stats.cache_hits,
                    duration_ms = self.last_stats.duration_ms,
                    "build complete"
                );
                BuildResult::Success {
                    artifacts,
                    metadata,
                }
            }
            Err(error) => {
                tracing::warn!(error = %error, "build failed");
                BuildResult::Failure { error }
            }
        }
    }

    fn build(
        &mut self,
        started: Instant,
    ) -> Result<(Arc<ArtifactSet>, DependencyMetadata), BuildError> {
        let transformer =
            ModuleTransformer::new(&self.resolver, self.options.mode, self.transpiler.as_ref());
        let mut stats = BuildStats::default();

        let mut queue: VecDeque<PathBuf> = self.entries.entry_points.iter().cloned().collect();
        let mut seen: HashSet<PathBuf> = queue.iter().cloned().collect();
        let mut built: Vec<(PathBuf, Arc<TransformedModule>)> = Vec::new();

        while let Some(path) = queue.pop_front() {
            let source = read_to_string_lossy(&path).map_err(|source| BuildError::Read {
                path: path.clone(),
                source,
            })?;
            let content_hash = blake3_bytes(source.as_bytes());

            let cached = self
                .modules
                .get(&path)
                .filter(|cached| cached.content_hash == content_hash)
                // A deleted dependency must surface as a resolve error.
                .filter(|cached| cached.module.imports.iter().all(|dep| dep.is_file()))
                .map(|cached| Arc::clone(&cached.module));
            let module = if let Some(module) = cached {
                stats.cache_hits += 1;
                module
            } else {
                let module = Arc::new(transformer.transform(&path, &source, &mut self.css_cache)?);
                stats.transformed += 1;
                self.modules.insert(
                    path.clone(),
                    CachedModule {
                        content_hash,
                        module: Arc::clone(&module),
                    },
                );
                module
            };

            for dep in &module.imports {
                if seen.insert(dep.clone()) {
                    queue.push_back(dep.clone());
                }
            }
            built.push((path, module));
        }

        let generation = self.generation + 1;
        let production = self.options.mode.is_production();
        let mut set = ArtifactSet::new(generation);
        let mut styles = ExtractedStyles::new();
        let mut metadata = DependencyMetadata {
            modules: BTreeMap::new(),
            root_module: ENTRY_MODULE_ID.to_string(),
        };

        for (path, module) in &built {
            set.insert(module.module_id.clone(), module.code.as_bytes());
            if let Some(css) = &module.extracted_css {
                styles.push(&module.module_id, css);
            }
            let imports = module
                .imports
                .iter()
                .filter_map(|dep| self.resolver.module_id(dep))
                .collect();
            metadata.modules.insert(
                module.module_id.clone(),
                ModuleMeta {
                    file: Some(path.clone()),
                    imports,
                    self_accepting: module.self_accepting,
                },
            );
        }

        metadata.modules.insert(
            ENTRY_MODULE_ID.to_string(),
            ModuleMeta {
                file: None,
                imports: self.entries.routes.iter().map(|r| r.module_id.clone()).collect(),
                self_accepting: false,
            },
        );
        set.insert(ENTRY_MODULE_ID, self.entries.entry_code.as_bytes());
        set.insert(ROUTES_URL, self.entries.routes_json());
        set.insert(ROUTER_MODULE_ID, ROUTER_RUNTIME);
        if production {
            if !styles.is_empty() {
                set.insert(STYLESHEET_URL, styles.finish());
            }
        } else {
            set.insert(CLIENT_MODULE_ID, client_runtime(self.options.hmr_port));
        }
        set.insert(
            INDEX_URL,
            render_index_html(&ShellOptions {
                title: &self.options.title,
                import_map: &self.options.import_map,
                generation,
                live_client: !production,
                stylesheet: production && !styles.is_empty(),
            }),
        );

        if let Some(dir) = &self.options.out_dir {
            set.write_to(dir).map_err(|source| BuildError::Write {
                path: dir.clone(),
                source,
            })?;
        }

        self.modules.retain(|path, _| seen.contains(path));
        self.css_cache.retain_paths(|path| seen.contains(path));

        stats.modules = built.len();
        stats.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.last_stats = stats;
        self.generation = generation;
        Ok((Arc::new(set), metadata))
    }
}
