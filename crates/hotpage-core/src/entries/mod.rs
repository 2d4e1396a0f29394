//! Entry set generation.
//!
//! Scans the page directory and produces the build entry points, the route
//! table consumed by the runtime router, and the generated entry module that
//! ties them together. Output is a pure function of the directory's file set:
//! two runs over the same tree produce byte-identical entry code.

pub mod route;

pub use route::{pattern_for, route_shape, Route, RouteTable, PAGE_EXTENSIONS};

use crate::error::ConfigurationError;
use hotpage_util::fs::relative_slash_path;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Module id of the generated entry module.
pub const ENTRY_MODULE_ID: &str = "/@hotpage/entry.js";

/// Bare specifier of the external runtime router.
pub const ROUTER_SPECIFIER: &str = "@hotpage/router";

/// Inputs to entry generation.
#[derive(Debug, Clone)]
pub struct EntryOptions {
    /// Absolute page directory.
    pub pages_dir: PathBuf,
    /// Page files whose stem starts with this prefix are skipped.
    pub reserved_prefix: String,
}

/// Result of scanning the page directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySet {
    pub pages_dir: PathBuf,
    /// Absolute paths of every routable page.
    pub entry_points: BTreeSet<PathBuf>,
    pub routes: RouteTable,
    /// Source of the generated entry module.
    pub entry_code: String,
}

impl EntrySet {
    /// Scan `options.pages_dir` and build the entry set.
    ///
    /// # Errors
    /// Missing or non-directory page dir, page dir outside `project_root`,
    /// malformed bracket segments, and two files producing the same pattern.
    pub fn generate(project_root: &Path, options: &EntryOptions) -> Result<Self, ConfigurationError> {
        let pages_dir = &options.pages_dir;
        if !pages_dir.exists() {
            return Err(ConfigurationError::MissingPagesDir(pages_dir.clone()));
        }
        if !pages_dir.is_dir() {
            return Err(ConfigurationError::PagesDirNotADirectory(pages_dir.clone()));
        }
        if relative_slash_path(project_root, pages_dir).is_none() {
            return Err(ConfigurationError::PagesOutsideRoot(pages_dir.clone()));
        }

        // rel-in-pages → absolute path, ordered so output never depends on
        // directory iteration order.
        let mut files: BTreeMap<String, PathBuf> = BTreeMap::new();
        for entry in WalkDir::new(pages_dir)
            .follow_links(true)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
        {
            if let Some(rel) = relative_slash_path(pages_dir, entry.path()) {
                files.insert(rel, entry.path().to_path_buf());
            }
        }

        let mut routes = Vec::new();
        let mut entry_points = BTreeSet::new();
        // route shape → first file claiming it
        let mut seen: BTreeMap<String, String> = BTreeMap::new();

        for (rel, abs) in files {
            let Some((pattern, params)) = pattern_for(&rel, &options.reserved_prefix)? else {
                continue;
            };
            let file = relative_slash_path(project_root, &abs).unwrap_or_else(|| rel.clone());

            let shape = route_shape(&pattern);
            if let Some(first) = seen.get(&shape) {
                return Err(ConfigurationError::DuplicateRoute {
                    pattern,
                    first: first.clone(),
                    second: file,
                });
            }
            seen.insert(shape, file.clone());

            routes.push(Route {
                pattern,
                module_id: format!("/{file}"),
                file,
                params,
            });
            entry_points.insert(abs);
        }

        let entry_code = render_entry_module(&routes);
        Ok(Self {
            pages_dir: pages_dir.clone(),
            entry_points,
            routes,
            entry_code,
        })
    }

    /// Route for a URL pattern, if any.
    #[must_use]
    pub fn route(&self, pattern: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.pattern == pattern)
    }

    /// Route table as pretty JSON, the form served to the runtime router.
    #[must_use]
    pub fn routes_json(&self) -> String {
        serde_json::to_string_pretty(&self.routes).unwrap_or_else(|_| "[]".to_string())
    }
}

/// Render the generated entry module.
fn render_entry_module(routes: &[Route]) -> String {
    let mut code = String::new();
    code.push_str("// Generated by hotpage. Do not edit.\n");
    let _ = writeln!(code, "import {{ startRouter }} from \"{ROUTER_SPECIFIER}\";");
    code.push('\n');
    code.push_str("export const routes = [\n");
    for route in routes {
        let params = route
            .params
            .iter()
            .map(|p| js_string(p))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(
            code,
            "  {{ path: {}, file: {}, params: [{}], load: () => import({}) }},",
            js_string(&route.pattern),
            js_string(&route.file),
            params,
            js_string(&route.module_id)
        );
    }
    code.push_str("];\n\n");
    code.push_str("startRouter(routes, document.getElementById(\"root\"));\n");
    code
}

/// Quote a string as a JavaScript literal.
pub(crate) fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}
