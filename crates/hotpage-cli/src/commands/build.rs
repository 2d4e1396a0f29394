//! `hotpage build` command implementation.

use hotpage_core::session::BuildStats;
use hotpage_core::{BuildMode, BuildOptions, BuildResult, BundlerSession, EntrySet};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::path::PathBuf;

/// JSON output schema version.
const BUILD_SCHEMA_VERSION: u32 = 1;

/// Build command action.
#[derive(Debug, Clone)]
pub struct BuildAction {
    pub cwd: PathBuf,
    pub config: Option<PathBuf>,
    /// Defaults to production.
    pub mode: Option<BuildMode>,
    pub out_dir: Option<PathBuf>,
    pub json: bool,
}

#[derive(Serialize)]
struct BuildResultJson {
    schema_version: u32,
    ok: bool,
    mode: &'static str,
    out_dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    files: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    modules: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Run one build and write the output directory.
pub fn run(action: &BuildAction) -> Result<()> {
    let mode = action.mode.unwrap_or(BuildMode::Production);
    let project = super::load_project(&action.cwd, action.config.as_deref(), Some(mode))?;
    let out_dir = match &action.out_dir {
        Some(dir) if dir.is_absolute() => dir.clone(),
        Some(dir) => project.root.join(dir),
        None => project.config.out_path(&project.root),
    };

    let entries =
        EntrySet::generate(&project.root, &project.config.entry_options(&project.root))
            .into_diagnostic()?;
    let options = BuildOptions::from_config(&project.config).with_out_dir(&out_dir);
    let mut session = BundlerSession::start(&project.root, entries, options);

    let result = session.rebuild();
    let stats: BuildStats = session.last_stats();
    session.dispose();

    let mut report = BuildResultJson {
        schema_version: BUILD_SCHEMA_VERSION,
        ok: result.is_success(),
        mode: mode.as_str(),
        out_dir: out_dir.display().to_string(),
        generation: None,
        files: None,
        modules: None,
        duration_ms: None,
        error: None,
    };

    match result {
        BuildResult::Success { artifacts, .. } => {
            report.generation = Some(artifacts.generation);
            report.files = Some(artifacts.len());
            report.modules = Some(stats.modules);
            report.duration_ms = Some(stats.duration_ms);
            if action.json {
                println!("{}", serde_json::to_string(&report).into_diagnostic()?);
            } else {
                println!(
                    "Built {} modules into {} ({} files, {}ms)",
                    stats.modules,
                    out_dir.display(),
                    artifacts.len(),
                    stats.duration_ms
                );
            }
            Ok(())
        }
        BuildResult::Failure { error } => {
            if action.json {
                report.error = Some(error.to_string());
                println!("{}", serde_json::to_string(&report).into_diagnostic()?);
                std::process::exit(1);
            }
            Err(miette::miette!("build failed: {error}"))
        }
    }
}
