//! `hotpage routes` command implementation.

use hotpage_core::EntrySet;
use miette::{IntoDiagnostic, Result};
use std::path::Path;

/// Print the route table.
pub fn run(cwd: &Path, config: Option<&Path>, json: bool) -> Result<()> {
    let project = super::load_project(cwd, config, None)?;
    let options = project.config.entry_options(&project.root);
    let entries = EntrySet::generate(&project.root, &options).into_diagnostic()?;

    if json {
        println!("{}", entries.routes_json());
        return Ok(());
    }

    if entries.routes.is_empty() {
        println!("No routes in {}", options.pages_dir.display());
        return Ok(());
    }
    let width = entries
        .routes
        .iter()
        .map(|r| r.pattern.len())
        .max()
        .unwrap_or(0);
    for route in &entries.routes {
        println!("  {:width$}  {}", route.pattern, route.file);
    }
    Ok(())
}
