//! Integration tests for `hotpage routes --json`.

use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

fn cargo_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO"));
    cmd.args(["run", "-q", "-p", "hotpage-cli", "--bin", "hotpage", "--"]);
    cmd
}

fn touch(root: &Path, rel: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, "export default function Page() { return null; }\n").unwrap();
}

#[test]
fn test_routes_json_lists_patterns() {
    let dir = tempdir().unwrap();
    touch(dir.path(), "pages/index.tsx");
    touch(dir.path(), "pages/about.tsx");
    touch(dir.path(), "pages/blog/[slug].tsx");
    touch(dir.path(), "pages/_app.tsx");

    let output = cargo_bin()
        .args(["routes", "--json", "--cwd"])
        .arg(dir.path())
        .output()
        .expect("Failed to run routes command");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    let routes: serde_json::Value =
        serde_json::from_str(&stdout).expect("Output should be valid JSON");
    let patterns: Vec<&str> = routes
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["pattern"].as_str().unwrap())
        .collect();

    assert!(patterns.contains(&"/"));
    assert!(patterns.contains(&"/about"));
    assert!(patterns.contains(&"/blog/:slug"));
    assert_eq!(patterns.len(), 3, "reserved-prefix files are not routes");
}

#[test]
fn test_routes_missing_pages_dir_fails() {
    let dir = tempdir().unwrap();

    let output = cargo_bin()
        .args(["routes", "--cwd"])
        .arg(dir.path())
        .output()
        .expect("Failed to run routes command");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Pages directory not found"), "{stderr}");
}
