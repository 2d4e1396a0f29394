//! Integration tests for `hotpage build`.
//!
//! These tests verify:
//! - `--json` prints exactly one valid JSON object
//! - a production build writes the shell, modules and one stylesheet
//! - a broken source file fails the build with its location

use serial_test::serial;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

fn cargo_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO"));
    cmd.args(["run", "-q", "-p", "hotpage-cli", "--bin", "hotpage", "--"]);
    cmd
}

fn write(root: &Path, rel: &str, body: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, body).unwrap();
}

fn project(root: &Path) {
    write(
        root,
        "pages/index.tsx",
        "import styles from '../styles/Home.module.css';\nexport default function Home() { return <main className={styles.hero} />; }\n",
    );
    write(root, "styles/Home.module.css", ".hero { display: flex; }\n");
}

#[test]
#[serial]
fn test_build_json_writes_output() {
    let dir = tempdir().unwrap();
    project(dir.path());

    let output = cargo_bin()
        .args(["build", "--json", "--cwd"])
        .arg(dir.path())
        .env_remove("HOTPAGE_MODE")
        .output()
        .expect("Failed to run build command");

    let stdout = String::from_utf8_lossy(&output.stdout);
    let json: serde_json::Value =
        serde_json::from_str(&stdout).expect("Output should be valid JSON");

    assert_eq!(json["ok"], true, "{stdout}");
    assert_eq!(json["schema_version"], 1);
    assert_eq!(json["mode"], "production");
    assert_eq!(json["generation"], 1);

    let out = dir.path().join("dist");
    assert!(out.join("index.html").is_file());
    assert!(out.join("@hotpage/entry.js").is_file());
    assert!(out.join("pages/index.tsx").is_file());
    assert!(!out.join("@hotpage/client.js").exists());

    let sheet = std::fs::read_to_string(out.join("@hotpage/styles.css")).unwrap();
    assert!(sheet.contains("display"));
    assert!(!sheet.contains(".hero"), "production class names are compact");
}

#[test]
#[serial]
fn test_build_json_reports_transform_error() {
    let dir = tempdir().unwrap();
    project(dir.path());
    write(
        dir.path(),
        "pages/broken.tsx",
        "export default function Broken() { const = ; return null; }\n",
    );

    let output = cargo_bin()
        .args(["build", "--json", "--cwd"])
        .arg(dir.path())
        .env_remove("HOTPAGE_MODE")
        .output()
        .expect("Failed to run build command");

    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let json: serde_json::Value =
        serde_json::from_str(&stdout).expect("Output should be valid JSON");
    assert_eq!(json["ok"], false);
    let error = json["error"].as_str().unwrap();
    assert!(error.contains("pages/broken.tsx:1"), "{error}");
    assert!(!dir.path().join("dist/index.html").exists());
}
