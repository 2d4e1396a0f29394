//! Project configuration.
//!
//! Loaded from an optional `hotpage.json` in the project root:
//!
//! ```json
//! {
//!   "pagesDir": "pages",
//!   "outDir": "dist",
//!   "httpPort": 3000,
//!   "hmrPort": 3001,
//!   "mode": "development",
//!   "importMap": { "react": "https://esm.sh/react@18" }
//! }
//! ```
//!
//! Every field is optional; CLI flags and environment override the file.

use crate::entries::EntryOptions;
use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Config file name looked up in the project root.
pub const CONFIG_FILE: &str = "hotpage.json";

/// Build mode. Selects the CSS scoping strategy and whether styles are
/// injected at runtime or extracted into one stylesheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    #[default]
    Development,
    Production,
}

impl BuildMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }

    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!(
                "unknown mode '{other}' (expected 'development' or 'production')"
            )),
        }
    }
}

/// Configuration for a hotpage project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HotpageConfig {
    /// Page directory, relative to the project root.
    pub pages_dir: PathBuf,
    /// Output directory for written artifacts, relative to the project root.
    pub out_dir: PathBuf,
    /// Host to bind both listeners to.
    pub host: String,
    /// Port serving the built artifacts.
    pub http_port: u16,
    /// Port serving the live update channel.
    pub hmr_port: u16,
    pub mode: BuildMode,
    /// Page files whose name starts with this prefix are not routes.
    pub reserved_prefix: String,
    /// Quiet period after the first change before a rebuild starts.
    pub debounce_ms: u64,
    /// Bare import specifier → URL, emitted as the page's import map.
    pub import_map: BTreeMap<String, String>,
    /// Document title of the generated HTML shell.
    pub title: String,
}

impl Default for HotpageConfig {
    fn default() -> Self {
        Self {
            pages_dir: PathBuf::from("pages"),
            out_dir: PathBuf::from("dist"),
            host: "localhost".to_string(),
            http_port: 3000,
            hmr_port: 3001,
            mode: BuildMode::default(),
            reserved_prefix: "_".to_string(),
            debounce_ms: 50,
            import_map: default_import_map(),
            title: "hotpage".to_string(),
        }
    }
}

fn default_import_map() -> BTreeMap<String, String> {
    [
        ("react", "https://esm.sh/react@18"),
        ("react/jsx-runtime", "https://esm.sh/react@18/jsx-runtime"),
        ("react-dom/client", "https://esm.sh/react-dom@18/client"),
        ("@hotpage/router", "/@hotpage/router.js"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl HotpageConfig {
    /// Load configuration for `root`.
    ///
    /// `explicit` overrides discovery and must exist. Without it, a missing
    /// `hotpage.json` yields the defaults.
    pub fn load(root: &Path, explicit: Option<&Path>) -> Result<Self, Error> {
        let path = match explicit {
            Some(p) if p.is_absolute() => p.to_path_buf(),
            Some(p) => root.join(p),
            None => {
                let candidate = root.join(CONFIG_FILE);
                if !candidate.exists() {
                    return Ok(Self::default());
                }
                candidate
            }
        };

        let source = std::fs::read_to_string(&path).map_err(|source| Error::ConfigRead {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&source).map_err(|source| Error::ConfigParse { path, source })
    }

    #[must_use]
    pub fn with_mode(mut self, mode: BuildMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_http_port(mut self, port: u16) -> Self {
        self.http_port = port;
        self
    }

    #[must_use]
    pub fn with_hmr_port(mut self, port: u16) -> Self {
        self.hmr_port = port;
        self
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Absolute page directory for a project root.
    #[must_use]
    pub fn pages_path(&self, root: &Path) -> PathBuf {
        root.join(&self.pages_dir)
    }

    /// Absolute output directory for a project root.
    #[must_use]
    pub fn out_path(&self, root: &Path) -> PathBuf {
        root.join(&self.out_dir)
    }

    #[must_use]
    pub fn entry_options(&self, root: &Path) -> EntryOptions {
        EntryOptions {
            pages_dir: self.pages_path(root),
            reserved_prefix: self.reserved_prefix.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = HotpageConfig::load(dir.path(), None).unwrap();
        assert_eq!(config, HotpageConfig::default());
        assert_eq!(config.http_port, 3000);
        assert_eq!(config.hmr_port, 3001);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{ "pagesDir": "src/pages", "mode": "production", "hmrPort": 4001 }"#,
        )
        .unwrap();

        let config = HotpageConfig::load(dir.path(), None).unwrap();
        assert_eq!(config.pages_dir, PathBuf::from("src/pages"));
        assert_eq!(config.mode, BuildMode::Production);
        assert_eq!(config.hmr_port, 4001);
        assert_eq!(config.http_port, 3000);
        assert!(config.import_map.contains_key("react"));
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{ nope").unwrap();
        let err = HotpageConfig::load(dir.path(), None).unwrap_err();
        assert!(matches!(err, Error::ConfigParse { .. }));
    }

    #[test]
    fn test_explicit_missing_file_is_read_error() {
        let dir = tempdir().unwrap();
        let err = HotpageConfig::load(dir.path(), Some(Path::new("custom.json"))).unwrap_err();
        assert!(matches!(err, Error::ConfigRead { .. }));
    }

    #[test]
    fn test_build_mode_parse() {
        assert_eq!("production".parse::<BuildMode>(), Ok(BuildMode::Production));
        assert_eq!("DEV".parse::<BuildMode>(), Ok(BuildMode::Development));
        assert!("staging".parse::<BuildMode>().is_err());
    }
}
