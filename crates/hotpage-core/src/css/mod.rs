//! CSS processing.
//!
//! Provides:
//! - CSS Modules scoping with deterministic class names
//! - Validation, autoprefixing and (production) minification via lightningcss
//! - Style injection modules for development, one extracted stylesheet for production
//! - A per-session cache keyed by path and content hash

pub mod emit;
pub mod scope;

pub use emit::{dev_style_module, production_class_module, ExtractedStyles};
pub use scope::{scope_classes, ScopeError};

use crate::config::BuildMode;
use crate::error::TransformError;
use hotpage_util::hash::{blake3_bytes, blake3_parts};
use lightningcss::printer::PrinterOptions;
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Hex characters of the hash used in scoped class names.
const SCOPE_HASH_LEN: usize = 8;

/// How scoped class names are spelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeStrategy {
    /// `name_hash8`, for development.
    Readable,
    /// `_hash8`, for production.
    Compact,
}

impl From<BuildMode> for ScopeStrategy {
    fn from(mode: BuildMode) -> Self {
        match mode {
            BuildMode::Development => Self::Readable,
            BuildMode::Production => Self::Compact,
        }
    }
}

/// Scoped name for `class` declared in the file identified by `file_id`.
///
/// A pure function of its inputs: no counters, no dependence on other files
/// or build order.
#[must_use]
pub fn scoped_name(file_id: &str, class: &str, strategy: ScopeStrategy) -> String {
    let mut hash = blake3_parts(&[file_id, class]);
    hash.truncate(SCOPE_HASH_LEN);
    match strategy {
        ScopeStrategy::Readable => format!("{class}_{hash}"),
        ScopeStrategy::Compact => format!("_{hash}"),
    }
}

/// A transformed `.module.css` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssModuleRecord {
    pub source_path: PathBuf,
    /// Project-relative, `/`-separated path used as the scoping identifier.
    pub file_id: String,
    /// BLAKE3 of the source text.
    pub content_hash: String,
    /// Original class name → scoped class name.
    pub class_map: BTreeMap<String, String>,
    /// Rewritten, validated stylesheet.
    pub css: String,
}

/// Scope a CSS module.
///
/// # Errors
/// Malformed blocks, unterminated strings or comments, and anything
/// lightningcss refuses to parse.
pub fn transform_css_module(
    source: &str,
    source_path: &Path,
    file_id: &str,
    mode: BuildMode,
) -> Result<CssModuleRecord, TransformError> {
    let strategy = ScopeStrategy::from(mode);
    let (scoped, class_map) = scope_classes(source, |class| scoped_name(file_id, class, strategy))
        .map_err(|e| TransformError::new(file_id, e.message).at_line(e.line))?;
    let css = finish_css(&scoped, file_id, mode.is_production())?;

    Ok(CssModuleRecord {
        source_path: source_path.to_path_buf(),
        file_id: file_id.to_string(),
        content_hash: blake3_bytes(source.as_bytes()),
        class_map,
        css,
    })
}

/// Validate and print a plain (unscoped) stylesheet.
pub fn process_plain_css(source: &str, file_id: &str, mode: BuildMode) -> Result<String, TransformError> {
    finish_css(source, file_id, mode.is_production())
}

/// Parse with lightningcss, apply vendor prefixes, print (minified in production).
fn finish_css(source: &str, file_id: &str, minify: bool) -> Result<String, TransformError> {
    let parser_options = ParserOptions {
        filename: file_id.to_string(),
        ..ParserOptions::default()
    };

    let mut stylesheet = StyleSheet::parse(source, parser_options).map_err(|e| {
        let err = TransformError::new(file_id, format!("CSS parse error: {}", e.kind));
        match e.loc {
            Some(loc) => err.at_line(loc.line + 1),
            None => err,
        }
    })?;

    let browsers = default_browser_targets();
    stylesheet
        .minify(MinifyOptions {
            targets: Targets::from(browsers),
            ..Default::default()
        })
        .map_err(|e| TransformError::new(file_id, format!("CSS minify error: {e}")))?;

    let output = stylesheet
        .to_css(PrinterOptions {
            minify,
            targets: Targets::from(browsers),
            ..Default::default()
        })
        .map_err(|e| TransformError::new(file_id, format!("CSS print error: {e}")))?;

    Ok(output.code)
}

/// Chrome 80+, Firefox 75+, Safari 13+, Edge 80+.
fn default_browser_targets() -> Browsers {
    Browsers {
        chrome: Some(80 << 16),
        firefox: Some(75 << 16),
        safari: Some(13 << 16),
        edge: Some(80 << 16),
        ..Default::default()
    }
}

/// CSS module records keyed by path, valid for one content hash.
///
/// Owned by a bundler session; never shared between sessions.
#[derive(Debug)]
pub struct CssModuleCache {
    mode: BuildMode,
    entries: HashMap<PathBuf, Arc<CssModuleRecord>>,
    hits: u64,
}

impl CssModuleCache {
    #[must_use]
    pub fn new(mode: BuildMode) -> Self {
        Self {
            mode,
            entries: HashMap::new(),
            hits: 0,
        }
    }

    /// Cached record for `(path, source)`, transforming on miss.
    ///
    /// A record for the same path but different content is replaced.
    pub fn get_or_transform(
        &mut self,
        path: &Path,
        file_id: &str,
        source: &str,
    ) -> Result<Arc<CssModuleRecord>, TransformError> {
        let content_hash = blake3_bytes(source.as_bytes());
        if let Some(record) = self.entries.get(path) {
            if record.content_hash == content_hash && record.file_id == file_id {
                self.hits += 1;
                return Ok(Arc::clone(record));
            }
        }

        let record = Arc::new(transform_css_module(source, path, file_id, self.mode)?);
        self.entries.insert(path.to_path_buf(), Arc::clone(&record));
        Ok(record)
    }

    /// Drop records for files that left the build.
    pub fn retain_paths(&mut self, keep: impl Fn(&Path) -> bool) {
        self.entries.retain(|path, _| keep(path));
    }

    /// Number of lookups served without transforming.
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUTTON: &str = ".button { color: red; }\n.button:hover .icon { color: blue; }\n";

    #[test]
    fn test_scoped_name_strategies() {
        let readable = scoped_name("components/Button.module.css", "button", ScopeStrategy::Readable);
        let compact = scoped_name("components/Button.module.css", "button", ScopeStrategy::Compact);
        assert!(readable.starts_with("button_"));
        assert_eq!(readable.len(), "button_".len() + 8);
        assert!(compact.starts_with('_'));
        assert_eq!(compact.len(), 9);
        assert_eq!(&readable["button_".len()..], &compact[1..]);
    }

    #[test]
    fn test_scoped_name_depends_on_file_and_class() {
        let a = scoped_name("a.module.css", "x", ScopeStrategy::Readable);
        let b = scoped_name("b.module.css", "x", ScopeStrategy::Readable);
        let c = scoped_name("a.module.css", "y", ScopeStrategy::Readable);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, scoped_name("a.module.css", "x", ScopeStrategy::Readable));
    }

    #[test]
    fn test_transform_is_deterministic() {
        let path = Path::new("/p/components/Button.module.css");
        let first = transform_css_module(BUTTON, path, "components/Button.module.css", BuildMode::Development).unwrap();
        let second = transform_css_module(BUTTON, path, "components/Button.module.css", BuildMode::Development).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.class_map.len(), 2);
        assert!(first.css.contains(&first.class_map["button"]));
    }

    #[test]
    fn test_transform_independent_of_absolute_location() {
        let a = transform_css_module(BUTTON, Path::new("/one/x.module.css"), "x.module.css", BuildMode::Production).unwrap();
        let b = transform_css_module(BUTTON, Path::new("/two/x.module.css"), "x.module.css", BuildMode::Production).unwrap();
        assert_eq!(a.class_map, b.class_map);
        assert_eq!(a.css, b.css);
    }

    #[test]
    fn test_production_minifies() {
        let record = transform_css_module(BUTTON, Path::new("x.module.css"), "x.module.css", BuildMode::Production).unwrap();
        assert!(!record.css.contains('\n'));
        assert!(record.class_map["button"].starts_with('_'));
    }

    #[test]
    fn test_malformed_css_is_transform_error() {
        let err = transform_css_module(".a { color: red;\n", Path::new("a.module.css"), "a.module.css", BuildMode::Development)
            .unwrap_err();
        assert_eq!(err.file, "a.module.css");
        assert_eq!(err.line, Some(1));
    }

    #[test]
    fn test_cache_hits_and_invalidation() {
        let mut cache = CssModuleCache::new(BuildMode::Development);
        let path = Path::new("/p/a.module.css");

        let first = cache.get_or_transform(path, "a.module.css", BUTTON).unwrap();
        let again = cache.get_or_transform(path, "a.module.css", BUTTON).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(cache.hits(), 1);

        let changed = cache
            .get_or_transform(path, "a.module.css", ".button { color: green; }")
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &changed));
        assert_ne!(first.content_hash, changed.content_hash);
        // Same file and class name, same scoped name.
        assert_eq!(first.class_map["button"], changed.class_map["button"]);
        assert_eq!(cache.len(), 1);
    }
}
