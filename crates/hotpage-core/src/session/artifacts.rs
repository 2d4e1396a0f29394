//! Built artifacts and the atomically swapped "currently served" handle.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwap;
use hotpage_util::fs::atomic_write;

/// Production stylesheet extracted from every CSS import.
pub const STYLESHEET_URL: &str = "/@hotpage/styles.css";
/// Route table for the runtime router.
pub const ROUTES_URL: &str = "/routes.json";
pub const INDEX_URL: &str = "/index.html";

/// One served file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
}

impl Artifact {
    pub fn new(url: &str, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type_for(url),
        }
    }

    /// Artifact body as text, if valid UTF-8.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }
}

/// Everything one successful build produced, keyed by URL path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactSet {
    pub generation: u64,
    pub files: BTreeMap<String, Artifact>,
}

impl ArtifactSet {
    #[must_use]
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            files: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, url: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        let url = url.into();
        let artifact = Artifact::new(&url, bytes);
        self.files.insert(url, artifact);
    }

    #[must_use]
    pub fn get(&self, url: &str) -> Option<&Artifact> {
        self.files.get(url)
    }

    /// Text of the artifact at `url`.
    #[must_use]
    pub fn text(&self, url: &str) -> Option<&str> {
        self.get(url).and_then(Artifact::text)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Write every artifact below `dir`, mirroring its URL path.
    pub fn write_to(&self, dir: &Path) -> io::Result<()> {
        for (url, artifact) in &self.files {
            let rel = url.trim_start_matches('/');
            if rel.is_empty() || rel.split('/').any(|seg| seg == "..") {
                continue;
            }
            atomic_write(&dir.join(rel), &artifact.bytes)?;
        }
        Ok(())
    }
}

/// MIME type for a URL path.
///
/// Source files keep their own URL after transformation, so a `.css` or
/// `.json` import is still served as an ES module.
#[must_use]
pub fn content_type_for(url: &str) -> &'static str {
    if url == STYLESHEET_URL {
        "text/css; charset=utf-8"
    } else if url == ROUTES_URL {
        "application/json"
    } else if url.ends_with(".html") {
        "text/html; charset=utf-8"
    } else {
        "text/javascript; charset=utf-8"
    }
}

/// The artifact set request handlers serve.
///
/// Replaced wholesale on a successful build; readers never observe a
/// half-applied set.
#[derive(Debug)]
pub struct ServedArtifacts {
    current: ArcSwap<ArtifactSet>,
}

impl ServedArtifacts {
    #[must_use]
    pub fn new(initial: ArtifactSet) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
        }
    }

    /// Snapshot of the current set.
    #[must_use]
    pub fn load(&self) -> Arc<ArtifactSet> {
        self.current.load_full()
    }

    pub fn store(&self, next: Arc<ArtifactSet>) {
        self.current.store(next);
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.current.load().generation
    }
}

impl Default for ServedArtifacts {
    fn default() -> Self {
        Self::new(ArtifactSet::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for("/index.html"), "text/html; charset=utf-8");
        assert_eq!(content_type_for(STYLESHEET_URL), "text/css; charset=utf-8");
        assert_eq!(content_type_for("/styles/global.css"), "text/javascript; charset=utf-8");
        assert_eq!(content_type_for("/routes.json"), "application/json");
        assert_eq!(
            content_type_for("/components/Button.module.css"),
            "text/javascript; charset=utf-8"
        );
        assert_eq!(content_type_for("/data/site.json"), "text/javascript; charset=utf-8");
        assert_eq!(content_type_for("/pages/index.tsx"), "text/javascript; charset=utf-8");
    }

    #[test]
    fn test_swap_is_whole_set() {
        let served = ServedArtifacts::default();
        let before = served.load();
        assert_eq!(before.generation, 0);

        let mut next = ArtifactSet::new(1);
        next.insert("/index.html", "<html></html>");
        served.store(Arc::new(next));

        assert_eq!(served.generation(), 1);
        assert_eq!(served.load().text("/index.html"), Some("<html></html>"));
        // Old snapshots stay valid for in-flight readers.
        assert!(before.is_empty());
    }

    #[test]
    fn test_write_to_mirrors_urls() {
        let dir = tempdir().unwrap();
        let mut set = ArtifactSet::new(2);
        set.insert("/index.html", "<html></html>");
        set.insert("/@hotpage/entry.js", "export {};");
        set.insert("/pages/index.tsx", "export default 1;");
        set.write_to(dir.path()).unwrap();

        assert!(dir.path().join("index.html").is_file());
        assert!(dir.path().join("@hotpage/entry.js").is_file());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("pages/index.tsx")).unwrap(),
            "export default 1;"
        );
    }
}
