//! JavaScript wrappers and the extracted stylesheet.

use crate::entries::js_string;
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Length of the content-hash tag put on injected `<style>` elements.
const STYLE_TAG_HASH_LEN: usize = 16;

/// Development wrapper: injects the stylesheet once per content hash.
///
/// Re-evaluating the module (a hot update re-runs its body) finds the tagged
/// element and skips injection. A new hash for the same source replaces the
/// stale element. `class_map` is `None` for plain CSS.
#[must_use]
pub fn dev_style_module(
    css: &str,
    content_hash: &str,
    file_id: &str,
    class_map: Option<&BTreeMap<String, String>>,
) -> String {
    let tag = &content_hash[..content_hash.len().min(STYLE_TAG_HASH_LEN)];
    let mut code = String::new();
    let _ = writeln!(code, "const css = {};", js_string(css));
    let _ = writeln!(code, "const source = {};", js_string(file_id));
    let _ = writeln!(code, "const hash = {};", js_string(tag));
    code.push_str(
        r#"if (!document.querySelector(`style[data-hotpage-css="${hash}"]`)) {
  for (const stale of document.querySelectorAll(`style[data-hotpage-source="${source}"]`)) {
    stale.remove();
  }
  const style = document.createElement("style");
  style.setAttribute("data-hotpage-css", hash);
  style.setAttribute("data-hotpage-source", source);
  style.textContent = css;
  document.head.appendChild(style);
}
if (import.meta.hot) {
  import.meta.hot.accept();
}
"#,
    );
    if let Some(map) = class_map {
        code.push_str(&class_map_export(map));
    }
    code
}

/// Production wrapper: styles live in the extracted sheet, only names remain.
#[must_use]
pub fn production_class_module(class_map: &BTreeMap<String, String>) -> String {
    class_map_export(class_map)
}

fn class_map_export(map: &BTreeMap<String, String>) -> String {
    let mut code = String::from("const classes = {\n");
    for (original, scoped) in map {
        let _ = writeln!(code, "  {}: {},", js_string(original), js_string(scoped));
    }
    code.push_str("};\nexport default classes;\n");
    code
}

/// Stylesheet collected across one production build.
///
/// Parts are kept in file-processing order and written once at the end.
#[derive(Debug, Default, Clone)]
pub struct ExtractedStyles {
    parts: Vec<(String, String)>,
}

impl ExtractedStyles {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a file's CSS. A file already present is not added twice.
    pub fn push(&mut self, file_id: &str, css: &str) {
        if self.parts.iter().any(|(id, _)| id == file_id) {
            return;
        }
        self.parts.push((file_id.to_string(), css.to_string()));
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Source files in the order they were added.
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|(id, _)| id.as_str())
    }

    /// The single stylesheet for this build.
    #[must_use]
    pub fn finish(&self) -> String {
        let mut out = String::new();
        for (_, css) in &self.parts {
            out.push_str(css.trim_end());
            out.push('\n');
        }
        out
    }
}
