//! Page path → route pattern mapping.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};

/// Extensions a page file may have.
pub const PAGE_EXTENSIONS: &[&str] = &["tsx", "ts", "jsx", "js", "mjs"];

/// One routable page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    /// URL pattern, e.g. `/blog/:slug`.
    pub pattern: String,
    /// Page file relative to the project root, `/`-separated.
    pub file: String,
    /// Module id of the page, the reference the runtime router loads.
    pub module_id: String,
    /// Named captures in pattern order.
    pub params: Vec<String>,
}

/// Route table handed to the runtime router, ordered by page file path.
pub type RouteTable = Vec<Route>;

/// Map a page path (relative to the pages dir, `/`-separated) to its pattern
/// and parameter names.
///
/// Returns `Ok(None)` for files that are not routes: non-page extensions,
/// declaration files, anything under `api/`, reserved-prefix names.
pub fn pattern_for(
    rel_in_pages: &str,
    reserved_prefix: &str,
) -> Result<Option<(String, Vec<String>)>, ConfigurationError> {
    let segments: Vec<&str> = rel_in_pages.split('/').filter(|s| !s.is_empty()).collect();
    let Some((file_name, dirs)) = segments.split_last() else {
        return Ok(None);
    };

    if dirs.first() == Some(&"api") {
        return Ok(None);
    }
    let Some(stem) = page_stem(file_name) else {
        return Ok(None);
    };
    if !reserved_prefix.is_empty() && stem.starts_with(reserved_prefix) {
        return Ok(None);
    }

    let mut parts = Vec::new();
    let mut params = Vec::new();
    for dir in dirs {
        if is_group(dir) {
            continue;
        }
        parts.push(map_segment(dir, rel_in_pages, &mut params)?);
    }
    if stem != "index" {
        parts.push(map_segment(stem, rel_in_pages, &mut params)?);
    }

    Ok(Some((format!("/{}", parts.join("/")), params)))
}

/// Pattern with parameter names erased. Two routes with the same shape
/// match the same URLs.
#[must_use]
pub fn route_shape(pattern: &str) -> String {
    pattern
        .split('/')
        .map(|segment| match segment.chars().next() {
            Some(':') => ":",
            Some('*') => "*",
            _ => segment,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// File stem for a page file, or `None` if the extension is not a page one.
fn page_stem(file_name: &str) -> Option<&str> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if !PAGE_EXTENSIONS.contains(&ext) || stem.ends_with(".d") || stem.is_empty() {
        return None;
    }
    Some(stem)
}

fn is_group(segment: &str) -> bool {
    segment.len() > 2 && segment.starts_with('(') && segment.ends_with(')')
}

fn map_segment(
    segment: &str,
    file: &str,
    params: &mut Vec<String>,
) -> Result<String, ConfigurationError> {
    let invalid = || ConfigurationError::InvalidSegment {
        file: file.to_string(),
        segment: segment.to_string(),
    };

    if let Some(inner) = segment.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        let (name, catch_all) = match inner.strip_prefix("...") {
            Some(rest) => (rest, true),
            None => (inner, false),
        };
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(invalid());
        }
        params.push(name.to_string());
        return Ok(if catch_all {
            format!("*{name}")
        } else {
            format!(":{name}")
        });
    }

    if segment.contains(['[', ']']) {
        return Err(invalid());
    }
    Ok(segment.to_string())
}
