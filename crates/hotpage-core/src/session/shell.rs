//! HTML shell and built-in runtime router.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::entries::ENTRY_MODULE_ID;
use crate::transform::CLIENT_MODULE_ID;

use super::artifacts::STYLESHEET_URL;

/// Module id of the built-in router.
pub const ROUTER_MODULE_ID: &str = "/@hotpage/router.js";

/// Inputs for [`render_index_html`].
#[derive(Debug, Clone)]
pub struct ShellOptions<'a> {
    pub title: &'a str,
    pub import_map: &'a BTreeMap<String, String>,
    pub generation: u64,
    /// Load the live update client.
    pub live_client: bool,
    /// Link the extracted stylesheet.
    pub stylesheet: bool,
}

/// The single HTML document every route is served from.
#[must_use]
pub fn render_index_html(options: &ShellOptions<'_>) -> String {
    let import_map = serde_json::json!({ "imports": options.import_map });
    let import_map = serde_json::to_string_pretty(&import_map)
        .unwrap_or_else(|_| "{}".to_string())
        .replace("</", "<\\/");

    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n");
    let _ = writeln!(
        html,
        "<html lang=\"en\" data-hotpage-generation=\"{}\">",
        options.generation
    );
    html.push_str("<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    let _ = writeln!(html, "<title>{}</title>", escape_html(options.title));
    let _ = writeln!(html, "<script type=\"importmap\">\n{import_map}\n</script>");
    if options.stylesheet {
        let _ = writeln!(html, "<link rel=\"stylesheet\" href=\"{STYLESHEET_URL}\">");
    }
    if options.live_client {
        let _ = writeln!(
            html,
            "<script type=\"module\" src=\"{CLIENT_MODULE_ID}\"></script>"
        );
    }
    html.push_str("</head>\n<body>\n<div id=\"root\"></div>\n");
    let _ = writeln!(
        html,
        "<script type=\"module\" src=\"{ENTRY_MODULE_ID}\"></script>"
    );
    html.push_str("</body>\n</html>\n");
    html
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Minimal router: matches `location.pathname` against the route table,
/// lazy-loads the page and renders its default export.
pub const ROUTER_RUNTIME: &str = r#"// hotpage runtime router
import { createElement } from "react";
import { createRoot } from "react-dom/client";

function match(pattern, pathname) {
  const want = pattern.split("/").filter(Boolean);
  const have = pathname.split("/").filter(Boolean);
  const params = {};
  for (let i = 0; i < want.length; i++) {
    const seg = want[i];
    if (seg.startsWith("*")) {
      params[seg.slice(1)] = have.slice(i).map(decodeURIComponent);
      return params;
    }
    if (i >= have.length) return null;
    if (seg.startsWith(":")) {
      params[seg.slice(1)] = decodeURIComponent(have[i]);
    } else if (seg !== have[i]) {
      return null;
    }
  }
  return want.length === have.length ? params : null;
}

export function startRouter(routes, container) {
  const ordered = [...routes].sort((a, b) => a.params.length - b.params.length);
  const root = createRoot(container);

  async function render() {
    for (const route of ordered) {
      const params = match(route.path, location.pathname);
      if (params) {
        const mod = await route.load();
        root.render(createElement(mod.default, { params }));
        return;
      }
    }
    root.render(createElement("h1", null, "404: page not found"));
  }

  document.addEventListener("click", (event) => {
    const link = event.target.closest && event.target.closest("a[href^='/']");
    if (!link || link.target === "_blank" || event.metaKey || event.ctrlKey || event.shiftKey) {
      return;
    }
    event.preventDefault();
    history.pushState(null, "", link.getAttribute("href"));
    render();
  });
  addEventListener("popstate", render);
  render();
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn map() -> BTreeMap<String, String> {
        BTreeMap::from([("react".to_string(), "https://esm.sh/react@18".to_string())])
    }

    #[test]
    fn test_dev_shell() {
        let import_map = map();
        let html = render_index_html(&ShellOptions {
            title: "Demo <app>",
            import_map: &import_map,
            generation: 7,
            live_client: true,
            stylesheet: false,
        });
        assert!(html.contains("data-hotpage-generation=\"7\""));
        assert!(html.contains("<title>Demo &lt;app&gt;</title>"));
        assert!(html.contains("\"react\": \"https://esm.sh/react@18\""));
        assert!(html.contains("src=\"/@hotpage/client.js\""));
        assert!(html.contains("src=\"/@hotpage/entry.js\""));
        assert!(html.contains("<div id=\"root\"></div>"));
        assert!(!html.contains("stylesheet"));
    }

    #[test]
    fn test_production_shell() {
        let import_map = map();
        let html = render_index_html(&ShellOptions {
            title: "Demo",
            import_map: &import_map,
            generation: 1,
            live_client: false,
            stylesheet: true,
        });
        assert!(html.contains("<link rel=\"stylesheet\" href=\"/@hotpage/styles.css\">"));
        assert!(!html.contains("client.js"));
    }

    #[test]
    fn test_router_exports_start() {
        assert!(ROUTER_RUNTIME.contains("export function startRouter(routes, container)"));
    }
}
