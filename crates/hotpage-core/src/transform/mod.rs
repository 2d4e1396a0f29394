//! Per-file loaders: scripts, CSS modules, plain CSS, JSON.
//!
//! Every loader turns one source file into a browser-ready ES module keyed
//! by its module id (`/` + project-relative path) and reports the local
//! modules it imports.

pub mod resolve;
pub mod swc;

pub use resolve::{module_id_for, Resolution, Resolver};
pub use swc::SwcTranspiler;

use std::path::{Path, PathBuf};

use hotpage_util::hash::blake3_bytes;

use crate::config::BuildMode;
use crate::css::{dev_style_module, process_plain_css, production_class_module, CssModuleCache};
use crate::entries::js_string;
use crate::error::TransformError;

/// Module id of the live-update client runtime.
pub const CLIENT_MODULE_ID: &str = "/@hotpage/client.js";

/// What loader a file goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleKind {
    Script,
    CssModule,
    Css,
    Json,
}

impl ModuleKind {
    /// Loader for `path`, or `None` when the file cannot be imported.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        if name.ends_with(".module.css") {
            return Some(Self::CssModule);
        }
        match path.extension()?.to_str()? {
            "js" | "jsx" | "ts" | "tsx" | "mjs" => Some(Self::Script),
            "css" => Some(Self::Css),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// CSS modules and plain CSS always accept their own updates.
    #[must_use]
    pub fn always_self_accepting(self) -> bool {
        matches!(self, Self::CssModule | Self::Css)
    }
}

/// How a specifier was referenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    /// `import x from "..."`
    Static,
    /// `import "..."`
    SideEffect,
    /// `export ... from "..."`
    ReExport,
    /// `import("...")`
    Dynamic,
}

/// One import specifier found in a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRef {
    pub specifier: String,
    pub kind: ImportKind,
    /// 1-based line of the specifier.
    pub line: u32,
}

impl ImportRef {
    /// Relative or root-absolute: resolved against the project on disk.
    /// Everything else is left for the browser's import map.
    #[must_use]
    pub fn is_local(&self) -> bool {
        let spec = self.specifier.as_str();
        spec.starts_with("./")
            || spec.starts_with("../")
            || spec == "."
            || spec == ".."
            || (spec.starts_with('/') && !spec.starts_with("//"))
    }
}

pub struct ScriptInput<'a> {
    pub source: &'a str,
    pub path: &'a Path,
    pub module_id: &'a str,
    pub minify: bool,
}

#[derive(Debug)]
pub struct ScriptOutput {
    pub code: String,
    /// The module calls `import.meta.hot.accept()` for itself.
    pub self_accepting: bool,
}

/// Compiles one script to a browser-ready ES module.
///
/// `resolve` is called once per import after types are stripped; a
/// returned specifier replaces the original, `None` keeps it.
pub trait Transpile: Send + Sync {
    fn name(&self) -> &'static str;

    fn transpile(
        &self,
        input: &ScriptInput<'_>,
        resolve: &mut dyn FnMut(&ImportRef) -> Result<Option<String>, TransformError>,
    ) -> Result<ScriptOutput, TransformError>;
}

/// One file after its loader ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformedModule {
    pub module_id: String,
    pub kind: ModuleKind,
    pub code: String,
    /// Resolved local imports, deduplicated, in first-seen order.
    pub imports: Vec<PathBuf>,
    pub self_accepting: bool,
    /// BLAKE3 of the source text.
    pub content_hash: String,
    /// Stylesheet destined for the extracted sheet (production only).
    pub extracted_css: Option<String>,
}

/// Runs the loader for a file. Borrowed per build by the session.
pub struct ModuleTransformer<'a> {
    resolver: &'a Resolver,
    mode: BuildMode,
    transpiler: &'a dyn Transpile,
}

impl<'a> ModuleTransformer<'a> {
    pub fn new(resolver: &'a Resolver, mode: BuildMode, transpiler: &'a dyn Transpile) -> Self {
        Self {
            resolver,
            mode,
            transpiler,
        }
    }

    /// Transform `path` whose contents are `source`.
    pub fn transform(
        &self,
        path: &Path,
        source: &str,
        css_cache: &mut CssModuleCache,
    ) -> Result<TransformedModule, TransformError> {
        let module_id = self.resolver.module_id(path).ok_or_else(|| {
            TransformError::new(path.display().to_string(), "file is outside the project root")
        })?;
        let kind = ModuleKind::from_path(path)
            .ok_or_else(|| TransformError::new(&module_id, "unsupported module type"))?;
        let file_id = module_id.trim_start_matches('/');
        let content_hash = blake3_bytes(source.as_bytes());

        let mut module = TransformedModule {
            module_id: module_id.clone(),
            kind,
            code: String::new(),
            imports: Vec::new(),
            self_accepting: kind.always_self_accepting(),
            content_hash,
            extracted_css: None,
        };

        match kind {
            ModuleKind::Script => {
                let (output, imports) = self.load_script(path, &module_id, source)?;
                module.self_accepting = output.self_accepting;
                module.code = output.code;
                module.imports = imports;
            }
            ModuleKind::CssModule => {
                let record = css_cache.get_or_transform(path, file_id, source)?;
                if self.mode.is_production() {
                    module.code = production_class_module(&record.class_map);
                    module.extracted_css = Some(record.css.clone());
                } else {
                    module.code = dev_style_module(
                        &record.css,
                        &record.content_hash,
                        file_id,
                        Some(&record.class_map),
                    );
                }
            }
            ModuleKind::Css => {
                let css = process_plain_css(source, file_id, self.mode)?;
                if self.mode.is_production() {
                    module.code = "export {};\n".to_string();
                    module.extracted_css = Some(css);
                } else {
                    module.code = dev_style_module(&css, &module.content_hash, file_id, None);
                }
            }
            ModuleKind::Json => {
                let value: serde_json::Value = serde_json::from_str(source).map_err(|e| {
                    TransformError::new(&module_id, format!("invalid JSON: {e}"))
                        .at_line(u32::try_from(e.line()).unwrap_or(u32::MAX))
                })?;
                module.code = format!("export default {value};\n");
            }
        }

        if !self.mode.is_production() && kind != ModuleKind::Json {
            module.code = format!("{}{}", hot_preamble(&module_id), module.code);
        }
        Ok(module)
    }

    fn load_script(
        &self,
        path: &Path,
        module_id: &str,
        source: &str,
    ) -> Result<(ScriptOutput, Vec<PathBuf>), TransformError> {
        let input = ScriptInput {
            source,
            path,
            module_id,
            minify: self.mode.is_production(),
        };
        let mut imports: Vec<PathBuf> = Vec::new();
        let output = self.transpiler.transpile(&input, &mut |import| {
            if !import.is_local() {
                return Ok(None);
            }
            let target = self.resolve_import(path, module_id, import)?;
            let target_id = self.resolver.module_id(&target);
            if target_id.is_some() && !imports.contains(&target) {
                imports.push(target);
            }
            Ok(target_id)
        })?;
        Ok((output, imports))
    }

    fn resolve_import(
        &self,
        importer: &Path,
        module_id: &str,
        import: &ImportRef,
    ) -> Result<PathBuf, TransformError> {
        let target = match self.resolver.resolve(importer, &import.specifier) {
            Resolution::Found(target) => target,
            Resolution::NotFound { tried } => {
                return Err(TransformError::new(
                    module_id,
                    format!(
                        "cannot resolve '{}' ({} candidates tried)",
                        import.specifier,
                        tried.len()
                    ),
                )
                .at_line(import.line));
            }
            Resolution::OutsideRoot(target) => {
                return Err(TransformError::new(
                    module_id,
                    format!(
                        "'{}' resolves outside the project root: {}",
                        import.specifier,
                        target.display()
                    ),
                )
                .at_line(import.line));
            }
        };
        if ModuleKind::from_path(&target).is_none() {
            return Err(TransformError::new(
                module_id,
                format!("'{}' is not an importable module type", import.specifier),
            )
            .at_line(import.line));
        }
        Ok(target)
    }
}

/// Dev-only prefix giving every module its hot context.
#[must_use]
pub fn hot_preamble(module_id: &str) -> String {
    format!(
        "import {{ createHotContext as __hotpage_ctx }} from {};\nimport.meta.hot = __hotpage_ctx({});\n",
        js_string(CLIENT_MODULE_ID),
        js_string(module_id)
    )
}
