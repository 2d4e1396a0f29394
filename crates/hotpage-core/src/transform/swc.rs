//! SWC script compiler.
//!
//! Parses TypeScript/JSX, strips types, collects the module's imports so
//! the caller can resolve them, rewrites specifiers, lowers JSX with the
//! automatic runtime and prints an ES module.

#![allow(clippy::default_trait_access)]

use std::collections::BTreeMap;
use std::path::Path;

use swc_common::{
    comments::{Comments, SingleThreadedComments},
    sync::Lrc,
    FileName, Globals, Mark, SourceMap, Span, Spanned, GLOBALS,
};
use swc_ecma_ast::{
    CallExpr, Callee, EsVersion, ExportAll, Expr, ImportDecl, Lit, MemberProp, MetaPropKind,
    Module, NamedExport, Program, Str,
};
use swc_ecma_codegen::{text_writer::JsWriter, Emitter};
use swc_ecma_parser::{lexer::Lexer, EsSyntax, Parser, StringInput, Syntax, TsSyntax};
use swc_ecma_transforms_base::{fixer::fixer, hygiene::hygiene, resolver};
use swc_ecma_transforms_react::{react, Options as ReactOptions, Runtime};
use swc_ecma_transforms_typescript::strip;
use swc_ecma_visit::{FoldWith, Visit, VisitMut, VisitMutWith, VisitWith};

use super::{ImportKind, ImportRef, ScriptInput, ScriptOutput, Transpile};
use crate::error::TransformError;

/// Default script compiler.
#[derive(Debug, Clone, Copy, Default)]
pub struct SwcTranspiler;

impl SwcTranspiler {
    fn is_typescript(path: &Path) -> bool {
        matches!(extension(path).as_deref(), Some("ts" | "tsx" | "mts" | "cts"))
    }

    fn is_jsx(path: &Path) -> bool {
        matches!(extension(path).as_deref(), Some("jsx" | "tsx"))
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

impl Transpile for SwcTranspiler {
    fn name(&self) -> &'static str {
        "swc"
    }

    fn transpile(
        &self,
        input: &ScriptInput<'_>,
        resolve: &mut dyn FnMut(&ImportRef) -> Result<Option<String>, TransformError>,
    ) -> Result<ScriptOutput, TransformError> {
        let is_ts = Self::is_typescript(input.path);
        let is_jsx = Self::is_jsx(input.path);

        let cm: Lrc<SourceMap> = Default::default();
        let fm = cm.new_source_file(
            Lrc::new(FileName::Custom(input.module_id.to_string())),
            input.source.to_string(),
        );
        let syntax = if is_ts {
            Syntax::Typescript(TsSyntax {
                tsx: is_jsx,
                decorators: true,
                ..Default::default()
            })
        } else {
            Syntax::Es(EsSyntax {
                jsx: is_jsx,
                decorators: true,
                ..Default::default()
            })
        };

        let comments = SingleThreadedComments::default();
        let lexer = Lexer::new(syntax, EsVersion::Es2022, StringInput::from(&*fm), Some(&comments));
        let mut parser = Parser::new_from(lexer);
        let module = parser
            .parse_module()
            .map_err(|err| parse_error(&cm, input.module_id, err))?;
        // Recoverable errors still mean the file is broken.
        if let Some(err) = parser.take_errors().into_iter().next() {
            return Err(parse_error(&cm, input.module_id, err));
        }

        let (module, self_accepting) = GLOBALS.set(&Globals::default(), || {
            let unresolved_mark = Mark::new();
            let top_level_mark = Mark::new();

            let mut program = Program::Module(module);
            program = program.fold_with(&mut resolver(unresolved_mark, top_level_mark, is_ts));
            if is_ts {
                program = program.fold_with(&mut strip(unresolved_mark, top_level_mark));
            }
            let Program::Module(mut module) = program else {
                return Err(TransformError::new(input.module_id, "expected an ES module"));
            };

            // Collected after type stripping so type-only imports are gone.
            let mut collector = ImportCollector {
                cm: &cm,
                imports: Vec::new(),
                self_accepting: false,
            };
            module.visit_with(&mut collector);

            let mut replacements = BTreeMap::new();
            for import in &collector.imports {
                if let Some(new_spec) = resolve(import)? {
                    replacements.insert(import.specifier.clone(), new_spec);
                }
            }
            module.visit_mut_with(&mut SpecifierRewriter {
                replacements: &replacements,
            });

            if is_jsx {
                let options = ReactOptions {
                    runtime: Some(Runtime::Automatic),
                    import_source: Some("react".to_string()),
                    ..Default::default()
                };
                module = module.fold_with(&mut react(
                    cm.clone(),
                    Some(&comments),
                    options,
                    top_level_mark,
                    unresolved_mark,
                ));
            }

            module = module.fold_with(&mut hygiene());
            module = module.fold_with(&mut fixer(Some(&comments)));
            Ok((module, collector.self_accepting))
        })?;

        let code = emit(&cm, &comments, &module, input.minify)
            .map_err(|e| TransformError::new(input.module_id, format!("failed to emit: {e}")))?;
        Ok(ScriptOutput {
            code,
            self_accepting,
        })
    }
}

fn emit(
    cm: &Lrc<SourceMap>,
    comments: &SingleThreadedComments,
    module: &Module,
    minify: bool,
) -> std::io::Result<String> {
    let mut buf = Vec::new();
    {
        let writer = JsWriter::new(cm.clone(), "\n", &mut buf, None);
        let mut emitter = Emitter {
            cfg: swc_ecma_codegen::Config::default()
                .with_minify(minify)
                .with_target(EsVersion::Es2022),
            cm: cm.clone(),
            comments: if minify { None } else { Some(comments as &dyn Comments) },
            wr: writer,
        };
        emitter.emit_module(module)?;
    }
    String::from_utf8(buf).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

fn parse_error(
    cm: &SourceMap,
    module_id: &str,
    err: swc_ecma_parser::error::Error,
) -> TransformError {
    let line = line_of(cm, err.span());
    TransformError::new(module_id, err.into_kind().msg()).at_line(line)
}

fn line_of(cm: &SourceMap, span: Span) -> u32 {
    u32::try_from(cm.lookup_char_pos(span.lo).line).unwrap_or(u32::MAX)
}

struct ImportCollector<'a> {
    cm: &'a SourceMap,
    imports: Vec<ImportRef>,
    self_accepting: bool,
}

impl ImportCollector<'_> {
    fn push(&mut self, src: &Str, kind: ImportKind) {
        self.imports.push(ImportRef {
            specifier: src.value.to_string(),
            kind,
            line: line_of(self.cm, src.span),
        });
    }
}

impl Visit for ImportCollector<'_> {
    fn visit_import_decl(&mut self, decl: &ImportDecl) {
        let kind = if decl.specifiers.is_empty() {
            ImportKind::SideEffect
        } else {
            ImportKind::Static
        };
        self.push(&decl.src, kind);
    }

    fn visit_named_export(&mut self, export: &NamedExport) {
        if let Some(src) = &export.src {
            self.push(src, ImportKind::ReExport);
        }
    }

    fn visit_export_all(&mut self, export: &ExportAll) {
        self.push(&export.src, ImportKind::ReExport);
    }

    fn visit_call_expr(&mut self, call: &CallExpr) {
        match &call.callee {
            Callee::Import(_) => {
                if let Some(Expr::Lit(Lit::Str(src))) = call.args.first().map(|arg| &*arg.expr) {
                    self.push(src, ImportKind::Dynamic);
                }
            }
            // `hot.accept(dep, cb)` accepts a dependency, not the module itself.
            Callee::Expr(callee) if is_hot_accept(callee) => {
                let first = call.args.first().map(|arg| &*arg.expr);
                if !matches!(first, Some(Expr::Lit(Lit::Str(_)) | Expr::Array(_))) {
                    self.self_accepting = true;
                }
            }
            _ => {}
        }
        call.visit_children_with(self);
    }
}

/// `import.meta.hot.accept`
fn is_hot_accept(callee: &Expr) -> bool {
    let Expr::Member(accept) = callee else {
        return false;
    };
    let Expr::Member(hot) = &*accept.obj else {
        return false;
    };
    matches!(&accept.prop, MemberProp::Ident(name) if &*name.sym == "accept")
        && matches!(&hot.prop, MemberProp::Ident(name) if &*name.sym == "hot")
        && matches!(&*hot.obj, Expr::MetaProp(meta) if matches!(meta.kind, MetaPropKind::ImportMeta))
}

struct SpecifierRewriter<'a> {
    replacements: &'a BTreeMap<String, String>,
}

impl SpecifierRewriter<'_> {
    fn rewrite(&self, src: &mut Str) {
        if let Some(new_spec) = self.replacements.get(&*src.value) {
            src.value = new_spec.as_str().into();
            src.raw = None;
        }
    }
}

impl VisitMut for SpecifierRewriter<'_> {
    fn visit_mut_import_decl(&mut self, decl: &mut ImportDecl) {
        self.rewrite(&mut decl.src);
    }

    fn visit_mut_named_export(&mut self, export: &mut NamedExport) {
        if let Some(src) = &mut export.src {
            self.rewrite(src);
        }
    }

    fn visit_mut_export_all(&mut self, export: &mut ExportAll) {
        self.rewrite(&mut export.src);
    }

    fn visit_mut_call_expr(&mut self, call: &mut CallExpr) {
        if matches!(call.callee, Callee::Import(_)) {
            if let Some(arg) = call.args.first_mut() {
                if let Expr::Lit(Lit::Str(src)) = &mut *arg.expr {
                    self.rewrite(src);
                }
            }
        }
        call.visit_mut_children_with(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(path: &str, source: &str) -> Result<(ScriptOutput, Vec<ImportRef>), TransformError> {
        let mut seen = Vec::new();
        let input = ScriptInput {
            source,
            path: Path::new(path),
            module_id: path,
            minify: false,
        };
        let output = SwcTranspiler.transpile(&input, &mut |import| {
            seen.push(import.clone());
            Ok(import
                .is_local()
                .then(|| format!("/resolved/{}", import.specifier.trim_start_matches("./"))))
        })?;
        Ok((output, seen))
    }

    #[test]
    fn test_detects_syntax() {
        assert!(SwcTranspiler::is_typescript(Path::new("a.tsx")));
        assert!(SwcTranspiler::is_typescript(Path::new("a.ts")));
        assert!(!SwcTranspiler::is_typescript(Path::new("a.jsx")));
        assert!(SwcTranspiler::is_jsx(Path::new("a.jsx")));
        assert!(!SwcTranspiler::is_jsx(Path::new("a.mjs")));
    }

    #[test]
    fn test_tsx_lowered_to_browser_module() {
        let source = "import Button from './Button';\n\
                      type Props = { title: string };\n\
                      export default function Home({ title }: Props) {\n\
                      \x20 return <main><Button label={title} /></main>;\n\
                      }\n";
        let (output, imports) = compile("pages/index.tsx", source).unwrap();

        assert!(output.code.contains("react/jsx-runtime"), "{}", output.code);
        assert!(!output.code.contains("<main>"));
        assert!(!output.code.contains("Props"));
        assert!(output.code.contains("\"/resolved/Button\""));
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].kind, ImportKind::Static);
        assert_eq!(imports[0].line, 1);
    }

    #[test]
    fn test_type_only_imports_skipped() {
        let source = "import type { User } from './types';\nimport './global.css';\nexport const name = (u: User) => u.name;\n";
        let (output, imports) = compile("lib/user.ts", source).unwrap();
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].specifier, "./global.css");
        assert_eq!(imports[0].kind, ImportKind::SideEffect);
        assert_eq!(imports[0].line, 2);
        assert!(!output.code.contains("./types"));
    }

    #[test]
    fn test_reexports_and_dynamic_imports() {
        let source = "export { a } from './a.js';\nexport * from './b.js';\nexport const load = () => import('./c.js');\nimport React from 'react';\nexport const el = React;\n";
        let (output, imports) = compile("lib/index.js", source).unwrap();
        let kinds: Vec<_> = imports.iter().map(|i| (i.specifier.as_str(), i.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                ("./a.js", ImportKind::ReExport),
                ("./b.js", ImportKind::ReExport),
                ("./c.js", ImportKind::Dynamic),
                ("react", ImportKind::Static),
            ]
        );
        assert!(output.code.contains("import(\"/resolved/c.js\")"));
        assert!(output.code.contains("react"));
    }

    #[test]
    fn test_self_accept_forms() {
        let (own, _) = compile("a.js", "import.meta.hot.accept();\n").unwrap();
        assert!(own.self_accepting);
        let (cb, _) = compile("a.js", "if (import.meta.hot) { import.meta.hot.accept((m) => m); }\n").unwrap();
        assert!(cb.self_accepting);
        let (dep, _) = compile("a.js", "import.meta.hot.accept('./dep.js', () => {});\n").unwrap();
        assert!(!dep.self_accepting);
        let (none, _) = compile("a.js", "// import.meta.hot.accept()\nexport {};\n").unwrap();
        assert!(!none.self_accepting);
    }

    #[test]
    fn test_parse_error_reports_line() {
        let source = "export default function Home() {\n  const = ;\n  return <div>hi</div>;\n}\n";
        let err = compile("pages/index.tsx", source).unwrap_err();
        assert_eq!(err.file, "pages/index.tsx");
        assert_eq!(err.line, Some(2));
        assert!(!err.message.is_empty());
    }

    #[test]
    fn test_resolve_error_propagates() {
        let input = ScriptInput {
            source: "import x from './missing';\nexport default x;\n",
            path: Path::new("a.js"),
            module_id: "/a.js",
            minify: false,
        };
        let err = SwcTranspiler
            .transpile(&input, &mut |import| {
                Err(TransformError::new("/a.js", format!("cannot resolve '{}'", import.specifier))
                    .at_line(import.line))
            })
            .unwrap_err();
        assert_eq!(err.line, Some(1));
        assert!(err.message.contains("./missing"));
    }
}
