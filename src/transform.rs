//! Source transform pipeline: import hoisting, scope wrappers and the
//! markup/type conversion to plain executable code.

use oxc_allocator::Allocator;
use oxc_ast::ast::Statement;
use oxc_ast_visit::VisitMut;
use oxc_codegen::Codegen;
use oxc_parser::{ParseOptions, Parser};
use oxc_span::{GetSpan, SourceType};

use crate::error::{EvalError, EvalResult};
use crate::jsx_lowerer::{JsxLowerer, TypeEraser};
use crate::lowering::COMPLETION_DIRECTIVE;
use crate::scope::Scope;

/// Snippet text with its import statements split off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitSource {
    pub imports: Vec<String>,
    pub body: String,
}

fn snippet_source_type() -> SourceType {
    SourceType::default()
        .with_module(true)
        .with_jsx(true)
        .with_typescript(true)
}

/// Splits off the import declarations leading the snippet so they can be
/// hoisted outside the wrapper. Anything after the first other statement
/// stays in the body, including text that merely looks like an import.
pub fn extract_imports(raw_source: &str) -> SplitSource {
    let allocator = Allocator::default();
    // Definition bodies may `return` at their top level
    let options = ParseOptions {
        allow_return_outside_function: true,
        ..ParseOptions::default()
    };
    let ret = Parser::new(&allocator, raw_source, snippet_source_type())
        .with_options(options)
        .parse();

    let mut imports = Vec::new();
    let mut body_start = 0;
    for stmt in &ret.program.body {
        if !matches!(stmt, Statement::ImportDeclaration(_)) {
            break;
        }
        let span = stmt.span();
        imports.push(raw_source[span.start as usize..span.end as usize].to_string());
        body_start = span.end as usize;
    }

    SplitSource {
        imports,
        body: raw_source[body_start..].trim().to_string(),
    }
}

fn push_header(out: &mut String, imports: &[String]) {
    for import in imports {
        out.push_str(import);
        out.push('\n');
    }
}

fn push_scope_bindings(out: &mut String, scope: &Scope) {
    // BTreeMap keys: sorted, so the text is stable across runs
    for key in scope.keys() {
        out.push_str("const ");
        out.push_str(key);
        out.push_str(" = scope.");
        out.push_str(key);
        out.push_str(";\n");
    }
}

/// `(scope) => (props) => renderable`.
///
/// The body may end in a bare expression; its value is what the component
/// returns when there is no explicit `return`.
pub fn wrap_for_definition(raw_source: &str, scope: &Scope) -> String {
    let split = extract_imports(raw_source);
    let mut out = String::new();
    push_header(&mut out, &split.imports);
    out.push_str("export default (scope) => (props) => {\n");
    out.push('"');
    out.push_str(COMPLETION_DIRECTIVE);
    out.push_str("\";\n");
    push_scope_bindings(&mut out, scope);
    out.push_str(&split.body);
    out.push_str("\n};\n");
    out
}

/// `(scope, transform) => renderable`; the body stays a string literal and
/// is converted when the wrapper runs.
pub fn wrap_for_inline_use(raw_source: &str, scope: &Scope) -> String {
    let split = extract_imports(raw_source);
    // serde_json string escaping is valid JS string literal syntax
    let literal = serde_json::to_string(&split.body).unwrap_or_else(|_| "\"\"".to_string());
    let mut out = String::new();
    push_header(&mut out, &split.imports);
    out.push_str("export default (scope, transform) => {\n");
    push_scope_bindings(&mut out, scope);
    out.push_str("return eval(transform(");
    out.push_str(&literal);
    out.push_str("));\n};\n");
    out
}

/// Converts markup and typed syntax into plain executable code.
pub fn to_executable(source: &str) -> EvalResult<String> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, snippet_source_type()).parse();
    if let Some(error) = ret.errors.first() {
        return Err(EvalError::Syntax(error.to_string()));
    }

    let mut program = ret.program;

    // 1. Lower JSX to h(...) calls
    let mut jsx_lowerer = JsxLowerer::new(&allocator);
    jsx_lowerer.visit_program(&mut program);

    // 2. Erase type-only syntax
    let mut eraser = TypeEraser::new(&allocator);
    eraser.visit_program(&mut program);

    Ok(Codegen::new().build(&program).code)
}
