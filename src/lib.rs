//! A shader-language compiler.
//!
//! Takes a TypeScript-flavored shading language with WGSL-style attributes
//! and emits three targets: WGSL, a GLSL ES 3.00 vertex/fragment pair, and a
//! JS module that carries the WGSL text plus binding metadata. Compilation
//! is a pure function of `(source, options)`: no I/O, no global mutable
//! state, diagnostics returned as values.
//!
//! ```
//! let source = r#"
//!     @fragment
//!     function main(): vec4f {
//!         return vec4f(sin(time), 0.0, 0.0, 1.0);
//!     }
//! "#;
//! let output = lueur::compile(source, "glow.3d.ts", &lueur::CompileOptions::default());
//! assert!(output.wgsl.contains("@fragment"));
//! ```
pub mod codegen;
pub mod diag;
pub mod hir;
pub mod opt;
pub mod options;
pub mod sema;
pub mod syntax;
pub mod ty;

pub use crate::{
    diag::{Diagnostic, DiagnosticSink, Severity},
    opt::{OptStats, Optimizer},
    options::{CompileOptions, TargetSet, ValidationFlags, ValidationLevel},
    syntax::{ast::Program, SourceFile, Span},
    ty::{TypeDesc, TypeRegistry},
};

use crate::{
    codegen::sourcemap::{build_source_map, SourceMap},
    syntax::ast::ShaderStage,
};
use serde::Serialize;
use std::time::Instant;
use tracing::debug;

/// Phase timings in milliseconds plus the optimizer counters.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileStats {
    pub parse_ms: f64,
    pub validate_ms: f64,
    pub generate_ms: f64,
    pub total_ms: f64,
    pub optimizer: OptStats,
}

/// Everything one compilation produces.
///
/// When at least one error diagnostic is present the artifact strings are
/// empty, but the AST and the diagnostic list are still populated.
#[derive(Debug)]
pub struct CompileOutput {
    pub js: String,
    /// The WGSL-style target.
    pub wgsl: String,
    pub glsl_vertex: Option<String>,
    pub glsl_fragment: Option<String>,
    pub ast: Program,
    pub diagnostics: Vec<Diagnostic>,
    pub source_map: Option<SourceMap>,
    pub stats: CompileStats,
}

impl CompileOutput {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }
}

fn millis(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Applies `// @shader3d-strict [flags]` pragmas to the options. A pragma
/// without flag names raises the whole level to strict.
fn apply_strict_pragmas(tokens: &[syntax::Token], options: &mut CompileOptions) {
    for token in tokens {
        if !token.kind.is_comment() {
            continue;
        }
        let Some(pos) = token.text.find("@shader3d-strict") else {
            continue;
        };
        let rest = &token.text[pos + "@shader3d-strict".len()..];
        let rest = rest.trim_end_matches("*/");
        let mut any = false;
        for word in rest.split_whitespace() {
            if let Some(flag) = options::parse_flag_name(word) {
                options.extra_flags |= flag;
                any = true;
            }
        }
        if !any && options.validate < ValidationLevel::Strict {
            options.validate = ValidationLevel::Strict;
        }
    }
}

/// Compiles one source file.
pub fn compile(source: &str, filename: &str, options: &CompileOptions) -> CompileOutput {
    let total_start = Instant::now();
    let file = SourceFile::new(filename, source);
    let mut diag = DiagnosticSink::new();
    let mut options = options.clone();

    // Parse.
    let parse_start = Instant::now();
    let tokens = syntax::tokenize(source);
    apply_strict_pragmas(&tokens, &mut options);
    let program = syntax::parser::parse(&tokens, &mut diag);
    let parse_ms = millis(parse_start);

    // Check.
    let validate_start = Instant::now();
    let mut registry = TypeRegistry::new();
    let flags = options.validation_flags();
    let check = if options.validate == ValidationLevel::Off {
        // Even with validation off the transformer needs the typed
        // expression map; only the diagnostics are suppressed.
        let mut scratch = DiagnosticSink::new();
        sema::check(&program, &mut registry, &mut scratch, flags)
    } else {
        sema::check(&program, &mut registry, &mut diag, flags)
    };
    let validate_ms = millis(validate_start);

    // Lower, optimize, generate.
    let generate_start = Instant::now();
    let mut module = hir::lower(&program, &check, &registry, &file);
    let optimizer = Optimizer::new(
        options.optimize,
        options.max_iterations,
        options.inline_threshold,
        options.unroll_threshold,
    );
    let optimizer_stats = optimizer.run(&mut module);

    let wgsl_out = codegen::wgsl::emit(&module, filename, options.debug);
    let mut wgsl = if options.targets.contains(TargetSet::WGSL) {
        wgsl_out.text.clone()
    } else {
        String::new()
    };
    let (mut glsl_vertex, mut glsl_fragment) = if options.targets.contains(TargetSet::GLSL) {
        (
            codegen::glsl::emit(&module, ShaderStage::Vertex),
            codegen::glsl::emit(&module, ShaderStage::Fragment),
        )
    } else {
        (None, None)
    };
    let mut js = if options.targets.contains(TargetSet::JS) {
        codegen::js::emit(&module, &wgsl_out.text)
    } else {
        String::new()
    };

    let mut source_map = if options.source_map {
        Some(build_source_map(
            format!("{}.js", filename),
            filename,
            source,
            wgsl_out.names,
            wgsl_out.segments,
        ))
    } else {
        None
    };

    if options.minify {
        wgsl = codegen::minify(&wgsl);
        js = codegen::minify(&js);
        glsl_vertex = glsl_vertex.as_deref().map(codegen::minify);
        glsl_fragment = glsl_fragment.as_deref().map(codegen::minify);
    }

    if let (Some(map), false) = (&source_map, js.is_empty()) {
        js.push_str("\n//# sourceMappingURL=");
        js.push_str(&map.to_data_uri());
        js.push('\n');
    }

    // An error empties every artifact; the AST and diagnostics survive.
    if diag.has_errors() {
        wgsl = String::new();
        js = String::new();
        glsl_vertex = None;
        glsl_fragment = None;
        source_map = None;
    }
    let generate_ms = millis(generate_start);

    debug!(
        errors = diag.error_count(),
        warnings = diag.warning_count(),
        "compilation finished"
    );

    CompileOutput {
        js,
        wgsl,
        glsl_vertex,
        glsl_fragment,
        ast: program,
        diagnostics: diag.into_diagnostics(),
        source_map,
        stats: CompileStats {
            parse_ms,
            validate_ms,
            generate_ms,
            total_ms: millis(total_start),
            optimizer: optimizer_stats,
        },
    }
}
