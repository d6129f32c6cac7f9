//! Diagnostics.
//!
//! Every failure mode in the pipeline is a [`Diagnostic`] value pushed into a
//! [`DiagnosticSink`]; nothing in the compiler throws. The sink keeps
//! diagnostics in emission order so repeated compilations of the same source
//! produce identical lists. Rendering for humans is the caller's business;
//! [`render_diagnostics`] is a convenience built on `codespan-reporting`.
use crate::syntax::{SourceFile, Span};
use codespan_reporting::{
    diagnostic as cs,
    files::SimpleFile,
    term,
    term::termcolor::NoColor,
};
use serde::Serialize;
use strum::Display;

/// Diagnostic severity, ordered from most to least severe.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
    Hint,
}

/// Stable diagnostic codes.
///
/// `E###` semantic errors, `W###` warnings, `I###` informational, `P###`
/// performance hints, `S###` strict-mode findings, `PARSE_ERROR` for
/// syntactic failures.
pub mod codes {
    pub const PARSE_ERROR: &str = "PARSE_ERROR";
    pub const UNKNOWN_TYPE: &str = "E001";
    pub const UNKNOWN_IDENTIFIER: &str = "E002";
    pub const MISSING_WORKGROUP_SIZE: &str = "E003";
    pub const INVALID_VERTEX_SIGNATURE: &str = "E004";
    pub const INVALID_FRAGMENT_SIGNATURE: &str = "E005";
    pub const TYPE_MISMATCH: &str = "E006";
    pub const INVALID_SWIZZLE: &str = "E007";
    pub const INVALID_OPERAND_ORDER: &str = "E008";
    pub const CONSTRUCTOR_ARITY: &str = "E009";
    pub const DUPLICATE_BINDING: &str = "E010";
    pub const WORKGROUP_TOO_LARGE: &str = "E011";
    pub const UNKNOWN_FUNCTION: &str = "E012";
    pub const RETURN_TYPE_MISMATCH: &str = "E013";
    pub const NARROWING_CONVERSION: &str = "W001";
    pub const WORKGROUP_NOT_POW2: &str = "W002";
    pub const UNREACHABLE_CODE: &str = "I001";
    pub const POW_SMALL_EXPONENT: &str = "P001";
    pub const DIV_BY_CONSTANT: &str = "P002";
    pub const IMPLICIT_ANY: &str = "S001";
    pub const UNUSED_LOCAL: &str = "S002";
    pub const UNUSED_PARAMETER: &str = "S003";
    pub const MISSING_RETURN: &str = "S004";
    pub const STRICT_WORKGROUP_SIZE: &str = "S005";
    pub const ALIGNMENT_PADDING: &str = "S006";
    pub const NONCONTIGUOUS_BINDINGS: &str = "S007";
    pub const WORKGROUP_SIZE_HINT: &str = "S008";
    pub const IMPLICIT_FLOAT: &str = "S009";
}

/// A single finding, carried as a value through the pipeline.
#[derive(Clone, Debug, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: &'static str,
    pub message: String,
    pub span: Option<Span>,
    pub suggestion: Option<String>,
    pub suggestions: Vec<String>,
}

/// Accumulates diagnostics for one compilation.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
    error_count: usize,
    warning_count: usize,
}

impl DiagnosticSink {
    pub fn new() -> DiagnosticSink {
        DiagnosticSink::default()
    }

    pub fn error<'a>(&'a mut self, code: &'static str, message: impl Into<String>) -> DiagnosticBuilder<'a> {
        self.diagnostic(Severity::Error, code, message)
    }

    pub fn warning<'a>(&'a mut self, code: &'static str, message: impl Into<String>) -> DiagnosticBuilder<'a> {
        self.diagnostic(Severity::Warning, code, message)
    }

    pub fn info<'a>(&'a mut self, code: &'static str, message: impl Into<String>) -> DiagnosticBuilder<'a> {
        self.diagnostic(Severity::Info, code, message)
    }

    pub fn hint<'a>(&'a mut self, code: &'static str, message: impl Into<String>) -> DiagnosticBuilder<'a> {
        self.diagnostic(Severity::Hint, code, message)
    }

    pub fn diagnostic<'a>(
        &'a mut self,
        severity: Severity,
        code: &'static str,
        message: impl Into<String>,
    ) -> DiagnosticBuilder<'a> {
        DiagnosticBuilder {
            sink: self,
            diag: Diagnostic {
                severity,
                code,
                message: message.into(),
                span: None,
                suggestion: None,
                suggestions: vec![],
            },
        }
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn warning_count(&self) -> usize {
        self.warning_count
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

/// Builder returned by the sink's severity methods; `emit()` records the
/// diagnostic.
pub struct DiagnosticBuilder<'a> {
    sink: &'a mut DiagnosticSink,
    diag: Diagnostic,
}

impl<'a> DiagnosticBuilder<'a> {
    pub fn span(mut self, span: Span) -> DiagnosticBuilder<'a> {
        self.diag.span = Some(span);
        self
    }

    pub fn span_opt(mut self, span: Option<Span>) -> DiagnosticBuilder<'a> {
        self.diag.span = span;
        self
    }

    pub fn suggestion(mut self, suggestion: impl Into<String>) -> DiagnosticBuilder<'a> {
        self.diag.suggestion = Some(suggestion.into());
        self
    }

    pub fn suggestions(mut self, suggestions: impl IntoIterator<Item = String>) -> DiagnosticBuilder<'a> {
        self.diag.suggestions.extend(suggestions);
        self
    }

    pub fn emit(self) {
        match self.diag.severity {
            Severity::Error => self.sink.error_count += 1,
            Severity::Warning => self.sink.warning_count += 1,
            _ => {}
        }
        self.sink.diagnostics.push(self.diag);
    }
}

fn codespan_severity(severity: Severity) -> cs::Severity {
    match severity {
        Severity::Error => cs::Severity::Error,
        Severity::Warning => cs::Severity::Warning,
        Severity::Info => cs::Severity::Note,
        Severity::Hint => cs::Severity::Help,
    }
}

/// Renders diagnostics against the source file into a plain-text report.
pub fn render_diagnostics(file: &SourceFile, diagnostics: &[Diagnostic]) -> String {
    let files = SimpleFile::new(file.name.clone(), file.text.as_str());
    let config = term::Config::default();
    let mut writer = NoColor::new(Vec::new());
    for diag in diagnostics {
        let mut out: cs::Diagnostic<()> = cs::Diagnostic::new(codespan_severity(diag.severity))
            .with_code(diag.code)
            .with_message(diag.message.clone());
        if let Some(span) = diag.span {
            out = out.with_labels(vec![cs::Label::primary((), span.start as usize..span.end as usize)]);
        }
        let mut notes: Vec<String> = diag.suggestion.iter().cloned().collect();
        notes.extend(diag.suggestions.iter().cloned());
        out = out.with_notes(notes);
        // NoColor over a Vec<u8> cannot fail.
        let _ = term::emit(&mut writer, &config, &files, &out);
    }
    String::from_utf8_lossy(writer.get_ref()).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_counts_and_order() {
        let mut sink = DiagnosticSink::new();
        sink.error(codes::TYPE_MISMATCH, "first").emit();
        sink.warning(codes::NARROWING_CONVERSION, "second")
            .span(Span::new(0, 4))
            .emit();
        sink.info(codes::UNREACHABLE_CODE, "third").emit();
        assert_eq!(sink.error_count(), 1);
        assert_eq!(sink.warning_count(), 1);
        assert!(sink.has_errors());
        let codes: Vec<_> = sink.diagnostics().iter().map(|d| d.code).collect();
        assert_eq!(codes, vec!["E006", "W001", "I001"]);
    }

    #[test]
    fn renders_with_label() {
        let file = SourceFile::new("a.3d.ts", "let x = 1;");
        let mut sink = DiagnosticSink::new();
        sink.error(codes::UNKNOWN_IDENTIFIER, "unknown identifier `x`")
            .span(Span::new(4, 5))
            .suggestion("declare `x` before use")
            .emit();
        let report = render_diagnostics(&file, sink.diagnostics());
        assert!(report.contains("E002"));
        assert!(report.contains("unknown identifier"));
    }
}
