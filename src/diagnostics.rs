//! Structured diagnostics shared by the lexer, parser and compiler.
//!
//! The workspace carries no `tracing`/`log` dependency; humans see errors as
//! `Diagnostic` values rendered through `codespan-reporting` + `termcolor`
//! (spec §A.2). Fix suggestions follow `ErrorFix`/`ErrorSeverity`/
//! `ErrorCategory` from `original_source/src/core/parser/error_recovery.h`,
//! narrowed to the handful of mistakes worth an automated suggestion
//! (missing semicolon, wrong expected token, unterminated literal).

use crate::parser::token::Span;
use codespan_reporting::diagnostic::{Diagnostic as CrDiagnostic, Label};
use codespan_reporting::files::SimpleFile;
use codespan_reporting::term::{self, termcolor::{ColorChoice, StandardStream}};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Hint,
    Info,
    Warning,
    Error,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Syntax,
    Semantic,
    Reference,
    Declaration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixKind {
    Insert,
    Delete,
    Replace,
}

/// A suggested fix for a diagnostic, applied at `span`.
#[derive(Debug, Clone)]
pub struct ErrorFix {
    pub kind: FixKind,
    pub span: Span,
    pub message: String,
    pub replacement: String,
    pub confidence: f64,
}

/// A structured error/warning carrying a stable code, category, severity,
/// primary span and an optional fix (spec §4.2, §7).
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: &'static str,
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub message: String,
    pub span: Span,
    pub fix: Option<ErrorFix>,
}

impl Diagnostic {
    pub fn error(code: &'static str, category: ErrorCategory, message: impl Into<String>, span: Span) -> Self {
        Diagnostic { code, category, severity: ErrorSeverity::Error, message: message.into(), span, fix: None }
    }

    pub fn with_fix(mut self, fix: ErrorFix) -> Self {
        self.fix = Some(fix);
        self
    }

    fn to_codespan(&self, file_id: ()) -> CrDiagnostic<()> {
        let mut labels = vec![Label::primary(file_id, self.span.start..self.span.end).with_message(self.message.clone())];
        if let Some(fix) = &self.fix {
            labels.push(Label::secondary(file_id, fix.span.start..fix.span.end).with_message(fix.message.clone()));
        }
        let base = match self.severity {
            ErrorSeverity::Fatal | ErrorSeverity::Error => CrDiagnostic::error(),
            ErrorSeverity::Warning => CrDiagnostic::warning(),
            ErrorSeverity::Info => CrDiagnostic::note(),
            ErrorSeverity::Hint => CrDiagnostic::help(),
        };
        base.with_code(self.code).with_message(&self.message).with_labels(labels)
    }
}

/// Renders a batch of diagnostics against `source` to a `termcolor`
/// `StandardStream`, for CLI and test-harness use (spec §A.2). The engine
/// itself never owns a logger; the embedder decides where this goes.
pub fn emit(filename: &str, source: &str, diagnostics: &[Diagnostic]) {
    let file = SimpleFile::new(filename, source);
    let writer = StandardStream::stderr(ColorChoice::Auto);
    let config = term::Config::default();
    let mut handle = writer.lock();
    for diag in diagnostics {
        let _ = term::emit(&mut handle, &config, &file, &diag.to_codespan(()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_without_panicking() {
        let diag = Diagnostic::error("E0001", ErrorCategory::Syntax, "unexpected token", Span::new(0, 1));
        emit("test.js", "1+", &[diag]);
    }
}
