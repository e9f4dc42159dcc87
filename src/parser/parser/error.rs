//! Parse errors (spec §4.2, §7's `ParseError`).

use crate::diagnostics::{Diagnostic, ErrorCategory};
use crate::parser::token::{Span, Token};

#[derive(Debug, Clone, PartialEq)]
pub enum ParseErrorKind {
    UnexpectedToken { expected: Vec<Token>, found: Token },
    UnexpectedEof { expected: Vec<Token> },
    InvalidSyntax { reason: String },
    LimitExceeded { reason: String },
}

#[derive(Debug, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub span: Span,
    pub message: String,
    pub suggestion: Option<String>,
}

impl ParseError {
    pub fn invalid_syntax(reason: impl Into<String>, span: Span) -> Self {
        let reason = reason.into();
        ParseError {
            message: reason.clone(),
            kind: ParseErrorKind::InvalidSyntax { reason },
            span,
            suggestion: None,
        }
    }

    pub fn parser_limit_exceeded(reason: impl Into<String>, span: Span) -> Self {
        let reason = reason.into();
        ParseError {
            message: reason.clone(),
            kind: ParseErrorKind::LimitExceeded { reason },
            span,
            suggestion: None,
        }
    }

    pub fn parser_stuck(reason: impl Into<String>, span: Span) -> Self {
        Self::parser_limit_exceeded(reason, span)
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error("E0002", ErrorCategory::Syntax, self.message.clone(), self.span)
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseError {}
