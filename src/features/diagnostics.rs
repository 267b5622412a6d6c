use super::span_to_range;
use crate::core::ActiveDocument;
use crate::syntax::{SyntaxError, SyntaxErrorKind};
use lsp_types::*;

/// Turns the syntax errors recorded on a processed document into diagnostics
#[derive(Clone, Default)]
pub struct DiagnosticsProvider;

impl DiagnosticsProvider {
    pub fn new() -> Self {
        Self
    }

    pub fn provide(&self, document: &ActiveDocument) -> Vec<Diagnostic> {
        document.errors.iter().map(Self::convert).collect()
    }

    fn convert(error: &SyntaxError) -> Diagnostic {
        let code = match error.kind {
            SyntaxErrorKind::Lexer => "lexer",
            SyntaxErrorKind::Parser => "parser",
        };
        Diagnostic {
            range: span_to_range(error.span),
            severity: Some(DiagnosticSeverity::ERROR),
            code: Some(NumberOrString::String(code.to_string())),
            source: Some("miniscript".to_string()),
            message: error.message.clone(),
            ..Default::default()
        }
    }
}
