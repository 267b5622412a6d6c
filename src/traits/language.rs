//! Parser and type-analyzer seams consumed by the document manager.

use crate::syntax::{Chunk, ParseResult, SyntaxError};
use crate::types::TypeDocument;

/// Turns source text into an AST plus recoverable syntax errors.
pub trait SourceParser: Send + Sync {
    /// `Err` only for a failure that leaves no usable tree at all; syntax
    /// errors belong in [`ParseResult::errors`].
    fn parse(&self, text: &str) -> Result<ParseResult, SyntaxError>;
}

/// Builds the per-document type model. Must be deterministic and must not
/// mutate its input.
pub trait TypeAnalyzer: Send + Sync {
    fn analyze(&self, uri: &str, chunk: &Chunk) -> TypeDocument;
}
