//! Bridge connecting the in-crate MiniScript front end to the language seams

use crate::syntax::{self, Chunk, ParseResult, SyntaxError};
use crate::traits::{SourceParser, TypeAnalyzer};
use crate::types::{self, TypeDocument};

/// Parser and analyzer for MiniScript source.
#[derive(Debug, Clone, Copy, Default)]
pub struct MiniScriptBridge;

impl SourceParser for MiniScriptBridge {
    fn parse(&self, text: &str) -> Result<ParseResult, SyntaxError> {
        Ok(syntax::parse(text))
    }
}

impl TypeAnalyzer for MiniScriptBridge {
    fn analyze(&self, uri: &str, chunk: &Chunk) -> TypeDocument {
        types::analyze(uri, chunk)
    }
}
