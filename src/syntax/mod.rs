//! MiniScript lexer, parser and AST.
//!
//! [`parse`] is the single entry point: it turns source text into a
//! [`Chunk`] plus the list of syntax errors found along the way. Parsing is
//! error-tolerant and always produces a best-effort tree.

mod ast;
mod lexer;
mod parser;

pub use ast::*;
pub use lexer::{Lexer, Token, TokenKind};
pub use parser::{parse, ParseResult, Parser};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxErrorKind {
    Lexer,
    Parser,
}

/// A recoverable syntax problem, reported through diagnostics.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct SyntaxError {
    pub kind: SyntaxErrorKind,
    pub message: String,
    pub span: Span,
}
