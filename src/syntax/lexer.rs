use super::ast::{Position, Span};
use super::{SyntaxError, SyntaxErrorKind};
use logos::Logos;

/// Why a slice of input did not form a token.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LexError {
    #[default]
    UnexpectedCharacter,
    UnterminatedString,
    InvalidNumber,
    UnknownDirective,
}

#[derive(Logos, Debug, PartialEq, Clone)]
#[logos(error = LexError)]
#[logos(skip r"[ \t\r\f]+")]
#[logos(skip r"//[^\n]*")]
pub enum TokenKind {
    // Anything above ASCII is a letter as far as identifiers go
    #[regex(r"[a-zA-Z_\x{80}-\x{10FFFF}][a-zA-Z0-9_\x{80}-\x{10FFFF}]*", |lex| lex.slice().to_string())]
    Identifier(String),
    #[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?", number)]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?", number)]
    Number(f64),
    #[regex(r#""([^"\n]|"")*""#, string_literal)]
    #[regex(r#""([^"\n]|"")*"#, |_| { Err::<String, _>(LexError::UnterminatedString) })]
    String(String),
    /// `#include`
    #[token("#include")]
    HashInclude,
    /// `#import`
    #[token("#import")]
    #[regex(r"#[a-zA-Z_]*", |_| { Err::<(), _>(LexError::UnknownDirective) })]
    HashImport,

    // Keywords
    #[token("if")]
    If,
    #[token("then")]
    Then,
    #[token("else")]
    Else,
    #[token("end")]
    End,
    #[token("while")]
    While,
    #[token("for")]
    For,
    #[token("in")]
    In,
    #[token("function")]
    Function,
    #[token("return")]
    Return,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("and")]
    And,
    #[token("or")]
    Or,
    #[token("not")]
    Not,
    #[token("isa")]
    Isa,
    #[token("new")]
    New,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,

    // Punctuation
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,
    #[token("@")]
    At,

    // Operators
    #[token("=")]
    Assign,
    #[token("+=")]
    PlusAssign,
    #[token("-=")]
    MinusAssign,
    #[token("*=")]
    StarAssign,
    #[token("/=")]
    SlashAssign,
    #[token("%=")]
    PercentAssign,
    #[token("^=")]
    CaretAssign,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Less,
    #[token(">")]
    Greater,
    #[token("<=")]
    LessEq,
    #[token(">=")]
    GreaterEq,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("^")]
    Caret,

    #[token("\n")]
    Newline,
    #[token(";")]
    Semicolon,
    Error,
    Eof,
}

fn number(lex: &mut logos::Lexer<TokenKind>) -> Result<f64, LexError> {
    lex.slice().parse().map_err(|_| LexError::InvalidNumber)
}

/// Strip the quotes and unescape `""`.
fn string_literal(lex: &mut logos::Lexer<TokenKind>) -> String {
    let slice = lex.slice();
    slice[1..slice.len() - 1].replace("\"\"", "\"")
}

impl TokenKind {
    /// Short human-readable description for error messages.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Identifier(name) => format!("identifier '{name}'"),
            TokenKind::Number(value) => format!("number {value}"),
            TokenKind::String(_) => "string literal".to_string(),
            TokenKind::Newline => "end of line".to_string(),
            TokenKind::Eof => "end of file".to_string(),
            other => format!("{other:?}").to_lowercase(),
        }
    }

    /// Reserved words and directives.
    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            TokenKind::If
                | TokenKind::Then
                | TokenKind::Else
                | TokenKind::End
                | TokenKind::While
                | TokenKind::For
                | TokenKind::In
                | TokenKind::Function
                | TokenKind::Return
                | TokenKind::Break
                | TokenKind::Continue
                | TokenKind::And
                | TokenKind::Or
                | TokenKind::Not
                | TokenKind::Isa
                | TokenKind::New
                | TokenKind::True
                | TokenKind::False
                | TokenKind::Null
                | TokenKind::HashInclude
                | TokenKind::HashImport
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

/// Maps byte offsets to line/character positions. Characters are counted in
/// UTF-16 code units, the unit editors use for columns. Offsets must be
/// requested in non-decreasing order.
struct Cursor<'a> {
    source: &'a str,
    offset: usize,
    position: Position,
}

impl<'a> Cursor<'a> {
    fn new(source: &'a str) -> Self {
        Cursor {
            source,
            offset: 0,
            position: Position::new(0, 0),
        }
    }

    fn advance_to(&mut self, offset: usize) -> Position {
        if let Some(skipped) = self.source.get(self.offset..offset) {
            for ch in skipped.chars() {
                if ch == '\n' {
                    self.position.line += 1;
                    self.position.character = 0;
                } else {
                    self.position.character += ch.len_utf16() as u32;
                }
            }
            self.offset = offset;
        }
        self.position
    }
}

/// Converts source text into tokens. Never fails: malformed input yields
/// [`TokenKind::Error`] tokens and a [`SyntaxError`] per problem.
pub struct Lexer<'a> {
    source: &'a str,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Lexer { source }
    }

    /// Tokenize the whole input. The last token is always [`TokenKind::Eof`].
    pub fn tokenize(self) -> (Vec<Token>, Vec<SyntaxError>) {
        let mut cursor = Cursor::new(self.source);
        let mut tokens = Vec::new();
        let mut errors = Vec::new();

        for (result, range) in TokenKind::lexer(self.source).spanned() {
            let start = cursor.advance_to(range.start);
            let end = cursor.advance_to(range.end);
            let span = Span::new(start, end);

            let kind = match result {
                Ok(kind) => kind,
                Err(err) => {
                    let slice = &self.source[range];
                    errors.push(SyntaxError {
                        kind: SyntaxErrorKind::Lexer,
                        message: describe_error(&err, slice),
                        span,
                    });
                    TokenKind::Error
                }
            };
            tokens.push(Token { kind, span });
        }

        let end = cursor.advance_to(self.source.len());
        tokens.push(Token {
            kind: TokenKind::Eof,
            span: Span::new(end, end),
        });
        (tokens, errors)
    }
}

fn describe_error(err: &LexError, slice: &str) -> String {
    match err {
        LexError::UnexpectedCharacter => format!("unexpected character '{slice}'"),
        LexError::UnterminatedString => "unterminated string literal".to_string(),
        LexError::InvalidNumber => format!("invalid number '{slice}'"),
        LexError::UnknownDirective => format!("unknown directive '{slice}'"),
    }
}
