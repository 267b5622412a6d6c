//! Full-document semantic tokens.
//!
//! Keywords and literals come straight from the lexer. Identifiers come from
//! the AST and are classified against the merged type view, so a function
//! pulled in by `include` is highlighted as a function even though this file
//! never declares it.

use crate::core::LookupHelper;
use crate::syntax::{
    AssignmentOperator, Chunk, ExpressionKind, Lexer, NodeRef, ScopeId, Span, StatementKind,
    TokenKind, ROOT_SCOPE,
};
use crate::types::{Entity, EntityKind, TypeDocument};
use lsp_types::{
    SemanticToken, SemanticTokenModifier, SemanticTokenType, SemanticTokens, SemanticTokensLegend,
};

/// Legend order; a token's type is its index here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenType {
    Namespace,
    Function,
    Method,
    Parameter,
    Variable,
    Property,
    Keyword,
    String,
    Number,
}

const TOKEN_TYPES: [SemanticTokenType; 9] = [
    SemanticTokenType::NAMESPACE,
    SemanticTokenType::FUNCTION,
    SemanticTokenType::METHOD,
    SemanticTokenType::PARAMETER,
    SemanticTokenType::VARIABLE,
    SemanticTokenType::PROPERTY,
    SemanticTokenType::KEYWORD,
    SemanticTokenType::STRING,
    SemanticTokenType::NUMBER,
];

const DECLARATION: u32 = 1 << 0;
const DEFAULT_LIBRARY: u32 = 1 << 1;

/// A token at an absolute position, before delta encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AbsoluteToken {
    line: u32,
    start: u32,
    length: u32,
    token_type: TokenType,
    modifiers: u32,
}

impl AbsoluteToken {
    /// `None` for empty or multi-line spans, which editors cannot take.
    fn new(span: Span, token_type: TokenType, modifiers: u32) -> Option<Self> {
        if span.start.line != span.end.line || span.end.character <= span.start.character {
            return None;
        }
        Some(Self {
            line: span.start.line,
            start: span.start.character,
            length: span.end.character - span.start.character,
            token_type,
            modifiers,
        })
    }
}

/// Provides semantic tokens for a whole document
#[derive(Clone, Default)]
pub struct SemanticTokensProvider;

impl SemanticTokensProvider {
    pub fn new() -> Self {
        Self
    }

    pub fn legend() -> SemanticTokensLegend {
        SemanticTokensLegend {
            token_types: TOKEN_TYPES.to_vec(),
            token_modifiers: vec![
                SemanticTokenModifier::DECLARATION,
                SemanticTokenModifier::DEFAULT_LIBRARY,
            ],
        }
    }

    pub async fn provide_full(&self, helper: &LookupHelper) -> SemanticTokens {
        let document = helper.document();
        let chunk = document.parsed_payload.as_deref();

        let directives: Vec<Span> = chunk
            .map(|chunk| chunk.dependencies.iter().map(|directive| directive.span).collect())
            .unwrap_or_default();
        let mut tokens = lexical_tokens(&document.text_document.text, &directives);
        if let Some(chunk) = chunk {
            let map = helper.get_type_map().await;
            tokens.extend(identifier_tokens(chunk, &map));
        }

        SemanticTokens {
            result_id: None,
            data: encode(tokens),
        }
    }
}

fn lexical_tokens(text: &str, directives: &[Span]) -> Vec<AbsoluteToken> {
    let (tokens, _) = Lexer::new(text).tokenize();
    tokens
        .into_iter()
        .filter_map(|token| {
            let token_type = match &token.kind {
                TokenKind::String(_) => TokenType::String,
                TokenKind::Number(_) => TokenType::Number,
                TokenKind::Identifier(word) if is_directive_word(word, token.span, directives) => {
                    TokenType::Keyword
                }
                kind if kind.is_keyword() => TokenType::Keyword,
                _ => return None,
            };
            AbsoluteToken::new(token.span, token_type, 0)
        })
        .collect()
}

/// `include`/`import` opening a directive, and the `as`/`from` inside one.
fn is_directive_word(word: &str, span: Span, directives: &[Span]) -> bool {
    directives.iter().any(|directive| {
        directive.start == span.start
            || (matches!(word, "as" | "from") && directive.contains(span.start))
    })
}

fn identifier_tokens(chunk: &Chunk, map: &TypeDocument) -> Vec<AbsoluteToken> {
    let mut tokens = Vec::new();
    let mut push = |span: Span, (token_type, modifiers): (TokenType, u32)| {
        tokens.extend(AbsoluteToken::new(span, token_type, modifiers));
    };

    let mut pending: Vec<(NodeRef<'_>, ScopeId)> = chunk.roots().map(|node| (node, ROOT_SCOPE)).collect();
    while let Some((node, scope)) = pending.pop() {
        let inner = node.introduced_scope().unwrap_or(scope);
        let mut children = node.children();

        match node {
            NodeRef::Statement(statement) => match &statement.kind {
                StatementKind::Assignment {
                    target,
                    operator: AssignmentOperator::Assign,
                    ..
                } => {
                    if let ExpressionKind::Identifier(name) = &target.kind {
                        let (token_type, modifiers) = classify(map.lookup(name, scope));
                        push(target.span, (token_type, modifiers | DECLARATION));
                        children.retain(|child| *child != NodeRef::Expression(target));
                    }
                }
                StatementKind::For { variable, .. } => {
                    push(variable.span, (TokenType::Variable, DECLARATION));
                }
                StatementKind::Import { alias, .. } => {
                    push(alias.span, (TokenType::Namespace, DECLARATION));
                }
                _ => {}
            },
            NodeRef::Expression(expression) => match &expression.kind {
                ExpressionKind::Identifier(name) => {
                    push(expression.span, classify(map.lookup(name, scope)));
                }
                ExpressionKind::Member { name, .. } => {
                    let callable = map
                        .resolve(expression, scope)
                        .is_some_and(|entity| entity.ty.is_callable());
                    let token_type = if callable {
                        TokenType::Method
                    } else {
                        TokenType::Property
                    };
                    push(name.span, (token_type, 0));
                }
                _ => {}
            },
            NodeRef::Parameter(parameter) => {
                push(parameter.name.span, (TokenType::Parameter, DECLARATION));
            }
        }

        pending.extend(children.into_iter().map(|child| (child, inner)));
    }
    tokens
}

fn classify(entity: Option<&Entity>) -> (TokenType, u32) {
    let Some(entity) = entity else {
        return (TokenType::Variable, 0);
    };
    match entity.kind {
        EntityKind::Namespace => (TokenType::Namespace, 0),
        EntityKind::Parameter => (TokenType::Parameter, 0),
        EntityKind::Builtin if entity.ty.is_callable() => (TokenType::Function, DEFAULT_LIBRARY),
        EntityKind::Builtin => (TokenType::Variable, DEFAULT_LIBRARY),
        _ if entity.ty.is_callable() => (TokenType::Function, 0),
        _ => (TokenType::Variable, 0),
    }
}

/// Sort and delta-encode: each token is relative to the previous one, with
/// the start column relative only while on the same line.
fn encode(mut tokens: Vec<AbsoluteToken>) -> Vec<SemanticToken> {
    tokens.sort_by_key(|token| (token.line, token.start));
    tokens.dedup_by_key(|token| (token.line, token.start));

    let mut encoded = Vec::with_capacity(tokens.len());
    let mut prev_line = 0;
    let mut prev_start = 0;
    for token in tokens {
        let delta_line = token.line - prev_line;
        let delta_start = if delta_line > 0 {
            token.start
        } else {
            token.start - prev_start
        };
        encoded.push(SemanticToken {
            delta_line,
            delta_start,
            length: token.length,
            token_type: token.token_type as u32,
            token_modifiers_bitset: token.modifiers,
        });
        prev_line = token.line;
        prev_start = token.start;
    }
    encoded
}
