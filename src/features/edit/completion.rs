use crate::core::LookupHelper;
use crate::features::{from_lsp_position, text_before};
use crate::syntax::{Lexer, Parser};
use crate::types::{Entity, EntityKind};
use lsp_types::*;
use std::collections::BTreeMap;

const KEYWORDS: &[(&str, &str)] = &[
    ("if", "If statement"),
    ("then", "Then clause"),
    ("else", "Else clause"),
    ("end", "End block"),
    ("while", "While loop"),
    ("for", "For loop"),
    ("in", "For-in iteration"),
    ("function", "Function literal"),
    ("return", "Return statement"),
    ("break", "Break out of a loop"),
    ("continue", "Continue to the next iteration"),
    ("and", "Logical and"),
    ("or", "Logical or"),
    ("not", "Logical not"),
    ("isa", "Type check"),
    ("new", "Create a map deriving from another"),
    ("true", "Boolean true"),
    ("false", "Boolean false"),
    ("null", "Null value"),
    ("include", "Inline another file's declarations"),
    ("import", "Import another file under an alias"),
];

/// Provides code completion
#[derive(Clone, Default)]
pub struct CompletionProvider;

impl CompletionProvider {
    pub fn new() -> Self {
        Self
    }

    pub async fn provide(&self, helper: &LookupHelper, position: Position) -> Vec<CompletionItem> {
        let before_cursor = helper
            .document()
            .text_document
            .line(position.line)
            .map(|line| text_before(line, position.character))
            .unwrap_or_default();

        match Self::get_completion_context(&before_cursor) {
            CompletionContext::None => Vec::new(),
            CompletionContext::MemberAccess(base) => {
                self.complete_members(helper, &base, position).await
            }
            CompletionContext::Statement => {
                let mut items = self.complete_identifiers(helper, position).await;
                items.extend(Self::complete_keywords());
                items
            }
        }
    }

    /// Determine what kind of completion is needed from the text before the cursor
    fn get_completion_context(before_cursor: &str) -> CompletionContext {
        if in_comment_or_string(before_cursor) {
            return CompletionContext::None;
        }

        let partial = before_cursor.trim_end_matches(is_identifier_char);
        let Some(base) = partial.strip_suffix('.') else {
            return CompletionContext::Statement;
        };
        match member_base(base) {
            Some(base) => CompletionContext::MemberAccess(base),
            None => CompletionContext::None,
        }
    }

    async fn complete_members(
        &self,
        helper: &LookupHelper,
        base: &str,
        position: Position,
    ) -> Vec<CompletionItem> {
        let expression = Parser::new(Lexer::new(base).tokenize().0).parse_expression();
        let map = helper.get_type_map().await;
        let scope = map.scope_at(from_lsp_position(position));

        let Some(entity) = map.resolve(&expression, scope) else {
            tracing::debug!("No members for unresolved base `{}`", base);
            return Vec::new();
        };
        Self::to_items(map.members_of(&entity.ty))
    }

    async fn complete_identifiers(&self, helper: &LookupHelper, position: Position) -> Vec<CompletionItem> {
        let visible = helper
            .find_all_available_identifier_related_to_position(from_lsp_position(position))
            .await;
        Self::to_items(visible)
    }

    fn complete_keywords() -> impl Iterator<Item = CompletionItem> {
        KEYWORDS.iter().map(|(keyword, detail)| CompletionItem {
            label: keyword.to_string(),
            kind: Some(CompletionItemKind::KEYWORD),
            detail: Some(detail.to_string()),
            ..Default::default()
        })
    }

    fn to_items(entities: BTreeMap<String, Entity>) -> Vec<CompletionItem> {
        entities
            .into_iter()
            .map(|(name, entity)| CompletionItem {
                label: name,
                kind: Some(completion_kind(&entity)),
                detail: Some(entity.signature_label()),
                documentation: entity
                    .documentation
                    .map(|doc| Documentation::String(doc.to_string())),
                ..Default::default()
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum CompletionContext {
    /// Inside a comment or string literal
    None,
    /// After `base.`
    MemberAccess(String),
    Statement,
}

fn completion_kind(entity: &Entity) -> CompletionItemKind {
    match entity.kind {
        EntityKind::Namespace => CompletionItemKind::MODULE,
        EntityKind::Property if entity.ty.is_callable() => CompletionItemKind::METHOD,
        EntityKind::Property => CompletionItemKind::PROPERTY,
        _ if entity.ty.is_callable() => CompletionItemKind::FUNCTION,
        EntityKind::Builtin => CompletionItemKind::CONSTANT,
        EntityKind::Function | EntityKind::Variable | EntityKind::Parameter => {
            CompletionItemKind::VARIABLE
        }
    }
}

pub(crate) fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

pub(crate) fn in_comment_or_string(text: &str) -> bool {
    let mut in_string = false;
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => in_string = !in_string,
            '/' if !in_string && chars.peek() == Some(&'/') => return true,
            _ => {}
        }
    }
    in_string
}

/// The expression text ending right before a `.`, e.g. `a.b[1]` in `x = a.b[1].`
pub(crate) fn member_base(text: &str) -> Option<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut start = chars.len();
    let mut depth = 0usize;
    while start > 0 {
        match chars[start - 1] {
            ')' | ']' => depth += 1,
            '(' | '[' => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
            }
            _ if depth > 0 => {}
            c if is_identifier_char(c) || c == '.' => {}
            _ => break,
        }
        start -= 1;
    }

    let base: String = chars[start..].iter().collect();
    if depth > 0 || base.is_empty() || base.starts_with('.') {
        return None;
    }
    Some(base)
}
