use crate::core::ActiveDocument;
use crate::features::span_to_range;
use crate::syntax::{Expression, ExpressionKind, Statement, StatementKind};
use lsp_types::*;

/// Provides document symbols (outline view)
#[derive(Clone, Default)]
pub struct SymbolsProvider;

impl SymbolsProvider {
    pub fn new() -> Self {
        Self
    }

    pub fn provide(&self, document: &ActiveDocument) -> Vec<DocumentSymbol> {
        match document.parsed_payload.as_deref() {
            Some(chunk) => self.extract_symbols(&chunk.body),
            None => Vec::new(),
        }
    }

    /// Symbols declared in a block. Control-flow bodies do not open a scope,
    /// so their declarations are flattened into the enclosing list.
    fn extract_symbols(&self, body: &[Statement]) -> Vec<DocumentSymbol> {
        let mut symbols = Vec::new();
        for statement in body {
            match &statement.kind {
                StatementKind::Assignment { target, value, .. } => {
                    symbols.extend(self.extract_assignment(statement, target, value));
                }
                StatementKind::Import { path, alias } => {
                    symbols.push(symbol(
                        alias.name.clone(),
                        SymbolKind::MODULE,
                        Some(format!("import \"{path}\"")),
                        span_to_range(statement.span),
                        span_to_range(alias.span),
                        Vec::new(),
                    ));
                }
                StatementKind::For { variable, body, .. } => {
                    symbols.push(symbol(
                        variable.name.clone(),
                        SymbolKind::VARIABLE,
                        None,
                        span_to_range(variable.span),
                        span_to_range(variable.span),
                        Vec::new(),
                    ));
                    symbols.extend(self.extract_symbols(body));
                }
                StatementKind::If { clauses, else_body } => {
                    for clause in clauses {
                        symbols.extend(self.extract_symbols(&clause.body));
                    }
                    if let Some(else_body) = else_body {
                        symbols.extend(self.extract_symbols(else_body));
                    }
                }
                StatementKind::While { body, .. } => symbols.extend(self.extract_symbols(body)),
                _ => {}
            }
        }
        symbols
    }

    fn extract_assignment(
        &self,
        statement: &Statement,
        target: &Expression,
        value: &Expression,
    ) -> Option<DocumentSymbol> {
        let name = target_name(target)?;
        let is_member = matches!(target.kind, ExpressionKind::Member { .. });

        let (kind, detail, children) = match &value.kind {
            ExpressionKind::Function(function) => {
                let parameters: Vec<&str> = function
                    .parameters
                    .iter()
                    .map(|p| p.name.name.as_str())
                    .collect();
                let kind = if is_member {
                    SymbolKind::METHOD
                } else {
                    SymbolKind::FUNCTION
                };
                (
                    kind,
                    Some(format!("function({})", parameters.join(", "))),
                    self.extract_symbols(&function.body),
                )
            }
            ExpressionKind::Map(entries) => {
                let children = entries
                    .iter()
                    .filter_map(|entry| {
                        let ExpressionKind::String(key) = &entry.key.kind else {
                            return None;
                        };
                        let kind = match entry.value.kind {
                            ExpressionKind::Function(_) => SymbolKind::METHOD,
                            _ => SymbolKind::FIELD,
                        };
                        Some(symbol(
                            key.clone(),
                            kind,
                            None,
                            span_to_range(entry.key.span.to(entry.value.span)),
                            span_to_range(entry.key.span),
                            Vec::new(),
                        ))
                    })
                    .collect();
                (SymbolKind::OBJECT, None, children)
            }
            _ if is_member => (SymbolKind::FIELD, None, Vec::new()),
            _ => (SymbolKind::VARIABLE, None, Vec::new()),
        };

        Some(symbol(
            name,
            kind,
            detail,
            span_to_range(statement.span),
            span_to_range(target.span),
            children,
        ))
    }
}

/// `a` for `a = ...`, `a.b` for `a.b = ...`. Indexed targets have no name.
fn target_name(target: &Expression) -> Option<String> {
    match &target.kind {
        ExpressionKind::Identifier(name) => Some(name.clone()),
        ExpressionKind::Member { base, name } => Some(format!("{}.{}", target_name(base)?, name.name)),
        _ => None,
    }
}

#[allow(deprecated)]
fn symbol(
    name: String,
    kind: SymbolKind,
    detail: Option<String>,
    range: Range,
    selection_range: Range,
    children: Vec<DocumentSymbol>,
) -> DocumentSymbol {
    DocumentSymbol {
        name,
        detail,
        kind,
        tags: None,
        deprecated: None,
        range,
        selection_range,
        children: if children.is_empty() {
            None
        } else {
            Some(children)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DocumentManager, DocumentMergerCache, TextDocument};
    use crate::testing::MockFileSystem;
    use std::sync::Arc;
    use std::time::Duration;

    fn symbols_for(text: &str) -> Vec<DocumentSymbol> {
        let manager = DocumentManager::new(
            Arc::new(MockFileSystem::new()),
            Arc::new(DocumentMergerCache::new()),
            Vec::new(),
            Duration::from_millis(50),
        );
        let document = manager.get(&Arc::new(TextDocument::new("file:///a.ms", 1, text)));
        SymbolsProvider::new().provide(&document)
    }

    fn names(symbols: &[DocumentSymbol]) -> Vec<&str> {
        symbols.iter().map(|s| s.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_symbols_empty_document() {
        assert!(symbols_for("").is_empty());
    }

    #[tokio::test]
    async fn test_symbol_kinds() {
        let symbols = symbols_for(
            "x = 1\nadd = function(a, b)\n  return a + b\nend function\nimport \"lib\" as lib",
        );
        assert_eq!(names(&symbols), vec!["x", "add", "lib"]);
        assert_eq!(symbols[0].kind, SymbolKind::VARIABLE);
        assert_eq!(symbols[1].kind, SymbolKind::FUNCTION);
        assert_eq!(symbols[1].detail.as_deref(), Some("function(a, b)"));
        assert_eq!(symbols[1].range.end.line, 3);
        assert_eq!(symbols[2].kind, SymbolKind::MODULE);
    }

    #[tokio::test]
    async fn test_symbols_nested_functions() {
        let symbols = symbols_for("outer = function()\n  inner = 2\n  helper = function()\n  end function\nend function");
        assert_eq!(names(&symbols), vec!["outer"]);
        let children = symbols[0].children.as_deref().unwrap();
        assert_eq!(names(children), vec!["inner", "helper"]);
        assert_eq!(children[1].kind, SymbolKind::FUNCTION);
    }

    #[tokio::test]
    async fn test_symbols_inside_control_flow_are_flattened() {
        let symbols = symbols_for("if true then\n  a = 1\nelse\n  b = 2\nend if\nfor i in range(3)\n  c = i\nend for");
        assert_eq!(names(&symbols), vec!["a", "b", "i", "c"]);
    }

    #[tokio::test]
    async fn test_map_literal_and_member_assignments() {
        let symbols = symbols_for("Dog = {\"name\": \"rex\", \"bark\": function()\nend function}\nDog.age = 3");
        assert_eq!(names(&symbols), vec!["Dog", "Dog.age"]);
        assert_eq!(symbols[0].kind, SymbolKind::OBJECT);
        let children = symbols[0].children.as_deref().unwrap();
        assert_eq!(names(children), vec!["name", "bark"]);
        assert_eq!(children[1].kind, SymbolKind::METHOD);
        assert_eq!(symbols[1].kind, SymbolKind::FIELD);
    }

    #[tokio::test]
    async fn test_selection_range_is_the_name() {
        let symbols = symbols_for("  total = 10");
        assert_eq!(symbols[0].selection_range.start, Position::new(0, 2));
        assert_eq!(symbols[0].selection_range.end, Position::new(0, 7));
    }
}
