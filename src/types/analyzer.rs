use super::document::TypeDocument;
use super::entity::{Entity, EntityKind, ParameterInfo, Signature, Type};
use crate::syntax::{
    AssignmentOperator, Chunk, Expression, ExpressionKind, FunctionLiteral, ScopeId, Span,
    Statement, StatementKind, ROOT_SCOPE,
};

/// Build the type model of one parsed document.
///
/// Deterministic and side-effect free: the same chunk always yields an equal
/// [`TypeDocument`].
pub fn analyze(uri: &str, chunk: &Chunk) -> TypeDocument {
    let mut analyzer = Analyzer {
        document: TypeDocument::with_scopes(uri, chunk.scope_count, chunk.span),
        uri: uri.to_string(),
        returns: Vec::new(),
    };
    analyzer.visit_block(&chunk.body, ROOT_SCOPE);
    analyzer.document
}

struct Analyzer {
    document: TypeDocument,
    uri: String,
    /// Return types seen in each enclosing function body, innermost last.
    returns: Vec<Vec<Type>>,
}

impl Analyzer {
    fn visit_block(&mut self, body: &[Statement], scope: ScopeId) {
        for statement in body {
            self.visit_statement(statement, scope);
        }
    }

    fn visit_statement(&mut self, statement: &Statement, scope: ScopeId) {
        match &statement.kind {
            StatementKind::Assignment {
                target,
                operator,
                value,
            } => {
                self.visit_subexpressions(target, scope);
                let value_type = self.visit_expression(value, scope);
                let ty = match operator {
                    AssignmentOperator::Assign => value_type,
                    _ => {
                        // Compound assignment keeps a known type, otherwise takes the operand's
                        let current = self.document.infer(target, scope);
                        if current.is_any() {
                            value_type
                        } else {
                            current
                        }
                    }
                };
                self.assign(target, ty, scope);
            }
            StatementKind::Expression(expression) => {
                self.visit_expression(expression, scope);
            }
            StatementKind::If { clauses, else_body } => {
                for clause in clauses {
                    self.visit_expression(&clause.condition, scope);
                    self.visit_block(&clause.body, scope);
                }
                if let Some(else_body) = else_body {
                    self.visit_block(else_body, scope);
                }
            }
            StatementKind::While { condition, body } => {
                self.visit_expression(condition, scope);
                self.visit_block(body, scope);
            }
            StatementKind::For {
                variable,
                iterable,
                body,
            } => {
                let element = match self.visit_expression(iterable, scope) {
                    Type::List(element) => *element,
                    Type::String => Type::String,
                    Type::Map(_) => Type::Map(Default::default()),
                    _ => Type::Any,
                };
                self.define(scope, &variable.name, EntityKind::Variable, element, variable.span);
                self.visit_block(body, scope);
            }
            StatementKind::Return(value) => {
                let ty = match value {
                    Some(value) => self.visit_expression(value, scope),
                    None => Type::Null,
                };
                if let Some(returns) = self.returns.last_mut() {
                    returns.push(ty);
                }
            }
            StatementKind::Import { alias, .. } => {
                // Placeholder; merging fills in the imported exports
                self.define(scope, &alias.name, EntityKind::Namespace, Type::Any, alias.span);
            }
            StatementKind::Break | StatementKind::Continue | StatementKind::Include { .. } => {}
        }
    }

    /// Analyze nested function literals inside `expression`, then infer its type.
    fn visit_expression(&mut self, expression: &Expression, scope: ScopeId) -> Type {
        if let ExpressionKind::Function(function) = &expression.kind {
            return Type::Function(self.visit_function(function, expression.span, scope));
        }
        self.visit_subexpressions(expression, scope);
        self.document.infer(expression, scope)
    }

    fn visit_subexpressions(&mut self, expression: &Expression, scope: ScopeId) {
        match &expression.kind {
            ExpressionKind::Identifier(_)
            | ExpressionKind::Number(_)
            | ExpressionKind::String(_)
            | ExpressionKind::Boolean(_)
            | ExpressionKind::Null
            | ExpressionKind::Invalid => {}
            ExpressionKind::List(items) => {
                for item in items {
                    self.visit_expression(item, scope);
                }
            }
            ExpressionKind::Map(entries) => {
                for entry in entries {
                    self.visit_expression(&entry.key, scope);
                    self.visit_expression(&entry.value, scope);
                }
            }
            ExpressionKind::Member { base, .. } => {
                self.visit_expression(base, scope);
            }
            ExpressionKind::Index { base, index } => {
                self.visit_expression(base, scope);
                self.visit_expression(index, scope);
            }
            ExpressionKind::Slice { base, from, to } => {
                self.visit_expression(base, scope);
                for bound in [from, to].into_iter().flatten() {
                    self.visit_expression(bound, scope);
                }
            }
            ExpressionKind::Call { callee, arguments } => {
                self.visit_expression(callee, scope);
                for argument in arguments {
                    self.visit_expression(argument, scope);
                }
            }
            ExpressionKind::Binary { left, right, .. } => {
                self.visit_expression(left, scope);
                self.visit_expression(right, scope);
            }
            ExpressionKind::Unary { operand, .. } => {
                self.visit_expression(operand, scope);
            }
            ExpressionKind::Function(function) => {
                self.visit_function(function, expression.span, scope);
            }
        }
    }

    fn visit_function(&mut self, function: &FunctionLiteral, span: Span, parent: ScopeId) -> Signature {
        let mut parameters = Vec::with_capacity(function.parameters.len());
        for parameter in &function.parameters {
            let default = parameter
                .default
                .as_ref()
                .map(|default| self.visit_expression(default, parent));
            parameters.push(ParameterInfo {
                name: parameter.name.name.clone(),
                default: default.clone(),
            });
            if !parameter.name.name.is_empty() {
                self.define(
                    function.scope,
                    &parameter.name.name,
                    EntityKind::Parameter,
                    default.unwrap_or_default(),
                    parameter.name.span,
                );
            }
        }

        if let Some(scope) = self.document.scope_mut(function.scope) {
            scope.parent = Some(parent);
            scope.span = span;
        }

        self.returns.push(Vec::new());
        self.visit_block(&function.body, function.scope);
        let returns = self.returns.pop().unwrap_or_default();

        let returns = if returns.is_empty() {
            Type::Null
        } else {
            returns
                .iter()
                .find(|ty| !ty.is_any())
                .cloned()
                .unwrap_or_default()
        };

        let signature = Signature::new(parameters, returns);
        if let Some(scope) = self.document.scope_mut(function.scope) {
            scope.signature = Some(signature.clone());
        }
        signature
    }

    /// Bind the result of an assignment to its target.
    fn assign(&mut self, target: &Expression, ty: Type, scope: ScopeId) {
        let kind = if ty.is_callable() {
            EntityKind::Function
        } else {
            EntityKind::Variable
        };

        match &target.kind {
            ExpressionKind::Identifier(name) => {
                self.define(scope, name, kind, ty, target.span);
            }
            ExpressionKind::Member { base, name } => {
                self.assign_property(base, &name.name, name.span, ty, scope);
            }
            ExpressionKind::Index { base, index } => {
                if let ExpressionKind::String(key) = &index.kind {
                    self.assign_property(base, key, index.span, ty, scope);
                }
            }
            _ => {}
        }
    }

    fn assign_property(&mut self, base: &Expression, name: &str, span: Span, ty: Type, scope: ScopeId) {
        if name.is_empty() {
            return;
        }

        // `globals.x = ...` and friends declare variables in the named scope
        if let ExpressionKind::Identifier(base_name) = &base.kind {
            if let Some(target) = self.document.scope_keyword(base_name, scope) {
                let kind = if ty.is_callable() {
                    EntityKind::Function
                } else {
                    EntityKind::Variable
                };
                self.define(target, name, kind, ty, span);
                return;
            }
        }

        let kind = if ty.is_callable() {
            EntityKind::Function
        } else {
            EntityKind::Property
        };
        let source = Entity::new(name, kind, ty).with_source(&self.uri, span);

        let Some(path) = member_path(base) else {
            return;
        };
        let Some(owner) = self.find_entity_mut(&path, scope) else {
            return;
        };
        let Some(map) = owner.ty.as_map_mut() else {
            return;
        };

        match map.properties.get_mut(name) {
            Some(existing) => {
                existing.absorb_sources(&source);
                if !source.ty.is_any() {
                    existing.ty = source.ty;
                    existing.kind = source.kind;
                }
            }
            None => {
                map.properties.insert(name.to_string(), source);
            }
        }
    }

    /// Walk `path` (`a.b.c` as `["a", "b", "c"]`) to a mutable entity.
    fn find_entity_mut(&mut self, path: &[&str], scope: ScopeId) -> Option<&mut Entity> {
        let (first, rest) = path.split_first()?;
        let owner_scope = self
            .document
            .scope_chain(scope)
            .into_iter()
            .find(|id| {
                self.document
                    .scope(*id)
                    .is_some_and(|s| s.entities.contains_key(*first))
            })?;

        let mut entity = self
            .document
            .scope_mut(owner_scope)?
            .entities
            .get_mut(*first)?;
        for segment in rest {
            entity = entity.ty.as_map_mut()?.properties.get_mut(*segment)?;
        }
        Some(entity)
    }

    fn define(&mut self, scope: ScopeId, name: &str, kind: EntityKind, ty: Type, span: Span) {
        let uri = self.uri.clone();
        let Some(scope) = self.document.scope_mut(scope) else {
            return;
        };
        match scope.entities.get_mut(name) {
            Some(existing) => {
                existing.absorb_sources(&Entity::anonymous(Type::Any).with_source(&uri, span));
                // A later assignment refines the type unless it is unknown
                if !ty.is_any() {
                    existing.ty = ty;
                    if existing.kind != EntityKind::Parameter {
                        existing.kind = kind;
                    }
                }
            }
            None => {
                scope
                    .entities
                    .insert(name.to_string(), Entity::new(name, kind, ty).with_source(&uri, span));
            }
        }
    }
}

/// `a.b["c"]` as `["a", "b", "c"]`; `None` for anything but identifiers and
/// member/string-index chains.
fn member_path(expression: &Expression) -> Option<Vec<&str>> {
    match &expression.kind {
        ExpressionKind::Identifier(name) => Some(vec![name.as_str()]),
        ExpressionKind::Member { base, name } => {
            let mut path = member_path(base)?;
            path.push(name.name.as_str());
            Some(path)
        }
        ExpressionKind::Index { base, index } => match &index.kind {
            ExpressionKind::String(key) => {
                let mut path = member_path(base)?;
                path.push(key.as_str());
                Some(path)
            }
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{parse, Position};

    fn analyze_source(source: &str) -> TypeDocument {
        let result = parse(source);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        analyze("file:///test.ms", &result.chunk)
    }

    fn root_type(doc: &TypeDocument, name: &str) -> Option<Type> {
        doc.root().entities.get(name).map(|e| e.ty.clone())
    }

    #[test]
    fn test_literal_types() {
        let doc = analyze_source("a = 1\nb = \"s\"\nc = [1]\nd = {}\ne = null\nf = true");
        assert_eq!(root_type(&doc, "a"), Some(Type::Number));
        assert_eq!(root_type(&doc, "b"), Some(Type::String));
        assert_eq!(root_type(&doc, "c"), Some(Type::List(Box::new(Type::Number))));
        assert!(matches!(root_type(&doc, "d"), Some(Type::Map(_))));
        assert_eq!(root_type(&doc, "e"), Some(Type::Null));
        assert_eq!(root_type(&doc, "f"), Some(Type::Number));
    }

    #[test]
    fn test_function_signature_and_locals() {
        let doc = analyze_source("add = function(a, b = 2)\n  total = a + b\n  return total\nend function");
        let add = doc.root().entities.get("add").cloned();
        let add = add.map(|e| (e.kind, e.ty.to_string()));
        assert_eq!(
            add,
            Some((
                EntityKind::Function,
                "function(a, b: number = ...) -> number".to_string()
            ))
        );

        let scope = doc.scope(1).map(|s| s.entities.keys().cloned().collect::<Vec<_>>());
        assert_eq!(scope, Some(vec!["a".to_string(), "b".to_string(), "total".to_string()]));
        assert!(!doc.root().entities.contains_key("total"));
    }

    #[test]
    fn test_function_without_return_yields_null() {
        let doc = analyze_source("f = function\nend function");
        match root_type(&doc, "f") {
            Some(Type::Function(signature)) => assert_eq!(*signature.returns, Type::Null),
            other => panic!("expected function, got {other:?}"),
        }
    }

    #[test]
    fn test_reassignment_records_every_source() {
        let doc = analyze_source("x = 1\nx = \"two\"");
        let x = doc.root().entities.get("x").cloned();
        let lines: Option<Vec<u32>> = x
            .as_ref()
            .map(|e| e.sources.iter().map(|s| s.span.start.line).collect());
        assert_eq!(lines, Some(vec![0, 1]));
        assert_eq!(x.map(|e| e.ty), Some(Type::String));
    }

    #[test]
    fn test_member_assignment_adds_property() {
        let doc = analyze_source("obj = {}\nobj.greet = function\nend function\nobj[\"count\"] = 3");
        let obj = doc.root().entities.get("obj").cloned();
        let properties = obj
            .and_then(|e| e.ty.as_map().cloned())
            .map(|m| {
                m.properties
                    .values()
                    .map(|p| (p.name.clone(), p.kind))
                    .collect::<Vec<_>>()
            });
        assert_eq!(
            properties,
            Some(vec![
                ("count".to_string(), EntityKind::Property),
                ("greet".to_string(), EntityKind::Function),
            ])
        );
    }

    #[test]
    fn test_nested_member_assignment() {
        let doc = analyze_source("a = {\"b\": {}}\na.b.c = 1");
        let a = doc.root().entities.get("a").cloned();
        let c = a
            .and_then(|a| a.ty.as_map().and_then(|m| m.get("b").cloned()))
            .and_then(|b| b.ty.as_map().and_then(|m| m.get("c").cloned()));
        assert_eq!(c.map(|c| c.ty), Some(Type::Number));
    }

    #[test]
    fn test_globals_assignment_from_function() {
        let doc = analyze_source("f = function\n  globals.shared = 1\n  locals.mine = 2\nend function");
        assert!(doc.root().entities.contains_key("shared"));
        assert!(doc.scope(1).is_some_and(|s| s.entities.contains_key("mine")));
    }

    #[test]
    fn test_for_loop_variable() {
        let doc = analyze_source("for name in [\"a\", \"b\"]\nend for");
        assert_eq!(root_type(&doc, "name"), Some(Type::String));
    }

    #[test]
    fn test_import_alias_is_namespace_placeholder() {
        let doc = analyze_source("import \"lib.ms\" as mathlib");
        let alias = doc.root().entities.get("mathlib").cloned();
        assert_eq!(alias.map(|e| (e.kind, e.ty)), Some((EntityKind::Namespace, Type::Any)));
    }

    #[test]
    fn test_sources_point_at_targets() {
        let doc = analyze_source("\n  value = 1");
        let value = doc.root().entities.get("value").cloned();
        assert_eq!(
            value.and_then(|e| e.declaration().map(|s| s.span.start)),
            Some(Position::new(1, 2))
        );
    }

    #[test]
    fn test_analysis_is_deterministic() {
        let source = "a = {\"x\": 1}\nf = function(p)\n  return p\nend function";
        assert_eq!(analyze_source(source), analyze_source(source));
    }
}
