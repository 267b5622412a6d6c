use super::builtins;
use super::entity::{Entity, EntityKind, MapType, Signature, Type};
use crate::syntax::{
    BinaryOperator, Expression, ExpressionKind, Position, ScopeId, Span, UnaryOperator,
    ROOT_SCOPE,
};
use std::collections::BTreeMap;

/// Variables declared directly in one scope.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Scope {
    pub id: ScopeId,
    pub parent: Option<ScopeId>,
    pub span: Span,
    pub entities: BTreeMap<String, Entity>,
    /// Signature of the function literal that owns this scope. `None` for the root.
    pub signature: Option<Signature>,
}

/// One input of [`TypeDocument::merge`].
#[derive(Debug, Clone, Copy)]
pub struct MergeInput<'a> {
    pub document: &'a TypeDocument,
    /// `Some(alias)` exposes the document's exports under `alias`;
    /// `None` flattens them into the root scope.
    pub namespace: Option<&'a str>,
}

impl<'a> MergeInput<'a> {
    pub fn flat(document: &'a TypeDocument) -> Self {
        Self {
            document,
            namespace: None,
        }
    }

    pub fn namespaced(document: &'a TypeDocument, namespace: &'a str) -> Self {
        Self {
            document,
            namespace: Some(namespace),
        }
    }
}

/// Per-document type model: a root scope plus one scope per function literal.
///
/// Immutable once built; [`TypeDocument::merge`] produces a new document.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDocument {
    uri: String,
    scopes: Vec<Scope>,
}

impl TypeDocument {
    /// A type model with nothing declared, used for documents without a parse tree.
    pub fn empty(uri: impl Into<String>) -> Self {
        Self::with_scopes(uri, 1, Span::default())
    }

    pub(crate) fn with_scopes(uri: impl Into<String>, scope_count: u32, root_span: Span) -> Self {
        let scopes = (0..scope_count.max(1))
            .map(|id| Scope {
                id,
                span: if id == ROOT_SCOPE {
                    root_span
                } else {
                    Span::default()
                },
                ..Scope::default()
            })
            .collect();
        Self {
            uri: uri.into(),
            scopes,
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn root(&self) -> &Scope {
        &self.scopes[ROOT_SCOPE as usize]
    }

    pub fn scope(&self, id: ScopeId) -> Option<&Scope> {
        self.scopes.get(id as usize)
    }

    pub(crate) fn scope_mut(&mut self, id: ScopeId) -> Option<&mut Scope> {
        self.scopes.get_mut(id as usize)
    }

    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    /// Innermost function scope whose body contains `position`.
    pub fn scope_at(&self, position: Position) -> ScopeId {
        self.scopes
            .iter()
            .skip(1)
            .filter(|scope| scope.span.contains(position))
            .max_by_key(|scope| scope.span.start)
            .map_or(ROOT_SCOPE, |scope| scope.id)
    }

    /// `scope` followed by its ancestors, ending at the root.
    pub fn scope_chain(&self, scope: ScopeId) -> Vec<ScopeId> {
        let mut chain = Vec::new();
        let mut current = self.scope(scope).map(|s| s.id);
        while let Some(id) = current {
            if chain.contains(&id) || chain.len() > self.scopes.len() {
                break;
            }
            chain.push(id);
            current = self.scope(id).and_then(|s| s.parent);
        }
        if chain.last() != Some(&ROOT_SCOPE) {
            chain.push(ROOT_SCOPE);
        }
        chain
    }

    /// Find `name` from `scope` outwards, falling back to runtime intrinsics.
    pub fn lookup(&self, name: &str, scope: ScopeId) -> Option<&Entity> {
        self.scope_chain(scope)
            .into_iter()
            .filter_map(|id| self.scope(id))
            .find_map(|s| s.entities.get(name))
            .or_else(|| builtins::globals().get(name))
    }

    /// Every name visible from `scope`; inner declarations shadow outer ones.
    pub fn visible_entities(&self, scope: ScopeId) -> BTreeMap<&str, &Entity> {
        let mut visible: BTreeMap<&str, &Entity> = builtins::globals()
            .iter()
            .map(|(name, entity)| (name.as_str(), entity))
            .collect();
        for id in self.scope_chain(scope).into_iter().rev() {
            if let Some(scope) = self.scope(id) {
                for (name, entity) in &scope.entities {
                    visible.insert(name.as_str(), entity);
                }
            }
        }
        visible
    }

    /// Root declarations, as seen through an import alias.
    pub fn exports(&self) -> MapType {
        MapType {
            properties: self.root().entities.clone(),
        }
    }

    /// Members accessible on a value of type `ty`: map properties, then intrinsic methods.
    pub fn members_of(&self, ty: &Type) -> BTreeMap<String, Entity> {
        let ty = auto_invoked(ty);
        let mut members = builtins::methods_of(ty).clone();
        if let Type::Map(map) = ty {
            members.extend(map.properties.clone());
        }
        members
    }

    /// Resolve what `expression` refers to when evaluated in `scope`.
    pub fn resolve(&self, expression: &Expression, scope: ScopeId) -> Option<Entity> {
        match &expression.kind {
            ExpressionKind::Identifier(name) => self.lookup(name, scope).cloned(),
            ExpressionKind::Member { base, name } => {
                if let ExpressionKind::Identifier(base_name) = &base.kind {
                    if let Some(target) = self.scope_keyword(base_name, scope) {
                        return self
                            .scope(target)
                            .and_then(|s| s.entities.get(&name.name))
                            .cloned();
                    }
                }
                let base = self.resolve(base, scope)?;
                self.member(&base.ty, &name.name)
            }
            ExpressionKind::Index { base, index } => {
                let base = self.resolve(base, scope)?;
                match (&index.kind, auto_invoked(&base.ty)) {
                    (ExpressionKind::String(key), ty) => self.member(ty, key),
                    (_, Type::List(element)) => Some(Entity::anonymous((**element).clone())),
                    (_, Type::String) => Some(Entity::anonymous(Type::String)),
                    _ => None,
                }
            }
            ExpressionKind::Slice { base, .. } => self
                .resolve(base, scope)
                .map(|entity| Entity::anonymous(auto_invoked(&entity.ty).clone())),
            ExpressionKind::Call { callee, .. } => {
                let callee = self.resolve(callee, scope)?;
                match &callee.ty {
                    Type::Function(signature) => {
                        Some(Entity::anonymous((*signature.returns).clone()))
                    }
                    _ => Some(callee),
                }
            }
            ExpressionKind::Unary { operator, operand } => match operator {
                UnaryOperator::Not | UnaryOperator::Negate => {
                    Some(Entity::anonymous(Type::Number))
                }
                UnaryOperator::New => self
                    .resolve(operand, scope)
                    .map(|entity| Entity::anonymous(auto_invoked(&entity.ty).clone())),
                UnaryOperator::AddressOf => self.resolve(operand, scope),
            },
            ExpressionKind::Binary {
                operator,
                left,
                right,
            } => Some(Entity::anonymous(self.binary_type(
                *operator, left, right, scope,
            ))),
            ExpressionKind::Number(_) | ExpressionKind::Boolean(_) => {
                Some(Entity::anonymous(Type::Number))
            }
            ExpressionKind::String(_) => Some(Entity::anonymous(Type::String)),
            ExpressionKind::Null => Some(Entity::anonymous(Type::Null)),
            ExpressionKind::List(items) => {
                let element = items
                    .first()
                    .map_or(Type::Any, |item| self.infer(item, scope));
                Some(Entity::anonymous(Type::List(Box::new(element))))
            }
            ExpressionKind::Map(entries) => {
                let mut map = MapType::default();
                for entry in entries {
                    if let ExpressionKind::String(key) = &entry.key.kind {
                        let ty = self.infer(&entry.value, scope);
                        let kind = if ty.is_callable() {
                            EntityKind::Function
                        } else {
                            EntityKind::Property
                        };
                        let property =
                            Entity::new(key.clone(), kind, ty).with_source(&self.uri, entry.key.span);
                        map.properties.insert(key.clone(), property);
                    }
                }
                Some(Entity::anonymous(Type::Map(map)))
            }
            ExpressionKind::Function(function) => {
                let signature = self
                    .scope(function.scope)
                    .and_then(|s| s.signature.clone())
                    .unwrap_or_else(|| Signature::new(Vec::new(), Type::Any));
                Some(Entity::anonymous(Type::Function(signature)))
            }
            ExpressionKind::Invalid => None,
        }
    }

    /// Type of `expression`, or [`Type::Any`] when it cannot be resolved.
    pub fn infer(&self, expression: &Expression, scope: ScopeId) -> Type {
        self.resolve(expression, scope)
            .map(|entity| entity.ty)
            .unwrap_or_default()
    }

    /// `globals`, `locals` and `outer` name scopes directly unless shadowed.
    pub(crate) fn scope_keyword(&self, name: &str, scope: ScopeId) -> Option<ScopeId> {
        let shadowed = self
            .scope_chain(scope)
            .into_iter()
            .filter_map(|id| self.scope(id))
            .any(|s| s.entities.contains_key(name));
        if shadowed {
            return None;
        }
        match name {
            "globals" => Some(ROOT_SCOPE),
            "locals" => Some(scope),
            "outer" => Some(
                self.scope(scope)
                    .and_then(|s| s.parent)
                    .unwrap_or(ROOT_SCOPE),
            ),
            _ => None,
        }
    }

    fn member(&self, ty: &Type, name: &str) -> Option<Entity> {
        let ty = auto_invoked(ty);
        if let Some(property) = ty.as_map().and_then(|map| map.get(name)) {
            return Some(property.clone());
        }
        builtins::methods_of(ty).get(name).cloned()
    }

    fn binary_type(
        &self,
        operator: BinaryOperator,
        left: &Expression,
        right: &Expression,
        scope: ScopeId,
    ) -> Type {
        match operator {
            BinaryOperator::Add => {
                match (self.infer(left, scope), self.infer(right, scope)) {
                    (Type::String, _) | (_, Type::String) => Type::String,
                    (list @ Type::List(_), _) => list,
                    (map @ Type::Map(_), _) => map,
                    _ => Type::Number,
                }
            }
            BinaryOperator::Subtract | BinaryOperator::Multiply | BinaryOperator::Divide => {
                match self.infer(left, scope) {
                    Type::String => Type::String,
                    Type::List(element) if operator == BinaryOperator::Multiply => {
                        Type::List(element)
                    }
                    _ => Type::Number,
                }
            }
            BinaryOperator::Or
            | BinaryOperator::And
            | BinaryOperator::Isa
            | BinaryOperator::Equal
            | BinaryOperator::NotEqual
            | BinaryOperator::Less
            | BinaryOperator::Greater
            | BinaryOperator::LessEqual
            | BinaryOperator::GreaterEqual
            | BinaryOperator::Modulo
            | BinaryOperator::Power => Type::Number,
        }
    }

    /// Fold other documents into a new view of this one.
    ///
    /// Name collisions in the root scope are settled by precedence: this
    /// document's own declarations, then namespace aliases (first one wins),
    /// then flat inputs where a later input beats an earlier one. A losing
    /// non-namespace binding still contributes its source locations, and fills
    /// in the type when the winner's is unknown.
    pub fn merge(&self, inputs: &[MergeInput<'_>]) -> TypeDocument {
        let mut merged = self.clone();
        let root = &mut merged.scopes[ROOT_SCOPE as usize].entities;

        for input in inputs {
            let Some(namespace) = input.namespace else {
                continue;
            };
            let exports = Type::Map(input.document.exports());
            match root.get_mut(namespace) {
                Some(existing) if existing.kind == EntityKind::Namespace && existing.ty.is_any() => {
                    existing.ty = exports;
                }
                Some(_) => {}
                None => {
                    root.insert(
                        namespace.to_string(),
                        Entity::new(namespace, EntityKind::Namespace, exports),
                    );
                }
            }
        }

        for input in inputs.iter().rev().filter(|input| input.namespace.is_none()) {
            for (name, entity) in &input.document.root().entities {
                match root.get_mut(name) {
                    Some(existing) => {
                        if existing.kind != EntityKind::Namespace
                            && entity.kind != EntityKind::Namespace
                        {
                            existing.absorb_sources(entity);
                            if existing.ty.is_any() {
                                existing.ty = entity.ty.clone();
                            }
                        }
                    }
                    None => {
                        root.insert(name.clone(), entity.clone());
                    }
                }
            }
        }

        merged
    }
}

/// MiniScript calls a function when it is referenced without `@`, so member
/// access on a function value applies to its result.
fn auto_invoked(ty: &Type) -> &Type {
    match ty {
        Type::Function(signature) => &signature.returns,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::Position;
    use crate::types::analyze;

    fn document(uri: &str, source: &str) -> TypeDocument {
        let result = crate::syntax::parse(source);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        analyze(uri, &result.chunk)
    }

    fn root_names(document: &TypeDocument) -> Vec<&str> {
        document.root().entities.keys().map(String::as_str).collect()
    }

    fn expression(source: &str) -> Expression {
        let mut parser = crate::syntax::Parser::new(crate::syntax::Lexer::new(source).tokenize().0);
        parser.parse_expression()
    }

    // ── Resolution ────────────────────────────────────────────────────

    #[test]
    fn test_resolve_member_of_map() {
        let doc = document("file:///a.ms", "player = {\"name\": \"bob\", \"hp\": 3}");
        let entity = doc.resolve(&expression("player.hp"), ROOT_SCOPE);
        assert_eq!(entity.map(|e| e.ty), Some(Type::Number));
    }

    #[test]
    fn test_resolve_string_index_as_member() {
        let doc = document("file:///a.ms", "player = {\"name\": \"bob\"}");
        let entity = doc.resolve(&expression("player[\"name\"]"), ROOT_SCOPE);
        assert_eq!(entity.map(|e| e.ty), Some(Type::String));
    }

    #[test]
    fn test_resolve_intrinsic_method() {
        let doc = document("file:///a.ms", "name = \"bob\"");
        let entity = doc.resolve(&expression("name.upper"), ROOT_SCOPE);
        assert_eq!(entity.map(|e| e.kind), Some(EntityKind::Builtin));
    }

    #[test]
    fn test_resolve_call_returns_function_result() {
        let doc = document("file:///a.ms", "f = function\n  return \"x\"\nend function");
        assert_eq!(doc.infer(&expression("f()"), ROOT_SCOPE), Type::String);
    }

    #[test]
    fn test_resolve_builtin_and_unknown() {
        let doc = TypeDocument::empty("file:///a.ms");
        assert!(doc.resolve(&expression("print"), ROOT_SCOPE).is_some());
        assert!(doc.resolve(&expression("nothing"), ROOT_SCOPE).is_none());
    }

    #[test]
    fn test_binary_inference() {
        let doc = TypeDocument::empty("file:///a.ms");
        assert_eq!(doc.infer(&expression("\"a\" + 1"), ROOT_SCOPE), Type::String);
        assert_eq!(doc.infer(&expression("1 + 2"), ROOT_SCOPE), Type::Number);
        assert_eq!(doc.infer(&expression("1 < 2"), ROOT_SCOPE), Type::Number);
    }

    // ── Scopes ────────────────────────────────────────────────────────

    #[test]
    fn test_scope_at_picks_innermost_function() {
        let doc = document(
            "file:///a.ms",
            "outer = function\n  inner = function\n    x = 1\n  end function\nend function",
        );
        assert_eq!(doc.scope_at(Position::new(2, 4)), 2);
        assert_eq!(doc.scope_at(Position::new(0, 0)), ROOT_SCOPE);
        assert_eq!(doc.scope_chain(2), vec![2, 1, ROOT_SCOPE]);
    }

    #[test]
    fn test_visible_entities_shadowing() {
        let doc = document("file:///a.ms", "x = 1\nf = function(x)\n  y = 2\nend function");
        let visible = doc.visible_entities(1);
        assert_eq!(visible.get("x").map(|e| e.kind), Some(EntityKind::Parameter));
        assert!(visible.contains_key("y"));
        assert!(visible.contains_key("print"));
        assert!(!doc.visible_entities(ROOT_SCOPE).contains_key("y"));
    }

    // ── Merge ─────────────────────────────────────────────────────────

    #[test]
    fn test_merge_with_no_inputs_is_identity() {
        let doc = document("file:///main.ms", "x = 1");
        assert_eq!(doc.merge(&[]), doc);
    }

    #[test]
    fn test_flat_merge_adds_declarations() {
        let main = document("file:///main.ms", "x = 1");
        let lib = document("file:///lib.ms", "add = function(a, b)\n  return a + b\nend function");
        let merged = main.merge(&[MergeInput::flat(&lib)]);
        assert_eq!(root_names(&merged), vec!["add", "x"]);
        assert_eq!(merged.uri(), "file:///main.ms");
    }

    #[test]
    fn test_namespaced_merge_hides_bare_names() {
        let main = document("file:///main.ms", "import \"lib.ms\" as mathlib");
        let lib = document("file:///lib.ms", "add = function(a, b)\n  return a + b\nend function");
        let merged = main.merge(&[MergeInput::namespaced(&lib, "mathlib")]);

        assert!(merged.lookup("add", ROOT_SCOPE).is_none());
        let add = merged.resolve(&expression("mathlib.add"), ROOT_SCOPE);
        assert_eq!(add.as_ref().map(|e| e.ty.is_callable()), Some(true));
        assert_eq!(
            add.and_then(|e| e.declaration().map(|s| s.uri.clone())),
            Some("file:///lib.ms".to_string())
        );
        // The alias keeps pointing at the import statement
        let alias = merged.lookup("mathlib", ROOT_SCOPE);
        assert_eq!(alias.map(|e| e.sources.len()), Some(1));
    }

    #[test]
    fn test_own_declarations_win_and_absorb_sources() {
        let main = document("file:///main.ms", "x = \"own\"");
        let lib = document("file:///lib.ms", "x = 1");
        let merged = main.merge(&[MergeInput::flat(&lib)]);
        let x = merged.lookup("x", ROOT_SCOPE).cloned();
        assert_eq!(x.as_ref().map(|e| e.ty.clone()), Some(Type::String));
        assert_eq!(x.map(|e| e.sources.len()), Some(2));
    }

    #[test]
    fn test_later_flat_input_wins() {
        let main = TypeDocument::empty("file:///main.ms");
        let a = document("file:///a.ms", "x = 1");
        let b = document("file:///b.ms", "x = \"b\"");
        let merged = main.merge(&[MergeInput::flat(&a), MergeInput::flat(&b)]);
        assert_eq!(merged.lookup("x", ROOT_SCOPE).map(|e| e.ty.clone()), Some(Type::String));
    }

    #[test]
    fn test_namespace_beats_colliding_include() {
        let main = TypeDocument::empty("file:///main.ms");
        let lib = document("file:///lib.ms", "add = 1");
        let other = document("file:///other.ms", "mathlib = 2");
        let merged = main.merge(&[
            MergeInput::flat(&other),
            MergeInput::namespaced(&lib, "mathlib"),
        ]);
        assert_eq!(
            merged.lookup("mathlib", ROOT_SCOPE).map(|e| e.kind),
            Some(EntityKind::Namespace)
        );
    }

    #[test]
    fn test_merge_does_not_mutate_inputs() {
        let main = document("file:///main.ms", "x = 1");
        let lib = document("file:///lib.ms", "y = 1");
        let before = (main.clone(), lib.clone());
        let _ = main.merge(&[MergeInput::flat(&lib)]);
        assert_eq!((main, lib), before);
    }
}
