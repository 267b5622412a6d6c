//! Per-request facade from "a position in a document" to semantic answers.

use super::document::ActiveDocument;
use super::session::Session;
use crate::syntax::{NodeRef, Position, ScopeId, StatementKind, ROOT_SCOPE};
use crate::types::{Entity, SourceLocation, Type, TypeDocument};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// The innermost AST node at a position and the nodes enclosing it,
/// outermost first.
#[derive(Debug, Clone)]
pub struct LookupResult<'a> {
    pub position: Position,
    pub closest: NodeRef<'a>,
    pub outer: Vec<NodeRef<'a>>,
}

impl LookupResult<'_> {
    /// The function scope the closest node is evaluated in.
    pub fn scope(&self) -> ScopeId {
        self.outer
            .iter()
            .rev()
            .find_map(NodeRef::introduced_scope)
            .unwrap_or(ROOT_SCOPE)
    }
}

/// Answers queries about one [`ActiveDocument`]. Meant to live for one
/// request: the merged type view is computed on first use and then reused.
pub struct LookupHelper {
    session: Arc<Session>,
    document: Arc<ActiveDocument>,
    type_map: OnceCell<Arc<TypeDocument>>,
}

impl LookupHelper {
    pub fn new(session: Arc<Session>, document: Arc<ActiveDocument>) -> Self {
        Self {
            session,
            document,
            type_map: OnceCell::new(),
        }
    }

    pub fn document(&self) -> &Arc<ActiveDocument> {
        &self.document
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub async fn get_type_map(&self) -> Arc<TypeDocument> {
        self.type_map
            .get_or_init(|| self.session.merged_type_document(&self.document))
            .await
            .clone()
    }

    /// Deepest node whose span contains `position`. `None` when no node does,
    /// e.g. on a blank or unparsable line.
    pub fn lookup_ast(&self, position: Position) -> Option<LookupResult<'_>> {
        let chunk = self.document.parsed_payload.as_deref()?;
        let mut outer = Vec::new();
        let mut closest: Option<NodeRef<'_>> = None;
        let mut candidates: Vec<NodeRef<'_>> = chunk.roots().collect();

        loop {
            let mut found = None;
            for node in candidates {
                let span = node.span();
                // Nodes come in source order; nothing later can contain it
                if span.start > position {
                    break;
                }
                if span.contains(position) {
                    found = Some(node);
                    break;
                }
            }
            let Some(node) = found else {
                break;
            };
            outer.extend(closest.replace(node));
            candidates = node.children();
        }

        closest.map(|closest| LookupResult {
            position,
            closest,
            outer,
        })
    }

    /// The entity the closest node names or evaluates to.
    pub async fn lookup_type_info(&self, result: &LookupResult<'_>) -> Option<Entity> {
        let map = self.get_type_map().await;
        let scope = result.scope();
        match result.closest {
            NodeRef::Expression(expression) => map.resolve(expression, scope),
            NodeRef::Parameter(parameter) => map.lookup(&parameter.name.name, scope).cloned(),
            NodeRef::Statement(statement) => match &statement.kind {
                StatementKind::For { variable, .. } if variable.span.contains(result.position) => {
                    map.lookup(&variable.name, scope).cloned()
                }
                StatementKind::Import { alias, .. } if alias.span.contains(result.position) => {
                    map.lookup(&alias.name, scope).cloned()
                }
                _ => None,
            },
        }
    }

    pub async fn lookup_type(&self, result: &LookupResult<'_>) -> Type {
        self.lookup_type_info(result)
            .await
            .map(|entity| entity.ty)
            .unwrap_or_default()
    }

    /// For a member or index access, the entity of the value being accessed.
    pub async fn lookup_base_path(&self, result: &LookupResult<'_>) -> Option<Entity> {
        use crate::syntax::ExpressionKind;

        let expression = result.closest.as_expression()?;
        let base = match &expression.kind {
            ExpressionKind::Member { base, .. }
            | ExpressionKind::Index { base, .. }
            | ExpressionKind::Slice { base, .. } => base,
            _ => return None,
        };
        self.get_type_map().await.resolve(base, result.scope())
    }

    /// Names visible at `position`.
    ///
    /// Variables of the innermost scope only count once an assignment to
    /// them has been reached; anything coming from an outer scope, another
    /// file or the runtime is always visible.
    pub async fn find_all_available_identifier_related_to_position(
        &self,
        position: Position,
    ) -> BTreeMap<String, Entity> {
        let map = self.get_type_map().await;
        let scope = map.scope_at(position);
        let local = map.scope(scope).map(|s| &s.entities);
        let uri = self.document.uri();

        map.visible_entities(scope)
            .into_iter()
            .filter(|(name, entity)| {
                let declared_here = local.and_then(|entities| entities.get(*name)).is_some();
                !declared_here || is_assigned_before(entity, uri, position)
            })
            .map(|(name, entity)| (name.to_string(), entity.clone()))
            .collect()
    }

    /// Every place the entity under the cursor is assigned, across files.
    pub async fn find_all_assignments_of_item(&self, result: &LookupResult<'_>) -> Vec<SourceLocation> {
        self.lookup_type_info(result)
            .await
            .map(|entity| entity.sources)
            .unwrap_or_default()
    }
}

fn is_assigned_before(entity: &Entity, uri: &str, position: Position) -> bool {
    entity.sources.is_empty()
        || entity
            .sources
            .iter()
            .any(|source| source.uri != uri || source.span.start.line <= position.line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Configuration;
    use crate::core::TextDocument;
    use crate::syntax::ExpressionKind;
    use crate::testing::MockFileSystem;
    use crate::types::EntityKind;

    async fn helper(fs: MockFileSystem, uri: &str, text: &str) -> LookupHelper {
        let session = Session::new(Arc::new(fs), Configuration::default());
        let document = session
            .document_manager()
            .get(&Arc::new(TextDocument::new(uri, 1, text)));
        session.lookup(document)
    }

    fn at(line: u32, character: u32) -> Position {
        Position::new(line, character)
    }

    // ── AST lookup ────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_lookup_ast_finds_deepest_node() {
        let helper = helper(MockFileSystem::new(), "file:///a.ms", "x = foo.bar + 1").await;
        let result = helper.lookup_ast(at(0, 9)).unwrap();
        let expression = result.closest.as_expression().unwrap();
        assert!(matches!(&expression.kind, ExpressionKind::Member { name, .. } if name.name == "bar"));
        // assignment, binary
        assert_eq!(result.outer.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_ast_on_blank_line_is_none() {
        let helper = helper(MockFileSystem::new(), "file:///a.ms", "x = 1\n\ny = 2").await;
        assert!(helper.lookup_ast(at(1, 0)).is_none());
        assert!(helper.lookup_ast(at(2, 0)).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scope_of_node_inside_function() {
        let text = "f = function(a)\n  b = a\nend function";
        let helper = helper(MockFileSystem::new(), "file:///a.ms", text).await;
        let result = helper.lookup_ast(at(1, 6)).unwrap();
        assert_ne!(result.scope(), ROOT_SCOPE);
        let entity = helper.lookup_type_info(&result).await.unwrap();
        assert_eq!(entity.kind, EntityKind::Parameter);
    }

    // ── Type info ─────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_type_info_across_files() {
        let fs = MockFileSystem::new();
        fs.add("file:///lib.ms", "greet = function(name)\n  return \"hi \" + name\nend function");
        let helper = helper(fs, "file:///main.ms", "import \"lib\" as lib\nlib.greet").await;

        let result = helper.lookup_ast(at(1, 6)).unwrap();
        let entity = helper.lookup_type_info(&result).await.unwrap();
        assert_eq!(entity.name, "greet");
        assert!(entity.ty.is_callable());

        let base = helper.lookup_base_path(&result).await.unwrap();
        assert_eq!(base.kind, EntityKind::Namespace);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_type_of_unknown_is_any() {
        let helper = helper(MockFileSystem::new(), "file:///a.ms", "print mystery").await;
        let result = helper.lookup_ast(at(0, 8)).unwrap();
        assert_eq!(helper.lookup_type(&result).await, Type::Any);
    }

    #[tokio::test(start_paused = true)]
    async fn test_for_variable() {
        let helper = helper(MockFileSystem::new(), "file:///a.ms", "for i in range(3)\nend for").await;
        let result = helper.lookup_ast(at(0, 4)).unwrap();
        assert_eq!(helper.lookup_type_info(&result).await.unwrap().name, "i");
    }

    #[tokio::test(start_paused = true)]
    async fn test_type_map_is_memoized() {
        let helper = helper(MockFileSystem::new(), "file:///a.ms", "x = 1").await;
        let first = helper.get_type_map().await;
        let second = helper.get_type_map().await;
        assert!(Arc::ptr_eq(&first, &second));
    }

    // ── Identifiers and assignments ───────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_available_identifiers_respect_assignment_order() {
        let fs = MockFileSystem::new();
        fs.add("file:///lib.ms", "late_import = 1");
        let text = "early = 1\n\nlate = 2\ninclude \"lib\"";
        let helper = helper(fs, "file:///a.ms", text).await;

        let names = helper
            .find_all_available_identifier_related_to_position(at(1, 0))
            .await;
        assert!(names.contains_key("early"));
        assert!(!names.contains_key("late"));
        assert!(names.contains_key("late_import"));
        assert!(names.contains_key("print"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_outer_names_visible_anywhere_in_function() {
        let text = "f = function()\n  \n  local_one = 1\nend function\nglobal_later = 2";
        let helper = helper(MockFileSystem::new(), "file:///a.ms", text).await;

        let names = helper
            .find_all_available_identifier_related_to_position(at(1, 2))
            .await;
        assert!(names.contains_key("global_later"));
        assert!(!names.contains_key("local_one"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_assignments_across_files() {
        let fs = MockFileSystem::new();
        fs.add("file:///lib.ms", "shared = 1");
        let helper = helper(fs, "file:///main.ms", "include \"lib\"\nshared = 2\nprint shared").await;

        let result = helper.lookup_ast(at(2, 7)).unwrap();
        let sources = helper.find_all_assignments_of_item(&result).await;
        let uris: Vec<&str> = sources.iter().map(|s| s.uri.as_str()).collect();
        assert_eq!(uris, vec!["file:///main.ms", "file:///lib.ms"]);
    }
}
