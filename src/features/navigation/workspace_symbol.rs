use crate::core::{ActiveDocument, DocumentManager};
use crate::features::span_to_range;
use crate::types::{Entity, EntityKind, Type};
use futures::future::join_all;
use lsp_types::*;
use std::sync::Arc;

const MAX_RESULTS: usize = 100;

/// Searches top-level declarations across every workspace file
#[derive(Clone, Default)]
pub struct WorkspaceSymbolProvider;

impl WorkspaceSymbolProvider {
    pub fn new() -> Self {
        Self
    }

    pub async fn provide(&self, manager: &Arc<DocumentManager>, query: &str) -> Vec<SymbolInformation> {
        let uris = manager.file_system().get_workspace_related_files().await;
        let documents: Vec<Arc<ActiveDocument>> = join_all(uris.iter().map(|uri| manager.get_or_open(uri)))
            .await
            .into_iter()
            .flatten()
            .collect();

        let query = query.to_lowercase();
        let mut matches: Vec<(u8, &Entity, &str)> = documents
            .iter()
            .flat_map(|document| {
                document
                    .type_document
                    .root()
                    .entities
                    .values()
                    .map(move |entity| (entity, document.uri()))
            })
            .filter_map(|(entity, uri)| Some((score(&entity.name, &query)?, entity, uri)))
            .collect();

        // Best score first, then by name and file for a stable order
        matches.sort_by(|(score_a, entity_a, uri_a), (score_b, entity_b, uri_b)| {
            score_b
                .cmp(score_a)
                .then_with(|| entity_a.name.cmp(&entity_b.name))
                .then_with(|| uri_a.cmp(uri_b))
        });

        matches
            .into_iter()
            .filter_map(|(_, entity, uri)| to_symbol(entity, uri))
            .take(MAX_RESULTS)
            .collect()
    }
}

/// 3 for an exact match, 2 for a prefix, 1 for a substring; case-insensitive.
/// An empty query matches everything.
fn score(name: &str, query: &str) -> Option<u8> {
    if query.is_empty() {
        return Some(1);
    }
    let name = name.to_lowercase();
    if name == query {
        Some(3)
    } else if name.starts_with(query) {
        Some(2)
    } else if name.contains(query) {
        Some(1)
    } else {
        None
    }
}

#[allow(deprecated)]
fn to_symbol(entity: &Entity, uri: &str) -> Option<SymbolInformation> {
    // Only names this file declares itself
    let declaration = entity.sources.iter().find(|source| source.uri == uri)?;
    let uri = match uri.parse::<Uri>() {
        Ok(uri) => uri,
        Err(err) => {
            tracing::debug!("Skipping symbols of {}: {}", uri, err);
            return None;
        }
    };

    Some(SymbolInformation {
        name: entity.name.clone(),
        kind: symbol_kind(entity),
        tags: None,
        deprecated: None,
        location: Location::new(uri, span_to_range(declaration.span)),
        container_name: None,
    })
}

fn symbol_kind(entity: &Entity) -> SymbolKind {
    match (&entity.kind, &entity.ty) {
        (EntityKind::Namespace, _) => SymbolKind::MODULE,
        (_, Type::Function(_)) => SymbolKind::FUNCTION,
        (_, Type::Map(_)) => SymbolKind::OBJECT,
        _ => SymbolKind::VARIABLE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DocumentMergerCache;
    use crate::testing::MockFileSystem;
    use std::time::Duration;

    fn manager(files: &[(&str, &str)]) -> Arc<DocumentManager> {
        let fs = Arc::new(MockFileSystem::new().with_workspace_folder("file:///ws"));
        for (uri, text) in files {
            fs.add(uri, text);
        }
        DocumentManager::new(
            fs,
            Arc::new(DocumentMergerCache::new()),
            vec!["ms".into()],
            Duration::from_millis(50),
        )
    }

    fn names(symbols: &[SymbolInformation]) -> Vec<&str> {
        symbols.iter().map(|symbol| symbol.name.as_str()).collect()
    }

    #[test]
    fn test_score_ranks_exact_prefix_and_substring() {
        assert_eq!(score("Count", "count"), Some(3));
        assert_eq!(score("counter", "count"), Some(2));
        assert_eq!(score("recount", "count"), Some(1));
        assert_eq!(score("total", "count"), None);
        assert_eq!(score("total", ""), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_symbols_from_every_file_ranked() {
        let manager = manager(&[
            ("file:///ws/a.ms", "recount = 1\ncounter = function()\nend function"),
            ("file:///ws/b.ms", "count = {}\nother = 2"),
        ]);

        let symbols = WorkspaceSymbolProvider::new().provide(&manager, "count").await;
        assert_eq!(names(&symbols), vec!["count", "counter", "recount"]);
        assert_eq!(symbols[0].location.uri.as_str(), "file:///ws/b.ms");
        assert_eq!(symbols[0].kind, SymbolKind::OBJECT);
        assert_eq!(symbols[1].kind, SymbolKind::FUNCTION);
        assert_eq!(symbols[1].location.range.start, Position::new(1, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_query_lists_everything() {
        let manager = manager(&[("file:///ws/a.ms", "x = 1\ny = 2")]);
        let symbols = WorkspaceSymbolProvider::new().provide(&manager, "").await;
        assert_eq!(names(&symbols), vec!["x", "y"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_are_capped() {
        let text: String = (0..150).map(|i| format!("v{i} = {i}\n")).collect();
        let manager = manager(&[("file:///ws/many.ms", text.as_str())]);
        let symbols = WorkspaceSymbolProvider::new().provide(&manager, "v").await;
        assert_eq!(symbols.len(), MAX_RESULTS);
    }
}
