//! Workspace-wide merge strategy: every workspace file contributes to the
//! view of every other, in dependency order.

use super::{toposort, DocumentMergerCache, MergeContext, PendingJobs};
use crate::core::document::ActiveDocument;
use crate::types::{MergeInput, TypeDocument};
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use url::Url;

#[derive(Default, Clone)]
pub struct WorkspaceMerger {
    pending: PendingJobs,
}

/// A dependency edge between two loaded files.
struct Edge<'a> {
    target: usize,
    namespace: Option<&'a str>,
}

impl WorkspaceMerger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn build(&self, document: &Arc<ActiveDocument>, context: &MergeContext) -> Arc<TypeDocument> {
        let document_for_job = Arc::clone(document);
        let context = context.clone();
        let generation = context.merger_cache.generation();
        self.pending
            .run(document, generation, move || {
                Self::merge(document_for_job, context, generation)
            })
            .await
    }

    async fn merge(
        document: Arc<ActiveDocument>,
        context: MergeContext,
        generation: u64,
    ) -> Arc<TypeDocument> {
        let started = Instant::now();
        let manager = &context.document_manager;
        let exclude = context.exclude.as_deref().and_then(|pattern| match glob::Pattern::new(pattern) {
            Ok(pattern) => Some(pattern),
            Err(err) => {
                tracing::warn!("Ignoring invalid exclude pattern {:?}: {}", pattern, err);
                None
            }
        });

        let uris: Vec<String> = manager
            .file_system()
            .get_workspace_related_files()
            .await
            .into_iter()
            .filter(|uri| uri != document.uri())
            .filter(|uri| !exclude.as_ref().is_some_and(|pattern| is_excluded(pattern, uri)))
            .collect();

        // The target always comes first, opened or not
        let mut files = vec![Arc::clone(&document)];
        files.extend(
            join_all(uris.iter().map(|uri| manager.get_or_open(uri)))
                .await
                .into_iter()
                .flatten(),
        );

        let key = DocumentMergerCache::create_cache_key(
            &document.text_document,
            files[1..].iter().map(|file| file.text_document.as_ref()),
        );
        if let Some(cached) = context.merger_cache.get(key) {
            tracing::debug!("Workspace view of {} served from cache", document.uri());
            return cached;
        }

        let index: HashMap<&str, usize> = files
            .iter()
            .enumerate()
            .map(|(i, file)| (file.uri(), i))
            .collect();
        let mut edges = Vec::new();
        let mut dependencies: Vec<Vec<Edge<'_>>> = Vec::with_capacity(files.len());
        for (i, file) in files.iter().enumerate() {
            let mut outgoing = Vec::new();
            for location in file.get_dependencies().await {
                if let Some(&target) = index.get(location.location.as_str()) {
                    edges.push((i, target));
                    outgoing.push(Edge {
                        target,
                        namespace: location.namespace(),
                    });
                }
            }
            dependencies.push(outgoing);
        }

        let order = toposort(files.len(), &edges);

        // Each file sees its own declarations, its includes flattened and its
        // imports under their aliases, as in a dependency merge. Dependencies
        // come first in `order`; a cycle's back edge finds no view yet and is
        // skipped.
        let mut views: Vec<Option<Arc<TypeDocument>>> = vec![None; files.len()];
        for &i in &order {
            let resolved: Vec<(Arc<TypeDocument>, Option<&str>)> = dependencies[i]
                .iter()
                .filter_map(|edge| Some((views[edge.target].clone()?, edge.namespace)))
                .collect();
            views[i] = Some(if resolved.is_empty() {
                Arc::clone(&files[i].type_document)
            } else {
                let inputs: Vec<MergeInput<'_>> = resolved
                    .iter()
                    .map(|(view, namespace)| match namespace {
                        Some(namespace) => MergeInput::namespaced(view, namespace),
                        None => MergeInput::flat(view),
                    })
                    .collect();
                Arc::new(files[i].type_document.merge(&inputs))
            });
        }

        // The target additionally sees every other file flattened in, except
        // the ones it only reaches through an alias.
        let aliased: HashSet<usize> = dependencies[0]
            .iter()
            .filter(|edge| edge.namespace.is_some())
            .map(|edge| edge.target)
            .collect();
        let flattened: Vec<Arc<TypeDocument>> = order
            .iter()
            .filter(|&&i| i != 0 && !aliased.contains(&i))
            .filter_map(|&i| views[i].clone())
            .collect();
        let namespaced: Vec<(Arc<TypeDocument>, &str)> = dependencies[0]
            .iter()
            .filter_map(|edge| Some((views[edge.target].clone()?, edge.namespace?)))
            .collect();

        let inputs: Vec<MergeInput<'_>> = namespaced
            .iter()
            .map(|(view, namespace)| MergeInput::namespaced(view, namespace))
            .chain(flattened.iter().map(|view| MergeInput::flat(view)))
            .collect();
        let merged = Arc::new(document.type_document.merge(&inputs));

        context
            .merger_cache
            .store(generation, key, document.uri(), Arc::clone(&merged));
        manager.metrics().record_merge(started.elapsed());
        tracing::debug!("Merged workspace view of {} from {} files", document.uri(), files.len());
        merged
    }
}

fn is_excluded(pattern: &glob::Pattern, uri: &str) -> bool {
    let path = Url::parse(uri)
        .map(|url| url.path().to_string())
        .unwrap_or_else(|_| uri.to_string());
    pattern.matches(&path)
}
