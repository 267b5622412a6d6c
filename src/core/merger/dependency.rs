//! Per-document merge strategy: fold a document's transitive imports and
//! includes into its type model, bottom-up over the dependency graph.

use super::{DocumentMergerCache, MergeContext, PendingJobs};
use crate::core::document::ActiveDocument;
use crate::core::graph::{DocumentGraph, DocumentGraphBuilder, NodeId};
use crate::types::{MergeInput, TypeDocument};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

#[derive(Default, Clone)]
pub struct DependencyMerger {
    pending: PendingJobs,
}

impl DependencyMerger {
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
        let graph = DocumentGraphBuilder::new(Arc::clone(&context.document_manager), document)
            .build()
            .await;

        let mut job = MergeJob {
            graph: &graph,
            cache: &context.merger_cache,
            generation,
            refs: HashMap::new(),
            merges: 0,
        };
        let merged = job.resolve(graph.root()).document;

        if job.merges > 0 {
            context.document_manager.metrics().record_merge(started.elapsed());
            tracing::debug!(
                "Merged {} ({} of {} nodes recomputed)",
                graph.node(graph.root()).item.document.uri(),
                job.merges,
                graph.len()
            );
        }
        merged
    }
}

#[derive(Clone)]
struct Resolved {
    document: Arc<TypeDocument>,
    /// Ancestors whose in-progress view this result stopped at. Non-empty
    /// means the result depends on where the walk entered the cycle.
    open_cycles: BTreeSet<NodeId>,
}

/// One bottom-up walk. `refs` holds `None` while a node is being resolved.
struct MergeJob<'a> {
    graph: &'a DocumentGraph,
    cache: &'a DocumentMergerCache,
    generation: u64,
    refs: HashMap<NodeId, Option<Resolved>>,
    merges: usize,
}

impl MergeJob<'_> {
    fn resolve(&mut self, id: NodeId) -> Resolved {
        let graph = self.graph;
        let node = graph.node(id);
        let own = &node.item.document;

        match self.refs.get(&id) {
            Some(Some(done)) => return done.clone(),
            // Back edge of a cycle: use the node's own declarations
            Some(None) => {
                return Resolved {
                    document: Arc::clone(&own.type_document),
                    open_cycles: BTreeSet::from([id]),
                }
            }
            None => {}
        }

        if node.children.is_empty() {
            return self.finish(
                id,
                Resolved {
                    document: Arc::clone(&own.type_document),
                    open_cycles: BTreeSet::new(),
                },
            );
        }

        let key = DocumentMergerCache::create_cache_key(
            &own.text_document,
            graph
                .reachable(id)
                .into_iter()
                .filter(|&other| other != id)
                .map(|other| graph.node(other).item.document.text_document.as_ref()),
        );
        if let Some(cached) = self.cache.get(key) {
            tracing::debug!("Merged view of {} served from cache", own.uri());
            return self.finish(
                id,
                Resolved {
                    document: cached,
                    open_cycles: BTreeSet::new(),
                },
            );
        }

        self.refs.insert(id, None);
        let mut open_cycles = BTreeSet::new();
        let mut children = Vec::with_capacity(node.children.len());
        for edge in &node.children {
            let child = self.resolve(edge.node);
            open_cycles.extend(child.open_cycles);
            children.push((edge.location.namespace(), child.document));
        }

        let inputs: Vec<MergeInput<'_>> = children
            .iter()
            .map(|(namespace, document)| match namespace {
                Some(namespace) => MergeInput::namespaced(document, namespace),
                None => MergeInput::flat(document),
            })
            .collect();
        let merged = Arc::new(own.type_document.merge(&inputs));
        self.merges += 1;

        open_cycles.remove(&id);
        if open_cycles.is_empty() {
            self.cache
                .store(self.generation, key, own.uri(), Arc::clone(&merged));
        } else {
            tracing::debug!("Not caching {}: its view depends on a cycle entry point", own.uri());
        }

        self.finish(
            id,
            Resolved {
                document: merged,
                open_cycles,
            },
        )
    }

    fn finish(&mut self, id: NodeId, resolved: Resolved) -> Resolved {
        self.refs.insert(id, Some(resolved.clone()));
        resolved
    }
}
