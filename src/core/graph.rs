//! Transitive dependency graph of an entry document.
//!
//! Nodes live in an arena and are cached by URI, so a file referenced from
//! several places, or from inside an import cycle, is one node reached by
//! several edges.

use super::dependency::DependencyLocation;
use super::document::{ActiveDocument, DocumentManager};
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

pub type NodeId = usize;

#[derive(Debug, Clone)]
pub struct GraphItem {
    pub document: Arc<ActiveDocument>,
    /// How the node was first reached; `Root` for the entry document.
    pub location: DependencyLocation,
}

/// A parent-to-child link. Carries its own location because a shared node can
/// be included by one parent and imported by another.
#[derive(Debug, Clone)]
pub struct GraphEdge {
    pub location: DependencyLocation,
    pub node: NodeId,
}

#[derive(Debug, Clone)]
pub struct GraphNode {
    pub item: GraphItem,
    pub children: Vec<GraphEdge>,
}

#[derive(Debug, Clone)]
pub struct DocumentGraph {
    nodes: Vec<GraphNode>,
    root: NodeId,
}

impl DocumentGraph {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &GraphNode {
        &self.nodes[id]
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn find(&self, uri: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|node| node.item.document.uri() == uri)
    }

    /// Every node reachable from `id` through child edges, `id` first.
    pub fn reachable(&self, id: NodeId) -> Vec<NodeId> {
        let mut seen = HashSet::from([id]);
        let mut order = vec![id];
        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            for edge in &self.nodes[current].children {
                if seen.insert(edge.node) {
                    order.push(edge.node);
                    queue.push_back(edge.node);
                }
            }
        }
        order
    }
}

type PendingFetch = Shared<BoxFuture<'static, Option<Arc<ActiveDocument>>>>;

#[derive(Default)]
struct BuilderState {
    nodes: Vec<GraphNode>,
    by_uri: HashMap<String, NodeId>,
}

/// Builds one [`DocumentGraph`]; single use.
pub struct DocumentGraphBuilder {
    manager: Arc<DocumentManager>,
    entry: Arc<ActiveDocument>,
    state: Mutex<BuilderState>,
    fetches: Mutex<HashMap<String, PendingFetch>>,
}

impl DocumentGraphBuilder {
    pub fn new(manager: Arc<DocumentManager>, entry: Arc<ActiveDocument>) -> Self {
        Self {
            manager,
            entry,
            state: Mutex::new(BuilderState::default()),
            fetches: Mutex::new(HashMap::new()),
        }
    }

    pub async fn build(self) -> DocumentGraph {
        let entry = Arc::clone(&self.entry);
        let (root, _) = self.node_for(Arc::clone(&entry), DependencyLocation::root(entry.uri()));
        if entry.parsed_payload.is_some() {
            self.expand(root, entry).await;
        }

        let state = self.state.into_inner();
        tracing::debug!("Dependency graph of {} has {} nodes", self.entry.uri(), state.nodes.len());
        DocumentGraph {
            nodes: state.nodes,
            root,
        }
    }

    /// The node for `document`, created (and marked) if this is the first time
    /// its URI is seen. Marking before recursion is what stops cycles.
    fn node_for(&self, document: Arc<ActiveDocument>, location: DependencyLocation) -> (NodeId, bool) {
        let mut state = self.state.lock();
        if let Some(&id) = state.by_uri.get(document.uri()) {
            return (id, false);
        }
        let id = state.nodes.len();
        state.by_uri.insert(document.uri().to_string(), id);
        state.nodes.push(GraphNode {
            item: GraphItem { document, location },
            children: Vec::new(),
        });
        (id, true)
    }

    fn expand(&self, id: NodeId, document: Arc<ActiveDocument>) -> BoxFuture<'_, ()> {
        async move {
            let dependencies = document.get_dependencies().await;
            let fetched = join_all(dependencies.iter().map(|d| self.fetch(&d.location))).await;

            let mut fresh = Vec::new();
            for (location, child) in dependencies.iter().zip(fetched) {
                // A dependency that cannot be read is left out of the graph
                let Some(child) = child else {
                    continue;
                };
                let (child_id, created) = self.node_for(Arc::clone(&child), location.clone());
                self.state.lock().nodes[id].children.push(GraphEdge {
                    location: location.clone(),
                    node: child_id,
                });
                if created {
                    fresh.push((child_id, child));
                }
            }

            join_all(
                fresh
                    .into_iter()
                    .filter(|(_, child)| child.parsed_payload.is_some())
                    .map(|(child_id, child)| self.expand(child_id, child)),
            )
            .await;
        }
        .boxed()
    }

    async fn fetch(&self, uri: &str) -> Option<Arc<ActiveDocument>> {
        if uri == self.entry.uri() {
            return Some(Arc::clone(&self.entry));
        }

        let fetch = self
            .fetches
            .lock()
            .entry(uri.to_string())
            .or_insert_with(|| {
                let manager = Arc::clone(&self.manager);
                let uri = uri.to_string();
                async move { manager.get_or_open(&uri).await }.boxed().shared()
            })
            .clone();
        fetch.await
    }
}
