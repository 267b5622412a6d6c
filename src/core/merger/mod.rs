//! Merged type views: the shared cache and the two strategies that fill it
//!
//! Both strategies take an [`ActiveDocument`] and a [`MergeContext`] and
//! return the document's type model with everything it can see from other
//! files folded in. Concurrent requests for the same document version share
//! one computation.

pub mod cache;
pub mod dependency;
pub mod toposort;
pub mod workspace;

pub use cache::DocumentMergerCache;
pub use dependency::DependencyMerger;
pub use toposort::toposort;
pub use workspace::WorkspaceMerger;

use super::document::{ActiveDocument, DocumentManager};
use crate::types::TypeDocument;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// What a merge needs from the session.
#[derive(Debug, Clone)]
pub struct MergeContext {
    pub document_manager: Arc<DocumentManager>,
    pub merger_cache: Arc<DocumentMergerCache>,
    /// Glob of workspace files to leave out of workspace-wide merges.
    pub exclude: Option<String>,
}

type SharedMerge = Shared<BoxFuture<'static, Arc<TypeDocument>>>;

/// In-flight merges keyed by `uri@version#generation`, so a merge started
/// before a cache flush is never joined after it.
#[derive(Default, Clone)]
struct PendingJobs {
    jobs: Arc<Mutex<HashMap<String, SharedMerge>>>,
}

impl PendingJobs {
    /// Join the running job for `document`, or start one from `job`.
    async fn run<F>(
        &self,
        document: &ActiveDocument,
        generation: u64,
        job: impl FnOnce() -> F,
    ) -> Arc<TypeDocument>
    where
        F: Future<Output = Arc<TypeDocument>> + Send + 'static,
    {
        let key = format!("{}@{}#{}", document.uri(), document.version, generation);
        let shared = {
            let mut jobs = self.jobs.lock();
            match jobs.get(&key) {
                Some(running) => {
                    tracing::debug!("Joining merge already running for {}", key);
                    running.clone()
                }
                None => {
                    let registry = Arc::clone(&self.jobs);
                    let future = job();
                    let cleanup_key = key.clone();
                    let shared = async move {
                        let merged = future.await;
                        registry.lock().remove(&cleanup_key);
                        merged
                    }
                    .boxed()
                    .shared();
                    jobs.insert(key, shared.clone());
                    shared
                }
            }
        };
        shared.await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.jobs.lock().len()
    }
}
