//! Owner of the shared state of one language server session.

use super::config::{Configuration, MergeStrategy};
use super::document::{ActiveDocument, DocumentManager, DEFAULT_LATEST_TIMEOUT};
use super::lookup::LookupHelper;
use super::merger::{DependencyMerger, DocumentMergerCache, MergeContext, WorkspaceMerger};
use super::text_document::TextDocument;
use crate::traits::FileSystem;
use crate::types::TypeDocument;
use parking_lot::RwLock;
use std::sync::Arc;

/// Wires the document manager, the merger cache and both merge strategies
/// together. Every piece is constructed here and handed out by reference, so
/// independent sessions never share state.
pub struct Session {
    configuration: RwLock<Configuration>,
    fs: Arc<dyn FileSystem>,
    document_manager: Arc<DocumentManager>,
    merger_cache: Arc<DocumentMergerCache>,
    dependency_merger: DependencyMerger,
    workspace_merger: WorkspaceMerger,
}

impl Session {
    /// Must be called inside a tokio runtime.
    pub fn new(fs: Arc<dyn FileSystem>, configuration: Configuration) -> Arc<Self> {
        let merger_cache = Arc::new(DocumentMergerCache::new());
        let document_manager = DocumentManager::new(
            Arc::clone(&fs),
            Arc::clone(&merger_cache),
            configuration.file_extensions.clone(),
            configuration.processing_timeout(),
        );
        Arc::new(Self {
            configuration: RwLock::new(configuration),
            fs,
            document_manager,
            merger_cache,
            dependency_merger: DependencyMerger::new(),
            workspace_merger: WorkspaceMerger::new(),
        })
    }

    pub fn configuration(&self) -> Configuration {
        self.configuration.read().clone()
    }

    pub fn file_system(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    pub fn document_manager(&self) -> &Arc<DocumentManager> {
        &self.document_manager
    }

    pub fn merger_cache(&self) -> &Arc<DocumentMergerCache> {
        &self.merger_cache
    }

    /// Swap in new settings. Merged views are dropped when the strategy or
    /// the exclude pattern changes.
    pub fn update_configuration(&self, configuration: Configuration) {
        let previous = std::mem::replace(&mut *self.configuration.write(), configuration.clone());

        if previous.type_analyzer != configuration.type_analyzer {
            tracing::info!(
                "Type analyzer settings changed ({:?} -> {:?}), flushing merged views",
                previous.type_analyzer.strategy,
                configuration.type_analyzer.strategy
            );
            self.merger_cache.flush_cache();
        }
        if previous.file_extensions != configuration.file_extensions {
            self.document_manager
                .set_extensions(configuration.file_extensions.clone());
        }
        if previous.processing_timeout_ms != configuration.processing_timeout_ms {
            self.document_manager
                .set_processing_timeout(configuration.processing_timeout());
        }
    }

    pub fn merge_context(&self) -> MergeContext {
        MergeContext {
            document_manager: Arc::clone(&self.document_manager),
            merger_cache: Arc::clone(&self.merger_cache),
            exclude: self.configuration.read().type_analyzer.exclude.clone(),
        }
    }

    /// `document`'s type model with its cross-file view folded in, by the
    /// configured strategy.
    pub async fn merged_type_document(&self, document: &Arc<ActiveDocument>) -> Arc<TypeDocument> {
        let strategy = self.configuration.read().type_analyzer.strategy;
        let context = self.merge_context();
        let merged = match strategy {
            MergeStrategy::Dependency => self.dependency_merger.build(document, &context).await,
            MergeStrategy::Workspace => self.workspace_merger.build(document, &context).await,
        };
        self.merger_cache.maybe_log_stats();
        self.document_manager.maybe_log_stats();
        merged
    }

    pub fn lookup(self: &Arc<Self>, document: Arc<ActiveDocument>) -> LookupHelper {
        LookupHelper::new(Arc::clone(self), document)
    }

    /// Lookup helper over the result for `text_document`, after any pending
    /// edit of it has been processed.
    pub async fn lookup_latest(self: &Arc<Self>, text_document: &Arc<TextDocument>) -> LookupHelper {
        let document = self
            .document_manager
            .get_latest(text_document, DEFAULT_LATEST_TIMEOUT)
            .await;
        self.lookup(document)
    }
}
