use super::cache::{CacheStats, ExpiringLruCache};
use super::dependency::{DependencyLocation, ImportResolver};
use super::merger::DocumentMergerCache;
use super::metrics::AnalysisMetrics;
use super::scheduler::DocumentScheduler;
use super::text_document::TextDocument;
use crate::impls::MiniScriptBridge;
use crate::syntax::{Chunk, DirectiveKind, SyntaxError};
use crate::traits::{FileSystem, SourceParser, TypeAnalyzer};
use crate::types::TypeDocument;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, OnceCell};

const RESULTS_CAPACITY: usize = 100;
const RESULTS_TTL: Duration = Duration::from_secs(20 * 60);
const EVENT_CAPACITY: usize = 256;

/// How long [`DocumentManager::get_latest`] waits for a pending edit by default.
pub const DEFAULT_LATEST_TIMEOUT: Duration = Duration::from_millis(5000);

/// Result of parsing and analyzing one document at one version.
///
/// Never mutated after construction apart from the lazily computed
/// dependency list; a newer version replaces the whole value.
pub struct ActiveDocument {
    pub version: i32,
    pub text_document: Arc<TextDocument>,
    pub type_document: Arc<TypeDocument>,
    /// `None` when the parser could not produce any tree.
    pub parsed_payload: Option<Arc<Chunk>>,
    pub errors: Vec<SyntaxError>,
    resolver: Arc<ImportResolver>,
    dependencies: OnceCell<Vec<DependencyLocation>>,
}

impl std::fmt::Debug for ActiveDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveDocument")
            .field("uri", &self.text_document.uri)
            .field("version", &self.version)
            .field("parsed", &self.parsed_payload.is_some())
            .field("errors", &self.errors.len())
            .field("dependencies", &self.dependencies.get().map(Vec::len))
            .finish()
    }
}

impl ActiveDocument {
    pub fn uri(&self) -> &str {
        &self.text_document.uri
    }

    /// Resolved include/import edges, in source order without duplicates.
    /// Directives whose target does not exist are left out.
    pub async fn get_dependencies(&self) -> &[DependencyLocation] {
        self.dependencies
            .get_or_init(|| self.resolve_dependencies())
            .await
    }

    async fn resolve_dependencies(&self) -> Vec<DependencyLocation> {
        let Some(chunk) = &self.parsed_payload else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        let mut dependencies = Vec::new();
        for directive in &chunk.dependencies {
            let Some(location) = self.resolver.resolve(self.uri(), &directive.path).await else {
                continue;
            };
            let dependency = match directive.kind {
                DirectiveKind::Include => DependencyLocation::include(location),
                DirectiveKind::Import => DependencyLocation::import(location, directive.alias.clone()),
            };
            if seen.insert(dependency.clone()) {
                dependencies.push(dependency);
            }
        }

        tracing::debug!("{} has {} dependencies", self.uri(), dependencies.len());
        dependencies
    }
}

/// Lifecycle notifications, one variant per event.
#[derive(Debug, Clone)]
pub enum DocumentEvent {
    Processed {
        uri: String,
        document: Arc<ActiveDocument>,
    },
    Cleared {
        uri: String,
    },
}

type PendingOpen = Shared<BoxFuture<'static, Option<Arc<ActiveDocument>>>>;

/// Sole owner of [`ActiveDocument`]s.
///
/// Edits go through [`schedule`](Self::schedule) and are processed once they
/// settle; queries use [`get`](Self::get), [`get_latest`](Self::get_latest)
/// or [`get_or_open`](Self::get_or_open). Must be created inside a tokio
/// runtime.
pub struct DocumentManager {
    fs: Arc<dyn FileSystem>,
    parser: Arc<dyn SourceParser>,
    analyzer: Arc<dyn TypeAnalyzer>,
    resolver: RwLock<Arc<ImportResolver>>,
    results: Mutex<ExpiringLruCache<String, Arc<ActiveDocument>>>,
    stats: Mutex<CacheStats>,
    scheduler: Arc<DocumentScheduler>,
    pending_opens: Mutex<HashMap<String, PendingOpen>>,
    events: broadcast::Sender<DocumentEvent>,
    merger_cache: Arc<DocumentMergerCache>,
    metrics: AnalysisMetrics,
}

impl std::fmt::Debug for DocumentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentManager")
            .field("cached", &self.results.lock().len())
            .field("pending", &self.scheduler.pending_count())
            .finish_non_exhaustive()
    }
}

impl DocumentManager {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        merger_cache: Arc<DocumentMergerCache>,
        extensions: Vec<String>,
        processing_timeout: Duration,
    ) -> Arc<Self> {
        Self::with_language(
            fs,
            merger_cache,
            extensions,
            processing_timeout,
            Arc::new(MiniScriptBridge),
            Arc::new(MiniScriptBridge),
        )
    }

    pub fn with_language(
        fs: Arc<dyn FileSystem>,
        merger_cache: Arc<DocumentMergerCache>,
        extensions: Vec<String>,
        processing_timeout: Duration,
        parser: Arc<dyn SourceParser>,
        analyzer: Arc<dyn TypeAnalyzer>,
    ) -> Arc<Self> {
        let (scheduler, receiver) = DocumentScheduler::new(processing_timeout);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let resolver = Arc::new(ImportResolver::new(Arc::clone(&fs), extensions));

        let manager = Arc::new(Self {
            fs,
            parser,
            analyzer,
            resolver: RwLock::new(resolver),
            results: Mutex::new(ExpiringLruCache::new(RESULTS_CAPACITY, RESULTS_TTL)),
            stats: Mutex::new(CacheStats::default()),
            scheduler,
            pending_opens: Mutex::new(HashMap::new()),
            events,
            merger_cache,
            metrics: AnalysisMetrics::new(),
        });

        tokio::spawn(Self::listen(Arc::downgrade(&manager), receiver));
        manager
    }

    async fn listen(manager: Weak<Self>, mut receiver: mpsc::UnboundedReceiver<Arc<TextDocument>>) {
        while let Some(dispatched) = receiver.recv().await {
            let Some(manager) = manager.upgrade() else {
                break;
            };
            // The pending entry may hold newer content than what was dispatched
            if let Some(document) = manager.scheduler.take(&dispatched.uri) {
                manager.process(document);
            }
        }
    }

    pub fn file_system(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    pub fn metrics(&self) -> &AnalysisMetrics {
        &self.metrics
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DocumentEvent> {
        self.events.subscribe()
    }

    /// Use a new set of candidate extensions for documents processed from now on.
    pub fn set_extensions(&self, extensions: Vec<String>) {
        *self.resolver.write() = Arc::new(ImportResolver::new(Arc::clone(&self.fs), extensions));
    }

    pub fn set_processing_timeout(&self, timeout: Duration) {
        self.scheduler.set_timeout(timeout);
    }

    pub fn is_scheduled(&self, uri: &str) -> bool {
        self.scheduler.is_scheduled(uri)
    }

    /// Queue `document` for processing. Returns `false` if the cached result
    /// already has this version or the URI is already pending.
    pub fn schedule(&self, document: Arc<TextDocument>) -> bool {
        if let Some(cached) = self.results.lock().get(&document.uri) {
            if cached.version == document.version {
                return false;
            }
        }
        self.scheduler.schedule(document)
    }

    /// Cached result for `document`'s URI, processing it inline on a miss.
    pub fn get(&self, document: &Arc<TextDocument>) -> Arc<ActiveDocument> {
        if let Some(cached) = self.cached(&document.uri) {
            return cached;
        }
        self.process(Arc::clone(document))
    }

    /// Like [`get`](Self::get), but first waits for a pending edit of the
    /// document to be processed, for at most `timeout`. Never fails: on
    /// timeout the best available result is returned.
    pub async fn get_latest(&self, document: &Arc<TextDocument>, timeout: Duration) -> Arc<ActiveDocument> {
        let mut events = self.events.subscribe();
        if !self.scheduler.is_scheduled(&document.uri) {
            return self.get(document);
        }

        let uri = document.uri.as_str();
        let processed = async {
            loop {
                match events.recv().await {
                    Ok(DocumentEvent::Processed { uri: processed_uri, document }) if processed_uri == uri => {
                        return Some(document);
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!("Missed {} document events", skipped);
                        if !self.scheduler.is_scheduled(uri) {
                            return None;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        };

        match tokio::time::timeout(timeout, processed).await {
            Ok(Some(latest)) => latest,
            Ok(None) => self.get(document),
            Err(_) => {
                tracing::debug!("Timed out waiting for {}, using best available result", uri);
                self.get(document)
            }
        }
    }

    /// Result for a document that may not be open in the editor. Concurrent
    /// calls for the same URI share a single read. `None` if the file system
    /// cannot provide the document.
    pub async fn get_or_open(self: &Arc<Self>, uri: &str) -> Option<Arc<ActiveDocument>> {
        if let Some(cached) = self.cached(uri) {
            return Some(cached);
        }

        let open = {
            let mut pending = self.pending_opens.lock();
            match pending.get(uri) {
                Some(open) => open.clone(),
                None => {
                    let open = Self::open(Arc::downgrade(self), uri.to_string())
                        .boxed()
                        .shared();
                    pending.insert(uri.to_string(), open.clone());
                    open
                }
            }
        };
        open.await
    }

    async fn open(manager: Weak<Self>, uri: String) -> Option<Arc<ActiveDocument>> {
        let manager = manager.upgrade()?;
        let opened = match manager.fs.get_text_document(&uri).await {
            Some(document) => Some(manager.get(&document)),
            None => {
                tracing::debug!("Document {} is unavailable", uri);
                None
            }
        };
        manager.pending_opens.lock().remove(&uri);
        opened
    }

    /// Evict `uri` (the editor closed it) and announce it.
    pub fn clear(&self, uri: &str) {
        self.scheduler.cancel(uri);
        self.results.lock().remove(&uri.to_string());
        self.merger_cache.flush_cache_key(uri);
        tracing::debug!("Cleared {}", uri);
        let _ = self.events.send(DocumentEvent::Cleared {
            uri: uri.to_string(),
        });
    }

    pub fn cached_count(&self) -> usize {
        self.results.lock().len()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.lock().clone()
    }

    pub fn maybe_log_stats(&self) {
        self.stats.lock().maybe_log("documents");
        self.metrics.maybe_log_stats();
    }

    fn cached(&self, uri: &str) -> Option<Arc<ActiveDocument>> {
        let cached = self.results.lock().get(&uri.to_string());
        let mut stats = self.stats.lock();
        if cached.is_some() {
            stats.record_hit();
        } else {
            stats.record_miss();
        }
        cached
    }

    fn process(&self, text_document: Arc<TextDocument>) -> Arc<ActiveDocument> {
        let started = std::time::Instant::now();
        let uri = text_document.uri.clone();

        let (parsed_payload, errors, type_document) = match self.parser.parse(&text_document.text) {
            Ok(parsed) => {
                let type_document = self.analyzer.analyze(&uri, &parsed.chunk);
                (Some(Arc::new(parsed.chunk)), parsed.errors, type_document)
            }
            Err(err) => {
                tracing::warn!("Parser failed on {}: {}", uri, err);
                (None, vec![err], TypeDocument::empty(uri.as_str()))
            }
        };

        let document = Arc::new(ActiveDocument {
            version: text_document.version,
            text_document,
            type_document: Arc::new(type_document),
            parsed_payload,
            errors,
            resolver: self.resolver.read().clone(),
            dependencies: OnceCell::new(),
        });

        self.results.lock().insert(uri.clone(), Arc::clone(&document));
        self.merger_cache.flush_cache_key(&uri);
        self.metrics.record_parse(started.elapsed());
        tracing::debug!(
            "Processed {} (version {}, {} errors)",
            uri,
            document.version,
            document.errors.len()
        );

        let _ = self.events.send(DocumentEvent::Processed {
            uri,
            document: Arc::clone(&document),
        });
        document
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dependency::DependencyKind;
    use crate::syntax::ParseResult;
    use crate::testing::MockFileSystem;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TIMEOUT: Duration = Duration::from_millis(50);

    fn manager(fs: MockFileSystem) -> Arc<DocumentManager> {
        DocumentManager::new(
            Arc::new(fs),
            Arc::new(DocumentMergerCache::new()),
            vec!["src".into(), "ms".into()],
            TIMEOUT,
        )
    }

    fn doc(uri: &str, version: i32, text: &str) -> Arc<TextDocument> {
        Arc::new(TextDocument::new(uri, version, text))
    }

    struct CountingParser {
        parses: AtomicUsize,
    }

    impl SourceParser for CountingParser {
        fn parse(&self, text: &str) -> Result<ParseResult, SyntaxError> {
            self.parses.fetch_add(1, Ordering::SeqCst);
            MiniScriptBridge.parse(text)
        }
    }

    struct FailingParser;

    impl SourceParser for FailingParser {
        fn parse(&self, _text: &str) -> Result<ParseResult, SyntaxError> {
            Err(SyntaxError {
                kind: crate::syntax::SyntaxErrorKind::Parser,
                message: "internal failure".into(),
                span: Default::default(),
            })
        }
    }

    // ── Processing ────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_get_processes_inline_then_caches() {
        let manager = manager(MockFileSystem::new());
        let text = doc("file:///a.ms", 1, "x = 1");
        let first = manager.get(&text);
        let second = manager.get(&text);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.type_document.root().entities.contains_key("x"));
        assert_eq!(manager.metrics().get_stats().parse_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_syntax_errors_are_data() {
        let manager = manager(MockFileSystem::new());
        let active = manager.get(&doc("file:///a.ms", 1, "x = (\ny = 2"));
        assert!(!active.errors.is_empty());
        assert!(active.parsed_payload.is_some());
        assert!(active.type_document.root().entities.contains_key("y"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_parser_failure_yields_empty_document() {
        let manager = DocumentManager::with_language(
            Arc::new(MockFileSystem::new()),
            Arc::new(DocumentMergerCache::new()),
            Vec::new(),
            TIMEOUT,
            Arc::new(FailingParser),
            Arc::new(MiniScriptBridge),
        );
        let active = manager.get(&doc("file:///a.ms", 1, "x = 1"));
        assert!(active.parsed_payload.is_none());
        assert_eq!(active.errors.len(), 1);
        assert!(active.type_document.root().entities.is_empty());
        assert!(active.get_dependencies().await.is_empty());
    }

    // ── Scheduling ────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_schedule_skips_cached_version() {
        let manager = manager(MockFileSystem::new());
        let text = doc("file:///a.ms", 1, "x = 1");
        manager.get(&text);
        assert!(!manager.schedule(Arc::clone(&text)));
        assert!(manager.schedule(doc("file:///a.ms", 2, "x = 2")));
        assert!(!manager.schedule(doc("file:///a.ms", 2, "x = 2")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_edits_process_final_version_once() {
        let parser = Arc::new(CountingParser {
            parses: AtomicUsize::new(0),
        });
        let manager = DocumentManager::with_language(
            Arc::new(MockFileSystem::new()),
            Arc::new(DocumentMergerCache::new()),
            Vec::new(),
            TIMEOUT,
            parser.clone(),
            Arc::new(MiniScriptBridge),
        );
        let mut events = manager.subscribe();

        for version in 1..=3 {
            manager.schedule(doc("file:///a.ms", version, &format!("x = {version}")));
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        match events.recv().await {
            Ok(DocumentEvent::Processed { uri, document }) => {
                assert_eq!(uri, "file:///a.ms");
                assert_eq!(document.version, 3);
            }
            other => panic!("unexpected event {other:?}"),
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(events.try_recv().is_err());
        assert_eq!(parser.parses.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_latest_waits_for_pending_edit() {
        let manager = manager(MockFileSystem::new());
        manager.get(&doc("file:///a.ms", 1, "x = 1"));

        let edited = doc("file:///a.ms", 2, "x = \"two\"");
        manager.schedule(Arc::clone(&edited));
        assert_eq!(manager.get(&edited).version, 1);

        let latest = manager.get_latest(&edited, DEFAULT_LATEST_TIMEOUT).await;
        assert_eq!(latest.version, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_latest_without_pending_edit_is_immediate() {
        let manager = manager(MockFileSystem::new());
        let text = doc("file:///a.ms", 1, "x = 1");
        let started = tokio::time::Instant::now();
        let latest = manager.get_latest(&text, DEFAULT_LATEST_TIMEOUT).await;
        assert_eq!(latest.version, 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_latest_times_out_with_best_effort() {
        let manager = DocumentManager::new(
            Arc::new(MockFileSystem::new()),
            Arc::new(DocumentMergerCache::new()),
            Vec::new(),
            Duration::from_secs(60),
        );
        manager.get(&doc("file:///a.ms", 1, "x = 1"));
        let edited = doc("file:///a.ms", 2, "x = 2");
        manager.schedule(Arc::clone(&edited));

        let latest = manager.get_latest(&edited, Duration::from_millis(100)).await;
        assert_eq!(latest.version, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_evicts_and_cancels() {
        let manager = manager(MockFileSystem::new());
        let mut events = manager.subscribe();
        manager.get(&doc("file:///a.ms", 1, "x = 1"));
        manager.schedule(doc("file:///a.ms", 2, "x = 2"));

        manager.clear("file:///a.ms");
        assert!(!manager.is_scheduled("file:///a.ms"));
        assert_eq!(manager.cached_count(), 0);

        let mut cleared = false;
        while let Ok(event) = events.try_recv() {
            cleared |= matches!(event, DocumentEvent::Cleared { uri } if uri == "file:///a.ms");
        }
        assert!(cleared);
    }

    #[tokio::test(start_paused = true)]
    async fn test_processing_flushes_merger_view() {
        let merger_cache = Arc::new(DocumentMergerCache::new());
        let manager = DocumentManager::new(
            Arc::new(MockFileSystem::new()),
            Arc::clone(&merger_cache),
            Vec::new(),
            TIMEOUT,
        );
        merger_cache.store(0, 9, "file:///a.ms", Arc::new(TypeDocument::empty("file:///a.ms")));
        manager.get(&doc("file:///a.ms", 1, "x = 1"));
        assert!(merger_cache.get(9).is_none());
    }

    // ── Opening and dependencies ──────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_get_or_open_reads_once_and_caches() {
        let fs = Arc::new(MockFileSystem::new());
        fs.add("file:///dep.ms", "y = 1");
        let manager = DocumentManager::new(fs.clone(), Arc::new(DocumentMergerCache::new()), Vec::new(), TIMEOUT);

        let first = manager.get_or_open("file:///dep.ms").await;
        let second = manager.get_or_open("file:///dep.ms").await;
        assert!(first.is_some());
        assert_eq!(fs.read_count("file:///dep.ms"), 1);
        assert!(matches!((first, second), (Some(a), Some(b)) if Arc::ptr_eq(&a, &b)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_or_open_missing_is_none() {
        let manager = manager(MockFileSystem::new());
        assert!(manager.get_or_open("file:///missing.ms").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dependencies_resolved_and_deduplicated() {
        let fs = MockFileSystem::new();
        fs.add("file:///lib.ms", "add = 1");
        fs.add("file:///util.src", "u = 1");
        let manager = manager(fs);

        let main = manager.get(&doc(
            "file:///main.ms",
            1,
            "#include \"lib.ms\"\ninclude \"util\"\nimport \"lib.ms\" as mathlib\n#include \"lib.ms\"\ninclude \"missing.ms\"",
        ));
        let dependencies: Vec<String> = main
            .get_dependencies()
            .await
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            dependencies,
            vec![
                "include!file:///lib.ms",
                "include!file:///util.src",
                "import:mathlib!file:///lib.ms",
            ]
        );
        assert_eq!(main.get_dependencies().await[2].kind, DependencyKind::Import);
    }
}
