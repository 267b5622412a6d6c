//! In-memory file system for tests
//!
//! Documents live in a map keyed by URI. Reads can be delayed to simulate a
//! slow disk and are counted per URI, so tests can assert deduplication.

use crate::core::TextDocument;
use crate::traits::FileSystem;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct MockFileSystem {
    documents: RwLock<HashMap<String, Arc<TextDocument>>>,
    reads: RwLock<HashMap<String, usize>>,
    total_reads: AtomicUsize,
    workspace_folder: Option<String>,
    latency: Option<Duration>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workspace_folder(mut self, uri: impl Into<String>) -> Self {
        self.workspace_folder = Some(uri.into());
        self
    }

    /// Delay every `get_text_document` call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn add(&self, uri: &str, text: &str) {
        self.add_document(uri, 0, text);
    }

    pub fn add_document(&self, uri: &str, version: i32, text: &str) {
        self.documents
            .write()
            .insert(uri.to_string(), Arc::new(TextDocument::new(uri, version, text)));
    }

    pub fn remove(&self, uri: &str) -> bool {
        self.documents.write().remove(uri).is_some()
    }

    pub fn read_count(&self, uri: &str) -> usize {
        self.reads.read().get(uri).copied().unwrap_or(0)
    }

    pub fn total_reads(&self) -> usize {
        self.total_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FileSystem for MockFileSystem {
    async fn get_text_document(&self, uri: &str) -> Option<Arc<TextDocument>> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        *self.reads.write().entry(uri.to_string()).or_insert(0) += 1;
        self.total_reads.fetch_add(1, Ordering::SeqCst);
        self.documents.read().get(uri).cloned()
    }

    async fn get_workspace_related_files(&self) -> Vec<String> {
        let mut uris: Vec<String> = self.documents.read().keys().cloned().collect();
        uris.sort();
        uris
    }

    async fn get_workspace_folder_uri(&self, _uri: &str) -> Option<String> {
        self.workspace_folder.clone()
    }

    async fn find_existing_path(&self, candidates: &[String]) -> Option<String> {
        let documents = self.documents.read();
        candidates
            .iter()
            .find(|candidate| documents.contains_key(candidate.as_str()))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_reads_are_counted_per_uri() {
        let fs = MockFileSystem::new();
        fs.add("file:///a.ms", "x = 1");
        assert!(fs.get_text_document("file:///a.ms").await.is_some());
        assert!(fs.get_text_document("file:///missing.ms").await.is_none());
        assert_eq!(fs.read_count("file:///a.ms"), 1);
        assert_eq!(fs.total_reads(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_existence_checks_do_not_count_as_reads() {
        let fs = MockFileSystem::new();
        fs.add("file:///a.ms", "x = 1");
        let found = fs
            .find_existing_path(&["file:///a".into(), "file:///a.ms".into()])
            .await;
        assert_eq!(found.as_deref(), Some("file:///a.ms"));
        assert_eq!(fs.total_reads(), 0);
    }
}
