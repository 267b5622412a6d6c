//! File system backed by editor buffers and the local disk

use crate::core::TextDocument;
use crate::traits::FileSystem;
use async_trait::async_trait;
use lsp_types::TextDocumentContentChangeEvent;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

/// Open buffers take precedence over disk contents; files read from disk
/// have version 0.
#[derive(Debug, Default)]
pub struct WorkspaceFileSystem {
    open: RwLock<HashMap<String, Arc<TextDocument>>>,
    folders: RwLock<Vec<Url>>,
    extensions: RwLock<Vec<String>>,
}

impl WorkspaceFileSystem {
    pub fn new(folders: Vec<Url>, extensions: Vec<String>) -> Self {
        Self {
            open: RwLock::new(HashMap::new()),
            folders: RwLock::new(folders),
            extensions: RwLock::new(extensions),
        }
    }

    pub fn set_extensions(&self, extensions: Vec<String>) {
        *self.extensions.write() = extensions;
    }

    pub fn workspace_folders(&self) -> Vec<Url> {
        self.folders.read().clone()
    }

    pub fn set_workspace_folders(&self, folders: Vec<Url>) {
        *self.folders.write() = folders;
    }

    pub fn open_document(&self, document: TextDocument) -> Arc<TextDocument> {
        let document = Arc::new(document);
        self.open
            .write()
            .insert(document.uri.clone(), Arc::clone(&document));
        document
    }

    /// Apply editor changes to an open buffer. `None` if the buffer is not open.
    pub fn change_document(
        &self,
        uri: &str,
        version: i32,
        changes: &[TextDocumentContentChangeEvent],
    ) -> Option<Arc<TextDocument>> {
        let mut open = self.open.write();
        let current = open.get(uri)?;
        let next = Arc::new(current.apply_changes(version, changes));
        open.insert(uri.to_string(), Arc::clone(&next));
        Some(next)
    }

    pub fn close_document(&self, uri: &str) -> Option<Arc<TextDocument>> {
        self.open.write().remove(uri)
    }

    pub fn open_document_for(&self, uri: &str) -> Option<Arc<TextDocument>> {
        self.open.read().get(uri).cloned()
    }

    fn has_extension(path: &Path, extensions: &[String]) -> bool {
        path.extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| {
                extensions
                    .iter()
                    .any(|e| e.trim_start_matches('.') == extension)
            })
    }

    fn walk(root: PathBuf, extensions: Vec<String>) -> Vec<String> {
        ignore::WalkBuilder::new(root)
            .build()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    tracing::debug!("Skipping workspace entry: {}", err);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
            .filter(|entry| Self::has_extension(entry.path(), &extensions))
            .filter_map(|entry| Url::from_file_path(entry.path()).ok())
            .map(String::from)
            .collect()
    }
}

#[async_trait]
impl FileSystem for WorkspaceFileSystem {
    async fn get_text_document(&self, uri: &str) -> Option<Arc<TextDocument>> {
        if let Some(document) = self.open_document_for(uri) {
            return Some(document);
        }

        let path = Url::parse(uri).ok()?.to_file_path().ok()?;
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Some(Arc::new(TextDocument::new(uri, 0, text))),
            Err(err) => {
                tracing::debug!("Cannot read {}: {}", path.display(), err);
                None
            }
        }
    }

    async fn get_workspace_related_files(&self) -> Vec<String> {
        let extensions = self.extensions.read().clone();
        let roots: Vec<PathBuf> = self
            .folders
            .read()
            .iter()
            .filter_map(|folder| folder.to_file_path().ok())
            .collect();

        let mut files = BTreeSet::new();
        for root in roots {
            let extensions = extensions.clone();
            match tokio::task::spawn_blocking(move || Self::walk(root, extensions)).await {
                Ok(found) => files.extend(found),
                Err(err) => tracing::warn!("Workspace walk failed: {}", err),
            }
        }

        // Unsaved buffers count as workspace files too
        for uri in self.open.read().keys() {
            let path = Url::parse(uri).ok().and_then(|url| url.to_file_path().ok());
            if path.is_some_and(|path| Self::has_extension(&path, &extensions)) {
                files.insert(uri.clone());
            }
        }

        files.into_iter().collect()
    }

    async fn get_workspace_folder_uri(&self, uri: &str) -> Option<String> {
        let target = Url::parse(uri).ok()?;
        self.folders
            .read()
            .iter()
            .filter(|folder| folder.scheme() == target.scheme())
            .filter(|folder| {
                let prefix = folder.path().trim_end_matches('/');
                target.path().starts_with(&format!("{prefix}/"))
            })
            .max_by_key(|folder| folder.path().len())
            .map(|folder| folder.to_string())
    }

    async fn find_existing_path(&self, candidates: &[String]) -> Option<String> {
        for candidate in candidates {
            if self.open.read().contains_key(candidate) {
                return Some(candidate.clone());
            }
            let Some(path) = Url::parse(candidate)
                .ok()
                .and_then(|url| url.to_file_path().ok())
            else {
                continue;
            };
            if tokio::fs::metadata(&path)
                .await
                .is_ok_and(|metadata| metadata.is_file())
            {
                return Some(candidate.clone());
            }
        }
        None
    }
}
