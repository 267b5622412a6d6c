//! File system seam between the core and the editor/workspace.

use crate::core::TextDocument;
use async_trait::async_trait;
use std::sync::Arc;

/// Source of document contents and workspace layout.
///
/// Every method is fallible-but-non-fatal: `None` or an empty list means the
/// document or folder is unavailable, never an error the core must surface.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Current content of `uri`, preferring an editor buffer over the disk.
    async fn get_text_document(&self, uri: &str) -> Option<Arc<TextDocument>>;

    /// URIs of every workspace file with a recognized extension.
    async fn get_workspace_related_files(&self) -> Vec<String>;

    /// URI of the workspace folder containing `uri`.
    async fn get_workspace_folder_uri(&self, uri: &str) -> Option<String>;

    /// The first candidate URI that resolves to a readable document.
    async fn find_existing_path(&self, candidates: &[String]) -> Option<String> {
        for candidate in candidates {
            if self.get_text_document(candidate).await.is_some() {
                return Some(candidate.clone());
            }
        }
        None
    }
}
