use crate::core::LookupHelper;
use crate::features::{from_lsp_position, span_to_range};
use lsp_types::*;

/// Provides go-to-definition: every assignment of the entity under the cursor
#[derive(Clone, Default)]
pub struct DefinitionProvider;

impl DefinitionProvider {
    pub fn new() -> Self {
        Self
    }

    pub async fn provide(&self, helper: &LookupHelper, position: Position) -> Vec<LocationLink> {
        let Some(result) = helper.lookup_ast(from_lsp_position(position)) else {
            return Vec::new();
        };
        let origin = span_to_range(result.closest.span());

        helper
            .find_all_assignments_of_item(&result)
            .await
            .into_iter()
            .filter_map(|source| {
                let target_uri = match source.uri.parse::<Uri>() {
                    Ok(uri) => uri,
                    Err(err) => {
                        tracing::warn!("Skipping definition in {}: {}", source.uri, err);
                        return None;
                    }
                };
                let range = span_to_range(source.span);
                Some(LocationLink {
                    origin_selection_range: Some(origin),
                    target_uri,
                    target_range: range,
                    target_selection_range: range,
                })
            })
            .collect()
    }
}
