use crate::core::LookupHelper;
use crate::features::{from_lsp_position, span_to_range};
use crate::types::{Entity, EntityKind};
use lsp_types::*;

/// Provides hover information (signature and documentation)
#[derive(Clone, Default)]
pub struct HoverProvider;

impl HoverProvider {
    pub fn new() -> Self {
        Self
    }

    pub async fn provide(&self, helper: &LookupHelper, position: Position) -> Option<Hover> {
        let result = helper.lookup_ast(from_lsp_position(position))?;
        let entity = helper.lookup_type_info(&result).await?;
        if entity.name.is_empty() {
            return None;
        }

        Some(Hover {
            contents: HoverContents::Markup(MarkupContent {
                kind: MarkupKind::Markdown,
                value: Self::render(&entity),
            }),
            range: Some(span_to_range(result.closest.span())),
        })
    }

    fn render(entity: &Entity) -> String {
        let mut value = format!("```miniscript\n{}\n```", entity.signature_label());
        if let Some(documentation) = entity.documentation {
            value.push_str("\n\n");
            value.push_str(documentation);
        }
        if entity.kind == EntityKind::Namespace {
            if let Some(map) = entity.ty.as_map() {
                let members: Vec<&str> = map.properties.keys().map(String::as_str).collect();
                if !members.is_empty() {
                    value.push_str(&format!("\n\nExports: `{}`", members.join("`, `")));
                }
            }
        }
        if let Some(source) = entity.declaration() {
            value.push_str(&format!("\n\nDefined in {}:{}", source.uri, source.span.start.line + 1));
        }
        value
    }
}
