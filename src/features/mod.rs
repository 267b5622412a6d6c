//! LSP feature providers organized by category
//!
//! Providers are thin adapters: they ask a [`LookupHelper`](crate::core::LookupHelper)
//! or an [`ActiveDocument`](crate::core::ActiveDocument) and convert the
//! answer to protocol types.

pub mod diagnostics;
pub mod edit;
pub mod navigation;
pub mod semantic;
pub mod structure;

pub use diagnostics::DiagnosticsProvider;
pub use edit::{CompletionProvider, SignatureHelpProvider};
pub use navigation::{DefinitionProvider, HoverProvider, WorkspaceSymbolProvider};
pub use semantic::SemanticTokensProvider;
pub use structure::{FoldingRangeProvider, SymbolsProvider};

use crate::syntax::{Position, Span};

pub(crate) fn to_lsp_position(position: Position) -> lsp_types::Position {
    lsp_types::Position::new(position.line, position.character)
}

pub(crate) fn from_lsp_position(position: lsp_types::Position) -> Position {
    Position::new(position.line, position.character)
}

pub(crate) fn span_to_range(span: Span) -> lsp_types::Range {
    lsp_types::Range::new(to_lsp_position(span.start), to_lsp_position(span.end))
}

/// Text of `line` left of the UTF-16 column `character`.
pub(crate) fn text_before(line: &str, character: u32) -> String {
    let mut units = 0;
    line.chars()
        .take_while(|ch| {
            units += ch.len_utf16();
            units <= character as usize
        })
        .collect()
}
