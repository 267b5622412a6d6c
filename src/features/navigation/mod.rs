//! Navigation features (go-to, hover, workspace search)

pub mod definition;
pub mod hover;
pub mod workspace_symbol;

pub use definition::DefinitionProvider;
pub use hover::HoverProvider;
pub use workspace_symbol::WorkspaceSymbolProvider;
