//! Semantic highlighting

pub mod tokens;

pub use tokens::SemanticTokensProvider;
