//! Code structure features

pub mod folding_range;
pub mod symbols;

pub use folding_range::FoldingRangeProvider;
pub use symbols::SymbolsProvider;
