//! Trait abstractions at the boundaries of the core
//!
//! The document manager and mergers depend only on these seams, so tests can
//! swap in the in-memory file system or instrumented parsers.

pub mod file_system;
pub mod language;

pub use file_system::FileSystem;
pub use language::{SourceParser, TypeAnalyzer};
