//! Type model of MiniScript documents.
//!
//! [`analyze`] turns a parsed [`Chunk`](crate::syntax::Chunk) into a
//! [`TypeDocument`]; [`TypeDocument::merge`] folds other documents into a new
//! view for cross-file resolution.

mod analyzer;
pub mod builtins;
mod document;
mod entity;

pub use analyzer::analyze;
pub use document::{MergeInput, Scope, TypeDocument};
pub use entity::{Entity, EntityKind, MapType, ParameterInfo, Signature, SourceLocation, Type};
