//! Editing assistance features

pub mod completion;
pub mod signature_help;

pub use completion::CompletionProvider;
pub use signature_help::SignatureHelpProvider;
