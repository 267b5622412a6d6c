//! Production implementations of the seams in [`crate::traits`]

pub mod miniscript_bridge;
pub mod workspace_fs;

pub use miniscript_bridge::MiniScriptBridge;
pub use workspace_fs::WorkspaceFileSystem;
