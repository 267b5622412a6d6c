//! Testing utilities with mock providers
//!
//! An in-memory file system with read counting and optional latency, for
//! exercising the document manager and mergers without touching the disk.

pub mod mocks;
pub use mocks::*;
