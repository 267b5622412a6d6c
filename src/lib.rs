//! Language server core for MiniScript
//!
//! Library interface for the LSP server, so the components can be tested
//! without a client on the other end of stdio.

pub mod core;
pub mod features;
pub mod impls;
pub mod message_handler;
pub mod protocol;
pub mod syntax;
pub mod testing;
pub mod traits;
pub mod types;

pub use crate::core::{Configuration, DocumentManager, Session};
pub use message_handler::MessageHandler;
pub use protocol::LspConnection;
