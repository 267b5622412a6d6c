//! LSP protocol connection abstractions

use anyhow::Result;
use lsp_server::{Connection, Message, Notification, Response};
use std::sync::Arc;

/// Trait for sending LSP messages - allows mocking for tests.
///
/// Responses are sent from request tasks on the runtime, so implementations
/// must be shareable across threads.
pub trait LspConnection: Send + Sync {
    fn send_response(&self, response: Response) -> Result<()>;
    fn send_notification(&self, notification: Notification) -> Result<()>;
}

/// [`LspConnection`] over the real `lsp_server` transport
pub struct ConnectionWrapper(pub Arc<Connection>);

impl LspConnection for ConnectionWrapper {
    fn send_response(&self, response: Response) -> Result<()> {
        self.0.sender.send(Message::Response(response))?;
        Ok(())
    }

    fn send_notification(&self, notification: Notification) -> Result<()> {
        self.0.sender.send(Message::Notification(notification))?;
        Ok(())
    }
}
