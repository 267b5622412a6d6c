use crate::core::{Configuration, DocumentEvent, LookupHelper, Session, TextDocument};
use crate::features::*;
use crate::impls::WorkspaceFileSystem;
use crate::protocol::LspConnection;
use anyhow::Result;
use lsp_server::{ErrorCode, Notification, Request, RequestId, Response};
use lsp_types::notification::{
    DidChangeConfiguration, DidChangeTextDocument, DidChangeWorkspaceFolders, DidCloseTextDocument,
    DidOpenTextDocument, PublishDiagnostics,
};
use lsp_types::request::{
    Completion, DocumentSymbolRequest, FoldingRangeRequest, GotoDefinition, HoverRequest,
    SemanticTokensFullRequest, SignatureHelpRequest, WorkspaceSymbolRequest,
};
use lsp_types::*;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast::error::RecvError;
use url::Url;

/// Routes LSP messages to the session and the feature providers.
///
/// Notifications are applied in arrival order on the caller's thread.
/// Requests run as tasks on the tokio runtime, so a slow merge never blocks
/// the message loop; a request whose task fails is answered with `null`.
/// Diagnostics are pushed by a background task whenever a document finishes
/// processing.
///
/// Must be created inside a tokio runtime.
pub struct MessageHandler {
    session: Arc<Session>,
    workspace: Arc<WorkspaceFileSystem>,
    connection: Arc<dyn LspConnection>,
    completion_provider: CompletionProvider,
    hover_provider: HoverProvider,
    definition_provider: DefinitionProvider,
    symbols_provider: SymbolsProvider,
    folding_range_provider: FoldingRangeProvider,
    signature_help_provider: SignatureHelpProvider,
    semantic_tokens_provider: SemanticTokensProvider,
    workspace_symbol_provider: WorkspaceSymbolProvider,
}

impl MessageHandler {
    pub fn new(
        session: Arc<Session>,
        workspace: Arc<WorkspaceFileSystem>,
        connection: Arc<dyn LspConnection>,
    ) -> Self {
        let handler = Self {
            session,
            workspace,
            connection,
            completion_provider: CompletionProvider::new(),
            hover_provider: HoverProvider::new(),
            definition_provider: DefinitionProvider::new(),
            symbols_provider: SymbolsProvider::new(),
            folding_range_provider: FoldingRangeProvider::new(),
            signature_help_provider: SignatureHelpProvider::new(),
            semantic_tokens_provider: SemanticTokensProvider::new(),
            workspace_symbol_provider: WorkspaceSymbolProvider::new(),
        };
        handler.spawn_diagnostics_publisher();
        handler
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn handle_request(&self, req: Request) -> Result<()> {
        let req = match Self::cast_request::<Completion>(req) {
            Ok((id, params)) => {
                let uri = params.text_document_position.text_document.uri;
                let position = params.text_document_position.position;
                let enabled = self.session.configuration().autocomplete;
                let provider = self.completion_provider.clone();

                self.respond(id, uri, move |helper| async move {
                    if !enabled {
                        return None;
                    }
                    let items = provider.provide(&helper, position).await;
                    Some(CompletionResponse::Array(items))
                });
                return Ok(());
            }
            Err(req) => req,
        };

        let req = match Self::cast_request::<HoverRequest>(req) {
            Ok((id, params)) => {
                let uri = params.text_document_position_params.text_document.uri;
                let position = params.text_document_position_params.position;
                let enabled = self.session.configuration().hoverdocs;
                let provider = self.hover_provider.clone();

                self.respond(id, uri, move |helper| async move {
                    if !enabled {
                        return None;
                    }
                    provider.provide(&helper, position).await
                });
                return Ok(());
            }
            Err(req) => req,
        };

        let req = match Self::cast_request::<GotoDefinition>(req) {
            Ok((id, params)) => {
                let uri = params.text_document_position_params.text_document.uri;
                let position = params.text_document_position_params.position;
                let provider = self.definition_provider.clone();

                self.respond(id, uri, move |helper| async move {
                    let links = provider.provide(&helper, position).await;
                    if links.is_empty() {
                        None
                    } else {
                        Some(GotoDefinitionResponse::Link(links))
                    }
                });
                return Ok(());
            }
            Err(req) => req,
        };

        let req = match Self::cast_request::<DocumentSymbolRequest>(req) {
            Ok((id, params)) => {
                let provider = self.symbols_provider.clone();
                self.respond(id, params.text_document.uri, move |helper| async move {
                    let symbols = provider.provide(helper.document());
                    Some(DocumentSymbolResponse::Nested(symbols))
                });
                return Ok(());
            }
            Err(req) => req,
        };

        let req = match Self::cast_request::<FoldingRangeRequest>(req) {
            Ok((id, params)) => {
                let provider = self.folding_range_provider.clone();
                self.respond(id, params.text_document.uri, move |helper| async move {
                    Some(provider.provide(helper.document()))
                });
                return Ok(());
            }
            Err(req) => req,
        };

        let req = match Self::cast_request::<SignatureHelpRequest>(req) {
            Ok((id, params)) => {
                let uri = params.text_document_position_params.text_document.uri;
                let position = params.text_document_position_params.position;
                let provider = self.signature_help_provider.clone();

                self.respond(id, uri, move |helper| async move {
                    provider.provide(&helper, position).await
                });
                return Ok(());
            }
            Err(req) => req,
        };

        let req = match Self::cast_request::<SemanticTokensFullRequest>(req) {
            Ok((id, params)) => {
                let provider = self.semantic_tokens_provider.clone();
                self.respond(id, params.text_document.uri, move |helper| async move {
                    let tokens = provider.provide_full(&helper).await;
                    Some(SemanticTokensResult::Tokens(tokens))
                });
                return Ok(());
            }
            Err(req) => req,
        };

        let req = match Self::cast_request::<WorkspaceSymbolRequest>(req) {
            Ok((id, params)) => {
                let manager = Arc::clone(self.session.document_manager());
                let provider = self.workspace_symbol_provider.clone();
                self.reply(id, async move {
                    let symbols = provider.provide(&manager, &params.query).await;
                    Some(WorkspaceSymbolResponse::Flat(symbols))
                });
                return Ok(());
            }
            Err(req) => req,
        };

        tracing::debug!("Unhandled request {}", req.method);
        self.connection.send_response(Response::new_err(
            req.id,
            ErrorCode::MethodNotFound as i32,
            format!("unhandled method {}", req.method),
        ))
    }

    pub fn handle_notification(&self, not: Notification) -> Result<()> {
        let not = match Self::cast_notification::<DidOpenTextDocument>(not) {
            Ok(params) => {
                let item = params.text_document;
                let document = self.workspace.open_document(TextDocument::new(
                    item.uri.as_str(),
                    item.version,
                    item.text,
                ));
                self.session.document_manager().schedule(document);
                return Ok(());
            }
            Err(not) => not,
        };

        let not = match Self::cast_notification::<DidChangeTextDocument>(not) {
            Ok(params) => {
                let uri = params.text_document.uri;
                match self.workspace.change_document(
                    uri.as_str(),
                    params.text_document.version,
                    &params.content_changes,
                ) {
                    Some(document) => {
                        self.session.document_manager().schedule(document);
                    }
                    None => tracing::warn!("Change for {} which is not open", uri.as_str()),
                }
                return Ok(());
            }
            Err(not) => not,
        };

        let not = match Self::cast_notification::<DidCloseTextDocument>(not) {
            Ok(params) => {
                let uri = params.text_document.uri;
                self.workspace.close_document(uri.as_str());
                // Publisher clears diagnostics on the resulting event
                self.session.document_manager().clear(uri.as_str());
                return Ok(());
            }
            Err(not) => not,
        };

        let not = match Self::cast_notification::<DidChangeConfiguration>(not) {
            Ok(params) => {
                self.apply_settings(params.settings);
                return Ok(());
            }
            Err(not) => not,
        };

        match Self::cast_notification::<DidChangeWorkspaceFolders>(not) {
            Ok(params) => {
                let removed: Vec<Url> = Self::folder_urls(&params.event.removed);
                let mut folders: Vec<Url> = self
                    .workspace
                    .workspace_folders()
                    .into_iter()
                    .filter(|folder| !removed.contains(folder))
                    .collect();
                folders.extend(Self::folder_urls(&params.event.added));
                tracing::info!("Workspace folders: {:?}", folders);
                self.workspace.set_workspace_folders(folders);
            }
            Err(not) => {
                // Unknown notification, ignore
                tracing::trace!("Ignoring notification {}", not.method);
            }
        };

        Ok(())
    }

    fn apply_settings(&self, settings: serde_json::Value) {
        match Configuration::from_settings(settings).and_then(Configuration::with_process_env) {
            Ok(configuration) => {
                tracing::info!("Applying settings: {:?}", configuration);
                self.workspace
                    .set_extensions(configuration.file_extensions.clone());
                self.session.update_configuration(configuration);
            }
            Err(err) => tracing::warn!("Ignoring settings update: {}", err),
        }
    }

    fn folder_urls(folders: &[WorkspaceFolder]) -> Vec<Url> {
        folders
            .iter()
            .filter_map(|folder| Url::parse(folder.uri.as_str()).ok())
            .collect()
    }

    /// Run `handler` against the document at `uri` as a task and send its
    /// result back. Unknown documents yield `null`.
    fn respond<T, F, Fut>(&self, id: RequestId, uri: Uri, handler: F)
    where
        T: Serialize + Send + 'static,
        F: FnOnce(LookupHelper) -> Fut + Send + 'static,
        Fut: Future<Output = Option<T>> + Send + 'static,
    {
        let session = Arc::clone(&self.session);
        let workspace = Arc::clone(&self.workspace);
        self.reply(id, async move {
            let helper = Self::lookup_for(&session, &workspace, uri.as_str()).await?;
            handler(helper).await
        });
    }

    /// Run `work` as a task and send its result back, `null` if it fails.
    fn reply<T, Fut>(&self, id: RequestId, work: Fut)
    where
        T: Serialize + Send + 'static,
        Fut: Future<Output = Option<T>> + Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        let work = tokio::spawn(work);

        tokio::spawn(async move {
            let result = match work.await {
                Ok(result) => serde_json::to_value(result).unwrap_or_else(|err| {
                    tracing::error!("Failed to serialize response {}: {}", id, err);
                    serde_json::Value::Null
                }),
                Err(err) => {
                    tracing::error!("Request {} failed: {}", id, err);
                    serde_json::Value::Null
                }
            };
            if let Err(err) = connection.send_response(Response::new_ok(id, result)) {
                tracing::error!("Failed to send response: {}", err);
            }
        });
    }

    async fn lookup_for(
        session: &Arc<Session>,
        workspace: &WorkspaceFileSystem,
        uri: &str,
    ) -> Option<LookupHelper> {
        match workspace.open_document_for(uri) {
            Some(text_document) => Some(session.lookup_latest(&text_document).await),
            None => {
                let document = session.document_manager().get_or_open(uri).await?;
                Some(session.lookup(document))
            }
        }
    }

    fn spawn_diagnostics_publisher(&self) {
        let mut events = self.session.document_manager().subscribe();
        let session: Weak<Session> = Arc::downgrade(&self.session);
        let workspace = Arc::clone(&self.workspace);
        let connection = Arc::clone(&self.connection);
        let provider = DiagnosticsProvider::new();

        tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Diagnostics publisher missed {} document events", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(session) = session.upgrade() else {
                    break;
                };

                let (uri, diagnostics, version) = match event {
                    DocumentEvent::Processed { uri, document } => {
                        // Dependencies opened from disk are not the editor's business
                        if !session.configuration().diagnostic
                            || workspace.open_document_for(&uri).is_none()
                        {
                            continue;
                        }
                        (uri, provider.provide(&document), Some(document.version))
                    }
                    DocumentEvent::Cleared { uri } => (uri, Vec::new(), None),
                };

                let uri = match uri.parse::<Uri>() {
                    Ok(uri) => uri,
                    Err(err) => {
                        tracing::warn!("Cannot publish diagnostics for {}: {}", uri, err);
                        continue;
                    }
                };
                let params = PublishDiagnosticsParams {
                    uri,
                    diagnostics,
                    version,
                };
                if let Err(err) = Self::send_notification::<PublishDiagnostics>(&*connection, params) {
                    tracing::error!("Failed to publish diagnostics: {}", err);
                }
            }
            tracing::debug!("Diagnostics publisher stopped");
        });
    }

    fn cast_request<R>(req: Request) -> std::result::Result<(RequestId, R::Params), Request>
    where
        R: lsp_types::request::Request,
        R::Params: DeserializeOwned,
    {
        match req.extract(R::METHOD) {
            Ok(params) => Ok(params),
            Err(lsp_server::ExtractError::MethodMismatch(req)) => Err(req),
            Err(lsp_server::ExtractError::JsonError { method, error }) => {
                tracing::error!("Failed to deserialize request {}: {}", method, error);
                Err(Request::new(
                    RequestId::from(0),
                    method.to_string(),
                    serde_json::Value::Null,
                ))
            }
        }
    }

    fn cast_notification<N>(not: Notification) -> std::result::Result<N::Params, Notification>
    where
        N: lsp_types::notification::Notification,
        N::Params: DeserializeOwned,
    {
        match not.extract(N::METHOD) {
            Ok(params) => Ok(params),
            Err(lsp_server::ExtractError::MethodMismatch(not)) => Err(not),
            Err(lsp_server::ExtractError::JsonError { method, error }) => {
                tracing::error!("Failed to deserialize notification {}: {}", method, error);
                Err(Notification::new(
                    method.to_string(),
                    serde_json::Value::Null,
                ))
            }
        }
    }

    fn send_notification<N>(connection: &dyn LspConnection, params: N::Params) -> Result<()>
    where
        N: lsp_types::notification::Notification,
        N::Params: Serialize,
    {
        let not = Notification::new(N::METHOD.to_string(), params);
        connection.send_notification(not)?;
        Ok(())
    }
}
