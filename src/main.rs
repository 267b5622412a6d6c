use anyhow::{Context, Result};
use lsp_server::{Connection, Message};
use lsp_types::*;
use miniscript_lsp::core::{Configuration, Session};
use miniscript_lsp::features::SemanticTokensProvider;
use miniscript_lsp::impls::WorkspaceFileSystem;
use miniscript_lsp::message_handler::MessageHandler;
use miniscript_lsp::protocol::ConnectionWrapper;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use url::Url;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .init();

    let (connection, io_threads) = Connection::stdio();
    let connection = Arc::new(connection);

    let server_capabilities = serde_json::to_value(ServerCapabilities {
        text_document_sync: Some(TextDocumentSyncCapability::Kind(
            TextDocumentSyncKind::INCREMENTAL,
        )),
        completion_provider: Some(CompletionOptions {
            trigger_characters: Some(vec![".".to_string()]),
            ..Default::default()
        }),
        hover_provider: Some(HoverProviderCapability::Simple(true)),
        signature_help_provider: Some(SignatureHelpOptions {
            trigger_characters: Some(vec!["(".to_string(), ",".to_string()]),
            retrigger_characters: None,
            work_done_progress_options: WorkDoneProgressOptions::default(),
        }),
        definition_provider: Some(OneOf::Left(true)),
        document_symbol_provider: Some(OneOf::Left(true)),
        workspace_symbol_provider: Some(OneOf::Left(true)),
        folding_range_provider: Some(FoldingRangeProviderCapability::Simple(true)),
        semantic_tokens_provider: Some(SemanticTokensServerCapabilities::SemanticTokensOptions(
            SemanticTokensOptions {
                legend: SemanticTokensProvider::legend(),
                full: Some(SemanticTokensFullOptions::Bool(true)),
                ..Default::default()
            },
        )),
        workspace: Some(WorkspaceServerCapabilities {
            workspace_folders: Some(WorkspaceFoldersServerCapabilities {
                supported: Some(true),
                change_notifications: Some(OneOf::Left(true)),
            }),
            file_operations: None,
        }),
        ..Default::default()
    })?;

    let initialization_params = connection.initialize(server_capabilities)?;
    let params: InitializeParams = serde_json::from_value(initialization_params)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("miniscript-lsp")
        .build()
        .context("failed to start the async runtime")?;
    let _guard = runtime.enter();

    main_loop(Arc::clone(&connection), params)?;

    drop(_guard);
    runtime.shutdown_background();
    io_threads.join()?;
    tracing::info!("Shut down");

    Ok(())
}

fn main_loop(connection: Arc<Connection>, params: InitializeParams) -> Result<()> {
    let folders = workspace_folders(&params);
    let configuration = initial_configuration(params.initialization_options)?;
    tracing::info!("LSP workspace folders: {:?}", folders);
    tracing::info!("Configuration: {:?}", configuration);

    let workspace = Arc::new(WorkspaceFileSystem::new(
        folders,
        configuration.file_extensions.clone(),
    ));
    let session = Session::new(workspace.clone(), configuration);
    let handler = MessageHandler::new(
        session,
        workspace,
        Arc::new(ConnectionWrapper(Arc::clone(&connection))),
    );

    for msg in &connection.receiver {
        match msg {
            Message::Request(req) => {
                if connection.handle_shutdown(&req)? {
                    return Ok(());
                }
                handler.handle_request(req)?;
            }
            Message::Notification(not) => {
                handler.handle_notification(not)?;
            }
            Message::Response(_resp) => {}
        }
    }

    Ok(())
}

/// `initializationOptions` over defaults, then environment overrides. Bad
/// options fall back to defaults; a bad environment variable is fatal.
fn initial_configuration(options: Option<serde_json::Value>) -> Result<Configuration> {
    let from_options = match options {
        Some(options) => Configuration::from_settings(options).unwrap_or_else(|err| {
            tracing::warn!("Ignoring initializationOptions: {}", err);
            Configuration::default()
        }),
        None => Configuration::default(),
    };
    Ok(from_options.with_process_env()?)
}

#[allow(deprecated)]
fn workspace_folders(params: &InitializeParams) -> Vec<Url> {
    let uris: Vec<&Uri> = match (&params.workspace_folders, &params.root_uri) {
        (Some(folders), _) if !folders.is_empty() => folders.iter().map(|f| &f.uri).collect(),
        (_, Some(root)) => vec![root],
        _ => Vec::new(),
    };
    let folders: Vec<Url> = uris
        .into_iter()
        .filter_map(|uri| Url::parse(uri.as_str()).ok())
        .collect();
    if !folders.is_empty() {
        return folders;
    }

    std::env::current_dir()
        .ok()
        .and_then(|dir| Url::from_directory_path(dir).ok())
        .into_iter()
        .collect()
}
