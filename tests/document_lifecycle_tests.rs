//! Integration tests for the document manager: scheduling, deduplicated
//! opens and eviction.


use futures::future::join_all;
use miniscript_lsp::core::{DocumentEvent, TextDocument, DEFAULT_LATEST_TIMEOUT};
use std::sync::Arc;
use std::time::Duration;
use test_utils::LspTestWorkspace;

// ── Scheduling ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_schedule_is_idempotent() {
    let workspace = LspTestWorkspace::new("ws");
    let manager = workspace.session().document_manager();
    let document = Arc::new(TextDocument::new(workspace.uri("main.ms"), 1, "x = 1"));

    assert!(manager.schedule(Arc::clone(&document)));
    assert!(!manager.schedule(Arc::clone(&document)));

    let processed = manager.get_latest(&document, DEFAULT_LATEST_TIMEOUT).await;
    assert_eq!(processed.version, 1);
    assert!(!manager.is_scheduled(&document.uri));

    // Same version as the cached result
    assert!(!manager.schedule(document));
}

#[tokio::test(start_paused = true)]
async fn test_rapid_edits_are_processed_once() {
    let workspace = LspTestWorkspace::new("ws");
    let manager = workspace.session().document_manager();
    let mut events = manager.subscribe();
    let uri = workspace.uri("main.ms");

    let mut latest = None;
    for version in 1..=5 {
        let document = Arc::new(TextDocument::new(uri.clone(), version, format!("x = {version}")));
        manager.schedule(Arc::clone(&document));
        latest = Some(document);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let latest = latest.unwrap();

    let processed = manager.get_latest(&latest, DEFAULT_LATEST_TIMEOUT).await;
    assert_eq!(processed.version, 5);
    assert_eq!(manager.metrics().get_stats().parse_count, 1);

    let mut processed_events = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, DocumentEvent::Processed { uri: ref processed_uri, .. } if *processed_uri == uri) {
            processed_events += 1;
        }
    }
    assert_eq!(processed_events, 1);
}

#[tokio::test(start_paused = true)]
async fn test_get_latest_without_pending_edit_returns_immediately() {
    let workspace = LspTestWorkspace::new("ws");
    let manager = workspace.session().document_manager();
    let document = Arc::new(TextDocument::new(workspace.uri("main.ms"), 3, "y = 2"));

    let started = tokio::time::Instant::now();
    let processed = manager.get_latest(&document, DEFAULT_LATEST_TIMEOUT).await;
    assert_eq!(processed.version, 3);
    assert!(started.elapsed() < Duration::from_millis(1));
}

// ── Opening ───────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_concurrent_opens_share_one_read() {
    let workspace = LspTestWorkspace::with_latency("ws", Duration::from_millis(20));
    workspace.add_document("lib.ms", "helper = 1");
    let uri = workspace.uri("lib.ms");
    let manager = workspace.session().document_manager();

    let opened = join_all((0..5).map(|_| manager.get_or_open(&uri))).await;
    let opened: Vec<_> = opened.into_iter().map(Option::unwrap).collect();

    assert_eq!(workspace.fs().read_count(&uri), 1);
    assert!(opened.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));

    // Cached afterwards
    manager.get_or_open(&uri).await.unwrap();
    assert_eq!(workspace.fs().read_count(&uri), 1);
}

#[tokio::test(start_paused = true)]
async fn test_open_missing_document() {
    let workspace = LspTestWorkspace::new("ws");
    let manager = workspace.session().document_manager();
    assert!(manager.get_or_open(&workspace.uri("nothing.ms")).await.is_none());
    assert_eq!(manager.cached_count(), 0);
}

// ── Eviction ──────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_clear_evicts_and_announces() {
    let workspace = LspTestWorkspace::new("ws");
    workspace.add_document("main.ms", "x = 1");
    let uri = workspace.uri("main.ms");
    let manager = workspace.session().document_manager();
    let first = workspace.open("main.ms").await;
    let mut events = manager.subscribe();

    manager.clear(&uri);

    match events.try_recv() {
        Ok(DocumentEvent::Cleared { uri: cleared }) => assert_eq!(cleared, uri),
        other => panic!("expected a cleared event, got {other:?}"),
    }
    assert_eq!(manager.cached_count(), 0);

    let reopened = workspace.open("main.ms").await;
    assert!(!Arc::ptr_eq(&first, &reopened));
    assert_eq!(workspace.fs().read_count(&uri), 2);
}

#[tokio::test(start_paused = true)]
async fn test_clear_cancels_pending_edit() {
    let workspace = LspTestWorkspace::new("ws");
    let manager = workspace.session().document_manager();
    let uri = workspace.uri("main.ms");
    manager.schedule(Arc::new(TextDocument::new(uri.clone(), 1, "x = 1")));

    manager.clear(&uri);
    assert!(!manager.is_scheduled(&uri));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(manager.cached_count(), 0);
}
