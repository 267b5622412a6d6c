//! Property tests for merged-view cache keys and their registration.

use miniscript_lsp::core::{DocumentMergerCache, TextDocument};
use miniscript_lsp::types::TypeDocument;
use proptest::prelude::*;
use std::sync::Arc;

fn documents(pairs: &[(u8, i32)]) -> Vec<TextDocument> {
    pairs
        .iter()
        .map(|(file, version)| TextDocument::new(format!("file:///ws/{file}.ms"), *version, ""))
        .collect()
}

proptest! {
    #[test]
    fn test_key_ignores_dependency_order(
        pairs in prop::collection::vec((0u8..16, 0i32..4), 0..12),
        rotation in 0usize..12,
    ) {
        let source = TextDocument::new("file:///ws/main.ms", 1, "");
        let forward = documents(&pairs);
        let mut shuffled = forward.clone();
        shuffled.reverse();
        if !shuffled.is_empty() {
            let by = rotation % shuffled.len();
            shuffled.rotate_left(by);
        }

        prop_assert_eq!(
            DocumentMergerCache::create_cache_key(&source, &forward),
            DocumentMergerCache::create_cache_key(&source, &shuffled)
        );
    }

    #[test]
    fn test_repeated_dependencies_count_once(
        pairs in prop::collection::vec((0u8..16, 0i32..4), 1..8),
    ) {
        let source = TextDocument::new("file:///ws/main.ms", 1, "");
        let once = documents(&pairs);
        let twice: Vec<TextDocument> = once.iter().chain(once.iter()).cloned().collect();

        prop_assert_eq!(
            DocumentMergerCache::create_cache_key(&source, &once),
            DocumentMergerCache::create_cache_key(&source, &twice)
        );
    }
}

#[test]
fn test_source_version_changes_key() {
    let dependencies = documents(&[(1, 0), (2, 3)]);
    let v1 = TextDocument::new("file:///ws/main.ms", 1, "");
    let v2 = TextDocument::new("file:///ws/main.ms", 2, "");
    assert_ne!(
        DocumentMergerCache::create_cache_key(&v1, &dependencies),
        DocumentMergerCache::create_cache_key(&v2, &dependencies)
    );
}

#[test]
fn test_registering_a_new_key_flushes_the_old_view() {
    let cache = DocumentMergerCache::new();
    let view = Arc::new(TypeDocument::empty("file:///ws/main.ms"));

    cache.store(0, 1, "file:///ws/main.ms", Arc::clone(&view));
    assert!(cache.get(1).is_some());

    cache.store(0, 2, "file:///ws/main.ms", view);
    assert!(cache.get(1).is_none());
    assert!(cache.get(2).is_some());
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_flush_by_uri() {
    let cache = DocumentMergerCache::new();
    cache.store(0, 7, "file:///ws/a.ms", Arc::new(TypeDocument::empty("file:///ws/a.ms")));
    cache.store(0, 8, "file:///ws/b.ms", Arc::new(TypeDocument::empty("file:///ws/b.ms")));

    assert!(cache.flush_cache_key("file:///ws/a.ms"));
    assert!(!cache.flush_cache_key("file:///ws/a.ms"));
    assert!(cache.get(7).is_none());
    assert!(cache.get(8).is_some());
}
