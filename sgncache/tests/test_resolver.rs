mod common;

use common::{create_test_store, FakeFetcher, MP4_BYTES};
use sgncache::{MediaResolver, PopulateOutcome, ResolutionStatus};
use std::sync::Arc;
use std::time::Duration;

const CLIP: &str = "https://cdn.example.com/media/clip.mp4";

#[tokio::test]
async fn test_cold_cache_returns_remote_then_cached() {
    let fetcher = Arc::new(FakeFetcher::new());
    fetcher.serve(CLIP, MP4_BYTES, Some("video/mp4"));
    let (_dir, store) = create_test_store(fetcher.clone());
    let resolver = MediaResolver::new(store.clone());

    let first = resolver.resolve(CLIP).await;
    assert_eq!(first.status, ResolutionStatus::Remote);
    assert_eq!(first.source, CLIP);

    resolver.wait_for(CLIP).await;

    let second = resolver.resolve(CLIP).await;
    assert_eq!(second.status, ResolutionStatus::Cached);
    assert!(second.source.starts_with("file://"));
    assert_eq!(fetcher.calls(CLIP), 1);
}

#[tokio::test]
async fn test_resolve_does_not_wait_for_the_download() {
    let fetcher = Arc::new(FakeFetcher::gated());
    fetcher.serve(CLIP, MP4_BYTES, Some("video/mp4"));
    let (_dir, store) = create_test_store(fetcher.clone());
    let resolver = MediaResolver::new(store);

    // Le téléchargement est bloqué : resolve doit revenir quand même
    let resolution = tokio::time::timeout(Duration::from_secs(1), resolver.resolve(CLIP))
        .await
        .expect("resolve blocked on population");
    assert_eq!(resolution.status, ResolutionStatus::Remote);

    fetcher.release(1);
    resolver.wait_for(CLIP).await;
}

#[tokio::test]
async fn test_population_is_deduplicated_per_reference() {
    let fetcher = Arc::new(FakeFetcher::gated());
    fetcher.serve(CLIP, MP4_BYTES, Some("video/mp4"));
    let (_dir, store) = create_test_store(fetcher.clone());
    let resolver = MediaResolver::new(store);

    let first = resolver.resolve(CLIP).await;
    let second = resolver.resolve(CLIP).await;
    // Même objet, autre jeton de signature : même clé
    let resigned = resolver.resolve(&format!("{CLIP}?token=fresh")).await;

    assert_eq!(first.status, ResolutionStatus::Remote);
    assert_eq!(second.status, ResolutionStatus::Pending);
    assert_eq!(resigned.status, ResolutionStatus::Pending);
    assert!(resolver.is_populating(CLIP).await);

    fetcher.release(1);
    resolver.wait_for(CLIP).await;

    assert_eq!(fetcher.total_calls(), 1);
    assert!(!resolver.is_populating(CLIP).await);
}

#[tokio::test]
async fn test_failed_population_is_retried_on_next_resolve() {
    let fetcher = Arc::new(FakeFetcher::new());
    fetcher.fail(CLIP, 500);
    let (_dir, store) = create_test_store(fetcher.clone());
    let resolver = MediaResolver::new(store.clone());

    assert_eq!(resolver.resolve(CLIP).await.status, ResolutionStatus::Remote);
    resolver.wait_for(CLIP).await;
    assert!(!store.has(&store.key_for(CLIP)).await);

    fetcher.serve(CLIP, MP4_BYTES, Some("video/mp4"));
    assert_eq!(resolver.resolve(CLIP).await.status, ResolutionStatus::Remote);
    resolver.wait_for(CLIP).await;

    assert_eq!(fetcher.calls(CLIP), 2);
    assert_eq!(resolver.resolve(CLIP).await.status, ResolutionStatus::Cached);
}

#[tokio::test]
async fn test_cached_uri_never_populates() {
    let fetcher = Arc::new(FakeFetcher::new());
    fetcher.serve(CLIP, MP4_BYTES, Some("video/mp4"));
    let (_dir, store) = create_test_store(fetcher.clone());
    let resolver = MediaResolver::new(store);

    assert!(resolver.cached_uri(CLIP).await.is_none());
    assert!(!resolver.is_populating(CLIP).await);
    assert_eq!(fetcher.total_calls(), 0);
}

#[tokio::test]
async fn test_populate_waits_for_in_flight_population() {
    let fetcher = Arc::new(FakeFetcher::gated());
    fetcher.serve(CLIP, MP4_BYTES, Some("video/mp4"));
    let (_dir, store) = create_test_store(fetcher.clone());
    let resolver = Arc::new(MediaResolver::new(store));

    assert_eq!(resolver.resolve(CLIP).await.status, ResolutionStatus::Remote);

    let waiting = {
        let resolver = resolver.clone();
        tokio::spawn(async move { resolver.populate(CLIP).await })
    };
    fetcher.release(1);

    // Selon l'ordonnancement, la copie peut déjà être terminée
    let outcome = waiting.await.unwrap();
    assert!(matches!(
        outcome,
        PopulateOutcome::Populated | PopulateOutcome::AlreadyCached
    ));
    assert_eq!(resolver.populate(CLIP).await, PopulateOutcome::AlreadyCached);
    assert_eq!(fetcher.total_calls(), 1);
}
