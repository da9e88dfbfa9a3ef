use sgnplaylist::{PlaylistItem, ScreenSettings, SnapshotStore};

fn items() -> Vec<PlaylistItem> {
    vec![
        PlaylistItem::video("a", "https://cdn.example.com/a.mp4", 30),
        PlaylistItem::image("b", "https://cdn.example.com/b.png", 8)
            .with_window(Some("09:00"), Some("18:00"))
            .with_days(&[1, 2, 3, 4, 5]),
    ]
}

#[tokio::test]
async fn test_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::in_dir(dir.path());

    let screen = ScreenSettings {
        audio_enabled: true,
        active: true,
    };
    store.save(&items(), Some(screen)).await.unwrap();

    let snapshot = store.load().await.unwrap();
    assert_eq!(snapshot.items, items());
    assert_eq!(snapshot.screen, Some(screen));
}

#[tokio::test]
async fn test_missing_snapshot_is_none() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::in_dir(dir.path().join("nested"));
    assert!(store.load().await.is_none());
}

#[tokio::test]
async fn test_corrupt_snapshot_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::in_dir(dir.path());
    std::fs::write(store.path(), "{ not json").unwrap();

    assert!(store.load().await.is_none());
}

#[tokio::test]
async fn test_save_replaces_previous_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::in_dir(dir.path());

    store.save(&items(), None).await.unwrap();
    store.save(&items()[..1], None).await.unwrap();

    let snapshot = store.load().await.unwrap();
    assert_eq!(snapshot.items.len(), 1);

    // Aucun fichier temporaire ne traîne
    let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(leftovers, 1);
}
