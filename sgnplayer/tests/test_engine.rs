mod common;

use chrono::{NaiveDate, NaiveDateTime};
use common::{create_resolver, FakeFetcher, FakeSurface, MP4_BYTES, PNG_BYTES};
use sgncache::{MediaResolver, PopulateOutcome, Preloader};
use sgnplayer::{
    ElementEventKind, EngineEvent, EngineHandle, FaultKind, PlaybackEngine, PlayerSettings,
};
use sgnplaylist::{ManualClock, PlaylistItem, Position, ScreenSettings, SnapshotStore};
use sgnsync::PushBridge;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio::time::timeout;

// 2024-01-08 est un lundi
fn monday(h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 8)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

fn image(id: &str, secs: u32) -> PlaylistItem {
    PlaylistItem::image(id, format!("https://cdn.example.com/{id}.png"), secs)
}

fn video(id: &str, secs: u32) -> PlaylistItem {
    PlaylistItem::video(id, format!("https://cdn.example.com/{id}.mp4"), secs)
}

struct Harness {
    _dir: TempDir,
    fetcher: Arc<FakeFetcher>,
    resolver: Arc<MediaResolver>,
    surface: FakeSurface,
    bridge: PushBridge,
    clock: ManualClock,
}

impl Harness {
    fn new() -> Self {
        let fetcher = FakeFetcher::new();
        let (dir, resolver) = create_resolver(fetcher.clone());
        Self {
            _dir: dir,
            fetcher,
            resolver,
            surface: FakeSurface::new(),
            bridge: PushBridge::new(),
            clock: ManualClock::new(monday(12, 0)),
        }
    }

    fn engine(&self) -> PlaybackEngine<ManualClock> {
        PlaybackEngine::new(
            self.clock.clone(),
            Box::new(self.surface.clone()),
            self.resolver.clone(),
            Arc::new(self.bridge.clone()),
            PlayerSettings::default(),
        )
    }

    fn start(&self, engine: PlaybackEngine<ManualClock>) -> (EngineHandle, broadcast::Receiver<EngineEvent>) {
        let handle = engine.handle();
        let events = handle.subscribe();
        tokio::spawn(engine.run());
        (handle, events)
    }
}

async fn next_event(events: &mut broadcast::Receiver<EngineEvent>) -> EngineEvent {
    timeout(Duration::from_secs(120), events.recv())
        .await
        .expect("no engine event in time")
        .expect("engine events closed")
}

async fn next_advance(events: &mut broadcast::Receiver<EngineEvent>) -> String {
    loop {
        if let EngineEvent::ItemAdvanced { item_id, .. } = next_event(events).await {
            return item_id;
        }
    }
}

/// Laisse la boucle traiter ce qui est en attente
async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test(start_paused = true)]
async fn test_images_loop_on_their_dwell() {
    let h = Harness::new();
    let (handle, mut events) = h.start(h.engine());

    assert_eq!(next_event(&mut events).await, EngineEvent::Standby);
    h.bridge.publish_playlist(vec![image("a", 10), image("b", 20)]);

    assert_eq!(next_advance(&mut events).await, "a");
    let started = tokio::time::Instant::now();
    assert_eq!(next_advance(&mut events).await, "b");
    assert!(started.elapsed() >= Duration::from_secs(9));
    assert_eq!(handle.current_item().unwrap().id, "b");

    assert_eq!(next_advance(&mut events).await, "a");
    assert!(started.elapsed() >= Duration::from_secs(29));
    handle.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_terminal_failure_skips_immediately() {
    let h = Harness::new();
    let (handle, mut events) = h.start(h.engine());
    h.bridge
        .publish_playlist(vec![video("broken", 300), image("next", 10)]);

    assert_eq!(next_advance(&mut events).await, "broken");
    let started = tokio::time::Instant::now();
    // Source distante sans copie locale : une seule chance
    h.resolver.wait_for("https://cdn.example.com/broken.mp4").await;
    h.surface
        .last_element("broken")
        .emit(ElementEventKind::Error("unsupported codec".into()));

    match next_event(&mut events).await {
        EngineEvent::ItemError { item_id, fault } => {
            assert_eq!(item_id, "broken");
            assert!(matches!(fault, FaultKind::TerminalItemFailure { .. }));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(next_advance(&mut events).await, "next");
    assert!(started.elapsed() < Duration::from_secs(5));
    handle.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_video_advances_on_end_of_stream() {
    let h = Harness::new();
    let (handle, mut events) = h.start(h.engine());
    h.bridge
        .publish_playlist(vec![video("clip", 300), image("after", 10)]);

    assert_eq!(next_advance(&mut events).await, "clip");
    settle().await;
    h.surface.last_element("clip").emit(ElementEventKind::Ended);

    assert_eq!(next_advance(&mut events).await, "after");
    handle.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_standby_recovers_when_window_opens() {
    let h = Harness::new();
    let (handle, mut events) = h.start(h.engine());
    assert_eq!(next_event(&mut events).await, EngineEvent::Standby);

    h.bridge
        .publish_playlist(vec![image("lunch", 10).with_window(Some("13:00"), Some("14:00"))]);
    settle().await;
    assert!(handle.schedule_state().is_standby());
    assert!(handle.current_item().is_none());

    h.clock.set(monday(13, 0));
    assert_eq!(
        next_event(&mut events).await,
        EngineEvent::Resumed {
            item_id: "lunch".into()
        }
    );
    assert_eq!(next_advance(&mut events).await, "lunch");
    assert_eq!(handle.schedule_state().position, Position::Playing(0));
    handle.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_replacement_keeps_current_item() {
    let h = Harness::new();
    let (handle, mut events) = h.start(h.engine());
    h.bridge
        .publish_playlist(vec![image("a", 60), image("b", 60), image("c", 60)]);
    assert_eq!(next_advance(&mut events).await, "a");

    h.bridge
        .publish_playlist(vec![image("x", 60), image("a", 60), image("b", 60)]);
    settle().await;

    assert_eq!(handle.schedule_state().position, Position::Playing(1));
    assert_eq!(handle.current_item().unwrap().id, "a");
    assert!(events.try_recv().is_err(), "no restart expected");
    assert_eq!(h.surface.elements_for("a").len(), 1);

    assert_eq!(next_advance(&mut events).await, "b");
    handle.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_replacement_without_current_item_restarts() {
    let h = Harness::new();
    let (handle, mut events) = h.start(h.engine());
    h.bridge.publish_playlist(vec![image("a", 60), image("b", 60)]);
    assert_eq!(next_advance(&mut events).await, "a");

    h.bridge.publish_playlist(vec![image("y", 60), image("z", 60)]);
    assert_eq!(next_advance(&mut events).await, "y");

    h.bridge.publish_playlist(Vec::new());
    assert_eq!(next_event(&mut events).await, EngineEvent::Standby);
    assert!(handle.current_item().is_none());
    handle.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_inactive_screen_holds_position() {
    let h = Harness::new();
    let (handle, mut events) = h.start(h.engine());
    h.bridge.publish_playlist(vec![image("a", 60), image("b", 60)]);
    assert_eq!(next_advance(&mut events).await, "a");

    h.bridge.publish_screen(ScreenSettings {
        audio_enabled: false,
        active: false,
    });
    assert_eq!(next_event(&mut events).await, EngineEvent::Standby);
    assert!(handle.current_item().is_none());
    assert_eq!(handle.schedule_state().position, Position::Playing(0));

    // Pas d'avance pendant l'inactivité
    tokio::time::sleep(Duration::from_secs(180)).await;
    assert!(events.try_recv().is_err());

    h.bridge.publish_screen(ScreenSettings::default());
    assert_eq!(
        next_event(&mut events).await,
        EngineEvent::Resumed {
            item_id: "a".into()
        }
    );
    assert_eq!(next_advance(&mut events).await, "a");
    handle.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_cold_start_renders_snapshot_and_persists_updates() {
    let h = Harness::new();
    let snapshot_dir = tempfile::tempdir().unwrap();
    let snapshot = SnapshotStore::in_dir(snapshot_dir.path());
    snapshot.save(&[image("saved", 60)], None).await.unwrap();

    let engine = h.engine().with_snapshot(snapshot.clone());
    let (handle, mut events) = h.start(engine);

    assert_eq!(next_advance(&mut events).await, "saved");

    h.bridge.publish_playlist(vec![image("fresh", 60)]);
    assert_eq!(next_advance(&mut events).await, "fresh");

    let saved = snapshot.load().await.unwrap();
    assert_eq!(saved.items.len(), 1);
    assert_eq!(saved.items[0].id, "fresh");
    handle.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_screen_before_first_playlist_keeps_snapshot_untouched() {
    let h = Harness::new();
    let snapshot_dir = tempfile::tempdir().unwrap();
    let snapshot = SnapshotStore::in_dir(snapshot_dir.path());

    let engine = h.engine().with_snapshot(snapshot.clone());
    let (handle, mut events) = h.start(engine);
    settle().await;

    h.bridge.publish_screen(ScreenSettings {
        audio_enabled: true,
        active: true,
    });
    settle().await;
    assert!(snapshot.load().await.is_none());

    h.bridge.publish_playlist(vec![image("first", 60)]);
    assert_eq!(next_advance(&mut events).await, "first");

    let saved = snapshot.load().await.unwrap();
    assert_eq!(saved.items[0].id, "first");
    assert_eq!(saved.screen.map(|screen| screen.audio_enabled), Some(true));
    handle.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_replacement_preloads_and_evicts() {
    let h = Harness::new();
    let stale = "https://cdn.example.com/stale.png";
    h.fetcher.serve(stale, PNG_BYTES, "image/png");
    assert_eq!(h.resolver.populate(stale).await, PopulateOutcome::Populated);

    let wanted = "https://cdn.example.com/clip.mp4";
    h.fetcher.serve(wanted, MP4_BYTES, "video/mp4");

    let engine = h
        .engine()
        .with_preloader(Preloader::new(h.resolver.clone(), 2));
    let (handle, mut events) = h.start(engine);
    h.bridge.publish_playlist(vec![video("clip", 60)]);
    assert_eq!(next_advance(&mut events).await, "clip");

    let store = h.resolver.store().clone();
    let wanted_key = store.key_for(wanted);
    let stale_key = store.key_for(stale);
    for _ in 0..100 {
        if store.has(&wanted_key).await && !store.has(&stale_key).await {
            break;
        }
        settle().await;
    }
    assert!(store.has(&wanted_key).await);
    assert!(!store.has(&stale_key).await);
    handle.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_superseded_sweep_keeps_the_current_item_cached() {
    let h = Harness::new();
    let a = "https://cdn.example.com/a.png";
    let slow = "https://cdn.example.com/slow.png";
    h.fetcher.serve(a, PNG_BYTES, "image/png");
    assert_eq!(h.resolver.populate(a).await, PopulateOutcome::Populated);
    // Seule la copie locale de `a` subsiste
    h.fetcher.fail(a);
    h.fetcher.serve(slow, PNG_BYTES, "image/png");
    h.fetcher.hold(slow);
    h.fetcher.serve("https://cdn.example.com/b.png", PNG_BYTES, "image/png");

    let engine = h
        .engine()
        .with_preloader(Preloader::new(h.resolver.clone(), 2));
    let (handle, mut events) = h.start(engine);

    h.bridge.publish_playlist(vec![image("a", 60), image("slow", 60)]);
    assert_eq!(next_advance(&mut events).await, "a");
    h.bridge.publish_playlist(vec![image("b", 60)]);
    assert_eq!(next_advance(&mut events).await, "b");
    h.bridge.publish_playlist(vec![image("a", 60)]);
    assert_eq!(next_advance(&mut events).await, "a");

    // Le premier balayage se termine après l'arrivée des deux listes suivantes
    h.fetcher.release(8);
    for _ in 0..20 {
        settle().await;
    }

    let store = h.resolver.store().clone();
    assert!(store.has(&store.key_for(a)).await);
    assert!(!store.has(&store.key_for(slow)).await);
    assert_eq!(handle.current_item().map(|item| item.id), Some("a".to_string()));
    handle.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_queued_playlists_apply_only_the_latest() {
    let h = Harness::new();
    let (handle, mut events) = h.start(h.engine());
    settle().await;

    h.bridge.publish_playlist(vec![image("first", 60)]);
    h.bridge.publish_playlist(vec![image("second", 60)]);
    h.bridge.publish_playlist(vec![image("latest", 60)]);

    assert_eq!(next_advance(&mut events).await, "latest");
    settle().await;
    assert!(h.surface.elements_for("first").is_empty());
    assert!(h.surface.elements_for("second").is_empty());
    handle.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_the_loop() {
    let h = Harness::new();
    let engine = h.engine();
    let handle = engine.handle();
    let task = tokio::spawn(engine.run());

    h.bridge.publish_playlist(vec![image("a", 10)]);
    settle().await;
    handle.shutdown();

    timeout(Duration::from_secs(1), task)
        .await
        .expect("engine did not stop")
        .unwrap();
    assert!(handle.is_shutdown());
    assert_eq!(h.bridge.subscriber_count(), 0);
}
