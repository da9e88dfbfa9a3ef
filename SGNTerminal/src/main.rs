use anyhow::{Context, Result};
use sgncache::{MediaCacheConfigExt, MediaResolver, Preloader};
use sgnconfig::{get_config, Config};
use sgnplayer::{
    CacheSummary, DiagnosticOverlay, EngineEvent, HeadlessSurface, PlaybackEngine, PlayerConfigExt,
};
use sgnplaylist::{LocalClock, PlaylistConfigExt};
use sgnsync::{PushBridge, SyncBridge, SyncConfigExt, SyncMode};
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = config
            .get_log_min_level()
            .unwrap_or_else(|_| "info".to_string());
        EnvFilter::new(level.to_ascii_lowercase())
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.get_log_enable_console().unwrap_or(true) {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(true),
            )
            .init();
    } else {
        registry.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = get_config();
    init_logging(&config);

    let terminal_name = config.get_terminal_name()?;
    let terminal_id = config.get_terminal_id()?;
    info!(name = %terminal_name, id = %terminal_id, "🖥️ Starting signage terminal");

    // ========== PHASE 1 : Cache et persistance ==========

    let store = config
        .create_media_store()
        .await
        .context("Cannot open the media cache")?;
    info!(dir = %store.cache_dir().display(), "💾 Media cache ready");

    let resolver = Arc::new(MediaResolver::new(store));
    let preloader = Preloader::new(resolver.clone(), config.get_preload_concurrency());
    let snapshot = config
        .create_snapshot_store()
        .context("Cannot prepare the playlist snapshot")?;

    // ========== PHASE 2 : Synchronisation ==========

    let stop = CancellationToken::new();
    let mut push_feed = None;
    let bridge: Arc<dyn SyncBridge> = match config.sync_mode() {
        SyncMode::Poll => {
            let bridge = config.create_polling_bridge()?;
            info!(url = ?config.playlist_url(), "📡 Polling playlist endpoint");
            Arc::new(bridge)
        }
        SyncMode::Push => {
            let bridge = PushBridge::new();
            let feed = bridge.clone();
            let feed_stop = stop.clone();
            push_feed = Some(tokio::spawn(async move {
                let stdin = BufReader::new(tokio::io::stdin());
                if let Err(e) = feed.run_lines(stdin, feed_stop).await {
                    warn!("Push feed failed: {}", e);
                }
            }));
            info!("📡 Waiting for pushed playlists on stdin");
            Arc::new(bridge)
        }
    };

    // ========== PHASE 3 : Moteur de lecture ==========

    let engine = PlaybackEngine::new(
        LocalClock,
        Box::new(HeadlessSurface::new()),
        resolver.clone(),
        bridge,
        config.player_settings(),
    )
    .with_snapshot(snapshot)
    .with_preloader(preloader);

    let handle = engine.handle();
    let mut events = handle.subscribe();
    let engine_task = tokio::spawn(engine.run());

    let mut diagnostics = DiagnosticOverlay::new();
    info!("✅ Terminal is running, press Ctrl+C to stop...");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => {
                    match &event {
                        EngineEvent::ItemAdvanced { item_id, index, source } => {
                            info!(item = %item_id, index, ?source, "▶️ Now showing")
                        }
                        EngineEvent::ItemError { item_id, fault } => {
                            warn!(item = %item_id, "Item skipped: {}", fault)
                        }
                        EngineEvent::Standby => info!("💤 Standby"),
                        EngineEvent::Resumed { item_id } => info!(item = %item_id, "Resumed"),
                    }
                    diagnostics.record_event(&event);
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Diagnostics lagging behind engine events"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    // ========== PHASE 4 : Arrêt ==========

    info!("🛑 Shutting down...");
    let current = handle.current_item();
    diagnostics.record_cache(CacheSummary::collect(&resolver, current.as_ref()).await);
    println!(
        "{}",
        diagnostics.report(current.as_ref(), &handle.schedule_state())
    );

    stop.cancel();
    handle.shutdown();
    if let Err(e) = engine_task.await {
        warn!("Engine task ended abnormally: {}", e);
    }
    if let Some(feed) = push_feed {
        feed.abort();
    }

    Ok(())
}
