//! Boucle du moteur de lecture
//!
//! Une seule tâche possède le planificateur et le superviseur, et multiplexe
//! tout ce qui fait avancer la scène : notifications de synchronisation,
//! évènements d'élément, ticks d'autoplay et de blocage, échéance
//! d'affichage et nouvelle vérification en veille. Rien ici ne retourne
//! d'erreur ; chaque panne est journalisée et, si elle touche l'élément
//! courant, publiée en [`EngineEvent::ItemError`].

use crate::element::{ElementEvent, RenderSurface};
use crate::events::{EngineEvent, FaultKind, SlotSignal};
use crate::settings::PlayerSettings;
use crate::supervisor::PlaybackSupervisor;
use sgncache::{MediaResolver, Preloader};
use sgnplaylist::{
    playlist_asset_references, Clock, LocalClock, PlaylistItem, ScheduleState, Scheduler,
    ScreenSettings, SnapshotStore,
};
use sgnsync::{Subscription, SyncBridge, SyncEvent};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 64;

struct Shared {
    current: RwLock<Option<PlaylistItem>>,
    state: RwLock<ScheduleState>,
    events: broadcast::Sender<EngineEvent>,
}

/// Accès en lecture à un moteur en marche, pour le programme hôte
#[derive(Clone)]
pub struct EngineHandle {
    shared: Arc<Shared>,
    stop: CancellationToken,
}

impl EngineHandle {
    /// Élément à l'écran, `None` en veille
    pub fn current_item(&self) -> Option<PlaylistItem> {
        self.shared
            .current
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn schedule_state(&self) -> ScheduleState {
        self.shared
            .state
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.shared.events.subscribe()
    }

    /// Demande l'arrêt de la boucle
    pub fn shutdown(&self) {
        self.stop.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.stop.is_cancelled()
    }
}

pub struct PlaybackEngine<C: Clock = LocalClock> {
    scheduler: Scheduler<C>,
    supervisor: PlaybackSupervisor,
    element_events: mpsc::UnboundedReceiver<ElementEvent>,
    bridge: Arc<dyn SyncBridge>,
    snapshot: Option<SnapshotStore>,
    preloader: Option<Arc<Preloader>>,
    sweep_lock: Arc<Mutex<()>>,
    sweep_generation: Arc<AtomicU64>,
    on_stage: Arc<RwLock<Vec<String>>>,
    settings: PlayerSettings,
    screen: ScreenSettings,
    /// Une playlist a été reçue ou relue du snapshot
    has_playlist: bool,
    standby_shown: bool,
    shared: Arc<Shared>,
    stop: CancellationToken,
}

impl<C: Clock> PlaybackEngine<C> {
    pub fn new(
        clock: C,
        surface: Box<dyn RenderSurface>,
        resolver: Arc<MediaResolver>,
        bridge: Arc<dyn SyncBridge>,
        settings: PlayerSettings,
    ) -> Self {
        let (supervisor, element_events) = PlaybackSupervisor::new(surface, resolver, &settings);
        let screen = ScreenSettings {
            audio_enabled: settings.audio_enabled,
            ..ScreenSettings::default()
        };
        Self {
            scheduler: Scheduler::new(clock),
            supervisor,
            element_events,
            bridge,
            snapshot: None,
            preloader: None,
            sweep_lock: Arc::new(Mutex::new(())),
            sweep_generation: Arc::new(AtomicU64::new(0)),
            on_stage: Arc::new(RwLock::new(Vec::new())),
            settings,
            screen,
            has_playlist: false,
            standby_shown: false,
            shared: Arc::new(Shared {
                current: RwLock::new(None),
                state: RwLock::new(ScheduleState::default()),
                events: broadcast::channel(EVENT_CAPACITY).0,
            }),
            stop: CancellationToken::new(),
        }
    }

    /// Sauvegarde chaque playlist et affiche la dernière au démarrage à froid
    pub fn with_snapshot(mut self, snapshot: SnapshotStore) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    /// Précharge et balaie le cache à chaque remplacement de playlist
    pub fn with_preloader(mut self, preloader: Preloader) -> Self {
        self.preloader = Some(Arc::new(preloader));
        self
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            shared: self.shared.clone(),
            stop: self.stop.clone(),
        }
    }

    /// Tourne jusqu'à l'appel de [`EngineHandle::shutdown`]
    pub async fn run(mut self) {
        info!(bridge = self.bridge.name(), "Playback engine started");
        self.cold_start().await;

        let mut subscription = self.bridge.subscribe();
        let mut sync_open = true;

        let mut autoplay = ticker(self.settings.autoplay_retry);
        let mut stall = ticker(self.settings.stall_tick);
        let mut standby = ticker(self.settings.standby_recheck);

        loop {
            let dwell_at = self.supervisor.dwell_deadline();
            let waiting_in_standby = self.screen.active && self.scheduler.is_standby();
            let stop = self.stop.clone();

            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                event = subscription.recv(), if sync_open => match event {
                    Some(event) => {
                        for event in drain_pending(event, &mut subscription) {
                            self.on_sync_event(event).await;
                        }
                    }
                    None => {
                        warn!("Sync bridge closed, keeping the current playlist");
                        sync_open = false;
                    }
                },
                Some(event) = self.element_events.recv() => {
                    let signal = self.supervisor.handle_element_event(event).await;
                    self.on_signal(signal).await;
                }
                _ = tokio::time::sleep_until(dwell_at.unwrap_or_else(far_future)), if dwell_at.is_some() => {
                    let signal = self.supervisor.dwell_check(Instant::now()).await;
                    self.on_signal(signal).await;
                }
                _ = autoplay.tick() => self.supervisor.autoplay_tick(),
                _ = stall.tick() => {
                    let signal = self.supervisor.stall_tick().await;
                    self.on_signal(signal).await;
                }
                _ = standby.tick(), if waiting_in_standby => self.recheck().await,
            }
        }

        self.bridge.unsubscribe(subscription);
        self.supervisor.clear();
        self.publish_state();
        info!("Playback engine stopped");
    }

    async fn cold_start(&mut self) {
        let snapshot = match &self.snapshot {
            Some(store) => store.load().await,
            None => None,
        };

        let Some(snapshot) = snapshot else {
            debug!("No saved playlist, waiting for the first sync");
            self.enter_standby();
            return;
        };

        info!(
            items = snapshot.items.len(),
            saved_at = %snapshot.saved_at,
            "Rendering last known playlist"
        );
        if let Some(screen) = snapshot.screen {
            self.screen = screen;
            self.supervisor.set_audio_enabled(screen.audio_enabled);
        }
        self.has_playlist = true;
        self.spawn_sweep(&snapshot.items);

        let item = self.scheduler.replace_items(snapshot.items).cloned();
        if self.screen.active {
            self.show(item).await;
        } else {
            self.enter_standby();
        }
    }

    async fn on_sync_event(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::PlaylistChanged(items) => self.replace_playlist(items).await,
            SyncEvent::ScreenChanged(screen) => self.apply_screen(screen).await,
        }
    }

    async fn replace_playlist(&mut self, items: Vec<PlaylistItem>) {
        info!(items = items.len(), "Playlist replaced");
        self.has_playlist = true;
        persist(self.snapshot.as_ref(), &items, self.screen).await;
        self.spawn_sweep(&items);

        let on_screen = self.supervisor.current().map(|slot| slot.item().clone());
        let item = self.scheduler.replace_items(items).cloned();

        if !self.screen.active {
            self.publish_state();
            return;
        }

        match item {
            Some(item) if on_screen.as_ref() == Some(&item) => {
                debug!(item = %item.id, "Current item unchanged, playback continues");
                self.preroll_next().await;
                self.publish_state();
            }
            item => self.show(item).await,
        }
    }

    async fn apply_screen(&mut self, screen: ScreenSettings) {
        let previous = self.screen;
        self.screen = screen;
        self.supervisor.set_audio_enabled(screen.audio_enabled);

        // Sans playlist, un snapshot vide masquerait le dernier connu
        if self.has_playlist {
            let items = self.scheduler.items().to_vec();
            persist(self.snapshot.as_ref(), &items, self.screen).await;
        } else {
            debug!("Screen settings received before any playlist, snapshot left untouched");
        }

        match (previous.active, screen.active) {
            (true, false) => {
                info!("Screen deactivated");
                self.enter_standby();
            }
            (false, true) => {
                info!("Screen activated");
                let still_eligible = self
                    .scheduler
                    .current_item()
                    .filter(|item| self.scheduler.is_eligible_now(item))
                    .cloned();
                let item = match still_eligible {
                    Some(item) => Some(item),
                    None => self.scheduler.advance().cloned(),
                };
                self.show(item).await;
            }
            _ => {}
        }
    }

    async fn on_signal(&mut self, signal: Option<SlotSignal>) {
        match signal {
            None => {}
            Some(SlotSignal::Completed) => self.advance().await,
            Some(SlotSignal::Failed(fault)) => {
                let item_id = match &fault {
                    FaultKind::TerminalItemFailure { item_id, .. }
                    | FaultKind::PlaybackStall { item_id, .. }
                    | FaultKind::Ineligible { item_id } => item_id.clone(),
                    _ => self
                        .scheduler
                        .current_item()
                        .map(|item| item.id.clone())
                        .unwrap_or_default(),
                };
                self.emit(EngineEvent::ItemError { item_id, fault });
                self.advance().await;
            }
        }
    }

    async fn advance(&mut self) {
        if !self.screen.active {
            return;
        }
        let item = self.scheduler.advance().cloned();
        self.show(item).await;
    }

    async fn recheck(&mut self) {
        if let Some(item) = self.scheduler.recheck().cloned() {
            info!(item = %item.id, "Leaving standby");
            self.show(Some(item)).await;
        }
    }

    async fn show(&mut self, item: Option<PlaylistItem>) {
        let Some(item) = item else {
            self.enter_standby();
            return;
        };

        let source = self.supervisor.activate(&item).await;
        if std::mem::take(&mut self.standby_shown) {
            self.emit(EngineEvent::Resumed {
                item_id: item.id.clone(),
            });
        }
        self.emit(EngineEvent::ItemAdvanced {
            item_id: item.id.clone(),
            index: self.scheduler.current_index().unwrap_or_default(),
            source,
        });
        self.publish_state();
        self.preroll_next().await;
    }

    async fn preroll_next(&mut self) {
        if let Some(next) = self.scheduler.peek_next().cloned() {
            self.supervisor.preroll(&next).await;
        }
        self.record_on_stage();
    }

    /// Références de l'élément affiché et de l'élément pré-chargé, que le
    /// balayage ne doit jamais évincer.
    fn record_on_stage(&self) {
        let references = self
            .supervisor
            .current()
            .into_iter()
            .chain(self.supervisor.next_slot())
            .flat_map(|slot| slot.item().asset_references())
            .collect();
        *self.on_stage.write().unwrap_or_else(|p| p.into_inner()) = references;
    }

    fn enter_standby(&mut self) {
        if self.standby_shown {
            self.publish_state();
            return;
        }
        if self.screen.active {
            info!("{}, entering standby", FaultKind::EmptyOrFullyIneligiblePlaylist);
        }
        self.supervisor.standby();
        self.record_on_stage();
        self.standby_shown = true;
        self.emit(EngineEvent::Standby);
        self.publish_state();
    }

    /// Lance le préchargement de `items` puis le balayage d'éviction
    ///
    /// Les balayages s'exécutent l'un après l'autre. Chacun porte un numéro
    /// de génération : si une playlist plus récente est arrivée entre-temps,
    /// il précharge quand même mais n'évince rien, l'éviction revenant au
    /// balayage de la dernière playlist.
    fn spawn_sweep(&self, items: &[PlaylistItem]) {
        let Some(preloader) = self.preloader.clone() else {
            return;
        };
        let generation = self.sweep_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let latest = self.sweep_generation.clone();
        let on_stage = self.on_stage.clone();
        let references = playlist_asset_references(items);
        let lock = self.sweep_lock.clone();
        tokio::spawn(async move {
            let _guard = lock.lock().await;
            let mut report = preloader.preload(&references).await;

            if latest.load(Ordering::SeqCst) != generation {
                debug!(generation, ?report, "Playlist superseded, eviction skipped");
                return;
            }

            let staged = on_stage.read().unwrap_or_else(|p| p.into_inner()).clone();
            let mut active_keys = preloader.keys_for(&references);
            active_keys.extend(preloader.keys_for(&staged));
            match preloader.sweep(&active_keys).await {
                Ok(evicted) => {
                    report.evicted = evicted;
                    info!(
                        generation,
                        populated = report.populated,
                        already_cached = report.already_cached,
                        failed = report.failed,
                        evicted = report.evicted.len(),
                        "Preload sweep finished"
                    );
                }
                Err(e) => warn!("Eviction sweep failed: {}", e),
            }
        });
    }

    fn emit(&self, event: EngineEvent) {
        // Err seulement sans abonné
        let _ = self.shared.events.send(event);
    }

    fn publish_state(&self) {
        let current = if self.standby_shown {
            None
        } else {
            self.scheduler.current_item().cloned()
        };
        *self
            .shared
            .current
            .write()
            .unwrap_or_else(|p| p.into_inner()) = current;
        *self.shared.state.write().unwrap_or_else(|p| p.into_inner()) =
            self.scheduler.state().clone();
    }
}

/// Regroupe les notifications déjà en file : seule la dernière playlist est
/// appliquée, les réglages d'écran le sont tous, dans l'ordre d'arrivée.
fn drain_pending(first: SyncEvent, subscription: &mut Subscription) -> Vec<SyncEvent> {
    let mut pending = vec![first];
    while let Some(event) = subscription.try_recv() {
        pending.push(event);
    }

    let is_playlist = |event: &SyncEvent| matches!(event, SyncEvent::PlaylistChanged(_));
    let last_playlist = pending.iter().rposition(is_playlist);
    let queued = pending.len();
    let kept: Vec<SyncEvent> = pending
        .into_iter()
        .enumerate()
        .filter(|(index, event)| !is_playlist(event) || Some(*index) == last_playlist)
        .map(|(_, event)| event)
        .collect();
    if kept.len() < queued {
        debug!(skipped = queued - kept.len(), "Superseded playlists dropped");
    }
    kept
}

async fn persist(snapshot: Option<&SnapshotStore>, items: &[PlaylistItem], screen: ScreenSettings) {
    if let Some(store) = snapshot {
        if let Err(e) = store.save(items, Some(screen)).await {
            warn!("Cannot save playlist snapshot: {}", e);
        }
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(period.max(Duration::from_millis(10)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86_400)
}
