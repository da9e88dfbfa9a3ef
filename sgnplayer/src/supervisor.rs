//! Superviseur de lecture
//!
//! Garde le slot courant en progression visible et le suivant pré-chargé.
//! Le moteur lui transmet les ticks et les évènements d'élément ; il ne
//! répond par un [`SlotSignal`] que lorsque l'élément courant est terminé,
//! normalement ou parce que ses deux sources ont échoué. Les pannes du slot
//! pré-chargé sont rattrapées en silence et ne remontent jamais au moteur.

use crate::element::{ElementEvent, ElementEventKind, ElementEventSender, RenderSurface, SlotInstance};
use crate::events::{FaultKind, SlotSignal, SourceKind};
use crate::settings::PlayerSettings;
use crate::slot::{ActiveSource, FailoverOutcome, PlaybackSlot};
use crate::stall::{StallThresholds, StallVerdict};
use sgncache::MediaResolver;
use sgnplaylist::{ItemContent, PlaylistItem};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

pub struct PlaybackSupervisor {
    surface: Box<dyn RenderSurface>,
    resolver: Arc<MediaResolver>,
    events: ElementEventSender,
    next_instance: u64,
    current: Option<PlaybackSlot>,
    next: Option<PlaybackSlot>,
    thresholds: StallThresholds,
    default_dwell: Duration,
    audio_enabled: bool,
}

impl PlaybackSupervisor {
    /// Retourne le superviseur et la réception des évènements d'élément
    pub fn new(
        surface: Box<dyn RenderSurface>,
        resolver: Arc<MediaResolver>,
        settings: &PlayerSettings,
    ) -> (Self, mpsc::UnboundedReceiver<ElementEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let supervisor = Self {
            surface,
            resolver,
            events,
            next_instance: 1,
            current: None,
            next: None,
            thresholds: settings.stall_thresholds,
            default_dwell: settings.default_item_duration,
            audio_enabled: settings.audio_enabled,
        };
        (supervisor, receiver)
    }

    pub fn current(&self) -> Option<&PlaybackSlot> {
        self.current.as_ref()
    }

    pub fn next_slot(&self) -> Option<&PlaybackSlot> {
        self.next.as_ref()
    }

    pub fn audio_enabled(&self) -> bool {
        self.audio_enabled
    }

    pub fn dwell_deadline(&self) -> Option<Instant> {
        self.current.as_ref().and_then(PlaybackSlot::dwell_deadline)
    }

    /// Fait de `item` l'élément courant
    ///
    /// Le slot pré-chargé est promu s'il porte le même élément, sinon il est
    /// abandonné. Retourne la source de départ de l'élément.
    pub async fn activate(&mut self, item: &PlaylistItem) -> Option<SourceKind> {
        let prerolled = self.next.take().filter(|slot| slot.item() == item);
        let mut slot = match prerolled {
            Some(slot) => {
                debug!(item = %item.id, "Promoting pre-rolled slot");
                slot
            }
            None => self.build_slot(item).await,
        };

        // L'ancien slot est masqué avant l'affichage du nouveau
        self.current = None;

        match &item.content {
            ItemContent::Widget { .. } => self.surface.show_widget(item),
            ItemContent::ExternalLink { .. } => self.surface.show_external_link(item),
            ItemContent::Media { .. } => {}
        }
        slot.start(Instant::now(), !self.audio_enabled);

        let kind = slot.active_source().map(|source| source.kind);
        info!(item = %item.id, source = ?kind, instance = %slot.instance(), "Item activated");
        self.current = Some(slot);
        kind
    }

    /// Prépare `item` masqué, pour un enchaînement sans trou
    pub async fn preroll(&mut self, item: &PlaylistItem) {
        if self.next.as_ref().is_some_and(|slot| slot.item() == item) {
            return;
        }
        self.next = None;
        let slot = self.build_slot(item).await;
        debug!(item = %item.id, instance = %slot.instance(), "Item pre-rolled");
        self.next = Some(slot);
    }

    pub fn autoplay_tick(&mut self) {
        if let Some(slot) = self.current.as_mut() {
            slot.autoplay_tick();
        }
    }

    pub async fn stall_tick(&mut self) -> Option<SlotSignal> {
        let verdict = self.current.as_mut()?.observe_stall()?;
        if verdict != StallVerdict::Stalled {
            return None;
        }
        let slot = self.current.as_ref()?;
        let fault = FaultKind::PlaybackStall {
            item_id: slot.item().id.clone(),
            source_kind: slot
                .active_source()
                .map(|source| source.kind)
                .unwrap_or(SourceKind::Remote),
        };
        warn!("{}", fault);
        self.fail_current(fault.to_string()).await
    }

    /// Vérifie le minuteur d'affichage du slot courant
    ///
    /// Images, widgets et liens se terminent à son échéance. Pour une vidéo,
    /// il ne compte que si la lecture n'a jamais démarré.
    pub async fn dwell_check(&mut self, now: Instant) -> Option<SlotSignal> {
        let slot = self.current.as_mut()?;
        if slot.dwell_deadline()? > now {
            return None;
        }

        if !slot.item().is_self_terminating() {
            debug!(item = %slot.item().id, "Dwell elapsed");
            slot.disarm_dwell();
            return Some(SlotSignal::Completed);
        }

        if slot.playback_started() {
            slot.disarm_dwell();
            return None;
        }

        warn!(item = %slot.item().id, "Video did not start before its dwell elapsed");
        self.fail_current("playback never started".to_string()).await
    }

    pub async fn handle_element_event(&mut self, event: ElementEvent) -> Option<SlotSignal> {
        let is_current = self
            .current
            .as_ref()
            .is_some_and(|slot| slot.instance() == event.instance);
        let is_next = self
            .next
            .as_ref()
            .is_some_and(|slot| slot.instance() == event.instance);

        if is_current {
            let slot = self.current.as_mut()?;
            match event.kind {
                ElementEventKind::Loaded => {
                    debug!(item = %slot.item().id, "Element loaded");
                    if !slot.item().is_self_terminating() {
                        slot.mark_started();
                    }
                    None
                }
                ElementEventKind::Ended => {
                    if slot.item().is_self_terminating() {
                        debug!(item = %slot.item().id, "Playback ended");
                        Some(SlotSignal::Completed)
                    } else {
                        None
                    }
                }
                ElementEventKind::Error(reason) => {
                    warn!(item = %slot.item().id, "Element error: {}", reason);
                    self.fail_current(reason).await
                }
            }
        } else if is_next {
            if let ElementEventKind::Error(reason) = event.kind {
                self.fail_next(reason).await;
            }
            None
        } else {
            debug!(instance = %event.instance, "Ignoring event from a discarded element");
            None
        }
    }

    /// Retire tout de la scène
    pub fn clear(&mut self) {
        self.current = None;
        self.next = None;
    }

    /// Vide la scène et affiche l'écran de veille
    pub fn standby(&mut self) {
        self.clear();
        self.surface.show_standby();
    }

    pub fn set_audio_enabled(&mut self, enabled: bool) {
        if self.audio_enabled == enabled {
            return;
        }
        info!(enabled, "Audio setting changed");
        self.audio_enabled = enabled;
        if let Some(slot) = self.current.as_mut() {
            slot.set_muted(!enabled);
        }
    }

    fn allocate_instance(&mut self) -> SlotInstance {
        let instance = SlotInstance(self.next_instance);
        self.next_instance += 1;
        instance
    }

    fn dwell_for(&self, item: &PlaylistItem) -> Duration {
        if item.duration_seconds == 0 {
            self.default_dwell
        } else {
            item.dwell()
        }
    }

    async fn build_slot(&mut self, item: &PlaylistItem) -> PlaybackSlot {
        let instance = self.allocate_instance();
        let dwell = self.dwell_for(item);

        let (source, element) = match &item.content {
            ItemContent::Media { url, media_type } => {
                let resolution = self.resolver.resolve(url).await;
                let source = if resolution.is_cached() {
                    ActiveSource::cache(resolution.source)
                } else {
                    debug!(
                        "{}",
                        FaultKind::CacheMiss {
                            reference: url.clone()
                        }
                    );
                    ActiveSource::remote(resolution.source)
                };
                let mut element =
                    self.surface
                        .create_element(instance, item, *media_type, self.events.clone());
                element.set_visible(false);
                element.set_muted(true);
                element.load(&source.uri);
                (Some(source), Some(element))
            }
            ItemContent::Widget { .. } | ItemContent::ExternalLink { .. } => (None, None),
        };

        PlaybackSlot::new(item.clone(), instance, source, element, self.thresholds, dwell)
    }

    /// Essaie l'autre source de `slot`, chargée sur un nouvel élément
    async fn recover(&mut self, slot: &mut PlaybackSlot) -> bool {
        if slot.failover_triggered() {
            return false;
        }
        let other = match (slot.active_source(), slot.item().media_url()) {
            (Some(source), Some(url)) => match source.kind {
                SourceKind::Remote => self.resolver.cached_uri(url).await,
                SourceKind::Cache => Some(self.resolver.remote_url(url).await),
            },
            _ => None,
        };

        match slot.failover(other) {
            FailoverOutcome::Exhausted => false,
            FailoverOutcome::SwitchedToRemote | FailoverOutcome::SwitchedToCache => {
                let Some((uri, media_type)) = slot
                    .active_source()
                    .map(|source| source.uri.clone())
                    .zip(slot.item().media_type())
                else {
                    return false;
                };
                let instance = self.allocate_instance();
                let mut element = self.surface.create_element(
                    instance,
                    slot.item(),
                    media_type,
                    self.events.clone(),
                );
                element.set_visible(false);
                element.set_muted(true);
                element.load(&uri);
                slot.attach(instance, element);
                true
            }
        }
    }

    /// Escalade au plus une fois : le slot en échec est abandonné, tout
    /// évènement ultérieur de son élément est périmé
    async fn fail_current(&mut self, reason: String) -> Option<SlotSignal> {
        let mut slot = self.current.take()?;
        if slot.has_element() && self.recover(&mut slot).await {
            slot.restart(Instant::now(), !self.audio_enabled);
            self.current = Some(slot);
            return None;
        }

        let fault = FaultKind::TerminalItemFailure {
            item_id: slot.item().id.clone(),
            reason,
        };
        error!("{}", fault);
        Some(SlotSignal::Failed(fault))
    }

    async fn fail_next(&mut self, reason: String) {
        let Some(mut slot) = self.next.take() else {
            return;
        };
        if self.recover(&mut slot).await {
            debug!(item = %slot.item().id, "Pre-rolled slot switched source: {}", reason);
            self.next = Some(slot);
        } else {
            warn!(item = %slot.item().id, "Dropping pre-rolled slot: {}", reason);
        }
    }
}
