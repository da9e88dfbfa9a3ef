//! Un slot de rendu : l'élément affiché (ou pré-chargé) et sa source
//!
//! Chaque instance d'élément a deux chances. Le premier échec bascule sur
//! l'autre source et lève `failover_triggered` ; ce drapeau ne redescend
//! jamais, l'échec suivant est donc terminal pour l'élément.

use crate::autoplay::{AutoplayController, AutoplayState};
use crate::element::{MediaElement, SlotInstance};
use crate::events::SourceKind;
use crate::stall::{StallDetector, StallThresholds, StallVerdict};
use sgnplaylist::PlaylistItem;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSource {
    pub uri: String,
    pub kind: SourceKind,
}

impl ActiveSource {
    pub fn cache(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            kind: SourceKind::Cache,
        }
    }

    pub fn remote(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            kind: SourceKind::Remote,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailoverOutcome {
    SwitchedToRemote,
    SwitchedToCache,
    Exhausted,
}

pub struct PlaybackSlot {
    item: PlaylistItem,
    instance: SlotInstance,
    source: Option<ActiveSource>,
    failover_triggered: bool,
    element: Option<Box<dyn MediaElement>>,
    autoplay: AutoplayController,
    stall: StallDetector,
    last_observed_position: f64,
    dwell: Duration,
    dwell_deadline: Option<Instant>,
    playback_started: bool,
}

impl std::fmt::Debug for PlaybackSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackSlot")
            .field("item", &self.item.id)
            .field("instance", &self.instance)
            .field("source", &self.source)
            .field("failover_triggered", &self.failover_triggered)
            .field("autoplay", &self.autoplay.state())
            .field("stall_counter", &self.stall.frozen_ticks())
            .finish()
    }
}

impl PlaybackSlot {
    pub(crate) fn new(
        item: PlaylistItem,
        instance: SlotInstance,
        source: Option<ActiveSource>,
        element: Option<Box<dyn MediaElement>>,
        thresholds: StallThresholds,
        dwell: Duration,
    ) -> Self {
        Self {
            item,
            instance,
            source,
            failover_triggered: false,
            element,
            autoplay: AutoplayController::new(),
            stall: StallDetector::new(thresholds),
            last_observed_position: 0.0,
            dwell,
            dwell_deadline: None,
            playback_started: false,
        }
    }

    pub fn item(&self) -> &PlaylistItem {
        &self.item
    }

    pub fn instance(&self) -> SlotInstance {
        self.instance
    }

    pub fn active_source(&self) -> Option<&ActiveSource> {
        self.source.as_ref()
    }

    pub fn failover_triggered(&self) -> bool {
        self.failover_triggered
    }

    pub fn stall_counter(&self) -> u32 {
        self.stall.frozen_ticks()
    }

    pub fn last_observed_position(&self) -> f64 {
        self.last_observed_position
    }

    pub fn autoplay_state(&self) -> AutoplayState {
        self.autoplay.state()
    }

    pub fn playback_started(&self) -> bool {
        self.playback_started
    }

    pub fn dwell_deadline(&self) -> Option<Instant> {
        self.dwell_deadline
    }

    pub(crate) fn has_element(&self) -> bool {
        self.element.is_some()
    }

    /// Bascule sur l'autre source, au plus une fois par instance d'élément
    ///
    /// `other_uri` est l'URI de l'autre source : l'URL distante résolue
    /// (signée pour un chemin de stockage) quand le slot lit le cache, à
    /// défaut l'URL de l'élément ; l'URI locale quand le slot lit le réseau,
    /// et sans elle la bascule est impossible.
    pub fn failover(&mut self, other_uri: Option<String>) -> FailoverOutcome {
        if self.failover_triggered {
            return FailoverOutcome::Exhausted;
        }
        let Some(source) = self.source.as_ref() else {
            return FailoverOutcome::Exhausted;
        };

        let (next, outcome) = match source.kind {
            SourceKind::Cache => {
                let remote = other_uri.or_else(|| self.item.media_url().map(str::to_string));
                match remote {
                    Some(url) => (ActiveSource::remote(url), FailoverOutcome::SwitchedToRemote),
                    None => return FailoverOutcome::Exhausted,
                }
            }
            SourceKind::Remote => match other_uri {
                Some(uri) => (ActiveSource::cache(uri), FailoverOutcome::SwitchedToCache),
                None => return FailoverOutcome::Exhausted,
            },
        };

        info!(item = %self.item.id, from = ?source.kind, to = ?next.kind, "Source failover");
        self.failover_triggered = true;
        self.source = Some(next);
        outcome
    }

    /// Remplace l'élément après une bascule ; l'ancien est masqué puis libéré
    pub(crate) fn attach(&mut self, instance: SlotInstance, element: Box<dyn MediaElement>) {
        self.hide();
        self.instance = instance;
        self.element = Some(element);
        self.autoplay.reset();
        self.stall.reset();
        self.last_observed_position = 0.0;
    }

    /// Met le slot à l'écran et arme son minuteur d'affichage
    pub(crate) fn start(&mut self, now: Instant, muted: bool) {
        self.dwell_deadline = Some(now + self.dwell);
        if let Some(element) = self.element.as_mut() {
            element.set_muted(muted);
            element.set_visible(true);
        }
        self.autoplay_tick();
    }

    /// Reprend sur l'élément attaché par une bascule
    pub(crate) fn restart(&mut self, now: Instant, muted: bool) {
        // Le minuteur de secours de la vidéo repart de zéro ; une image garde son échéance
        if self.item.is_self_terminating() && !self.playback_started {
            self.dwell_deadline = Some(now + self.dwell);
        }
        if let Some(element) = self.element.as_mut() {
            element.set_muted(muted);
            element.set_visible(true);
        }
        self.autoplay_tick();
    }

    pub(crate) fn hide(&mut self) {
        if let Some(element) = self.element.as_mut() {
            element.pause();
            element.set_visible(false);
        }
    }

    pub(crate) fn set_muted(&mut self, muted: bool) {
        if let Some(element) = self.element.as_mut() {
            element.set_muted(muted);
        }
    }

    pub(crate) fn disarm_dwell(&mut self) {
        self.dwell_deadline = None;
    }

    pub(crate) fn mark_started(&mut self) {
        self.playback_started = true;
    }

    pub(crate) fn autoplay_tick(&mut self) -> Option<AutoplayState> {
        if !self.item.is_self_terminating() {
            return None;
        }
        let element = self.element.as_mut()?;
        Some(self.autoplay.tick(element.as_mut()))
    }

    pub(crate) fn observe_stall(&mut self) -> Option<StallVerdict> {
        if !self.item.is_self_terminating() {
            return None;
        }
        let element = self.element.as_ref()?;
        let position = element.position();
        let verdict = self.stall.observe(
            position,
            element.is_paused(),
            element.is_ended(),
            element.ready_state(),
        );
        self.last_observed_position = position;
        if verdict == StallVerdict::Progressing && !self.playback_started {
            self.playback_started = true;
        }
        if verdict == StallVerdict::Stalled {
            warn!(
                item = %self.item.id,
                position,
                ready_state = ?element.ready_state(),
                "Playback stalled"
            );
        }
        Some(verdict)
    }
}

impl Drop for PlaybackSlot {
    fn drop(&mut self) {
        self.hide();
    }
}
