//! Surface de rendu sans écran
//!
//! Utilisée par le binaire du terminal sur les machines sans affichage et
//! pour les tests d'endurance du moteur. Les éléments « jouent » sur
//! l'horloge tokio, un fichier local doit exister pour être chargé, et
//! chaque changement d'écran est tracé.

use crate::element::{
    ElementEvent, ElementEventKind, ElementEventSender, MediaElement, PlayError, ReadyState,
    RenderSurface, SlotInstance,
};
use sgnplaylist::{ItemContent, MediaType, PlaylistItem};
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct HeadlessSurface;

impl HeadlessSurface {
    pub fn new() -> Self {
        Self
    }
}

impl RenderSurface for HeadlessSurface {
    fn create_element(
        &mut self,
        instance: SlotInstance,
        item: &PlaylistItem,
        media_type: MediaType,
        events: ElementEventSender,
    ) -> Box<dyn MediaElement> {
        Box::new(HeadlessElement::new(
            instance,
            item.id.clone(),
            media_type,
            item.dwell(),
            events,
        ))
    }

    fn show_widget(&mut self, item: &PlaylistItem) {
        if let ItemContent::Widget { widget_type, .. } = &item.content {
            info!(item = %item.id, widget = %widget_type, "Showing widget");
        }
    }

    fn show_external_link(&mut self, item: &PlaylistItem) {
        if let ItemContent::ExternalLink { url } = &item.content {
            info!(item = %item.id, url = %url, "Showing external link");
        }
    }

    fn show_standby(&mut self) {
        info!("Showing standby screen");
    }
}

/// Élément simulé : une vidéo dure le temps d'affichage de l'élément, puis se termine
pub struct HeadlessElement {
    instance: SlotInstance,
    item_id: String,
    media_type: MediaType,
    length: Duration,
    events: ElementEventSender,
    loaded: bool,
    muted: bool,
    visible: bool,
    played: Duration,
    playing_since: Option<Instant>,
    end_timer: Option<CancellationToken>,
}

impl HeadlessElement {
    fn new(
        instance: SlotInstance,
        item_id: String,
        media_type: MediaType,
        length: Duration,
        events: ElementEventSender,
    ) -> Self {
        Self {
            instance,
            item_id,
            media_type,
            length,
            events,
            loaded: false,
            muted: true,
            visible: false,
            played: Duration::ZERO,
            playing_since: None,
            end_timer: None,
        }
    }

    fn send(&self, kind: ElementEventKind) {
        let _ = self.events.send(ElementEvent::new(self.instance, kind));
    }

    fn elapsed(&self) -> Duration {
        let running = self
            .playing_since
            .map(|since| since.elapsed())
            .unwrap_or_default();
        (self.played + running).min(self.length)
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    fn cancel_end_timer(&mut self) {
        if let Some(token) = self.end_timer.take() {
            token.cancel();
        }
    }
}

impl MediaElement for HeadlessElement {
    fn load(&mut self, uri: &str) {
        self.cancel_end_timer();
        self.played = Duration::ZERO;
        self.playing_since = None;

        let missing = uri.trim().is_empty()
            || uri
                .strip_prefix("file://")
                .is_some_and(|path| !Path::new(path).exists());
        if missing {
            self.loaded = false;
            self.send(ElementEventKind::Error(format!("cannot open {uri}")));
            return;
        }

        debug!(item = %self.item_id, instance = %self.instance, uri, "Headless load");
        self.loaded = true;
        self.send(ElementEventKind::Loaded);
    }

    fn play(&mut self) -> Result<(), PlayError> {
        if !self.loaded {
            return Err(PlayError::Failed("nothing loaded".into()));
        }
        if self.media_type == MediaType::Image || self.playing_since.is_some() || self.is_ended() {
            return Ok(());
        }

        let remaining = self.length.saturating_sub(self.played);
        self.playing_since = Some(Instant::now());

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let events = self.events.clone();
        let instance = self.instance;
        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = tokio::time::sleep(remaining) => {
                    let _ = events.send(ElementEvent::new(instance, ElementEventKind::Ended));
                }
            }
        });
        self.end_timer = Some(token);
        Ok(())
    }

    fn pause(&mut self) {
        if let Some(since) = self.playing_since.take() {
            self.played = (self.played + since.elapsed()).min(self.length);
        }
        self.cancel_end_timer();
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    fn is_muted(&self) -> bool {
        self.muted
    }

    fn is_paused(&self) -> bool {
        self.media_type == MediaType::Video && self.playing_since.is_none()
    }

    fn is_ended(&self) -> bool {
        self.media_type == MediaType::Video && self.elapsed() >= self.length
    }

    fn position(&self) -> f64 {
        self.elapsed().as_secs_f64()
    }

    fn ready_state(&self) -> ReadyState {
        if self.loaded {
            ReadyState::HaveEnoughData
        } else {
            ReadyState::HaveNothing
        }
    }

    fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }
}

impl Drop for HeadlessElement {
    fn drop(&mut self) {
        self.cancel_end_timer();
    }
}
