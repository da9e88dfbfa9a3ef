//! Panneau de diagnostic caché
//!
//! Révélé par cinq appuis sur l'écran en moins d'une seconde. Le compteur
//! d'appuis et l'historique d'erreurs appartiennent à une instance du
//! panneau, rien n'est global au processus.

use crate::events::EngineEvent;
use chrono::{DateTime, Local};
use sgncache::MediaResolver;
use sgnplaylist::{PlaylistItem, Position, ScheduleState};
use std::collections::VecDeque;
use std::fmt::Write;
use std::time::Duration;
use tokio::time::Instant;

pub const REVEAL_TAPS: u32 = 5;
pub const REVEAL_WINDOW: Duration = Duration::from_secs(1);
pub const ERROR_HISTORY: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticError {
    pub at: DateTime<Local>,
    pub item_id: String,
    pub message: String,
}

/// État du cache de médias au moment du rapport
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheSummary {
    pub entries: usize,
    pub bytes: u64,
    /// Le média affiché est encore en cours de téléchargement
    pub current_downloading: bool,
}

impl CacheSummary {
    /// Relève le contenu du cache et l'état du média affiché
    pub async fn collect(resolver: &MediaResolver, current: Option<&PlaylistItem>) -> Self {
        let entries = match resolver.store().entries() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Cannot list cache entries: {}", e);
                Vec::new()
            }
        };
        let current_downloading = match current.and_then(PlaylistItem::media_url) {
            Some(url) => resolver.is_populating(url).await,
            None => false,
        };
        Self {
            entries: entries.len(),
            bytes: entries.iter().map(|entry| entry.size).sum(),
            current_downloading,
        }
    }
}

#[derive(Debug)]
pub struct DiagnosticOverlay {
    visible: bool,
    taps: u32,
    window_start: Option<Instant>,
    errors: VecDeque<DiagnosticError>,
    items_played: u64,
    standby_count: u64,
    last_item: Option<String>,
    cache: Option<CacheSummary>,
}

impl Default for DiagnosticOverlay {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticOverlay {
    pub fn new() -> Self {
        Self {
            visible: false,
            taps: 0,
            window_start: None,
            errors: VecDeque::with_capacity(ERROR_HISTORY),
            items_played: 0,
            standby_count: 0,
            last_item: None,
            cache: None,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn hide(&mut self) {
        self.visible = false;
    }

    /// Compte un appui ; `true` si cet appui a basculé l'affichage du panneau
    pub fn register_tap(&mut self, now: Instant) -> bool {
        let in_window = self
            .window_start
            .is_some_and(|start| now.duration_since(start) <= REVEAL_WINDOW);
        if !in_window {
            self.window_start = Some(now);
            self.taps = 0;
        }

        self.taps += 1;
        if self.taps < REVEAL_TAPS {
            return false;
        }

        self.taps = 0;
        self.window_start = None;
        self.visible = !self.visible;
        true
    }

    /// Dernières erreurs, la plus ancienne en premier
    pub fn errors(&self) -> impl Iterator<Item = &DiagnosticError> {
        self.errors.iter()
    }

    pub fn record_error(&mut self, item_id: impl Into<String>, message: impl Into<String>) {
        if self.errors.len() == ERROR_HISTORY {
            self.errors.pop_front();
        }
        self.errors.push_back(DiagnosticError {
            at: Local::now(),
            item_id: item_id.into(),
            message: message.into(),
        });
    }

    pub fn record_cache(&mut self, summary: CacheSummary) {
        self.cache = Some(summary);
    }

    pub fn record_event(&mut self, event: &EngineEvent) {
        match event {
            EngineEvent::ItemAdvanced { item_id, .. } => {
                self.items_played += 1;
                self.last_item = Some(item_id.clone());
            }
            EngineEvent::ItemError { item_id, fault } => {
                self.record_error(item_id.clone(), fault.to_string());
            }
            EngineEvent::Standby => self.standby_count += 1,
            EngineEvent::Resumed { .. } => {}
        }
    }

    pub fn report(&self, current: Option<&PlaylistItem>, state: &ScheduleState) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "== Diagnostics ==");
        match state.position {
            Position::Playing(index) => {
                let _ = writeln!(out, "position: playing #{index}");
            }
            Position::Standby => {
                let _ = writeln!(out, "position: standby");
            }
        }
        if let Some(item) = current {
            let _ = writeln!(
                out,
                "current: {} ({})",
                item.id,
                item.media_url().unwrap_or("non-media")
            );
        }
        if let Some(last) = &self.last_item {
            let _ = writeln!(out, "last started: {last}");
        }
        let _ = writeln!(out, "items played: {}", self.items_played);
        let _ = writeln!(out, "standby entries: {}", self.standby_count);
        if let Some(cache) = &self.cache {
            let _ = writeln!(out, "cache: {} entries, {} bytes", cache.entries, cache.bytes);
            if cache.current_downloading {
                let _ = writeln!(out, "current media still downloading");
            }
        }
        let _ = writeln!(out, "recent errors: {}", self.errors.len());
        for error in &self.errors {
            let _ = writeln!(
                out,
                "  [{}] {}: {}",
                error.at.format("%H:%M:%S"),
                error.item_id,
                error.message
            );
        }
        out
    }
}
