//! Pont de synchronisation alimenté par push
//!
//! Les mises à jour sont remises au pont par le transport qui les reçoit.
//! [`PushBridge::run_lines`] l'alimente depuis un flux de lignes JSON, un
//! [`PushMessage`] par ligne.

use crate::bridge::{Hub, RemotePlaylist, Subscription, SyncBridge};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use sgnplaylist::{PlaylistItem, ScreenSettings};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Un message du flux push
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushMessage {
    Playlist {
        #[serde(default)]
        items: Vec<PlaylistItem>,
    },
    Screen(ScreenSettings),
}

/// Pont alimenté par un transport push externe
#[derive(Debug, Clone)]
pub struct PushBridge {
    hub: Arc<Hub>,
}

impl Default for PushBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl PushBridge {
    pub fn new() -> Self {
        Self {
            hub: Arc::new(Hub::new()),
        }
    }

    /// Remet une playlist, `false` si identique à la précédente
    pub fn publish_playlist(&self, items: Vec<PlaylistItem>) -> bool {
        self.hub.publish_playlist(items)
    }

    /// Remet des réglages d'écran, `false` s'ils n'ont pas changé
    pub fn publish_screen(&self, screen: ScreenSettings) -> bool {
        self.hub.publish_screen(screen)
    }

    /// Remet une réponse complète du point d'accès
    pub fn publish(&self, remote: RemotePlaylist) -> bool {
        self.hub.publish(remote)
    }

    pub fn apply(&self, message: PushMessage) -> bool {
        match message {
            PushMessage::Playlist { items } => self.publish_playlist(items),
            PushMessage::Screen(screen) => self.publish_screen(screen),
        }
    }

    /// Analyse et applique une ligne JSON
    pub fn apply_line(&self, line: &str) -> Result<bool> {
        let message: PushMessage = serde_json::from_str(line.trim())?;
        Ok(self.apply(message))
    }

    /// Lit des lignes JSON jusqu'à la fin du flux ou l'annulation
    ///
    /// Les lignes mal formées sont journalisées et ignorées.
    pub async fn run_lines<R>(&self, reader: R, stop_token: CancellationToken) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        info!("Push feed started");
        loop {
            let line = tokio::select! {
                biased;
                _ = stop_token.cancelled() => break,
                line = lines.next_line() => line?,
            };

            let Some(line) = line else {
                debug!("Push feed reached end of input");
                break;
            };
            if line.trim().is_empty() {
                continue;
            }

            if let Err(e) = self.apply_line(&line) {
                warn!("Ignoring malformed push message: {}", e);
            }
        }
        info!("Push feed stopped");
        Ok(())
    }

    pub fn subscriber_count(&self) -> usize {
        self.hub.subscriber_count()
    }
}

impl SyncBridge for PushBridge {
    fn subscribe(&self) -> Subscription {
        self.hub.subscribe().0
    }

    fn unsubscribe(&self, subscription: Subscription) {
        self.hub.unsubscribe(subscription);
    }

    fn name(&self) -> &'static str {
        "push"
    }
}
