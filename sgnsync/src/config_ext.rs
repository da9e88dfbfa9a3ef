//! Extension de sgnconfig pour la synchronisation

use crate::polling::{
    PollingBridge, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_REQUEST_TIMEOUT_SECS,
};
use anyhow::{anyhow, Result};
use std::time::Duration;

/// Mode de réception des mises à jour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Poll,
    Push,
}

/// Trait d'extension pour sgnconfig::Config
pub trait SyncConfigExt {
    /// Mode configuré (`sync.mode`), `poll` par défaut
    fn sync_mode(&self) -> SyncMode;

    /// URL du point d'accès de la playlist
    fn playlist_url(&self) -> Option<String>;

    /// Période de polling
    fn poll_interval(&self) -> Duration;

    /// Timeout d'une requête de playlist
    fn request_timeout(&self) -> Duration;

    /// Crée le bridge de polling configuré
    fn create_polling_bridge(&self) -> Result<PollingBridge>;
}

impl SyncConfigExt for sgnconfig::Config {
    fn sync_mode(&self) -> SyncMode {
        match self
            .get_string_or(&["sync", "mode"], "poll")
            .to_ascii_lowercase()
            .as_str()
        {
            "push" => SyncMode::Push,
            "poll" => SyncMode::Poll,
            other => {
                tracing::warn!("Unknown sync mode '{}', using poll", other);
                SyncMode::Poll
            }
        }
    }

    fn playlist_url(&self) -> Option<String> {
        let url = self.get_string_or(&["sync", "playlist_url"], "");
        let url = url.trim();
        (!url.is_empty()).then(|| url.to_string())
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_secs(
            self.get_u64_or(&["sync", "poll_interval_secs"], DEFAULT_POLL_INTERVAL_SECS)
                .max(1),
        )
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.get_u64_or(&["sync", "request_timeout_secs"], DEFAULT_REQUEST_TIMEOUT_SECS)
                .max(1),
        )
    }

    fn create_polling_bridge(&self) -> Result<PollingBridge> {
        let url = self
            .playlist_url()
            .ok_or_else(|| anyhow!("sync.playlist_url is not configured"))?;
        Ok(PollingBridge::http(
            url,
            self.poll_interval(),
            self.request_timeout(),
        )?)
    }
}
