//! Dernière playlist connue, persistée pour le démarrage à froid
//!
//! Le fichier JSON est réécrit à chaque remplacement de liste, via un
//! fichier temporaire renommé. Un instantané illisible est ignoré : le
//! terminal attend alors simplement la première synchronisation.

use crate::error::{Error, Result};
use crate::model::{PlaylistItem, ScreenSettings};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Nom du fichier d'instantané dans le répertoire des playlists
pub const SNAPSHOT_FILE: &str = "last_known_good.json";

/// Contenu du fichier d'instantané
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistSnapshot {
    pub saved_at: DateTime<Utc>,
    pub items: Vec<PlaylistItem>,
    #[serde(default)]
    pub screen: Option<ScreenSettings>,
}

/// Stockage de l'instantané sur disque
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Instantané `last_known_good.json` dans `dir`
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(SNAPSHOT_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sauvegarde la liste (et les réglages d'écran s'ils sont connus)
    pub async fn save(&self, items: &[PlaylistItem], screen: Option<ScreenSettings>) -> Result<()> {
        let snapshot = PlaylistSnapshot {
            saved_at: Utc::now(),
            items: items.to_vec(),
            screen,
        };
        let json = serde_json::to_string_pretty(&snapshot)?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file_name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::SnapshotError(format!("invalid path {}", self.path.display())))?;
        let tmp = self
            .path
            .with_file_name(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4().simple()));

        tokio::fs::write(&tmp, json).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!(items = items.len(), path = %self.path.display(), "Saved playlist snapshot");
        Ok(())
    }

    /// Charge l'instantané, `None` s'il est absent ou illisible
    pub async fn load(&self) -> Option<PlaylistSnapshot> {
        let json = match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No playlist snapshot");
                return None;
            }
            Err(e) => {
                warn!(path = %self.path.display(), "Cannot read playlist snapshot: {}", e);
                return None;
            }
        };

        match serde_json::from_str::<PlaylistSnapshot>(&json) {
            Ok(snapshot) => {
                debug!(items = snapshot.items.len(), saved_at = %snapshot.saved_at, "Loaded playlist snapshot");
                Some(snapshot)
            }
            Err(e) => {
                warn!(path = %self.path.display(), "Ignoring corrupt playlist snapshot: {}", e);
                None
            }
        }
    }
}
