//! Extension de sgnconfig pour les playlists

use crate::snapshot::SnapshotStore;
use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

/// Intervalle par défaut entre deux tentatives de sortie de veille
pub const DEFAULT_STANDBY_RECHECK_SECS: u64 = 10;

/// Trait d'extension pour sgnconfig::Config
pub trait PlaylistConfigExt {
    /// Répertoire des playlists (créé s'il n'existe pas)
    fn playlist_dir(&self) -> Result<PathBuf>;

    /// Chemin de l'instantané de la dernière playlist connue
    fn playlist_snapshot_path(&self) -> Result<PathBuf>;

    /// Intervalle des tentatives de sortie de veille
    fn standby_recheck_interval(&self) -> Duration;

    /// Crée le stockage d'instantané configuré
    fn create_snapshot_store(&self) -> Result<SnapshotStore>;
}

impl PlaylistConfigExt for sgnconfig::Config {
    fn playlist_dir(&self) -> Result<PathBuf> {
        // Utilise get_managed_dir pour créer le répertoire s'il n'existe pas
        let dir = self.get_managed_dir(&["playlist", "directory"], "playlist")?;
        Ok(PathBuf::from(dir))
    }

    fn playlist_snapshot_path(&self) -> Result<PathBuf> {
        Ok(self.playlist_dir()?.join(crate::snapshot::SNAPSHOT_FILE))
    }

    fn standby_recheck_interval(&self) -> Duration {
        Duration::from_secs(
            self.get_u64_or(&["playlist", "standby_recheck_secs"], DEFAULT_STANDBY_RECHECK_SECS)
                .max(1),
        )
    }

    fn create_snapshot_store(&self) -> Result<SnapshotStore> {
        Ok(SnapshotStore::new(self.playlist_snapshot_path()?))
    }
}
