//! Types d'erreurs pour sgnplaylist

/// Erreurs de gestion de playlist
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid time of day: {0}")]
    InvalidTime(String),

    #[error("Invalid day of week: {0}")]
    InvalidDay(u8),

    #[error("Snapshot error: {0}")]
    SnapshotError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Type Result spécialisé pour sgnplaylist
pub type Result<T> = std::result::Result<T, Error>;
