//! Types d'erreurs pour sgncache

/// Erreurs du cache média
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Erreur SQLite
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Erreur d'entrée/sortie sur le répertoire du cache
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Requête HTTP échouée (connexion, timeout, lecture du corps)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Le serveur a répondu avec un statut non 2xx
    #[error("Fetch of {url} failed with HTTP status {status}")]
    FetchStatus { url: String, status: u16 },

    /// Charge utile refusée (page d'erreur, portail captif, contenu vide)
    #[error("Rejected payload for key {key}: {reason}")]
    PoisonedPayload { key: String, reason: String },

    /// Entrée absente du cache
    #[error("Cache entry not found: {0}")]
    NotFound(String),

    /// Signature d'un chemin de stockage impossible
    #[error("Signing failed: {0}")]
    Signing(String),

    /// Chemin de fichier non convertible en URI
    #[error("Invalid cache path: {0}")]
    InvalidPath(String),

    /// Configuration error (from sgnconfig/anyhow)
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),
}

impl CacheError {
    /// Indique une erreur de contenu plutôt qu'une erreur de transport
    pub fn is_poisoned(&self) -> bool {
        matches!(self, Self::PoisonedPayload { .. })
    }
}

/// Type Result spécialisé pour sgncache
pub type Result<T> = std::result::Result<T, CacheError>;
