//! Résolution non bloquante d'une référence média
//!
//! `resolve` ne fait jamais attendre la lecture sur un téléchargement : en
//! cas d'absence du cache, la référence distante est retournée tout de suite
//! et le peuplement part en tâche de fond, au plus une fois par clé.

use crate::db::CacheEntry;
use crate::error::Result;
use crate::store::CacheStore;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Origine de la source retournée par [`MediaResolver::resolve`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionStatus {
    /// Copie locale, `source` est une URI `file://`
    Cached,
    /// Absent du cache, peuplement lancé par cet appel
    Remote,
    /// Absent du cache, un peuplement est déjà en cours pour cette clé
    Pending,
}

/// Résultat d'une résolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub source: String,
    pub status: ResolutionStatus,
}

impl Resolution {
    pub fn is_cached(&self) -> bool {
        self.status == ResolutionStatus::Cached
    }
}

/// Issue d'un peuplement attendu (utilisé par le préchargeur)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopulateOutcome {
    AlreadyCached,
    Populated,
    Failed,
}

type InFlight = Arc<RwLock<HashMap<String, watch::Receiver<bool>>>>;

/// Réponse de [`MediaResolver::start_population`]
enum Population {
    Started(JoinHandle<Result<CacheEntry>>),
    InProgress,
    /// Écrit entre la recherche de l'appelant et la prise du verrou
    AlreadyCached,
}

/// Résolveur de médias adossé à un [`CacheStore`]
#[derive(Debug, Clone)]
pub struct MediaResolver {
    store: Arc<CacheStore>,
    /// Peuplements en cours (pk -> signal de fin)
    in_flight: InFlight,
}

impl MediaResolver {
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self {
            store,
            in_flight: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// Résout une référence en source jouable
    ///
    /// Ne bloque que le temps de la recherche dans le cache. Une erreur de
    /// lecture du cache est traitée comme une absence.
    pub async fn resolve(&self, reference: &str) -> Resolution {
        let pk = self.store.key_for(reference);

        match self.store.read_as_playable_uri(&pk).await {
            Ok(Some(uri)) => {
                debug!(pk = %pk, "Cache hit");
                return Resolution {
                    source: uri,
                    status: ResolutionStatus::Cached,
                };
            }
            Ok(None) => debug!(pk = %pk, url = %reference, "Cache miss"),
            Err(e) => warn!(pk = %pk, "Cache lookup failed, streaming instead: {}", e),
        }

        let status = match self.start_population(&pk, reference).await {
            Population::Started(_detached) => ResolutionStatus::Remote,
            Population::InProgress => ResolutionStatus::Pending,
            Population::AlreadyCached => {
                if let Ok(Some(uri)) = self.store.read_as_playable_uri(&pk).await {
                    return Resolution {
                        source: uri,
                        status: ResolutionStatus::Cached,
                    };
                }
                ResolutionStatus::Pending
            }
        };

        Resolution {
            source: self.store.remote_url(reference).await,
            status,
        }
    }

    /// URL distante jouable de la référence (signée pour un chemin de stockage)
    pub async fn remote_url(&self, reference: &str) -> String {
        self.store.remote_url(reference).await
    }

    /// URI locale si la référence est en cache, sans déclencher de peuplement
    pub async fn cached_uri(&self, reference: &str) -> Option<String> {
        let pk = self.store.key_for(reference);
        match self.store.read_as_playable_uri(&pk).await {
            Ok(uri) => uri,
            Err(e) => {
                warn!(pk = %pk, "Cache lookup failed: {}", e);
                None
            }
        }
    }

    /// Indique si un peuplement est en cours pour cette référence
    pub async fn is_populating(&self, reference: &str) -> bool {
        let pk = self.store.key_for(reference);
        self.in_flight.read().await.contains_key(&pk)
    }

    /// Attend la fin du peuplement en cours pour cette référence, s'il existe
    pub async fn wait_for(&self, reference: &str) {
        let pk = self.store.key_for(reference);
        let receiver = self.in_flight.read().await.get(&pk).cloned();
        if let Some(mut rx) = receiver {
            // Err si l'émetteur a disparu : le peuplement est terminé de toute façon
            let _ = rx.wait_for(|done| *done).await;
        }
    }

    /// Peuple la référence et attend le résultat
    ///
    /// Si un peuplement est déjà en cours, attend sa fin au lieu d'en
    /// lancer un second.
    pub async fn populate(&self, reference: &str) -> PopulateOutcome {
        let pk = self.store.key_for(reference);
        if self.store.has(&pk).await {
            return PopulateOutcome::AlreadyCached;
        }

        match self.start_population(&pk, reference).await {
            Population::AlreadyCached => PopulateOutcome::AlreadyCached,
            Population::Started(handle) => match handle.await {
                Ok(Ok(_)) => PopulateOutcome::Populated,
                Ok(Err(_)) => PopulateOutcome::Failed,
                Err(e) => {
                    warn!(pk = %pk, "Population task aborted: {}", e);
                    PopulateOutcome::Failed
                }
            },
            Population::InProgress => {
                self.wait_for(reference).await;
                if self.store.has(&pk).await {
                    PopulateOutcome::Populated
                } else {
                    PopulateOutcome::Failed
                }
            }
        }
    }

    /// Lance un peuplement en tâche de fond si aucun n'est en cours pour `pk`
    ///
    /// La présence dans le cache est revérifiée sous le verrou : un
    /// peuplement terminé juste avant ne doit pas être relancé.
    /// La clé est retirée des peuplements en cours à la fin, qu'il ait réussi
    /// ou non, pour qu'une résolution ultérieure puisse réessayer.
    async fn start_population(&self, pk: &str, reference: &str) -> Population {
        let (tx, rx) = watch::channel(false);
        {
            let mut in_flight = self.in_flight.write().await;
            if in_flight.contains_key(pk) {
                debug!(pk = %pk, "Population already in progress");
                return Population::InProgress;
            }
            if self.store.has(pk).await {
                debug!(pk = %pk, "Populated meanwhile, nothing to fetch");
                return Population::AlreadyCached;
            }
            in_flight.insert(pk.to_string(), rx);
        }

        let store = self.store.clone();
        let in_flight = self.in_flight.clone();
        let pk = pk.to_string();
        let reference = reference.to_string();

        Population::Started(tokio::spawn(async move {
            let result = store.populate(&reference).await;
            match &result {
                Ok(entry) => debug!(pk = %pk, size = entry.size, "Background population done"),
                Err(e) => warn!(pk = %pk, url = %reference, "Background population failed: {}", e),
            }
            in_flight.write().await.remove(&pk);
            let _ = tx.send(true);
            result
        }))
    }
}
