//! Préchargement de la playlist et balayage d'éviction
//!
//! À chaque remplacement de playlist : toutes les références sont peuplées
//! (avec une concurrence bornée, un échec n'interrompt jamais le lot), puis
//! toute clé du cache absente de la playlist est supprimée.

use crate::error::Result;
use crate::resolver::{MediaResolver, PopulateOutcome};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

/// Concurrence par défaut des téléchargements de préchargement
pub const DEFAULT_PRELOAD_CONCURRENCY: usize = 2;

/// Bilan d'un passage de préchargement et d'éviction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub populated: usize,
    pub already_cached: usize,
    pub failed: usize,
    /// Clés supprimées par le balayage
    pub evicted: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Preloader {
    resolver: Arc<MediaResolver>,
    concurrency: usize,
}

impl Preloader {
    pub fn new(resolver: Arc<MediaResolver>, concurrency: usize) -> Self {
        Self {
            resolver,
            concurrency: concurrency.max(1),
        }
    }

    /// Clés de cache des références, doublons et références vides exclus
    pub fn keys_for<I, S>(&self, references: I) -> HashSet<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let store = self.resolver.store();
        references
            .into_iter()
            .map(|reference| reference.as_ref().trim().to_string())
            .filter(|reference| !reference.is_empty())
            .map(|reference| store.key_for(&reference))
            .collect()
    }

    /// Peuple chaque référence, sans rien évincer
    ///
    /// Les doublons (même clé) ne sont peuplés qu'une fois.
    pub async fn preload<I, S>(&self, references: I) -> SweepReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let store = self.resolver.store().clone();

        let mut seen = HashSet::new();
        let mut unique = Vec::new();
        for reference in references {
            let reference = reference.as_ref().trim();
            if reference.is_empty() {
                continue;
            }
            if seen.insert(store.key_for(reference)) {
                unique.push(reference.to_string());
            }
        }

        let outcomes: Vec<PopulateOutcome> = stream::iter(unique)
            .map(|reference| {
                let resolver = self.resolver.clone();
                async move { resolver.populate(&reference).await }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = SweepReport::default();
        for outcome in outcomes {
            match outcome {
                PopulateOutcome::Populated => report.populated += 1,
                PopulateOutcome::AlreadyCached => report.already_cached += 1,
                PopulateOutcome::Failed => report.failed += 1,
            }
        }
        report
    }

    /// Supprime toute entrée dont la clé n'est pas dans `active_keys`
    pub async fn sweep(&self, active_keys: &HashSet<String>) -> Result<Vec<String>> {
        self.resolver.store().evict_except(active_keys).await
    }

    /// Précharge les références puis évince tout le reste
    ///
    /// L'éviction ne commence qu'après la fin de toutes les tentatives de
    /// peuplement.
    pub async fn preload_and_sweep<I, S>(&self, references: I) -> Result<SweepReport>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let references: Vec<String> = references
            .into_iter()
            .map(|reference| reference.as_ref().to_string())
            .collect();
        let active_keys = self.keys_for(&references);

        let mut report = self.preload(&references).await;
        report.evicted = self.sweep(&active_keys).await?;

        info!(
            populated = report.populated,
            already_cached = report.already_cached,
            failed = report.failed,
            evicted = report.evicted.len(),
            "Preload sweep finished"
        );
        Ok(report)
    }
}
