//! Extension pour intégrer le cache média dans sgnconfig
//!
//! Ce module fournit le trait `MediaCacheConfigExt` qui ajoute à
//! `sgnconfig::Config` les réglages des sections `cache` et `storage` et une
//! factory pour le [`CacheStore`](crate::CacheStore).

use crate::fetch::{HttpFetcher, DEFAULT_FETCH_TIMEOUT_SECS};
use crate::key::DEFAULT_VOLATILE_PARAMS;
use crate::preload::DEFAULT_PRELOAD_CONCURRENCY;
use crate::sign::{
    StorageSigner, DEFAULT_SIGNED_URL_TTL_SECS, DEFAULT_SIGN_TIMEOUT_SECS, DEFAULT_STORAGE_BUCKET,
};
use crate::CacheStore;
use anyhow::Result;
use async_trait::async_trait;
use sgnconfig::Config;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_CACHE_DIR: &str = "media_cache";

/// Trait d'extension pour la gestion du cache média
///
/// # Exemple
///
/// ```rust,ignore
/// use sgnconfig::get_config;
/// use sgncache::MediaCacheConfigExt;
///
/// let config = get_config();
/// let store = config.create_media_store().await?;
/// ```
#[async_trait]
pub trait MediaCacheConfigExt {
    /// Répertoire du cache (absolu, ou relatif au répertoire de configuration)
    fn get_media_cache_dir(&self) -> Result<String>;

    /// Définit le répertoire du cache
    fn set_media_cache_dir(&self, directory: String) -> Result<()>;

    /// Timeout d'un téléchargement complet
    fn get_fetch_timeout(&self) -> Duration;

    /// Nombre de téléchargements simultanés du préchargeur
    fn get_preload_concurrency(&self) -> usize;

    /// Paramètres de requête ignorés dans le calcul des clés
    fn get_volatile_query_params(&self) -> Vec<String>;

    /// Racine de l'API de stockage, `None` si les chemins ne sont pas signés
    fn get_storage_url(&self) -> Option<String>;

    fn get_storage_bucket(&self) -> String;

    /// Validité demandée pour les URL signées
    fn get_signed_url_ttl(&self) -> Duration;

    /// Délai accordé à une signature avant repli sur l'URL publique
    fn get_sign_timeout(&self) -> Duration;

    /// Signataire des chemins de stockage, si `storage.base_url` est renseigné
    fn create_url_signer(&self) -> Result<Option<StorageSigner>>;

    /// Crée et consolide le cache configuré, avec un fetcher HTTP
    async fn create_media_store(&self) -> Result<Arc<CacheStore>>;
}

#[async_trait]
impl MediaCacheConfigExt for Config {
    fn get_media_cache_dir(&self) -> Result<String> {
        self.get_managed_dir(&["cache", "directory"], DEFAULT_CACHE_DIR)
    }

    fn set_media_cache_dir(&self, directory: String) -> Result<()> {
        self.set_managed_dir(&["cache", "directory"], directory)
    }

    fn get_fetch_timeout(&self) -> Duration {
        Duration::from_secs(
            self.get_u64_or(&["cache", "fetch_timeout_secs"], DEFAULT_FETCH_TIMEOUT_SECS)
                .max(1),
        )
    }

    fn get_preload_concurrency(&self) -> usize {
        self.get_u64_or(
            &["cache", "preload_concurrency"],
            DEFAULT_PRELOAD_CONCURRENCY as u64,
        )
        .max(1) as usize
    }

    fn get_volatile_query_params(&self) -> Vec<String> {
        self.get_string_list_or(&["cache", "volatile_query_params"], DEFAULT_VOLATILE_PARAMS)
    }

    fn get_storage_url(&self) -> Option<String> {
        let url = self.get_string_or(&["storage", "base_url"], "");
        let url = url.trim();
        (!url.is_empty()).then(|| url.to_string())
    }

    fn get_storage_bucket(&self) -> String {
        self.get_string_or(&["storage", "bucket"], DEFAULT_STORAGE_BUCKET)
    }

    fn get_signed_url_ttl(&self) -> Duration {
        Duration::from_secs(
            self.get_u64_or(&["storage", "signed_url_ttl_secs"], DEFAULT_SIGNED_URL_TTL_SECS)
                .max(1),
        )
    }

    fn get_sign_timeout(&self) -> Duration {
        Duration::from_secs(
            self.get_u64_or(&["storage", "sign_timeout_secs"], DEFAULT_SIGN_TIMEOUT_SECS)
                .max(1),
        )
    }

    fn create_url_signer(&self) -> Result<Option<StorageSigner>> {
        let Some(base_url) = self.get_storage_url() else {
            return Ok(None);
        };
        let signer = StorageSigner::new(&base_url, self.get_storage_bucket(), self.get_sign_timeout())?
            .with_api_key(self.get_string_or(&["storage", "api_key"], ""))
            .with_ttl(self.get_signed_url_ttl());
        Ok(Some(signer))
    }

    async fn create_media_store(&self) -> Result<Arc<CacheStore>> {
        let dir = self.get_media_cache_dir()?;
        let fetcher = HttpFetcher::new(self.get_fetch_timeout())?;
        let mut store = CacheStore::open_consolidated(&dir, Arc::new(fetcher))
            .await?
            .with_volatile_params(self.get_volatile_query_params());
        if let Some(signer) = self.create_url_signer()? {
            store = store.with_signer(Arc::new(signer), self.get_sign_timeout());
        }
        Ok(Arc::new(store))
    }
}
