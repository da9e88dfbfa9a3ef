//! Stockage des médias sur disque
//!
//! Chaque média est un fichier `{pk}.orig.{ext}` dans le répertoire du cache,
//! décrit par une ligne de la base SQLite. Les écritures passent par un
//! fichier temporaire unique renommé à sa place : une clé n'est jamais
//! visible à moitié écrite.

use crate::db::{CacheEntry, DB};
use crate::error::{CacheError, Result};
use crate::fetch::{FetchedMedia, MediaFetcher};
use crate::key::{content_key, essence, extension_for, DEFAULT_VOLATILE_PARAMS};
use crate::sign::{is_direct_reference, UrlSigner};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

const DB_FILE: &str = "cache.db";
const QUALIFIER: &str = "orig";
const TMP_SUFFIX: &str = ".tmp";

/// Types MIME qui signalent une page d'erreur ou un portail captif
const REJECTED_CONTENT_TYPES: &[&str] = &[
    "text/html",
    "application/xhtml+xml",
    "text/xml",
    "application/xml",
    "text/plain",
    "application/json",
];

/// Types MIME trop vagues pour être crus sur parole
const GENERIC_CONTENT_TYPES: &[&str] = &["application/octet-stream", "binary/octet-stream"];

/// Préfixes qui trahissent du balisage au lieu d'un binaire
const MARKUP_PREFIXES: &[&str] = &["<!doctype html", "<html", "<?xml"];

/// Cache de médias adressé par référence
///
/// Note : ce type est conçu pour être utilisé derrière un `Arc<CacheStore>`.
/// La synchronisation est assurée par le Mutex interne de la base SQLite et
/// par le renommage atomique des fichiers.
pub struct CacheStore {
    dir: PathBuf,
    db: Arc<DB>,
    fetcher: Arc<dyn MediaFetcher>,
    volatile_params: Vec<String>,
    signing: Option<Signing>,
}

struct Signing {
    signer: Arc<dyn UrlSigner>,
    timeout: Duration,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("dir", &self.dir)
            .field("volatile_params", &self.volatile_params)
            .field("signing", &self.signing.as_ref().map(|s| s.timeout))
            .finish()
    }
}

impl CacheStore {
    /// Ouvre un cache dans `dir`, créé si nécessaire
    ///
    /// # Arguments
    ///
    /// * `dir` - Répertoire de stockage du cache
    /// * `fetcher` - Source utilisée par [`CacheStore::populate`]
    pub fn open(dir: impl AsRef<Path>, fetcher: Arc<dyn MediaFetcher>) -> Result<Self> {
        std::fs::create_dir_all(dir.as_ref())?;
        // Chemin absolu requis pour produire des URI file://
        let directory = std::fs::canonicalize(dir.as_ref())?;
        let db = DB::init(&directory.join(DB_FILE))?;

        Ok(Self {
            dir: directory,
            db: Arc::new(db),
            fetcher,
            volatile_params: DEFAULT_VOLATILE_PARAMS.iter().map(|s| s.to_string()).collect(),
            signing: None,
        })
    }

    /// Ouvre le cache puis le consolide
    ///
    /// Les restes d'une exécution interrompue (fichiers temporaires, lignes
    /// sans fichier, fichiers sans ligne) sont retirés avant tout usage.
    /// Un échec de consolidation est journalisé et n'empêche pas l'ouverture.
    pub async fn open_consolidated(
        dir: impl AsRef<Path>,
        fetcher: Arc<dyn MediaFetcher>,
    ) -> Result<Self> {
        let store = Self::open(dir, fetcher)?;
        match store.consolidate().await {
            Ok(removed) => info!(dir = %store.dir.display(), removed, "Media cache consolidated"),
            Err(e) => warn!(dir = %store.dir.display(), "Cache consolidation failed: {}", e),
        }
        Ok(store)
    }

    /// Remplace la liste des paramètres de requête ignorés par le calcul de clé
    pub fn with_volatile_params(mut self, params: Vec<String>) -> Self {
        self.volatile_params = params;
        self
    }

    /// Signe les chemins de stockage avant lecture ou téléchargement
    ///
    /// Au-delà de `timeout`, l'URL publique est utilisée.
    pub fn with_signer(mut self, signer: Arc<dyn UrlSigner>, timeout: Duration) -> Self {
        self.signing = Some(Signing { signer, timeout });
        self
    }

    /// URL distante d'une référence
    ///
    /// Une URL absolue est rendue telle quelle. Un chemin de stockage est
    /// signé ; en cas d'échec ou de dépassement du délai, c'est l'URL
    /// publique qui est rendue. Sans signataire, la référence est rendue
    /// telle quelle.
    pub async fn remote_url(&self, reference: &str) -> String {
        if is_direct_reference(reference) {
            return reference.to_string();
        }
        let Some(signing) = &self.signing else {
            return reference.to_string();
        };

        match tokio::time::timeout(signing.timeout, signing.signer.sign(reference)).await {
            Ok(Ok(url)) => url,
            Ok(Err(e)) => {
                warn!(path = %reference, "Signing failed, using public URL: {}", e);
                signing.signer.public_url(reference)
            }
            Err(_) => {
                warn!(path = %reference, timeout = ?signing.timeout, "Signing timed out, using public URL");
                signing.signer.public_url(reference)
            }
        }
    }

    /// Retourne le répertoire du cache
    pub fn cache_dir(&self) -> &Path {
        &self.dir
    }

    /// Clé d'une référence média
    pub fn key_for(&self, reference: &str) -> String {
        content_key(reference, &self.volatile_params)
    }

    /// Chemin du fichier d'une clé pour une extension donnée
    ///
    /// Format: `{pk}.orig.{ext}`
    pub fn file_path(&self, pk: &str, ext: &str) -> PathBuf {
        self.dir.join(format!("{pk}.{QUALIFIER}.{ext}"))
    }

    /// Entrée de la base, sans vérifier la présence du fichier
    pub fn entry(&self, pk: &str) -> Result<Option<CacheEntry>> {
        Ok(self.db.get(pk)?)
    }

    /// Chemin du fichier si l'entrée existe et que le fichier est présent
    async fn present_path(&self, pk: &str) -> Result<Option<PathBuf>> {
        let Some(entry) = self.db.get(pk)? else {
            return Ok(None);
        };
        let path = self.file_path(pk, &entry.file_ext);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(path)),
            Ok(_) => Ok(None),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Indique si la clé est présente (ligne en base et fichier sur disque)
    ///
    /// La présence est recalculée à chaque appel, jamais mémorisée.
    pub async fn has(&self, pk: &str) -> bool {
        match self.present_path(pk).await {
            Ok(path) => path.is_some(),
            Err(e) => {
                warn!(pk = %pk, "Presence check failed: {}", e);
                false
            }
        }
    }

    /// Écrit un média sous la clé `pk`
    ///
    /// Les pages d'erreur, le balisage et les contenus vides sont refusés
    /// avant toute écriture : ni fichier ni ligne ne sont créés.
    pub async fn write(&self, pk: &str, source_url: &str, media: &FetchedMedia) -> Result<CacheEntry> {
        validate_payload(pk, &media.bytes, media.content_type.as_deref())?;

        let ext = extension_for(source_url, media.content_type.as_deref());
        let final_path = self.file_path(pk, &ext);
        let tmp_path = self
            .dir
            .join(format!(".{pk}.{}{TMP_SUFFIX}", uuid::Uuid::new_v4().simple()));

        if let Err(err) = tokio::fs::write(&tmp_path, &media.bytes).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }
        if let Err(err) = tokio::fs::rename(&tmp_path, &final_path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }

        // Une ancienne version avec une autre extension devient orpheline
        if let Some(previous) = self.db.get(pk)? {
            if previous.file_ext != ext {
                remove_if_exists(&self.file_path(pk, &previous.file_ext)).await?;
            }
        }

        let size = media.bytes.len() as u64;
        self.db
            .upsert(pk, source_url, media.content_type.as_deref(), &ext, size)?;
        debug!(pk = %pk, size, ext = %ext, "Media written to cache");

        self.db.get(pk)?.ok_or_else(|| CacheError::NotFound(pk.to_string()))
    }

    /// URI `file://` jouable pour la clé, ou `None` si absente
    ///
    /// Met à jour le compteur d'accès.
    pub async fn read_as_playable_uri(&self, pk: &str) -> Result<Option<String>> {
        let Some(path) = self.present_path(pk).await? else {
            return Ok(None);
        };
        self.db.update_hit(pk)?;
        let uri = Url::from_file_path(&path)
            .map_err(|_| CacheError::InvalidPath(path.display().to_string()))?;
        Ok(Some(uri.to_string()))
    }

    /// Supprime une clé (fichier puis ligne), retourne `true` si elle existait
    pub async fn delete(&self, pk: &str) -> Result<bool> {
        let Some(entry) = self.db.get(pk)? else {
            return Ok(false);
        };
        remove_if_exists(&self.file_path(pk, &entry.file_ext)).await?;
        Ok(self.db.delete(pk)?)
    }

    /// Liste toutes les clés en base
    pub fn list_keys(&self) -> Result<Vec<String>> {
        Ok(self.db.list_keys()?)
    }

    /// Nombre d'entrées en base
    pub fn len(&self) -> Result<usize> {
        Ok(self.db.count()?)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Toutes les entrées, pour le rapport de diagnostic
    pub fn entries(&self) -> Result<Vec<CacheEntry>> {
        Ok(self.db.get_all()?)
    }

    /// Télécharge la référence et l'écrit sous sa clé
    ///
    /// Le téléchargement passe par [`CacheStore::remote_url`], la clé et la
    /// source enregistrée restent ceux de la référence d'origine.
    pub async fn populate(&self, reference: &str) -> Result<CacheEntry> {
        let pk = self.key_for(reference);
        let url = self.remote_url(reference).await;
        let media = self.fetcher.fetch(&url).await?;
        self.write(&pk, reference, &media).await
    }

    /// Supprime toutes les clés absentes de `active_keys`
    ///
    /// Retourne les clés effectivement supprimées.
    pub async fn evict_except(&self, active_keys: &HashSet<String>) -> Result<Vec<String>> {
        let mut evicted = Vec::new();
        for pk in self.list_keys()? {
            if active_keys.contains(&pk) {
                continue;
            }
            match self.delete(&pk).await {
                Ok(true) => evicted.push(pk),
                Ok(false) => {}
                Err(e) => warn!(pk = %pk, "Eviction failed: {}", e),
            }
        }
        if !evicted.is_empty() {
            info!("Eviction sweep removed {} cache entries", evicted.len());
        }
        Ok(evicted)
    }

    /// Supprime tous les fichiers et entrées du cache
    pub async fn purge(&self) -> Result<()> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.is_file() && !is_db_file(&path) {
                tokio::fs::remove_file(path).await?;
            }
        }
        self.db.purge()?;
        Ok(())
    }

    /// Consolide le cache
    ///
    /// Supprime les lignes dont le fichier a disparu, les fichiers sans ligne
    /// et les fichiers temporaires laissés par une écriture interrompue.
    /// Retourne le nombre d'éléments retirés.
    pub async fn consolidate(&self) -> Result<usize> {
        let mut removed = 0;

        for entry in self.db.get_all()? {
            let path = self.file_path(&entry.pk, &entry.file_ext);
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                debug!(pk = %entry.pk, "Dropping entry without file");
                self.db.delete(&entry.pk)?;
                removed += 1;
            }
        }

        let mut dir_entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = dir_entries.next_entry().await? {
            let path = entry.path();
            if !path.is_file() || is_db_file(&path) {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            let orphan = if file_name.ends_with(TMP_SUFFIX) {
                true
            } else {
                // Format attendu: {pk}.orig.{ext}
                match file_name.split('.').collect::<Vec<_>>().as_slice() {
                    [pk, QUALIFIER, ext] => match self.db.get(pk)? {
                        Some(row) => row.file_ext != *ext,
                        None => true,
                    },
                    _ => true,
                }
            };

            if orphan {
                debug!(file = %file_name, "Removing orphan cache file");
                remove_if_exists(&path).await?;
                removed += 1;
            }
        }

        if removed > 0 {
            info!("Cache consolidation removed {} orphans", removed);
        }
        Ok(removed)
    }
}

/// Valide les données avant de les stocker
///
/// Refuse les contenus vides, les types MIME d'erreur, et le balisage
/// quand le type est absent ou générique.
pub fn validate_payload(pk: &str, data: &[u8], content_type: Option<&str>) -> Result<()> {
    let reject = |reason: String| CacheError::PoisonedPayload {
        key: pk.to_string(),
        reason,
    };

    if data.is_empty() {
        return Err(reject("empty payload".to_string()));
    }

    let mime = content_type.map(essence).filter(|m| !m.is_empty());
    if let Some(mime) = &mime {
        if REJECTED_CONTENT_TYPES.contains(&mime.as_str()) {
            return Err(reject(format!("content type {mime}")));
        }
    }

    let generic = match &mime {
        None => true,
        Some(m) => GENERIC_CONTENT_TYPES.contains(&m.as_str()),
    };
    if generic && looks_like_markup(data) {
        return Err(reject("markup body".to_string()));
    }

    Ok(())
}

fn looks_like_markup(data: &[u8]) -> bool {
    let head = &data[..data.len().min(64)];
    let text = String::from_utf8_lossy(head);
    let text = text.trim_start_matches('\u{feff}').trim_start().to_ascii_lowercase();
    MARKUP_PREFIXES.iter().any(|prefix| text.starts_with(prefix))
}

fn is_db_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(DB_FILE))
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}
