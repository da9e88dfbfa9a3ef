//! # sgncache - Cache média hors ligne du terminal d'affichage
//!
//! Cette crate permet au terminal de continuer à jouer sans réseau : chaque
//! référence média de la playlist est copiée localement, la lecture se fait
//! depuis la copie quand elle existe, et le reste est évincé.
//!
//! ## Vue d'ensemble
//!
//! - [`CacheStore`] : fichiers sur disque + métadonnées SQLite, clés dérivées
//!   de la référence (et non du contenu)
//! - [`MediaResolver`] : résolution non bloquante `cached` / `remote` /
//!   `pending`, peuplement en tâche de fond dédoublonné par clé
//! - [`Preloader`] : préchargement d'une playlist complète puis balayage
//!   d'éviction par différence d'ensembles
//! - [`MediaFetcher`] : point d'injection du transport ([`HttpFetcher`] en
//!   production)
//! - [`UrlSigner`] : URL signée pour les chemins de stockage, avec repli sur
//!   l'URL publique ([`StorageSigner`] en production)
//!
//! ## Architecture
//!
//! ```text
//! sgncache
//!     ├── key.rs       - Normalisation des références et clés SHA1
//!     ├── db.rs        - Base de données SQLite
//!     ├── store.rs     - Fichiers, validation des charges, consolidation
//!     ├── fetch.rs     - Trait MediaFetcher et client reqwest
//!     ├── sign.rs      - Signature des chemins de stockage
//!     ├── resolver.rs  - Résolution non bloquante
//!     └── preload.rs   - Préchargement et éviction
//! ```
//!
//! ## Utilisation
//!
//! ```rust,no_run
//! use sgncache::{CacheStore, HttpFetcher, MediaResolver};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let fetcher = Arc::new(HttpFetcher::new(Duration::from_secs(60))?);
//!     let store = Arc::new(CacheStore::open("./media_cache", fetcher)?);
//!     let resolver = MediaResolver::new(store);
//!
//!     // Premier passage : source distante, copie lancée en arrière-plan
//!     let resolution = resolver.resolve("https://cdn.example.com/promo.mp4").await;
//!     println!("{:?} -> {}", resolution.status, resolution.source);
//!     Ok(())
//! }
//! ```
//!
//! ## Structure des fichiers
//!
//! ```text
//! media_cache/
//! ├── cache.db                                  # Base de données SQLite
//! ├── 1a2b3c4d5e6f7a8b1a2b3c4d5e6f7a8b.orig.mp4  # Vidéo
//! └── 5e6f7a8b1a2b3c4d5e6f7a8b1a2b3c4d.orig.jpg  # Image
//! ```

pub mod db;
pub mod error;
pub mod fetch;
pub mod key;
pub mod preload;
pub mod resolver;
pub mod sign;
pub mod store;

#[cfg(feature = "sgnconfig")]
pub mod config_ext;

pub use db::{CacheEntry, DB};
pub use error::{CacheError, Result};
pub use fetch::{FetchedMedia, HttpFetcher, MediaFetcher};
pub use key::{content_key, normalize_reference};
pub use preload::{Preloader, SweepReport};
pub use resolver::{MediaResolver, PopulateOutcome, Resolution, ResolutionStatus};
pub use sign::{is_direct_reference, StorageSigner, UrlSigner};
pub use store::CacheStore;

#[cfg(feature = "sgnconfig")]
pub use config_ext::MediaCacheConfigExt;
