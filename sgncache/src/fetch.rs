//! Récupération des médias distants
//!
//! Le cache ne parle jamais directement au réseau : il passe par un
//! [`MediaFetcher`], ce qui permet de substituer un faux fetcher en test.

use crate::error::{CacheError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Timeout par défaut d'un téléchargement complet
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 60;

/// Média téléchargé, prêt à être validé puis écrit
#[derive(Debug, Clone)]
pub struct FetchedMedia {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

impl FetchedMedia {
    pub fn new(bytes: impl Into<Bytes>, content_type: Option<&str>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.map(str::to_string),
        }
    }
}

/// Source des octets d'un média
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Télécharge entièrement la référence
    ///
    /// Un statut non 2xx doit être retourné comme erreur.
    async fn fetch(&self, reference: &str) -> Result<FetchedMedia>;
}

/// Fetcher HTTP basé sur reqwest, avec timeout borné
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().connect_timeout(timeout).build()?;
        Ok(Self::with_client(client, timeout))
    }

    /// Create a fetcher with a custom reqwest::Client
    pub fn with_client(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl MediaFetcher for HttpFetcher {
    async fn fetch(&self, reference: &str) -> Result<FetchedMedia> {
        debug!(url = %reference, "Fetching media");
        let response = self
            .client
            .get(reference)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CacheError::FetchStatus {
                url: reference.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = response.bytes().await?;
        debug!(url = %reference, size = bytes.len(), "Media fetched");

        Ok(FetchedMedia {
            bytes,
            content_type,
        })
    }
}
