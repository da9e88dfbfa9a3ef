//! Signature des chemins de stockage
//!
//! Une référence de playlist est soit une URL absolue, soit un chemin dans
//! le bucket de stockage (`uploads/promo.mp4`). Un chemin est échangé contre
//! une URL signée à durée limitée avant la lecture ou le téléchargement. Si
//! la signature échoue ou tarde, l'URL publique du bucket sert de repli.
//!
//! La clé de cache reste calculée sur la référence d'origine : une nouvelle
//! signature ne change jamais la clé.

use crate::error::{CacheError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Durée de validité demandée pour une URL signée
pub const DEFAULT_SIGNED_URL_TTL_SECS: u64 = 3600;

/// Délai maximal accordé à une signature avant repli sur l'URL publique
pub const DEFAULT_SIGN_TIMEOUT_SECS: u64 = 10;

pub const DEFAULT_STORAGE_BUCKET: &str = "media";

const DIRECT_SCHEMES: &[&str] = &["http://", "https://", "file://"];

/// Vrai si la référence est déjà une URL utilisable telle quelle
pub fn is_direct_reference(reference: &str) -> bool {
    let lower = reference.trim_start().to_ascii_lowercase();
    DIRECT_SCHEMES.iter().any(|scheme| lower.starts_with(scheme))
}

/// Convertit un chemin de stockage en URL distante
#[async_trait]
pub trait UrlSigner: Send + Sync {
    /// URL signée, valable un temps limité
    async fn sign(&self, path: &str) -> Result<String>;

    /// URL publique du même objet, utilisée quand la signature échoue
    fn public_url(&self, path: &str) -> String;
}

#[derive(Deserialize)]
struct SignResponse {
    #[serde(rename = "signedURL", alias = "signedUrl")]
    signed_url: String,
}

/// Signataire HTTP pour une API de stockage objet
///
/// `POST {base}/object/sign/{bucket}/{path}` avec `{"expiresIn": ttl}`,
/// la réponse porte `signedURL`, relatif à `base`.
#[derive(Debug, Clone)]
pub struct StorageSigner {
    client: Client,
    base: Url,
    bucket: String,
    api_key: Option<String>,
    ttl: Duration,
}

impl StorageSigner {
    pub fn new(base_url: &str, bucket: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base_url.trim())
            .map_err(|e| CacheError::Signing(format!("invalid storage URL {base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(CacheError::Signing(format!(
                "storage URL {base_url} cannot hold object paths"
            )));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base,
            bucket: bucket.into(),
            api_key: None,
            ttl: Duration::from_secs(DEFAULT_SIGNED_URL_TTL_SECS),
        })
    }

    /// Clé envoyée en `Authorization: Bearer` et en en-tête `apikey`
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let api_key = api_key.into();
        self.api_key = (!api_key.trim().is_empty()).then_some(api_key);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn object_url(&self, access: &str, path: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["object", access, self.bucket.as_str()])
                .extend(path.split('/').filter(|segment| !segment.is_empty()));
        }
        url
    }

    /// Rend absolue une URL signée relative à la racine de l'API
    fn absolute(&self, signed: &str) -> String {
        if is_direct_reference(signed) {
            return signed.to_string();
        }
        format!(
            "{}/{}",
            self.base.as_str().trim_end_matches('/'),
            signed.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl UrlSigner for StorageSigner {
    async fn sign(&self, path: &str) -> Result<String> {
        let url = self.object_url("sign", path);
        let body = serde_json::json!({ "expiresIn": self.ttl.as_secs() });

        let mut request = self
            .client
            .post(url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_string());
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key).header("apikey", api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CacheError::FetchStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let text = response.text().await?;
        let signed: SignResponse = serde_json::from_str(&text)
            .map_err(|e| CacheError::Signing(format!("unexpected sign response: {e}")))?;
        debug!(path = %path, "Storage path signed");
        Ok(self.absolute(&signed.signed_url))
    }

    fn public_url(&self, path: &str) -> String {
        self.object_url("public", path).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> StorageSigner {
        StorageSigner::new(
            "https://project.example.co/storage/v1",
            "media",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn direct_references_are_recognised() {
        assert!(is_direct_reference("https://cdn.example.com/a.mp4"));
        assert!(is_direct_reference("HTTP://cdn.example.com/a.mp4"));
        assert!(is_direct_reference("file:///var/cache/a.mp4"));
        assert!(!is_direct_reference("uploads/a.mp4"));
        assert!(!is_direct_reference("/uploads/a.mp4"));
    }

    #[test]
    fn public_url_encodes_the_object_path() {
        assert_eq!(
            signer().public_url("/uploads/spring promo.mp4"),
            "https://project.example.co/storage/v1/object/public/media/uploads/spring%20promo.mp4"
        );
    }

    #[test]
    fn relative_signed_url_is_made_absolute() {
        let signer = signer();
        assert_eq!(
            signer.absolute("/object/sign/media/uploads/a.mp4?token=xyz"),
            "https://project.example.co/storage/v1/object/sign/media/uploads/a.mp4?token=xyz"
        );
        assert_eq!(
            signer.absolute("https://other.example.co/a.mp4?token=xyz"),
            "https://other.example.co/a.mp4?token=xyz"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let err = StorageSigner::new("not a url", "media", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, CacheError::Signing(_)));
    }
}
