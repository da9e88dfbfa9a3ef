//! Dérivation des clés de cache à partir des références média
//!
//! La clé est calculée sur la référence (l'URL), jamais sur le contenu : la
//! même référence donne toujours la même clé, ce qui ramène le balayage
//! d'éviction à une simple différence d'ensembles.

use sha1::{Digest, Sha1};
use url::Url;

/// Paramètres de requête volatils par défaut (jetons d'URL signées)
pub const DEFAULT_VOLATILE_PARAMS: &[&str] = &["token"];

/// Extension utilisée quand ni l'URL ni le type MIME ne permettent de conclure
pub const FALLBACK_EXTENSION: &str = "bin";

/// Normalise une référence avant hachage
///
/// Le fragment est supprimé, ainsi que les paramètres de requête listés dans
/// `volatile_params` (comparaison insensible à la casse). Une référence qui
/// n'est pas une URL absolue est simplement débarrassée de ses espaces.
pub fn normalize_reference(reference: &str, volatile_params: &[String]) -> String {
    let trimmed = reference.trim();
    let Ok(mut url) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };

    url.set_fragment(None);

    if url.query().is_some() {
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(name, _)| {
                !volatile_params
                    .iter()
                    .any(|v| v.eq_ignore_ascii_case(name.as_ref()))
            })
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }
    }

    url.to_string()
}

/// Génère la clé d'une référence média
///
/// SHA1 de la référence normalisée, tronqué aux 16 premiers octets
/// (32 caractères hexadécimaux).
///
/// # Exemple
///
/// ```
/// use sgncache::content_key;
///
/// let a = content_key("https://cdn.example.com/a.mp4?token=abc", &["token".into()]);
/// let b = content_key("https://cdn.example.com/a.mp4?token=xyz", &["token".into()]);
/// assert_eq!(a, b);
/// assert_eq!(a.len(), 32);
/// ```
pub fn content_key(reference: &str, volatile_params: &[String]) -> String {
    let normalized = normalize_reference(reference, volatile_params);
    let mut hasher = Sha1::new();
    hasher.update(normalized.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..16])
}

/// Choisit l'extension du fichier stocké
///
/// Priorité à l'extension du chemin de l'URL, puis au type MIME, sinon `bin`.
pub fn extension_for(reference: &str, content_type: Option<&str>) -> String {
    if let Some(ext) = extension_from_reference(reference) {
        return ext;
    }
    content_type
        .and_then(extension_from_content_type)
        .unwrap_or(FALLBACK_EXTENSION)
        .to_string()
}

fn extension_from_reference(reference: &str) -> Option<String> {
    let path = match Url::parse(reference.trim()) {
        Ok(url) => url.path().to_string(),
        Err(_) => reference
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };

    let file_name = path.rsplit('/').next()?;
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > 5 {
        return None;
    }
    if !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn extension_from_content_type(content_type: &str) -> Option<&'static str> {
    let mime = essence(content_type);
    let ext = match mime.as_str() {
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        "video/x-matroska" => "mkv",
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/avif" => "avif",
        "image/svg+xml" => "svg",
        _ => return None,
    };
    Some(ext)
}

/// Partie `type/sous-type` d'un Content-Type, en minuscules
pub(crate) fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volatile() -> Vec<String> {
        DEFAULT_VOLATILE_PARAMS.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn signed_url_tokens_do_not_change_the_key() {
        let a = content_key("https://cdn.example.com/media/clip.mp4?token=one", &volatile());
        let b = content_key("https://cdn.example.com/media/clip.mp4?token=two#t=3", &volatile());
        assert_eq!(a, b);
    }

    #[test]
    fn other_query_params_are_kept() {
        let a = content_key("https://cdn.example.com/clip.mp4?v=1", &volatile());
        let b = content_key("https://cdn.example.com/clip.mp4?v=2", &volatile());
        assert_ne!(a, b);
    }

    #[test]
    fn non_url_references_are_hashed_verbatim() {
        assert_eq!(normalize_reference("  local/asset.png ", &volatile()), "local/asset.png");
        assert_eq!(content_key("local/asset.png", &[]).len(), 32);
    }

    #[test]
    fn extension_prefers_path_then_mime() {
        assert_eq!(extension_for("https://x.io/a/Clip.MP4?token=1", None), "mp4");
        assert_eq!(extension_for("https://x.io/a/clip", Some("image/png; q=1")), "png");
        assert_eq!(extension_for("https://x.io/a/clip", None), "bin");
        assert_eq!(extension_for("https://x.io/a.b/clip", Some("text/html")), "bin");
    }
}
