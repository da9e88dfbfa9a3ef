//! Modèle des éléments de playlist
//!
//! Les éléments sont remplacés en bloc à chaque notification de
//! synchronisation, jamais modifiés sur place.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Durée d'affichage utilisée quand l'élément n'en précise pas
pub const DEFAULT_ITEM_DURATION_SECS: u32 = 10;

/// Jour illisible reçu du serveur : hors de 0..=6, il rend l'élément
/// inéligible sans faire rejeter la playlist
pub const INVALID_DAY: u8 = u8::MAX;

/// Clés de configuration de widget qui désignent une image de fond
const WIDGET_BACKGROUND_KEYS: &[&str] = &[
    "backgroundImage",
    "backgroundImageLandscape",
    "backgroundImagePortrait",
];

/// Nature d'un média
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Video,
    Image,
}

/// Contenu affiché par un élément
///
/// Les cartes de profil social sont des widgets (`widget_type = "social"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemContent {
    Media {
        url: String,
        media_type: MediaType,
    },
    Widget {
        widget_type: String,
        #[serde(default)]
        config: Value,
    },
    ExternalLink {
        url: String,
    },
}

/// Élément de playlist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistItem {
    /// Identifiant stable d'un rafraîchissement à l'autre
    pub id: String,
    #[serde(flatten)]
    pub content: ItemContent,
    /// Durée d'affichage des contenus qui ne se terminent pas seuls
    #[serde(
        alias = "duration",
        default = "default_duration",
        deserialize_with = "lenient_duration"
    )]
    pub duration_seconds: u32,
    /// Début de la fenêtre quotidienne (`HH:MM` ou `HH:MM:SS`)
    #[serde(default)]
    pub start_time: Option<String>,
    /// Fin de la fenêtre quotidienne, exclue
    #[serde(default)]
    pub end_time: Option<String>,
    /// Jours autorisés, 0 = dimanche … 6 = samedi
    #[serde(alias = "days", default, deserialize_with = "lenient_days")]
    pub days_of_week: Option<Vec<u8>>,
}

fn default_duration() -> u32 {
    DEFAULT_ITEM_DURATION_SECS
}

/// Durée en secondes ; `null`, négative ou illisible : durée par défaut
fn lenient_duration<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let secs = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(secs
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(|secs| secs.ceil().min(f64::from(u32::MAX)) as u32)
        .unwrap_or(DEFAULT_ITEM_DURATION_SECS))
}

/// Jours autorisés ; une entrée illisible devient [`INVALID_DAY`]
fn lenient_days<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
where
    D: Deserializer<'de>,
{
    let day = |value: &Value| {
        value
            .as_u64()
            .and_then(|d| u8::try_from(d).ok())
            .unwrap_or(INVALID_DAY)
    };
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::Array(days)) => Some(days.iter().map(day).collect()),
        Some(other) => Some(vec![day(&other)]),
    })
}

impl PlaylistItem {
    /// Élément sans contrainte horaire
    pub fn new(id: impl Into<String>, content: ItemContent, duration_seconds: u32) -> Self {
        Self {
            id: id.into(),
            content,
            duration_seconds,
            start_time: None,
            end_time: None,
            days_of_week: None,
        }
    }

    pub fn video(id: impl Into<String>, url: impl Into<String>, duration_seconds: u32) -> Self {
        Self::new(
            id,
            ItemContent::Media {
                url: url.into(),
                media_type: MediaType::Video,
            },
            duration_seconds,
        )
    }

    pub fn image(id: impl Into<String>, url: impl Into<String>, duration_seconds: u32) -> Self {
        Self::new(
            id,
            ItemContent::Media {
                url: url.into(),
                media_type: MediaType::Image,
            },
            duration_seconds,
        )
    }

    /// Ajoute une fenêtre horaire quotidienne
    pub fn with_window(mut self, start: Option<&str>, end: Option<&str>) -> Self {
        self.start_time = start.map(str::to_string);
        self.end_time = end.map(str::to_string);
        self
    }

    /// Restreint l'élément à certains jours
    pub fn with_days(mut self, days: &[u8]) -> Self {
        self.days_of_week = Some(days.to_vec());
        self
    }

    /// URL du média, pour les éléments de type média
    pub fn media_url(&self) -> Option<&str> {
        match &self.content {
            ItemContent::Media { url, .. } => Some(url),
            _ => None,
        }
    }

    pub fn media_type(&self) -> Option<MediaType> {
        match &self.content {
            ItemContent::Media { media_type, .. } => Some(*media_type),
            _ => None,
        }
    }

    /// Vrai pour les contenus qui signalent eux-mêmes leur fin (vidéo)
    pub fn is_self_terminating(&self) -> bool {
        self.media_type() == Some(MediaType::Video)
    }

    /// Durée d'affichage, avec repli sur la valeur par défaut si nulle
    pub fn dwell(&self) -> Duration {
        let secs = if self.duration_seconds == 0 {
            DEFAULT_ITEM_DURATION_SECS
        } else {
            self.duration_seconds
        };
        Duration::from_secs(u64::from(secs))
    }

    /// Vrai si l'élément porte une contrainte de jour ou d'horaire
    pub fn has_schedule(&self) -> bool {
        let non_empty = |s: &Option<String>| s.as_deref().is_some_and(|v| !v.trim().is_empty());
        non_empty(&self.start_time)
            || non_empty(&self.end_time)
            || self.days_of_week.as_ref().is_some_and(|d| !d.is_empty())
    }

    /// Références de fichiers à précharger pour cet élément
    ///
    /// L'URL du média, ou les images de fond déclarées dans la configuration
    /// d'un widget.
    pub fn asset_references(&self) -> Vec<String> {
        match &self.content {
            ItemContent::Media { url, .. } => {
                if url.trim().is_empty() {
                    Vec::new()
                } else {
                    vec![url.clone()]
                }
            }
            ItemContent::Widget { config, .. } => WIDGET_BACKGROUND_KEYS
                .iter()
                .filter_map(|key| config.get(*key))
                .filter_map(Value::as_str)
                .filter(|url| !url.trim().is_empty())
                .map(str::to_string)
                .collect(),
            ItemContent::ExternalLink { .. } => Vec::new(),
        }
    }
}

/// Réglages d'écran délivrés avec les notifications de planning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenSettings {
    pub audio_enabled: bool,
    /// Un écran inactif reste en veille
    #[serde(alias = "is_active")]
    pub active: bool,
}

impl Default for ScreenSettings {
    fn default() -> Self {
        Self {
            audio_enabled: false,
            active: true,
        }
    }
}

/// Références de tous les fichiers d'une playlist, dans l'ordre
pub fn playlist_asset_references(items: &[PlaylistItem]) -> Vec<String> {
    items.iter().flat_map(PlaylistItem::asset_references).collect()
}
