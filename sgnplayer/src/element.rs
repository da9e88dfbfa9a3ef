//! Points d'injection entre le superviseur et l'affichage réel
//!
//! Le superviseur ne dessine rien lui-même : il pilote des [`MediaElement`]
//! obtenus d'une [`RenderSurface`] et réagit aux [`ElementEvent`] qu'ils
//! renvoient.

use sgnplaylist::{MediaType, PlaylistItem};
use std::fmt;
use tokio::sync::mpsc;

/// Identifie une instance d'élément
///
/// Une nouvelle instance est allouée à chaque création d'élément, bascule
/// comprise : les évènements tardifs d'un élément abandonné sont ainsi
/// reconnus et ignorés.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotInstance(pub u64);

impl fmt::Display for SlotInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Quantité de données que l'élément a mises en tampon
///
/// Reprend les niveaux habituels d'un élément média, de rien à assez.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ReadyState {
    #[default]
    HaveNothing,
    HaveMetadata,
    HaveCurrentData,
    HaveFutureData,
    HaveEnoughData,
}

impl ReadyState {
    /// Vrai si la lecture peut progresser sans attendre le réseau
    pub fn has_future_data(self) -> bool {
        self >= ReadyState::HaveFutureData
    }
}

/// Raison pour laquelle une demande de lecture n'a rien démarré
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlayError {
    /// Bloquée par la politique d'autoplay de la plateforme (levée en coupant le son)
    #[error("playback not allowed by autoplay policy")]
    NotAllowed,
    #[error("playback failed: {0}")]
    Failed(String),
}

/// Notifications asynchrones d'un élément
#[derive(Debug, Clone, PartialEq)]
pub enum ElementEventKind {
    Loaded,
    Ended,
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementEvent {
    pub instance: SlotInstance,
    pub kind: ElementEventKind,
}

impl ElementEvent {
    pub fn new(instance: SlotInstance, kind: ElementEventKind) -> Self {
        Self { instance, kind }
    }
}

pub type ElementEventSender = mpsc::UnboundedSender<ElementEvent>;

/// Un élément vidéo ou image à l'écran
///
/// Chaque méthode doit être rapide et non bloquante. Les erreurs survenues
/// après `load` ou pendant la lecture passent par le canal d'évènements.
pub trait MediaElement: Send {
    fn load(&mut self, uri: &str);

    /// Demande la lecture ; sans effet sur un élément qui joue déjà
    fn play(&mut self) -> Result<(), PlayError>;

    fn pause(&mut self);

    fn set_muted(&mut self, muted: bool);

    fn is_muted(&self) -> bool;

    fn is_paused(&self) -> bool;

    fn is_ended(&self) -> bool;

    /// Position de lecture en secondes
    fn position(&self) -> f64;

    fn ready_state(&self) -> ReadyState;

    /// Un élément pré-chargé reste masqué jusqu'à sa promotion
    fn set_visible(&mut self, visible: bool);
}

/// Affichage sur lequel le terminal rend
pub trait RenderSurface: Send {
    /// Crée un élément masqué pour un média
    fn create_element(
        &mut self,
        instance: SlotInstance,
        item: &PlaylistItem,
        media_type: MediaType,
        events: ElementEventSender,
    ) -> Box<dyn MediaElement>;

    fn show_widget(&mut self, item: &PlaylistItem);

    fn show_external_link(&mut self, item: &PlaylistItem);

    /// Écran vide ou habillé, affiché tant que rien n'est éligible
    fn show_standby(&mut self);
}
