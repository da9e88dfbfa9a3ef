//! Pannes, signaux de slot et évènements publiés vers le programme hôte

use serde::Serialize;

/// Source depuis laquelle un élément joue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Cache,
    Remote,
}

/// Tout ce qui peut mal tourner autour d'un élément
///
/// Seul [`FaultKind::TerminalItemFailure`] fait sauter un élément avant son
/// terme ; les autres sont rattrapés sur place et seulement journalisés.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FaultKind {
    #[error("item {item_id} is outside its schedule window")]
    Ineligible { item_id: String },

    #[error("{reference} is not cached, streaming it")]
    CacheMiss { reference: String },

    #[error("caching {reference} failed: {reason}")]
    PopulationFailure { reference: String, reason: String },

    #[error("playback of {item_id} stalled on the {source_kind:?} source")]
    PlaybackStall {
        item_id: String,
        source_kind: SourceKind,
    },

    #[error("item {item_id} failed on every source: {reason}")]
    TerminalItemFailure { item_id: String, reason: String },

    #[error("no playable item in the playlist")]
    EmptyOrFullyIneligiblePlaylist,
}

/// Ce que le slot courant signale au moteur
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotSignal {
    /// Fin naturelle ou durée écoulée : on avance
    Completed,
    /// Deux sources épuisées : on avance tout de suite
    Failed(FaultKind),
}

/// Notifications de télémétrie (le heartbeat relève du programme hôte)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    ItemAdvanced {
        item_id: String,
        index: usize,
        source: Option<SourceKind>,
    },
    ItemError {
        item_id: String,
        fault: FaultKind,
    },
    Standby,
    Resumed {
        item_id: String,
    },
}
