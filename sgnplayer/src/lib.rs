//! # sgnplayer - Moteur de lecture du terminal d'affichage
//!
//! Assemble les briques : le [`Scheduler`](sgnplaylist::Scheduler) décide
//! de ce qui passe à l'antenne, le [`PlaybackSupervisor`] le rend à travers
//! une [`RenderSurface`] et le maintient en vie (relances d'autoplay,
//! détection de blocage, bascule cache/distant), et la boucle du
//! [`PlaybackEngine`] les alimente depuis le pont de synchronisation et les
//! minuteurs.
//!
//! ```text
//! SyncBridge ──► PlaybackEngine ──► Scheduler
//!                    │    ▲
//!                    ▼    │ SlotSignal
//!            PlaybackSupervisor ──► MediaResolver ──► CacheStore
//!                    │
//!                    ▼
//!              RenderSurface
//! ```
//!
//! Le moteur n'échoue jamais : les pannes sont journalisées, rattrapées
//! quand c'est possible et remontées au programme hôte en [`EngineEvent`].

mod autoplay;
mod diagnostics;
mod element;
mod engine;
mod events;
mod headless;
mod settings;
mod slot;
mod stall;
mod supervisor;

#[cfg(feature = "sgnconfig")]
mod config_ext;

pub use autoplay::{AutoplayController, AutoplayState};
pub use diagnostics::{CacheSummary, DiagnosticError, DiagnosticOverlay, ERROR_HISTORY, REVEAL_TAPS, REVEAL_WINDOW};
pub use element::{
    ElementEvent, ElementEventKind, ElementEventSender, MediaElement, PlayError, ReadyState,
    RenderSurface, SlotInstance,
};
pub use engine::{EngineHandle, PlaybackEngine};
pub use events::{EngineEvent, FaultKind, SlotSignal, SourceKind};
pub use headless::{HeadlessElement, HeadlessSurface};
pub use settings::PlayerSettings;
pub use slot::{ActiveSource, FailoverOutcome, PlaybackSlot};
pub use stall::{StallDetector, StallThresholds, StallVerdict};
pub use supervisor::PlaybackSupervisor;

#[cfg(feature = "sgnconfig")]
pub use config_ext::PlayerConfigExt;
