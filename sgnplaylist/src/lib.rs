//! # sgnplaylist - Playlist et ordonnancement du terminal d'affichage
//!
//! Cette crate fournit :
//! - Le modèle des éléments de playlist (média, widget, lien externe)
//! - L'évaluation des fenêtres de diffusion (jours, heures, fenêtres de nuit)
//! - L'ordonnanceur `Standby ⇄ Playing(index)` avec repositionnement après
//!   remplacement de liste
//! - La persistance de la dernière playlist connue
//!
//! # Architecture
//!
//! - **PlaylistItem** : élément immuable, remplacé en bloc à chaque synchronisation
//! - **Scheduler** : choisit l'élément "à l'antenne"
//! - **Clock** : source de l'heure, substituable en test
//! - **SnapshotStore** : instantané JSON pour le démarrage à froid
//!
//! # Exemple d'utilisation
//!
//! ```no_run
//! use sgnplaylist::{LocalClock, PlaylistItem, Scheduler};
//!
//! let mut scheduler = Scheduler::new(LocalClock);
//! scheduler.replace_items(vec![
//!     PlaylistItem::video("promo", "https://cdn.example.com/promo.mp4", 30),
//!     PlaylistItem::image("menu", "https://cdn.example.com/menu.png", 10)
//!         .with_window(Some("11:00"), Some("14:30")),
//! ]);
//!
//! if let Some(item) = scheduler.current_item() {
//!     println!("Now showing: {}", item.id);
//! }
//! scheduler.advance();
//! ```

mod clock;
mod error;
mod model;
mod schedule;
mod scheduler;
mod snapshot;

#[cfg(feature = "sgnconfig")]
mod config_ext;

// Réexports publics
pub use clock::{Clock, LocalClock, ManualClock};
pub use error::{Error, Result};
pub use model::{
    playlist_asset_references, ItemContent, MediaType, PlaylistItem, ScreenSettings,
    DEFAULT_ITEM_DURATION_SECS, INVALID_DAY,
};
pub use schedule::{is_eligible, parse_time_of_day};
pub use scheduler::{Position, ScheduleState, Scheduler};
pub use snapshot::{PlaylistSnapshot, SnapshotStore, SNAPSHOT_FILE};

#[cfg(feature = "sgnconfig")]
pub use config_ext::{PlaylistConfigExt, DEFAULT_STANDBY_RECHECK_SECS};
