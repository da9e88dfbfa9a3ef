//! # sgnsync - Réception des mises à jour de playlist
//!
//! Le moteur de lecture s'abonne à un [`SyncBridge`] et reçoit des
//! [`SyncEvent`] : playlist complète ou réglages d'écran. Deux
//! implémentations :
//!
//! - [`PollingBridge`] : interroge périodiquement le point d'accès HTTP, tant
//!   qu'au moins un abonné est présent
//! - [`PushBridge`] : alimenté par un transport externe (lignes JSON)
//!
//! Les deux n'émettent un évènement que si le contenu a changé, et
//! rejouent le dernier état connu à chaque nouvel abonné.
//!
//! ```no_run
//! use sgnsync::{PollingBridge, SyncBridge, SyncEvent};
//! use std::time::Duration;
//!
//! # async fn run() -> sgnsync::Result<()> {
//! let bridge = PollingBridge::http(
//!     "https://cms.example.com/screens/42/playlist",
//!     Duration::from_secs(30),
//!     Duration::from_secs(15),
//! )?;
//! let mut subscription = bridge.subscribe();
//! while let Some(event) = subscription.recv().await {
//!     if let SyncEvent::PlaylistChanged(items) = event {
//!         println!("{} items", items.len());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod bridge;
mod error;
mod polling;
mod push;

#[cfg(feature = "sgnconfig")]
mod config_ext;

pub use bridge::{RemotePlaylist, Subscription, SyncBridge, SyncEvent};
pub use error::{Result, SyncError};
pub use polling::{
    HttpPlaylistSource, PlaylistSource, PollingBridge, DEFAULT_POLL_INTERVAL_SECS,
    DEFAULT_REQUEST_TIMEOUT_SECS,
};
pub use push::{PushBridge, PushMessage};

#[cfg(feature = "sgnconfig")]
pub use config_ext::{SyncConfigExt, SyncMode};
