//! Réglages du moteur de lecture

use crate::stall::StallThresholds;
use std::time::Duration;

pub const DEFAULT_AUTOPLAY_RETRY_MS: u64 = 500;
pub const DEFAULT_STALL_TICK_MS: u64 = 500;
pub const DEFAULT_ITEM_SECS: u64 = 10;
pub const DEFAULT_STANDBY_RECHECK_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSettings {
    pub autoplay_retry: Duration,
    pub stall_tick: Duration,
    pub stall_thresholds: StallThresholds,
    /// Durée d'affichage des éléments de durée nulle
    pub default_item_duration: Duration,
    pub audio_enabled: bool,
    pub standby_recheck: Duration,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            autoplay_retry: Duration::from_millis(DEFAULT_AUTOPLAY_RETRY_MS),
            stall_tick: Duration::from_millis(DEFAULT_STALL_TICK_MS),
            stall_thresholds: StallThresholds::default(),
            default_item_duration: Duration::from_secs(DEFAULT_ITEM_SECS),
            audio_enabled: false,
            standby_recheck: Duration::from_secs(DEFAULT_STANDBY_RECHECK_SECS),
        }
    }
}
