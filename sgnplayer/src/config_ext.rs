//! Extension de sgnconfig pour le moteur de lecture

use crate::settings::{
    PlayerSettings, DEFAULT_AUTOPLAY_RETRY_MS, DEFAULT_ITEM_SECS, DEFAULT_STALL_TICK_MS,
};
use crate::stall::{StallThresholds, DEFAULT_BUFFERING_TICKS, DEFAULT_PLAYING_TICKS};
use sgnplaylist::PlaylistConfigExt;
use std::time::Duration;

/// Trait d'extension pour sgnconfig::Config
pub trait PlayerConfigExt {
    /// Réglages de la section `player` (et l'intervalle de sortie de veille)
    fn player_settings(&self) -> PlayerSettings;
}

impl PlayerConfigExt for sgnconfig::Config {
    fn player_settings(&self) -> PlayerSettings {
        let ms = |key: &str, default: u64| {
            Duration::from_millis(self.get_u64_or(&["player", key], default).max(10))
        };
        let ticks = |key: &str, default: u32| {
            let value = self.get_u64_or(&["player", key], u64::from(default));
            u32::try_from(value).unwrap_or(u32::MAX).max(1)
        };

        PlayerSettings {
            autoplay_retry: ms("autoplay_retry_ms", DEFAULT_AUTOPLAY_RETRY_MS),
            stall_tick: ms("stall_tick_ms", DEFAULT_STALL_TICK_MS),
            stall_thresholds: StallThresholds {
                buffering_ticks: ticks("stall_buffering_ticks", DEFAULT_BUFFERING_TICKS),
                playing_ticks: ticks("stall_playing_ticks", DEFAULT_PLAYING_TICKS),
            },
            default_item_duration: Duration::from_secs(
                self.get_u64_or(&["player", "default_item_secs"], DEFAULT_ITEM_SECS)
                    .max(1),
            ),
            audio_enabled: self.get_bool_or(&["player", "audio_enabled"], false),
            standby_recheck: self.standby_recheck_interval(),
        }
    }
}
