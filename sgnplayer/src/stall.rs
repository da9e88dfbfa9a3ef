//! Détection des blocages du décodeur
//!
//! Le détecteur reçoit la position de l'élément à chaque tick. Une position
//! figée ne compte que si l'élément prétend jouer, et la tolérance dépend du
//! tampon : l'attente du réseau est tolérée bien plus longtemps qu'un
//! décodeur qui a des données mais n'avance pas.

use crate::element::ReadyState;
use serde::Serialize;

/// Tolérance par défaut tant que les données arrivent (30 s à 500 ms par tick)
pub const DEFAULT_BUFFERING_TICKS: u32 = 60;

/// Tolérance par défaut une fois les données disponibles (5 s à 500 ms par tick)
pub const DEFAULT_PLAYING_TICKS: u32 = 10;

const POSITION_EPSILON: f64 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StallThresholds {
    pub buffering_ticks: u32,
    pub playing_ticks: u32,
}

impl Default for StallThresholds {
    fn default() -> Self {
        Self {
            buffering_ticks: DEFAULT_BUFFERING_TICKS,
            playing_ticks: DEFAULT_PLAYING_TICKS,
        }
    }
}

impl StallThresholds {
    pub fn for_ready_state(&self, ready: ReadyState) -> u32 {
        if ready.has_future_data() {
            self.playing_ticks.max(1)
        } else {
            self.buffering_ticks.max(1)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallVerdict {
    /// La position a avancé depuis le tick précédent
    Progressing,
    /// En pause, terminé, ou première observation
    Idle,
    /// Figé depuis ce nombre de ticks, sous la tolérance
    Frozen(u32),
    Stalled,
}

#[derive(Debug, Clone)]
pub struct StallDetector {
    thresholds: StallThresholds,
    last_position: Option<f64>,
    frozen_ticks: u32,
}

impl StallDetector {
    pub fn new(thresholds: StallThresholds) -> Self {
        Self {
            thresholds,
            last_position: None,
            frozen_ticks: 0,
        }
    }

    pub fn frozen_ticks(&self) -> u32 {
        self.frozen_ticks
    }

    pub fn reset(&mut self) {
        self.last_position = None;
        self.frozen_ticks = 0;
    }

    pub fn observe(
        &mut self,
        position: f64,
        paused: bool,
        ended: bool,
        ready: ReadyState,
    ) -> StallVerdict {
        if paused || ended {
            self.frozen_ticks = 0;
            self.last_position = Some(position);
            return StallVerdict::Idle;
        }

        let Some(last) = self.last_position.replace(position) else {
            return StallVerdict::Idle;
        };

        if (position - last).abs() > POSITION_EPSILON {
            self.frozen_ticks = 0;
            return StallVerdict::Progressing;
        }

        self.frozen_ticks += 1;
        if self.frozen_ticks >= self.thresholds.for_ready_state(ready) {
            self.frozen_ticks = 0;
            StallVerdict::Stalled
        } else {
            StallVerdict::Frozen(self.frozen_ticks)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> StallDetector {
        StallDetector::new(StallThresholds::default())
    }

    fn freeze(detector: &mut StallDetector, ticks: u32, ready: ReadyState) -> Vec<StallVerdict> {
        (0..ticks)
            .map(|_| detector.observe(12.0, false, false, ready))
            .collect()
    }

    #[test]
    fn buffering_tolerates_long_freezes() {
        let mut detector = detector();
        detector.observe(12.0, false, false, ReadyState::HaveCurrentData);

        let verdicts = freeze(
            &mut detector,
            DEFAULT_BUFFERING_TICKS - 1,
            ReadyState::HaveCurrentData,
        );
        assert!(!verdicts.contains(&StallVerdict::Stalled));
        assert_eq!(
            detector.observe(12.0, false, false, ReadyState::HaveCurrentData),
            StallVerdict::Stalled
        );
    }

    #[test]
    fn frozen_with_data_stalls_quickly() {
        let mut detector = detector();
        detector.observe(12.0, false, false, ReadyState::HaveEnoughData);

        let verdicts = freeze(&mut detector, DEFAULT_PLAYING_TICKS, ReadyState::HaveEnoughData);
        assert_eq!(verdicts.last(), Some(&StallVerdict::Stalled));
        let frozen: Vec<_> = (1..DEFAULT_PLAYING_TICKS).map(StallVerdict::Frozen).collect();
        assert_eq!(&verdicts[..verdicts.len() - 1], frozen.as_slice());
    }

    #[test]
    fn progress_resets_the_counter() {
        let mut detector = detector();
        detector.observe(12.0, false, false, ReadyState::HaveEnoughData);
        freeze(&mut detector, DEFAULT_PLAYING_TICKS - 1, ReadyState::HaveEnoughData);
        assert_eq!(detector.frozen_ticks(), DEFAULT_PLAYING_TICKS - 1);

        assert_eq!(
            detector.observe(12.5, false, false, ReadyState::HaveEnoughData),
            StallVerdict::Progressing
        );
        assert_eq!(detector.frozen_ticks(), 0);
    }

    #[test]
    fn paused_or_ended_never_stall() {
        let mut detector = detector();
        for _ in 0..100 {
            assert_eq!(
                detector.observe(3.0, true, false, ReadyState::HaveEnoughData),
                StallVerdict::Idle
            );
            assert_eq!(
                detector.observe(3.0, false, true, ReadyState::HaveEnoughData),
                StallVerdict::Idle
            );
        }
    }
}
