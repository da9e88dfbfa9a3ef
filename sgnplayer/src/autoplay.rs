//! Maintien de la lecture automatique
//!
//! La plateforme peut refuser une lecture lancée par programme, et un
//! élément peut aussi se retrouver en pause de lui-même (hoquet du codec,
//! sortie de veille). Le contrôleur est sollicité à intervalle court tant
//! que son slot est courant, et redemande la lecture jusqu'à ce que
//! l'élément joue vraiment.

use crate::element::{MediaElement, PlayError};
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoplayState {
    Attempting,
    /// La tentative avec le son a été refusée, nouvel essai en muet
    MutedRetry,
    Playing,
}

#[derive(Debug, Clone)]
pub struct AutoplayController {
    state: AutoplayState,
    attempts: u32,
}

impl Default for AutoplayController {
    fn default() -> Self {
        Self::new()
    }
}

impl AutoplayController {
    pub fn new() -> Self {
        Self {
            state: AutoplayState::Attempting,
            attempts: 0,
        }
    }

    pub fn state(&self) -> AutoplayState {
        self.state
    }

    /// Demandes de lecture émises depuis le dernier démarrage réussi
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Retour à `Attempting`, quand l'élément est remplacé
    pub fn reset(&mut self) {
        self.state = AutoplayState::Attempting;
        self.attempts = 0;
    }

    /// Une étape de relance, sans effet sur un élément qui joue
    pub fn tick(&mut self, element: &mut dyn MediaElement) -> AutoplayState {
        if element.is_ended() {
            return self.state;
        }

        if self.state == AutoplayState::Playing {
            if !element.is_paused() {
                return self.state;
            }
            debug!("Element paused unexpectedly, requesting playback again");
            self.state = AutoplayState::Attempting;
        }

        if !element.is_paused() {
            self.playing();
            return self.state;
        }

        self.attempts += 1;
        match (self.state, element.play()) {
            (_, Ok(())) => self.playing(),
            (AutoplayState::Attempting, Err(PlayError::NotAllowed)) => {
                info!("Autoplay refused, retrying muted");
                element.set_muted(true);
                self.state = AutoplayState::MutedRetry;
            }
            (_, Err(e)) => debug!(attempts = self.attempts, "Play request failed: {}", e),
        }
        self.state
    }

    fn playing(&mut self) {
        if self.state != AutoplayState::Playing {
            debug!(attempts = self.attempts, "Playback started");
        }
        self.state = AutoplayState::Playing;
        self.attempts = 0;
    }
}
