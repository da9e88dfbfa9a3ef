//! Ordonnanceur de playlist
//!
//! Machine à états `Standby ⇄ Playing(index)`. `advance` parcourt au plus une
//! fois la liste complète ; si rien n'est éligible, l'ordonnanceur passe en
//! veille au lieu de boucler ou de rester figé, et `recheck` tente d'en
//! sortir périodiquement.

use crate::clock::{Clock, LocalClock};
use crate::model::PlaylistItem;
use crate::schedule::is_eligible;
use serde::Serialize;
use tracing::{debug, info};

/// Position courante dans la liste
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "index", rename_all = "snake_case")]
pub enum Position {
    Playing(usize),
    Standby,
}

/// État exposé de l'ordonnanceur
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleState {
    /// Toujours `Standby` ou un index valide de la liste courante
    pub position: Position,
    /// Identifiant du dernier élément joué, pour se repositionner après un
    /// remplacement de liste
    pub last_known_item_id: Option<String>,
}

impl Default for ScheduleState {
    fn default() -> Self {
        Self {
            position: Position::Standby,
            last_known_item_id: None,
        }
    }
}

impl ScheduleState {
    pub fn is_standby(&self) -> bool {
        self.position == Position::Standby
    }
}

/// Ordonnanceur de playlist
#[derive(Debug)]
pub struct Scheduler<C: Clock = LocalClock> {
    items: Vec<PlaylistItem>,
    state: ScheduleState,
    clock: C,
}

impl<C: Clock> Scheduler<C> {
    /// Crée un ordonnanceur vide, en veille
    pub fn new(clock: C) -> Self {
        Self {
            items: Vec::new(),
            state: ScheduleState::default(),
            clock,
        }
    }

    pub fn items(&self) -> &[PlaylistItem] {
        &self.items
    }

    pub fn state(&self) -> &ScheduleState {
        &self.state
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn current_index(&self) -> Option<usize> {
        match self.state.position {
            Position::Playing(index) => Some(index),
            Position::Standby => None,
        }
    }

    pub fn current_item(&self) -> Option<&PlaylistItem> {
        self.current_index().and_then(|i| self.items.get(i))
    }

    pub fn is_standby(&self) -> bool {
        self.state.is_standby()
    }

    /// Éligibilité d'un élément à l'heure de l'horloge
    pub fn is_eligible_now(&self, item: &PlaylistItem) -> bool {
        is_eligible(item, self.clock.now())
    }

    /// Passe à l'élément éligible suivant, en bouclant
    ///
    /// Depuis la veille, la recherche repart après le dernier élément joué
    /// s'il figure encore dans la liste, sinon depuis le début.
    pub fn advance(&mut self) -> Option<&PlaylistItem> {
        let start = match self.state.position {
            Position::Playing(index) => index + 1,
            Position::Standby => self
                .last_known_index()
                .map(|index| index + 1)
                .unwrap_or(0),
        };
        self.advance_from(start)
    }

    /// Tentative de sortie de veille
    ///
    /// Sans effet si un élément est en cours.
    pub fn recheck(&mut self) -> Option<&PlaylistItem> {
        if self.is_standby() {
            debug!("Standby recheck");
            self.advance()
        } else {
            self.current_item()
        }
    }

    /// Remplace la liste et se repositionne
    ///
    /// - élément courant retrouvé et éligible : on y reste (même si son
    ///   index a changé)
    /// - retrouvé mais devenu inéligible : on avance depuis sa position
    /// - absent : on avance depuis le début
    pub fn replace_items(&mut self, items: Vec<PlaylistItem>) -> Option<&PlaylistItem> {
        self.items = items;

        if self.items.is_empty() {
            self.enter_standby();
            return None;
        }

        match self.last_known_index() {
            Some(index) if self.is_eligible_now(&self.items[index]) => {
                debug!(index, "Current item kept after list replacement");
                self.state.position = Position::Playing(index);
                self.current_item()
            }
            Some(index) => self.advance_from(index + 1),
            None => self.advance_from(0),
        }
    }

    /// Élément éligible qui suivra le courant (pour le pré-chargement)
    ///
    /// Peut être l'élément courant lui-même s'il est le seul éligible.
    pub fn peek_next(&self) -> Option<&PlaylistItem> {
        let current = self.current_index()?;
        let len = self.items.len();
        let now = self.clock.now();
        (1..=len)
            .map(|offset| (current + offset) % len)
            .map(|index| &self.items[index])
            .find(|item| is_eligible(item, now))
    }

    fn last_known_index(&self) -> Option<usize> {
        let id = self.state.last_known_item_id.as_deref()?;
        self.items.iter().position(|item| item.id == id)
    }

    fn advance_from(&mut self, start: usize) -> Option<&PlaylistItem> {
        let len = self.items.len();
        if len == 0 {
            self.enter_standby();
            return None;
        }

        let now = self.clock.now();
        let found = (0..len)
            .map(|offset| (start + offset) % len)
            .find(|index| is_eligible(&self.items[*index], now));

        match found {
            Some(index) => {
                if self.is_standby() {
                    info!(item = %self.items[index].id, "Leaving standby");
                }
                self.state.position = Position::Playing(index);
                self.state.last_known_item_id = Some(self.items[index].id.clone());
                self.items.get(index)
            }
            None => {
                self.enter_standby();
                None
            }
        }
    }

    fn enter_standby(&mut self) {
        if !self.is_standby() {
            info!(items = self.items.len(), "No eligible item, entering standby");
        }
        self.state.position = Position::Standby;
    }
}

impl Default for Scheduler<LocalClock> {
    fn default() -> Self {
        Self::new(LocalClock)
    }
}
