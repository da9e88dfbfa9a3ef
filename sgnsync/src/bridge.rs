//! Abonnement commun à tous les ponts
//!
//! Le moteur de lecture ne voit que [`SyncBridge`] et [`Subscription`] : il
//! ignore si les mises à jour viennent d'une interrogation ou d'un push.

use serde::{Deserialize, Serialize};
use sgnplaylist::{PlaylistItem, ScreenSettings};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, warn};

const CHANNEL_CAPACITY: usize = 32;

/// Notification remise aux abonnés
///
/// Les deux variantes portent un remplacement complet, jamais un correctif.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    PlaylistChanged(Vec<PlaylistItem>),
    ScreenChanged(ScreenSettings),
}

/// Réponse du point d'accès de playlist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemotePlaylist {
    #[serde(default)]
    pub items: Vec<PlaylistItem>,
    #[serde(default)]
    pub screen: Option<ScreenSettings>,
}

/// Source des notifications de playlist et d'écran
pub trait SyncBridge: Send + Sync {
    /// Inscrit un nouvel abonné
    ///
    /// L'abonnement rend d'abord la dernière playlist et les derniers
    /// réglages d'écran connus, puis chaque changement ultérieur.
    fn subscribe(&self) -> Subscription;

    /// Désinscrit un abonné
    fn unsubscribe(&self, subscription: Subscription);

    /// Nom court pour les logs
    fn name(&self) -> &'static str;
}

/// Abonnement retourné par [`SyncBridge::subscribe`]
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    backlog: VecDeque<SyncEvent>,
    receiver: broadcast::Receiver<SyncEvent>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Attend l'évènement suivant, `None` une fois le pont disparu
    pub async fn recv(&mut self) -> Option<SyncEvent> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Events are full replacements: the next one supersedes what was lost
                    warn!(subscription = self.id, skipped, "Sync subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Évènement déjà en file, sans attendre
    pub fn try_recv(&mut self) -> Option<SyncEvent> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

/// Suivi des abonnés et détection des changements, communs aux ponts
#[derive(Debug)]
pub(crate) struct Hub {
    sender: broadcast::Sender<SyncEvent>,
    next_id: AtomicU64,
    active: Mutex<HashSet<u64>>,
    last_playlist: Mutex<Option<Vec<PlaylistItem>>>,
    last_screen: Mutex<Option<ScreenSettings>>,
}

impl Hub {
    pub(crate) fn new() -> Self {
        Self {
            sender: broadcast::channel(CHANNEL_CAPACITY).0,
            next_id: AtomicU64::new(1),
            active: Mutex::new(HashSet::new()),
            last_playlist: Mutex::new(None),
            last_screen: Mutex::new(None),
        }
    }

    /// Retourne l'abonnement et indique s'il est le premier actif
    pub(crate) fn subscribe(&self) -> (Subscription, bool) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        // Le receiver est créé avant la lecture de l'état pour ne rien perdre
        let receiver = self.sender.subscribe();

        let mut backlog = VecDeque::new();
        if let Some(items) = lock(&self.last_playlist).clone() {
            backlog.push_back(SyncEvent::PlaylistChanged(items));
        }
        if let Some(screen) = *lock(&self.last_screen) {
            backlog.push_back(SyncEvent::ScreenChanged(screen));
        }

        let mut active = lock(&self.active);
        active.insert(id);
        let first = active.len() == 1;
        debug!(subscription = id, first, "Sync subscriber added");

        (
            Subscription {
                id,
                backlog,
                receiver,
            },
            first,
        )
    }

    /// `true` quand le dernier abonné actif est parti
    pub(crate) fn unsubscribe(&self, subscription: Subscription) -> bool {
        let mut active = lock(&self.active);
        let removed = active.remove(&subscription.id);
        debug!(subscription = subscription.id, "Sync subscriber removed");
        removed && active.is_empty()
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        lock(&self.active).len()
    }

    /// Émet la playlist si elle diffère de la dernière remise
    pub(crate) fn publish_playlist(&self, items: Vec<PlaylistItem>) -> bool {
        {
            let mut last = lock(&self.last_playlist);
            if last.as_ref() == Some(&items) {
                return false;
            }
            *last = Some(items.clone());
        }
        debug!(items = items.len(), "Playlist changed");
        // Err only when nobody listens; the value is kept for the next subscriber
        let _ = self.sender.send(SyncEvent::PlaylistChanged(items));
        true
    }

    /// Émet les réglages d'écran s'ils diffèrent des derniers remis
    pub(crate) fn publish_screen(&self, screen: ScreenSettings) -> bool {
        {
            let mut last = lock(&self.last_screen);
            if *last == Some(screen) {
                return false;
            }
            *last = Some(screen);
        }
        debug!(?screen, "Screen settings changed");
        let _ = self.sender.send(SyncEvent::ScreenChanged(screen));
        true
    }

    pub(crate) fn publish(&self, remote: RemotePlaylist) -> bool {
        let playlist_changed = self.publish_playlist(remote.items);
        let screen_changed = remote
            .screen
            .map(|screen| self.publish_screen(screen))
            .unwrap_or(false);
        playlist_changed || screen_changed
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
