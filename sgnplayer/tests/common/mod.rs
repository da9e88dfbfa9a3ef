//! Faux affichage et faux transport partagés par les tests d'intégration

#![allow(dead_code)]

use async_trait::async_trait;
use sgncache::{CacheError, CacheStore, FetchedMedia, MediaFetcher, MediaResolver};
use sgnplayer::{
    ElementEvent, ElementEventKind, ElementEventSender, MediaElement, PlayError, ReadyState,
    RenderSurface, SlotInstance,
};
use sgnplaylist::{MediaType, PlaylistItem};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::Semaphore;

pub const MP4_BYTES: &[u8] = &[0, 0, 0, 0x18, b'f', b't', b'y', b'p', b'm', b'p', b'4', b'2'];
pub const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

/// Fetcher en mémoire ; toute référence inconnue répond 404
///
/// Les références retenues par [`FakeFetcher::hold`] attendent un jeton
/// libéré par [`FakeFetcher::release`].
pub struct FakeFetcher {
    responses: Mutex<HashMap<String, (Vec<u8>, String)>>,
    held: Mutex<HashSet<String>>,
    gate: Semaphore,
}

impl FakeFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(HashMap::new()),
            held: Mutex::new(HashSet::new()),
            gate: Semaphore::new(0),
        })
    }

    /// L'origine de la référence ne répond plus (404)
    pub fn fail(&self, reference: &str) {
        self.responses.lock().unwrap().remove(reference);
    }

    pub fn hold(&self, reference: &str) {
        self.held.lock().unwrap().insert(reference.to_string());
    }

    pub fn release(&self, permits: usize) {
        self.gate.add_permits(permits);
    }

    pub fn serve(&self, reference: &str, body: &[u8], content_type: &str) {
        self.responses.lock().unwrap().insert(
            reference.to_string(),
            (body.to_vec(), content_type.to_string()),
        );
    }
}

#[async_trait]
impl MediaFetcher for FakeFetcher {
    async fn fetch(&self, reference: &str) -> sgncache::Result<FetchedMedia> {
        let held = self.held.lock().unwrap().contains(reference);
        if held {
            self.gate.acquire().await.unwrap().forget();
        }
        let response = self.responses.lock().unwrap().get(reference).cloned();
        match response {
            Some((body, content_type)) => Ok(FetchedMedia::new(body, Some(&content_type))),
            None => Err(CacheError::FetchStatus {
                url: reference.to_string(),
                status: 404,
            }),
        }
    }
}

pub fn create_resolver(fetcher: Arc<FakeFetcher>) -> (TempDir, Arc<MediaResolver>) {
    let temp_dir = tempfile::tempdir().unwrap();
    let store = CacheStore::open(temp_dir.path(), fetcher).unwrap();
    (temp_dir, Arc::new(MediaResolver::new(Arc::new(store))))
}

/// État observable d'un faux élément
#[derive(Debug, Clone)]
pub struct ElementState {
    pub uri: String,
    pub paused: bool,
    pub muted: bool,
    pub visible: bool,
    pub ended: bool,
    pub position: f64,
    pub ready: ReadyState,
    pub plays: u32,
    pub refuse_unmuted: bool,
}

impl Default for ElementState {
    fn default() -> Self {
        Self {
            uri: String::new(),
            paused: true,
            muted: false,
            visible: false,
            ended: false,
            position: 0.0,
            ready: ReadyState::HaveNothing,
            plays: 0,
            refuse_unmuted: false,
        }
    }
}

struct FakeElement {
    state: Arc<Mutex<ElementState>>,
}

impl MediaElement for FakeElement {
    fn load(&mut self, uri: &str) {
        let mut state = self.state.lock().unwrap();
        state.uri = uri.to_string();
        state.paused = true;
        state.position = 0.0;
    }

    fn play(&mut self) -> Result<(), PlayError> {
        let mut state = self.state.lock().unwrap();
        state.plays += 1;
        if state.refuse_unmuted && !state.muted {
            return Err(PlayError::NotAllowed);
        }
        state.paused = false;
        Ok(())
    }

    fn pause(&mut self) {
        self.state.lock().unwrap().paused = true;
    }

    fn set_muted(&mut self, muted: bool) {
        self.state.lock().unwrap().muted = muted;
    }

    fn is_muted(&self) -> bool {
        self.state.lock().unwrap().muted
    }

    fn is_paused(&self) -> bool {
        self.state.lock().unwrap().paused
    }

    fn is_ended(&self) -> bool {
        self.state.lock().unwrap().ended
    }

    fn position(&self) -> f64 {
        self.state.lock().unwrap().position
    }

    fn ready_state(&self) -> ReadyState {
        self.state.lock().unwrap().ready
    }

    fn set_visible(&mut self, visible: bool) {
        self.state.lock().unwrap().visible = visible;
    }
}

/// Élément créé par la fausse surface
#[derive(Clone)]
pub struct CreatedElement {
    pub instance: SlotInstance,
    pub item_id: String,
    pub media_type: MediaType,
    pub state: Arc<Mutex<ElementState>>,
    events: ElementEventSender,
}

impl CreatedElement {
    pub fn state(&self) -> ElementState {
        self.state.lock().unwrap().clone()
    }

    pub fn update(&self, f: impl FnOnce(&mut ElementState)) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn event(&self, kind: ElementEventKind) -> ElementEvent {
        ElementEvent::new(self.instance, kind)
    }

    /// Envoie l'évènement par le canal, comme le ferait un vrai élément
    pub fn emit(&self, kind: ElementEventKind) {
        self.events.send(self.event(kind)).unwrap();
    }
}

#[derive(Default)]
struct SurfaceLog {
    elements: Vec<CreatedElement>,
    widgets: Vec<String>,
    links: Vec<String>,
    standby: usize,
    refuse_unmuted: bool,
}

/// Surface de rendu qui enregistre tout ce qu'on lui demande
#[derive(Clone, Default)]
pub struct FakeSurface {
    log: Arc<Mutex<SurfaceLog>>,
}

impl FakeSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Les éléments créés ensuite refusent de jouer sans être muets
    pub fn refuse_unmuted_autoplay(&self) {
        self.log.lock().unwrap().refuse_unmuted = true;
    }

    pub fn elements(&self) -> Vec<CreatedElement> {
        self.log.lock().unwrap().elements.clone()
    }

    pub fn elements_for(&self, item_id: &str) -> Vec<CreatedElement> {
        self.elements()
            .into_iter()
            .filter(|e| e.item_id == item_id)
            .collect()
    }

    pub fn last_element(&self, item_id: &str) -> CreatedElement {
        self.elements_for(item_id)
            .pop()
            .unwrap_or_else(|| panic!("no element for {item_id}"))
    }

    pub fn widgets(&self) -> Vec<String> {
        self.log.lock().unwrap().widgets.clone()
    }

    pub fn links(&self) -> Vec<String> {
        self.log.lock().unwrap().links.clone()
    }

    pub fn standby_count(&self) -> usize {
        self.log.lock().unwrap().standby
    }
}

impl RenderSurface for FakeSurface {
    fn create_element(
        &mut self,
        instance: SlotInstance,
        item: &PlaylistItem,
        media_type: MediaType,
        events: ElementEventSender,
    ) -> Box<dyn MediaElement> {
        let mut log = self.log.lock().unwrap();
        let state = Arc::new(Mutex::new(ElementState {
            refuse_unmuted: log.refuse_unmuted,
            ..ElementState::default()
        }));
        log.elements.push(CreatedElement {
            instance,
            item_id: item.id.clone(),
            media_type,
            state: state.clone(),
            events,
        });
        Box::new(FakeElement { state })
    }

    fn show_widget(&mut self, item: &PlaylistItem) {
        self.log.lock().unwrap().widgets.push(item.id.clone());
    }

    fn show_external_link(&mut self, item: &PlaylistItem) {
        self.log.lock().unwrap().links.push(item.id.clone());
    }

    fn show_standby(&mut self) {
        self.log.lock().unwrap().standby += 1;
    }
}
