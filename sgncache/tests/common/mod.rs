//! Faux fetcher partagé par les tests d'intégration

#![allow(dead_code)]

use async_trait::async_trait;
use sgncache::{CacheError, CacheStore, FetchedMedia, MediaFetcher};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::Semaphore;

#[derive(Clone)]
enum FakeResponse {
    Media(Vec<u8>, Option<String>),
    Status(u16),
}

/// Fetcher en mémoire qui compte les appels par référence
///
/// En mode `gated`, chaque requête attend un jeton libéré par `release`.
#[derive(Default)]
pub struct FakeFetcher {
    responses: Mutex<HashMap<String, FakeResponse>>,
    calls: Mutex<HashMap<String, usize>>,
    gate: Option<Semaphore>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    pub fn serve(&self, reference: &str, body: &[u8], content_type: Option<&str>) {
        self.responses.lock().unwrap().insert(
            reference.to_string(),
            FakeResponse::Media(body.to_vec(), content_type.map(str::to_string)),
        );
    }

    pub fn fail(&self, reference: &str, status: u16) {
        self.responses
            .lock()
            .unwrap()
            .insert(reference.to_string(), FakeResponse::Status(status));
    }

    pub fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub fn calls(&self, reference: &str) -> usize {
        self.calls.lock().unwrap().get(reference).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl MediaFetcher for FakeFetcher {
    async fn fetch(&self, reference: &str) -> sgncache::Result<FetchedMedia> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(reference.to_string())
            .or_default() += 1;

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        let response = self.responses.lock().unwrap().get(reference).cloned();
        match response {
            Some(FakeResponse::Media(body, content_type)) => {
                Ok(FetchedMedia::new(body, content_type.as_deref()))
            }
            Some(FakeResponse::Status(status)) => Err(CacheError::FetchStatus {
                url: reference.to_string(),
                status,
            }),
            None => Err(CacheError::FetchStatus {
                url: reference.to_string(),
                status: 404,
            }),
        }
    }
}

pub const MP4_BYTES: &[u8] = &[0, 0, 0, 0x18, b'f', b't', b'y', b'p', b'm', b'p', b'4', b'2'];
pub const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

pub fn create_test_store(fetcher: Arc<FakeFetcher>) -> (TempDir, Arc<CacheStore>) {
    let temp_dir = tempfile::tempdir().unwrap();
    let store = CacheStore::open(temp_dir.path(), fetcher).unwrap();
    (temp_dir, Arc::new(store))
}
