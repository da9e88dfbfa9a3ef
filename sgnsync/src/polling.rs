//! Pont de synchronisation par interrogation périodique
//!
//! Le point d'accès est interrogé toutes les `poll_interval` tant qu'au
//! moins un abonné est inscrit. Un échec garde la dernière réponse : le
//! terminal continue de jouer ce qu'il a.

use crate::bridge::{Hub, RemotePlaylist, Subscription, SyncBridge};
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Période d'interrogation par défaut
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Timeout par défaut d'une requête de playlist
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Origine des playlists lues par le pont
#[async_trait]
pub trait PlaylistSource: Send + Sync {
    async fn fetch(&self) -> Result<RemotePlaylist>;
}

/// Point d'accès HTTP de la playlist
#[derive(Debug, Clone)]
pub struct HttpPlaylistSource {
    client: Client,
    url: String,
    timeout: Duration,
}

impl HttpPlaylistSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().connect_timeout(timeout).build()?;
        Ok(Self::with_client(client, url, timeout))
    }

    /// Create a source with a custom reqwest::Client
    pub fn with_client(client: Client, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            url: url.into(),
            timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PlaylistSource for HttpPlaylistSource {
    async fn fetch(&self) -> Result<RemotePlaylist> {
        let response = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

struct PollingState {
    hub: Arc<Hub>,
    source: Arc<dyn PlaylistSource>,
    interval: Duration,
    task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

async fn poll_once(hub: &Hub, source: &dyn PlaylistSource) -> Result<bool> {
    let remote = source.fetch().await?;
    Ok(hub.publish(remote))
}

// La tâche ne garde pas PollingState : son Drop doit pouvoir l'arrêter
async fn run(
    hub: Arc<Hub>,
    source: Arc<dyn PlaylistSource>,
    interval: Duration,
    stop_token: CancellationToken,
) {
    info!(?interval, "Playlist polling started");
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop_token.cancelled() => break,
            _ = ticker.tick() => {
                match poll_once(&hub, source.as_ref()).await {
                    Ok(true) => debug!("Playlist poll delivered a change"),
                    Ok(false) => debug!("Playlist unchanged"),
                    Err(e) => warn!("Playlist poll failed, keeping last playlist: {}", e),
                }
            }
        }
    }
    info!("Playlist polling stopped");
}

impl PollingState {
    fn start(&self) {
        let mut task = self.task.lock().unwrap_or_else(|p| p.into_inner());
        if task.is_some() {
            return;
        }
        let stop_token = CancellationToken::new();
        let handle = tokio::spawn(run(
            self.hub.clone(),
            self.source.clone(),
            self.interval,
            stop_token.clone(),
        ));
        *task = Some((stop_token, handle));
    }

    fn stop(&self) {
        let mut task = self.task.lock().unwrap_or_else(|p| p.into_inner());
        if let Some((stop_token, _handle)) = task.take() {
            stop_token.cancel();
        }
    }

    fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .is_some_and(|(token, handle)| !token.is_cancelled() && !handle.is_finished())
    }
}

/// Pont qui interroge une [`PlaylistSource`]
///
/// La tâche de fond démarre avec le premier abonné et s'arrête au départ du
/// dernier (ou à la destruction du pont).
#[derive(Clone)]
pub struct PollingBridge {
    state: Arc<PollingState>,
}

impl PollingBridge {
    pub fn new(source: Arc<dyn PlaylistSource>, interval: Duration) -> Self {
        Self {
            state: Arc::new(PollingState {
                hub: Arc::new(Hub::new()),
                source,
                interval: interval.max(Duration::from_millis(10)),
                task: Mutex::new(None),
            }),
        }
    }

    /// Pont sur un point d'accès HTTP
    pub fn http(url: impl Into<String>, interval: Duration, timeout: Duration) -> Result<Self> {
        let source = HttpPlaylistSource::new(url, timeout)?;
        Ok(Self::new(Arc::new(source), interval))
    }

    /// Interroge une fois et publie le résultat, indique s'il a changé
    pub async fn poll_once(&self) -> Result<bool> {
        poll_once(&self.state.hub, self.state.source.as_ref()).await
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.hub.subscriber_count()
    }
}

impl SyncBridge for PollingBridge {
    fn subscribe(&self) -> Subscription {
        let (subscription, first) = self.state.hub.subscribe();
        if first {
            self.state.start();
        }
        subscription
    }

    fn unsubscribe(&self, subscription: Subscription) {
        if self.state.hub.unsubscribe(subscription) {
            self.state.stop();
        }
    }

    fn name(&self) -> &'static str {
        "poll"
    }
}

impl Drop for PollingState {
    fn drop(&mut self) {
        if let Some((stop_token, _)) = self
            .task
            .get_mut()
            .unwrap_or_else(|p| p.into_inner())
            .take()
        {
            stop_token.cancel();
        }
    }
}
