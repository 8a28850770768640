//! Broadcaster orchestration: one candidate streaming to N proctors.
//!
//! The broadcaster announces its presence on the channel, watches the
//! viewer roster, and keeps one initiator session per announced viewer
//! through a [`SessionRegistry`]. Captured media is shared read-only
//! across all sessions; stopping the broadcast releases the bundle but
//! never stops tracks an individual session was using.

use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::StreamConfig;
use crate::media::LocalTracks;
use crate::orchestrator::status::BroadcastStatus;
use crate::peer::link::MediaLinkFactory;
use crate::session::{PresenceWatcher, RegistryCounts, SessionRecipe, SessionRegistry};
use crate::signaling::{ChannelPaths, NegotiationRole, PresenceRecord, SignalingTransport};
use crate::{Error, Result};

/// A running broadcast. Created by [`Broadcaster::start`], ended by
/// [`Broadcaster::stop`].
pub struct Broadcaster {
    peer_id: String,
    paths: ChannelPaths,
    transport: Arc<dyn SignalingTransport>,
    registry: Arc<SessionRegistry>,
    roster_watcher: PresenceWatcher,
    status_tx: watch::Sender<BroadcastStatus>,
    status_rx: watch::Receiver<BroadcastStatus>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    stopped: Mutex<bool>,
}

impl Broadcaster {
    /// Announce presence and start serving viewers.
    ///
    /// `local_tracks` is the captured media to stream; an empty bundle is
    /// rejected as a media acquisition failure so the UI can prompt the
    /// user rather than broadcast silence.
    pub async fn start(
        config: StreamConfig,
        transport: Arc<dyn SignalingTransport>,
        links: Arc<dyn MediaLinkFactory>,
        local_tracks: LocalTracks,
    ) -> Result<Self> {
        config.validate()?;
        if local_tracks.is_empty() {
            return Err(Error::MediaAcquisitionFailed(
                "broadcast requires captured media".to_string(),
            ));
        }

        let peer_id = config
            .peer_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let paths = ChannelPaths::new(&peer_id)?;
        let (status_tx, status_rx) = watch::channel(BroadcastStatus::Initializing);

        // Presence is a critical write: failure aborts the start attempt
        // and the collaborator retries. The disconnect hook goes in before
        // any negotiation can begin.
        let presence = PresenceRecord::announce(&peer_id);
        transport
            .write(&paths.presence(), presence.to_value()?)
            .await?;
        transport.remove_on_disconnect(&paths.presence()).await?;

        let recipe = SessionRecipe {
            role: NegotiationRole::Initiator,
            transport: Arc::clone(&transport),
            links,
            local_tracks,
            timing: config.timing.clone(),
            paths_for: {
                let paths = paths.clone();
                Arc::new(move |peer_id| paths.negotiation(peer_id, NegotiationRole::Initiator))
            },
            max_sessions: config.max_viewers as usize,
        };
        let registry = Arc::new(SessionRegistry::new(recipe));

        let (roster_watcher, mut roster_rx) =
            PresenceWatcher::roster(transport.as_ref(), &paths.viewers()).await?;

        let roster_task = {
            let registry = Arc::clone(&registry);
            let channel_id = peer_id.clone();
            tokio::spawn(async move {
                while let Some(roster) = roster_rx.recv().await {
                    info!(
                        "broadcast {}: roster tick, {} viewer(s) present",
                        channel_id,
                        roster.len()
                    );
                    registry.reconcile(&roster).await;
                }
            })
        };

        let status_task = {
            let mut counts_rx = registry.counts_watch();
            let status_tx = status_tx.clone();
            tokio::spawn(async move {
                while counts_rx.changed().await.is_ok() {
                    let counts = *counts_rx.borrow();
                    let status = if counts.connected > 0 {
                        BroadcastStatus::Streaming
                    } else {
                        BroadcastStatus::Ready
                    };
                    if status_tx.send(status).is_err() {
                        return;
                    }
                }
            })
        };

        let _ = status_tx.send(BroadcastStatus::Ready);
        info!("broadcast {}: started", peer_id);

        Ok(Self {
            peer_id,
            paths,
            transport,
            registry,
            roster_watcher,
            status_tx,
            status_rx,
            tasks: Mutex::new(vec![roster_task, status_task]),
            stopped: Mutex::new(false),
        })
    }

    /// The channel id viewers use to reach this broadcast (also the local
    /// participant id).
    pub fn channel_id(&self) -> &str {
        self.paths.channel_id()
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn status(&self) -> BroadcastStatus {
        *self.status_rx.borrow()
    }

    pub fn status_watch(&self) -> watch::Receiver<BroadcastStatus> {
        self.status_rx.clone()
    }

    /// Live viewer session counts; `connected` is the active viewer count.
    pub fn viewer_counts(&self) -> RegistryCounts {
        self.registry.counts()
    }

    pub fn counts_watch(&self) -> watch::Receiver<RegistryCounts> {
        self.registry.counts_watch()
    }

    /// Number of viewers with established connectivity.
    pub fn active_connections(&self) -> usize {
        self.registry.counts().connected
    }

    /// Tear the broadcast down. Idempotent; concurrent callers serialize
    /// and later ones return once the first teardown has finished.
    pub async fn stop(&self) {
        let mut stopped = self.stopped.lock().await;
        if *stopped {
            return;
        }
        info!("broadcast {}: stopping", self.peer_id);

        // Stop reacting to the roster before disposing sessions, so a
        // roster tick cannot recreate what is being torn down.
        self.roster_watcher.stop().await;
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
            let _ = task.await;
        }

        self.registry.dispose_all().await;

        if let Err(e) = self.transport.remove(&self.paths.presence()).await {
            warn!("broadcast {}: presence cleanup failed: {}", self.peer_id, e);
        }

        let _ = self.status_tx.send(BroadcastStatus::Disconnected);
        *stopped = true;
        info!("broadcast {}: stopped", self.peer_id);
    }
}

impl std::fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcaster")
            .field("peer_id", &self.peer_id)
            .field("status", &self.status())
            .finish()
    }
}
