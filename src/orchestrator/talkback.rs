//! Talkback orchestration: reverse audio from a proctor to a candidate.
//!
//! Structurally the mirror of the primary stream with the initiator role
//! swapped. The speaker (proctor) announces presence on the talkback admin
//! roster and initiates one audio session; the listener (candidate) runs a
//! responder registry over that roster. Talkback sessions are fully
//! independent of the primary stream's sessions for the same pair.

use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::StreamConfig;
use crate::media::{LocalTracks, RemoteStream};
use crate::orchestrator::status::TalkbackStatus;
use crate::peer::link::MediaLinkFactory;
use crate::session::{
    CloseReason, ConnectionSession, PresenceWatcher, RegistryCounts, RegistryNotice,
    SessionContext, SessionHandle, SessionRecipe, SessionRegistry,
};
use crate::signaling::{NegotiationRole, PresenceRecord, SignalingTransport, TalkbackPaths};
use crate::{Error, Result};

/// Proctor side of the talkback channel: announces, offers, speaks.
pub struct TalkbackSpeaker {
    peer_id: String,
    paths: TalkbackPaths,
    transport: Arc<dyn SignalingTransport>,
    status_rx: watch::Receiver<TalkbackStatus>,
    stop_tx: watch::Sender<bool>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl TalkbackSpeaker {
    /// Start speaking to the candidate on `remote_channel_id`.
    ///
    /// `local_tracks` must carry audio; an empty bundle is a media
    /// acquisition failure, surfaced so the UI can prompt for a microphone.
    pub async fn start(
        config: StreamConfig,
        transport: Arc<dyn SignalingTransport>,
        links: Arc<dyn MediaLinkFactory>,
        remote_channel_id: &str,
        local_tracks: LocalTracks,
    ) -> Result<Self> {
        config.validate()?;
        if !local_tracks.has_audio() {
            return Err(Error::MediaAcquisitionFailed(
                "talkback requires a captured microphone".to_string(),
            ));
        }

        let peer_id = config
            .peer_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let paths = TalkbackPaths::new(remote_channel_id)?;

        let own_presence = paths.speaker_presence(&peer_id);
        transport
            .write(&own_presence, PresenceRecord::announce(&peer_id).to_value()?)
            .await?;
        transport.remove_on_disconnect(&own_presence).await?;

        let (status_tx, status_rx) = watch::channel(TalkbackStatus::Connecting);
        let (stop_tx, stop_rx) = watch::channel(false);

        let supervisor = SpeakerSupervisor {
            peer_id: peer_id.clone(),
            channel_id: remote_channel_id.to_string(),
            paths: paths.clone(),
            transport: Arc::clone(&transport),
            links,
            local_tracks,
            config,
            status_tx,
        };
        let task = tokio::spawn(supervisor.run(stop_rx));

        info!(
            "talkback {}: speaking on channel {}",
            peer_id, remote_channel_id
        );
        Ok(Self {
            peer_id,
            paths,
            transport,
            status_rx,
            stop_tx,
            supervisor: Mutex::new(Some(task)),
        })
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// True while the talkback channel is up (until [`stop`](Self::stop)).
    pub fn is_speaking(&self) -> bool {
        *self.status_rx.borrow() != TalkbackStatus::Off
    }

    pub fn status(&self) -> TalkbackStatus {
        *self.status_rx.borrow()
    }

    pub fn status_watch(&self) -> watch::Receiver<TalkbackStatus> {
        self.status_rx.clone()
    }

    /// Stop speaking and clean the talkback paths up. Idempotent.
    pub async fn stop(&self) {
        let mut supervisor = self.supervisor.lock().await;
        let Some(task) = supervisor.take() else {
            return;
        };
        info!("talkback {}: stopping", self.peer_id);

        let _ = self.stop_tx.send(true);
        let _ = task.await;

        let own_presence = self.paths.speaker_presence(&self.peer_id);
        if let Err(e) = self.transport.remove(&own_presence).await {
            warn!(
                "talkback {}: presence cleanup failed: {}",
                self.peer_id, e
            );
        }
        info!("talkback {}: stopped", self.peer_id);
    }
}

impl std::fmt::Debug for TalkbackSpeaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TalkbackSpeaker")
            .field("peer_id", &self.peer_id)
            .field("status", &self.status())
            .finish()
    }
}

/// Owns the speaker's initiator session across replacements.
struct SpeakerSupervisor {
    peer_id: String,
    channel_id: String,
    paths: TalkbackPaths,
    transport: Arc<dyn SignalingTransport>,
    links: Arc<dyn MediaLinkFactory>,
    local_tracks: LocalTracks,
    config: StreamConfig,
    status_tx: watch::Sender<TalkbackStatus>,
}

impl SpeakerSupervisor {
    async fn run(self, mut stop_rx: watch::Receiver<bool>) {
        loop {
            let (notices_tx, mut notices_rx) = mpsc::unbounded_channel();
            let ctx = SessionContext {
                remote_peer_id: self.channel_id.clone(),
                role: NegotiationRole::Initiator,
                // Negotiation paths are keyed by this speaker's own id.
                paths: self
                    .paths
                    .negotiation(&self.peer_id, NegotiationRole::Initiator),
                transport: Arc::clone(&self.transport),
                links: Arc::clone(&self.links),
                local_tracks: self.local_tracks.clone(),
                timing: self.config.timing.clone(),
                notices: notices_tx,
            };
            let handle = match ConnectionSession::spawn(ctx).await {
                Ok(handle) => handle,
                Err(e) => {
                    warn!("talkback {}: session failed to start: {}", self.peer_id, e);
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.timing.replacement_delay()) => continue,
                        _ = stop_rx.changed() => {
                            let _ = self.status_tx.send(TalkbackStatus::Off);
                            return;
                        }
                    }
                }
            };

            let replace = self
                .drive_session(&handle, &mut notices_rx, &mut stop_rx)
                .await;
            if !replace {
                handle.close(CloseReason::LocalStop).await;
                let _ = self.status_tx.send(TalkbackStatus::Off);
                return;
            }

            handle.close(CloseReason::Replaced).await;
            tokio::select! {
                _ = tokio::time::sleep(self.config.timing.replacement_delay()) => {}
                _ = stop_rx.changed() => {
                    let _ = self.status_tx.send(TalkbackStatus::Off);
                    return;
                }
            }
        }
    }

    /// Returns true when the session should be replaced, false on stop.
    async fn drive_session(
        &self,
        handle: &SessionHandle,
        notices_rx: &mut mpsc::UnboundedReceiver<RegistryNotice>,
        stop_rx: &mut watch::Receiver<bool>,
    ) -> bool {
        let mut state_rx = handle.state_watch();
        loop {
            tokio::select! {
                biased;

                _ = stop_rx.changed() => return false,

                notice = notices_rx.recv() => {
                    match notice {
                        Some(RegistryNotice::ReplacementNeeded { .. }) | None => return true,
                        Some(_) => {}
                    }
                }

                changed = state_rx.changed() => {
                    if changed.is_err() {
                        return true;
                    }
                    let state = *state_rx.borrow();
                    let _ = self.status_tx.send(TalkbackStatus::from_session(state));
                }
            }
        }
    }
}

/// Candidate side of the talkback channel: answers every announced speaker.
///
/// Runs a responder registry over the admin roster, so several proctors can
/// speak to the same candidate, each over its own session.
pub struct TalkbackListener {
    channel_id: String,
    registry: Arc<SessionRegistry>,
    roster_watcher: PresenceWatcher,
    roster_task: Mutex<Option<JoinHandle<()>>>,
    stopped: Mutex<bool>,
}

impl TalkbackListener {
    /// Start answering speakers on this candidate's talkback namespace.
    /// `channel_id` is the candidate's own participant id.
    pub async fn start(
        config: StreamConfig,
        transport: Arc<dyn SignalingTransport>,
        links: Arc<dyn MediaLinkFactory>,
        channel_id: &str,
    ) -> Result<Self> {
        config.validate()?;
        let paths = TalkbackPaths::new(channel_id)?;

        let recipe = SessionRecipe {
            role: NegotiationRole::Responder,
            transport: Arc::clone(&transport),
            links,
            // The listener only receives; nothing is sent back.
            local_tracks: LocalTracks::none(),
            timing: config.timing.clone(),
            paths_for: {
                let paths = paths.clone();
                Arc::new(move |peer_id| paths.negotiation(peer_id, NegotiationRole::Responder))
            },
            max_sessions: config.max_viewers as usize,
        };
        let registry = Arc::new(SessionRegistry::new(recipe));

        let (roster_watcher, mut roster_rx) =
            PresenceWatcher::roster(transport.as_ref(), &paths.admin()).await?;
        let roster_task = {
            let registry = Arc::clone(&registry);
            let channel_id = channel_id.to_string();
            tokio::spawn(async move {
                while let Some(roster) = roster_rx.recv().await {
                    info!(
                        "talkback listener {}: {} speaker(s) present",
                        channel_id,
                        roster.len()
                    );
                    registry.reconcile(&roster).await;
                }
            })
        };

        info!("talkback listener {}: started", channel_id);
        Ok(Self {
            channel_id: channel_id.to_string(),
            registry,
            roster_watcher,
            roster_task: Mutex::new(Some(roster_task)),
            stopped: Mutex::new(false),
        })
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Live speaker session counts.
    pub fn counts(&self) -> RegistryCounts {
        self.registry.counts()
    }

    pub fn counts_watch(&self) -> watch::Receiver<RegistryCounts> {
        self.registry.counts_watch()
    }

    /// Whether any speaker currently has audio flowing.
    pub fn is_hearing(&self) -> bool {
        self.registry.counts().connected > 0
    }

    /// Session handle for one speaker, for its media watch.
    pub async fn speaker_session(&self, peer_id: &str) -> Option<Arc<SessionHandle>> {
        self.registry.handle(peer_id).await
    }

    /// Received audio per connected speaker, in registry order.
    pub async fn speaker_streams(&self) -> Vec<(String, RemoteStream)> {
        let mut streams = Vec::new();
        for peer_id in self.registry.peer_ids().await {
            if let Some(handle) = self.registry.handle(&peer_id).await {
                if let Some(stream) = handle.media_watch().borrow().clone() {
                    streams.push((peer_id, stream));
                }
            }
        }
        streams
    }

    /// Stop answering and dispose every speaker session. Idempotent.
    pub async fn stop(&self) {
        let mut stopped = self.stopped.lock().await;
        if *stopped {
            return;
        }
        info!("talkback listener {}: stopping", self.channel_id);

        self.roster_watcher.stop().await;
        if let Some(task) = self.roster_task.lock().await.take() {
            task.abort();
            let _ = task.await;
        }
        self.registry.dispose_all().await;

        *stopped = true;
        info!("talkback listener {}: stopped", self.channel_id);
    }
}

impl std::fmt::Debug for TalkbackListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TalkbackListener")
            .field("channel_id", &self.channel_id)
            .field("counts", &self.counts())
            .finish()
    }
}
