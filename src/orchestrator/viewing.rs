//! Viewer orchestration: one proctor watching one candidate's stream.
//!
//! The viewer announces itself on the channel's roster and runs a single
//! responder session under a supervisor loop. The supervisor replaces the
//! session when its grace windows are exhausted, parks while the
//! broadcaster's presence is gone, and forwards session state, media, and
//! diagnostics to the watches the UI consumes.

use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{StreamConfig, TimingConfig};
use crate::media::{LocalTracks, RemoteStream};
use crate::orchestrator::status::ViewStatus;
use crate::peer::link::MediaLinkFactory;
use crate::session::{
    CloseReason, ConnectionSession, PresenceWatcher, RegistryNotice, SessionContext,
    SessionDiagnostics, SessionHandle,
};
use crate::signaling::{ChannelPaths, NegotiationRole, PresenceRecord, SignalingTransport};
use crate::Result;

/// A running view onto a remote broadcast.
pub struct Viewer {
    peer_id: String,
    paths: ChannelPaths,
    transport: Arc<dyn SignalingTransport>,
    presence_watcher: PresenceWatcher,
    status_rx: watch::Receiver<ViewStatus>,
    media_rx: watch::Receiver<Option<RemoteStream>>,
    diagnostics_rx: watch::Receiver<SessionDiagnostics>,
    stop_tx: watch::Sender<bool>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl Viewer {
    /// Announce presence on `remote_channel_id`'s roster and start
    /// receiving.
    pub async fn start(
        config: StreamConfig,
        transport: Arc<dyn SignalingTransport>,
        links: Arc<dyn MediaLinkFactory>,
        remote_channel_id: &str,
    ) -> Result<Self> {
        config.validate()?;
        let peer_id = config
            .peer_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let paths = ChannelPaths::new(remote_channel_id)?;

        // Announce on the roster, disconnect hook first thing after.
        let own_presence = paths.viewer_presence(&peer_id);
        transport
            .write(&own_presence, PresenceRecord::announce(&peer_id).to_value()?)
            .await?;
        transport.remove_on_disconnect(&own_presence).await?;

        let (presence_watcher, presence_rx) =
            PresenceWatcher::record(transport.as_ref(), &paths.presence()).await?;

        let (status_tx, status_rx) = watch::channel(ViewStatus::New);
        let (media_tx, media_rx) = watch::channel(None);
        let (diagnostics_tx, diagnostics_rx) = watch::channel(SessionDiagnostics::default());
        let (stop_tx, stop_rx) = watch::channel(false);

        let supervisor = Supervisor {
            peer_id: peer_id.clone(),
            channel_id: remote_channel_id.to_string(),
            paths: paths.clone(),
            transport: Arc::clone(&transport),
            links,
            timing: config.timing.clone(),
            status_tx,
            media_tx,
            diagnostics_tx,
        };
        let task = tokio::spawn(supervisor.run(presence_rx, stop_rx));

        info!("view {}: watching channel {}", peer_id, remote_channel_id);
        Ok(Self {
            peer_id,
            paths,
            transport,
            presence_watcher,
            status_rx,
            media_rx,
            diagnostics_rx,
            stop_tx,
            supervisor: Mutex::new(Some(task)),
        })
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn status(&self) -> ViewStatus {
        *self.status_rx.borrow()
    }

    pub fn status_watch(&self) -> watch::Receiver<ViewStatus> {
        self.status_rx.clone()
    }

    /// The received stream, `None` until media has settled.
    pub fn media(&self) -> Option<RemoteStream> {
        self.media_rx.borrow().clone()
    }

    pub fn media_watch(&self) -> watch::Receiver<Option<RemoteStream>> {
        self.media_rx.clone()
    }

    pub fn diagnostics(&self) -> SessionDiagnostics {
        self.diagnostics_rx.borrow().clone()
    }

    pub fn diagnostics_watch(&self) -> watch::Receiver<SessionDiagnostics> {
        self.diagnostics_rx.clone()
    }

    /// Stop viewing. Idempotent; waits for the supervisor to finish its
    /// teardown, including any session it was mid-way through creating.
    pub async fn stop(&self) {
        let mut supervisor = self.supervisor.lock().await;
        let Some(task) = supervisor.take() else {
            return;
        };
        info!("view {}: stopping", self.peer_id);

        let _ = self.stop_tx.send(true);
        let _ = task.await;
        self.presence_watcher.stop().await;

        // Own presence goes last, after the session's paths are gone.
        let own_presence = self.paths.viewer_presence(&self.peer_id);
        if let Err(e) = self.transport.remove(&own_presence).await {
            warn!("view {}: presence cleanup failed: {}", self.peer_id, e);
        }
        info!("view {}: stopped", self.peer_id);
    }
}

impl std::fmt::Debug for Viewer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Viewer")
            .field("peer_id", &self.peer_id)
            .field("status", &self.status())
            .finish()
    }
}

/// Owns the responder session across replacements.
struct Supervisor {
    peer_id: String,
    channel_id: String,
    paths: ChannelPaths,
    transport: Arc<dyn SignalingTransport>,
    links: Arc<dyn MediaLinkFactory>,
    timing: TimingConfig,
    status_tx: watch::Sender<ViewStatus>,
    media_tx: watch::Sender<Option<RemoteStream>>,
    diagnostics_tx: watch::Sender<SessionDiagnostics>,
}

enum SessionExit {
    /// `stop()` was requested; teardown is done.
    Stopped,
    /// Broadcaster presence disappeared; park until it returns.
    PresenceLost,
    /// Replacement requested; recreate after the delay.
    Replace,
}

impl Supervisor {
    /// Write this viewer's roster entry. Idempotent; an unchanged record
    /// does not produce a roster tick on the broadcaster side.
    async fn announce(&self) {
        let own_presence = self.paths.viewer_presence(&self.peer_id);
        let record = match PresenceRecord::announce(&self.peer_id).to_value() {
            Ok(value) => value,
            Err(_) => return,
        };
        if let Err(e) = self.transport.write(&own_presence, record).await {
            warn!("view {}: presence re-announce failed: {}", self.peer_id, e);
            return;
        }
        let _ = self.transport.remove_on_disconnect(&own_presence).await;
    }

    async fn run(self, mut presence_rx: watch::Receiver<bool>, mut stop_rx: watch::Receiver<bool>) {
        loop {
            // Park until the broadcaster is present.
            while !*presence_rx.borrow() {
                let _ = self.status_tx.send(ViewStatus::Connecting);
                tokio::select! {
                    _ = stop_rx.changed() => {
                        let _ = self.status_tx.send(ViewStatus::Closed);
                        return;
                    }
                    changed = presence_rx.changed() => {
                        if changed.is_err() {
                            let _ = self.status_tx.send(ViewStatus::Closed);
                            return;
                        }
                    }
                }
            }

            // Re-announce before each session: a broadcaster teardown
            // removes the whole channel subtree, roster entries included.
            self.announce().await;

            let (notices_tx, notices_rx) = mpsc::unbounded_channel();
            let ctx = SessionContext {
                remote_peer_id: self.channel_id.clone(),
                role: NegotiationRole::Responder,
                // Negotiation paths are keyed by this viewer's own id.
                paths: self
                    .paths
                    .negotiation(&self.peer_id, NegotiationRole::Responder),
                transport: Arc::clone(&self.transport),
                links: Arc::clone(&self.links),
                local_tracks: LocalTracks::none(),
                timing: self.timing.clone(),
                notices: notices_tx,
            };
            let handle = match ConnectionSession::spawn(ctx).await {
                Ok(handle) => handle,
                Err(e) => {
                    warn!("view {}: session failed to start: {}", self.peer_id, e);
                    let mut stop_rx = stop_rx.clone();
                    tokio::select! {
                        _ = tokio::time::sleep(self.timing.replacement_delay()) => continue,
                        _ = stop_rx.changed() => {
                            let _ = self.status_tx.send(ViewStatus::Closed);
                            return;
                        }
                    }
                }
            };

            match self
                .drive_session(&handle, notices_rx, &mut presence_rx, &mut stop_rx)
                .await
            {
                SessionExit::Stopped => {
                    handle.close(CloseReason::LocalStop).await;
                    let _ = self.media_tx.send(None);
                    let _ = self.status_tx.send(ViewStatus::Closed);
                    return;
                }
                SessionExit::PresenceLost => {
                    info!("view {}: broadcaster presence lost", self.peer_id);
                    handle.close(CloseReason::PresenceLost).await;
                    let _ = self.media_tx.send(None);
                    // Loop back to parking; a returning broadcaster gets a
                    // fresh session.
                }
                SessionExit::Replace => {
                    handle.close(CloseReason::Replaced).await;
                    let _ = self.media_tx.send(None);
                    let mut stop_rx = stop_rx.clone();
                    tokio::select! {
                        _ = tokio::time::sleep(self.timing.replacement_delay()) => {}
                        _ = stop_rx.changed() => {
                            let _ = self.status_tx.send(ViewStatus::Closed);
                            return;
                        }
                    }
                    debug!("view {}: creating replacement session", self.peer_id);
                }
            }
        }
    }

    /// Forward one session's surfaces until it needs intervention.
    async fn drive_session(
        &self,
        handle: &SessionHandle,
        mut notices_rx: mpsc::UnboundedReceiver<RegistryNotice>,
        presence_rx: &mut watch::Receiver<bool>,
        stop_rx: &mut watch::Receiver<bool>,
    ) -> SessionExit {
        let mut state_rx = handle.state_watch();
        let mut media_rx = handle.media_watch();
        let mut diagnostics_rx = handle.diagnostics_watch();

        loop {
            tokio::select! {
                biased;

                _ = stop_rx.changed() => return SessionExit::Stopped,

                changed = presence_rx.changed() => {
                    if changed.is_err() || !*presence_rx.borrow() {
                        return SessionExit::PresenceLost;
                    }
                }

                notice = notices_rx.recv() => {
                    match notice {
                        Some(RegistryNotice::ReplacementNeeded { .. }) => {
                            return SessionExit::Replace;
                        }
                        Some(_) => {}
                        None => return SessionExit::Replace,
                    }
                }

                changed = state_rx.changed() => {
                    if changed.is_err() {
                        return SessionExit::Replace;
                    }
                    let state = *state_rx.borrow();
                    let _ = self.status_tx.send(ViewStatus::from_session(state));
                }

                changed = media_rx.changed() => {
                    if changed.is_ok() {
                        let _ = self.media_tx.send(media_rx.borrow().clone());
                    }
                }

                changed = diagnostics_rx.changed() => {
                    if changed.is_ok() {
                        let _ = self.diagnostics_tx.send(diagnostics_rx.borrow().clone());
                    }
                }
            }
        }
    }
}
