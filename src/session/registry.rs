//! Keyed collection of connection sessions for one local role.
//!
//! The registry owns every [`SessionHandle`] it creates; no other component
//! holds one directly. Reconciliation against the presence roster is
//! idempotent and safe to run overlapping with itself: the create-or-skip
//! check and the insert happen under one lock, so a roster tick arriving
//! while a previous pass is still spawning cannot duplicate a session.
//!
//! Recovery is by replacement. When a session reports that its grace
//! windows are exhausted, the registry closes it, waits the replacement
//! delay, and creates a successor for the same peer if that peer is still
//! present.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::TimingConfig;
use crate::media::LocalTracks;
use crate::peer::link::MediaLinkFactory;
use crate::session::connection::{ConnectionSession, SessionContext, SessionHandle};
use crate::session::state::{CloseReason, RegistryNotice, SessionState};
use crate::signaling::{NegotiationPaths, NegotiationRole, SignalingTransport};

/// Live session counts published by a registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryCounts {
    /// Sessions currently in the registry, any state.
    pub total: usize,
    /// Sessions whose transport is connected.
    pub connected: usize,
}

/// How a registry builds a session for a newly present peer.
///
/// Everything except the peer id is fixed per registry: the role, the
/// shared capture, the signaling and link stacks, and the path layout.
pub struct SessionRecipe {
    pub role: NegotiationRole,
    pub transport: Arc<dyn SignalingTransport>,
    pub links: Arc<dyn MediaLinkFactory>,
    pub local_tracks: LocalTracks,
    pub timing: TimingConfig,
    /// Negotiation paths for a given remote peer id.
    pub paths_for: Arc<dyn Fn(&str) -> NegotiationPaths + Send + Sync>,
    /// Hard cap on concurrent sessions; peers past it are logged and skipped.
    pub max_sessions: usize,
}

struct RegistryInner {
    recipe: SessionRecipe,
    sessions: Mutex<HashMap<String, Arc<SessionHandle>>>,
    /// Peers the latest roster says should have a session.
    desired: parking_lot::Mutex<HashSet<String>>,
    notices_tx: mpsc::UnboundedSender<RegistryNotice>,
    counts_tx: watch::Sender<RegistryCounts>,
    closing_tx: watch::Sender<bool>,
    /// Consecutive replacements per peer, for operator visibility.
    replacement_streaks: parking_lot::Mutex<HashMap<String, u32>>,
    replacement_tasks: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

/// Registry of connection sessions, one per present remote peer.
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
    notice_task: Mutex<Option<JoinHandle<()>>>,
    counts_rx: watch::Receiver<RegistryCounts>,
}

impl SessionRegistry {
    pub fn new(recipe: SessionRecipe) -> Self {
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();
        let (counts_tx, counts_rx) = watch::channel(RegistryCounts::default());
        let (closing_tx, _) = watch::channel(false);

        let inner = Arc::new(RegistryInner {
            recipe,
            sessions: Mutex::new(HashMap::new()),
            desired: parking_lot::Mutex::new(HashSet::new()),
            notices_tx,
            counts_tx,
            closing_tx,
            replacement_streaks: parking_lot::Mutex::new(HashMap::new()),
            replacement_tasks: parking_lot::Mutex::new(Vec::new()),
        });

        let notice_task = tokio::spawn(Self::notice_loop(Arc::clone(&inner), notices_rx));

        Self {
            inner,
            notice_task: Mutex::new(Some(notice_task)),
            counts_rx,
        }
    }

    /// Bring the session set in line with a presence roster.
    ///
    /// Present peers get a session if they have none or their existing one
    /// is terminal; healthy sessions are left untouched. Peers absent from
    /// the roster have their sessions closed.
    pub async fn reconcile(&self, roster: &[String]) {
        {
            let mut desired = self.inner.desired.lock();
            desired.clear();
            desired.extend(roster.iter().cloned());
        }

        for peer_id in roster {
            self.inner.ensure_session(peer_id).await;
        }

        let to_remove: Vec<(String, Arc<SessionHandle>)> = {
            let mut sessions = self.inner.sessions.lock().await;
            let gone: Vec<String> = sessions
                .keys()
                .filter(|id| !roster.contains(id))
                .cloned()
                .collect();
            gone.into_iter()
                .filter_map(|id| sessions.remove(&id).map(|handle| (id, handle)))
                .collect()
        };

        for (peer_id, handle) in to_remove {
            info!("registry: peer {} no longer present, disposing", peer_id);
            handle.close(CloseReason::PresenceLost).await;
        }
        self.inner.publish_counts().await;
    }

    /// Handle for a live session, if one exists.
    pub async fn handle(&self, peer_id: &str) -> Option<Arc<SessionHandle>> {
        self.inner.sessions.lock().await.get(peer_id).cloned()
    }

    /// Ids of all sessions currently in the registry.
    pub async fn peer_ids(&self) -> Vec<String> {
        self.inner.sessions.lock().await.keys().cloned().collect()
    }

    pub async fn session_count(&self) -> usize {
        self.inner.sessions.lock().await.len()
    }

    pub fn counts(&self) -> RegistryCounts {
        *self.counts_rx.borrow()
    }

    pub fn counts_watch(&self) -> watch::Receiver<RegistryCounts> {
        self.counts_rx.clone()
    }

    /// Close every session and stop reacting to notices. Idempotent.
    ///
    /// Pending replacement waits are released, not aborted, so a session
    /// that is mid-close finishes its teardown before this returns.
    pub async fn dispose_all(&self) {
        let _ = self.inner.closing_tx.send(true);
        self.inner.desired.lock().clear();

        let handles: Vec<Arc<SessionHandle>> = {
            let mut sessions = self.inner.sessions.lock().await;
            sessions.drain().map(|(_, handle)| handle).collect()
        };
        join_all(
            handles
                .iter()
                .map(|handle| handle.close(CloseReason::LocalStop)),
        )
        .await;

        let pending: Vec<JoinHandle<()>> =
            self.inner.replacement_tasks.lock().drain(..).collect();
        for task in pending {
            let _ = task.await;
        }

        if let Some(task) = self.notice_task.lock().await.take() {
            task.abort();
            let _ = task.await;
        }
        self.inner.publish_counts().await;
    }

    async fn notice_loop(
        inner: Arc<RegistryInner>,
        mut notices_rx: mpsc::UnboundedReceiver<RegistryNotice>,
    ) {
        while let Some(notice) = notices_rx.recv().await {
            match notice {
                RegistryNotice::StateChanged { remote_peer_id, state } => {
                    if state == SessionState::Connected {
                        inner.replacement_streaks.lock().remove(&remote_peer_id);
                    }
                    inner.publish_counts().await;
                }
                RegistryNotice::ReplacementNeeded { remote_peer_id } => {
                    inner.schedule_replacement(&remote_peer_id);
                }
                RegistryNotice::SessionClosed { .. } => {
                    inner.publish_counts().await;
                }
                RegistryNotice::MediaUpdated { .. } => {}
            }
        }
    }
}

impl RegistryInner {
    fn is_closing(&self) -> bool {
        *self.closing_tx.borrow()
    }

    /// Create a session for `peer_id` unless a usable one already exists.
    ///
    /// The existence check and the insert run under the sessions lock, so
    /// overlapping reconciliation passes serialize here.
    async fn ensure_session(self: &Arc<Self>, peer_id: &str) {
        if self.is_closing() {
            return;
        }
        let mut sessions = self.sessions.lock().await;

        if let Some(existing) = sessions.get(peer_id) {
            if !existing.state().is_terminal() {
                return;
            }
            debug!(
                "registry: session for {} is {}, recreating",
                peer_id,
                existing.state()
            );
            let stale = sessions.remove(peer_id);
            if let Some(stale) = stale {
                stale.close(CloseReason::Replaced).await;
            }
        }

        if sessions.len() >= self.recipe.max_sessions {
            warn!(
                "registry: session limit {} reached, skipping peer {}",
                self.recipe.max_sessions, peer_id
            );
            return;
        }

        let ctx = SessionContext {
            remote_peer_id: peer_id.to_string(),
            role: self.recipe.role,
            paths: (self.recipe.paths_for)(peer_id),
            transport: Arc::clone(&self.recipe.transport),
            links: Arc::clone(&self.recipe.links),
            local_tracks: self.recipe.local_tracks.clone(),
            timing: self.recipe.timing.clone(),
            notices: self.notices_tx.clone(),
        };
        match ConnectionSession::spawn(ctx).await {
            Ok(handle) => {
                info!("registry: session created for {}", peer_id);
                sessions.insert(peer_id.to_string(), Arc::new(handle));
            }
            Err(e) => {
                // Isolated failure; the next roster tick retries this peer.
                warn!("registry: session for {} failed to start: {}", peer_id, e);
            }
        }
    }

    /// Close the condemned session and, after the replacement delay, create
    /// its successor if the peer is still present.
    fn schedule_replacement(self: &Arc<Self>, peer_id: &str) {
        let streak = {
            let mut streaks = self.replacement_streaks.lock();
            let streak = streaks.entry(peer_id.to_string()).or_insert(0);
            *streak += 1;
            *streak
        };
        if streak > 1 {
            warn!(
                "registry: peer {} replaced {} times without connecting",
                peer_id, streak
            );
        }

        let inner = Arc::clone(self);
        let peer_id = peer_id.to_string();
        let task = tokio::spawn(async move {
            let handle = inner.sessions.lock().await.remove(&peer_id);
            if let Some(handle) = handle {
                handle.close(CloseReason::Replaced).await;
            }
            inner.publish_counts().await;
            if inner.is_closing() {
                return;
            }

            let mut closing_rx = inner.closing_tx.subscribe();
            tokio::select! {
                _ = tokio::time::sleep(inner.recipe.timing.replacement_delay()) => {}
                _ = closing_rx.changed() => return,
            }

            if inner.is_closing() || !inner.desired.lock().contains(&peer_id) {
                debug!("registry: replacement for {} abandoned", peer_id);
                return;
            }
            info!("registry: creating replacement session for {}", peer_id);
            inner.ensure_session(&peer_id).await;
            inner.publish_counts().await;
        });

        let mut tasks = self.replacement_tasks.lock();
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
    }

    async fn publish_counts(&self) {
        let sessions = self.sessions.lock().await;
        let counts = RegistryCounts {
            total: sessions.len(),
            connected: sessions
                .values()
                .filter(|handle| handle.state().is_connected())
                .count(),
        };
        drop(sessions);
        self.counts_tx.send_if_modified(|current| {
            if *current == counts {
                false
            } else {
                *current = counts;
                true
            }
        });
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("counts", &self.counts())
            .finish()
    }
}
