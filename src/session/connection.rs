//! Per-peer connection session.
//!
//! One session owns one media link, its candidate buffer, its signaling
//! subscriptions, and its grace timers. Every stimulus (subscription event,
//! link event, timer expiry, close request) is processed serially by the
//! session task, so no two transitions for the same session run
//! concurrently. Recovery is by replacement: after the one permitted ICE
//! restart, a session that cannot reach the peer asks its registry for a
//! successor and waits to be disposed.

use std::collections::HashMap;
use std::time::Duration;

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::TimingConfig;
use crate::media::{LocalTracks, RemoteStream};
use crate::peer::link::{LinkConnectivity, LinkEvent, LinkRequest, MediaLink, MediaLinkFactory};
use crate::session::ice_buffer::IceCandidateBuffer;
use crate::session::state::{CloseReason, RegistryNotice, SessionDiagnostics, SessionState};
use crate::signaling::{
    IceCandidateRecord, NegotiationMessage, NegotiationPaths, NegotiationRole, PathEvent,
    SdpKind, SignalingTransport, Subscription,
};
use crate::Result;

/// Grace windows a session can have armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum GraceKind {
    /// Disconnect self-heal window.
    Disconnect,
    /// Restart window after a connectivity failure.
    RestartWindow,
    /// Settle delay before surfacing remote media.
    MediaSettle,
}

/// Cancellable one-shot timers owned by a session.
///
/// Each armed timer is a sleeping task that reports `(kind, epoch)` back to
/// the session queue. Cancelling bumps the recorded epoch, so a fire that
/// was already queued when its timer was cancelled is discarded on receipt.
struct GraceTimers {
    tx: mpsc::UnboundedSender<(GraceKind, u64)>,
    epochs: HashMap<GraceKind, u64>,
    handles: HashMap<GraceKind, JoinHandle<()>>,
    next_epoch: u64,
}

impl GraceTimers {
    fn new(tx: mpsc::UnboundedSender<(GraceKind, u64)>) -> Self {
        Self {
            tx,
            epochs: HashMap::new(),
            handles: HashMap::new(),
            next_epoch: 0,
        }
    }

    /// Arm `kind` to fire after `delay`, replacing any earlier arming.
    fn arm(&mut self, kind: GraceKind, delay: Duration) {
        self.cancel(kind);
        self.next_epoch += 1;
        let epoch = self.next_epoch;
        self.epochs.insert(kind, epoch);

        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send((kind, epoch));
        });
        self.handles.insert(kind, handle);
    }

    fn cancel(&mut self, kind: GraceKind) {
        self.epochs.remove(&kind);
        if let Some(handle) = self.handles.remove(&kind) {
            handle.abort();
        }
    }

    fn cancel_all(&mut self) {
        self.epochs.clear();
        for (_, handle) in self.handles.drain() {
            handle.abort();
        }
    }

    fn armed(&self, kind: GraceKind) -> bool {
        self.epochs.contains_key(&kind)
    }

    /// True if a received fire matches the current arming.
    fn is_live(&self, kind: GraceKind, epoch: u64) -> bool {
        self.epochs.get(&kind) == Some(&epoch)
    }

    /// Drop bookkeeping for a timer that has fired.
    fn acknowledge(&mut self, kind: GraceKind) {
        self.epochs.remove(&kind);
        self.handles.remove(&kind);
    }
}

/// Messages accepted on a session's input queue.
#[derive(Debug)]
pub enum SessionInput {
    Close(CloseReason),
}

/// Everything a session needs at spawn time.
pub struct SessionContext {
    pub remote_peer_id: String,
    pub role: NegotiationRole,
    pub paths: NegotiationPaths,
    pub transport: Arc<dyn SignalingTransport>,
    pub links: Arc<dyn MediaLinkFactory>,
    pub local_tracks: LocalTracks,
    pub timing: TimingConfig,
    pub notices: mpsc::UnboundedSender<RegistryNotice>,
}

/// Owning handle to a running session task.
pub struct SessionHandle {
    remote_peer_id: String,
    input: mpsc::UnboundedSender<SessionInput>,
    state_rx: watch::Receiver<SessionState>,
    media_rx: watch::Receiver<Option<RemoteStream>>,
    diagnostics_rx: watch::Receiver<SessionDiagnostics>,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SessionHandle {
    pub fn remote_peer_id(&self) -> &str {
        &self.remote_peer_id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    pub fn state_watch(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Gated remote media. `None` until the settle delay has passed, and
    /// again after teardown.
    pub fn media_watch(&self) -> watch::Receiver<Option<RemoteStream>> {
        self.media_rx.clone()
    }

    pub fn diagnostics(&self) -> SessionDiagnostics {
        self.diagnostics_rx.borrow().clone()
    }

    pub fn diagnostics_watch(&self) -> watch::Receiver<SessionDiagnostics> {
        self.diagnostics_rx.clone()
    }

    /// Tear the session down and wait for teardown to finish. Idempotent;
    /// concurrent callers after the first return once teardown completes.
    pub async fn close(&self, reason: CloseReason) {
        let _ = self.input.send(SessionInput::Close(reason));
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("remote_peer_id", &self.remote_peer_id)
            .field("state", &self.state())
            .finish()
    }
}

/// Spawns session tasks. See [`SessionContext`] for the inputs.
pub struct ConnectionSession;

impl ConnectionSession {
    /// Build the link, subscribe to the remote side's paths, and start the
    /// session task. The initiator writes its offer from inside the task,
    /// after subscriptions are in place, so a fast answer cannot be missed.
    pub async fn spawn(ctx: SessionContext) -> Result<SessionHandle> {
        let (link_tx, link_rx) = mpsc::unbounded_channel();
        let link = ctx
            .links
            .create(LinkRequest {
                remote_peer_id: ctx.remote_peer_id.clone(),
                local_tracks: ctx.local_tracks.clone(),
                events: link_tx,
            })
            .await?;

        // Subscribe before any write; the snapshot covers values that
        // already exist.
        let remote_description_path = match ctx.role {
            NegotiationRole::Initiator => ctx.paths.answer.clone(),
            NegotiationRole::Responder => ctx.paths.offer.clone(),
        };
        let description_sub = ctx.transport.subscribe(&remote_description_path).await?;
        let candidate_sub = ctx.transport.subscribe(&ctx.paths.ice_remote).await?;

        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::New);
        let (media_tx, media_rx) = watch::channel(None);
        let (diagnostics_tx, diagnostics_rx) = watch::channel(SessionDiagnostics::default());

        let worker = SessionWorker {
            remote_peer_id: ctx.remote_peer_id.clone(),
            role: ctx.role,
            paths: ctx.paths,
            transport: ctx.transport,
            link,
            local_tracks: Some(ctx.local_tracks),
            timing: ctx.timing,
            notices: ctx.notices,
            state: SessionState::New,
            state_tx,
            media_tx,
            diagnostics_tx,
            timers: GraceTimers::new(timer_tx),
            buffer: IceCandidateBuffer::new(),
            remote_description_set: false,
            signaling_stable: true,
            restart_attempted: false,
            candidates_sent: 0,
            candidates_received: 0,
            surfaced_stream_id: None,
            pending_stream: None,
        };

        let task = tokio::spawn(worker.run(input_rx, link_rx, timer_rx, description_sub, candidate_sub));

        Ok(SessionHandle {
            remote_peer_id: ctx.remote_peer_id,
            input: input_tx,
            state_rx,
            media_rx,
            diagnostics_rx,
            task: tokio::sync::Mutex::new(Some(task)),
        })
    }
}

struct SessionWorker {
    remote_peer_id: String,
    role: NegotiationRole,
    paths: NegotiationPaths,
    transport: Arc<dyn SignalingTransport>,
    link: Arc<dyn MediaLink>,
    /// Held so the shared capture outlives the link; released on teardown.
    local_tracks: Option<LocalTracks>,
    timing: TimingConfig,
    notices: mpsc::UnboundedSender<RegistryNotice>,

    state: SessionState,
    state_tx: watch::Sender<SessionState>,
    media_tx: watch::Sender<Option<RemoteStream>>,
    diagnostics_tx: watch::Sender<SessionDiagnostics>,

    timers: GraceTimers,
    buffer: IceCandidateBuffer,
    /// Remote description applied; candidates go straight to the link.
    remote_description_set: bool,
    /// Signaling-stable gate. False while our own offer is unanswered or a
    /// received offer is mid-processing; offers arriving then are stale
    /// replays and are ignored.
    signaling_stable: bool,
    /// One ICE restart per session, ever.
    restart_attempted: bool,

    candidates_sent: u64,
    candidates_received: u64,

    /// Stream identity already surfaced to the media watch.
    surfaced_stream_id: Option<String>,
    /// Stream waiting out the settle delay.
    pending_stream: Option<RemoteStream>,
}

impl SessionWorker {
    async fn run(
        mut self,
        mut input_rx: mpsc::UnboundedReceiver<SessionInput>,
        mut link_rx: mpsc::UnboundedReceiver<LinkEvent>,
        mut timer_rx: mpsc::UnboundedReceiver<(GraceKind, u64)>,
        mut description_sub: Subscription,
        mut candidate_sub: Subscription,
    ) {
        info!(
            "session {}: starting as {:?}",
            self.remote_peer_id, self.role
        );
        self.set_state(SessionState::Negotiating);

        if self.role == NegotiationRole::Initiator {
            if let Err(e) = self.send_offer(false).await {
                warn!(
                    "session {}: initial offer failed: {}",
                    self.remote_peer_id, e
                );
                self.enter_recovering();
            }
        }

        loop {
            tokio::select! {
                biased;

                input = input_rx.recv() => {
                    let reason = match input {
                        Some(SessionInput::Close(reason)) => reason,
                        // Handle dropped without an explicit close.
                        None => CloseReason::LocalStop,
                    };
                    self.teardown(reason, description_sub, candidate_sub).await;
                    return;
                }

                Some((kind, epoch)) = timer_rx.recv() => {
                    self.handle_timer(kind, epoch).await;
                }

                Some(event) = link_rx.recv() => {
                    self.handle_link_event(event).await;
                }

                Some(event) = description_sub.next() => {
                    self.handle_description_event(event).await;
                }

                Some(event) = candidate_sub.next() => {
                    self.handle_candidate_event(event).await;
                }
            }
        }
    }

    fn set_state(&mut self, next: SessionState) {
        if self.state == next {
            return;
        }
        debug!("session {}: {} -> {}", self.remote_peer_id, self.state, next);
        self.state = next;
        let _ = self.state_tx.send(next);
        let _ = self.notices.send(RegistryNotice::StateChanged {
            remote_peer_id: self.remote_peer_id.clone(),
            state: next,
        });
    }

    /// Request a replacement session and go passive until disposed.
    fn enter_recovering(&mut self) {
        if self.state == SessionState::Recovering {
            return;
        }
        self.set_state(SessionState::Recovering);
        let _ = self.notices.send(RegistryNotice::ReplacementNeeded {
            remote_peer_id: self.remote_peer_id.clone(),
        });
    }

    /// Create an offer on the link and write it. Used for the initial offer
    /// and, with `ice_restart`, for the one permitted restart.
    async fn send_offer(&mut self, ice_restart: bool) -> Result<()> {
        let sdp = self.link.create_offer(ice_restart).await?;
        self.signaling_stable = false;
        let message = NegotiationMessage::offer(sdp);
        self.transport
            .write(&self.paths.offer, message.to_value()?)
            .await?;
        debug!(
            "session {}: offer written (restart: {})",
            self.remote_peer_id, ice_restart
        );
        Ok(())
    }

    async fn handle_description_event(&mut self, event: PathEvent) {
        let value = match event.change.value() {
            Some(value) => value.clone(),
            // Removal of the peer's messages is lifecycle noise here;
            // presence decides disposal.
            None => return,
        };
        let message = match NegotiationMessage::from_value(&value) {
            Ok(message) => message,
            Err(e) => {
                warn!(
                    "session {}: unparseable negotiation message ignored: {}",
                    self.remote_peer_id, e
                );
                return;
            }
        };

        match (self.role, message.kind) {
            (NegotiationRole::Responder, SdpKind::Offer) => self.handle_remote_offer(message).await,
            (NegotiationRole::Initiator, SdpKind::Answer) => {
                self.handle_remote_answer(message).await
            }
            (role, kind) => {
                warn!(
                    "session {}: unexpected {:?} for {:?} side ignored",
                    self.remote_peer_id, kind, role
                );
            }
        }
    }

    /// Responder path: apply the offer, flush buffered candidates, answer.
    /// Initial offers and ICE-restart renegotiations take the same route.
    async fn handle_remote_offer(&mut self, message: NegotiationMessage) {
        if self.state == SessionState::Recovering {
            return;
        }
        if !self.signaling_stable {
            warn!(
                "session {}: offer ignored while negotiation in flight",
                self.remote_peer_id
            );
            return;
        }

        self.signaling_stable = false;
        if let Err(e) = self.link.set_remote_offer(&message.sdp).await {
            // Unusable SDP is dropped, never fatal to the session.
            warn!(
                "session {}: ignoring unusable offer: {}",
                self.remote_peer_id, e
            );
            self.signaling_stable = true;
            return;
        }
        self.remote_description_set = true;
        self.flush_candidate_buffer().await;

        let sdp = match self.link.create_answer().await {
            Ok(sdp) => sdp,
            Err(e) => {
                warn!("session {}: answer failed: {}", self.remote_peer_id, e);
                self.enter_recovering();
                return;
            }
        };
        let answer = NegotiationMessage::answer(sdp);
        let value = match answer.to_value() {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    "session {}: answer serialization failed: {}",
                    self.remote_peer_id, e
                );
                self.enter_recovering();
                return;
            }
        };
        // Answer is a critical write; failure aborts this attempt and the
        // registry retries via replacement.
        if let Err(e) = self.transport.write(&self.paths.answer, value).await {
            warn!(
                "session {}: answer write failed: {}",
                self.remote_peer_id, e
            );
            self.enter_recovering();
            return;
        }
        self.signaling_stable = true;
        debug!("session {}: answered offer", self.remote_peer_id);
    }

    async fn handle_remote_answer(&mut self, message: NegotiationMessage) {
        if self.state == SessionState::Recovering {
            return;
        }
        if self.signaling_stable {
            // No offer of ours is outstanding.
            debug!("session {}: stale answer ignored", self.remote_peer_id);
            return;
        }
        if let Err(e) = self.link.set_remote_answer(&message.sdp).await {
            warn!(
                "session {}: ignoring unusable answer: {}",
                self.remote_peer_id, e
            );
            return;
        }
        self.signaling_stable = true;
        self.remote_description_set = true;
        self.flush_candidate_buffer().await;
        debug!("session {}: answer applied", self.remote_peer_id);
    }

    async fn handle_candidate_event(&mut self, event: PathEvent) {
        // Candidate lists are append-only; only additions carry candidates.
        let value = match event.change.value() {
            Some(value) => value.clone(),
            None => return,
        };
        let candidate = match IceCandidateRecord::from_value(&value) {
            Ok(candidate) => candidate,
            Err(e) => {
                warn!(
                    "session {}: malformed candidate ignored: {}",
                    self.remote_peer_id, e
                );
                return;
            }
        };

        self.candidates_received += 1;
        if self.remote_description_set {
            if let Err(e) = self.link.add_remote_candidate(&candidate).await {
                warn!(
                    "session {}: candidate rejected: {}",
                    self.remote_peer_id, e
                );
            }
        } else {
            self.buffer.push(candidate);
            debug!(
                "session {}: candidate buffered ({} waiting)",
                self.remote_peer_id,
                self.buffer.len()
            );
        }
        self.publish_diagnostics();
    }

    async fn flush_candidate_buffer(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        debug!(
            "session {}: flushing {} buffered candidates",
            self.remote_peer_id,
            self.buffer.len()
        );
        for candidate in self.buffer.drain() {
            if let Err(e) = self.link.add_remote_candidate(&candidate).await {
                warn!(
                    "session {}: buffered candidate rejected: {}",
                    self.remote_peer_id, e
                );
            }
        }
    }

    async fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Connectivity(connectivity) => {
                self.handle_connectivity(connectivity).await;
            }
            LinkEvent::LocalCandidate(candidate) => {
                self.publish_local_candidate(candidate).await;
            }
            LinkEvent::RemoteMedia(stream) => self.handle_remote_media(stream),
        }
    }

    async fn publish_local_candidate(&mut self, candidate: IceCandidateRecord) {
        let value = match candidate.to_value() {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    "session {}: candidate serialization failed: {}",
                    self.remote_peer_id, e
                );
                return;
            }
        };
        // Candidate writes are non-critical; a lost one degrades the pool.
        match self.transport.push(&self.paths.ice_local, value).await {
            Ok(_) => {
                self.candidates_sent += 1;
                self.publish_diagnostics();
            }
            Err(e) => {
                warn!(
                    "session {}: candidate push failed: {}",
                    self.remote_peer_id, e
                );
            }
        }
    }

    async fn handle_connectivity(&mut self, connectivity: LinkConnectivity) {
        if self.state == SessionState::Recovering {
            // Already condemned; the replacement takes over from here.
            debug!(
                "session {}: late connectivity {} ignored",
                self.remote_peer_id, connectivity
            );
            return;
        }

        match connectivity {
            LinkConnectivity::Connected => {
                self.timers.cancel(GraceKind::Disconnect);
                self.timers.cancel(GraceKind::RestartWindow);
                self.set_state(SessionState::Connected);
                info!("session {}: connected", self.remote_peer_id);
            }
            LinkConnectivity::Disconnected => {
                self.set_state(SessionState::Disconnected);
                self.timers
                    .arm(GraceKind::Disconnect, self.timing.disconnect_grace());
                info!(
                    "session {}: disconnected, self-heal window {}ms",
                    self.remote_peer_id, self.timing.disconnect_grace_ms
                );
            }
            LinkConnectivity::Failed => self.handle_failure().await,
            LinkConnectivity::New | LinkConnectivity::Connecting => {}
            LinkConnectivity::Closed => {
                // Own closes never reach here (callbacks detach first).
                debug!(
                    "session {}: link reported closed",
                    self.remote_peer_id
                );
            }
        }
        self.publish_diagnostics();
    }

    /// Failure policy: the initiator gets one ICE restart per session; the
    /// responder, and any repeat failure, waits the restart window out so a
    /// peer-side restart can land. Expiry requests replacement.
    async fn handle_failure(&mut self) {
        if self.timers.armed(GraceKind::RestartWindow) {
            debug!(
                "session {}: repeat failure inside restart window",
                self.remote_peer_id
            );
            return;
        }
        self.timers.cancel(GraceKind::Disconnect);
        self.set_state(SessionState::Failed);

        let can_restart = self.role == NegotiationRole::Initiator
            && !self.restart_attempted
            && self.link.supports_ice_restart();

        if can_restart {
            self.restart_attempted = true;
            info!(
                "session {}: connectivity failed, attempting ice restart",
                self.remote_peer_id
            );
            if let Err(e) = self.send_offer(true).await {
                warn!(
                    "session {}: ice restart offer failed: {}",
                    self.remote_peer_id, e
                );
                self.enter_recovering();
                return;
            }
        } else {
            info!(
                "session {}: connectivity failed, waiting out restart window",
                self.remote_peer_id
            );
        }

        self.set_state(SessionState::Restarting);
        self.timers
            .arm(GraceKind::RestartWindow, self.timing.restart_grace());
    }

    /// Gate remote media behind the settle delay, keyed by stream identity.
    /// Track changes within an already-surfaced stream never re-surface it,
    /// so downstream sink state (gain, mute) survives renegotiation.
    fn handle_remote_media(&mut self, stream: RemoteStream) {
        if stream.is_empty() {
            return;
        }
        if self.surfaced_stream_id.as_deref() == Some(stream.stream_id.as_str()) {
            debug!(
                "session {}: track update within surfaced stream",
                self.remote_peer_id
            );
            return;
        }
        self.pending_stream = Some(stream);
        self.timers
            .arm(GraceKind::MediaSettle, self.timing.media_settle());
    }

    fn surface_pending_media(&mut self) {
        if let Some(stream) = self.pending_stream.take() {
            debug!(
                "session {}: media surfaced (stream {})",
                self.remote_peer_id, stream.stream_id
            );
            self.surfaced_stream_id = Some(stream.stream_id.clone());
            let _ = self.media_tx.send(Some(stream));
            let _ = self.notices.send(RegistryNotice::MediaUpdated {
                remote_peer_id: self.remote_peer_id.clone(),
            });
        }
    }

    async fn handle_timer(&mut self, kind: GraceKind, epoch: u64) {
        if !self.timers.is_live(kind, epoch) {
            // Cancelled after the fire was queued.
            return;
        }
        self.timers.acknowledge(kind);

        match kind {
            GraceKind::Disconnect => {
                if self.state != SessionState::Disconnected {
                    return;
                }
                info!(
                    "session {}: disconnect grace expired",
                    self.remote_peer_id
                );
                self.enter_recovering();
            }
            GraceKind::RestartWindow => {
                if self.state != SessionState::Restarting {
                    return;
                }
                info!(
                    "session {}: restart window expired",
                    self.remote_peer_id
                );
                self.enter_recovering();
            }
            GraceKind::MediaSettle => self.surface_pending_media(),
        }
    }

    fn publish_diagnostics(&self) {
        let link = self.link.diagnostics();
        let _ = self.diagnostics_tx.send(SessionDiagnostics {
            ice_state: link.ice_state,
            gathering_state: link.gathering_state,
            candidates_sent: self.candidates_sent,
            candidates_received: self.candidates_received,
        });
    }

    /// Ordered teardown: timers, link callbacks, link, subscriptions, track
    /// references, own signaling paths. Failures past the link close are
    /// logged and skipped so cleanup always runs to the end.
    async fn teardown(
        mut self,
        reason: CloseReason,
        mut description_sub: Subscription,
        mut candidate_sub: Subscription,
    ) {
        info!("session {}: closing ({})", self.remote_peer_id, reason);

        self.timers.cancel_all();

        self.link.detach_callbacks();
        if let Err(e) = self.link.close().await {
            debug!("session {}: link close: {}", self.remote_peer_id, e);
        }

        description_sub.unsubscribe();
        candidate_sub.unsubscribe();

        // Shared capture is release-only here; the owner stops it.
        self.local_tracks.take();

        for path in &self.paths.owned {
            if let Err(e) = self.transport.remove(path).await {
                debug!(
                    "session {}: cleanup of {} failed: {}",
                    self.remote_peer_id, path, e
                );
            }
        }

        let _ = self.media_tx.send(None);
        self.set_state(SessionState::Closed);
        let _ = self.notices.send(RegistryNotice::SessionClosed {
            remote_peer_id: self.remote_peer_id.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn armed_timer_fires_with_live_epoch() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = GraceTimers::new(tx);
        timers.arm(GraceKind::Disconnect, Duration::from_millis(10));

        let (kind, epoch) = rx.recv().await.unwrap();
        assert_eq!(kind, GraceKind::Disconnect);
        assert!(timers.is_live(kind, epoch));
        timers.acknowledge(kind);
        assert!(!timers.armed(kind));
    }

    #[tokio::test]
    async fn cancelled_timer_fire_is_not_live() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = GraceTimers::new(tx.clone());
        timers.arm(GraceKind::RestartWindow, Duration::from_millis(5));

        // Simulate a fire already queued when the cancel lands.
        let _ = tx.send((GraceKind::RestartWindow, 1));
        timers.cancel(GraceKind::RestartWindow);

        let (kind, epoch) = rx.recv().await.unwrap();
        assert!(!timers.is_live(kind, epoch));
    }

    #[tokio::test]
    async fn rearming_replaces_the_epoch() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = GraceTimers::new(tx);
        timers.arm(GraceKind::MediaSettle, Duration::from_secs(30));
        timers.arm(GraceKind::MediaSettle, Duration::from_millis(5));

        // Only the second arming may fire; the first was aborted.
        let (kind, epoch) = tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(kind, GraceKind::MediaSettle);
        assert!(timers.is_live(kind, epoch));
    }

    #[tokio::test]
    async fn cancel_all_silences_every_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = GraceTimers::new(tx);
        timers.arm(GraceKind::Disconnect, Duration::from_millis(5));
        timers.arm(GraceKind::RestartWindow, Duration::from_millis(5));
        timers.arm(GraceKind::MediaSettle, Duration::from_millis(5));
        timers.cancel_all();

        tokio::time::sleep(Duration::from_millis(30)).await;
        while let Ok((kind, epoch)) = rx.try_recv() {
            assert!(!timers.is_live(kind, epoch));
        }
    }
}
