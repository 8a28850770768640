//! Shared test harness: scripted media links and timing helpers.
//!
//! [`FakeLink`] stands in for a WebRTC peer connection. It records every
//! operation in call order, synthesizes SDP, and can auto-report connected
//! once a handshake completes, so full negotiation runs over an
//! [`InMemorySignaling`](proctorcast::signaling::InMemorySignaling) store
//! without sockets. Connectivity and media events can also be injected
//! directly to script disconnects and failures.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use proctorcast::config::{StreamConfig, TimingConfig};
use proctorcast::media::RemoteStream;
use proctorcast::peer::{
    LinkConnectivity, LinkDiagnostics, LinkEvent, LinkRequest, MediaLink, MediaLinkFactory,
};
use proctorcast::signaling::IceCandidateRecord;
use proctorcast::{Error, Result};

/// Timing windows shrunk to test scale.
pub fn test_timing() -> TimingConfig {
    TimingConfig {
        disconnect_grace_ms: 60,
        restart_grace_ms: 60,
        replacement_delay_ms: 25,
        media_settle_ms: 10,
    }
}

/// Default config with test timing and a fixed peer id.
pub fn test_config(peer_id: &str) -> StreamConfig {
    StreamConfig::default()
        .with_peer_id(peer_id)
        .with_timing(test_timing())
}

pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Poll `predicate` until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, predicate: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if predicate() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Scripted [`MediaLink`] that records operations in call order.
pub struct FakeLink {
    remote_peer_id: String,
    events: mpsc::UnboundedSender<LinkEvent>,
    detached: Arc<AtomicBool>,
    closed: AtomicBool,
    auto_connect: bool,
    supports_restart: bool,
    answer_delay: Duration,
    seq: AtomicU32,
    /// Chronological operation log: `create_offer`, `set_remote_offer`,
    /// `create_answer`, `set_remote_answer`, `candidate:<line>`, `close`.
    ops: Mutex<Vec<String>>,
    /// `ice_restart` flag of each offer created.
    offers: Mutex<Vec<bool>>,
}

impl FakeLink {
    fn record(&self, op: impl Into<String>) {
        self.ops.lock().push(op.into());
    }

    pub fn remote_peer_id(&self) -> &str {
        &self.remote_peer_id
    }

    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().clone()
    }

    pub fn offer_count(&self) -> usize {
        self.offers.lock().len()
    }

    /// Offers created with fresh ICE credentials requested.
    pub fn restart_count(&self) -> usize {
        self.offers.lock().iter().filter(|restart| **restart).count()
    }

    /// Remote candidates applied, in application order.
    pub fn applied_candidates(&self) -> Vec<String> {
        self.ops
            .lock()
            .iter()
            .filter_map(|op| op.strip_prefix("candidate:").map(str::to_string))
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }

    fn emit(&self, event: LinkEvent) {
        if self.detached.load(Ordering::SeqCst) {
            return;
        }
        let _ = self.events.send(event);
    }

    /// Script a connectivity report from the transport.
    pub fn emit_connectivity(&self, connectivity: LinkConnectivity) {
        self.emit(LinkEvent::Connectivity(connectivity));
    }

    /// Script a remote media attachment.
    pub fn emit_remote_media(&self, stream: RemoteStream) {
        self.emit(LinkEvent::RemoteMedia(stream));
    }

    /// Script a locally gathered candidate.
    pub fn emit_local_candidate(&self, candidate: IceCandidateRecord) {
        self.emit(LinkEvent::LocalCandidate(candidate));
    }
}

#[async_trait]
impl MediaLink for FakeLink {
    async fn create_offer(&self, ice_restart: bool) -> Result<String> {
        self.record("create_offer");
        self.offers.lock().push(ice_restart);
        let n = self.seq.fetch_add(1, Ordering::SeqCst);
        Ok(format!("offer-{}-{}", self.remote_peer_id, n))
    }

    async fn set_remote_offer(&self, sdp: &str) -> Result<()> {
        self.record("set_remote_offer");
        let _ = sdp;
        Ok(())
    }

    async fn create_answer(&self) -> Result<String> {
        if !self.answer_delay.is_zero() {
            tokio::time::sleep(self.answer_delay).await;
        }
        self.record("create_answer");
        let n = self.seq.fetch_add(1, Ordering::SeqCst);
        if self.auto_connect {
            self.emit_connectivity(LinkConnectivity::Connected);
        }
        Ok(format!("answer-{}-{}", self.remote_peer_id, n))
    }

    async fn set_remote_answer(&self, sdp: &str) -> Result<()> {
        self.record("set_remote_answer");
        let _ = sdp;
        if self.auto_connect {
            self.emit_connectivity(LinkConnectivity::Connected);
        }
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: &IceCandidateRecord) -> Result<()> {
        self.record(format!("candidate:{}", candidate.candidate));
        Ok(())
    }

    fn detach_callbacks(&self) {
        self.detached.store(true, Ordering::SeqCst);
    }

    async fn close(&self) -> Result<()> {
        self.record("close");
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn diagnostics(&self) -> LinkDiagnostics {
        LinkDiagnostics {
            ice_state: "checking".to_string(),
            gathering_state: "complete".to_string(),
        }
    }

    fn supports_ice_restart(&self) -> bool {
        self.supports_restart
    }
}

/// Factory producing [`FakeLink`]s and remembering every one it made.
pub struct FakeLinkFactory {
    auto_connect: bool,
    supports_restart: bool,
    answer_delay: Mutex<Duration>,
    fail_for: Mutex<HashSet<String>>,
    created: Mutex<Vec<Arc<FakeLink>>>,
}

impl FakeLinkFactory {
    /// Links report connected as soon as the handshake completes on their
    /// side.
    pub fn auto_connecting() -> Arc<Self> {
        Arc::new(Self::new(true, true))
    }

    /// Links never report connectivity on their own; tests script it.
    pub fn manual() -> Arc<Self> {
        Arc::new(Self::new(false, true))
    }

    /// Manual links whose transport cannot restart ICE in place.
    pub fn without_restart() -> Arc<Self> {
        Arc::new(Self::new(false, false))
    }

    fn new(auto_connect: bool, supports_restart: bool) -> Self {
        Self {
            auto_connect,
            supports_restart,
            answer_delay: Mutex::new(Duration::ZERO),
            fail_for: Mutex::new(HashSet::new()),
            created: Mutex::new(Vec::new()),
        }
    }

    /// Slow down `create_answer` on links made after this call.
    pub fn set_answer_delay(&self, delay: Duration) {
        *self.answer_delay.lock() = delay;
    }

    /// Make `create` fail for one remote peer id.
    pub fn fail_creates_for(&self, peer_id: &str) {
        self.fail_for.lock().insert(peer_id.to_string());
    }

    pub fn created(&self) -> Vec<Arc<FakeLink>> {
        self.created.lock().clone()
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().len()
    }

    pub fn last(&self) -> Arc<FakeLink> {
        self.created.lock().last().cloned().expect("no links created")
    }

    /// Links created for one remote peer, in creation order.
    pub fn links_for(&self, peer_id: &str) -> Vec<Arc<FakeLink>> {
        self.created
            .lock()
            .iter()
            .filter(|link| link.remote_peer_id == peer_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MediaLinkFactory for FakeLinkFactory {
    async fn create(&self, request: LinkRequest) -> Result<Arc<dyn MediaLink>> {
        if self.fail_for.lock().contains(&request.remote_peer_id) {
            return Err(Error::PeerConnectionError(format!(
                "scripted create failure for {}",
                request.remote_peer_id
            )));
        }
        let link = Arc::new(FakeLink {
            remote_peer_id: request.remote_peer_id,
            events: request.events,
            detached: Arc::new(AtomicBool::new(false)),
            closed: AtomicBool::new(false),
            auto_connect: self.auto_connect,
            supports_restart: self.supports_restart,
            answer_delay: *self.answer_delay.lock(),
            seq: AtomicU32::new(0),
            ops: Mutex::new(Vec::new()),
            offers: Mutex::new(Vec::new()),
        });
        self.created.lock().push(Arc::clone(&link));
        Ok(link)
    }
}
