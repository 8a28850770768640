//! Transport link abstraction over a single peer-to-peer connection.
//!
//! Session logic never touches the WebRTC stack directly. It drives a
//! [`MediaLink`], and the link pushes connectivity, candidate, and media
//! events back through a channel. Production links wrap an
//! `RTCPeerConnection`; tests substitute scripted fakes.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::media::{LocalTracks, RemoteStream};
use crate::signaling::IceCandidateRecord;
use crate::Result;

/// Connectivity of the underlying transport, as reported by its callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkConnectivity {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl LinkConnectivity {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkConnectivity::New => "new",
            LinkConnectivity::Connecting => "connecting",
            LinkConnectivity::Connected => "connected",
            LinkConnectivity::Disconnected => "disconnected",
            LinkConnectivity::Failed => "failed",
            LinkConnectivity::Closed => "closed",
        }
    }
}

impl std::fmt::Display for LinkConnectivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events a link pushes to whoever drives it.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// Transport connectivity changed.
    Connectivity(LinkConnectivity),
    /// A local ICE candidate surfaced and is ready to signal.
    LocalCandidate(IceCandidateRecord),
    /// Remote media attached, changed, or went away.
    RemoteMedia(RemoteStream),
}

/// Point-in-time transport detail for diagnostics surfaces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkDiagnostics {
    /// ICE connection state as reported by the transport.
    pub ice_state: String,
    /// ICE gathering state as reported by the transport.
    pub gathering_state: String,
}

/// Everything needed to build one link to one remote peer.
pub struct LinkRequest {
    /// Remote peer the link targets.
    pub remote_peer_id: String,
    /// Outgoing media to attach before negotiation begins.
    pub local_tracks: LocalTracks,
    /// Sink for the link's events.
    pub events: mpsc::UnboundedSender<LinkEvent>,
}

/// One negotiated transport to one remote peer.
///
/// A link is single-use. Once it fails it is replaced with a fresh link
/// rather than repaired in place; the only in-place recovery is a single
/// ICE restart requested through `create_offer(true)`.
#[async_trait]
pub trait MediaLink: Send + Sync {
    /// Create an offer, apply it as the local description, and return its
    /// SDP. `ice_restart` requests fresh ICE credentials.
    async fn create_offer(&self, ice_restart: bool) -> Result<String>;

    /// Apply a remote offer as the remote description.
    async fn set_remote_offer(&self, sdp: &str) -> Result<()>;

    /// Answer a previously applied remote offer. Applies the answer as the
    /// local description and returns its SDP.
    async fn create_answer(&self) -> Result<String>;

    /// Apply a remote answer to a previously created local offer.
    async fn set_remote_answer(&self, sdp: &str) -> Result<()>;

    /// Feed one remote ICE candidate to the transport.
    async fn add_remote_candidate(&self, candidate: &IceCandidateRecord) -> Result<()>;

    /// Stop event delivery. No events are sent after this returns, so
    /// teardown cannot race a late callback.
    fn detach_callbacks(&self);

    /// Close the transport and release its media.
    async fn close(&self) -> Result<()>;

    /// Sample transport-level detail.
    fn diagnostics(&self) -> LinkDiagnostics;

    /// Whether the transport can restart ICE in place. Links that cannot
    /// are recovered by replacement directly.
    fn supports_ice_restart(&self) -> bool {
        true
    }
}

/// Builds links on demand, one per remote peer connection attempt.
#[async_trait]
pub trait MediaLinkFactory: Send + Sync {
    async fn create(&self, request: LinkRequest) -> Result<Arc<dyn MediaLink>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connectivity_display_names() {
        assert_eq!(LinkConnectivity::Connected.to_string(), "connected");
        assert_eq!(LinkConnectivity::Disconnected.to_string(), "disconnected");
        assert_eq!(LinkConnectivity::Failed.to_string(), "failed");
    }

    #[test]
    fn link_events_carry_payloads() {
        let candidate = IceCandidateRecord {
            candidate: "candidate:1 1 udp 2130706431 192.0.2.1 54400 typ host".to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_m_line_index: Some(0),
            written_at: 0,
        };
        let event = LinkEvent::LocalCandidate(candidate.clone());
        match event {
            LinkEvent::LocalCandidate(c) => assert_eq!(c.candidate, candidate.candidate),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
