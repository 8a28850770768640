//! WebRTC-backed [`MediaLink`] implementation.
//!
//! Wraps an `RTCPeerConnection` from the `webrtc` crate. Transport callbacks
//! are translated into [`LinkEvent`]s behind a detach gate, so a link that
//! is being torn down stops reporting before the connection is closed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::offer_answer_options::RTCOfferOptions;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_remote::TrackRemote;

use crate::config::StreamConfig;
use crate::media::{MediaKind, RemoteStream, RemoteTrackInfo};
use crate::peer::link::{
    LinkConnectivity, LinkDiagnostics, LinkEvent, LinkRequest, MediaLink, MediaLinkFactory,
};
use crate::signaling::IceCandidateRecord;
use crate::{Error, Result};

/// Production link over a single `RTCPeerConnection`.
pub struct WebRtcLink {
    remote_peer_id: String,
    peer_connection: Arc<RTCPeerConnection>,
    /// Once set, registered callbacks drop their events instead of sending.
    detached: Arc<AtomicBool>,
}

impl WebRtcLink {
    fn register_callbacks(
        &self,
        events: tokio::sync::mpsc::UnboundedSender<LinkEvent>,
    ) {
        let pc = &self.peer_connection;

        // Connectivity changes.
        let tx = events.clone();
        let gate = Arc::clone(&self.detached);
        let peer_id = self.remote_peer_id.clone();
        pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
            let tx = tx.clone();
            let gate = Arc::clone(&gate);
            let peer_id = peer_id.clone();

            Box::pin(async move {
                if gate.load(Ordering::SeqCst) {
                    return;
                }
                let connectivity = match s {
                    RTCPeerConnectionState::New => LinkConnectivity::New,
                    RTCPeerConnectionState::Connecting => LinkConnectivity::Connecting,
                    RTCPeerConnectionState::Connected => LinkConnectivity::Connected,
                    RTCPeerConnectionState::Disconnected => LinkConnectivity::Disconnected,
                    RTCPeerConnectionState::Failed => LinkConnectivity::Failed,
                    RTCPeerConnectionState::Closed => LinkConnectivity::Closed,
                    _ => return,
                };
                debug!("link to {}: connectivity {}", peer_id, connectivity);
                let _ = tx.send(LinkEvent::Connectivity(connectivity));
            })
        }));

        // Trickle ICE. `None` marks end of gathering and is not signaled.
        let tx = events.clone();
        let gate = Arc::clone(&self.detached);
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let tx = tx.clone();
            let gate = Arc::clone(&gate);

            Box::pin(async move {
                if gate.load(Ordering::SeqCst) {
                    return;
                }
                if let Some(candidate) = candidate {
                    match candidate.to_json() {
                        Ok(json) => {
                            let record = IceCandidateRecord::new(
                                json.candidate,
                                json.sdp_mid,
                                json.sdp_mline_index,
                            );
                            let _ = tx.send(LinkEvent::LocalCandidate(record));
                        }
                        Err(e) => warn!("failed to serialize local candidate: {}", e),
                    }
                }
            })
        }));

        // Remote media. Tracks accumulate into one stream snapshot since a
        // sender's audio and video arrive as separate on_track firings.
        let tx = events;
        let gate = Arc::clone(&self.detached);
        let peer_id = self.remote_peer_id.clone();
        let accumulated: Arc<Mutex<RemoteStream>> = Arc::new(Mutex::new(RemoteStream::default()));
        pc.on_track(Box::new(move |track: Arc<TrackRemote>, _receiver, _transceiver| {
            let tx = tx.clone();
            let gate = Arc::clone(&gate);
            let peer_id = peer_id.clone();
            let accumulated = Arc::clone(&accumulated);

            Box::pin(async move {
                if gate.load(Ordering::SeqCst) {
                    return;
                }
                let kind = match track.kind() {
                    RTPCodecType::Audio => MediaKind::Audio,
                    RTPCodecType::Video => MediaKind::Video,
                    _ => return,
                };
                debug!("link to {}: remote {} track attached", peer_id, kind);

                let snapshot = {
                    let mut stream = accumulated.lock();
                    if stream.stream_id.is_empty() {
                        stream.stream_id = track.stream_id();
                    }
                    let id = track.id();
                    if !stream.tracks.iter().any(|t| t.id == id) {
                        stream.tracks.push(RemoteTrackInfo { id, kind });
                    }
                    stream.clone()
                };
                let _ = tx.send(LinkEvent::RemoteMedia(snapshot));
            })
        }));
    }
}

#[async_trait]
impl MediaLink for WebRtcLink {
    async fn create_offer(&self, ice_restart: bool) -> Result<String> {
        let options = if ice_restart {
            Some(RTCOfferOptions {
                ice_restart: true,
                ..Default::default()
            })
        } else {
            None
        };

        let offer = self
            .peer_connection
            .create_offer(options)
            .await
            .map_err(|e| Error::SdpError(format!("failed to create offer: {}", e)))?;

        self.peer_connection
            .set_local_description(offer)
            .await
            .map_err(|e| Error::SdpError(format!("failed to set local offer: {}", e)))?;

        let local = self
            .peer_connection
            .local_description()
            .await
            .ok_or_else(|| Error::SdpError("no local description after offer".to_string()))?;

        Ok(local.sdp)
    }

    async fn set_remote_offer(&self, sdp: &str) -> Result<()> {
        let offer = RTCSessionDescription::offer(sdp.to_string())
            .map_err(|e| Error::SdpError(format!("failed to parse offer: {}", e)))?;

        self.peer_connection
            .set_remote_description(offer)
            .await
            .map_err(|e| Error::SdpError(format!("failed to set remote offer: {}", e)))
    }

    async fn create_answer(&self) -> Result<String> {
        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .map_err(|e| Error::SdpError(format!("failed to create answer: {}", e)))?;

        self.peer_connection
            .set_local_description(answer)
            .await
            .map_err(|e| Error::SdpError(format!("failed to set local answer: {}", e)))?;

        let local = self
            .peer_connection
            .local_description()
            .await
            .ok_or_else(|| Error::SdpError("no local description after answer".to_string()))?;

        Ok(local.sdp)
    }

    async fn set_remote_answer(&self, sdp: &str) -> Result<()> {
        let answer = RTCSessionDescription::answer(sdp.to_string())
            .map_err(|e| Error::SdpError(format!("failed to parse answer: {}", e)))?;

        self.peer_connection
            .set_remote_description(answer)
            .await
            .map_err(|e| Error::SdpError(format!("failed to set remote answer: {}", e)))
    }

    async fn add_remote_candidate(&self, candidate: &IceCandidateRecord) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate.clone(),
            sdp_mid: candidate.sdp_mid.clone(),
            sdp_mline_index: candidate.sdp_m_line_index,
            username_fragment: None,
        };

        self.peer_connection
            .add_ice_candidate(init)
            .await
            .map_err(|e| Error::IceCandidateError(format!("failed to add remote candidate: {}", e)))
    }

    fn detach_callbacks(&self) {
        self.detached.store(true, Ordering::SeqCst);
    }

    async fn close(&self) -> Result<()> {
        debug!("closing link to {}", self.remote_peer_id);
        self.peer_connection
            .close()
            .await
            .map_err(|e| Error::PeerConnectionError(format!("failed to close connection: {}", e)))
    }

    fn diagnostics(&self) -> LinkDiagnostics {
        LinkDiagnostics {
            ice_state: self.peer_connection.ice_connection_state().to_string(),
            gathering_state: self.peer_connection.ice_gathering_state().to_string(),
        }
    }
}

/// Builds [`WebRtcLink`]s configured from a [`StreamConfig`].
pub struct WebRtcLinkFactory {
    config: StreamConfig,
}

impl WebRtcLinkFactory {
    pub fn new(config: StreamConfig) -> Self {
        Self { config }
    }

    fn ice_servers(&self) -> Vec<RTCIceServer> {
        self.config
            .stun_servers
            .iter()
            .map(|url| RTCIceServer {
                urls: vec![url.clone()],
                ..Default::default()
            })
            .chain(self.config.turn_servers.iter().map(|turn| {
                #[allow(clippy::needless_update)]
                RTCIceServer {
                    urls: vec![turn.url.clone()],
                    username: turn.username.clone(),
                    credential: turn.credential.clone(),
                    ..Default::default()
                }
            }))
            .collect()
    }
}

#[async_trait]
impl MediaLinkFactory for WebRtcLinkFactory {
    async fn create(&self, request: LinkRequest) -> Result<Arc<dyn MediaLink>> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::PeerConnectionError(format!("failed to register codecs: {}", e)))?;

        let interceptor_registry =
            register_default_interceptors(Default::default(), &mut media_engine).map_err(|e| {
                Error::PeerConnectionError(format!("failed to register interceptors: {}", e))
            })?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: self.ice_servers(),
            ..Default::default()
        };

        let peer_connection = Arc::new(api.new_peer_connection(rtc_config).await.map_err(|e| {
            Error::PeerConnectionError(format!("failed to create peer connection: {}", e))
        })?);

        for track in request.local_tracks.as_track_locals() {
            peer_connection
                .add_track(track)
                .await
                .map_err(|e| Error::MediaTrackError(format!("failed to add local track: {}", e)))?;
        }

        let link = WebRtcLink {
            remote_peer_id: request.remote_peer_id,
            peer_connection,
            detached: Arc::new(AtomicBool::new(false)),
        };
        link.register_callbacks(request.events);

        Ok(Arc::new(link))
    }
}
