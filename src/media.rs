//! Local and remote media track handling.
//!
//! Outgoing media lives in a [`LocalTracks`] bundle of sample-based tracks.
//! The bundle is cloned into every peer session it feeds, so a replacement
//! connection reuses the same capture instead of reacquiring devices.
//! Incoming media surfaces as [`RemoteStream`] snapshots reported by the
//! connection layer.

use std::sync::Arc;
use std::time::Duration;

use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use crate::{Error, Result};

/// Kind of media carried by a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single remote track attached to a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrackInfo {
    pub id: String,
    pub kind: MediaKind,
}

/// Snapshot of the remote media currently arriving over a connection.
///
/// An empty snapshot means no remote tracks have been attached yet, or the
/// connection was torn down and its tracks released.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteStream {
    /// Stream identifier announced by the remote peer.
    pub stream_id: String,
    /// Tracks currently attached, in arrival order.
    pub tracks: Vec<RemoteTrackInfo>,
}

impl RemoteStream {
    pub fn has_audio(&self) -> bool {
        self.tracks.iter().any(|t| t.kind == MediaKind::Audio)
    }

    pub fn has_video(&self) -> bool {
        self.tracks.iter().any(|t| t.kind == MediaKind::Video)
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

/// Outgoing media bundle shared across peer connections.
///
/// Tracks are `Arc`-shared sample sinks. Cloning the bundle clones the
/// handles, not the capture, so every connection fed from one bundle sends
/// the same media and the bundle outlives any individual connection.
#[derive(Clone, Default)]
pub struct LocalTracks {
    audio: Option<Arc<TrackLocalStaticSample>>,
    video: Option<Arc<TrackLocalStaticSample>>,
}

impl LocalTracks {
    /// Bundle with no outgoing media. Used by view-only peers.
    pub fn none() -> Self {
        Self::default()
    }

    /// Opus audio plus VP8 video, the broadcast capture shape.
    ///
    /// `label` distinguishes this sender's tracks in SDP, typically the
    /// local peer id.
    pub fn audio_video(label: &str) -> Self {
        Self {
            audio: Some(Self::opus_track(label)),
            video: Some(Self::vp8_track(label)),
        }
    }

    /// Opus audio only, the talkback capture shape.
    pub fn audio_only(label: &str) -> Self {
        Self {
            audio: Some(Self::opus_track(label)),
            video: None,
        }
    }

    fn opus_track(label: &str) -> Arc<TrackLocalStaticSample> {
        Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: "audio/opus".to_string(),
                clock_rate: 48000,
                channels: 2,
                sdp_fmtp_line: String::new(),
                rtcp_feedback: vec![],
            },
            format!("audio-{}", label),
            format!("stream-{}", label),
        ))
    }

    fn vp8_track(label: &str) -> Arc<TrackLocalStaticSample> {
        Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: "video/VP8".to_string(),
                clock_rate: 90000,
                channels: 0,
                sdp_fmtp_line: String::new(),
                rtcp_feedback: vec![],
            },
            format!("video-{}", label),
            format!("stream-{}", label),
        ))
    }

    pub fn audio(&self) -> Option<&Arc<TrackLocalStaticSample>> {
        self.audio.as_ref()
    }

    pub fn video(&self) -> Option<&Arc<TrackLocalStaticSample>> {
        self.video.as_ref()
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    pub fn has_video(&self) -> bool {
        self.video.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.audio.is_none() && self.video.is_none()
    }

    /// Tracks as trait objects, ready for `RTCPeerConnection::add_track`.
    pub fn as_track_locals(&self) -> Vec<Arc<dyn TrackLocal + Send + Sync>> {
        let mut out: Vec<Arc<dyn TrackLocal + Send + Sync>> = Vec::new();
        if let Some(audio) = &self.audio {
            out.push(Arc::clone(audio) as Arc<dyn TrackLocal + Send + Sync>);
        }
        if let Some(video) = &self.video {
            out.push(Arc::clone(video) as Arc<dyn TrackLocal + Send + Sync>);
        }
        out
    }

    /// Write one encoded audio sample to the shared audio track.
    ///
    /// Errors if the bundle has no audio track. RTP packetization and
    /// timestamping are handled by the track itself.
    pub async fn write_audio_sample(&self, data: Vec<u8>, duration: Duration) -> Result<()> {
        let track = self.audio.as_ref().ok_or_else(|| {
            Error::MediaTrackError("no audio track in local bundle".to_string())
        })?;

        let sample = Sample {
            data: data.into(),
            duration,
            timestamp: std::time::SystemTime::now(),
            ..Default::default()
        };

        track
            .write_sample(&sample)
            .await
            .map_err(|e| Error::MediaTrackError(format!("failed to write audio sample: {}", e)))
    }

    /// Write one encoded video sample to the shared video track.
    pub async fn write_video_sample(&self, data: Vec<u8>, duration: Duration) -> Result<()> {
        let track = self.video.as_ref().ok_or_else(|| {
            Error::MediaTrackError("no video track in local bundle".to_string())
        })?;

        let sample = Sample {
            data: data.into(),
            duration,
            timestamp: std::time::SystemTime::now(),
            ..Default::default()
        };

        track
            .write_sample(&sample)
            .await
            .map_err(|e| Error::MediaTrackError(format!("failed to write video sample: {}", e)))
    }
}

impl std::fmt::Debug for LocalTracks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTracks")
            .field("audio", &self.audio.is_some())
            .field("video", &self.video.is_some())
            .finish()
    }
}
