//! Error types for the proctoring streaming core

/// Result type alias using the streaming core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in streaming core operations
///
/// The variants fall into five operational classes: transient signaling
/// faults, negotiation protocol violations, media acquisition failures,
/// connectivity failures, and playback refusals on the receiving side.
/// The classification helpers below decide how each class propagates.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Signaling transport read/write failure (transient)
    #[error("Signaling error: {0}")]
    SignalingError(String),

    /// Invalid signaling path
    #[error("Invalid signaling path: {0}")]
    InvalidPath(String),

    /// A negotiation message arrived in an unexpected state or shape
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Local camera/microphone acquisition failed
    #[error("Media acquisition failed: {0}")]
    MediaAcquisitionFailed(String),

    /// Connectivity could not be recovered for a remote peer
    #[error("Connectivity failed: {0}")]
    ConnectivityFailed(String),

    /// The receiving sink refused playback (autoplay policy)
    #[error("Playback blocked: {0}")]
    PlaybackBlocked(String),

    /// Session not found in the registry
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// The session was closed while an operation was in flight
    #[error("Session closed: {0}")]
    SessionClosed(String),

    /// Peer connection error from the media link
    #[error("Peer connection error: {0}")]
    PeerConnectionError(String),

    /// ICE candidate error
    #[error("ICE candidate error: {0}")]
    IceCandidateError(String),

    /// SDP negotiation error
    #[error("SDP negotiation error: {0}")]
    SdpError(String),

    /// Media track error
    #[error("Media track error: {0}")]
    MediaTrackError(String),

    /// Operation timeout
    #[error("Operation timeout: {0}")]
    OperationTimeout(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is transient and eligible for the retry/backoff path
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::SignalingError(_) | Error::OperationTimeout(_) | Error::IoError(_)
        )
    }

    /// Check if this error is fatal to starting a session (prompt the user,
    /// never silently retry)
    pub fn is_media_failure(&self) -> bool {
        matches!(self, Error::MediaAcquisitionFailed(_))
    }

    /// Check if this error should be surfaced as a user-actionable status
    /// rather than handled internally
    pub fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            Error::MediaAcquisitionFailed(_)
                | Error::ConnectivityFailed(_)
                | Error::PlaybackBlocked(_)
        )
    }

    /// Check if this error is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::InvalidConfig(_))
    }

    /// Check if this error came from the media link layer
    pub fn is_link_error(&self) -> bool {
        matches!(
            self,
            Error::PeerConnectionError(_)
                | Error::IceCandidateError(_)
                | Error::SdpError(_)
                | Error::MediaTrackError(_)
        )
    }
}
