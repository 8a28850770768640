//! Status vocabulary surfaced to the embedding application.
//!
//! The UI around an exam consumes these values and nothing deeper; the
//! session layer's richer state machine is folded down to what a status
//! indicator can show.

use crate::session::SessionState;

pub use crate::session::RegistryCounts;

/// Broadcaster-side status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastStatus {
    /// Setup in progress; presence not yet announced.
    Initializing,
    /// Presence announced, no viewer connected yet.
    Ready,
    /// At least one viewer connected.
    Streaming,
    /// Stopped, or presence could not be maintained.
    Disconnected,
}

impl BroadcastStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BroadcastStatus::Initializing => "initializing",
            BroadcastStatus::Ready => "ready",
            BroadcastStatus::Streaming => "streaming",
            BroadcastStatus::Disconnected => "disconnected",
        }
    }
}

impl std::fmt::Display for BroadcastStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Viewer-side status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewStatus {
    New,
    Connecting,
    Connected,
    Failed,
    Closed,
}

impl ViewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewStatus::New => "new",
            ViewStatus::Connecting => "connecting",
            ViewStatus::Connected => "connected",
            ViewStatus::Failed => "failed",
            ViewStatus::Closed => "closed",
        }
    }

    /// Fold a session state down to the viewer status vocabulary.
    ///
    /// Recovery states count as connecting: from the viewer's side a
    /// session mid-replacement is an attempt in progress, not a failure.
    pub fn from_session(state: SessionState) -> Self {
        match state {
            SessionState::New => ViewStatus::New,
            SessionState::Negotiating
            | SessionState::Disconnected
            | SessionState::Restarting
            | SessionState::Recovering => ViewStatus::Connecting,
            SessionState::Connected => ViewStatus::Connected,
            SessionState::Failed => ViewStatus::Failed,
            SessionState::Closed => ViewStatus::Closed,
        }
    }
}

impl std::fmt::Display for ViewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Talkback channel status, either direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TalkbackStatus {
    /// Not started or stopped.
    Off,
    /// Negotiation or recovery in progress.
    Connecting,
    /// Audio flowing.
    Live,
    /// Connectivity failed and recovery has not succeeded.
    Failed,
}

impl TalkbackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TalkbackStatus::Off => "off",
            TalkbackStatus::Connecting => "connecting",
            TalkbackStatus::Live => "live",
            TalkbackStatus::Failed => "failed",
        }
    }

    pub fn from_session(state: SessionState) -> Self {
        match state {
            SessionState::Connected => TalkbackStatus::Live,
            SessionState::Failed => TalkbackStatus::Failed,
            SessionState::Closed => TalkbackStatus::Off,
            _ => TalkbackStatus::Connecting,
        }
    }
}

impl std::fmt::Display for TalkbackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
