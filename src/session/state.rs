//! Session lifecycle vocabulary shared by sessions, registries, and
//! orchestrators.

/// Lifecycle state of one peer connection session.
///
/// `Failed` marks the moment a connectivity failure is observed; the session
/// immediately opens its restart window and moves to `Restarting`, either
/// with its own ICE restart in flight or waiting for the peer's to land.
/// `Recovering` means a grace window expired and a replacement session has
/// been requested. `Closed` is the only state with no way out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, negotiation not yet driven.
    New,
    /// Offer/answer and candidate exchange in progress.
    Negotiating,
    /// Transport connectivity established.
    Connected,
    /// Transport dropped; disconnect grace running.
    Disconnected,
    /// Connectivity failure observed.
    Failed,
    /// Restart window open after a failure.
    Restarting,
    /// Replacement requested; awaiting disposal.
    Recovering,
    /// Torn down. Terminal.
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::New => "new",
            SessionState::Negotiating => "negotiating",
            SessionState::Connected => "connected",
            SessionState::Disconnected => "disconnected",
            SessionState::Failed => "failed",
            SessionState::Restarting => "restarting",
            SessionState::Recovering => "recovering",
            SessionState::Closed => "closed",
        }
    }

    /// True once the session can make no further progress on its own.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Failed | SessionState::Closed)
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session was closed. Carried through teardown for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The remote peer's presence record disappeared.
    PresenceLost,
    /// The session is being replaced by a fresh one for the same peer.
    Replaced,
    /// The owning orchestrator is stopping.
    LocalStop,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::PresenceLost => "presence lost",
            CloseReason::Replaced => "replaced",
            CloseReason::LocalStop => "local stop",
        }
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport-level detail published per session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionDiagnostics {
    /// ICE connection state string from the link.
    pub ice_state: String,
    /// ICE gathering state string from the link.
    pub gathering_state: String,
    /// Local candidates written to signaling.
    pub candidates_sent: u64,
    /// Remote candidates received from signaling.
    pub candidates_received: u64,
}

/// Notifications a session sends its registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryNotice {
    /// The session moved to a new lifecycle state.
    StateChanged {
        remote_peer_id: String,
        state: SessionState,
    },
    /// A grace window expired; the session must be torn down and a fresh
    /// one created for the same peer after the replacement delay.
    ReplacementNeeded { remote_peer_id: String },
    /// Teardown finished.
    SessionClosed { remote_peer_id: String },
    /// The session surfaced a new remote media stream.
    MediaUpdated { remote_peer_id: String },
}
