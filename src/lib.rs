//! Live proctoring stream core
//!
//! One-to-many WebRTC streaming between an exam candidate (broadcaster) and
//! proctors (viewers), plus a reverse audio channel for a proctor to speak
//! to a candidate. Negotiation is carried over an out-of-band store-and-notify
//! signaling channel; media never touches it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  Broadcaster / Viewer / TalkbackSpeaker / TalkbackListener│
//! │  ├─ PresenceWatcher (roster → reconciliation)            │
//! │  ├─ SessionRegistry (one session per present peer)       │
//! │  │   └─ ConnectionSession (state machine, per peer)      │
//! │  │       ├─ MediaLink (WebRTC peer connection)           │
//! │  │       ├─ IceCandidateBuffer (pre-description FIFO)    │
//! │  │       └─ grace timers (disconnect/restart/settle)     │
//! │  └─ SignalingTransport (subscribable key/value store)    │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The initiator role is fixed per channel: the broadcaster offers toward
//! each viewer, the speaker offers toward the listener. Recovery is by
//! replacement after at most one ICE restart; presence is the only trigger
//! for creating or disposing sessions.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use proctorcast::{Broadcaster, StreamConfig, WebRtcLinkFactory};
//! use proctorcast::media::LocalTracks;
//! use proctorcast::signaling::InMemorySignaling;
//!
//! # async fn example() -> proctorcast::Result<()> {
//! let config = StreamConfig::default().with_peer_id("candidate-1");
//! let transport = Arc::new(InMemorySignaling::new());
//! let links = Arc::new(WebRtcLinkFactory::new(config.clone()));
//!
//! let broadcast = Broadcaster::start(
//!     config,
//!     transport,
//!     links,
//!     LocalTracks::audio_video("candidate-1"),
//! )
//! .await?;
//!
//! println!("viewers connect to channel {}", broadcast.channel_id());
//! broadcast.stop().await;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod media;
pub mod orchestrator;
pub mod peer;
pub mod session;
pub mod signaling;

pub use config::{StreamConfig, TimingConfig, TurnServerConfig};
pub use error::{Error, Result};
pub use orchestrator::{
    BroadcastStatus, Broadcaster, RegistryCounts, TalkbackListener, TalkbackSpeaker,
    TalkbackStatus, ViewStatus, Viewer,
};
pub use peer::{MediaLink, MediaLinkFactory, WebRtcLinkFactory};
pub use session::{SessionDiagnostics, SessionState};
pub use signaling::{InMemorySignaling, SignalingTransport};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
