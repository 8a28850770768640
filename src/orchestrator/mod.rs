//! Top-level orchestration: wires presence watching, the session registry,
//! and per-peer sessions into the narrow surfaces the exam UI consumes.

pub mod broadcast;
pub mod status;
pub mod talkback;
pub mod viewing;

pub use broadcast::Broadcaster;
pub use status::{BroadcastStatus, RegistryCounts, TalkbackStatus, ViewStatus};
pub use talkback::{TalkbackListener, TalkbackSpeaker};
pub use viewing::Viewer;
