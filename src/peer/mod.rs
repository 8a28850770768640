//! Peer connection transport layer.
//!
//! [`MediaLink`] is the seam between session logic and the WebRTC stack.
//! Sessions drive the trait and consume its event stream; [`WebRtcLink`]
//! implements it over an `RTCPeerConnection`, and tests substitute fakes.

pub mod link;
pub mod webrtc;

pub use link::{
    LinkConnectivity, LinkDiagnostics, LinkEvent, LinkRequest, MediaLink, MediaLinkFactory,
};
pub use webrtc::{WebRtcLink, WebRtcLinkFactory};
