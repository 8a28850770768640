//! Signaling layer: path layout, wire types, and the transport abstraction
//!
//! Negotiation is carried over an out-of-band store-and-notify channel,
//! never a direct socket. Everything here is media-free by contract.

pub mod memory;
pub mod message;
pub mod path;
pub mod transport;

pub use memory::InMemorySignaling;
pub use message::{IceCandidateRecord, NegotiationMessage, PresenceRecord, SdpKind};
pub use path::{ChannelPaths, NegotiationPaths, NegotiationRole, SignalPath, TalkbackPaths};
pub use transport::{PathChange, PathEvent, SignalingTransport, Subscription};
