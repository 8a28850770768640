//! Signaling store path layout
//!
//! All negotiation state lives under two top-level namespaces: `channel/`
//! for the primary broadcast star and `talkback/` for the reverse audio
//! star. Both are keyed first by the broadcast channel id (the candidate's
//! participant id) and then by the announced peer's id:
//!
//! ```text
//! channel/{participantId}                          broadcaster presence
//! channel/{participantId}/viewers/{peerId}         viewer presence
//! channel/{participantId}/offers/{peerId}          broadcaster -> viewer
//! channel/{participantId}/answers/{peerId}         viewer -> broadcaster
//! channel/{participantId}/ice/{peerId}/broadcaster candidate list
//! channel/{participantId}/ice/{peerId}/viewer      candidate list
//! talkback/{participantId}/admin/{peerId}          speaker presence
//! talkback/{participantId}/offers|answers|ice/...  mirror, roles swapped
//! ```

use crate::{Error, Result};
use std::fmt;

/// A slash-separated location in the signaling store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignalPath {
    segments: Vec<String>,
}

impl SignalPath {
    /// Parse a path from its slash-separated form
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidPath` if the string is empty or contains
    /// empty segments.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(Error::InvalidPath("empty path".to_string()));
        }
        let segments: Vec<String> = raw.split('/').map(str::to_string).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(Error::InvalidPath(format!("empty segment in '{}'", raw)));
        }
        Ok(Self { segments })
    }

    /// Extend this path by one segment
    ///
    /// # Panics
    ///
    /// Panics if the segment is empty or contains `/`. Segments derived from
    /// wire input (peer ids) are validated at the message decode boundary
    /// before they reach path construction.
    pub fn child(&self, segment: &str) -> SignalPath {
        assert!(
            !segment.is_empty() && !segment.contains('/'),
            "invalid path segment: {:?}",
            segment
        );
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        SignalPath { segments }
    }

    /// Path segments in order
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Final segment (the child key), if any
    pub fn key(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Whether `prefix` is an ancestor of (or equal to) this path
    pub fn starts_with(&self, prefix: &SignalPath) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }

    /// If this path is a direct child of `parent`, return its key
    pub fn child_key_of(&self, parent: &SignalPath) -> Option<&str> {
        if self.depth() == parent.depth() + 1 && self.starts_with(parent) {
            self.key()
        } else {
            None
        }
    }
}

impl fmt::Display for SignalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

/// Which side of a negotiation a session plays
///
/// The initiator is fixed per channel: the broadcaster on the primary
/// stream, the speaker on talkback. The responder never writes offers,
/// which rules out glare by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationRole {
    /// Creates and writes the offer, applies the answer
    Initiator,
    /// Waits for the offer, creates and writes the answer
    Responder,
}

impl NegotiationRole {
    /// The opposite role
    pub fn other(&self) -> NegotiationRole {
        match self {
            NegotiationRole::Initiator => NegotiationRole::Responder,
            NegotiationRole::Responder => NegotiationRole::Initiator,
        }
    }
}

/// The signaling paths one ConnectionSession negotiates over
///
/// `owned` lists every path this side writes; teardown removes exactly
/// those, leaving the remote side's writes for the remote to clean up.
#[derive(Debug, Clone)]
pub struct NegotiationPaths {
    /// Offer location (initiator-written)
    pub offer: SignalPath,
    /// Answer location (responder-written)
    pub answer: SignalPath,
    /// Candidate list this side appends to
    pub ice_local: SignalPath,
    /// Candidate list the remote side appends to
    pub ice_remote: SignalPath,
    /// Paths removed on this session's teardown
    pub owned: Vec<SignalPath>,
}

impl NegotiationPaths {
    fn build(
        base: &SignalPath,
        peer_id: &str,
        role: NegotiationRole,
        initiator_dir: &str,
        responder_dir: &str,
    ) -> Self {
        let offer = base.child("offers").child(peer_id);
        let answer = base.child("answers").child(peer_id);
        let ice = base.child("ice").child(peer_id);
        let ice_initiator = ice.child(initiator_dir);
        let ice_responder = ice.child(responder_dir);
        match role {
            NegotiationRole::Initiator => Self {
                owned: vec![offer.clone(), ice_initiator.clone()],
                ice_local: ice_initiator,
                ice_remote: ice_responder,
                offer,
                answer,
            },
            NegotiationRole::Responder => Self {
                owned: vec![answer.clone(), ice_responder.clone()],
                ice_local: ice_responder,
                ice_remote: ice_initiator,
                offer,
                answer,
            },
        }
    }
}

fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() || id.contains('/') {
        return Err(Error::InvalidPath(format!("invalid identifier: {:?}", id)));
    }
    Ok(())
}

/// Path layout for one primary broadcast channel
#[derive(Debug, Clone)]
pub struct ChannelPaths {
    channel_id: String,
}

impl ChannelPaths {
    /// Create the layout for a channel id (the broadcaster's participant id)
    pub fn new(channel_id: &str) -> Result<Self> {
        validate_id(channel_id)?;
        Ok(Self {
            channel_id: channel_id.to_string(),
        })
    }

    /// The channel id this layout is scoped to
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// `channel/{id}`: broadcaster presence record
    pub fn presence(&self) -> SignalPath {
        SignalPath {
            segments: vec!["channel".to_string(), self.channel_id.clone()],
        }
    }

    /// `channel/{id}/viewers`: viewer roster
    pub fn viewers(&self) -> SignalPath {
        self.presence().child("viewers")
    }

    /// `channel/{id}/viewers/{peer}`: one viewer's presence record
    pub fn viewer_presence(&self, peer_id: &str) -> SignalPath {
        self.viewers().child(peer_id)
    }

    /// Negotiation paths for one viewer session, from `role`'s perspective
    /// (the broadcaster is the initiator on this channel)
    pub fn negotiation(&self, peer_id: &str, role: NegotiationRole) -> NegotiationPaths {
        NegotiationPaths::build(&self.presence(), peer_id, role, "broadcaster", "viewer")
    }
}

/// Path layout for one talkback (reverse audio) channel
#[derive(Debug, Clone)]
pub struct TalkbackPaths {
    channel_id: String,
}

impl TalkbackPaths {
    /// Create the layout for a channel id (same id as the primary channel)
    pub fn new(channel_id: &str) -> Result<Self> {
        validate_id(channel_id)?;
        Ok(Self {
            channel_id: channel_id.to_string(),
        })
    }

    /// The channel id this layout is scoped to
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    fn base(&self) -> SignalPath {
        SignalPath {
            segments: vec!["talkback".to_string(), self.channel_id.clone()],
        }
    }

    /// `talkback/{id}/admin`: speaker roster
    pub fn admin(&self) -> SignalPath {
        self.base().child("admin")
    }

    /// `talkback/{id}/admin/{peer}`: one speaker's presence record
    pub fn speaker_presence(&self, peer_id: &str) -> SignalPath {
        self.admin().child(peer_id)
    }

    /// Negotiation paths for one speaker session, from `role`'s perspective
    /// (the speaker is the initiator on this channel)
    pub fn negotiation(&self, peer_id: &str, role: NegotiationRole) -> NegotiationPaths {
        NegotiationPaths::build(&self.base(), peer_id, role, "admin", "candidate")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display_round_trip() {
        let path = SignalPath::parse("channel/exam-1/viewers/p1").unwrap();
        assert_eq!(path.to_string(), "channel/exam-1/viewers/p1");
        assert_eq!(path.depth(), 4);
        assert_eq!(path.key(), Some("p1"));
    }

    #[test]
    fn test_parse_rejects_empty_segments() {
        assert!(SignalPath::parse("").is_err());
        assert!(SignalPath::parse("channel//x").is_err());
        assert!(SignalPath::parse("/channel").is_err());
    }

    #[test]
    fn test_child_key_of() {
        let roster = SignalPath::parse("channel/exam-1/viewers").unwrap();
        let member = roster.child("p1");
        let deep = member.child("extra");
        assert_eq!(member.child_key_of(&roster), Some("p1"));
        assert_eq!(deep.child_key_of(&roster), None);
        assert_eq!(roster.child_key_of(&roster), None);
    }

    #[test]
    fn test_starts_with() {
        let base = SignalPath::parse("channel/exam-1").unwrap();
        let deep = SignalPath::parse("channel/exam-1/ice/p1/viewer").unwrap();
        let other = SignalPath::parse("talkback/exam-1").unwrap();
        assert!(deep.starts_with(&base));
        assert!(base.starts_with(&base));
        assert!(!other.starts_with(&base));
        assert!(!base.starts_with(&deep));
    }

    #[test]
    fn test_channel_layout_matches_wire_format() {
        let paths = ChannelPaths::new("exam-1").unwrap();
        assert_eq!(paths.presence().to_string(), "channel/exam-1");
        assert_eq!(paths.viewers().to_string(), "channel/exam-1/viewers");
        assert_eq!(
            paths.viewer_presence("p1").to_string(),
            "channel/exam-1/viewers/p1"
        );

        let nego = paths.negotiation("p1", NegotiationRole::Initiator);
        assert_eq!(nego.offer.to_string(), "channel/exam-1/offers/p1");
        assert_eq!(nego.answer.to_string(), "channel/exam-1/answers/p1");
        assert_eq!(nego.ice_local.to_string(), "channel/exam-1/ice/p1/broadcaster");
        assert_eq!(nego.ice_remote.to_string(), "channel/exam-1/ice/p1/viewer");
    }

    #[test]
    fn test_negotiation_owned_paths_per_role() {
        let paths = ChannelPaths::new("exam-1").unwrap();

        let initiator = paths.negotiation("p1", NegotiationRole::Initiator);
        assert!(initiator.owned.contains(&initiator.offer));
        assert!(initiator.owned.contains(&initiator.ice_local));
        assert!(!initiator.owned.contains(&initiator.answer));

        let responder = paths.negotiation("p1", NegotiationRole::Responder);
        assert!(responder.owned.contains(&responder.answer));
        assert!(responder.owned.contains(&responder.ice_local));
        assert!(!responder.owned.contains(&responder.offer));
        assert_eq!(
            responder.ice_local.to_string(),
            "channel/exam-1/ice/p1/viewer"
        );
    }

    #[test]
    fn test_talkback_layout_mirrors_with_swapped_roles() {
        let paths = TalkbackPaths::new("exam-1").unwrap();
        assert_eq!(
            paths.speaker_presence("a1").to_string(),
            "talkback/exam-1/admin/a1"
        );

        let nego = paths.negotiation("a1", NegotiationRole::Initiator);
        assert_eq!(nego.offer.to_string(), "talkback/exam-1/offers/a1");
        assert_eq!(nego.ice_local.to_string(), "talkback/exam-1/ice/a1/admin");
        assert_eq!(nego.ice_remote.to_string(), "talkback/exam-1/ice/a1/candidate");
    }

    #[test]
    fn test_invalid_channel_id_rejected() {
        assert!(ChannelPaths::new("").is_err());
        assert!(ChannelPaths::new("a/b").is_err());
        assert!(TalkbackPaths::new("x/y").is_err());
    }

    #[test]
    fn test_role_other() {
        assert_eq!(
            NegotiationRole::Initiator.other(),
            NegotiationRole::Responder
        );
        assert_eq!(
            NegotiationRole::Responder.other(),
            NegotiationRole::Initiator
        );
    }
}
