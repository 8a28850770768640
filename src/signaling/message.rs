//! Wire types exchanged over the signaling store
//!
//! The wire set is closed: presence records, negotiation messages (offer or
//! answer), and ICE candidate records. Values are decoded at the transport
//! adapter boundary; anything that does not parse is ignored by the caller
//! with a warning rather than trusted by shape.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, for wire timestamps
///
/// Timestamps are informational; staleness is decided by signaling-state
/// checks and teardown-time path removal, never by comparing these.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Liveness record announcing a participant's availability
///
/// Auto-removed by the transport's disconnect hook; explicitly removed on
/// clean teardown. Presence existing is the only trigger for creating a
/// session; its absence the only trigger for disposing one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    /// Opaque id for this participant instance (fresh per instance, not per user)
    pub remote_peer_id: String,

    /// Whether the participant considers itself available
    pub connected: bool,

    /// Wall-clock join time in milliseconds
    pub joined_at: u64,
}

impl PresenceRecord {
    /// Create a presence record announcing availability now
    pub fn announce(remote_peer_id: &str) -> Self {
        Self {
            remote_peer_id: remote_peer_id.to_string(),
            connected: true,
            joined_at: now_millis(),
        }
    }

    /// Serialize for a store write
    pub fn to_value(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| Error::SerializationError(e.to_string()))
    }

    /// Decode from a store value, rejecting ids that cannot form a path
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        let record: PresenceRecord = serde_json::from_value(value.clone())
            .map_err(|e| Error::SerializationError(format!("invalid presence record: {}", e)))?;
        if record.remote_peer_id.is_empty() || record.remote_peer_id.contains('/') {
            return Err(Error::SerializationError(format!(
                "invalid peer id in presence record: {:?}",
                record.remote_peer_id
            )));
        }
        Ok(record)
    }
}

/// Which half of the handshake a negotiation message carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// One half of the session-description handshake
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationMessage {
    /// Session description payload
    pub sdp: String,

    /// Message kind tag (`"offer"` or `"answer"` on the wire)
    #[serde(rename = "type")]
    pub kind: SdpKind,

    /// Wall-clock write time in milliseconds (informational)
    pub timestamp: u64,
}

impl NegotiationMessage {
    /// Build an offer message
    pub fn offer(sdp: String) -> Self {
        Self {
            sdp,
            kind: SdpKind::Offer,
            timestamp: now_millis(),
        }
    }

    /// Build an answer message
    pub fn answer(sdp: String) -> Self {
        Self {
            sdp,
            kind: SdpKind::Answer,
            timestamp: now_millis(),
        }
    }

    /// Serialize for a store write
    pub fn to_value(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| Error::SerializationError(e.to_string()))
    }

    /// Decode from a store value
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| Error::SerializationError(format!("invalid negotiation message: {}", e)))
    }
}

/// One discovered network path, appended to a direction-scoped list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidateRecord {
    /// Candidate line as produced by the media link
    pub candidate: String,

    /// Media stream identification tag, if present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,

    /// Index of the media description this candidate belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u16>,

    /// Wall-clock write time in milliseconds (informational)
    pub written_at: u64,
}

impl IceCandidateRecord {
    /// Build a candidate record written now
    pub fn new(candidate: String, sdp_mid: Option<String>, sdp_m_line_index: Option<u16>) -> Self {
        Self {
            candidate,
            sdp_mid,
            sdp_m_line_index,
            written_at: now_millis(),
        }
    }

    /// Serialize for a store append
    pub fn to_value(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| Error::SerializationError(e.to_string()))
    }

    /// Decode from a store value
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| Error::SerializationError(format!("invalid candidate record: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_presence_round_trip() {
        let record = PresenceRecord::announce("peer-1");
        let value = record.to_value().unwrap();
        let decoded = PresenceRecord::from_value(&value).unwrap();
        assert_eq!(record, decoded);
        assert!(decoded.connected);
    }

    #[test]
    fn test_presence_wire_field_names_are_camel_case() {
        let value = PresenceRecord::announce("peer-1").to_value().unwrap();
        assert!(value.get("remotePeerId").is_some());
        assert!(value.get("joinedAt").is_some());
        assert!(value.get("remote_peer_id").is_none());
    }

    #[test]
    fn test_presence_rejects_path_breaking_peer_id() {
        let value = json!({
            "remotePeerId": "a/b",
            "connected": true,
            "joinedAt": 1u64,
        });
        assert!(PresenceRecord::from_value(&value).is_err());

        let value = json!({
            "remotePeerId": "",
            "connected": true,
            "joinedAt": 1u64,
        });
        assert!(PresenceRecord::from_value(&value).is_err());
    }

    #[test]
    fn test_negotiation_type_tag_is_lowercase() {
        let offer = NegotiationMessage::offer("v=0".to_string()).to_value().unwrap();
        assert_eq!(offer.get("type").and_then(|v| v.as_str()), Some("offer"));

        let answer = NegotiationMessage::answer("v=0".to_string()).to_value().unwrap();
        assert_eq!(answer.get("type").and_then(|v| v.as_str()), Some("answer"));
    }

    #[test]
    fn test_negotiation_round_trip() {
        let msg = NegotiationMessage::offer("v=0\r\no=- 0 0 IN IP4 127.0.0.1".to_string());
        let decoded = NegotiationMessage::from_value(&msg.to_value().unwrap()).unwrap();
        assert_eq!(msg, decoded);
        assert_eq!(decoded.kind, SdpKind::Offer);
    }

    #[test]
    fn test_candidate_optional_fields_omitted_when_absent() {
        let record = IceCandidateRecord::new("candidate:1 1 udp ...".to_string(), None, None);
        let value = record.to_value().unwrap();
        assert!(value.get("sdpMid").is_none());
        assert!(value.get("sdpMLineIndex").is_none());

        let decoded = IceCandidateRecord::from_value(&value).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_candidate_round_trip_with_fields() {
        let record = IceCandidateRecord::new(
            "candidate:2 1 tcp ...".to_string(),
            Some("0".to_string()),
            Some(0),
        );
        let value = record.to_value().unwrap();
        assert!(value.get("sdpMid").is_some());
        assert_eq!(IceCandidateRecord::from_value(&value).unwrap(), record);
    }

    #[test]
    fn test_malformed_values_rejected() {
        assert!(NegotiationMessage::from_value(&json!({"sdp": 5})).is_err());
        assert!(NegotiationMessage::from_value(&json!("just a string")).is_err());
        assert!(IceCandidateRecord::from_value(&json!({"writtenAt": 1})).is_err());
        assert!(PresenceRecord::from_value(&json!(null)).is_err());
    }

    #[test]
    fn test_unknown_type_tag_rejected() {
        let value = json!({
            "sdp": "v=0",
            "type": "pranswer",
            "timestamp": 1u64,
        });
        assert!(NegotiationMessage::from_value(&value).is_err());
    }
}
