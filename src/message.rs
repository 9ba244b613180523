//! Wire protocol for the signaling relay
//!
//! Every envelope is a single JSON text frame:
//!
//! ```json
//! {"type": "OFFER", "src": "alice", "dst": "bob", "payload": {"sdp": "..."}}
//! ```
//!
//! The payload is opaque to the server and passed through untouched.

use serde::{Deserialize, Serialize};

/// Peer identifier, assigned at registration and used as routing address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(pub String);

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Envelope type tag
///
/// A closed set; the handler matches on it exhaustively. Type strings the
/// server has never heard of decode to [`MessageType::Unknown`] so they reach
/// the handler and are rejected there rather than dying silently in the
/// decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// Registration; also the server's registration-accepted acknowledgment
    Open,
    /// Liveness ping; updates the sender's timestamp, nothing else
    Heartbeat,
    /// SDP offer
    Offer,
    /// SDP answer
    Answer,
    /// ICE candidate
    Candidate,
    /// Renegotiation signal
    Expire,
    /// Teardown notice, self-issued or synthesized on relay failure
    Leave,
    /// Anything else on the wire; always rejected by the handler
    #[serde(other)]
    Unknown,
}

impl MessageType {
    /// Whether an undeliverable envelope of this type may be held for a peer
    /// that has not registered yet.
    pub fn is_queueable(self) -> bool {
        matches!(
            self,
            Self::Offer | Self::Answer | Self::Candidate | Self::Expire | Self::Leave
        )
    }
}

/// A typed, addressed unit of signaling data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Sender identity; overwritten by the handler with the connection's
    /// bound identity for every type except `Open`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<PeerId>,
    /// Recipient identity; absent for self-referential types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst: Option<PeerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl Message {
    /// The registration-accepted acknowledgment sent back on `Open`
    pub fn open_ack() -> Self {
        Self {
            kind: MessageType::Open,
            src: None,
            dst: None,
            payload: None,
        }
    }

    /// Teardown notice synthesized when relaying to `dst` failed, addressed
    /// back to the original sender
    pub fn leave_notice(src: PeerId, dst: PeerId) -> Self {
        Self {
            kind: MessageType::Leave,
            src: Some(src),
            dst: Some(dst),
            payload: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_offer() {
        let msg: Message =
            serde_json::from_str(r#"{"type":"OFFER","src":"a","dst":"b","payload":{"sdp":"x"}}"#)
                .unwrap();
        assert_eq!(msg.kind, MessageType::Offer);
        assert_eq!(msg.src, Some(PeerId::from("a")));
        assert_eq!(msg.dst, Some(PeerId::from("b")));
    }

    #[test]
    fn unknown_type_decodes_to_unknown() {
        let msg: Message = serde_json::from_str(r#"{"type":"FROBNICATE","dst":"b"}"#).unwrap();
        assert_eq!(msg.kind, MessageType::Unknown);
    }

    #[test]
    fn absent_fields_stay_off_the_wire() {
        let json = serde_json::to_string(&Message::open_ack()).unwrap();
        assert_eq!(json, r#"{"type":"OPEN"}"#);
    }

    #[test]
    fn queueable_types() {
        assert!(MessageType::Offer.is_queueable());
        assert!(MessageType::Leave.is_queueable());
        assert!(!MessageType::Heartbeat.is_queueable());
        assert!(!MessageType::Open.is_queueable());
        assert!(!MessageType::Unknown.is_queueable());
    }
}
