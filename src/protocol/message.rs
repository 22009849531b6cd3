use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::protocol::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MessageKind {
    Request,
    Grant,
    Release,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageKind::Request => write!(f, "REQUEST"),
            MessageKind::Grant => write!(f, "GRANT"),
            MessageKind::Release => write!(f, "RELEASE"),
        }
    }
}

/// A protocol message. Fields are fixed at construction.
///
/// The timestamp comes from the sender's local clock and is informational
/// only: the coordinator orders its queue by arrival, never by timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    kind: MessageKind,
    sender_id: NodeId,
    timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(kind: MessageKind, sender_id: NodeId, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind,
            sender_id,
            timestamp,
        }
    }

    pub fn request(sender_id: NodeId, timestamp: DateTime<Utc>) -> Self {
        Self::new(MessageKind::Request, sender_id, timestamp)
    }

    pub fn grant(sender_id: NodeId, timestamp: DateTime<Utc>) -> Self {
        Self::new(MessageKind::Grant, sender_id, timestamp)
    }

    pub fn release(sender_id: NodeId, timestamp: DateTime<Utc>) -> Self {
        Self::new(MessageKind::Release, sender_id, timestamp)
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn sender_id(&self) -> NodeId {
        self.sender_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_kind() {
        let now = Utc::now();
        assert_eq!(Message::request(7, now).kind(), MessageKind::Request);
        assert_eq!(Message::grant(7, now).kind(), MessageKind::Grant);
        assert_eq!(Message::release(7, now).kind(), MessageKind::Release);
    }

    #[test]
    fn fields_are_preserved() {
        let now = Utc::now();
        let msg = Message::request(42, now);
        assert_eq!(msg.sender_id(), 42);
        assert_eq!(msg.timestamp(), now);
    }

    #[test]
    fn kind_display_matches_protocol_names() {
        assert_eq!(MessageKind::Request.to_string(), "REQUEST");
        assert_eq!(MessageKind::Grant.to_string(), "GRANT");
        assert_eq!(MessageKind::Release.to_string(), "RELEASE");
    }

    #[test]
    fn message_serializes_to_json() {
        let msg = Message::release(3, Utc::now());
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["kind"], "Release");
        assert_eq!(json["sender_id"], 3);
    }
}
