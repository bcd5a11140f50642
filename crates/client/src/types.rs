use std::fmt;

use serde::{Deserialize, Serialize};

use super::ids::{ConversationId, MessageId, SenderId};

/// Monotonic per-conversation ordering key, in unix milliseconds.
///
/// Within one conversation every cached message carries a distinct key and
/// iteration in key order is the canonical reading order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct OrderingKey(pub i64);

impl OrderingKey {
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for OrderingKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Opaque position marker identifying where the next batch should start.
///
/// Consumers treat the token as opaque; the serving side encodes an ordering
/// key into it and `to_key` is the serving-side decode helper.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn from_key(key: OrderingKey) -> Self {
        Self(key.0.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_key(&self) -> Option<OrderingKey> {
        self.0.parse::<i64>().ok().map(OrderingKey::new)
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// One immutable chat message as delivered by the retrieval endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub ordering_key: OrderingKey,
    pub sender_id: SenderId,
    pub content: String,
    pub sent_at_unix_ms: i64,
}

impl MessageRecord {
    pub fn new(
        id: MessageId,
        conversation_id: ConversationId,
        ordering_key: OrderingKey,
        sender_id: SenderId,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id,
            conversation_id,
            ordering_key,
            sender_id,
            content: content.into(),
            sent_at_unix_ms: ordering_key.as_i64(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_roundtrips_an_ordering_key() {
        let key = OrderingKey::new(1_700_000_000_123);
        let cursor = Cursor::from_key(key);
        assert_eq!(cursor.to_key(), Some(key));
    }

    #[test]
    fn foreign_cursor_payload_stays_opaque() {
        let cursor = Cursor::new("eyJrZXkiOjQyfQ==");
        assert_eq!(cursor.to_key(), None);
        assert_eq!(cursor.as_str(), "eyJrZXkiOjQyfQ==");
    }

    #[test]
    fn message_record_uses_camel_case_on_the_wire() {
        let record = MessageRecord::new(
            MessageId::generate(),
            ConversationId::generate(),
            OrderingKey::new(42),
            SenderId::generate(),
            "hello",
        );

        let encoded = serde_json::to_string(&record).expect("record must serialize");
        assert!(encoded.contains("\"conversationId\""));
        assert!(encoded.contains("\"orderingKey\""));
        assert!(encoded.contains("\"sentAtUnixMs\""));

        let decoded: MessageRecord =
            serde_json::from_str(&encoded).expect("record must deserialize");
        assert_eq!(decoded, record);
    }
}
