use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::timestamp::Timestamp;

/// Sender/recipient sentinel for runtime-originated traffic.
pub const SYSTEM_ID: &str = "system";

/// Bus-scoped monotonic message identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub(crate) u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg_{:06}", self.0)
    }
}

/// Mailbox dequeue priority. Higher priorities dequeue first.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum MessagePriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// Delivery status. `Pending` transitions to `Delivered` or `Timeout`;
/// both are terminal.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum MessageStatus {
    #[default]
    Pending,
    Delivered,
    Failed,
    Timeout,
}

/// A routed message. Once delivered, the history entry is immutable.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: MessageId,
    pub sender: String,
    pub recipient: String,
    pub content: String,
    pub message_type: String,
    pub priority: MessagePriority,
    pub timeout: Option<Duration>,
    pub created_at: Timestamp,
    pub delivered_at: Option<Timestamp>,
    pub status: MessageStatus,
    pub response_to: Option<MessageId>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Message {
    /// Seconds from creation to delivery, if delivered.
    pub fn delivery_time(&self) -> Option<f64> {
        self.delivered_at
            .map(|at| at.duration_since(&self.created_at).as_secs_f64())
    }
}

/// Aggregate bus counters, recomputed on each relevant event.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MessageStats {
    pub total_sent: u64,
    pub total_delivered: u64,
    pub total_failed: u64,
    pub total_timeout: u64,
    /// Rolling average over the last 100 deliveries, in seconds.
    pub average_delivery_time: f64,
    pub active_subscriptions: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_display() {
        assert_eq!(MessageId(1).to_string(), "msg_000001");
        assert_eq!(MessageId(123_456).to_string(), "msg_123456");
    }

    #[test]
    fn test_priority_ordering() {
        assert!(MessagePriority::Urgent > MessagePriority::High);
        assert!(MessagePriority::High > MessagePriority::Normal);
        assert!(MessagePriority::Normal > MessagePriority::Low);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(MessageStatus::Pending.to_string(), "pending");
        assert_eq!(MessageStatus::Timeout.to_string(), "timeout");
    }

    #[test]
    fn test_delivery_time() {
        let created = Timestamp::now();
        let delivered =
            Timestamp::from(created.into_inner() + chrono::Duration::milliseconds(500));
        let message = Message {
            id: MessageId(1),
            sender: "a".into(),
            recipient: "b".into(),
            content: "c".into(),
            message_type: "general".into(),
            priority: MessagePriority::Normal,
            timeout: None,
            created_at: created,
            delivered_at: Some(delivered),
            status: MessageStatus::Delivered,
            response_to: None,
            metadata: HashMap::new(),
        };
        assert_eq!(message.delivery_time(), Some(0.5));
    }
}
