//! Inter-agent messaging: per-agent bounded priority mailboxes, global
//! history, delivery statistics, and timeout sweeping.

mod mailbox;
mod message;
mod message_bus;

pub use message::{
    Message, MessageId, MessagePriority, MessageStats, MessageStatus, SYSTEM_ID,
};
pub use message_bus::{
    DeliveryCallback, MessageBus, SendMessage, SubscriptionId, PENDING_NOT_FOUND,
};
