use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use tokio::sync::Notify;

use super::message::Message;

/// Heap entry. Ordering: priority first, then insertion sequence, so equal
/// priorities dequeue in send order (stable tie-break).
#[derive(Debug)]
struct Queued {
    seq: u64,
    message: Message,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        self.message
            .priority
            .cmp(&other.message.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Bounded, priority-ordered per-agent queue. Owned by the bus and only
/// ever touched under the bus lock; the `Notify` handle lets a receiver
/// park outside the lock until a message arrives.
pub(crate) struct Mailbox {
    heap: BinaryHeap<Queued>,
    next_seq: u64,
    capacity: usize,
    notify: Arc<Notify>,
}

impl Mailbox {
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
            capacity,
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn is_full(&self) -> bool {
        self.heap.len() >= self.capacity
    }

    /// Enqueues unconditionally; callers check `is_full` first under the
    /// bus lock.
    pub fn push(&mut self, message: Message) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Queued { seq, message });
        self.notify.notify_one();
    }

    pub fn pop(&mut self) -> Option<Message> {
        self.heap.pop().map(|queued| queued.message)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn notify_handle(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    /// Wakes every parked receiver, e.g. so they can observe an
    /// unregistration.
    pub fn wake_all(&self) {
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::super::message::{MessageId, MessagePriority, MessageStatus};
    use super::*;
    use crate::timestamp::Timestamp;

    fn message(id: u64, priority: MessagePriority) -> Message {
        Message {
            id: MessageId(id),
            sender: "a".into(),
            recipient: "b".into(),
            content: format!("m{}", id),
            message_type: "general".into(),
            priority,
            timeout: None,
            created_at: Timestamp::now(),
            delivered_at: None,
            status: MessageStatus::Pending,
            response_to: None,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn test_priority_dequeue_order() {
        let mut mailbox = Mailbox::new(10);
        mailbox.push(message(1, MessagePriority::Low));
        mailbox.push(message(2, MessagePriority::Urgent));
        mailbox.push(message(3, MessagePriority::Normal));

        assert_eq!(mailbox.pop().unwrap().id, MessageId(2));
        assert_eq!(mailbox.pop().unwrap().id, MessageId(3));
        assert_eq!(mailbox.pop().unwrap().id, MessageId(1));
        assert!(mailbox.pop().is_none());
    }

    #[test]
    fn test_equal_priority_preserves_send_order() {
        let mut mailbox = Mailbox::new(10);
        for id in 1..=5 {
            mailbox.push(message(id, MessagePriority::Normal));
        }
        for id in 1..=5 {
            assert_eq!(mailbox.pop().unwrap().id, MessageId(id));
        }
    }

    #[test]
    fn test_capacity() {
        let mut mailbox = Mailbox::new(2);
        mailbox.push(message(1, MessagePriority::Normal));
        assert!(!mailbox.is_full());
        mailbox.push(message(2, MessagePriority::Normal));
        assert!(mailbox.is_full());
        assert_eq!(mailbox.len(), 2);
    }
}
