//! # Message Bus
//!
//! Central router for inter-agent communication. Every registered agent id
//! owns a bounded, priority-ordered mailbox; a global history records every
//! accepted send; a background sweeper flips pending messages whose timeout
//! elapsed to [`MessageStatus::Timeout`].
//!
//! ## Concurrency contract
//!
//! All mutable state (the mailbox map, the subscriber map, history, and the
//! aggregate statistics) lives behind one bus-wide lock. A send checks
//! recipient existence and enqueues atomically with respect to a concurrent
//! unregistration of the same recipient. Receivers park on a per-mailbox
//! notifier *outside* the lock, so a blocking receive never stalls senders.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::config::BusConfig;
use crate::timestamp::Timestamp;

use super::mailbox::Mailbox;
use super::message::{Message, MessageId, MessagePriority, MessageStats, MessageStatus};

/// Delivery-notification callback. Held for introspection and statistics
/// only; the bus never invokes these on delivery.
pub type DeliveryCallback = Arc<dyn Fn(&Message) + Send + Sync>;

/// Handle returned by [`MessageBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Unregistered-agent sentinel returned by [`MessageBus::pending_count`].
pub const PENDING_NOT_FOUND: i64 = -1;

// Number of delivery samples kept for the rolling average.
const DELIVERY_WINDOW: usize = 100;

/// Draft of an outgoing message. The required fields are positional; the
/// optional tail is chained builder-style.
#[derive(Clone)]
pub struct SendMessage {
    sender: String,
    recipient: String,
    content: String,
    message_type: String,
    priority: MessagePriority,
    timeout: Option<Duration>,
    response_to: Option<MessageId>,
    metadata: HashMap<String, serde_json::Value>,
}

impl SendMessage {
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        content: impl Into<String>,
        message_type: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            content: content.into(),
            message_type: message_type.into(),
            priority: MessagePriority::Normal,
            timeout: None,
            response_to: None,
            metadata: HashMap::new(),
        }
    }

    pub fn priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn response_to(mut self, message_id: MessageId) -> Self {
        self.response_to = Some(message_id);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

struct BusState {
    mailboxes: HashMap<String, Mailbox>,
    subscribers: HashMap<String, Vec<(SubscriptionId, DeliveryCallback)>>,
    history: Vec<Message>,
    stats: MessageStats,
    message_counter: u64,
    subscription_counter: u64,
    delivery_times: VecDeque<f64>,
}

impl BusState {
    fn refresh_subscription_count(&mut self) {
        self.stats.active_subscriptions =
            self.subscribers.values().map(|subs| subs.len()).sum();
    }

    fn record_delivery(&mut self, message: &Message) {
        // History keeps the authoritative status; a message swept to
        // timeout stays timed out even if a receiver drains it later.
        if let Some(entry) = self
            .history
            .iter_mut()
            .rev()
            .find(|entry| entry.id == message.id)
        {
            if entry.status == MessageStatus::Pending {
                entry.status = MessageStatus::Delivered;
                entry.delivered_at = message.delivered_at;
            }
        }

        self.stats.total_delivered += 1;
        if let Some(secs) = message.delivery_time() {
            if self.delivery_times.len() >= DELIVERY_WINDOW {
                self.delivery_times.pop_front();
            }
            self.delivery_times.push_back(secs);
            self.stats.average_delivery_time =
                self.delivery_times.iter().sum::<f64>() / self.delivery_times.len() as f64;
        }
    }
}

/// Central message bus. Cheap to share behind an `Arc`.
pub struct MessageBus {
    state: Arc<Mutex<BusState>>,
    config: BusConfig,
    shutdown_tx: broadcast::Sender<()>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

impl MessageBus {
    pub fn new(config: BusConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            state: Arc::new(Mutex::new(BusState {
                mailboxes: HashMap::new(),
                subscribers: HashMap::new(),
                history: Vec::new(),
                stats: MessageStats::default(),
                message_counter: 0,
                subscription_counter: 0,
                delivery_times: VecDeque::new(),
            })),
            config,
            shutdown_tx,
            sweeper: Mutex::new(None),
        }
    }

    /// Creates an empty mailbox for `agent_id`. Returns false if the id is
    /// already registered.
    pub async fn register_agent(&self, agent_id: &str) -> bool {
        let mut state = self.state.lock().await;
        if state.mailboxes.contains_key(agent_id) {
            return false;
        }
        state
            .mailboxes
            .insert(agent_id.to_string(), Mailbox::new(self.config.max_queue_size));
        state.subscribers.insert(agent_id.to_string(), Vec::new());
        debug!(agent_id, "registered agent with message bus");
        true
    }

    /// Drops the mailbox and subscriptions for `agent_id`. Parked receivers
    /// are woken so they observe the removal. Returns false if unknown.
    pub async fn unregister_agent(&self, agent_id: &str) -> bool {
        let mut state = self.state.lock().await;
        let Some(mailbox) = state.mailboxes.remove(agent_id) else {
            return false;
        };
        mailbox.wake_all();
        state.subscribers.remove(agent_id);
        state.refresh_subscription_count();
        debug!(agent_id, "unregistered agent from message bus");
        true
    }

    /// Routes a message to its recipient's mailbox. Returns the assigned id,
    /// or `None` if the recipient is unknown or its mailbox is full.
    pub async fn send_message(&self, draft: SendMessage) -> Option<MessageId> {
        let mut state = self.state.lock().await;

        let is_full = match state.mailboxes.get(&draft.recipient) {
            None => {
                trace!(recipient = %draft.recipient, "send to unknown recipient");
                return None;
            }
            Some(mailbox) => mailbox.is_full(),
        };
        if is_full {
            state.stats.total_failed += 1;
            debug!(recipient = %draft.recipient, "mailbox full, send rejected");
            return None;
        }

        state.message_counter += 1;
        let id = MessageId(state.message_counter);
        let message = Message {
            id,
            sender: draft.sender,
            recipient: draft.recipient,
            content: draft.content,
            message_type: draft.message_type,
            priority: draft.priority,
            timeout: draft.timeout,
            created_at: Timestamp::now(),
            delivered_at: None,
            status: MessageStatus::Pending,
            response_to: draft.response_to,
            metadata: draft.metadata,
        };

        if let Some(mailbox) = state.mailboxes.get_mut(&message.recipient) {
            mailbox.push(message.clone());
        }
        state.history.push(message);
        state.stats.total_sent += 1;
        Some(id)
    }

    /// Pops the highest-priority message for `agent_id`. With a timeout,
    /// blocks up to that duration while the mailbox is empty; without one,
    /// returns immediately. `None` on unknown id, empty mailbox, or elapsed
    /// timeout.
    pub async fn receive_message(
        &self,
        agent_id: &str,
        timeout: Option<Duration>,
    ) -> Option<Message> {
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);

        loop {
            let notify = {
                let mut state = self.state.lock().await;
                let popped = match state.mailboxes.get_mut(agent_id) {
                    None => return None,
                    Some(mailbox) => mailbox.pop(),
                };
                if let Some(mut message) = popped {
                    message.delivered_at = Some(Timestamp::now());
                    message.status = MessageStatus::Delivered;
                    state.record_delivery(&message);
                    trace!(agent_id, id = %message.id, "delivered message");
                    return Some(message);
                }
                match state.mailboxes.get(agent_id) {
                    None => return None,
                    Some(mailbox) => mailbox.notify_handle(),
                }
            };

            let deadline = deadline?;
            let remaining =
                deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return None;
            }
            // A send racing past this point is caught by the stored permit
            // in the notifier.
            let _ = tokio::time::timeout(remaining, notify.notified()).await;
        }
    }

    /// Current mailbox size, or [`PENDING_NOT_FOUND`] if unregistered.
    pub async fn pending_count(&self, agent_id: &str) -> i64 {
        let state = self.state.lock().await;
        state
            .mailboxes
            .get(agent_id)
            .map(|mailbox| mailbox.len() as i64)
            .unwrap_or(PENDING_NOT_FOUND)
    }

    /// Sends to every registered id except the sender and the excluded ids.
    /// A full mailbox skips that recipient without aborting the rest.
    pub async fn broadcast_message(
        &self,
        sender: &str,
        content: &str,
        message_type: &str,
        priority: MessagePriority,
        exclude: &[String],
    ) -> Vec<MessageId> {
        let recipients: Vec<String> = {
            let state = self.state.lock().await;
            state
                .mailboxes
                .keys()
                .filter(|id| id.as_str() != sender && !exclude.contains(*id))
                .cloned()
                .collect()
        };

        let mut sent = Vec::new();
        for recipient in recipients {
            let draft = SendMessage::new(sender, recipient, content, message_type)
                .priority(priority);
            if let Some(id) = self.send_message(draft).await {
                sent.push(id);
            }
        }
        sent
    }

    /// Registers a delivery-notification callback for `agent_id`.
    /// Bookkeeping only, see [`DeliveryCallback`]. `None` if unknown.
    pub async fn subscribe(
        &self,
        agent_id: &str,
        callback: DeliveryCallback,
    ) -> Option<SubscriptionId> {
        let mut state = self.state.lock().await;
        if !state.subscribers.contains_key(agent_id) {
            return None;
        }
        state.subscription_counter += 1;
        let id = SubscriptionId(state.subscription_counter);
        if let Some(subs) = state.subscribers.get_mut(agent_id) {
            subs.push((id, callback));
        }
        state.refresh_subscription_count();
        Some(id)
    }

    /// Removes a previously registered callback. False if the agent or the
    /// subscription is unknown.
    pub async fn unsubscribe(&self, agent_id: &str, subscription: SubscriptionId) -> bool {
        let mut state = self.state.lock().await;
        let removed = match state.subscribers.get_mut(agent_id) {
            None => false,
            Some(subs) => {
                let before = subs.len();
                subs.retain(|(id, _)| *id != subscription);
                subs.len() != before
            }
        };
        if removed {
            state.refresh_subscription_count();
        }
        removed
    }

    /// Recent history, oldest first. `limit == 0` returns everything.
    pub async fn history(&self, limit: usize) -> Vec<Message> {
        let state = self.state.lock().await;
        let start = if limit == 0 {
            0
        } else {
            state.history.len().saturating_sub(limit)
        };
        state.history[start..].to_vec()
    }

    /// Recent history involving `agent_id` as sender or recipient.
    pub async fn agent_history(&self, agent_id: &str, limit: usize) -> Vec<Message> {
        let state = self.state.lock().await;
        let involved: Vec<Message> = state
            .history
            .iter()
            .filter(|m| m.sender == agent_id || m.recipient == agent_id)
            .cloned()
            .collect();
        let start = if limit == 0 {
            0
        } else {
            involved.len().saturating_sub(limit)
        };
        involved[start..].to_vec()
    }

    pub async fn statistics(&self) -> MessageStats {
        self.state.lock().await.stats.clone()
    }

    pub async fn list_agents(&self) -> Vec<String> {
        self.state.lock().await.mailboxes.keys().cloned().collect()
    }

    pub async fn is_registered(&self, agent_id: &str) -> bool {
        self.state.lock().await.mailboxes.contains_key(agent_id)
    }

    /// Clears history and resets the counters. Live registrations and
    /// subscriptions are kept.
    pub async fn clear_history(&self) {
        let mut state = self.state.lock().await;
        state.history.clear();
        state.delivery_times.clear();
        state.stats = MessageStats::default();
        state.refresh_subscription_count();
    }

    /// Starts the timeout sweeper. Idempotent.
    pub async fn start(&self) {
        let mut sweeper = self.sweeper.lock().await;
        if sweeper.is_some() {
            return;
        }

        let state = self.state.clone();
        let interval = self.config.sweep_interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => sweep_timeouts(&state).await,
                }
            }
            debug!("timeout sweeper stopped");
        });
        *sweeper = Some(handle);
        debug!("timeout sweeper started");
    }

    /// Signals the sweeper and waits (bounded) for it to exit.
    pub async fn stop(&self) {
        let handle = self.sweeper.lock().await.take();
        if let Some(handle) = handle {
            let _ = self.shutdown_tx.send(());
            if tokio::time::timeout(self.config.stop_timeout, handle)
                .await
                .is_err()
            {
                warn!("timeout sweeper did not stop within the bounded wait");
            }
        }
    }

    /// Runs one sweep pass immediately, outside the background cadence.
    pub async fn sweep_now(&self) {
        sweep_timeouts(&self.state).await;
    }
}

/// Flips pending messages with an elapsed timeout to `Timeout`. Touches
/// only message status and counters under the bus lock; mailbox contents
/// are left alone.
async fn sweep_timeouts(state: &Arc<Mutex<BusState>>) {
    let mut state = state.lock().await;
    let mut swept = 0u64;
    for message in state.history.iter_mut() {
        if message.status != MessageStatus::Pending {
            continue;
        }
        if let Some(timeout) = message.timeout {
            if message.created_at.elapsed() > timeout {
                message.status = MessageStatus::Timeout;
                swept += 1;
            }
        }
    }
    if swept > 0 {
        state.stats.total_timeout += swept;
        debug!(swept, "messages timed out");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::time::sleep;

    use super::*;

    fn bus() -> MessageBus {
        MessageBus::default()
    }

    fn small_bus(max_queue_size: usize) -> MessageBus {
        MessageBus::new(BusConfig {
            max_queue_size,
            sweep_interval: Duration::from_millis(20),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_register_and_duplicate() {
        let bus = bus();
        assert!(bus.register_agent("a").await);
        assert!(!bus.register_agent("a").await);
        assert!(bus.is_registered("a").await);
    }

    #[tokio::test]
    async fn test_send_to_unknown_recipient() {
        let bus = bus();
        let id = bus
            .send_message(SendMessage::new("x", "nobody", "hi", "general"))
            .await;
        assert!(id.is_none());
    }

    #[tokio::test]
    async fn test_priority_delivery_order() {
        let bus = bus();
        bus.register_agent("a").await;

        for (content, priority) in [
            ("low", MessagePriority::Low),
            ("urgent", MessagePriority::Urgent),
            ("normal", MessagePriority::Normal),
        ] {
            bus.send_message(
                SendMessage::new("x", "a", content, "general").priority(priority),
            )
            .await
            .unwrap();
        }

        let order: Vec<String> = [
            bus.receive_message("a", None).await.unwrap().content,
            bus.receive_message("a", None).await.unwrap().content,
            bus.receive_message("a", None).await.unwrap().content,
        ]
        .into();
        assert_eq!(order, ["urgent", "normal", "low"]);
    }

    #[tokio::test]
    async fn test_mailbox_capacity_rejects_overflow() {
        let bus = small_bus(3);
        bus.register_agent("a").await;

        for i in 0..3 {
            assert!(bus
                .send_message(SendMessage::new("x", "a", format!("m{}", i), "general"))
                .await
                .is_some());
        }
        assert!(bus
            .send_message(SendMessage::new("x", "a", "overflow", "general"))
            .await
            .is_none());
        assert_eq!(bus.pending_count("a").await, 3);
        assert_eq!(bus.statistics().await.total_failed, 1);
    }

    #[tokio::test]
    async fn test_unregister_drains_and_sends_fail() {
        let bus = bus();
        bus.register_agent("a").await;
        bus.send_message(SendMessage::new("x", "a", "hi", "general"))
            .await
            .unwrap();

        assert!(bus.unregister_agent("a").await);
        assert!(!bus.unregister_agent("a").await);
        assert_eq!(bus.pending_count("a").await, PENDING_NOT_FOUND);
        assert!(bus
            .send_message(SendMessage::new("x", "a", "hi", "general"))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_receive_blocks_until_send() {
        let bus = Arc::new(bus());
        bus.register_agent("a").await;

        let sender = bus.clone();
        let task = tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            sender
                .send_message(SendMessage::new("x", "a", "late", "general"))
                .await
        });

        let received = bus
            .receive_message("a", Some(Duration::from_secs(1)))
            .await
            .unwrap();
        assert_eq!(received.content, "late");
        assert_eq!(received.status, MessageStatus::Delivered);
        assert!(received.delivered_at.is_some());
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_receive_timeout_elapses() {
        let bus = bus();
        bus.register_agent("a").await;
        let received = bus
            .receive_message("a", Some(Duration::from_millis(50)))
            .await;
        assert!(received.is_none());
    }

    #[tokio::test]
    async fn test_broadcast_excludes_sender_and_listed() {
        let bus = bus();
        for id in ["a", "b", "c", "d"] {
            bus.register_agent(id).await;
        }

        let sent = bus
            .broadcast_message(
                "a",
                "fanout",
                "broadcast",
                MessagePriority::Normal,
                &["c".to_string()],
            )
            .await;
        assert_eq!(sent.len(), 2);
        assert_eq!(bus.pending_count("a").await, 0);
        assert_eq!(bus.pending_count("b").await, 1);
        assert_eq!(bus.pending_count("c").await, 0);
        assert_eq!(bus.pending_count("d").await, 1);
    }

    #[tokio::test]
    async fn test_timeout_sweep() {
        let bus = small_bus(10);
        bus.register_agent("a").await;
        bus.send_message(
            SendMessage::new("x", "a", "will expire", "general")
                .timeout(Duration::from_millis(30)),
        )
        .await
        .unwrap();

        sleep(Duration::from_millis(60)).await;
        bus.sweep_now().await;

        let history = bus.history(0).await;
        assert_eq!(history[0].status, MessageStatus::Timeout);
        assert_eq!(bus.statistics().await.total_timeout, 1);
    }

    #[tokio::test]
    async fn test_background_sweeper_loop() {
        let bus = small_bus(10);
        bus.register_agent("a").await;
        bus.start().await;
        bus.start().await; // idempotent

        bus.send_message(
            SendMessage::new("x", "a", "expiring", "general")
                .timeout(Duration::from_millis(20)),
        )
        .await
        .unwrap();

        sleep(Duration::from_millis(120)).await;
        assert_eq!(bus.statistics().await.total_timeout, 1);
        bus.stop().await;
    }

    #[tokio::test]
    async fn test_timeout_is_terminal_in_history() {
        let bus = small_bus(10);
        bus.register_agent("a").await;
        bus.send_message(
            SendMessage::new("x", "a", "late pickup", "general")
                .timeout(Duration::from_millis(10)),
        )
        .await
        .unwrap();

        sleep(Duration::from_millis(30)).await;
        bus.sweep_now().await;

        // The receiver still drains the mailbox copy, but history keeps
        // the timeout verdict.
        let received = bus.receive_message("a", None).await.unwrap();
        assert_eq!(received.status, MessageStatus::Delivered);
        let history = bus.history(0).await;
        assert_eq!(history[0].status, MessageStatus::Timeout);
    }

    #[tokio::test]
    async fn test_subscriptions_are_bookkeeping_only() {
        let bus = bus();
        bus.register_agent("a").await;

        let invocations = Arc::new(AtomicUsize::new(0));
        let counter = invocations.clone();
        let callback: DeliveryCallback = Arc::new(move |_msg| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let sub = bus.subscribe("a", callback).await.unwrap();
        assert_eq!(bus.statistics().await.active_subscriptions, 1);

        bus.send_message(SendMessage::new("x", "a", "hi", "general"))
            .await
            .unwrap();
        bus.receive_message("a", None).await.unwrap();
        assert_eq!(invocations.load(Ordering::SeqCst), 0);

        assert!(bus.unsubscribe("a", sub).await);
        assert!(!bus.unsubscribe("a", sub).await);
        assert_eq!(bus.statistics().await.active_subscriptions, 0);
    }

    #[tokio::test]
    async fn test_history_views() {
        let bus = bus();
        bus.register_agent("a").await;
        bus.register_agent("b").await;

        for i in 0..5 {
            bus.send_message(SendMessage::new("a", "b", format!("m{}", i), "general"))
                .await
                .unwrap();
        }
        bus.send_message(SendMessage::new("b", "a", "reply", "general"))
            .await
            .unwrap();

        let tail = bus.history(2).await;
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[1].content, "reply");

        let about_a = bus.agent_history("a", 0).await;
        assert_eq!(about_a.len(), 6);

        let ids: Vec<u64> = bus.history(0).await.iter().map(|m| m.id.0).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn test_concurrent_sends_are_all_accounted() {
        let bus = Arc::new(bus());
        bus.register_agent("a").await;

        let mut handles = Vec::new();
        for i in 0..20 {
            let bus = bus.clone();
            handles.push(tokio::spawn(async move {
                bus.send_message(SendMessage::new("x", "a", format!("m{}", i), "general"))
                    .await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_some());
        }

        assert_eq!(bus.pending_count("a").await, 20);
        assert_eq!(bus.statistics().await.total_sent, 20);
    }

    #[tokio::test]
    async fn test_delivery_statistics() {
        let bus = bus();
        bus.register_agent("a").await;
        bus.send_message(SendMessage::new("x", "a", "hi", "general"))
            .await
            .unwrap();
        bus.receive_message("a", None).await.unwrap();

        let stats = bus.statistics().await;
        assert_eq!(stats.total_sent, 1);
        assert_eq!(stats.total_delivered, 1);
        assert!(stats.average_delivery_time >= 0.0);
    }
}
