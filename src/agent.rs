//! The agent actor.
//!
//! An [`Agent`] is a thread-safe actor exposing the language-level
//! operations `ask`, `tell`, `has_tool`, and `execute_tool`, backed by the
//! tool registry and the message bus. Its status, property map, local tool
//! assignments, and tell-backup log form one unit guarded by a single
//! per-agent lock; that lock is never held across a call into the bus or
//! the registry, so the lock graph stays acyclic.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::bus::{Message, MessageBus, MessageId, SendMessage, SYSTEM_ID};
use crate::config::AgentConfig;
use crate::eval::value::Value;
use crate::respond::{RespondError, ResponderContext, ResponseGenerator};
use crate::runtime::Runtime;
use crate::timestamp::Timestamp;
use crate::tool::{Tool, ToolError, ToolRegistry};

/// Names that the generic property setter refuses to overwrite.
const RESERVED_PROPERTIES: [&str; 4] = ["status", "model", "name", "tools"];

/// Agent status machine: `Idle ⇄ Processing` around `ask`,
/// `Idle ⇄ UsingTool` around `execute_tool`. `Error` is a reachable
/// variant no operation currently drives.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Idle,
    Processing,
    UsingTool,
    Error,
}

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("agent '{agent}' does not have access to tool '{tool}'")]
    ToolAccess { agent: String, tool: String },

    #[error("cannot modify system property '{0}'")]
    ReadOnlyProperty(String),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Respond(#[from] RespondError),
}

pub type AgentResult<T> = Result<T, AgentError>;

/// One entry of the local tell-backup log.
#[derive(Debug, Clone)]
pub struct BackupEntry {
    pub timestamp: Timestamp,
    pub message_id: Option<MessageId>,
    pub content: String,
}

/// Read-only detail dump for the introspection boundary.
#[derive(Debug, Clone)]
pub struct AgentSnapshot {
    pub id: String,
    pub name: String,
    pub model: String,
    pub status: AgentStatus,
    pub properties: HashMap<String, Value>,
    pub tools: Vec<String>,
}

/// Bus-side summary for one agent.
#[derive(Debug, Clone, Serialize)]
pub struct AgentBusSummary {
    pub agent_id: String,
    pub pending: i64,
    pub total_messages: usize,
}

struct AgentInner {
    status: AgentStatus,
    properties: HashMap<String, Value>,
    assigned_tools: HashMap<String, Arc<dyn Tool>>,
    backup: Vec<BackupEntry>,
}

struct Consumer {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

pub struct Agent {
    id: String,
    name: String,
    model: String,
    inner: Arc<RwLock<AgentInner>>,
    consumer: Mutex<Option<Consumer>>,
    bus: Arc<MessageBus>,
    registry: Arc<ToolRegistry>,
    responder: Arc<dyn ResponseGenerator>,
    config: AgentConfig,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("model", &self.model)
            .finish()
    }
}

impl Agent {
    /// Constructs an agent and registers its id with the message bus.
    ///
    /// The id is derived from the declared name plus a fresh UUID, so two
    /// agents declared under the same name never collide.
    pub async fn new(
        runtime: &Runtime,
        name: &str,
        model: &str,
        properties: HashMap<String, Value>,
    ) -> Arc<Self> {
        let id = format!("{}_{}", name, Uuid::new_v4().simple());
        let agent = Arc::new(Self {
            id: id.clone(),
            name: name.to_string(),
            model: model.to_string(),
            inner: Arc::new(RwLock::new(AgentInner {
                status: AgentStatus::Idle,
                properties,
                assigned_tools: HashMap::new(),
                backup: Vec::new(),
            })),
            consumer: Mutex::new(None),
            bus: runtime.bus(),
            registry: runtime.tool_registry(),
            responder: runtime.responder(),
            config: runtime.config().agent.clone(),
        });

        if !agent.bus.register_agent(&id).await {
            // UUID collision would be required to get here.
            warn!(agent_id = %id, "agent id already registered with the bus");
        }
        debug!(agent_id = %id, model, "agent created");
        agent
    }

    pub fn agent_id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn status(&self) -> AgentStatus {
        self.inner.read().await.status
    }

    /// Reads a property. `status`, `model`, `name`, and the derived
    /// `tools` view resolve to system values; everything else is free-form
    /// storage.
    pub async fn get_property(&self, name: &str) -> Option<Value> {
        match name {
            "status" => Some(Value::String(self.status().await.to_string())),
            "model" => Some(Value::String(self.model.clone())),
            "name" => Some(Value::String(self.name.clone())),
            "tools" => {
                let inner = self.inner.read().await;
                let mut names: Vec<&str> =
                    inner.assigned_tools.keys().map(String::as_str).collect();
                names.sort_unstable();
                Some(Value::String(names.join(",")))
            }
            _ => self.inner.read().await.properties.get(name).cloned(),
        }
    }

    /// Writes a free-form property. Reserved names are rejected.
    pub async fn set_property(&self, name: &str, value: Value) -> AgentResult<()> {
        if RESERVED_PROPERTIES.contains(&name) {
            return Err(AgentError::ReadOnlyProperty(name.to_string()));
        }
        self.inner
            .write()
            .await
            .properties
            .insert(name.to_string(), value);
        Ok(())
    }

    /// Synchronous question/answer. Transitions the status to `Processing`
    /// for the duration of generation and restores the prior status even
    /// when generation fails. The exchange is logged as bus messages for
    /// observability.
    pub async fn ask(&self, message: &str, timeout: Option<Duration>) -> AgentResult<String> {
        let prior = self.begin_transition(AgentStatus::Processing).await;

        let request_id = self.log_observability("ask_request", message, None).await;

        let context = ResponderContext {
            agent_id: self.id.clone(),
            agent_name: self.name.clone(),
            model: self.model.clone(),
        };
        let generated = match timeout {
            None => self.responder.generate(&context, message).await,
            Some(limit) => {
                match tokio::time::timeout(limit, self.responder.generate(&context, message))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(RespondError::Timeout),
                }
            }
        };

        if let Ok(response) = &generated {
            let _ = self
                .log_observability("ask_response", response, request_id)
                .await;
        }

        self.restore_status(prior).await;
        generated.map_err(AgentError::from)
    }

    /// Asynchronous fire-and-forget note to self. An enqueue rejection is
    /// absorbed here (still visible in bus statistics); the backup log
    /// records the attempt either way.
    pub async fn tell(&self, message: &str) {
        let message_id = self
            .bus
            .send_message(SendMessage::new(&self.id, &self.id, message, "tell"))
            .await;
        if message_id.is_none() {
            debug!(agent_id = %self.id, "tell not enqueued, mailbox full");
        }
        self.inner.write().await.backup.push(BackupEntry {
            timestamp: Timestamp::now(),
            message_id,
            content: message.to_string(),
        });
    }

    /// True if the tool is assigned locally or available through the
    /// global registry.
    pub async fn has_tool(&self, name: &str) -> bool {
        if self.inner.read().await.assigned_tools.contains_key(name) {
            return true;
        }
        self.registry.is_available(name).await
    }

    /// Executes a tool the agent can access, preferring a local assignment
    /// over the registry. The status transitions to `UsingTool` for the
    /// duration and is restored on every exit path.
    pub async fn execute_tool(&self, name: &str, args: &[Value]) -> AgentResult<Value> {
        if !self.has_tool(name).await {
            return Err(AgentError::ToolAccess {
                agent: self.name.clone(),
                tool: name.to_string(),
            });
        }

        let prior = self.begin_transition(AgentStatus::UsingTool).await;

        let local = self.inner.read().await.assigned_tools.get(name).cloned();
        let result = match local {
            Some(tool) => tool.execute(args).await.map_err(AgentError::from),
            None => self.registry.execute(name, args).await.map_err(AgentError::from),
        };

        let _ = self
            .log_observability("tool_usage", &format!("used tool '{}'", name), None)
            .await;

        self.restore_status(prior).await;
        result
    }

    /// Assigns a tool locally, independent of the registry.
    pub async fn assign_tool(&self, name: &str, tool: Arc<dyn Tool>) -> bool {
        self.inner
            .write()
            .await
            .assigned_tools
            .insert(name.to_string(), tool);
        true
    }

    pub async fn remove_tool(&self, name: &str) -> bool {
        self.inner
            .write()
            .await
            .assigned_tools
            .remove(name)
            .is_some()
    }

    /// Caches a registry-backed instance as a local assignment.
    pub async fn register_with_registry(&self, name: &str) -> bool {
        match self.registry.get_instance(name).await {
            None => false,
            Some(instance) => self.assign_tool(name, instance).await,
        }
    }

    /// Starts the background consumer loop. Returns false if it is already
    /// running.
    ///
    /// The loop polls the bus with a short timeout and checks a
    /// cooperative shutdown flag between polls: `tell` messages are
    /// appended to the backup log, `ping` messages are answered with a
    /// `pong` referencing the original id.
    pub async fn start_background_processing(self: &Arc<Self>) -> bool {
        let mut consumer = self.consumer.lock().await;
        if consumer.is_some() {
            return false;
        }

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let agent = self.clone();
        let poll_timeout = self.config.poll_timeout;
        let handle = tokio::spawn(async move {
            loop {
                match shutdown_rx.try_recv() {
                    Ok(())
                    | Err(broadcast::error::TryRecvError::Closed) => break,
                    Err(_) => {}
                }
                if let Some(message) = agent
                    .bus
                    .receive_message(&agent.id, Some(poll_timeout))
                    .await
                {
                    agent.handle_background_message(message).await;
                }
            }
            debug!(agent_id = %agent.id, "background consumer stopped");
        });

        *consumer = Some(Consumer {
            shutdown_tx,
            handle,
        });
        debug!(agent_id = %self.id, "background consumer started");
        true
    }

    /// Signals the consumer loop and waits (bounded) for it to exit.
    /// Returns false if it was not running.
    pub async fn stop_background_processing(&self) -> bool {
        let consumer = self.consumer.lock().await.take();
        match consumer {
            None => false,
            Some(Consumer {
                shutdown_tx,
                handle,
            }) => {
                let _ = shutdown_tx.send(());
                if tokio::time::timeout(self.config.join_timeout, handle)
                    .await
                    .is_err()
                {
                    warn!(
                        agent_id = %self.id,
                        "background consumer did not stop within the bounded wait"
                    );
                }
                true
            }
        }
    }

    /// Stops the consumer loop if running and unregisters from the bus.
    /// Safe to call any number of times.
    pub async fn cleanup(&self) {
        self.stop_background_processing().await;
        self.bus.unregister_agent(&self.id).await;
        debug!(agent_id = %self.id, "agent cleaned up");
    }

    /// Snapshot of the local backup log.
    pub async fn pending_messages(&self) -> Vec<BackupEntry> {
        self.inner.read().await.backup.clone()
    }

    pub async fn clear_message_backup(&self) {
        self.inner.write().await.backup.clear();
    }

    /// Bus-side view of this agent for the introspection boundary.
    pub async fn message_bus_summary(&self) -> AgentBusSummary {
        AgentBusSummary {
            agent_id: self.id.clone(),
            pending: self.bus.pending_count(&self.id).await,
            total_messages: self.bus.agent_history(&self.id, 0).await.len(),
        }
    }

    /// Full read-only detail dump.
    pub async fn snapshot(&self) -> AgentSnapshot {
        let inner = self.inner.read().await;
        let mut tools: Vec<String> = inner.assigned_tools.keys().cloned().collect();
        tools.sort_unstable();
        AgentSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            model: self.model.clone(),
            status: inner.status,
            properties: inner.properties.clone(),
            tools,
        }
    }

    async fn handle_background_message(&self, message: Message) {
        match message.message_type.as_str() {
            "tell" => {
                self.inner.write().await.backup.push(BackupEntry {
                    timestamp: Timestamp::now(),
                    message_id: Some(message.id),
                    content: message.content,
                });
            }
            "ping" => {
                let reply = SendMessage::new(&self.id, &message.sender, "pong", "pong")
                    .response_to(message.id);
                if self.bus.send_message(reply).await.is_none() {
                    debug!(agent_id = %self.id, "pong reply could not be enqueued");
                }
            }
            other => {
                trace!(agent_id = %self.id, message_type = other, "ignoring message");
            }
        }
    }

    async fn begin_transition(&self, to: AgentStatus) -> AgentStatus {
        let mut inner = self.inner.write().await;
        let prior = inner.status;
        inner.status = to;
        prior
    }

    async fn restore_status(&self, prior: AgentStatus) {
        self.inner.write().await.status = prior;
    }

    /// Best-effort observability message, system → this agent. Rejections
    /// are absorbed.
    async fn log_observability(
        &self,
        message_type: &str,
        content: &str,
        response_to: Option<MessageId>,
    ) -> Option<MessageId> {
        let mut draft = SendMessage::new(SYSTEM_ID, &self.id, content, message_type);
        if let Some(id) = response_to {
            draft = draft.response_to(id);
        }
        self.bus.send_message(draft).await
    }
}
