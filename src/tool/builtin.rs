//! Standard tool set.
//!
//! These are deterministic stand-ins: each one honors the `execute`
//! contract and produces a result derived from its inputs, which is all
//! the runtime and its tests depend on. Real search/file/calculator
//! backends are drop-in replacements behind the same trait.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::bus::{MessageBus, SendMessage};
use crate::eval::value::Value;

use super::{optional_string_arg, string_arg, Tool, ToolError, ToolFactory, ToolResult};

/// Stand-in web search.
#[derive(Default)]
pub struct WebSearchTool;

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "WebSearch"
    }

    async fn execute(&self, args: &[Value]) -> ToolResult<Value> {
        let query = string_arg(self.name(), args, 0, "query")?;
        Ok(Value::String(format!("search results for \"{}\"", query)))
    }
}

/// Stand-in calculator.
#[derive(Default)]
pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "Calculator"
    }

    async fn execute(&self, args: &[Value]) -> ToolResult<Value> {
        let expression = string_arg(self.name(), args, 0, "expression")?;
        Ok(Value::String(format!(
            "calculated result for \"{}\"",
            expression
        )))
    }
}

/// Stand-in file operations.
#[derive(Default)]
pub struct FileManagerTool;

#[async_trait]
impl Tool for FileManagerTool {
    fn name(&self) -> &str {
        "FileManager"
    }

    async fn execute(&self, args: &[Value]) -> ToolResult<Value> {
        let operation = string_arg(self.name(), args, 0, "operation")?;
        Ok(Value::String(format!(
            "file operation \"{}\" completed",
            operation
        )))
    }
}

/// Routes a message to another agent through the message bus.
///
/// The routing scope is a list of agent *names*; targets are matched
/// against registered bus ids, which carry a `{name}_{uuid}` shape.
pub struct AgentRoutingTool {
    bus: Arc<MessageBus>,
    agents: Vec<String>,
}

impl AgentRoutingTool {
    pub fn new(bus: Arc<MessageBus>, agents: Vec<String>) -> Self {
        Self { bus, agents }
    }

    pub fn routing_targets(&self) -> &[String] {
        &self.agents
    }

    async fn resolve_target_id(&self, target: &str) -> Option<String> {
        let prefix = format!("{}_", target);
        self.bus
            .list_agents()
            .await
            .into_iter()
            .find(|id| id == target || id.starts_with(&prefix))
    }
}

#[async_trait]
impl Tool for AgentRoutingTool {
    fn name(&self) -> &str {
        "AgentRouting"
    }

    /// Arguments: message, optional target agent name, optional sender id.
    /// Without an explicit target, the first scoped agent is used.
    async fn execute(&self, args: &[Value]) -> ToolResult<Value> {
        let message = string_arg(self.name(), args, 0, "message")?;
        let explicit = optional_string_arg(self.name(), args, 1, "target agent")?;
        let sender = optional_string_arg(self.name(), args, 2, "sender")?.unwrap_or("system");

        let target = explicit
            .map(str::to_string)
            .or_else(|| self.agents.first().cloned())
            .ok_or_else(|| ToolError::ExecutionFailed {
                tool: self.name().to_string(),
                message: "no target agent specified or available".to_string(),
            })?;

        let target_id = self.resolve_target_id(&target).await.ok_or_else(|| {
            ToolError::ExecutionFailed {
                tool: self.name().to_string(),
                message: format!("agent '{}' is not registered with the bus", target),
            }
        })?;

        let message_id = self
            .bus
            .send_message(SendMessage::new(sender, &target_id, message, "routed_message"))
            .await
            .ok_or_else(|| ToolError::ExecutionFailed {
                tool: self.name().to_string(),
                message: format!("could not enqueue for '{}', mailbox may be full", target),
            })?;

        debug!(target = %target_id, %message_id, "routed message");
        Ok(Value::String(format!(
            "routed to '{}' ({}) as {}",
            target, target_id, message_id
        )))
    }
}

/// The standard tool set wired into a fresh registry: name plus factory.
/// `AgentRouting` closes over the bus handle with an empty routing scope;
/// scoped instances are assigned locally by the interpreter.
pub fn standard_tools(bus: &Arc<MessageBus>) -> Vec<(String, ToolFactory)> {
    let routing_bus = bus.clone();
    vec![
        (
            "WebSearch".to_string(),
            Arc::new(|| Arc::new(WebSearchTool) as Arc<dyn Tool>) as ToolFactory,
        ),
        (
            "FileManager".to_string(),
            Arc::new(|| Arc::new(FileManagerTool) as Arc<dyn Tool>) as ToolFactory,
        ),
        (
            "Calculator".to_string(),
            Arc::new(|| Arc::new(CalculatorTool) as Arc<dyn Tool>) as ToolFactory,
        ),
        (
            "AgentRouting".to_string(),
            Arc::new(move || {
                Arc::new(AgentRoutingTool::new(routing_bus.clone(), Vec::new()))
                    as Arc<dyn Tool>
            }) as ToolFactory,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_web_search_reflects_query() {
        let result = WebSearchTool
            .execute(&[Value::String("rust actors".into())])
            .await
            .unwrap();
        assert_eq!(
            result,
            Value::String("search results for \"rust actors\"".into())
        );
    }

    #[tokio::test]
    async fn test_missing_argument_is_rejected() {
        let result = CalculatorTool.execute(&[]).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments { .. })));
    }

    #[tokio::test]
    async fn test_non_string_argument_is_rejected() {
        let result = FileManagerTool.execute(&[Value::Number(1.0)]).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments { .. })));
    }

    #[tokio::test]
    async fn test_routing_delivers_through_bus() {
        let bus = Arc::new(MessageBus::default());
        bus.register_agent("worker_abc123").await;

        let tool = AgentRoutingTool::new(bus.clone(), vec!["worker".to_string()]);
        let result = tool
            .execute(&[Value::String("do the thing".into())])
            .await
            .unwrap();
        assert!(result.to_string().contains("worker_abc123"));

        let received = bus.receive_message("worker_abc123", None).await.unwrap();
        assert_eq!(received.content, "do the thing");
        assert_eq!(received.message_type, "routed_message");
        assert_eq!(received.sender, "system");
    }

    #[tokio::test]
    async fn test_routing_explicit_target_overrides_scope() {
        let bus = Arc::new(MessageBus::default());
        bus.register_agent("a_1").await;
        bus.register_agent("b_1").await;

        let tool = AgentRoutingTool::new(bus.clone(), vec!["a".to_string()]);
        tool.execute(&[
            Value::String("ping".into()),
            Value::String("b".into()),
            Value::String("a_1".into()),
        ])
        .await
        .unwrap();

        let received = bus.receive_message("b_1", None).await.unwrap();
        assert_eq!(received.sender, "a_1");
    }

    #[tokio::test]
    async fn test_routing_without_target_fails() {
        let bus = Arc::new(MessageBus::default());
        let tool = AgentRoutingTool::new(bus, Vec::new());
        let result = tool.execute(&[Value::String("orphan".into())]).await;
        assert!(matches!(result, Err(ToolError::ExecutionFailed { .. })));
    }
}
