//! Cross-module runtime scenarios: agents, bus, and registry working
//! against one injected runtime context.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use agentscript::bus::{MessagePriority, SendMessage, PENDING_NOT_FOUND};
use agentscript::tool::{Tool, ToolFactory, WebSearchTool};
use agentscript::{
    Agent, AgentStatus, BusConfig, MessageStatus, Runtime, RuntimeConfig, Value,
};

async fn runtime() -> Runtime {
    Runtime::new(RuntimeConfig::default()).await
}

async fn spawn_agent(runtime: &Runtime, name: &str) -> Arc<Agent> {
    Agent::new(runtime, name, "openai/gpt-4o", HashMap::new()).await
}

#[tokio::test]
async fn test_priority_receive_order_across_senders() {
    let runtime = runtime().await;
    let receiver = spawn_agent(&runtime, "receiver").await;
    let bus = runtime.bus();

    for (content, priority) in [
        ("first-low", MessagePriority::Low),
        ("then-urgent", MessagePriority::Urgent),
        ("then-normal", MessagePriority::Normal),
    ] {
        bus.send_message(
            SendMessage::new("peer", receiver.agent_id(), content, "general")
                .priority(priority),
        )
        .await
        .unwrap();
    }

    let mut order = Vec::new();
    while let Some(message) = bus.receive_message(receiver.agent_id(), None).await {
        order.push(message.content);
    }
    assert_eq!(order, ["then-urgent", "then-normal", "first-low"]);

    receiver.cleanup().await;
}

#[tokio::test]
async fn test_bounded_mailbox_never_exceeds_capacity() {
    let config = RuntimeConfig {
        bus: BusConfig {
            max_queue_size: 4,
            ..Default::default()
        },
        ..Default::default()
    };
    let runtime = Runtime::new(config).await;
    let agent = spawn_agent(&runtime, "bounded").await;
    let bus = runtime.bus();

    for i in 0..4 {
        assert!(bus
            .send_message(SendMessage::new(
                "peer",
                agent.agent_id(),
                format!("m{}", i),
                "general"
            ))
            .await
            .is_some());
        assert!(bus.pending_count(agent.agent_id()).await <= 4);
    }
    // the (max_queue_size + 1)-th send is rejected
    assert!(bus
        .send_message(SendMessage::new(
            "peer",
            agent.agent_id(),
            "overflow",
            "general"
        ))
        .await
        .is_none());
    assert_eq!(bus.pending_count(agent.agent_id()).await, 4);

    agent.cleanup().await;
}

#[tokio::test]
async fn test_status_restored_around_ask_and_tools() {
    let runtime = runtime().await;
    let agent = spawn_agent(&runtime, "worker").await;

    let before = agent.status().await;
    agent.ask("how are things", None).await.unwrap();
    assert_eq!(agent.status().await, before);

    agent
        .execute_tool("Calculator", &[Value::String("1 + 1".into())])
        .await
        .unwrap();
    assert_eq!(agent.status().await, before);

    let denied = agent.execute_tool("NotATool", &[]).await;
    assert!(denied.is_err());
    assert_eq!(agent.status().await, before);
    assert_eq!(before, AgentStatus::Idle);

    agent.cleanup().await;
}

#[tokio::test]
async fn test_unregistered_agent_is_unreachable() {
    let runtime = runtime().await;
    let agent = spawn_agent(&runtime, "leaver").await;
    let id = agent.agent_id().to_string();
    let bus = runtime.bus();

    agent.cleanup().await;

    assert_eq!(bus.pending_count(&id).await, PENDING_NOT_FOUND);
    assert!(bus
        .send_message(SendMessage::new("peer", &id, "too late", "general"))
        .await
        .is_none());

    // double cleanup stays quiet
    agent.cleanup().await;
    assert!(!bus.list_agents().await.contains(&id));
}

#[tokio::test]
async fn test_message_timeout_transitions_through_sweeper() {
    let config = RuntimeConfig {
        bus: BusConfig {
            sweep_interval: Duration::from_millis(20),
            ..Default::default()
        },
        ..Default::default()
    };
    let runtime = Runtime::new(config).await;
    let agent = spawn_agent(&runtime, "slow").await;
    let bus = runtime.bus();

    runtime.start().await;

    let id = bus
        .send_message(
            SendMessage::new("peer", agent.agent_id(), "expiring", "general")
                .timeout(Duration::from_millis(100)),
        )
        .await
        .unwrap();

    sleep(Duration::from_millis(250)).await;

    let history = bus.history(0).await;
    let entry = history.iter().find(|m| m.id == id).unwrap();
    assert_eq!(entry.status, MessageStatus::Timeout);
    assert_eq!(bus.statistics().await.total_timeout, 1);

    runtime.shutdown().await;
    agent.cleanup().await;
}

#[tokio::test]
async fn test_background_agents_exchange_ping_pong() {
    let runtime = runtime().await;
    let alpha = spawn_agent(&runtime, "alpha").await;
    let beta = spawn_agent(&runtime, "beta").await;
    let bus = runtime.bus();

    alpha.start_background_processing().await;
    beta.start_background_processing().await;

    let ping_id = bus
        .send_message(SendMessage::new(
            alpha.agent_id(),
            beta.agent_id(),
            "ping",
            "ping",
        ))
        .await
        .unwrap();

    sleep(Duration::from_millis(300)).await;

    // alpha's consumer drained the pong; find it in history instead
    let history = bus.agent_history(alpha.agent_id(), 0).await;
    let pong = history
        .iter()
        .find(|m| m.message_type == "pong")
        .expect("pong reply should be in history");
    assert_eq!(pong.response_to, Some(ping_id));
    assert_eq!(pong.sender, beta.agent_id());
    assert_eq!(pong.recipient, alpha.agent_id());

    alpha.cleanup().await;
    beta.cleanup().await;
}

#[tokio::test]
async fn test_tell_between_agents_lands_in_backup() {
    let runtime = runtime().await;
    let sender = spawn_agent(&runtime, "sender").await;
    let listener = spawn_agent(&runtime, "listener").await;

    listener.start_background_processing().await;

    runtime
        .bus()
        .send_message(SendMessage::new(
            sender.agent_id(),
            listener.agent_id(),
            "direct note",
            "tell",
        ))
        .await
        .unwrap();

    sleep(Duration::from_millis(300)).await;

    let backup = listener.pending_messages().await;
    assert!(backup.iter().any(|entry| entry.content == "direct note"));

    sender.cleanup().await;
    listener.cleanup().await;
}

#[tokio::test]
async fn test_broadcast_reaches_every_other_agent() {
    let runtime = runtime().await;
    let hub = spawn_agent(&runtime, "hub").await;
    let spoke_a = spawn_agent(&runtime, "spoke_a").await;
    let spoke_b = spawn_agent(&runtime, "spoke_b").await;
    let bus = runtime.bus();

    let sent = bus
        .broadcast_message(
            hub.agent_id(),
            "all hands",
            "broadcast",
            MessagePriority::High,
            &[],
        )
        .await;
    assert_eq!(sent.len(), 2);
    assert_eq!(bus.pending_count(hub.agent_id()).await, 0);

    for spoke in [&spoke_a, &spoke_b] {
        let message = bus.receive_message(spoke.agent_id(), None).await.unwrap();
        assert_eq!(message.content, "all hands");
        assert_eq!(message.priority, MessagePriority::High);
    }

    hub.cleanup().await;
    spoke_a.cleanup().await;
    spoke_b.cleanup().await;
}

#[tokio::test]
async fn test_plugin_tools_usable_by_agents() {
    let runtime = runtime().await;
    let agent = spawn_agent(&runtime, "plugged").await;
    let registry = runtime.tool_registry();

    let factory: ToolFactory = Arc::new(|| Arc::new(WebSearchTool) as Arc<dyn Tool>);
    let registered = registry
        .register_plugin("searchpack", vec![("DeepSearch".to_string(), factory)])
        .await;
    assert_eq!(registered, vec!["DeepSearch"]);

    assert!(agent.has_tool("DeepSearch").await);
    let result = agent
        .execute_tool("DeepSearch", &[Value::String("find it".into())])
        .await
        .unwrap();
    assert!(result.to_string().contains("find it"));

    let removed = registry.unregister_plugin("searchpack").await;
    assert_eq!(removed, vec!["DeepSearch"]);
    assert!(!agent.has_tool("DeepSearch").await);

    agent.cleanup().await;
}

#[tokio::test]
async fn test_tool_usage_accounting_across_agents() {
    let runtime = runtime().await;
    let first = spawn_agent(&runtime, "first").await;
    let second = spawn_agent(&runtime, "second").await;

    first
        .execute_tool("WebSearch", &[Value::String("a".into())])
        .await
        .unwrap();
    second
        .execute_tool("WebSearch", &[Value::String("b".into())])
        .await
        .unwrap();

    let stats = runtime.tool_registry().stats().await;
    assert_eq!(stats["WebSearch"].usage_count, 2);
    assert!(stats["WebSearch"].last_used.is_some());

    first.cleanup().await;
    second.cleanup().await;
}

#[tokio::test]
async fn test_concurrent_agent_operations_are_safe() {
    let runtime = Arc::new(runtime().await);
    let agent = spawn_agent(&runtime, "busy").await;

    let mut handles = Vec::new();
    for i in 0..5 {
        let agent = agent.clone();
        handles.push(tokio::spawn(async move {
            let response = agent.ask(&format!("task {}", i), None).await?;
            agent.tell(&format!("note {}", i)).await;
            let tool = agent
                .execute_tool("WebSearch", &[Value::String(format!("query {}", i))])
                .await?;
            Ok::<(String, Value), agentscript::AgentError>((response, tool))
        }));
    }

    for handle in handles {
        let (response, tool) = handle.await.unwrap().unwrap();
        assert!(response.contains("busy"));
        assert!(tool.to_string().contains("query"));
    }

    assert_eq!(agent.status().await, AgentStatus::Idle);
    assert_eq!(agent.pending_messages().await.len(), 5);

    agent.cleanup().await;
}
