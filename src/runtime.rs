//! Runtime context: the injected bundle of bus, tool registry, module
//! system, and response generator.
//!
//! There are no process-wide singletons; every interpreter and agent is
//! handed a `Runtime`, so tests construct isolated runtimes freely.

use std::sync::Arc;

use crate::bus::MessageBus;
use crate::config::RuntimeConfig;
use crate::module_system::ModuleSystem;
use crate::respond::{ResponseGenerator, StubResponder};
use crate::tool::{standard_tools, ToolInfo, ToolRegistry};

pub struct Runtime {
    bus: Arc<MessageBus>,
    tool_registry: Arc<ToolRegistry>,
    module_system: Arc<ModuleSystem>,
    responder: Arc<dyn ResponseGenerator>,
    config: RuntimeConfig,
}

impl Runtime {
    /// Builds a runtime with the deterministic stub responder.
    pub async fn new(config: RuntimeConfig) -> Self {
        Self::with_responder(config, Arc::new(StubResponder)).await
    }

    /// Builds a runtime around a concrete response-generation backend.
    pub async fn with_responder(
        config: RuntimeConfig,
        responder: Arc<dyn ResponseGenerator>,
    ) -> Self {
        let bus = Arc::new(MessageBus::new(config.bus.clone()));
        let tool_registry = Arc::new(ToolRegistry::new());
        for (name, factory) in standard_tools(&bus) {
            tool_registry
                .register(
                    &name,
                    factory,
                    ToolInfo::new(format!("standard library {} tool", name))
                        .tags(&["stdlib", "builtin"]),
                )
                .await;
        }
        let module_system = Arc::new(ModuleSystem::new(tool_registry.clone()));

        Self {
            bus,
            tool_registry,
            module_system,
            responder,
            config,
        }
    }

    pub fn bus(&self) -> Arc<MessageBus> {
        self.bus.clone()
    }

    pub fn tool_registry(&self) -> Arc<ToolRegistry> {
        self.tool_registry.clone()
    }

    pub fn module_system(&self) -> Arc<ModuleSystem> {
        self.module_system.clone()
    }

    pub fn responder(&self) -> Arc<dyn ResponseGenerator> {
        self.responder.clone()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Starts the bus timeout sweeper.
    pub async fn start(&self) {
        self.bus.start().await;
    }

    /// Stops background work. Agents are cleaned up by their owners.
    pub async fn shutdown(&self) {
        self.bus.stop().await;
    }
}
