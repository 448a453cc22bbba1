//! Central tool catalog with lazy instantiation and usage accounting.
//!
//! All catalog and instance-cache mutation happens under one registry-wide
//! lock; a first use under concurrent callers constructs exactly one
//! instance. Execution itself runs outside the lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::eval::value::Value;
use crate::timestamp::Timestamp;

use super::{Tool, ToolError, ToolFactory, ToolResult};

/// Descriptive registration metadata.
#[derive(Debug, Clone)]
pub struct ToolInfo {
    pub description: String,
    pub version: String,
    pub author: String,
    pub tags: Vec<String>,
}

impl Default for ToolInfo {
    fn default() -> Self {
        Self {
            description: String::new(),
            version: "1.0.0".to_string(),
            author: "unknown".to_string(),
            tags: Vec::new(),
        }
    }
}

impl ToolInfo {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }
}

/// Usage snapshot exposed by [`ToolRegistry::stats`].
#[derive(Debug, Clone, Serialize)]
pub struct ToolStats {
    pub usage_count: u64,
    pub last_used: Option<Timestamp>,
    pub enabled: bool,
    pub tags: Vec<String>,
    pub version: String,
}

struct ToolRecord {
    factory: ToolFactory,
    info: ToolInfo,
    registered_at: Timestamp,
    usage_count: u64,
    last_used: Option<Timestamp>,
    enabled: bool,
}

#[derive(Default)]
struct RegistryState {
    tools: HashMap<String, ToolRecord>,
    instances: HashMap<String, Arc<dyn Tool>>,
    plugins: HashSet<String>,
}

/// Plugin-style catalog mapping tool names to capability implementations.
#[derive(Default)]
pub struct ToolRegistry {
    state: RwLock<RegistryState>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool factory. Returns false if the name is taken.
    pub async fn register(&self, name: &str, factory: ToolFactory, info: ToolInfo) -> bool {
        let mut state = self.state.write().await;
        if state.tools.contains_key(name) {
            return false;
        }
        state.tools.insert(
            name.to_string(),
            ToolRecord {
                factory,
                info,
                registered_at: Timestamp::now(),
                usage_count: 0,
                last_used: None,
                enabled: true,
            },
        );
        debug!(tool = name, "registered tool");
        true
    }

    /// Removes the record and any cached instance.
    pub async fn unregister(&self, name: &str) -> bool {
        let mut state = self.state.write().await;
        if state.tools.remove(name).is_none() {
            return false;
        }
        state.instances.remove(name);
        debug!(tool = name, "unregistered tool");
        true
    }

    /// Returns the cached instance, constructing it on first use. `None`
    /// if the name is unknown or the tool is disabled.
    pub async fn get_instance(&self, name: &str) -> Option<Arc<dyn Tool>> {
        let mut state = self.state.write().await;
        let enabled = state.tools.get(name).map(|record| record.enabled)?;
        if !enabled {
            return None;
        }
        if let Some(instance) = state.instances.get(name) {
            return Some(instance.clone());
        }
        let instance = state.tools.get(name).map(|record| (record.factory)())?;
        state
            .instances
            .insert(name.to_string(), instance.clone());
        Some(instance)
    }

    /// Resolves and executes a tool. Usage accounting is updated only when
    /// the execution succeeds.
    pub async fn execute(&self, name: &str, args: &[Value]) -> ToolResult<Value> {
        let instance = self
            .get_instance(name)
            .await
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        let result = instance.execute(args).await?;

        let mut state = self.state.write().await;
        if let Some(record) = state.tools.get_mut(name) {
            record.usage_count += 1;
            record.last_used = Some(Timestamp::now());
        }
        Ok(result)
    }

    pub async fn is_available(&self, name: &str) -> bool {
        let state = self.state.read().await;
        state
            .tools
            .get(name)
            .map(|record| record.enabled)
            .unwrap_or(false)
    }

    /// Lists tool names, sorted, optionally filtered by tag.
    pub async fn list(&self, tags: Option<&[String]>, enabled_only: bool) -> Vec<String> {
        let state = self.state.read().await;
        let mut names: Vec<String> = state
            .tools
            .iter()
            .filter(|(_, record)| !enabled_only || record.enabled)
            .filter(|(_, record)| match tags {
                None => true,
                Some(tags) => tags.iter().any(|tag| record.info.tags.contains(tag)),
            })
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub async fn enable(&self, name: &str) -> bool {
        let mut state = self.state.write().await;
        match state.tools.get_mut(name) {
            None => false,
            Some(record) => {
                record.enabled = true;
                true
            }
        }
    }

    /// Disables a tool and evicts its cached instance, so a later
    /// re-enable constructs a fresh one.
    pub async fn disable(&self, name: &str) -> bool {
        let mut state = self.state.write().await;
        match state.tools.get_mut(name) {
            None => false,
            Some(record) => {
                record.enabled = false;
                state.instances.remove(name);
                true
            }
        }
    }

    /// Registers a named group of tools under a plugin identity. Returns
    /// the names that were actually registered.
    pub async fn register_plugin(
        &self,
        plugin_name: &str,
        tools: Vec<(String, ToolFactory)>,
    ) -> Vec<String> {
        let mut registered = Vec::new();
        for (name, factory) in tools {
            let info = ToolInfo::new(format!("{} provided by the {} plugin", name, plugin_name))
                .author(plugin_name)
                .tags(&["plugin", plugin_name]);
            if self.register(&name, factory, info).await {
                registered.push(name);
            }
        }
        if !registered.is_empty() {
            self.state
                .write()
                .await
                .plugins
                .insert(plugin_name.to_string());
        }
        registered
    }

    /// Removes every tool tagged with the plugin identity.
    pub async fn unregister_plugin(&self, plugin_name: &str) -> Vec<String> {
        let plugin_tools: Vec<String> = {
            let state = self.state.read().await;
            state
                .tools
                .iter()
                .filter(|(_, record)| record.info.tags.iter().any(|tag| tag == plugin_name))
                .map(|(name, _)| name.clone())
                .collect()
        };

        let mut removed = Vec::new();
        for name in plugin_tools {
            if self.unregister(&name).await {
                removed.push(name);
            }
        }
        self.state.write().await.plugins.remove(plugin_name);
        removed
    }

    pub async fn list_plugins(&self) -> Vec<String> {
        let state = self.state.read().await;
        let mut plugins: Vec<String> = state.plugins.iter().cloned().collect();
        plugins.sort();
        plugins
    }

    pub async fn stats(&self) -> HashMap<String, ToolStats> {
        let state = self.state.read().await;
        state
            .tools
            .iter()
            .map(|(name, record)| {
                (
                    name.clone(),
                    ToolStats {
                        usage_count: record.usage_count,
                        last_used: record.last_used,
                        enabled: record.enabled,
                        tags: record.info.tags.clone(),
                        version: record.info.version.clone(),
                    },
                )
            })
            .collect()
    }

    pub async fn registered_at(&self, name: &str) -> Option<Timestamp> {
        let state = self.state.read().await;
        state.tools.get(name).map(|record| record.registered_at)
    }

    /// Drops every record, instance, and plugin identity.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.tools.clear();
        state.instances.clear();
        state.plugins.clear();
    }
}
