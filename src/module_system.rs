//! Import resolution for the interpreter.
//!
//! A dotted module path selects a namespace by its segments: paths naming
//! `tools` resolve against the tool registry's catalog, paths naming
//! `agents` resolve against the known agent-type set. Resolution produces
//! typed bindings for the interpreter's global scope.

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;

use crate::tool::ToolRegistry;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("unknown module '{0}'")]
    UnknownModule(String),

    #[error("cannot import '{name}' from '{module}'")]
    UnknownName { module: String, name: String },
}

pub type ImportResult<T> = Result<T, ImportError>;

/// A name resolved through an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleBinding {
    Tool(String),
    AgentType(String),
}

pub struct ModuleSystem {
    registry: Arc<ToolRegistry>,
    agent_types: Vec<String>,
    imported: DashMap<String, Vec<String>>,
}

impl ModuleSystem {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            agent_types: vec!["SupervisorAgent".to_string()],
            imported: DashMap::new(),
        }
    }

    /// Resolves `names` out of the module at `path` into typed bindings.
    pub async fn resolve(
        &self,
        path: &[String],
        names: &[String],
    ) -> ImportResult<Vec<(String, ModuleBinding)>> {
        let module = path.join(".");
        let is_tools = path.iter().any(|segment| segment == "tools");
        let is_agents = path.iter().any(|segment| segment == "agents");
        if !is_tools && !is_agents {
            return Err(ImportError::UnknownModule(module));
        }

        let mut bindings = Vec::with_capacity(names.len());
        for name in names {
            let binding = if is_tools {
                if !self.registry.is_available(name).await {
                    return Err(ImportError::UnknownName {
                        module: module.clone(),
                        name: name.clone(),
                    });
                }
                ModuleBinding::Tool(name.clone())
            } else {
                if !self.agent_types.contains(name) {
                    return Err(ImportError::UnknownName {
                        module: module.clone(),
                        name: name.clone(),
                    });
                }
                ModuleBinding::AgentType(name.clone())
            };
            bindings.push((name.clone(), binding));
        }

        debug!(module = %module, count = bindings.len(), "resolved imports");
        self.imported.insert(module, names.to_vec());
        Ok(bindings)
    }

    pub fn is_agent_type(&self, name: &str) -> bool {
        self.agent_types.iter().any(|t| t == name)
    }

    pub fn imported_modules(&self) -> Vec<String> {
        let mut modules: Vec<String> =
            self.imported.iter().map(|entry| entry.key().clone()).collect();
        modules.sort();
        modules
    }

    pub fn clear_imports(&self) {
        self.imported.clear();
    }
}
