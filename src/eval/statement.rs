use std::collections::HashMap;
use std::sync::Arc;

use async_recursion::async_recursion;
use tracing::debug;

use crate::agent::Agent;
use crate::ast::{ConfigPair, Statement, ToolSpec};
use crate::module_system::ModuleBinding;
use crate::output::OutputSink;
use crate::tool::AgentRoutingTool;

use super::value::Value;
use super::{Binding, EvalError, EvalResult, Interpreter};

impl Interpreter {
    #[async_recursion]
    pub(crate) async fn execute_statement(&mut self, statement: &Statement) -> EvalResult<()> {
        match statement {
            Statement::AgentDecl { name, constructor } => {
                self.execute_agent_decl(name, &constructor.model.path, &constructor.config)
                    .await
            }
            Statement::Import { path, names } => self.execute_import(path, names).await,
            Statement::PropertyAssignment {
                agent,
                property,
                value,
            } => self.execute_property_assignment(agent, property, value).await,
            Statement::ToolAssignment { agent, tools } => {
                self.execute_tool_assignment(agent, tools).await
            }
            Statement::VariableAssignment { name, value } => {
                let value = self.evaluate_expression(value).await?;
                self.locals.insert(name.clone(), value);
                Ok(())
            }
            Statement::If {
                condition,
                then_block,
                else_block,
            } => {
                let condition = self.evaluate_expression(condition).await?;
                let branch = if condition.is_truthy() {
                    Some(then_block)
                } else {
                    else_block.as_ref()
                };
                if let Some(statements) = branch {
                    for statement in statements {
                        self.execute_statement(statement).await?;
                    }
                }
                Ok(())
            }
            Statement::Print(expression) => {
                let value = self.evaluate_expression(expression).await?;
                self.sink.write_line(&value.to_string());
                Ok(())
            }
            Statement::Expression(expression) => {
                self.evaluate_expression(expression).await?;
                Ok(())
            }
        }
    }

    async fn execute_agent_decl(
        &mut self,
        name: &str,
        model: &str,
        config: &[ConfigPair],
    ) -> EvalResult<()> {
        let mut properties = HashMap::new();
        for pair in config {
            let value = self.evaluate_expression(&pair.value).await?;
            properties.insert(pair.key.clone(), value);
        }

        let agent = Agent::new(&self.runtime, name, model, properties).await;
        self.agents.insert(name.to_string(), agent.clone());
        self.globals
            .insert(name.to_string(), Binding::Value(Value::Agent(agent)));

        self.spawn_counter += 1;
        self.sink.write_line(&format!(
            "agent '{}' spawned (agent_{:03})",
            name, self.spawn_counter
        ));
        Ok(())
    }

    async fn execute_import(&mut self, path: &[String], names: &[String]) -> EvalResult<()> {
        let bindings = self
            .runtime
            .module_system()
            .resolve(path, names)
            .await?;
        for (name, binding) in bindings {
            let binding = match binding {
                ModuleBinding::Tool(tool) => Binding::Tool(tool),
                ModuleBinding::AgentType(agent_type) => Binding::AgentType(agent_type),
            };
            self.globals.insert(name, binding);
        }
        Ok(())
    }

    async fn execute_property_assignment(
        &mut self,
        agent_name: &str,
        property: &str,
        value: &crate::ast::Expression,
    ) -> EvalResult<()> {
        let agent = self
            .agents
            .get(agent_name)
            .cloned()
            .ok_or_else(|| EvalError::AgentNotFound(agent_name.to_string()))?;
        let value = self.evaluate_expression(value).await?;
        agent.set_property(property, value).await?;
        debug!(agent = agent_name, property, "property assigned");
        Ok(())
    }

    async fn execute_tool_assignment(
        &mut self,
        agent_name: &str,
        tools: &[ToolSpec],
    ) -> EvalResult<()> {
        let agent = self
            .agents
            .get(agent_name)
            .cloned()
            .ok_or_else(|| EvalError::AgentNotFound(agent_name.to_string()))?;

        for spec in tools {
            match spec {
                ToolSpec::Named(name) => {
                    if !agent.register_with_registry(name).await {
                        return Err(EvalError::ToolUnavailable(name.clone()));
                    }
                }
                ToolSpec::AgentRouting { agents } => {
                    let routing =
                        AgentRoutingTool::new(self.runtime.bus(), agents.clone());
                    agent.assign_tool("AgentRouting", Arc::new(routing)).await;
                }
            }
        }
        Ok(())
    }
}
