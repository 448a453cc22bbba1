//! Tree-walking interpreter for agentscript programs.
//!
//! The interpreter evaluates an already-parsed [`Program`] against a
//! two-tier environment: a global scope holding agent bindings and
//! imported names, and a local variable scope checked first on lookup.
//! Statements execute strictly in program order; the first error aborts
//! the remainder of the `interpret` call; recovery is the caller's
//! concern (e.g. a REPL catching per submission).

mod expression;
mod statement;
pub mod value;

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::agent::{Agent, AgentError};
use crate::ast::Program;
use crate::module_system::ImportError;
use crate::output::{OutputSink, StdoutSink};
use crate::runtime::Runtime;

use self::value::Value;

#[derive(Error, Debug)]
pub enum EvalError {
    #[error("undefined identifier '{0}'")]
    UndefinedIdentifier(String),

    #[error("agent '{0}' not found")]
    AgentNotFound(String),

    #[error("'{0}' is not an agent")]
    NotAnAgent(String),

    #[error("'{0}' names an imported type, not a value")]
    NotAValue(String),

    #[error("agent '{agent}' has no property '{property}'")]
    UnknownProperty { agent: String, property: String },

    #[error("method '{method}' requires {expected}, got {got} argument(s)")]
    ArityMismatch {
        method: String,
        expected: &'static str,
        got: usize,
    },

    #[error("unknown method '{0}' on agent")]
    UnknownMethod(String),

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("tool '{0}' is not available for assignment")]
    ToolUnavailable(String),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Import(#[from] ImportError),
}

pub type EvalResult<T> = Result<T, EvalError>;

/// A name bound in global scope.
#[derive(Clone)]
pub enum Binding {
    Value(Value),
    Tool(String),
    AgentType(String),
}

pub struct Interpreter {
    runtime: Arc<Runtime>,
    sink: Arc<dyn OutputSink>,
    globals: HashMap<String, Binding>,
    locals: HashMap<String, Value>,
    agents: HashMap<String, Arc<Agent>>,
    spawn_counter: usize,
}

impl Interpreter {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self::with_sink(runtime, Arc::new(StdoutSink))
    }

    pub fn with_sink(runtime: Arc<Runtime>, sink: Arc<dyn OutputSink>) -> Self {
        Self {
            runtime,
            sink,
            globals: HashMap::new(),
            locals: HashMap::new(),
            agents: HashMap::new(),
            spawn_counter: 0,
        }
    }

    /// Executes the program's statements in order. The environment
    /// persists across calls, so a session can interpret incrementally.
    pub async fn interpret(&mut self, program: &Program) -> EvalResult<()> {
        for statement in &program.statements {
            self.execute_statement(statement).await?;
        }
        Ok(())
    }

    /// Looks up a declared agent by its bound name.
    pub fn agent(&self, name: &str) -> Option<Arc<Agent>> {
        self.agents.get(name).cloned()
    }

    /// All declared agents, for the introspection boundary.
    pub fn agents(&self) -> &HashMap<String, Arc<Agent>> {
        &self.agents
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// Cleans up every declared agent. Idempotent per agent.
    pub async fn cleanup(&mut self) {
        for agent in self.agents.values() {
            agent.cleanup().await;
        }
        self.agents.clear();
        self.globals.clear();
        self.locals.clear();
    }

    pub(crate) fn lookup(&self, name: &str) -> EvalResult<Value> {
        if let Some(value) = self.locals.get(name) {
            return Ok(value.clone());
        }
        match self.globals.get(name) {
            Some(Binding::Value(value)) => Ok(value.clone()),
            Some(Binding::Tool(_)) | Some(Binding::AgentType(_)) => {
                Err(EvalError::NotAValue(name.to_string()))
            }
            None => Err(EvalError::UndefinedIdentifier(name.to_string())),
        }
    }

    pub(crate) fn resolve_agent_value(&self, name: &str) -> EvalResult<Arc<Agent>> {
        match self.lookup(name)? {
            Value::Agent(agent) => Ok(agent),
            _ => Err(EvalError::NotAnAgent(name.to_string())),
        }
    }
}
