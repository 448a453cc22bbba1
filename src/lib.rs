//! # agentscript
//!
//! Execution runtime for the agentscript DSL: declare agents, hand them
//! tools, and let them exchange messages.
//!
//! The crate is split into two layers:
//!
//! - **Concurrent runtime**: a [`bus::MessageBus`] routing bounded,
//!   priority-ordered per-agent mailboxes with timeout sweeping; a
//!   [`tool::ToolRegistry`] cataloging single-method capabilities with
//!   lazy instantiation and usage accounting; and the [`agent::Agent`]
//!   actor with its status machine and optional background consumer loop.
//! - **Interpreter**: [`eval::Interpreter`], a tree-walking evaluator
//!   over the closed AST in [`ast`], executing statements in program
//!   order against a two-tier environment.
//!
//! External collaborators stay behind seams: the parser produces
//! [`ast::Program`] values, model backends implement
//! [`respond::ResponseGenerator`], tool bodies implement [`tool::Tool`],
//! and program output flows through [`output::OutputSink`]. A
//! [`runtime::Runtime`] bundles the shared services and is injected
//! everywhere; there are no process-wide singletons, so each test (or
//! embedder) owns an isolated runtime.

pub mod agent;
pub mod ast;
pub mod bus;
pub mod config;
pub mod error;
pub mod eval;
pub mod module_system;
pub mod output;
pub mod respond;
pub mod runtime;
pub mod timestamp;
pub mod tool;

pub use agent::{Agent, AgentError, AgentResult, AgentStatus};
pub use ast::{
    AgentConstructor, CompareOp, ConfigPair, Expression, Literal, ModelSpec, Program,
    Statement, ToolSpec,
};
pub use bus::{
    Message, MessageBus, MessageId, MessagePriority, MessageStats, MessageStatus,
    SendMessage,
};
pub use config::{AgentConfig, BusConfig, RuntimeConfig};
pub use error::{Error, Result};
pub use eval::{value::Value, EvalError, EvalResult, Interpreter};
pub use module_system::{ImportError, ModuleBinding, ModuleSystem};
pub use output::{BufferSink, OutputSink, StdoutSink};
pub use respond::{ResponseGenerator, StubResponder};
pub use runtime::Runtime;
pub use timestamp::Timestamp;
pub use tool::{Tool, ToolError, ToolRegistry, ToolResult};
