//! Tool capabilities and the registry that catalogs them.
//!
//! A tool is anything exposing a single async `execute` operation over
//! runtime values. Concrete tools are interchangeable implementations of
//! that one seam rather than members of a class hierarchy.

mod builtin;
mod registry;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::eval::value::Value;

pub use builtin::{
    standard_tools, AgentRoutingTool, CalculatorTool, FileManagerTool, WebSearchTool,
};
pub use registry::{ToolInfo, ToolRegistry, ToolStats};

/// Single-method capability interface.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, args: &[Value]) -> ToolResult<Value>;
}

/// Factory for lazy tool instantiation by the registry.
pub type ToolFactory = Arc<dyn Fn() -> Arc<dyn Tool> + Send + Sync>;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("tool '{0}' not found or disabled")]
    NotFound(String),

    #[error("invalid arguments for tool '{tool}': {message}")]
    InvalidArguments { tool: String, message: String },

    #[error("tool '{tool}' execution failed: {message}")]
    ExecutionFailed { tool: String, message: String },
}

pub type ToolResult<T> = Result<T, ToolError>;

/// Pulls a required string argument out of a tool call.
pub(crate) fn string_arg<'a>(
    tool: &str,
    args: &'a [Value],
    index: usize,
    what: &str,
) -> ToolResult<&'a str> {
    args.get(index)
        .and_then(|value| value.as_str())
        .ok_or_else(|| ToolError::InvalidArguments {
            tool: tool.to_string(),
            message: format!("expected {} as string argument {}", what, index),
        })
}

/// Optional string argument; present-but-not-a-string is an error.
pub(crate) fn optional_string_arg<'a>(
    tool: &str,
    args: &'a [Value],
    index: usize,
    what: &str,
) -> ToolResult<Option<&'a str>> {
    match args.get(index) {
        None => Ok(None),
        Some(value) => value
            .as_str()
            .map(Some)
            .ok_or_else(|| ToolError::InvalidArguments {
                tool: tool.to_string(),
                message: format!("expected {} as string argument {}", what, index),
            }),
    }
}
