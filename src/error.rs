use thiserror::Error;

use crate::agent::AgentError;
use crate::eval::EvalError;
use crate::module_system::ImportError;
use crate::respond::RespondError;
use crate::tool::ToolError;

/// Top-level error for embedders that drive the whole runtime.
#[derive(Error, Debug)]
pub enum Error {
    #[error("eval error: {0}")]
    Eval(#[from] EvalError),

    #[error("agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("import error: {0}")]
    Import(#[from] ImportError),

    #[error("respond error: {0}")]
    Respond(#[from] RespondError),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }
}
