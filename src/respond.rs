//! Response generation seam behind `ask`.
//!
//! The runtime never talks to a concrete model backend. Anything
//! implementing [`ResponseGenerator`] can be injected; the crate ships a
//! deterministic stand-in so the `ask` path is testable without one.

use async_trait::async_trait;
use thiserror::Error;

/// Snapshot of the asking agent handed to the generator.
#[derive(Debug, Clone)]
pub struct ResponderContext {
    pub agent_id: String,
    pub agent_name: String,
    pub model: String,
}

#[derive(Error, Debug)]
pub enum RespondError {
    #[error("response generation failed: {0}")]
    Generation(String),

    #[error("response generation timed out")]
    Timeout,
}

pub type RespondResult<T> = Result<T, RespondError>;

#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(&self, context: &ResponderContext, message: &str)
        -> RespondResult<String>;
}

/// Deterministic stand-in generator: the reply is a pure function of the
/// agent context and the message.
#[derive(Default)]
pub struct StubResponder;

#[async_trait]
impl ResponseGenerator for StubResponder {
    async fn generate(
        &self,
        context: &ResponderContext,
        message: &str,
    ) -> RespondResult<String> {
        if message.to_lowercase().contains("hello") {
            Ok(format!("Hello from {}!", context.agent_name))
        } else {
            Ok(format!("{} processed: {}", context.agent_name, message))
        }
    }
}
