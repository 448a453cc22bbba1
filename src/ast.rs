//! AST node model for agentscript programs.
//!
//! Nodes are produced by the external parser and consumed by the
//! interpreter. The variant sets are closed: every statement and expression
//! shape the language supports is enumerated here and matched exhaustively,
//! so an unhandled shape is a compile error rather than a runtime one.

use std::fmt;

/// A parsed program: statements in source order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Statement>,
}

impl Program {
    pub fn new(statements: Vec<Statement>) -> Self {
        Self { statements }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `agent <name> = spawn Agent{ <model>[, key: value, ...] }`
    AgentDecl {
        name: String,
        constructor: AgentConstructor,
    },
    /// `import <dotted.path> { Name, ... }`
    Import {
        path: Vec<String>,
        names: Vec<String>,
    },
    /// `*<agent>-><property> = <expr>`
    PropertyAssignment {
        agent: String,
        property: String,
        value: Expression,
    },
    /// `*<agent>->tools = { <ToolName> | AgentRouting{ name, ... }, ... }`
    ToolAssignment {
        agent: String,
        tools: Vec<ToolSpec>,
    },
    /// `<name> = <expr>`, a local variable binding.
    VariableAssignment { name: String, value: Expression },
    If {
        condition: Expression,
        then_block: Vec<Statement>,
        else_block: Option<Vec<Statement>>,
    },
    /// `print(<expr>)`
    Print(Expression),
    /// A bare expression evaluated for its side effects.
    Expression(Expression),
}

/// The `spawn Agent{ ... }` constructor body.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConstructor {
    pub model: ModelSpec,
    pub config: Vec<ConfigPair>,
}

/// Opaque model path, e.g. `openai/gpt-4o`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    pub path: String,
}

impl ModelSpec {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigPair {
    pub key: String,
    pub value: Expression,
}

/// One entry of a tool-assignment block.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolSpec {
    /// A registry-backed tool referenced by name.
    Named(String),
    /// An agent-routing capability scoped to the listed agent names.
    AgentRouting { agents: Vec<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Literal),
    Identifier(String),
    /// `<object>.<property>`
    PropertyAccess { object: String, property: String },
    /// `<object>.<method>(<args>...)`
    MethodCall {
        object: String,
        method: String,
        arguments: Vec<Expression>,
    },
    /// `<left> <op> <right>` with a comparison operator.
    ///
    /// The language has no boolean connectives: a condition is either a
    /// comparison or a single expression checked for truthiness.
    Comparison {
        op: CompareOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Number(f64),
    Boolean(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
pub enum CompareOp {
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    NotEq,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = "<=")]
    LtEq,
    #[strum(serialize = ">=")]
    GtEq,
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}
