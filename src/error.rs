//! Compilation errors.
//!
//! Every failure the compiler can report is a variant of [`CompileError`].
//! None of them is retryable: they describe a mismatch between the query
//! text, the mapping metadata and the target dialect.

use crate::execution::ExecutionError;

/// Errors that can occur while compiling a query.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// Tokenization or grammar failure.
    #[error("Malformed query: {0}")]
    MalformedQuery(String),

    /// The metadata provider has no entity under this name.
    #[error("Unknown entity: '{0}'")]
    UnknownEntity(String),

    /// A clause referenced a component alias that was never bound.
    #[error("Unknown component alias: '{0}'")]
    UnknownAlias(String),

    /// The same component alias was bound twice.
    #[error("Component alias '{0}' is bound more than once")]
    AmbiguousAlias(String),

    #[error("Unknown relation '{relation}' on entity '{entity}'")]
    UnknownRelation { entity: String, relation: String },

    #[error("Unknown column '{field}' on entity '{entity}'")]
    UnknownColumn { entity: String, field: String },

    /// The query needs something the dialect or the compiler cannot express.
    #[error("Unsupported construct: {0}")]
    UnsupportedConstruct(String),

    /// Rendering was attempted before SELECT and FROM were set.
    #[error("Incomplete query: {0}")]
    IncompleteQuery(String),

    /// The execution collaborator failed while running an eager subquery.
    #[error("Execution failed: {0}")]
    Execution(#[from] ExecutionError),
}

pub type CompileResult<T> = Result<T, CompileError>;

impl CompileError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        CompileError::MalformedQuery(message.into())
    }

    pub(crate) fn unsupported(message: impl Into<String>) -> Self {
        CompileError::UnsupportedConstruct(message.into())
    }
}
