//! The execution collaborator interface.
//!
//! The compiler never talks to a database on its own. Two places need rows
//! back: the literal-substitution branch of the limit rewrite (dialects that
//! cannot nest LIMIT inside `IN (...)`) and [`Query::count`]. Both go through
//! an [`Executor`] supplied by the caller.
//!
//! [`Query::count`]: crate::query::Query::count

use serde::{Deserialize, Serialize};

use crate::error::{CompileError, CompileResult};
use crate::sql::dialect::Dialect;
use crate::sql::token::Token;

/// A bound parameter or a returned cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Render this value as an inline SQL literal for the given dialect.
    /// NaN and infinite floats have no SQL literal.
    pub fn to_sql_literal(&self, dialect: Dialect) -> CompileResult<String> {
        let token = match self {
            Value::Null => Token::LitNull,
            Value::Bool(b) => Token::LitBool(*b),
            Value::Int(n) => Token::LitInt(*n),
            Value::Float(f) if !f.is_finite() => {
                return Err(CompileError::unsupported(format!(
                    "{} cannot be inlined as a SQL literal",
                    f
                )))
            }
            Value::Float(f) => Token::LitFloat(*f),
            Value::Text(s) => Token::LitString(s.clone()),
        };
        Ok(token.serialize(dialect))
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Text(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// One result row, cells in select-list order.
pub type Row = Vec<Value>;

/// Failure reported by the execution collaborator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct ExecutionError {
    pub message: String,
}

impl ExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Runs SQL on behalf of the compiler.
///
/// Implementations are expected to be synchronous. Timeouts and retries are
/// the implementor's business; the compiler propagates any error unchanged.
pub trait Executor {
    fn execute(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, ExecutionError>;
}
