//! SQL generation module.
//!
//! - [`query`] - rendered query parts and the renderer
//! - [`token`] - Token types for SQL generation
//! - [`dialect`] - SQL dialect descriptors

pub mod dialect;
pub mod query;
pub mod token;

// Re-export commonly used types at the sql module level
pub use dialect::{Dialect, IdentQuoter, LimitSubqueryStrategy, SqlDialect};
pub use query::{
    Fragment, Join, JoinType, LimitOffset, OrderByExpr, SortDir, SqlParts, StatementKind,
    TableRef,
};
pub use token::{Token, TokenStream};
