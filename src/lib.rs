//! # dqlc
//!
//! Compiles an object query language over mapped entities into
//! multi-dialect SQL.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │      Query text / incremental clause fragments           │
//! │  SELECT u.*, p.* FROM User u LEFT JOIN u.Phonenumbers p  │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [tokenizer]
//! ┌─────────────────────────────────────────────────────────┐
//! │              Clause fragments + parameters               │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [compilation pipeline]
//! ┌─────────────────────────────────────────────────────────┐
//! │   FROM/JOIN graph (alias registry, metadata lookups)     │
//! │   pending fields, aggregates and subqueries resolved     │
//! │   WHERE / GROUP BY / HAVING / ORDER BY / SET rewritten   │
//! │   inheritance discriminator filters                      │
//! │   join pruning, limit rewrite                            │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [renderer + dialect]
//! ┌─────────────────────────────────────────────────────────┐
//! │        SQL string, parameters, result-column map         │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Entity mappings come from a [`metadata::MetadataProvider`]; the only
//! database access goes through an [`execution::Executor`] supplied by the
//! caller.

pub mod config;
pub mod error;
pub mod execution;
pub mod metadata;
pub mod query;
pub mod sql;

pub use sql::dialect;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::config::{CompilerOptions, LimitStrategy, Settings};
    pub use crate::dialect::{Dialect, LimitSubqueryStrategy, SqlDialect};
    pub use crate::error::{CompileError, CompileResult};
    pub use crate::execution::{ExecutionError, Executor, Row, Value};
    pub use crate::metadata::{
        ColumnType, EntityMetadata, Inheritance, JoinTable, MetadataProvider, MetadataRegistry,
        Relation,
    };
    pub use crate::query::{CompiledQuery, Query, QueryState, ResultColumn};
}

// Also export at crate root for convenience
pub use dialect::Dialect;
pub use error::{CompileError, CompileResult};
pub use query::{CompiledQuery, Query};
