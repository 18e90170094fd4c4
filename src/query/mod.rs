//! The query compiler.
//!
//! A [`Query`] collects clause fragments, either from a whole query string
//! ([`Query::parse`]) or incrementally (`add_select`, `add_where`, ...), and
//! compiles them on demand:
//!
//! ```text
//! ┌──────────────┐   tokenize    ┌──────────────┐  get_sql   ┌────────────────┐
//! │ query string │ ────────────► │  ClauseSet   │ ─────────► │  Compilation   │
//! └──────────────┘               │ (fragments + │            │ (phase-ordered │
//!    add_* calls ──────────────► │   params)    │            │    pipeline)   │
//!                                └──────────────┘            └───────┬────────┘
//!                                                                    ▼
//!                                                            ┌────────────────┐
//!                                                            │ CompiledQuery  │
//!                                                            │ sql + params + │
//!                                                            │ result columns │
//!                                                            └────────────────┘
//! ```
//!
//! Clause calls may come in any order: nothing is resolved until the query
//! is compiled, and each compilation starts from fresh alias state.
//!
//! # Example
//!
//! ```ignore
//! use dqlc::prelude::*;
//!
//! let mut query = Query::new(&registry, CompilerOptions::default());
//! query.parse_with_params(
//!     "SELECT u.*, p.* FROM User u LEFT JOIN u.Phonenumbers p WHERE u.id = ?",
//!     &[Value::Int(1)],
//! )?;
//! let compiled = query.get_sql()?;
//! ```

mod alias;
mod clause;
mod compiler;
mod expr;
mod from;
mod inheritance;
mod limit;
mod select;
pub mod tokenizer;

pub use alias::{AliasRegistry, Component};
pub use clause::ClauseKind;
pub use inheritance::{
    ancestors, descendants, discriminator_values, hierarchy_root, InheritanceFilter, Placement,
};
pub use limit::LIMIT_SUBQUERY_ALIAS;
pub use tokenizer::{tokenize, ClauseTokens};

use serde::Serialize;

use self::clause::ClauseSet;
use self::tokenizer::count_placeholders;
use crate::config::CompilerOptions;
use crate::error::{CompileError, CompileResult};
use crate::execution::{Executor, Value};
use crate::metadata::MetadataProvider;
use crate::sql::query::Fragment;

/// Lifecycle of a query and of one compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum QueryState {
    #[default]
    Empty,
    Parsing,
    FieldsPending,
    JoinsResolved,
    FieldsResolved,
    SubqueriesResolved,
    InheritanceApplied,
    Rendered,
}

/// Maps one selected SQL column back to the component and field it came
/// from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultColumn {
    /// Output alias in the rendered SQL, e.g. `u__name`.
    pub sql_alias: String,
    /// Component alias the column belongs to.
    pub component: String,
    /// Field name, or the user alias of an aggregate or subquery.
    pub field: String,
}

/// A compiled statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledQuery {
    pub sql: String,
    /// Bound values in placeholder order.
    pub params: Vec<Value>,
    pub columns: Vec<ResultColumn>,
    /// Whether a to-many join survived pruning; the hydrator collapses rows
    /// when set.
    pub has_to_many_joins: bool,
}

/// An object query under construction.
pub struct Query<'a> {
    provider: &'a dyn MetadataProvider,
    options: CompilerOptions,
    executor: Option<&'a dyn Executor>,
    clauses: ClauseSet,
    state: QueryState,
    compiled: Option<CompiledQuery>,
}

impl<'a> Query<'a> {
    pub fn new(provider: &'a dyn MetadataProvider, options: CompilerOptions) -> Self {
        Self {
            provider,
            options,
            executor: None,
            clauses: ClauseSet::default(),
            state: QueryState::Empty,
            compiled: None,
        }
    }

    /// Executor used by dialects that must run the limit subquery eagerly.
    pub fn with_executor(mut self, executor: &'a dyn Executor) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    pub fn state(&self) -> QueryState {
        self.state
    }

    /// Replace every clause with those of `dql`.
    pub fn parse(&mut self, dql: &str) -> CompileResult<&mut Self> {
        self.parse_with_params(dql, &[])
    }

    /// Replace every clause with those of `dql`, binding `params` to its
    /// `?` placeholders in textual order.
    pub fn parse_with_params(&mut self, dql: &str, params: &[Value]) -> CompileResult<&mut Self> {
        let clauses = ClauseSet::parse(dql, params)?;
        self.clauses = clauses;
        self.touch();
        Ok(self)
    }

    fn touch(&mut self) {
        self.compiled = None;
        self.state = QueryState::Parsing;
    }

    fn add(&mut self, kind: ClauseKind, fragment: &str, params: &[Value]) -> CompileResult<&mut Self> {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            return Err(CompileError::malformed(format!("empty {} fragment", kind)));
        }
        let placeholders = count_placeholders(fragment)?;
        if placeholders != params.len() {
            return Err(CompileError::malformed(format!(
                "{} fragment '{}' has {} placeholder(s) but {} parameter(s) were bound",
                kind,
                fragment,
                placeholders,
                params.len()
            )));
        }

        self.clauses
            .push(kind, Fragment::with_params(fragment, params.to_vec()))?;
        self.touch();
        Ok(self)
    }

    pub fn add_select(&mut self, fragment: &str, params: &[Value]) -> CompileResult<&mut Self> {
        self.add(ClauseKind::Select, fragment, params)
    }

    /// Append to FROM: a root component (`User u`) or a join
    /// (`LEFT JOIN u.Phonenumbers p`).
    pub fn add_from(&mut self, fragment: &str, params: &[Value]) -> CompileResult<&mut Self> {
        self.add(ClauseKind::From, fragment, params)
    }

    /// AND another condition onto WHERE.
    pub fn add_where(&mut self, fragment: &str, params: &[Value]) -> CompileResult<&mut Self> {
        self.add(ClauseKind::Where, fragment, params)
    }

    pub fn add_group_by(&mut self, fragment: &str, params: &[Value]) -> CompileResult<&mut Self> {
        self.add(ClauseKind::GroupBy, fragment, params)
    }

    pub fn add_having(&mut self, fragment: &str, params: &[Value]) -> CompileResult<&mut Self> {
        self.add(ClauseKind::Having, fragment, params)
    }

    pub fn add_order_by(&mut self, fragment: &str, params: &[Value]) -> CompileResult<&mut Self> {
        self.add(ClauseKind::OrderBy, fragment, params)
    }

    /// Append a SET assignment. Only valid for UPDATE queries.
    pub fn add_set(&mut self, fragment: &str, params: &[Value]) -> CompileResult<&mut Self> {
        self.add(ClauseKind::Set, fragment, params)
    }

    pub fn limit(&mut self, limit: u64) -> &mut Self {
        self.clauses.limit = Some(limit);
        self.touch();
        self
    }

    pub fn offset(&mut self, offset: u64) -> &mut Self {
        self.clauses.offset = Some(offset);
        self.touch();
        self
    }

    /// Compile the query, or return the cached result of the last compile.
    pub fn get_sql(&mut self) -> CompileResult<&CompiledQuery> {
        let compiled = match self.compiled.take() {
            Some(compiled) => compiled,
            None => compiler::compile(self.provider, &self.options, self.executor, &self.clauses)?,
        };
        self.state = QueryState::Rendered;
        Ok(self.compiled.insert(compiled))
    }

    /// SQL and parameters counting the distinct root records this query
    /// matches. ORDER BY, LIMIT and OFFSET are ignored.
    pub fn count_sql(&self) -> CompileResult<(String, Vec<Value>)> {
        compiler::compile_count(self.provider, &self.options, &self.clauses)
    }

    /// Run the count query through `executor`.
    pub fn count(&self, executor: &dyn Executor) -> CompileResult<u64> {
        let (sql, params) = self.count_sql()?;
        let rows = executor.execute(&sql, &params)?;
        let value = rows.first().and_then(|row| row.first()).ok_or_else(|| {
            CompileError::unsupported("count query returned no rows")
        })?;

        value
            .as_i64()
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| {
                CompileError::unsupported(format!("count query returned {:?}", value))
            })
    }

    /// Drop every clause and cached result.
    pub fn clear(&mut self) {
        self.clauses = ClauseSet::default();
        self.compiled = None;
        self.state = QueryState::Empty;
    }
}

impl std::fmt::Debug for Query<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("options", &self.options)
            .field("clauses", &self.clauses)
            .field("state", &self.state)
            .finish()
    }
}
