//! PostgreSQL SQL dialect.
//!
//! PostgreSQL features relevant to query compilation:
//! - ANSI identifier quoting (`"`)
//! - Native boolean type (true/false)
//! - LIMIT ... OFFSET ..., OFFSET alone is valid
//! - SELECT DISTINCT requires ORDER BY expressions in the select list, so
//!   record-based limiting wraps its identifier subquery once more
//! - Identifiers truncated beyond 63 bytes

use super::helpers;
use super::{LimitSubqueryStrategy, SqlDialect};

/// PostgreSQL SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Postgres;

impl SqlDialect for Postgres {
    fn name(&self) -> &'static str {
        "pgsql"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_literal(b)
    }

    fn max_identifier_length(&self) -> Option<usize> {
        Some(63)
    }

    // Uses default emit_limit_offset (LIMIT ... OFFSET ...)

    fn limit_subquery_strategy(&self) -> LimitSubqueryStrategy {
        LimitSubqueryStrategy::RequiresDoubleWrap
    }
}
