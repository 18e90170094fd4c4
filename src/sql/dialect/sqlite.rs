//! SQLite SQL dialect.
//!
//! SQLite is permissive:
//! - ANSI identifier quoting (`"`)
//! - No boolean type, 1/0
//! - OFFSET requires a LIMIT (`LIMIT -1` means unbounded)
//! - LIMIT is accepted inside `IN (...)` subqueries, and ORDER BY terms need
//!   not appear in a DISTINCT select list

use super::helpers;
use super::SqlDialect;
use crate::sql::token::TokenStream;

/// SQLite SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Sqlite;

impl SqlDialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        helpers::emit_limit_offset_with_sentinel(limit, offset, "-1")
    }

    // Uses default limit_subquery_strategy (nested LIMIT)
}
