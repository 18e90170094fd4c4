//! T-SQL (SQL Server / Azure SQL) dialect.
//!
//! T-SQL differences from ANSI:
//! - Square bracket identifier quoting (`[name]`)
//! - No native boolean in SELECT, 1/0
//! - OFFSET FETCH for pagination (requires ORDER BY)
//! - N'...' string literals
//! - ORDER BY items must appear in the select list when DISTINCT is used,
//!   so the limited identifier subquery is wrapped

use super::helpers;
use super::{LimitSubqueryStrategy, SqlDialect};
use crate::sql::token::TokenStream;

/// T-SQL (SQL Server) dialect.
#[derive(Debug, Clone, Copy)]
pub struct TSql;

impl SqlDialect for TSql {
    fn name(&self) -> &'static str {
        "mssql"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_bracket(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        helpers::quote_string_unicode(s)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn max_identifier_length(&self) -> Option<usize> {
        Some(128)
    }

    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        helpers::emit_limit_offset_tsql(limit, offset)
    }

    fn requires_order_by_for_offset(&self) -> bool {
        true
    }

    fn limit_subquery_strategy(&self) -> LimitSubqueryStrategy {
        LimitSubqueryStrategy::RequiresDoubleWrap
    }
}
