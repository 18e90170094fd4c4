//! Oracle SQL dialect.
//!
//! Oracle differences from ANSI:
//! - 30-character identifier limit (pre-12.2), which bounds generated aliases
//! - No boolean literals in SQL, 1/0
//! - SQL:2008 row limiting (`OFFSET n ROWS FETCH NEXT m ROWS ONLY`)
//! - Table aliases must not use AS
//! - DISTINCT with ORDER BY needs the ordered columns selected, so the
//!   limited identifier subquery is wrapped

use super::helpers;
use super::{LimitSubqueryStrategy, SqlDialect};
use crate::sql::token::TokenStream;

/// Oracle SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Oracle;

impl SqlDialect for Oracle {
    fn name(&self) -> &'static str {
        "oracle"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn max_identifier_length(&self) -> Option<usize> {
        Some(30)
    }

    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        helpers::emit_limit_offset_fetch_first(limit, offset)
    }

    fn limit_subquery_strategy(&self) -> LimitSubqueryStrategy {
        LimitSubqueryStrategy::RequiresDoubleWrap
    }
}
