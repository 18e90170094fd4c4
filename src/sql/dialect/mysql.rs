//! MySQL SQL dialect.
//!
//! MySQL differences from ANSI:
//! - Backtick identifier quoting (`` `name` ``)
//! - Boolean is TINYINT(1), returns 1/0
//! - OFFSET requires a LIMIT
//! - "This version of MySQL doesn't yet support 'LIMIT & IN/ALL/ANY/SOME
//!   subquery'": the limited identifier subquery runs first and its ids are
//!   inlined
//! - UPDATE/DELETE accept LIMIT

use super::helpers;
use super::{LimitSubqueryStrategy, SqlDialect};
use crate::sql::token::TokenStream;

/// MySQL SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct MySql;

impl SqlDialect for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_backtick(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn max_identifier_length(&self) -> Option<usize> {
        Some(64)
    }

    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        // Largest unsigned BIGINT, the documented "no limit" value
        helpers::emit_limit_offset_with_sentinel(limit, offset, "18446744073709551615")
    }

    fn limit_subquery_strategy(&self) -> LimitSubqueryStrategy {
        LimitSubqueryStrategy::RequiresLiteralSubstitution
    }

    fn supports_limit_in_dml(&self) -> bool {
        true
    }
}
