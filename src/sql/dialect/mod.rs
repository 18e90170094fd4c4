//! SQL dialect descriptors.
//!
//! The compiler only needs a handful of facts about the target database:
//!
//! - Identifier quoting: `"` (ANSI/PostgreSQL/SQLite/Oracle), `` ` `` (MySQL), `[]` (T-SQL)
//! - Pagination: LIMIT/OFFSET vs OFFSET FETCH
//! - Identifier-length ceilings (Oracle: 30)
//! - How a LIMIT can be applied inside the `root.id IN (...)` subquery used
//!   by record-based limiting
//!
//! # Usage
//!
//! ```ignore
//! use dqlc::sql::dialect::{Dialect, SqlDialect};
//!
//! let dialect = Dialect::from_driver_name("pgsql")?;
//! let quoted = dialect.quote_identifier("user");  // "user"
//! ```
//!
//! # Limit subquery strategies
//!
//! | Dialect | Strategy |
//! |---------|----------|
//! | SQLite | nested LIMIT inside `IN (...)` |
//! | PostgreSQL | extra wrapping SELECT (DISTINCT + ORDER BY columns) |
//! | SQL Server | extra wrapping SELECT |
//! | Oracle | extra wrapping SELECT |
//! | MySQL | subquery executed first, ids inlined as literals |

pub mod helpers;
mod mysql;
mod oracle;
mod postgres;
mod sqlite;
mod tsql;

pub use mysql::MySql;
pub use oracle::Oracle;
pub use postgres::Postgres;
pub use sqlite::Sqlite;
pub use tsql::TSql;

use serde::{Deserialize, Serialize};

use super::token::{Token, TokenStream};
use crate::error::{CompileError, CompileResult};

/// How a dialect lets the limit-rewrite engine bound the root identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitSubqueryStrategy {
    /// `root.id IN (SELECT DISTINCT ... LIMIT n)` is accepted as is.
    NestedLimitSupported,
    /// LIMIT is not allowed inside `IN (...)`: run the subquery first and
    /// inline the identifiers it returned.
    RequiresLiteralSubstitution,
    /// ORDER BY columns must be selected next to the DISTINCT identifier, so
    /// the limited subquery is wrapped once more to project the identifier.
    RequiresDoubleWrap,
}

/// SQL dialect trait - defines how SQL constructs are rendered.
///
/// The default implementations follow ANSI SQL where possible.
pub trait SqlDialect: std::fmt::Debug {
    /// Dialect name for display/logging.
    fn name(&self) -> &'static str;

    // =========================================================================
    // Identifier and Literal Quoting
    // =========================================================================

    /// Quote an identifier (table, column, alias).
    fn quote_identifier(&self, ident: &str) -> String;

    /// Quote a string literal.
    ///
    /// All dialects use single quotes with `''` for escaping.
    fn quote_string(&self, s: &str) -> String {
        helpers::quote_string_single(s)
    }

    /// Format a boolean literal.
    fn format_bool(&self, b: bool) -> &'static str;

    /// Longest identifier the database accepts, if it enforces one that
    /// generated aliases could realistically hit.
    fn max_identifier_length(&self) -> Option<usize> {
        None
    }

    // =========================================================================
    // Pagination
    // =========================================================================

    /// Emit LIMIT/OFFSET or equivalent pagination clause.
    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        helpers::emit_limit_offset_standard(limit, offset)
    }

    /// Whether this dialect requires ORDER BY for OFFSET/LIMIT.
    fn requires_order_by_for_offset(&self) -> bool {
        false
    }

    /// How record-based limiting nests its identifier subquery.
    fn limit_subquery_strategy(&self) -> LimitSubqueryStrategy {
        LimitSubqueryStrategy::NestedLimitSupported
    }

    /// Whether UPDATE and DELETE accept a trailing LIMIT.
    fn supports_limit_in_dml(&self) -> bool {
        false
    }
}

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Postgres,
    MySql,
    Sqlite,
    TSql,
    Oracle,
}

impl Dialect {
    /// Get the dialect implementation.
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        match self {
            Dialect::Postgres => &Postgres,
            Dialect::MySql => &MySql,
            Dialect::Sqlite => &Sqlite,
            Dialect::TSql => &TSql,
            Dialect::Oracle => &Oracle,
        }
    }

    /// Select a dialect from a connection driver name.
    pub fn from_driver_name(driver: &str) -> CompileResult<Self> {
        match driver.to_lowercase().as_str() {
            "pgsql" | "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "mysql" | "mysqli" | "mariadb" => Ok(Dialect::MySql),
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            "mssql" | "sqlsrv" | "tsql" | "dblib" => Ok(Dialect::TSql),
            "oracle" | "oci" | "oci8" => Ok(Dialect::Oracle),
            other => Err(CompileError::UnsupportedConstruct(format!(
                "no dialect for driver '{}'",
                other
            ))),
        }
    }
}

// Implement SqlDialect for Dialect enum by delegating to concrete types
impl SqlDialect for Dialect {
    fn name(&self) -> &'static str {
        self.dialect().name()
    }

    fn quote_identifier(&self, ident: &str) -> String {
        self.dialect().quote_identifier(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        self.dialect().quote_string(s)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        self.dialect().format_bool(b)
    }

    fn max_identifier_length(&self) -> Option<usize> {
        self.dialect().max_identifier_length()
    }

    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        self.dialect().emit_limit_offset(limit, offset)
    }

    fn requires_order_by_for_offset(&self) -> bool {
        self.dialect().requires_order_by_for_offset()
    }

    fn limit_subquery_strategy(&self) -> LimitSubqueryStrategy {
        self.dialect().limit_subquery_strategy()
    }

    fn supports_limit_in_dml(&self) -> bool {
        self.dialect().supports_limit_in_dml()
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dialect().name())
    }
}

/// Renders identifiers quoted or bare depending on configuration.
#[derive(Debug, Clone, Copy)]
pub struct IdentQuoter {
    pub dialect: Dialect,
    pub enabled: bool,
}

impl IdentQuoter {
    pub fn new(dialect: Dialect, enabled: bool) -> Self {
        Self { dialect, enabled }
    }

    pub fn ident(&self, name: &str) -> String {
        if self.enabled {
            Token::Ident(name.to_string()).serialize(self.dialect)
        } else {
            name.to_string()
        }
    }

    /// `alias.column`, each part quoted independently.
    pub fn qualified(&self, alias: &str, column: &str) -> String {
        format!("{}.{}", self.ident(alias), self.ident(column))
    }
}
