//! Options that steer a single compilation.

use serde::{Deserialize, Serialize};

use crate::sql::dialect::Dialect;

/// What LIMIT/OFFSET bounds when a query joins a to-many relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitStrategy {
    /// Bound the number of root records; joined collections stay complete.
    #[default]
    Records,
    /// Bound the number of raw result rows.
    Rows,
}

/// Options for compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompilerOptions {
    /// SQL dialect to generate.
    pub dialect: Dialect,
    pub limit_strategy: LimitStrategy,
    /// Quote every table, column and alias identifier.
    pub quote_identifiers: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            dialect: Dialect::Postgres,
            limit_strategy: LimitStrategy::Records,
            quote_identifiers: false,
        }
    }
}

impl CompilerOptions {
    /// Set the SQL dialect.
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_limit_strategy(mut self, limit_strategy: LimitStrategy) -> Self {
        self.limit_strategy = limit_strategy;
        self
    }

    pub fn with_quoted_identifiers(mut self, quote: bool) -> Self {
        self.quote_identifiers = quote;
        self
    }
}
