//! Record-based limiting.
//!
//! Applying LIMIT to a query that joins a to-many relation bounds joined rows,
//! truncating collections and returning fewer root records than asked for.
//! The rewrite moves the bound into a DISTINCT root-identifier subquery and
//! restricts the outer query to those identifiers:
//!
//! ```text
//! SELECT ... FROM users u LEFT JOIN phonenumbers p ON ... LIMIT 2
//!
//!   becomes
//!
//! SELECT ... FROM users u LEFT JOIN phonenumbers p ON ...
//! WHERE u.id IN (SELECT DISTINCT u2.id FROM users u2 ... LIMIT 2)
//! ```
//!
//! An ordered subquery groups by the root identifier instead and sorts on
//! `MIN`/`MAX` of each ORDER BY expression, so a root with several joined
//! rows still takes one slot:
//!
//! ```text
//! SELECT u2.id FROM users u2 LEFT JOIN phonenumbers p2 ON ...
//! GROUP BY u2.id ORDER BY MIN(p2.phonenumber) LIMIT 2
//! ```
//!
//! How the subquery is embedded depends on the dialect's
//! [`LimitSubqueryStrategy`].

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::config::LimitStrategy;
use crate::error::{CompileError, CompileResult};
use crate::execution::Executor;
use crate::sql::dialect::{Dialect, IdentQuoter, LimitSubqueryStrategy, SqlDialect};
use crate::sql::query::{Fragment, SqlParts, TableRef};

/// Alias of the derived table in the double-wrap form.
pub const LIMIT_SUBQUERY_ALIAS: &str = "dctrn_limit";
const ORDER_COLUMN_PREFIX: &str = "dctrn_ord";

/// The root-identifier query, with LIMIT/OFFSET applied.
#[derive(Debug, Clone)]
pub(crate) struct IdSubquery {
    pub parts: SqlParts,
    /// Physical identifier column, used to name the projected column.
    pub id_column: String,
}

pub(crate) struct LimitContext<'a> {
    pub dialect: Dialect,
    pub quoter: IdentQuoter,
    pub executor: Option<&'a dyn Executor>,
}

/// Whether the parts need the rewrite: paginated, with a kept to-many join,
/// and configured to bound records.
pub(crate) fn needs_rewrite(parts: &SqlParts, strategy: LimitStrategy) -> bool {
    strategy == LimitStrategy::Records && parts.has_limit() && parts.has_to_many_join()
}

/// Return `outer` restricted to the identifiers selected by `inner`, without
/// its own LIMIT/OFFSET.
pub(crate) fn rewrite(
    outer: &SqlParts,
    root_id: &str,
    inner: IdSubquery,
    ctx: &LimitContext<'_>,
) -> CompileResult<SqlParts> {
    let strategy = ctx.dialect.limit_subquery_strategy();
    debug!(dialect = %ctx.dialect, strategy = ?strategy, "rewriting LIMIT over to-many join");

    let predicate = match strategy {
        LimitSubqueryStrategy::NestedLimitSupported => {
            let sql = inner.parts.to_sql(ctx.dialect)?;
            Fragment::with_params(format!("{} IN ({})", root_id, sql), inner.parts.params())
        }
        LimitSubqueryStrategy::RequiresDoubleWrap => double_wrap(root_id, inner, ctx)?,
        LimitSubqueryStrategy::RequiresLiteralSubstitution => {
            literal_substitution(root_id, inner, ctx)?
        }
    };

    let mut parts = outer.clone();
    parts.where_parts.insert(0, predicate);
    parts.limit_offset = None;
    Ok(parts)
}

/// Name the identifier column, project every ORDER BY expression as
/// `dctrn_ord_n` and order by those columns. DISTINCT requires ORDER BY
/// expressions in the select list on stricter databases.
fn with_order_columns(mut parts: SqlParts, id_column: &str, quoter: IdentQuoter) -> SqlParts {
    if let Some(id) = parts.select.first_mut() {
        id.sql = format!("{} AS {}", id.sql, quoter.ident(id_column));
    }

    for (n, order) in parts.order_by.iter_mut().enumerate() {
        let column = quoter.ident(&format!("{}_{}", ORDER_COLUMN_PREFIX, n));
        let expr = std::mem::replace(&mut order.expr, Fragment::new(column.clone()));
        parts.select.push(Fragment::with_params(
            format!("{} AS {}", expr.sql, column),
            expr.params,
        ));
    }
    parts
}

fn double_wrap(root_id: &str, inner: IdSubquery, ctx: &LimitContext<'_>) -> CompileResult<Fragment> {
    let parts = with_order_columns(inner.parts, &inner.id_column, ctx.quoter);
    let sql = parts.to_sql(ctx.dialect)?;

    let wrapper = SqlParts {
        select: vec![Fragment::new(
            ctx.quoter.qualified(LIMIT_SUBQUERY_ALIAS, &inner.id_column),
        )],
        from: Some(TableRef::new(format!("({})", sql)).with_alias(ctx.quoter.ident(LIMIT_SUBQUERY_ALIAS))),
        ..Default::default()
    };

    Ok(Fragment::with_params(
        format!("{} IN ({})", root_id, wrapper.to_sql(ctx.dialect)?),
        parts.params(),
    ))
}

fn literal_substitution(
    root_id: &str,
    inner: IdSubquery,
    ctx: &LimitContext<'_>,
) -> CompileResult<Fragment> {
    let executor = ctx.executor.ok_or_else(|| {
        CompileError::unsupported(format!(
            "{} cannot nest LIMIT in a subquery and no executor is configured",
            ctx.dialect
        ))
    })?;

    let parts = with_order_columns(inner.parts, &inner.id_column, ctx.quoter);
    let sql = parts.to_sql(ctx.dialect)?;
    let rows = executor.execute(&sql, &parts.params())?;

    let mut seen = HashSet::new();
    let mut literals = Vec::new();
    for value in rows.iter().filter_map(|row| row.first()) {
        let literal = value.to_sql_literal(ctx.dialect)?;
        if seen.insert(literal.clone()) {
            literals.push(literal);
        }
    }

    if literals.is_empty() {
        warn!(sql = %sql, "identifier subquery returned no rows");
        return Ok(Fragment::new(format!("{} IN (NULL)", root_id)));
    }

    Ok(Fragment::new(format!("{} IN ({})", root_id, literals.join(", "))))
}
