//! Rendered query parts and the SQL renderer.
//!
//! The compiler resolves every clause into already-rendered fragments and
//! collects them in [`SqlParts`]. Rendering assembles those fragments in the
//! fixed clause order through a [`TokenStream`], applying the dialect's
//! pagination syntax.

use std::collections::BTreeSet;

use super::dialect::{Dialect, SqlDialect};
use super::token::{Token, TokenStream};
use crate::error::{CompileError, CompileResult};
use crate::execution::Value;

// =============================================================================
// Fragments
// =============================================================================

/// A rendered SQL fragment and the values bound to its `?` placeholders,
/// in placeholder order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Fragment {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

impl From<&str> for Fragment {
    fn from(sql: &str) -> Self {
        Fragment::new(sql)
    }
}

impl From<String> for Fragment {
    fn from(sql: String) -> Self {
        Fragment::new(sql)
    }
}

impl AsRef<str> for Fragment {
    fn as_ref(&self) -> &str {
        &self.sql
    }
}

// =============================================================================
// Table Reference
// =============================================================================

/// A table reference with an optional alias, both already quoted as needed.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    pub table: String,
    pub alias: Option<String>,
}

impl TableRef {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            alias: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// `table alias`. AS is never emitted: Oracle rejects it for tables.
    pub fn to_tokens(&self) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::Raw(self.table.clone()));
        if let Some(alias) = &self.alias {
            ts.space().push(Token::Raw(alias.clone()));
        }
        ts
    }
}

// =============================================================================
// Joins
// =============================================================================

/// Type of join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
}

/// A JOIN clause, tagged with the component it materializes.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub join_type: JoinType,
    pub table: TableRef,
    /// Conditions conjoined with AND.
    pub on: Vec<Fragment>,
    /// Component alias this join belongs to.
    pub component: String,
    /// Component alias that must be joined for this join to be valid.
    pub parent: String,
    /// Whether the relation behind this join can produce several rows per
    /// parent row.
    pub to_many: bool,
}

impl Join {
    pub fn to_tokens(&self) -> TokenStream {
        let mut ts = TokenStream::new();

        match self.join_type {
            JoinType::Inner => ts.push(Token::Inner),
            JoinType::Left => ts.push(Token::Left),
        };

        ts.space().push(Token::Join).space();
        ts.append(&self.table.to_tokens());

        if !self.on.is_empty() {
            ts.space()
                .push(Token::On)
                .space()
                .push(Token::Raw(conjoin(&self.on)));
        }

        ts
    }
}

/// Keep INNER joins, joins of needed components, and every join a kept join
/// depends on. Joins are listed parents first.
pub fn retain_needed_joins(joins: &[Join], needed: &BTreeSet<String>) -> Vec<Join> {
    let mut required = needed.clone();
    let mut kept = Vec::with_capacity(joins.len());

    for join in joins.iter().rev() {
        if join.join_type == JoinType::Inner || required.contains(&join.component) {
            required.insert(join.parent.clone());
            required.insert(join.component.clone());
            kept.push(join.clone());
        }
    }

    kept.reverse();
    kept
}

// =============================================================================
// ORDER BY
// =============================================================================

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

/// An ORDER BY expression.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderByExpr {
    pub expr: Fragment,
    pub dir: Option<SortDir>,
}

impl OrderByExpr {
    pub fn new(expr: impl Into<Fragment>, dir: Option<SortDir>) -> Self {
        Self {
            expr: expr.into(),
            dir,
        }
    }

    pub fn render(&self) -> String {
        match self.dir {
            Some(SortDir::Asc) => format!("{} ASC", self.expr.sql),
            Some(SortDir::Desc) => format!("{} DESC", self.expr.sql),
            None => self.expr.sql.clone(),
        }
    }
}

// =============================================================================
// LIMIT / OFFSET
// =============================================================================

/// LIMIT and OFFSET clause.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LimitOffset {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl LimitOffset {
    pub fn is_empty(&self) -> bool {
        self.limit.is_none() && self.offset.is_none()
    }

    /// Convert to token stream using dialect-specific pagination.
    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        dialect.emit_limit_offset(self.limit, self.offset)
    }
}

// =============================================================================
// Query Parts
// =============================================================================

/// Statement verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatementKind {
    #[default]
    Select,
    Update,
    Delete,
}

/// Every rendered fragment of one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlParts {
    pub kind: StatementKind,
    pub distinct: bool,
    pub select: Vec<Fragment>,
    pub from: Option<TableRef>,
    pub joins: Vec<Join>,
    pub set: Vec<Fragment>,
    pub where_parts: Vec<Fragment>,
    pub group_by: Vec<Fragment>,
    pub having: Vec<Fragment>,
    pub order_by: Vec<OrderByExpr>,
    pub limit_offset: Option<LimitOffset>,
}

impl SqlParts {
    /// Whether any join that survived pruning is to-many.
    pub fn has_to_many_join(&self) -> bool {
        self.joins.iter().any(|j| j.to_many)
    }

    pub fn has_limit(&self) -> bool {
        self.limit_offset.as_ref().is_some_and(|lo| !lo.is_empty())
    }

    /// Bound values in the order their placeholders appear in the rendered
    /// statement.
    pub fn params(&self) -> Vec<Value> {
        let joins = self.joins.iter().flat_map(|j| j.on.iter());
        let order_by = self.order_by.iter().map(|o| &o.expr);

        self.select
            .iter()
            .chain(joins)
            .chain(&self.set)
            .chain(&self.where_parts)
            .chain(&self.group_by)
            .chain(&self.having)
            .chain(order_by)
            .flat_map(|f| f.params.iter().cloned())
            .collect()
    }

    /// Convert to a token stream for a specific dialect.
    pub fn to_tokens_for_dialect(&self, dialect: Dialect) -> CompileResult<TokenStream> {
        let from = self
            .from
            .as_ref()
            .ok_or_else(|| CompileError::IncompleteQuery("FROM part is empty".into()))?;

        let mut ts = TokenStream::new();

        match self.kind {
            StatementKind::Select => {
                if self.select.is_empty() {
                    return Err(CompileError::IncompleteQuery(
                        "SELECT part is empty".into(),
                    ));
                }
                ts.push(Token::Select).space();
                if self.distinct {
                    ts.push(Token::Distinct).space();
                }
                ts.comma_separated(self.select.iter().map(|f| f.sql.clone()));
                ts.space().push(Token::From).space();
                ts.append(&from.to_tokens());
                for join in &self.joins {
                    ts.space().append(&join.to_tokens());
                }
            }
            StatementKind::Update => {
                if self.set.is_empty() {
                    return Err(CompileError::IncompleteQuery("SET part is empty".into()));
                }
                ts.push(Token::Update).space();
                ts.append(&from.to_tokens());
                ts.space().push(Token::Set).space();
                ts.comma_separated(self.set.iter().map(|f| f.sql.clone()));
            }
            StatementKind::Delete => {
                ts.push(Token::Delete).space().push(Token::From).space();
                ts.append(&from.to_tokens());
            }
        }

        if !self.where_parts.is_empty() {
            ts.space()
                .push(Token::Where)
                .space()
                .push(Token::Raw(conjoin(&self.where_parts)));
        }

        if !self.group_by.is_empty() {
            ts.space().push(Token::GroupBy).space();
            ts.comma_separated(self.group_by.iter().map(|f| f.sql.clone()));
        }

        if !self.having.is_empty() {
            ts.space()
                .push(Token::Having)
                .space()
                .push(Token::Raw(conjoin(&self.having)));
        }

        // T-SQL requires ORDER BY for OFFSET FETCH syntax.
        let needs_order_by_placeholder = dialect.requires_order_by_for_offset()
            && self.order_by.is_empty()
            && self.has_limit();

        if !self.order_by.is_empty() {
            ts.space().push(Token::OrderBy).space();
            ts.comma_separated(self.order_by.iter().map(OrderByExpr::render));
        } else if needs_order_by_placeholder {
            // Non-deterministic ordering; callers paging on T-SQL should order explicitly.
            ts.space()
                .push(Token::OrderBy)
                .space()
                .lparen()
                .push(Token::Select)
                .space()
                .push(Token::Null)
                .rparen();
        }

        if let Some(lo) = self.limit_offset.as_ref().filter(|lo| !lo.is_empty()) {
            ts.space();
            ts.append(&lo.to_tokens(dialect));
        }

        Ok(ts)
    }

    /// Generate SQL string for a specific dialect.
    pub fn to_sql(&self, dialect: Dialect) -> CompileResult<String> {
        Ok(self.to_tokens_for_dialect(dialect)?.serialize(dialect))
    }
}

/// Join conditions with AND, parenthesizing each one when there are several.
pub fn conjoin<S: AsRef<str>>(parts: &[S]) -> String {
    if parts.len() == 1 {
        return parts[0].as_ref().to_string();
    }
    parts
        .iter()
        .map(|p| {
            let p = p.as_ref();
            if is_parenthesized(p) {
                p.to_string()
            } else {
                format!("({})", p)
            }
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Whether the whole fragment is enclosed by one pair of parentheses.
fn is_parenthesized(fragment: &str) -> bool {
    let s = fragment.trim();
    if !s.starts_with('(') || !s.ends_with(')') {
        return false;
    }
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let last = s.len() - 1;
    for (i, c) in s.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' => quote = Some(c),
                '(' => depth += 1,
                ')' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 && i != last {
                        return false;
                    }
                }
                _ => {}
            },
        }
    }
    depth == 0
}

// =============================================================================
// Tests
// =============================================================================
