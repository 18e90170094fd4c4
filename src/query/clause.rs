//! Clause kinds and the fragments a query collects per clause.

use super::compiler::Compilation;
use super::tokenizer::{count_placeholders, is_keyword, tokenize};
use crate::error::{CompileError, CompileResult};
use crate::execution::Value;
use crate::sql::query::{Fragment, StatementKind};

/// A top-level clause of the query language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClauseKind {
    Select,
    Update,
    Delete,
    From,
    Set,
    Where,
    GroupBy,
    Having,
    OrderBy,
    Limit,
    Offset,
}

/// Compiles the fragments of one clause kind into the query parts.
pub(crate) type ClauseParser<'q> = fn(&mut Compilation<'q>, &[Fragment]) -> CompileResult<()>;

impl ClauseKind {
    pub fn keyword(self) -> &'static str {
        match self {
            ClauseKind::Select => "SELECT",
            ClauseKind::Update => "UPDATE",
            ClauseKind::Delete => "DELETE",
            ClauseKind::From => "FROM",
            ClauseKind::Set => "SET",
            ClauseKind::Where => "WHERE",
            ClauseKind::GroupBy => "GROUP BY",
            ClauseKind::Having => "HAVING",
            ClauseKind::OrderBy => "ORDER BY",
            ClauseKind::Limit => "LIMIT",
            ClauseKind::Offset => "OFFSET",
        }
    }

    /// Position in the canonical clause order. Statement verbs share rank 0.
    pub(crate) fn rank(self) -> u8 {
        match self {
            ClauseKind::Select | ClauseKind::Update | ClauseKind::Delete => 0,
            ClauseKind::From => 1,
            ClauseKind::Set => 2,
            ClauseKind::Where => 3,
            ClauseKind::GroupBy => 4,
            ClauseKind::Having => 5,
            ClauseKind::OrderBy => 6,
            ClauseKind::Limit => 7,
            ClauseKind::Offset => 8,
        }
    }

    /// Recognize a clause keyword, returning the kind and how many words it
    /// spans (`GROUP BY` and `ORDER BY` take two).
    pub(crate) fn from_keyword(word: &str, next: Option<&str>) -> Option<(Self, usize)> {
        let followed_by_by = next.is_some_and(|n| is_keyword(n, "BY"));
        let kind = match word.to_ascii_uppercase().as_str() {
            "SELECT" => ClauseKind::Select,
            "UPDATE" => ClauseKind::Update,
            "DELETE" => ClauseKind::Delete,
            "FROM" => ClauseKind::From,
            "SET" => ClauseKind::Set,
            "WHERE" => ClauseKind::Where,
            "HAVING" => ClauseKind::Having,
            "LIMIT" => ClauseKind::Limit,
            "OFFSET" => ClauseKind::Offset,
            "GROUP" if followed_by_by => return Some((ClauseKind::GroupBy, 2)),
            "ORDER" if followed_by_by => return Some((ClauseKind::OrderBy, 2)),
            _ => return None,
        };
        Some((kind, 1))
    }

    /// Parser for this clause. LIMIT and OFFSET carry plain values and have
    /// no fragment parser.
    pub(crate) fn parser<'q>(self) -> Option<ClauseParser<'q>> {
        match self {
            ClauseKind::Select => Some(Compilation::parse_select),
            ClauseKind::Update | ClauseKind::Delete | ClauseKind::From => {
                Some(Compilation::parse_from)
            }
            ClauseKind::Set => Some(Compilation::parse_set),
            ClauseKind::Where => Some(Compilation::parse_where),
            ClauseKind::GroupBy => Some(Compilation::parse_group_by),
            ClauseKind::Having => Some(Compilation::parse_having),
            ClauseKind::OrderBy => Some(Compilation::parse_order_by),
            ClauseKind::Limit | ClauseKind::Offset => None,
        }
    }
}

impl std::fmt::Display for ClauseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Raw clause fragments collected by a query, compiled on demand.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ClauseSet {
    pub statement: StatementKind,
    pub select: Vec<Fragment>,
    /// FROM/JOIN text; for UPDATE and DELETE, the target component.
    pub from: Vec<Fragment>,
    pub set: Vec<Fragment>,
    pub where_parts: Vec<Fragment>,
    pub group_by: Vec<Fragment>,
    pub having: Vec<Fragment>,
    pub order_by: Vec<Fragment>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl ClauseSet {
    /// Tokenize a whole query and distribute `params` over its clauses in
    /// textual placeholder order.
    pub fn parse(query: &str, params: &[Value]) -> CompileResult<Self> {
        let clauses = tokenize(query)?;

        let mut set = ClauseSet::default();
        let mut offset = 0;
        for clause in clauses {
            let body = clause.body();
            let count = count_placeholders(&body)?;
            let bound = params.get(offset..offset + count).ok_or_else(|| {
                CompileError::malformed(format!(
                    "query has more placeholders than the {} bound parameter(s)",
                    params.len()
                ))
            })?;
            set.push(clause.kind, Fragment::with_params(body, bound.to_vec()))?;
            offset += count;
        }

        if offset != params.len() {
            return Err(CompileError::malformed(format!(
                "query has {} placeholder(s) but {} parameter(s) were bound",
                offset,
                params.len()
            )));
        }

        Ok(set)
    }

    pub fn push(&mut self, kind: ClauseKind, fragment: Fragment) -> CompileResult<()> {
        match kind {
            ClauseKind::Select => self.select.push(fragment),
            ClauseKind::Update => {
                self.statement = StatementKind::Update;
                self.from.push(fragment);
            }
            ClauseKind::Delete => {
                self.statement = StatementKind::Delete;
                if !fragment.sql.trim().is_empty() {
                    self.from.push(fragment);
                }
            }
            ClauseKind::From => self.from.push(fragment),
            ClauseKind::Set => self.set.push(fragment),
            ClauseKind::Where => self.where_parts.push(fragment),
            ClauseKind::GroupBy => self.group_by.push(fragment),
            ClauseKind::Having => self.having.push(fragment),
            ClauseKind::OrderBy => self.order_by.push(fragment),
            ClauseKind::Limit => self.limit = Some(parse_count(kind, &fragment)?),
            ClauseKind::Offset => self.offset = Some(parse_count(kind, &fragment)?),
        }
        Ok(())
    }

    pub fn fragments(&self, kind: ClauseKind) -> &[Fragment] {
        match kind {
            ClauseKind::Select => &self.select,
            ClauseKind::Update | ClauseKind::Delete | ClauseKind::From => &self.from,
            ClauseKind::Set => &self.set,
            ClauseKind::Where => &self.where_parts,
            ClauseKind::GroupBy => &self.group_by,
            ClauseKind::Having => &self.having,
            ClauseKind::OrderBy => &self.order_by,
            ClauseKind::Limit | ClauseKind::Offset => &[],
        }
    }
}

fn parse_count(kind: ClauseKind, fragment: &Fragment) -> CompileResult<u64> {
    fragment.sql.trim().parse().map_err(|_| {
        CompileError::malformed(format!(
            "{} expects a non-negative integer, got '{}'",
            kind,
            fragment.sql.trim()
        ))
    })
}
